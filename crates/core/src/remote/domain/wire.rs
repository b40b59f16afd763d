//! JSON bodies exchanged with the verification service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::matching::domain::match_result::MatchDecision;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub subject_id: String,
    pub embedding: Vec<f32>,
    pub model_version: String,
}

/// Response for both verify and compare calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResponse {
    pub decision: MatchDecision,
    pub score: f64,
    #[serde(default)]
    pub matched_subject: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contenders: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareRequest {
    pub first: Vec<f32>,
    pub second: Vec<f32>,
    pub model_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

/// A subject as stored by the user endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub subject_id: String,
    pub model_version: String,
    pub references: Vec<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub subject_id: String,
}

/// Error body returned with 4xx/5xx responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    /// Best human-readable message from a raw error body.
    pub fn message_from(body: &[u8], status: u16) -> String {
        serde_json::from_slice::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.error.or(b.message))
            .or_else(|| {
                let text = String::from_utf8_lossy(body).trim().to_string();
                (!text.is_empty()).then_some(text)
            })
            .unwrap_or_else(|| format!("HTTP {status}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_request_uses_camel_case() {
        let req = VerifyRequest {
            subject_id: "alice".into(),
            embedding: vec![0.5],
            model_version: "arcface@1".into(),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(
            json,
            r#"{"subjectId":"alice","embedding":[0.5],"modelVersion":"arcface@1"}"#
        );
    }

    #[test]
    fn test_match_response_parses_minimal_body() {
        let resp: MatchResponse =
            serde_json::from_str(r#"{"decision":"no_match","score":0.31}"#).unwrap();
        assert_eq!(resp.decision, MatchDecision::NoMatch);
        assert!(resp.matched_subject.is_none());
        assert!(resp.contenders.is_empty());
    }

    #[test]
    fn test_match_response_parses_match() {
        let resp: MatchResponse = serde_json::from_str(
            r#"{"decision":"match","score":0.93,"matchedSubject":"alice"}"#,
        )
        .unwrap();
        assert_eq!(resp.matched_subject.as_deref(), Some("alice"));
    }

    #[test]
    fn test_error_message_prefers_json_error() {
        assert_eq!(
            ErrorBody::message_from(br#"{"error":"Authentication failed"}"#, 401),
            "Authentication failed"
        );
        assert_eq!(ErrorBody::message_from(b"bad gateway", 502), "bad gateway");
        assert_eq!(ErrorBody::message_from(b"", 503), "HTTP 503");
    }
}
