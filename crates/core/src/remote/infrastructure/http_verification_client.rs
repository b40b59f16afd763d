use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::matching::domain::enrollment::SubjectId;
use crate::matching::domain::match_result::{MatchDecision, MatchResult};
use crate::remote::domain::http_transport::{
    HttpRequest, HttpResponse, HttpTransport, Method, TransportError,
};
use crate::remote::domain::network_error::NetworkError;
use crate::remote::domain::remote_config::RemoteConfig;
use crate::remote::domain::retry::RetryPolicy;
use crate::remote::domain::wire::{
    CompareRequest, ErrorBody, LoginRequest, LoginResponse, MatchResponse, VerifyRequest,
};
use crate::shared::embedding::Embedding;

/// Client for the remote verification service.
///
/// Every call is retried per the configured [`RetryPolicy`] and bounded by
/// the network budget. Verification is read-only on the server, so retries
/// are always safe.
pub struct HttpVerificationClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    token: RwLock<Option<String>>,
    retry: RetryPolicy,
    request_timeout: Duration,
    network_timeout: Duration,
}

impl HttpVerificationClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        base_url: impl Into<String>,
        config: &RemoteConfig,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            transport,
            base_url,
            token: RwLock::new(None),
            retry: config.retry,
            request_timeout: config.request_timeout(),
            network_timeout: config.network_timeout(),
        }
    }

    pub fn with_token(self, token: impl Into<String>) -> Self {
        self.set_token(Some(token.into()));
        self
    }

    pub fn set_token(&self, token: Option<String>) {
        if let Ok(mut slot) = self.token.write() {
            *slot = token;
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Logs in and keeps the returned bearer token for later calls.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<(), NetworkError> {
        let body = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let response: LoginResponse = self.call_json(Method::Post, "api/auth/login", Some(&body))?;
        self.set_token(Some(response.token));
        log::info!("Authenticated with {} as {username}", self.base_url);
        Ok(())
    }

    /// Asks the service whether `embedding` belongs to `subject`.
    pub fn verify(
        &self,
        subject: &SubjectId,
        embedding: &Embedding,
    ) -> Result<MatchResult, NetworkError> {
        let body = VerifyRequest {
            subject_id: subject.to_string(),
            embedding: embedding.values().to_vec(),
            model_version: embedding.model().to_string(),
        };
        let path = format!("{}/verify", user_path(subject));
        let response: MatchResponse = self.call_json(Method::Post, &path, Some(&body))?;
        to_match_result(response, subject)
    }

    /// Server-side comparison of two embeddings. Returns the decision and
    /// the similarity score.
    pub fn compare(
        &self,
        first: &Embedding,
        second: &Embedding,
    ) -> Result<(MatchDecision, f64), NetworkError> {
        let body = CompareRequest {
            first: first.values().to_vec(),
            second: second.values().to_vec(),
            model_version: first.model().to_string(),
        };
        let response: MatchResponse = self.call_json(Method::Post, "api/faces/compare", Some(&body))?;
        if !response.score.is_finite() {
            return Err(NetworkError::InvalidResponse(format!(
                "non-finite score {}",
                response.score
            )));
        }
        Ok((response.decision, response.score))
    }

    pub(crate) fn call_json<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, NetworkError>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let response = self.call(method, path, body)?;
        serde_json::from_slice(&response.body).map_err(|e| {
            NetworkError::InvalidResponse(format!("{method} {path}: {e}"))
        })
    }

    /// Sends a request with retries and returns the successful response.
    pub(crate) fn call<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<HttpResponse, NetworkError> {
        let body = body
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|e| NetworkError::InvalidResponse(format!("cannot encode request: {e}")))?;
        let url = format!("{}/{path}", self.base_url);
        let bearer_token = self.token.read().ok().and_then(|t| t.clone());
        let deadline = (Instant::now() + self.network_timeout, self.network_timeout);
        let operation = format!("{method} {path}");

        self.retry.run(&operation, Some(deadline), |attempt, remaining| {
            let timeout = remaining
                .map(|left| left.min(self.request_timeout))
                .unwrap_or(self.request_timeout);
            let request = HttpRequest {
                method,
                url: url.clone(),
                bearer_token: bearer_token.clone(),
                body: body.clone(),
                timeout,
            };
            log::debug!("{operation} attempt {}", attempt + 1);

            let response = self.transport.send(&request).map_err(from_transport)?;
            if response.is_success() {
                Ok(response)
            } else {
                let message = ErrorBody::message_from(&response.body, response.status);
                Err(NetworkError::from_status(
                    response.status,
                    message,
                    response.retry_after,
                ))
            }
        })
    }
}

fn from_transport(e: TransportError) -> NetworkError {
    match e {
        TransportError::Timeout | TransportError::Connect(_) => NetworkError::Transient {
            status: None,
            message: e.to_string(),
            retry_after: None,
        },
        TransportError::Other(_) => NetworkError::Permanent {
            status: None,
            attempts: 1,
            message: e.to_string(),
        },
    }
}

fn to_match_result(
    response: MatchResponse,
    requested: &SubjectId,
) -> Result<MatchResult, NetworkError> {
    if !response.score.is_finite() {
        return Err(NetworkError::InvalidResponse(format!(
            "non-finite score {}",
            response.score
        )));
    }
    match response.decision {
        MatchDecision::Match => {
            let subject = response
                .matched_subject
                .map(SubjectId::new)
                .unwrap_or_else(|| requested.clone());
            Ok(MatchResult::matched(subject, response.score))
        }
        MatchDecision::NoMatch => Ok(MatchResult::no_match(response.score)),
        MatchDecision::Ambiguous => {
            let mut contenders: Vec<SubjectId> =
                response.contenders.into_iter().map(SubjectId::new).collect();
            if contenders.is_empty() {
                contenders.push(requested.clone());
            }
            Ok(MatchResult::ambiguous(response.score, contenders))
        }
    }
}

/// Path of a subject's user resource, with the id percent-encoded as a
/// single segment.
pub(crate) fn user_path(subject: &SubjectId) -> String {
    format!("api/users/{}", urlencoding::encode(subject.as_str()))
}
