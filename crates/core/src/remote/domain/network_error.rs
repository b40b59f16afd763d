use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    /// A single failed attempt worth retrying: connection failure,
    /// request timeout, 429 or 5xx.
    #[error("transient failure{}: {message}", fmt_status(.status))]
    Transient {
        status: Option<u16>,
        message: String,
        /// Server-requested wait from `Retry-After`.
        retry_after: Option<Duration>,
    },
    /// Not retried (4xx other than 429), or retries exhausted.
    #[error("request failed{} after {attempts} attempt(s): {message}", fmt_status(.status))]
    Permanent {
        status: Option<u16>,
        attempts: u32,
        message: String,
    },
    #[error("network budget of {}ms exhausted after {attempts} attempt(s)", .budget.as_millis())]
    TimedOut { attempts: u32, budget: Duration },
    #[error("invalid response from server: {0}")]
    InvalidResponse(String),
}

impl NetworkError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, NetworkError::Transient { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            NetworkError::Transient { status, .. } | NetworkError::Permanent { status, .. } => {
                *status
            }
            _ => None,
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403))
    }

    /// Classifies a non-success HTTP status for one attempt.
    pub fn from_status(status: u16, message: String, retry_after: Option<Duration>) -> Self {
        if status == 429 || (500..600).contains(&status) {
            NetworkError::Transient {
                status: Some(status),
                message,
                retry_after,
            }
        } else {
            NetworkError::Permanent {
                status: Some(status),
                attempts: 1,
                message,
            }
        }
    }
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::too_many_requests(429, true)]
    #[case::internal(500, true)]
    #[case::unavailable(503, true)]
    #[case::bad_request(400, false)]
    #[case::unauthorized(401, false)]
    #[case::not_found(404, false)]
    #[case::conflict(409, false)]
    fn test_status_classification(#[case] status: u16, #[case] retryable: bool) {
        let err = NetworkError::from_status(status, "x".into(), None);
        assert_eq!(err.is_retryable(), retryable);
        assert_eq!(err.status(), Some(status));
    }

    #[test]
    fn test_auth_failure() {
        assert!(NetworkError::from_status(401, "no".into(), None).is_auth_failure());
        assert!(!NetworkError::from_status(400, "no".into(), None).is_auth_failure());
    }

    #[test]
    fn test_display_mentions_status_and_attempts() {
        let err = NetworkError::Permanent {
            status: Some(503),
            attempts: 4,
            message: "unavailable".into(),
        };
        assert_eq!(
            err.to_string(),
            "request failed (HTTP 503) after 4 attempt(s): unavailable"
        );
    }
}
