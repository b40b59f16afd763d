use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::matching::domain::match_engine::MatchError;
use crate::remote::domain::network_error::NetworkError;

/// Machine-readable category of a session failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NoFaceFound,
    ExtractionRetriesExhausted,
    VersionMismatch,
    Network,
    Timeout,
    Cancelled,
    NotEnrolled,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NoFaceFound => "no_face_found",
            ErrorKind::ExtractionRetriesExhausted => "extraction_retries_exhausted",
            ErrorKind::VersionMismatch => "version_mismatch",
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::NotEnrolled => "not_enrolled",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of a verification session.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VerificationError {
    #[error("no face found within {}ms", .waited.as_millis())]
    NoFaceFound { waited: Duration },
    #[error("feature extraction failed {attempts} time(s), last error: {last}")]
    ExtractionRetriesExhausted { attempts: u32, last: String },
    #[error("incompatible embeddings: {0}")]
    VersionMismatch(String),
    #[error("verification service error: {0}")]
    Network(NetworkError),
    #[error("timeout: {0}")]
    Timeout(NetworkError),
    #[error("cancelled")]
    Cancelled,
    #[error("not enrolled: {0}")]
    NotEnrolled(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl VerificationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VerificationError::NoFaceFound { .. } => ErrorKind::NoFaceFound,
            VerificationError::ExtractionRetriesExhausted { .. } => {
                ErrorKind::ExtractionRetriesExhausted
            }
            VerificationError::VersionMismatch(_) => ErrorKind::VersionMismatch,
            VerificationError::Network(_) => ErrorKind::Network,
            VerificationError::Timeout(_) => ErrorKind::Timeout,
            VerificationError::Cancelled => ErrorKind::Cancelled,
            VerificationError::NotEnrolled(_) => ErrorKind::NotEnrolled,
            VerificationError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<NetworkError> for VerificationError {
    fn from(e: NetworkError) -> Self {
        match e {
            NetworkError::TimedOut { .. } => VerificationError::Timeout(e),
            other => VerificationError::Network(other),
        }
    }
}

impl From<MatchError> for VerificationError {
    fn from(e: MatchError) -> Self {
        match e {
            MatchError::NoCandidates => VerificationError::NotEnrolled(e.to_string()),
            other => VerificationError::VersionMismatch(other.to_string()),
        }
    }
}
