use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use super::enrollment::{EnrollmentRecord, SubjectId};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid enrollment file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid subject id '{0}'")]
    InvalidSubject(String),
    #[error("enrollment service error: {0}")]
    Remote(String),
    #[error("enrollment store lock poisoned")]
    Poisoned,
}

/// Persistence seam for enrollment records.
///
/// Reads may run concurrently with each other and with writes to other
/// subjects. Writes to the same subject are serialized, and a reader sees
/// either the old record or the new one, never a mix.
pub trait EnrollmentStore: Send + Sync {
    fn get(&self, subject: &SubjectId) -> Result<Option<Arc<EnrollmentRecord>>, StoreError>;

    /// Inserts or replaces the record for `record.subject()`.
    fn put(&self, record: EnrollmentRecord) -> Result<(), StoreError>;

    /// Removes a subject. Returns whether a record existed.
    fn delete(&self, subject: &SubjectId) -> Result<bool, StoreError>;

    /// Enrolled subject ids in ascending order.
    fn subjects(&self) -> Result<Vec<SubjectId>, StoreError>;
}
