use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::embedding::{Embedding, ModelVersion};

/// Opaque identifier of an enrolled subject.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubjectId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum EnrollmentError {
    #[error("an enrollment needs at least one reference embedding")]
    NoReferences,
    #[error("reference embeddings mix models: {expected} and {found}")]
    MixedModels {
        expected: ModelVersion,
        found: ModelVersion,
    },
    #[error("reference embeddings mix dimensions: {expected} and {found}")]
    MixedDimensions { expected: usize, found: usize },
}

/// Reference embeddings for one subject.
///
/// All references share one model version and dimension. Records are
/// immutable values; re-enrollment builds a new record and the store swaps
/// it in whole. Deserialization checks the same invariants as [`new`](Self::new).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredRecord")]
pub struct EnrollmentRecord {
    subject: SubjectId,
    references: Vec<Embedding>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct StoredRecord {
    subject: SubjectId,
    references: Vec<Embedding>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<StoredRecord> for EnrollmentRecord {
    type Error = EnrollmentError;

    fn try_from(stored: StoredRecord) -> Result<Self, Self::Error> {
        check_references(&stored.references)?;
        Ok(Self {
            subject: stored.subject,
            references: stored.references,
            created_at: stored.created_at,
            updated_at: stored.updated_at.max(stored.created_at),
        })
    }
}

impl EnrollmentRecord {
    pub fn new(subject: SubjectId, references: Vec<Embedding>) -> Result<Self, EnrollmentError> {
        check_references(&references)?;
        let now = Utc::now();
        Ok(Self {
            subject,
            references,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn subject(&self) -> &SubjectId {
        &self.subject
    }

    pub fn references(&self) -> &[Embedding] {
        &self.references
    }

    /// Model shared by every reference.
    pub fn model(&self) -> &ModelVersion {
        self.references[0].model()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Restores timestamps of a record loaded from elsewhere.
    pub fn with_timestamps(
        mut self,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        self.created_at = created_at;
        self.updated_at = updated_at.max(created_at);
        self
    }

    /// Re-enrollment that keeps existing references and adds one more.
    pub fn with_reference(&self, reference: Embedding) -> Result<Self, EnrollmentError> {
        let mut references = self.references.clone();
        references.push(reference);
        self.replace_references(references)
    }

    /// Re-enrollment that discards existing references.
    pub fn replace_references(&self, references: Vec<Embedding>) -> Result<Self, EnrollmentError> {
        check_references(&references)?;
        Ok(Self {
            subject: self.subject.clone(),
            references,
            created_at: self.created_at,
            updated_at: Utc::now().max(self.updated_at),
        })
    }
}

impl AsRef<EnrollmentRecord> for EnrollmentRecord {
    fn as_ref(&self) -> &EnrollmentRecord {
        self
    }
}

fn check_references(references: &[Embedding]) -> Result<(), EnrollmentError> {
    let first = references.first().ok_or(EnrollmentError::NoReferences)?;
    for r in &references[1..] {
        if r.model() != first.model() {
            return Err(EnrollmentError::MixedModels {
                expected: first.model().clone(),
                found: r.model().clone(),
            });
        }
        if r.len() != first.len() {
            return Err(EnrollmentError::MixedDimensions {
                expected: first.len(),
                found: r.len(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn emb(values: &[f32], version: &str) -> Embedding {
        Embedding::new(values.to_vec(), ModelVersion::new("arcface", version))
    }

    #[test]
    fn test_new_requires_references() {
        let err = EnrollmentRecord::new("alice".into(), Vec::new()).unwrap_err();
        assert_eq!(err, EnrollmentError::NoReferences);
    }

    #[test]
    fn test_new_rejects_mixed_models() {
        let err = EnrollmentRecord::new(
            "alice".into(),
            vec![emb(&[1.0, 0.0], "1"), emb(&[0.0, 1.0], "2")],
        )
        .unwrap_err();
        assert!(matches!(err, EnrollmentError::MixedModels { .. }));
    }

    #[test]
    fn test_new_rejects_mixed_dimensions() {
        let err = EnrollmentRecord::new(
            "alice".into(),
            vec![emb(&[1.0, 0.0], "1"), emb(&[0.0, 1.0, 0.0], "1")],
        )
        .unwrap_err();
        assert_eq!(
            err,
            EnrollmentError::MixedDimensions {
                expected: 2,
                found: 3
            }
        );
    }

    #[test]
    fn test_with_reference_appends() {
        let record = EnrollmentRecord::new("alice".into(), vec![emb(&[1.0, 0.0], "1")]).unwrap();
        let updated = record.with_reference(emb(&[0.0, 1.0], "1")).unwrap();
        assert_eq!(updated.references().len(), 2);
        assert_eq!(record.references().len(), 1);
        assert_eq!(updated.created_at(), record.created_at());
        assert!(updated.updated_at() >= record.updated_at());
    }

    #[test]
    fn test_with_reference_rejects_other_model() {
        let record = EnrollmentRecord::new("alice".into(), vec![emb(&[1.0, 0.0], "1")]).unwrap();
        assert!(record.with_reference(emb(&[0.0, 1.0], "2")).is_err());
    }

    #[test]
    fn test_replace_references_swaps_model() {
        let record = EnrollmentRecord::new("alice".into(), vec![emb(&[1.0, 0.0], "1")]).unwrap();
        let replaced = record.replace_references(vec![emb(&[0.0, 1.0], "2")]).unwrap();
        assert_eq!(replaced.model().version(), "2");
        assert_eq!(replaced.subject().as_str(), "alice");
    }

    #[test]
    fn test_timestamps_serialize_as_rfc3339() {
        let created = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let record = EnrollmentRecord::new("alice".into(), vec![emb(&[1.0, 0.0], "1")])
            .unwrap()
            .with_timestamps(created, created);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains(r#""created_at":"2024-05-01T10:00:00Z""#), "{json}");

        let back: EnrollmentRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    fn stored(references: &str) -> String {
        format!(
            r#"{{"subject":"alice","references":{references},"created_at":"2024-05-01T10:00:00Z","updated_at":"2024-05-01T10:00:00Z"}}"#
        )
    }

    #[rstest]
    #[case::no_references("[]")]
    #[case::mixed_models(
        r#"[{"values":[1.0,0.0],"model":{"name":"arcface","version":"1"}},{"values":[0.0,1.0],"model":{"name":"arcface","version":"2"}}]"#
    )]
    #[case::mixed_dimensions(
        r#"[{"values":[1.0,0.0],"model":{"name":"arcface","version":"1"}},{"values":[1.0],"model":{"name":"arcface","version":"1"}}]"#
    )]
    fn test_deserialize_enforces_reference_invariants(#[case] references: &str) {
        let err = serde_json::from_str::<EnrollmentRecord>(&stored(references)).unwrap_err();
        assert!(err.to_string().contains("reference"), "{err}");
    }

    #[test]
    fn test_deserialize_never_moves_updated_before_created() {
        let json = r#"{"subject":"alice","references":[{"values":[1.0],"model":{"name":"arcface","version":"1"}}],"created_at":"2024-05-02T00:00:00Z","updated_at":"2024-05-01T00:00:00Z"}"#;
        let record: EnrollmentRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.updated_at(), record.created_at());
    }

    #[test]
    fn test_subject_id_serializes_as_string() {
        let json = serde_json::to_string(&SubjectId::new("bob")).unwrap();
        assert_eq!(json, "\"bob\"");
    }
}
