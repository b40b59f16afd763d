use std::sync::Arc;

use crate::matching::domain::enrollment::SubjectId;
use crate::matching::domain::enrollment_store::EnrollmentStore;
use crate::matching::domain::match_engine::MatchEngine;
use crate::matching::domain::match_result::MatchResult;
use crate::shared::embedding::Embedding;

use super::verification_error::VerificationError;

/// Decides who a probe embedding belongs to among the requested subjects.
pub trait IdentityMatcher: Send + Sync {
    /// An empty `subjects` list means every enrolled subject, where the
    /// variant can enumerate them.
    fn identify(
        &self,
        probe: &Embedding,
        subjects: &[SubjectId],
    ) -> Result<MatchResult, VerificationError>;
}

/// Matches against records read from an [`EnrollmentStore`].
pub struct LocalIdentityMatcher {
    store: Arc<dyn EnrollmentStore>,
    engine: MatchEngine,
}

impl LocalIdentityMatcher {
    pub fn new(store: Arc<dyn EnrollmentStore>, engine: MatchEngine) -> Self {
        Self { store, engine }
    }

    pub fn engine(&self) -> &MatchEngine {
        &self.engine
    }
}

impl IdentityMatcher for LocalIdentityMatcher {
    fn identify(
        &self,
        probe: &Embedding,
        subjects: &[SubjectId],
    ) -> Result<MatchResult, VerificationError> {
        let store_err = |e: crate::matching::domain::enrollment_store::StoreError| {
            VerificationError::Internal(e.to_string())
        };

        let wanted = if subjects.is_empty() {
            self.store.subjects().map_err(store_err)?
        } else {
            subjects.to_vec()
        };

        let mut records = Vec::with_capacity(wanted.len());
        for subject in &wanted {
            match self.store.get(subject).map_err(store_err)? {
                Some(record) => records.push(record),
                None => log::debug!("Subject {subject} is not enrolled, skipping"),
            }
        }
        if records.is_empty() {
            return Err(VerificationError::NotEnrolled(describe_missing(&wanted)));
        }

        Ok(self.engine.best_match(probe, &records)?)
    }
}

/// Message for a request where none of `subjects` is enrolled.
pub(crate) fn describe_missing(subjects: &[SubjectId]) -> String {
    if subjects.is_empty() {
        return "no subjects are enrolled".into();
    }
    let names: Vec<&str> = subjects.iter().map(|s| s.as_str()).collect();
    format!("none of {} is enrolled", names.join(", "))
}
