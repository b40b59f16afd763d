use std::sync::Arc;

use crate::matching::domain::enrollment::SubjectId;
use crate::matching::domain::match_result::{MatchDecision, MatchResult};
use crate::remote::infrastructure::http_verification_client::HttpVerificationClient;
use crate::shared::embedding::Embedding;
use crate::verification::domain::identity_matcher::{describe_missing, IdentityMatcher};
use crate::verification::domain::verification_error::VerificationError;

/// Delegates matching to the remote verification service, one call per
/// requested subject.
pub struct RemoteIdentityMatcher {
    client: Arc<HttpVerificationClient>,
    ambiguity_epsilon: f64,
}

impl RemoteIdentityMatcher {
    pub fn new(client: Arc<HttpVerificationClient>, ambiguity_epsilon: f64) -> Self {
        Self {
            client,
            ambiguity_epsilon,
        }
    }
}

impl IdentityMatcher for RemoteIdentityMatcher {
    fn identify(
        &self,
        probe: &Embedding,
        subjects: &[SubjectId],
    ) -> Result<MatchResult, VerificationError> {
        if subjects.is_empty() {
            return Err(VerificationError::NotEnrolled(
                "remote verification needs at least one subject".into(),
            ));
        }

        let mut results = Vec::with_capacity(subjects.len());
        for subject in subjects {
            match self.client.verify(subject, probe) {
                Ok(result) => results.push(result),
                Err(e) if e.status() == Some(404) => {
                    log::debug!("Subject {subject} unknown to the service, skipping");
                }
                Err(e) => return Err(e.into()),
            }
        }
        if results.is_empty() {
            return Err(VerificationError::NotEnrolled(describe_missing(subjects)));
        }

        Ok(combine(results, self.ambiguity_epsilon))
    }
}

/// Merges per-subject answers: several positive answers within `epsilon`
/// of the best one are ambiguous.
fn combine(mut results: Vec<MatchResult>, epsilon: f64) -> MatchResult {
    results.sort_by(|a, b| b.score().total_cmp(&a.score()));

    let positives: Vec<&MatchResult> = results
        .iter()
        .filter(|r| r.decision() != MatchDecision::NoMatch)
        .collect();
    let Some(best) = positives.first() else {
        return MatchResult::no_match(results[0].score());
    };

    let mut contenders: Vec<SubjectId> = Vec::new();
    for r in positives.iter().take_while(|r| best.score() - r.score() <= epsilon) {
        let subjects = r
            .matched_subject()
            .into_iter()
            .chain(r.contenders().iter());
        for s in subjects {
            if !contenders.contains(s) {
                contenders.push(s.clone());
            }
        }
    }

    match (best.decision(), contenders.len()) {
        (MatchDecision::Match, 1) => (*best).clone(),
        _ => MatchResult::ambiguous(best.score(), contenders),
    }
}
