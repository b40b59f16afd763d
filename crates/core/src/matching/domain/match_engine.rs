use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::enrollment::{EnrollmentRecord, SubjectId};
use super::match_result::MatchResult;
use crate::shared::embedding::{Embedding, ModelVersion};

#[derive(Error, Debug, PartialEq)]
pub enum MatchError {
    #[error("embedding version mismatch: probe is {probe}, {subject} was enrolled with {candidate}")]
    VersionMismatch {
        probe: ModelVersion,
        candidate: ModelVersion,
        subject: SubjectId,
    },
    #[error("embedding length mismatch: probe has {probe} values, {subject} has {candidate}")]
    DimensionMismatch {
        probe: usize,
        candidate: usize,
        subject: SubjectId,
    },
    #[error("no enrolled candidates to match against")]
    NoCandidates,
}

/// Similarity between two embeddings. Higher is more similar for both
/// metrics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    /// Cosine of the angle, in `[-1, 1]`.
    #[default]
    Cosine,
    /// `1 / (1 + L2 distance)`, in `(0, 1]`.
    Euclidean,
}

impl SimilarityMetric {
    pub fn similarity(self, a: &[f32], b: &[f32]) -> f64 {
        match self {
            SimilarityMetric::Cosine => cosine_similarity(a, b),
            SimilarityMetric::Euclidean => 1.0 / (1.0 + euclidean_distance(a, b)),
        }
    }
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimilarityMetric::Cosine => write!(f, "cosine"),
            SimilarityMetric::Euclidean => write!(f, "euclidean"),
        }
    }
}

/// Decision parameters for the match engine.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchPolicy {
    pub metric: SimilarityMetric,
    /// Best score must be at least this to count as a match.
    pub threshold: f64,
    /// Candidates this close to the best score make the result ambiguous.
    pub ambiguity_epsilon: f64,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            metric: SimilarityMetric::Cosine,
            threshold: 0.80,
            ambiguity_epsilon: 0.02,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct MatchEngine {
    policy: MatchPolicy,
}

impl MatchEngine {
    pub fn new(policy: MatchPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &MatchPolicy {
        &self.policy
    }

    /// Similarity between two embeddings of the same model.
    pub fn compare(&self, a: &Embedding, b: &Embedding) -> Result<f64, MatchError> {
        let subject = SubjectId::new("reference");
        check_comparable(a, b, &subject)?;
        Ok(self.policy.metric.similarity(a.values(), b.values()))
    }

    /// Scores `probe` against every candidate and picks the best.
    ///
    /// A candidate scores the best similarity over its references. Every
    /// reference is checked for model compatibility before any decision, so
    /// a single mismatched candidate fails the whole call.
    pub fn best_match<R: AsRef<EnrollmentRecord>>(
        &self,
        probe: &Embedding,
        candidates: &[R],
    ) -> Result<MatchResult, MatchError> {
        if candidates.is_empty() {
            return Err(MatchError::NoCandidates);
        }

        let mut scored: Vec<(&SubjectId, f64)> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let record: &EnrollmentRecord = candidate.as_ref();
            let mut best = f64::NEG_INFINITY;
            for reference in record.references() {
                check_comparable(probe, reference, record.subject())?;
                best = best.max(self.policy.metric.similarity(probe.values(), reference.values()));
            }
            scored.push((record.subject(), best));
        }

        // Stable sort keeps candidate order among equal scores.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        let (best_subject, best_score) = scored[0];

        if best_score < self.policy.threshold {
            log::debug!("Best candidate {best_subject} scored {best_score:.4}, below threshold");
            return Ok(MatchResult::no_match(best_score));
        }

        let contenders: Vec<SubjectId> = scored
            .iter()
            .take_while(|(_, score)| best_score - score <= self.policy.ambiguity_epsilon)
            .map(|(subject, _)| (*subject).clone())
            .collect();

        if contenders.len() > 1 {
            log::debug!(
                "{} candidates within {} of best score {best_score:.4}",
                contenders.len(),
                self.policy.ambiguity_epsilon
            );
            return Ok(MatchResult::ambiguous(best_score, contenders));
        }

        Ok(MatchResult::matched(best_subject.clone(), best_score))
    }
}

fn check_comparable(
    probe: &Embedding,
    reference: &Embedding,
    subject: &SubjectId,
) -> Result<(), MatchError> {
    if probe.model() != reference.model() {
        return Err(MatchError::VersionMismatch {
            probe: probe.model().clone(),
            candidate: reference.model().clone(),
            subject: subject.clone(),
        });
    }
    if probe.len() != reference.len() {
        return Err(MatchError::DimensionMismatch {
            probe: probe.len(),
            candidate: reference.len(),
            subject: subject.clone(),
        });
    }
    Ok(())
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = *x as f64 - *y as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}
