use std::fmt;

use serde::{Deserialize, Serialize};

use super::enrollment::SubjectId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchDecision {
    Match,
    NoMatch,
    /// Several candidates scored within the ambiguity epsilon of the best.
    Ambiguous,
}

impl fmt::Display for MatchDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchDecision::Match => write!(f, "match"),
            MatchDecision::NoMatch => write!(f, "no match"),
            MatchDecision::Ambiguous => write!(f, "ambiguous"),
        }
    }
}

/// Outcome of comparing one probe against the enrolled candidates.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchResult {
    score: f64,
    decision: MatchDecision,
    matched_subject: Option<SubjectId>,
    contenders: Vec<SubjectId>,
}

impl MatchResult {
    pub fn matched(subject: SubjectId, score: f64) -> Self {
        Self {
            score,
            decision: MatchDecision::Match,
            matched_subject: Some(subject),
            contenders: Vec::new(),
        }
    }

    pub fn no_match(best_score: f64) -> Self {
        Self {
            score: best_score,
            decision: MatchDecision::NoMatch,
            matched_subject: None,
            contenders: Vec::new(),
        }
    }

    /// `contenders` lists every subject within epsilon of the best score,
    /// best first.
    pub fn ambiguous(best_score: f64, contenders: Vec<SubjectId>) -> Self {
        Self {
            score: best_score,
            decision: MatchDecision::Ambiguous,
            matched_subject: None,
            contenders,
        }
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn decision(&self) -> MatchDecision {
        self.decision
    }

    pub fn is_match(&self) -> bool {
        self.decision == MatchDecision::Match
    }

    pub fn matched_subject(&self) -> Option<&SubjectId> {
        self.matched_subject.as_ref()
    }

    pub fn contenders(&self) -> &[SubjectId] {
        &self.contenders
    }
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.decision, &self.matched_subject) {
            (MatchDecision::Match, Some(subject)) => {
                write!(f, "match: {subject}, score {:.4}", self.score)
            }
            (MatchDecision::Ambiguous, _) => {
                let names: Vec<&str> = self.contenders.iter().map(|s| s.as_str()).collect();
                write!(
                    f,
                    "ambiguous between {}, score {:.4}",
                    names.join(", "),
                    self.score
                )
            }
            _ => write!(f, "no match, best score {:.4}", self.score),
        }
    }
}
