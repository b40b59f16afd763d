//! Explicit per-session state machine.
//!
//! `SessionStateMachine::apply` is the only way a session changes state.
//! `Decided` is absorbing: once reached, every further event is rejected and
//! the state never changes again.

use std::fmt;

use thiserror::Error;

use super::verification_error::VerificationError;
use crate::matching::domain::match_result::{MatchDecision, MatchResult};

/// Terminal outcome of a session, delivered to the caller once.
#[derive(Clone, Debug, PartialEq)]
pub enum Decision {
    Accepted(MatchResult),
    Rejected(MatchResult),
    Ambiguous(MatchResult),
    Error(VerificationError),
}

impl Decision {
    pub fn from_match(result: MatchResult) -> Self {
        match result.decision() {
            MatchDecision::Match => Decision::Accepted(result),
            MatchDecision::NoMatch => Decision::Rejected(result),
            MatchDecision::Ambiguous => Decision::Ambiguous(result),
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Decision::Accepted(_))
    }

    pub fn match_result(&self) -> Option<&MatchResult> {
        match self {
            Decision::Accepted(r) | Decision::Rejected(r) | Decision::Ambiguous(r) => Some(r),
            Decision::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&VerificationError> {
        match self {
            Decision::Error(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Accepted(r) => write!(f, "accepted ({r})"),
            Decision::Rejected(r) => write!(f, "rejected ({r})"),
            Decision::Ambiguous(r) => write!(f, "ambiguous ({r})"),
            Decision::Error(e) => write!(f, "error [{}]: {e}", e.kind()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SessionState {
    Idle,
    AwaitingFace,
    FaceDetected,
    ExtractingFeatures,
    Matching,
    Decided(Decision),
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::AwaitingFace => "AwaitingFace",
            SessionState::FaceDetected => "FaceDetected",
            SessionState::ExtractingFeatures => "ExtractingFeatures",
            SessionState::Matching => "Matching",
            SessionState::Decided(_) => "Decided",
        }
    }

    pub fn is_decided(&self) -> bool {
        matches!(self, SessionState::Decided(_))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// First frame of the session arrived.
    Started,
    /// A frame held no region that passed detection and gating.
    NoValidFace,
    FaceFound,
    ExtractionStarted,
    /// Extraction failed for this frame; `reason` is kept for the final error.
    ExtractionFailed { reason: String },
    Extracted,
    Matched(MatchResult),
    /// Any session-level failure, including timeout and cancellation.
    Failed(VerificationError),
}

impl SessionEvent {
    fn name(&self) -> &'static str {
        match self {
            SessionEvent::Started => "Started",
            SessionEvent::NoValidFace => "NoValidFace",
            SessionEvent::FaceFound => "FaceFound",
            SessionEvent::ExtractionStarted => "ExtractionStarted",
            SessionEvent::ExtractionFailed { .. } => "ExtractionFailed",
            SessionEvent::Extracted => "Extracted",
            SessionEvent::Matched(_) => "Matched",
            SessionEvent::Failed(_) => "Failed",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransitionError {
    #[error("session already decided")]
    AlreadyDecided,
    #[error("event {event} is not valid in state {state}")]
    Invalid {
        state: &'static str,
        event: &'static str,
    },
}

#[derive(Debug)]
pub struct SessionStateMachine {
    state: SessionState,
    max_extraction_retries: u32,
    extraction_failures: u32,
}

impl SessionStateMachine {
    /// `max_extraction_retries` extraction failures are absorbed; the next
    /// one ends the session.
    pub fn new(max_extraction_retries: u32) -> Self {
        Self {
            state: SessionState::Idle,
            max_extraction_retries,
            extraction_failures: 0,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn extraction_failures(&self) -> u32 {
        self.extraction_failures
    }

    pub fn decision(&self) -> Option<&Decision> {
        match &self.state {
            SessionState::Decided(d) => Some(d),
            _ => None,
        }
    }

    /// Applies one event and returns the new state.
    pub fn apply(&mut self, event: SessionEvent) -> Result<&SessionState, TransitionError> {
        let next = self.next_state(event)?;
        self.state = next;
        Ok(&self.state)
    }

    fn next_state(&mut self, event: SessionEvent) -> Result<SessionState, TransitionError> {
        use SessionEvent as E;
        use SessionState as S;

        if self.state.is_decided() {
            return Err(TransitionError::AlreadyDecided);
        }

        let next = match (&self.state, event) {
            (_, E::Failed(error)) => S::Decided(Decision::Error(error)),
            (S::Idle, E::Started) => S::AwaitingFace,
            (S::AwaitingFace, E::NoValidFace) => S::AwaitingFace,
            (S::AwaitingFace, E::FaceFound) => S::FaceDetected,
            (S::FaceDetected, E::ExtractionStarted) => S::ExtractingFeatures,
            (S::ExtractingFeatures, E::ExtractionFailed { reason }) => {
                self.extraction_failures += 1;
                if self.extraction_failures > self.max_extraction_retries {
                    S::Decided(Decision::Error(
                        VerificationError::ExtractionRetriesExhausted {
                            attempts: self.extraction_failures,
                            last: reason,
                        },
                    ))
                } else {
                    S::AwaitingFace
                }
            }
            (S::ExtractingFeatures, E::Extracted) => S::Matching,
            (S::Matching, E::Matched(result)) => S::Decided(Decision::from_match(result)),
            (state, event) => {
                return Err(TransitionError::Invalid {
                    state: state.name(),
                    event: event.name(),
                })
            }
        };
        Ok(next)
    }
}
