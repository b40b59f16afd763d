use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::matching::domain::enrollment::SubjectId;

/// Per-session limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// How long the session may search for a usable face, counted from
    /// when the session is created.
    pub face_timeout_ms: u64,
    /// Extraction failures absorbed before the session gives up.
    pub max_extraction_retries: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            face_timeout_ms: 10_000,
            max_extraction_retries: 3,
        }
    }
}

impl SessionSettings {
    pub fn face_timeout(&self) -> Duration {
        Duration::from_millis(self.face_timeout_ms)
    }
}

/// What one session verifies and under which limits.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionConfig {
    /// Claimed identities. Empty searches every enrolled subject.
    pub subjects: Vec<SubjectId>,
    pub settings: SessionSettings,
}

impl SessionConfig {
    pub fn for_subject(subject: impl Into<SubjectId>, settings: SessionSettings) -> Self {
        Self {
            subjects: vec![subject.into()],
            settings,
        }
    }
}
