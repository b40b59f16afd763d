use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::retry::RetryPolicy;

/// Connection settings for the verification service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Service root, e.g. `https://verify.example.com/`. Unset disables
    /// the remote path.
    pub base_url: Option<String>,
    /// Per-attempt HTTP timeout.
    pub request_timeout_ms: u64,
    /// Total time one call may spend across all attempts and backoff.
    pub network_timeout_ms: u64,
    pub retry: RetryPolicy,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout_ms: 10_000,
            network_timeout_ms: 30_000,
            retry: RetryPolicy::default(),
        }
    }
}

impl RemoteConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_millis(self.network_timeout_ms)
    }
}
