//! Bounded retry with exponential backoff.
//!
//! Retries transient failures only (connection errors, timeouts, 429, 5xx).
//! Other 4xx responses fail immediately. Once `max_retries` retries have
//! failed, the last transient failure surfaces as permanent.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::network_error::NetworkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub base_delay_ms: u64,
    /// Maximum delay cap.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 200,
            max_delay_ms: 5000,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt + 1`: `base * 2^attempt`, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(exp.min(self.max_delay_ms))
    }

    /// Runs `op` until it succeeds, fails permanently, or the budget runs out.
    ///
    /// `op` receives the zero-based attempt number and the time left before
    /// `deadline` (if any), which callers use to cap per-request timeouts.
    pub fn run<T, F>(
        &self,
        operation: &str,
        deadline: Option<(Instant, Duration)>,
        mut op: F,
    ) -> Result<T, NetworkError>
    where
        F: FnMut(u32, Option<Duration>) -> Result<T, NetworkError>,
    {
        let timed_out = |attempts: u32| match deadline {
            Some((_, budget)) => NetworkError::TimedOut { attempts, budget },
            None => NetworkError::TimedOut {
                attempts,
                budget: Duration::ZERO,
            },
        };

        let mut attempt = 0u32;
        loop {
            let remaining = match deadline {
                Some((at, _)) => match at.checked_duration_since(Instant::now()) {
                    Some(left) if !left.is_zero() => Some(left),
                    _ => return Err(timed_out(attempt)),
                },
                None => None,
            };

            let error = match op(attempt, remaining) {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            let attempts = attempt + 1;

            let (status, message, retry_after) = match error {
                NetworkError::Transient {
                    status,
                    message,
                    retry_after,
                } => (status, message, retry_after),
                NetworkError::Permanent {
                    status, message, ..
                } => {
                    return Err(NetworkError::Permanent {
                        status,
                        attempts,
                        message,
                    })
                }
                other => return Err(other),
            };

            if attempt >= self.max_retries {
                log::warn!("{operation} failed after {attempts} attempt(s): {message}");
                return Err(NetworkError::Permanent {
                    status,
                    attempts,
                    message,
                });
            }

            let delay = retry_after
                .map(|d| d.min(Duration::from_millis(self.max_delay_ms)))
                .unwrap_or_else(|| self.delay_for(attempt));
            if let Some((at, _)) = deadline {
                if Instant::now() + delay >= at {
                    return Err(timed_out(attempts));
                }
            }

            log::warn!(
                "{operation} attempt {attempts} failed, retrying in {}ms: {message}",
                delay.as_millis()
            );
            std::thread::sleep(delay);
            attempt += 1;
        }
    }
}
