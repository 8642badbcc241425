//! Failure-kind-typed retry policy.
//!
//! Decides whether a failed attempt is worth retrying on the *same*
//! strategy before the runner escalates to the next one. Backoffs are
//! additive to rate-controller pacing and jittered ±20%.

use rand::Rng;
use std::time::Duration;
use urwa_types::FailureKind;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the same strategy after sleeping this long.
    Retry(Duration),
    /// Give up on this strategy; move to the next in the order.
    Escalate,
    /// Stop the whole call.
    Terminal,
}

/// Retry policy keyed on `FailureKind`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { jitter: 0.2 }
    }
}

impl RetryPolicy {
    pub fn new(jitter: f64) -> Self {
        Self {
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    /// Decide the fate of an attempt.
    ///
    /// `attempt_in_strategy` counts prior attempts of the current strategy
    /// (0 for the first failure), `retry_after` is the parsed server hint
    /// for 429s, `strategy_timeout` feeds the timeout backoff.
    pub fn decide(
        &self,
        kind: FailureKind,
        attempt_in_strategy: u32,
        retry_after: Option<Duration>,
        strategy_timeout: Duration,
    ) -> RetryDecision {
        let backoff = match kind {
            FailureKind::Timeout => match attempt_in_strategy {
                0 => Some(strategy_timeout.mul_f64(0.5)),
                _ => None,
            },
            FailureKind::Connection => match attempt_in_strategy {
                0 => Some(Duration::from_secs(1)),
                1 => Some(Duration::from_secs(2)),
                _ => None,
            },
            FailureKind::Http429 => match attempt_in_strategy {
                0 | 1 => Some(retry_after.unwrap_or_else(|| {
                    Duration::from_secs(5 * (attempt_in_strategy as u64 + 1))
                })),
                _ => None,
            },
            FailureKind::Http5xx => match attempt_in_strategy {
                0 => Some(Duration::from_secs(2)),
                _ => None,
            },
            FailureKind::Challenge
            | FailureKind::Http4xxBlocked
            | FailureKind::ParseEmpty
            | FailureKind::Unknown => return RetryDecision::Escalate,
            _ => return RetryDecision::Terminal,
        };

        match backoff {
            Some(duration) => RetryDecision::Retry(self.apply_jitter(duration)),
            None => RetryDecision::Escalate,
        }
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.jitter == 0.0 || duration.is_zero() {
            return duration;
        }
        let spread = duration.as_secs_f64() * self.jitter;
        let offset = rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_secs_f64((duration.as_secs_f64() + offset).max(0.0))
    }
}

/// Parse a `Retry-After` header value: delta-seconds or HTTP-date.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let when = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = when.signed_duration_since(chrono::Utc::now());
    delta.to_std().ok()
}
