//! Failure taxonomy.
//!
//! Every failure the core handles is one of these kinds. Fetchers classify
//! their own failures in-band; the runner, retry policy, circuit breakers,
//! and evidence capturer all key on the kind rather than on error strings.

use serde::{Deserialize, Serialize};

/// Closed set of failure modes.
///
/// The first group is produced by fetchers; the second group is produced by
/// the admission path (compliance, circuits, cost) and the engine itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    // Fetch-level failures
    Timeout,
    Connection,
    /// 401/403/451 - the site actively refused this URL.
    Http4xxBlocked,
    Http429,
    Http5xx,
    /// JS challenge, CAPTCHA, or Turnstile interstitial detected.
    Challenge,
    /// A 2xx response with no usable body.
    ParseEmpty,
    Unknown,

    // Process-level failures
    InvalidUrl,
    ComplianceDenied,
    CircuitOpen,
    CostExceeded,
    Cancelled,
    InternalError,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Connection => "connection",
            FailureKind::Http4xxBlocked => "http_4xx_blocked",
            FailureKind::Http429 => "http_429",
            FailureKind::Http5xx => "http_5xx",
            FailureKind::Challenge => "challenge",
            FailureKind::ParseEmpty => "parse_empty",
            FailureKind::Unknown => "unknown",
            FailureKind::InvalidUrl => "invalid_url",
            FailureKind::ComplianceDenied => "compliance_denied",
            FailureKind::CircuitOpen => "circuit_open",
            FailureKind::CostExceeded => "cost_exceeded",
            FailureKind::Cancelled => "cancelled",
            FailureKind::InternalError => "internal_error",
        }
    }

    /// Kinds that end the whole call immediately, regardless of remaining
    /// strategies.
    pub fn is_call_terminal(&self) -> bool {
        matches!(
            self,
            FailureKind::InvalidUrl
                | FailureKind::ComplianceDenied
                | FailureKind::CircuitOpen
                | FailureKind::CostExceeded
                | FailureKind::Cancelled
                | FailureKind::InternalError
        )
    }

    /// Kinds that count toward opening a circuit on consecutive failures.
    ///
    /// `Http4xxBlocked` is deliberately absent: one blocked URL is a
    /// URL-level problem, and the breaker tracks it separately across
    /// distinct URLs.
    pub fn counts_toward_circuit(&self) -> bool {
        matches!(
            self,
            FailureKind::Timeout
                | FailureKind::Connection
                | FailureKind::Http5xx
                | FailureKind::Http429
                | FailureKind::Challenge
        )
    }

    /// Kinds that warrant persisting evidence of the response.
    pub fn warrants_evidence(&self) -> bool {
        matches!(
            self,
            FailureKind::Challenge | FailureKind::Http4xxBlocked | FailureKind::Http429
        )
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_kinds() {
        assert!(FailureKind::ComplianceDenied.is_call_terminal());
        assert!(FailureKind::CircuitOpen.is_call_terminal());
        assert!(FailureKind::CostExceeded.is_call_terminal());
        assert!(FailureKind::Cancelled.is_call_terminal());
        assert!(!FailureKind::Challenge.is_call_terminal());
        assert!(!FailureKind::Http429.is_call_terminal());
    }

    #[test]
    fn circuit_relevant_kinds() {
        assert!(FailureKind::Timeout.counts_toward_circuit());
        assert!(FailureKind::Challenge.counts_toward_circuit());
        assert!(!FailureKind::Http4xxBlocked.counts_toward_circuit());
        assert!(!FailureKind::ParseEmpty.counts_toward_circuit());
    }

    #[test]
    fn serde_is_snake_case() {
        let json = serde_json::to_string(&FailureKind::Http4xxBlocked).unwrap();
        assert_eq!(json, "\"http_4xx_blocked\"");
    }
}
