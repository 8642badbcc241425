//! Site profile types.

use crate::strategy::Strategy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

/// Protection level assigned to a domain by the profiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Risk {
    Low,
    Medium,
    High,
    Extreme,
}

impl Risk {
    pub fn as_str(&self) -> &'static str {
        match self {
            Risk::Low => "low",
            Risk::Medium => "medium",
            Risk::High => "high",
            Risk::Extreme => "extreme",
        }
    }
}

impl std::fmt::Display for Risk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Protection mechanisms observed during profiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protection {
    JsRequired,
    CloudflareLike,
    CaptchaLikely,
    LoginWall,
    RateLimitSignal,
}

/// Cached classification of a domain's defenses.
#[derive(Debug, Clone)]
pub struct SiteProfile {
    pub domain: String,
    pub risk: Risk,
    /// Advisory weighted score in [0, 100]; the risk ladder is normative.
    pub risk_score: u8,
    pub protections: BTreeSet<Protection>,
    pub recommended_strategy: Strategy,
    pub recommended_delay_seconds: f64,
    pub computed_at: Instant,
    pub ttl: Duration,
}

impl SiteProfile {
    pub fn is_expired(&self) -> bool {
        self.computed_at.elapsed() > self.ttl
    }

    /// Fallback profile used when a probe could not run (peer probe wait
    /// expired, probe disabled). Not cached by the profiler.
    pub fn assumed_medium(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            risk: Risk::Medium,
            risk_score: 50,
            protections: BTreeSet::new(),
            recommended_strategy: Strategy::Stealth,
            recommended_delay_seconds: 3.0,
            computed_at: Instant::now(),
            ttl: Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assumed_medium_expires_immediately() {
        let profile = SiteProfile::assumed_medium("example.com");
        assert_eq!(profile.risk, Risk::Medium);
        assert!(profile.is_expired());
    }
}
