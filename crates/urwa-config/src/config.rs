//! Engine configuration structs and defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use urwa_types::{Strategy, UrwaError};

/// Per-strategy fetch timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyTimeouts {
    pub light_seconds: u64,
    pub stealth_seconds: u64,
    pub ultra_seconds: u64,
}

impl Default for StrategyTimeouts {
    fn default() -> Self {
        Self {
            light_seconds: 15,
            stealth_seconds: 45,
            ultra_seconds: 120,
        }
    }
}

impl StrategyTimeouts {
    pub fn for_strategy(&self, strategy: Strategy) -> Duration {
        let seconds = match strategy {
            Strategy::Light => self.light_seconds,
            Strategy::Stealth => self.stealth_seconds,
            Strategy::Ultra => self.ultra_seconds,
        };
        Duration::from_secs(seconds)
    }
}

/// Per-domain pacing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateConfig {
    /// Starting delay between requests to one domain.
    pub default_delay_seconds: f64,
    /// Floor for the adaptive delay.
    pub min_delay_seconds: f64,
    /// Ceiling for the adaptive delay.
    pub max_delay_seconds: f64,
    /// Domains idle longer than this get their rate state evicted.
    pub stale_after_seconds: u64,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            default_delay_seconds: 1.0,
            min_delay_seconds: 0.5,
            max_delay_seconds: 60.0,
            stale_after_seconds: 3600,
        }
    }
}

/// Per-domain circuit breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitConfig {
    /// Consecutive counted failures before the circuit opens.
    pub failure_threshold: u32,
    /// Cooldown before an open circuit admits trial requests.
    pub recovery_timeout_seconds: u64,
    /// Concurrent trial requests allowed in half-open state.
    pub half_open_max: u32,
    /// Distinct blocked URLs within the window that open the circuit.
    pub blocked_url_threshold: usize,
    /// Window for counting distinct blocked URLs.
    pub blocked_url_window_seconds: u64,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_seconds: 300,
            half_open_max: 3,
            blocked_url_threshold: 3,
            blocked_url_window_seconds: 600,
        }
    }
}

/// Recommended per-domain pacing by risk tier, seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskDelayTable {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub extreme: f64,
}

impl Default for RiskDelayTable {
    fn default() -> Self {
        Self {
            low: 1.0,
            medium: 3.0,
            high: 5.0,
            extreme: 10.0,
        }
    }
}

/// Site profiler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub ttl_seconds: u64,
    /// Shortened TTL for extreme-risk domains.
    pub extreme_ttl_seconds: u64,
    /// How long peers wait on an in-flight probe before assuming medium.
    pub probe_wait_seconds: u64,
    /// Truncation limit for the probe body.
    pub probe_max_bytes: usize,
    /// Profile cache capacity; oldest entries evicted beyond this.
    pub max_entries: usize,
    /// Risk-indexed pacing recommendations.
    pub risk_delay_seconds: RiskDelayTable,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 21_600,
            extreme_ttl_seconds: 900,
            probe_wait_seconds: 30,
            probe_max_bytes: 32 * 1024,
            max_entries: 4096,
            risk_delay_seconds: RiskDelayTable::default(),
        }
    }
}

/// Result cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 3600,
            max_entries: 2048,
        }
    }
}

/// Evidence store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceConfig {
    /// Root directory for evidence artifacts; `None` disables capture.
    pub dir: Option<PathBuf>,
    pub retention_count: usize,
    pub body_excerpt_bytes: usize,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            dir: None,
            retention_count: 500,
            body_excerpt_bytes: 4096,
        }
    }
}

/// Rolling-hour ceilings for the cost controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostCeilings {
    pub llm_tokens: u64,
    pub browser_minutes: f64,
    pub requests: u64,
    pub usd: f64,
}

impl Default for CostCeilings {
    fn default() -> Self {
        Self {
            llm_tokens: 100_000,
            browser_minutes: 60.0,
            requests: 1000,
            usd: 1.0,
        }
    }
}

/// Cost controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostConfig {
    pub hour_ceilings: CostCeilings,
    /// Estimated USD charged per request, per strategy.
    pub usd_per_request_light: f64,
    pub usd_per_request_stealth: f64,
    pub usd_per_request_ultra: f64,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            hour_ceilings: CostCeilings::default(),
            usd_per_request_light: 0.0001,
            usd_per_request_stealth: 0.001,
            usd_per_request_ultra: 0.005,
        }
    }
}

/// Compliance gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceConfig {
    pub robots_respect: bool,
    pub robots_cache_ttl_seconds: u64,
    /// Shorter TTL for failed robots fetches (cached as permissive).
    pub robots_failure_ttl_seconds: u64,
    pub robots_fetch_timeout_seconds: u64,
    /// Domains denied outright.
    pub blacklist: Vec<String>,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            robots_respect: true,
            robots_cache_ttl_seconds: 86_400,
            robots_failure_ttl_seconds: 3600,
            robots_fetch_timeout_seconds: 10,
            blacklist: Vec::new(),
        }
    }
}

/// Adaptive learner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerConfig {
    /// Journal path; `None` keeps learning in-memory only.
    pub journal_path: Option<PathBuf>,
    /// Compact when journal lines exceed this multiple of the live set.
    pub compact_multiplier: usize,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            journal_path: None,
            compact_multiplier: 10,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrwaConfig {
    pub user_agent: String,
    pub default_timeout_seconds: u64,
    pub ssrf_allow_private: bool,
    pub log_buffer_capacity: usize,
    pub strategy_timeouts: StrategyTimeouts,
    pub rate: RateConfig,
    pub circuit: CircuitConfig,
    pub profile: ProfileConfig,
    pub cache: CacheConfig,
    pub evidence: EvidenceConfig,
    pub cost: CostConfig,
    pub compliance: ComplianceConfig,
    pub learner: LearnerConfig,
}

impl Default for UrwaConfig {
    fn default() -> Self {
        Self {
            user_agent: "UrwaBot/1.0".to_string(),
            default_timeout_seconds: 180,
            ssrf_allow_private: false,
            log_buffer_capacity: 2048,
            strategy_timeouts: StrategyTimeouts::default(),
            rate: RateConfig::default(),
            circuit: CircuitConfig::default(),
            profile: ProfileConfig::default(),
            cache: CacheConfig::default(),
            evidence: EvidenceConfig::default(),
            cost: CostConfig::default(),
            compliance: ComplianceConfig::default(),
            learner: LearnerConfig::default(),
        }
    }
}

impl UrwaConfig {
    /// Defaults layered with `URWA_*` environment overrides.
    pub fn from_env() -> Self {
        crate::env::apply_env_overrides(Self::default())
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), UrwaError> {
        if self.user_agent.trim().is_empty() {
            return Err(UrwaError::configuration("user_agent must not be empty"));
        }
        if self.default_timeout_seconds == 0 {
            return Err(UrwaError::configuration(
                "default_timeout_seconds must be greater than 0",
            ));
        }
        if self.rate.min_delay_seconds <= 0.0
            || self.rate.max_delay_seconds < self.rate.min_delay_seconds
        {
            return Err(UrwaError::configuration(
                "rate delays must satisfy 0 < min_delay <= max_delay",
            ));
        }
        if !(self.rate.min_delay_seconds..=self.rate.max_delay_seconds)
            .contains(&self.rate.default_delay_seconds)
        {
            return Err(UrwaError::configuration(
                "rate default_delay must be within [min_delay, max_delay]",
            ));
        }
        if self.circuit.failure_threshold == 0 || self.circuit.half_open_max == 0 {
            return Err(UrwaError::configuration(
                "circuit thresholds must be greater than 0",
            ));
        }
        if self.profile.probe_max_bytes == 0 {
            return Err(UrwaError::configuration(
                "profile probe_max_bytes must be greater than 0",
            ));
        }
        if self.learner.compact_multiplier < 2 {
            return Err(UrwaError::configuration(
                "learner compact_multiplier must be at least 2",
            ));
        }
        Ok(())
    }
}
