//! Configuration for the urwa scraping core.
//!
//! Every tunable recognized by the engine lives here, grouped per concern,
//! with defaults matching production behavior. `UrwaConfig::from_env()`
//! layers `URWA_*` environment overrides on top of the defaults, and
//! `validate()` runs at engine construction.

mod config;
mod env;
mod validation;

pub use config::{
    CacheConfig, CircuitConfig, ComplianceConfig, CostCeilings, CostConfig, EvidenceConfig,
    LearnerConfig, ProfileConfig, RateConfig, RiskDelayTable, StrategyTimeouts, UrwaConfig,
};
pub use validation::{RequestValidator, ValidationError};
