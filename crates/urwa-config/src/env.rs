//! Environment variable overrides.
//!
//! Only operationally interesting knobs are exposed through the
//! environment; structural tuning stays in code or config files.

use crate::config::UrwaConfig;
use std::path::PathBuf;
use tracing::warn;

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env_string(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key = key, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}

fn env_bool(key: &str) -> Option<bool> {
    let raw = env_string(key)?;
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!(key = key, value = %raw, "Ignoring unparseable boolean override");
            None
        }
    }
}

pub(crate) fn apply_env_overrides(mut config: UrwaConfig) -> UrwaConfig {
    if let Some(ua) = env_string("URWA_USER_AGENT") {
        config.user_agent = ua;
    }
    if let Some(timeout) = env_parse::<u64>("URWA_DEFAULT_TIMEOUT_SECONDS") {
        config.default_timeout_seconds = timeout;
    }
    if let Some(respect) = env_bool("URWA_ROBOTS_RESPECT") {
        config.compliance.robots_respect = respect;
    }
    if let Some(allow) = env_bool("URWA_SSRF_ALLOW_PRIVATE") {
        config.ssrf_allow_private = allow;
    }
    if let Some(path) = env_string("URWA_JOURNAL_PATH") {
        config.learner.journal_path = Some(PathBuf::from(path));
    }
    if let Some(dir) = env_string("URWA_EVIDENCE_DIR") {
        config.evidence.dir = Some(PathBuf::from(dir));
    }
    if let Some(delay) = env_parse::<f64>("URWA_RATE_DEFAULT_DELAY_SECONDS") {
        config.rate.default_delay_seconds = delay;
    }
    if let Some(requests) = env_parse::<u64>("URWA_COST_MAX_REQUESTS_PER_HOUR") {
        config.cost.hour_ceilings.requests = requests;
    }
    if let Some(blacklist) = env_string("URWA_BLACKLIST") {
        config.compliance.blacklist = blacklist
            .split(',')
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect();
    }
    config
}
