//! Health snapshot types for the engine's health query.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum HealthStatus {
    Healthy,
    Degraded { detail: String },
    Unhealthy { error: String },
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    #[serde(flatten)]
    pub status: HealthStatus,
}

/// Point-in-time health view assembled by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub healthy: bool,
    pub components: BTreeMap<String, HealthStatus>,
}

impl HealthSnapshot {
    pub fn from_components(components: BTreeMap<String, HealthStatus>) -> Self {
        let healthy = components.values().all(HealthStatus::is_healthy);
        Self {
            healthy,
            components,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_aggregates_component_health() {
        let mut components = BTreeMap::new();
        components.insert("journal".to_string(), HealthStatus::Healthy);
        components.insert(
            "evidence".to_string(),
            HealthStatus::Degraded {
                detail: "capture disabled".to_string(),
            },
        );
        let snapshot = HealthSnapshot::from_components(components);
        assert!(!snapshot.healthy);
    }
}
