//! Confidence score attached to successful results.

use serde::{Deserialize, Serialize};

/// Per-factor breakdown of a confidence score. Each factor is in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceFactors {
    pub content_length: f64,
    pub strategy_weight: f64,
    pub response_quality: f64,
    pub had_structured_data: f64,
    pub speed: f64,
}

/// Post-hoc quality score for a scrape result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceScore {
    /// Weighted mean of the factors, in [0, 1].
    pub overall: f64,
    pub factors: ConfidenceFactors,
    /// One warning per factor that scored below 0.3.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}
