//! Scrape request and result types.

use crate::confidence::ConfidenceScore;
use crate::failure::FailureKind;
use crate::strategy::Strategy;
use serde::{Deserialize, Serialize};

/// An immutable scrape request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeRequest {
    /// Absolute HTTP/HTTPS URL to scrape.
    pub url: String,
    /// Opaque user instruction, passed through to downstream consumers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Pin the strategy instead of letting selection choose.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_strategy: Option<Strategy>,
    /// Overall call deadline in seconds (default 180).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    /// Skip the result cache for this call.
    #[serde(default)]
    pub bypass_cache: bool,
}

impl ScrapeRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            hint: None,
            force_strategy: None,
            timeout_seconds: None,
            bypass_cache: false,
        }
    }

    pub fn with_force_strategy(mut self, strategy: Strategy) -> Self {
        self.force_strategy = Some(strategy);
        self
    }

    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    pub fn bypassing_cache(mut self) -> Self {
        self.bypass_cache = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeStatus {
    Success,
    Error,
}

/// The emitted result of a scrape call.
///
/// `status == Success` implies `content` and `strategy_used` are present;
/// `status == Error` implies `failure_kind` is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeResult {
    pub status: ScrapeStatus,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_used: Option<Strategy>,
    pub attempts: u32,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<ConfidenceScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    pub trace_id: String,
    #[serde(default)]
    pub from_cache: bool,
}

impl ScrapeResult {
    /// Build an error result for a terminal failure.
    pub fn error(
        url: impl Into<String>,
        kind: FailureKind,
        attempts: u32,
        elapsed_ms: u64,
        trace_id: impl Into<String>,
    ) -> Self {
        Self {
            status: ScrapeStatus::Error,
            url: url.into(),
            final_url: None,
            content: None,
            content_length: None,
            strategy_used: None,
            attempts,
            elapsed_ms,
            confidence: None,
            failure_kind: Some(kind),
            trace_id: trace_id.into(),
            from_cache: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ScrapeStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_result_carries_kind() {
        let result = ScrapeResult::error(
            "https://example.com/",
            FailureKind::CircuitOpen,
            0,
            5,
            "abc123",
        );
        assert!(!result.is_success());
        assert_eq!(result.failure_kind, Some(FailureKind::CircuitOpen));
        assert_eq!(result.attempts, 0);
    }

    #[test]
    fn request_builder() {
        let req = ScrapeRequest::new("https://example.com/")
            .with_force_strategy(Strategy::Ultra)
            .bypassing_cache();
        assert_eq!(req.force_strategy, Some(Strategy::Ultra));
        assert!(req.bypass_cache);
    }
}
