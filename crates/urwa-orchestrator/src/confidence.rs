//! Post-hoc confidence scoring of successful results.

use urwa_types::{ConfidenceFactors, ConfidenceScore, FetchOutcome, Strategy};

// Factor weights: content volume, strategy discount, response quality,
// structured data, speed. They sum to 1.
const WEIGHTS: [f64; 5] = [0.3, 0.2, 0.2, 0.1, 0.2];

/// Pure scorer over a successful fetch outcome.
#[derive(Debug, Clone, Default)]
pub struct ConfidenceScorer;

impl ConfidenceScorer {
    /// Expected median latency per strategy, used by the speed factor.
    fn expected_median_ms(strategy: Strategy) -> f64 {
        match strategy {
            Strategy::Light => 1_000.0,
            Strategy::Stealth => 5_000.0,
            Strategy::Ultra => 15_000.0,
        }
    }

    pub fn score(&self, outcome: &FetchOutcome, strategy: Strategy) -> ConfidenceScore {
        let content = outcome.content.as_deref().unwrap_or(&[]);

        let content_length = content_length_factor(content.len());
        let strategy_weight = match strategy {
            Strategy::Light => 1.0,
            Strategy::Stealth => 0.9,
            Strategy::Ultra => 0.8,
        };
        let response_quality = match outcome.http_status {
            Some(200) if outcome.redirect_count > 3 => 0.6,
            Some(200) => 1.0,
            _ => 0.0,
        };
        let had_structured_data = if has_structured_data(content) { 1.0 } else { 0.0 };
        let speed = speed_factor(
            outcome.elapsed_ms as f64,
            Self::expected_median_ms(strategy),
        );

        let factors = ConfidenceFactors {
            content_length,
            strategy_weight,
            response_quality,
            had_structured_data,
            speed,
        };

        let overall = WEIGHTS[0] * content_length
            + WEIGHTS[1] * strategy_weight
            + WEIGHTS[2] * response_quality
            + WEIGHTS[3] * had_structured_data
            + WEIGHTS[4] * speed;

        let mut warnings = Vec::new();
        if content_length < 0.3 {
            warnings.push("content volume is low".to_string());
        }
        if strategy_weight < 0.3 {
            warnings.push("strategy heavily discounted".to_string());
        }
        if response_quality < 0.3 {
            warnings.push("response quality degraded".to_string());
        }
        if had_structured_data < 0.3 {
            warnings.push("no structured data detected".to_string());
        }
        if speed < 0.3 {
            warnings.push("response was slow for this strategy".to_string());
        }

        ConfidenceScore {
            overall: overall.clamp(0.0, 1.0),
            factors,
            warnings,
        }
    }
}

/// 0 at empty, 0.5 at 1 KiB, 1.0 at 8 KiB and beyond; linear between.
fn content_length_factor(len: usize) -> f64 {
    const KIB: f64 = 1024.0;
    let len = len as f64;
    if len <= 0.0 {
        0.0
    } else if len <= KIB {
        0.5 * (len / KIB)
    } else if len <= 8.0 * KIB {
        0.5 + 0.5 * ((len - KIB) / (7.0 * KIB))
    } else {
        1.0
    }
}

/// 1.0 at or under the expected median, decaying linearly to 0.2 at 4x.
fn speed_factor(elapsed_ms: f64, median_ms: f64) -> f64 {
    if elapsed_ms <= median_ms {
        1.0
    } else if elapsed_ms >= 4.0 * median_ms {
        0.2
    } else {
        1.0 - 0.8 * ((elapsed_ms - median_ms) / (3.0 * median_ms))
    }
}

fn has_structured_data(content: &[u8]) -> bool {
    let window = &content[..content.len().min(64 * 1024)];
    let text = String::from_utf8_lossy(window).to_lowercase();
    text.contains("application/ld+json")
        || text.contains("property=\"og:")
        || text.contains("property='og:")
        || text.contains("<table")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn outcome(content: &str, status: u16, elapsed_ms: u64, redirects: u32) -> FetchOutcome {
        FetchOutcome {
            success: true,
            content: Some(Bytes::from(content.to_string())),
            http_status: Some(status),
            elapsed_ms,
            redirect_count: redirects,
            ..Default::default()
        }
    }

    #[test]
    fn rich_fast_light_page_scores_high() {
        let body = format!(
            "<html><head><script type=\"application/ld+json\">{{}}</script></head><body>{}</body></html>",
            "substantial text ".repeat(600)
        );
        let score = ConfidenceScorer.score(&outcome(&body, 200, 300, 0), Strategy::Light);
        assert!(score.overall >= 0.9, "got {}", score.overall);
        assert!(score.warnings.is_empty());
    }

    #[test]
    fn content_length_factor_is_piecewise_linear() {
        assert_eq!(content_length_factor(0), 0.0);
        assert!((content_length_factor(1024) - 0.5).abs() < 1e-9);
        assert!((content_length_factor(512) - 0.25).abs() < 1e-9);
        assert_eq!(content_length_factor(8 * 1024), 1.0);
        assert_eq!(content_length_factor(100_000), 1.0);
    }

    #[test]
    fn speed_factor_decays_to_floor() {
        assert_eq!(speed_factor(500.0, 1000.0), 1.0);
        assert_eq!(speed_factor(4000.0, 1000.0), 0.2);
        assert_eq!(speed_factor(10_000.0, 1000.0), 0.2);
        let mid = speed_factor(2500.0, 1000.0);
        assert!(mid > 0.2 && mid < 1.0);
    }

    #[test]
    fn heavier_strategy_discounts() {
        let body = "x".repeat(10_000);
        let light = ConfidenceScorer.score(&outcome(&body, 200, 100, 0), Strategy::Light);
        let ultra = ConfidenceScorer.score(&outcome(&body, 200, 100, 0), Strategy::Ultra);
        assert!(light.overall > ultra.overall);
    }

    #[test]
    fn long_redirect_chain_degrades_quality() {
        let body = "x".repeat(10_000);
        let direct = ConfidenceScorer.score(&outcome(&body, 200, 100, 0), Strategy::Light);
        let bounced = ConfidenceScorer.score(&outcome(&body, 200, 100, 5), Strategy::Light);
        assert!(bounced.overall < direct.overall);
        assert_eq!(bounced.factors.response_quality, 0.6);
    }

    #[test]
    fn missing_structured_data_warns() {
        let body = "plain text only ".repeat(800);
        let score = ConfidenceScorer.score(&outcome(&body, 200, 100, 0), Strategy::Light);
        assert!(score
            .warnings
            .iter()
            .any(|w| w.contains("structured data")));
    }

    #[test]
    fn table_counts_as_structured_data() {
        assert!(has_structured_data(b"<html><table><tr></tr></table></html>"));
        assert!(has_structured_data(b"<meta property=\"og:title\" content=\"x\">"));
        assert!(!has_structured_data(b"<html><p>nothing special</p></html>"));
    }
}
