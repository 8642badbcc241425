//! Per-(domain, strategy) outcome statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome counters for one strategy on one domain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyStat {
    pub attempts: u64,
    pub successes: u64,
    pub avg_response_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<DateTime<Utc>>,
}

impl StrategyStat {
    /// Minimum attempts before a strategy's success rate is believed.
    pub const TRUST_MIN_ATTEMPTS: u64 = 5;
    /// Minimum success rate for a trusted strategy.
    pub const TRUST_MIN_SUCCESS_RATE: f64 = 0.6;

    pub fn success_rate(&self) -> f64 {
        self.successes as f64 / (self.attempts.max(1)) as f64
    }

    /// A strategy is trusted once it has enough history and a good enough
    /// success rate. The attempt floor prevents cold-start bias.
    pub fn is_trusted(&self) -> bool {
        self.attempts >= Self::TRUST_MIN_ATTEMPTS
            && self.success_rate() >= Self::TRUST_MIN_SUCCESS_RATE
    }

    /// Fold one observed outcome into the counters.
    pub fn record(&mut self, success: bool, elapsed_ms: Option<u64>) {
        self.attempts += 1;
        if success {
            self.successes += 1;
            self.last_success_at = Some(Utc::now());
        }
        if let Some(ms) = elapsed_ms {
            // Running mean over all attempts that reported a latency.
            if self.avg_response_ms == 0.0 {
                self.avg_response_ms = ms as f64;
            } else {
                self.avg_response_ms = (self.avg_response_ms + ms as f64) / 2.0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trust_requires_history() {
        let mut stat = StrategyStat::default();
        for _ in 0..4 {
            stat.record(true, Some(100));
        }
        assert!(!stat.is_trusted(), "4 attempts is not enough history");
        stat.record(true, Some(100));
        assert!(stat.is_trusted());
    }

    #[test]
    fn trust_requires_success_rate() {
        let mut stat = StrategyStat::default();
        for i in 0..10 {
            stat.record(i % 2 == 0, None);
        }
        assert_eq!(stat.attempts, 10);
        assert!(!stat.is_trusted(), "50% success rate is below the bar");
    }

    #[test]
    fn successes_never_exceed_attempts() {
        let mut stat = StrategyStat::default();
        for i in 0..50 {
            stat.record(i % 3 != 0, Some(10 * i));
        }
        assert!(stat.successes <= stat.attempts);
    }
}
