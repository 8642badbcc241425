//! Metrics registry: counters, gauges, ring-buffer histograms.

use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};

/// Observations kept per histogram; inserting is constant-time.
const HISTOGRAM_CAPACITY: usize = 1024;

/// Bounded ring buffer of raw observations.
#[derive(Debug, Default)]
struct Histogram {
    observations: VecDeque<f64>,
    total_count: u64,
}

impl Histogram {
    fn observe(&mut self, value: f64) {
        if self.observations.len() == HISTOGRAM_CAPACITY {
            self.observations.pop_front();
        }
        self.observations.push_back(value);
        self.total_count += 1;
    }

    fn summary(&self) -> HistogramSummary {
        let mut values: Vec<f64> = self.observations.iter().copied().collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let mean = if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        };
        HistogramSummary {
            count: self.total_count,
            mean,
            p50: percentile(&values, 50.0),
            p95: percentile(&values, 95.0),
        }
    }
}

fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let index = ((pct / 100.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted[index.min(sorted.len() - 1)]
}

/// Aggregate view of one histogram (over its retained window).
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSummary {
    /// Lifetime observation count, not just the retained window.
    pub count: u64,
    pub mean: f64,
    pub p50: f64,
    pub p95: f64,
}

/// Process-scoped metrics registry.
///
/// Series are keyed by `name{label="value",...}` in the order labels were
/// supplied; readers query with the same labels.
#[derive(Default)]
pub struct Metrics {
    counters: RwLock<HashMap<String, u64>>,
    gauges: RwLock<HashMap<String, f64>>,
    histograms: RwLock<HashMap<String, Histogram>>,
}

fn series_key(name: &str, labels: &[(&str, &str)]) -> String {
    if labels.is_empty() {
        return name.to_string();
    }
    let rendered: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, v))
        .collect();
    format!("{}{{{}}}", name, rendered.join(","))
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr_counter(&self, name: &str, labels: &[(&str, &str)]) {
        self.add_counter(name, labels, 1);
    }

    pub fn add_counter(&self, name: &str, labels: &[(&str, &str)], delta: u64) {
        let mut counters = self.counters.write();
        *counters.entry(series_key(name, labels)).or_insert(0) += delta;
    }

    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.counters
            .read()
            .get(&series_key(name, labels))
            .copied()
            .unwrap_or(0)
    }

    pub fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let mut gauges = self.gauges.write();
        gauges.insert(series_key(name, labels), value);
    }

    pub fn gauge(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        self.gauges.read().get(&series_key(name, labels)).copied()
    }

    pub fn observe(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let mut histograms = self.histograms.write();
        histograms
            .entry(series_key(name, labels))
            .or_default()
            .observe(value);
    }

    pub fn histogram(&self, name: &str, labels: &[(&str, &str)]) -> Option<HistogramSummary> {
        self.histograms
            .read()
            .get(&series_key(name, labels))
            .map(Histogram::summary)
    }

    /// All counter series, for debugging and snapshot endpoints.
    pub fn counter_series(&self) -> HashMap<String, u64> {
        self.counters.read().clone()
    }
}
