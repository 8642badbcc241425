//! Observability fabric for the urwa scraping core.
//!
//! Three pieces: trace-ID minting, a bounded structured-log buffer that
//! mirrors every record to `tracing`, and a metrics registry with counters,
//! gauges, and ring-buffer histograms. All of it is process-scoped state
//! passed explicitly through construction; tests build fresh instances.

mod health;
mod log;
mod metrics;
mod trace;

pub use health::{ComponentHealth, HealthSnapshot, HealthStatus};
pub use log::{EventLog, LogLevel, LogRecord};
pub use metrics::{HistogramSummary, Metrics};
pub use trace::new_trace_id;

/// Initialize a JSON `tracing` subscriber honoring `RUST_LOG`.
///
/// Intended for binaries embedding the engine; tests and libraries leave
/// subscriber installation to their harness.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .json()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
