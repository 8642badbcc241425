//! Per-domain circuit breakers.
//!
//! State machine per domain: Closed counts consecutive failures of the
//! kinds that indicate a site-level problem; Open rejects until the
//! recovery cooldown elapses; HalfOpen admits a bounded number of
//! concurrent trial requests through semaphore permits. A single blocked
//! URL never opens a circuit by itself, but several distinct blocked URLs
//! on one domain within a short window do.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{info, warn};
use urwa_config::CircuitConfig;
use urwa_types::{Clock, FailureKind};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    consecutive_failures: u32,
    successes_in_half_open: u32,
    /// Set iff state is Open.
    opened_at_ms: Option<u64>,
    /// Distinct blocked URLs seen recently: (url, observed_at_ms).
    blocked_urls: VecDeque<(String, u64)>,
}

impl Default for CircuitInner {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            successes_in_half_open: 0,
            opened_at_ms: None,
            blocked_urls: VecDeque::new(),
        }
    }
}

/// Telemetry view of one domain's circuit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitSnapshot {
    pub domain: String,
    pub state: CircuitState,
    pub failure_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opened_at_ms: Option<u64>,
}

/// Circuit breaker for a single domain.
pub struct DomainCircuit {
    domain: String,
    inner: Mutex<CircuitInner>,
    half_open_permits: Arc<Semaphore>,
    config: CircuitConfig,
    clock: Arc<dyn Clock>,
}

impl DomainCircuit {
    fn new(domain: String, config: CircuitConfig, clock: Arc<dyn Clock>) -> Self {
        let permits = config.half_open_max as usize;
        Self {
            domain,
            inner: Mutex::new(CircuitInner::default()),
            half_open_permits: Arc::new(Semaphore::new(permits)),
            config,
            clock,
        }
    }

    pub fn state(&self) -> CircuitState {
        // Surface the pending Open -> HalfOpen transition without mutating.
        let inner = self.inner.lock();
        match inner.state {
            CircuitState::Open if self.cooldown_elapsed(&inner) => CircuitState::HalfOpen,
            state => state,
        }
    }

    fn cooldown_elapsed(&self, inner: &CircuitInner) -> bool {
        match inner.opened_at_ms {
            Some(opened_at) => {
                self.clock.now_ms().saturating_sub(opened_at)
                    >= self.config.recovery_timeout_seconds * 1000
            }
            None => false,
        }
    }

    /// Whether a request would currently be admitted.
    pub fn can_execute(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => self.half_open_permits.available_permits() > 0,
        }
    }

    /// Acquire permission to execute.
    ///
    /// Returns a half-open trial permit when in HalfOpen; `None` in Closed.
    /// The permit must live for the duration of the attempt so the
    /// concurrent-trial bound holds.
    pub fn try_acquire(&self) -> Result<Option<OwnedSemaphorePermit>, ()> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Ok(None),
            CircuitState::Open => {
                if self.cooldown_elapsed(&inner) {
                    info!(domain = %self.domain, "Circuit transitioning to half-open");
                    inner.state = CircuitState::HalfOpen;
                    inner.opened_at_ms = None;
                    inner.successes_in_half_open = 0;
                    self.reset_permits_to_target();
                } else {
                    return Err(());
                }
                match Arc::clone(&self.half_open_permits).try_acquire_owned() {
                    Ok(permit) => Ok(Some(permit)),
                    Err(_) => Err(()),
                }
            }
            CircuitState::HalfOpen => match Arc::clone(&self.half_open_permits).try_acquire_owned()
            {
                Ok(permit) => Ok(Some(permit)),
                Err(_) => Err(()),
            },
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.successes_in_half_open += 1;
                // First trial success closes the circuit and resets history.
                info!(domain = %self.domain, "Circuit closing after successful trial");
                inner.state = CircuitState::Closed;
                inner.consecutive_failures = 0;
                inner.successes_in_half_open = 0;
                inner.blocked_urls.clear();
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self, kind: FailureKind, url: &str) {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();

        if kind == FailureKind::Http4xxBlocked {
            self.note_blocked_url(&mut inner, url, now);
            return;
        }

        if !kind.counts_toward_circuit() {
            return;
        }

        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        domain = %self.domain,
                        failures = inner.consecutive_failures,
                        kind = %kind,
                        "Circuit opened after consecutive failures"
                    );
                    self.trip_open(&mut inner, now);
                }
            }
            CircuitState::HalfOpen => {
                warn!(domain = %self.domain, kind = %kind, "Circuit reopening after failed trial");
                self.trip_open(&mut inner, now);
            }
            CircuitState::Open => {}
        }
    }

    fn note_blocked_url(&self, inner: &mut CircuitInner, url: &str, now: u64) {
        let window_ms = self.config.blocked_url_window_seconds * 1000;
        while let Some((_, at)) = inner.blocked_urls.front() {
            if now.saturating_sub(*at) > window_ms {
                inner.blocked_urls.pop_front();
            } else {
                break;
            }
        }
        if !inner.blocked_urls.iter().any(|(u, _)| u == url) {
            inner.blocked_urls.push_back((url.to_string(), now));
        }
        // Trips from HalfOpen too: a site blocking distinct URLs across
        // trial requests must reopen, not sit in HalfOpen admitting more.
        if inner.blocked_urls.len() >= self.config.blocked_url_threshold
            && inner.state != CircuitState::Open
        {
            warn!(
                domain = %self.domain,
                distinct_urls = inner.blocked_urls.len(),
                "Circuit opened: multiple distinct URLs blocked"
            );
            self.trip_open(inner, now);
        }
    }

    fn trip_open(&self, inner: &mut CircuitInner, now: u64) {
        inner.state = CircuitState::Open;
        inner.opened_at_ms = Some(now);
        inner.consecutive_failures = 0;
        inner.successes_in_half_open = 0;
    }

    /// Bring available trial permits back to `half_open_max`. Called only
    /// on the Open -> HalfOpen transition, so permits returned by stale
    /// trial guards cannot accumulate across cycles.
    fn reset_permits_to_target(&self) {
        let target = self.config.half_open_max as usize;
        let available = self.half_open_permits.available_permits();
        if available < target {
            self.half_open_permits.add_permits(target - available);
        } else if available > target {
            if let Ok(excess) = self
                .half_open_permits
                .try_acquire_many((available - target) as u32)
            {
                excess.forget();
            }
        }
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.inner.lock();
        CircuitSnapshot {
            domain: self.domain.clone(),
            state: inner.state,
            failure_count: inner.consecutive_failures,
            opened_at_ms: inner.opened_at_ms,
        }
    }
}

/// Domain-keyed circuit registry owned by the engine.
pub struct CircuitBreakerRegistry {
    circuits: DashMap<String, Arc<DomainCircuit>>,
    config: CircuitConfig,
    clock: Arc<dyn Clock>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            circuits: DashMap::new(),
            config,
            clock,
        }
    }

    pub fn circuit(&self, domain: &str) -> Arc<DomainCircuit> {
        self.circuits
            .entry(domain.to_string())
            .or_insert_with(|| {
                Arc::new(DomainCircuit::new(
                    domain.to_string(),
                    self.config.clone(),
                    self.clock.clone(),
                ))
            })
            .clone()
    }

    pub fn snapshots(&self) -> Vec<CircuitSnapshot> {
        self.circuits
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default, Debug)]
    struct TestClock {
        now: AtomicU64,
    }

    impl TestClock {
        fn advance(&self, ms: u64) {
            self.now.fetch_add(ms, Ordering::Relaxed);
        }
    }

    impl Clock for TestClock {
        fn now_ms(&self) -> u64 {
            self.now.load(Ordering::Relaxed)
        }
    }

    fn circuit_with(
        threshold: u32,
        recovery_seconds: u64,
        half_open_max: u32,
    ) -> (DomainCircuit, Arc<TestClock>) {
        let clock = Arc::new(TestClock::default());
        let config = CircuitConfig {
            failure_threshold: threshold,
            recovery_timeout_seconds: recovery_seconds,
            half_open_max,
            ..CircuitConfig::default()
        };
        (
            DomainCircuit::new("example.com".to_string(), config, clock.clone()),
            clock,
        )
    }

    #[test]
    fn opens_after_consecutive_counted_failures() {
        let (cb, _clock) = circuit_with(3, 300, 3);
        assert!(cb.can_execute());

        cb.record_failure(FailureKind::Timeout, "https://example.com/a");
        cb.record_failure(FailureKind::Connection, "https://example.com/a");
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure(FailureKind::Http5xx, "https://example.com/a");
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.can_execute());
        assert!(cb.try_acquire().is_err());
    }

    #[test]
    fn success_resets_consecutive_count() {
        let (cb, _clock) = circuit_with(3, 300, 3);
        cb.record_failure(FailureKind::Timeout, "u");
        cb.record_failure(FailureKind::Timeout, "u");
        cb.record_success();
        cb.record_failure(FailureKind::Timeout, "u");
        cb.record_failure(FailureKind::Timeout, "u");
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn recovers_through_half_open() {
        let (cb, clock) = circuit_with(2, 5, 2);
        cb.record_failure(FailureKind::Timeout, "u");
        cb.record_failure(FailureKind::Timeout, "u");
        assert_eq!(cb.state(), CircuitState::Open);

        clock.advance(5_000);
        let permit = cb.try_acquire().expect("trial admitted");
        assert!(permit.is_some());
        assert_eq!(cb.snapshot().state, CircuitState::HalfOpen);

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let (cb, clock) = circuit_with(1, 5, 1);
        cb.record_failure(FailureKind::Timeout, "u");
        assert_eq!(cb.state(), CircuitState::Open);

        clock.advance(5_000);
        let _permit = cb.try_acquire().expect("trial admitted");
        cb.record_failure(FailureKind::Timeout, "u");
        assert_eq!(cb.snapshot().state, CircuitState::Open);
        assert!(cb.try_acquire().is_err());

        clock.advance(5_000);
        assert!(cb.try_acquire().is_ok());
    }

    #[test]
    fn half_open_bounds_concurrent_trials() {
        let (cb, clock) = circuit_with(1, 1, 2);
        cb.record_failure(FailureKind::Challenge, "u");
        clock.advance(1_000);

        let p1 = cb.try_acquire().expect("first trial");
        assert!(p1.is_some());
        let p2 = cb.try_acquire().expect("second trial");
        assert!(p2.is_some());
        assert!(cb.try_acquire().is_err(), "third concurrent trial rejected");

        drop(p1);
        assert!(cb.try_acquire().is_ok());
    }

    #[test]
    fn single_blocked_url_does_not_open() {
        let (cb, _clock) = circuit_with(5, 300, 3);
        for _ in 0..10 {
            cb.record_failure(FailureKind::Http4xxBlocked, "https://example.com/only");
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn distinct_blocked_urls_open_within_window() {
        let (cb, _clock) = circuit_with(5, 300, 3);
        cb.record_failure(FailureKind::Http4xxBlocked, "https://example.com/a");
        cb.record_failure(FailureKind::Http4xxBlocked, "https://example.com/b");
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure(FailureKind::Http4xxBlocked, "https://example.com/c");
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn distinct_blocked_urls_reopen_half_open_circuit() {
        let (cb, clock) = circuit_with(1, 5, 3);
        cb.record_failure(FailureKind::Timeout, "https://example.com/a");
        assert_eq!(cb.state(), CircuitState::Open);

        clock.advance(5_000);
        let _permit = cb.try_acquire().expect("trial admitted");
        assert_eq!(cb.snapshot().state, CircuitState::HalfOpen);

        // Trials keep getting blocked on distinct URLs; the third one
        // must reopen the circuit rather than leave it half-open.
        cb.record_failure(FailureKind::Http4xxBlocked, "https://example.com/a");
        cb.record_failure(FailureKind::Http4xxBlocked, "https://example.com/b");
        assert_eq!(cb.snapshot().state, CircuitState::HalfOpen);
        cb.record_failure(FailureKind::Http4xxBlocked, "https://example.com/c");
        assert_eq!(cb.snapshot().state, CircuitState::Open);
        assert!(cb.try_acquire().is_err());
    }

    #[test]
    fn blocked_url_window_expires() {
        let (cb, clock) = circuit_with(5, 300, 3);
        cb.record_failure(FailureKind::Http4xxBlocked, "https://example.com/a");
        cb.record_failure(FailureKind::Http4xxBlocked, "https://example.com/b");
        clock.advance(601_000);
        cb.record_failure(FailureKind::Http4xxBlocked, "https://example.com/c");
        assert_eq!(cb.state(), CircuitState::Closed, "window slid past a and b");
    }

    #[test]
    fn uncounted_kinds_never_trip() {
        let (cb, _clock) = circuit_with(2, 300, 3);
        for _ in 0..10 {
            cb.record_failure(FailureKind::ParseEmpty, "u");
            cb.record_failure(FailureKind::Unknown, "u");
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn registry_isolates_domains() {
        let clock = Arc::new(TestClock::default());
        let registry = CircuitBreakerRegistry::new(
            CircuitConfig {
                failure_threshold: 1,
                ..CircuitConfig::default()
            },
            clock,
        );
        registry
            .circuit("down.example")
            .record_failure(FailureKind::Timeout, "u");
        assert!(!registry.circuit("down.example").can_execute());
        assert!(registry.circuit("up.example").can_execute());
        assert_eq!(registry.snapshots().len(), 2);
    }
}
