//! Per-domain adaptive request pacing.
//!
//! Each domain owns a delay that adapts to what the site tolerates:
//! doubled on 429, nudged up on timeouts, decayed gently on success.
//! Acquiring a slot reserves the next launch instant under the domain lock
//! and sleeps outside it, so concurrent callers to one domain serialize at
//! the current delay spacing while other domains proceed untouched.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use urwa_config::RateConfig;
use urwa_types::{FailureKind, FetchOutcome, Interrupted, ScrapeContext};

#[derive(Debug)]
struct RateState {
    /// Earliest instant the next fetch may launch.
    next_slot_at: Instant,
    current_delay_seconds: f64,
    /// Floor the delay decays toward; seeded from config or site profile.
    base_delay_seconds: f64,
    consecutive_429s: u32,
    last_touched: Instant,
}

/// Domain-keyed pacing controller.
pub struct RateController {
    states: DashMap<String, Arc<Mutex<RateState>>>,
    config: RateConfig,
}

impl RateController {
    pub fn new(config: RateConfig) -> Self {
        Self {
            states: DashMap::new(),
            config,
        }
    }

    fn state_for(&self, domain: &str) -> Arc<Mutex<RateState>> {
        self.states
            .entry(domain.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(RateState {
                    next_slot_at: Instant::now(),
                    current_delay_seconds: self.config.default_delay_seconds,
                    base_delay_seconds: self.config.default_delay_seconds,
                    consecutive_429s: 0,
                    last_touched: Instant::now(),
                }))
            })
            .clone()
    }

    fn clamp(&self, delay: f64) -> f64 {
        delay
            .max(self.config.min_delay_seconds)
            .min(self.config.max_delay_seconds)
    }

    /// Seed a domain's base delay from its profile or robots crawl-delay.
    /// Only ever raises pacing; a profile cannot make a domain faster than
    /// the configured default.
    pub async fn configure_domain(&self, domain: &str, base_delay_seconds: f64) {
        let state = self.state_for(domain);
        let mut state = state.lock().await;
        let base = self.clamp(base_delay_seconds.max(self.config.default_delay_seconds));
        state.base_delay_seconds = base;
        if state.current_delay_seconds < base {
            state.current_delay_seconds = base;
        }
    }

    /// Block until this domain's next launch slot, then consume it.
    ///
    /// Each caller reserves the slot before sleeping, so two completed
    /// fetches on one domain are always spaced by at least the delay in
    /// force when the second was admitted.
    pub async fn acquire_slot(
        &self,
        domain: &str,
        ctx: &ScrapeContext,
    ) -> Result<(), Interrupted> {
        let state = self.state_for(domain);
        let target = {
            let mut state = state.lock().await;
            let now = Instant::now();
            let target = state.next_slot_at.max(now);
            state.next_slot_at = target + Duration::from_secs_f64(state.current_delay_seconds);
            state.last_touched = now;
            target
        };

        let wait = target.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            debug!(
                domain = %domain,
                wait_ms = wait.as_millis() as u64,
                "Waiting for rate slot"
            );
        }
        ctx.sleep_until(target).await
    }

    /// Fold a fetch outcome into the domain's pacing state.
    pub async fn record_outcome(&self, domain: &str, outcome: &FetchOutcome) {
        let state = self.state_for(domain);
        let mut state = state.lock().await;
        state.last_touched = Instant::now();

        if outcome.success {
            state.consecutive_429s = 0;
            state.current_delay_seconds = self
                .clamp(state.current_delay_seconds * 0.9)
                .max(state.base_delay_seconds);
            return;
        }

        match outcome.failure_kind() {
            FailureKind::Http429 => {
                state.consecutive_429s += 1;
                state.current_delay_seconds = self.clamp(state.current_delay_seconds * 2.0);
                warn!(
                    domain = %domain,
                    consecutive_429s = state.consecutive_429s,
                    delay_seconds = state.current_delay_seconds,
                    "Rate limited; doubling per-domain delay"
                );
            }
            FailureKind::Timeout => {
                state.current_delay_seconds = self.clamp(state.current_delay_seconds * 1.25);
            }
            _ => {}
        }
    }

    /// Current adaptive delay for a domain, seconds.
    pub async fn current_delay(&self, domain: &str) -> f64 {
        let state = self.state_for(domain);
        let state = state.lock().await;
        state.current_delay_seconds
    }

    /// Drop state for domains idle longer than the configured threshold.
    pub fn cleanup_stale(&self) {
        let stale_after = Duration::from_secs(self.config.stale_after_seconds);
        let now = Instant::now();
        self.states.retain(|_, state| match state.try_lock() {
            Ok(guard) => now.duration_since(guard.last_touched) < stale_after,
            // A held lock means the domain is in active use.
            Err(_) => true,
        });
    }

    pub fn tracked_domains(&self) -> usize {
        self.states.len()
    }

    /// (domain, current delay) pairs for gauges.
    pub fn delay_snapshot(&self) -> Vec<(String, f64)> {
        self.states
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .try_lock()
                    .ok()
                    .map(|state| (entry.key().clone(), state.current_delay_seconds))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast_config() -> RateConfig {
        RateConfig {
            default_delay_seconds: 0.05,
            min_delay_seconds: 0.01,
            max_delay_seconds: 1.0,
            stale_after_seconds: 3600,
        }
    }

    fn ctx() -> ScrapeContext {
        ScrapeContext::new("test", Duration::from_secs(30)).0
    }

    #[tokio::test]
    async fn paces_requests_on_one_domain() {
        let controller = RateController::new(fast_config());
        let ctx = ctx();

        let start = Instant::now();
        controller.acquire_slot("example.com", &ctx).await.unwrap();
        controller.acquire_slot("example.com", &ctx).await.unwrap();
        controller.acquire_slot("example.com", &ctx).await.unwrap();
        let elapsed = start.elapsed();

        // Third slot is two delays after the first.
        assert!(
            elapsed >= Duration::from_millis(90),
            "expected pacing, got {:?}",
            elapsed
        );
    }

    #[tokio::test]
    async fn domains_do_not_interfere() {
        let controller = RateController::new(fast_config());
        let ctx = ctx();

        let start = Instant::now();
        controller.acquire_slot("a.example", &ctx).await.unwrap();
        controller.acquire_slot("b.example", &ctx).await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(40));
    }

    #[tokio::test]
    async fn delay_doubles_on_429_and_decays_on_success() {
        let controller = RateController::new(fast_config());
        let initial = controller.current_delay("example.com").await;

        let rate_limited = FetchOutcome::failed(FailureKind::Http429, 10);
        controller.record_outcome("example.com", &rate_limited).await;
        let after_429 = controller.current_delay("example.com").await;
        assert!((after_429 - initial * 2.0).abs() < 1e-9);

        let ok = FetchOutcome::ok(bytes::Bytes::from_static(b"x"), 10);
        controller.record_outcome("example.com", &ok).await;
        let after_ok = controller.current_delay("example.com").await;
        assert!(after_ok < after_429);
        assert!(after_ok >= initial, "decay floors at the base delay");
    }

    #[tokio::test]
    async fn delay_caps_at_max() {
        let controller = RateController::new(fast_config());
        let rate_limited = FetchOutcome::failed(FailureKind::Http429, 10);
        for _ in 0..20 {
            controller.record_outcome("example.com", &rate_limited).await;
        }
        assert_eq!(controller.current_delay("example.com").await, 1.0);
    }

    #[tokio::test]
    async fn timeout_bumps_delay_gently() {
        let controller = RateController::new(fast_config());
        let initial = controller.current_delay("example.com").await;
        let timed_out = FetchOutcome::failed(FailureKind::Timeout, 10);
        controller.record_outcome("example.com", &timed_out).await;
        let bumped = controller.current_delay("example.com").await;
        assert!((bumped - initial * 1.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn profile_seed_only_raises() {
        let controller = RateController::new(fast_config());
        controller.configure_domain("example.com", 0.5).await;
        assert_eq!(controller.current_delay("example.com").await, 0.5);
        // Seeding below the default is ignored.
        controller.configure_domain("other.example", 0.001).await;
        assert_eq!(controller.current_delay("other.example").await, 0.05);
    }

    #[tokio::test]
    async fn cancellation_aborts_wait() {
        let controller = Arc::new(RateController::new(RateConfig {
            default_delay_seconds: 5.0,
            min_delay_seconds: 0.5,
            max_delay_seconds: 60.0,
            stale_after_seconds: 3600,
        }));
        let (ctx, handle) = ScrapeContext::new("test", Duration::from_secs(60));

        // Consume the immediate slot so the next acquire must wait.
        controller.acquire_slot("slow.example", &ctx).await.unwrap();

        let waiter = tokio::spawn({
            let controller = controller.clone();
            let ctx = ctx.clone();
            async move { controller.acquire_slot("slow.example", &ctx).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();
        assert_eq!(waiter.await.unwrap(), Err(Interrupted::Cancelled));
    }

    #[tokio::test]
    async fn stale_domains_evicted() {
        let controller = RateController::new(RateConfig {
            stale_after_seconds: 0,
            ..fast_config()
        });
        let ctx = ctx();
        controller.acquire_slot("old.example", &ctx).await.unwrap();
        assert_eq!(controller.tracked_domains(), 1);
        tokio::time::sleep(Duration::from_millis(10)).await;
        controller.cleanup_stale();
        assert_eq!(controller.tracked_domains(), 0);
    }
}
