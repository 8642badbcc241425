//! Hourly cost ceilings.
//!
//! Tracks tokens, browser minutes, request counts, and an USD estimate over
//! a sliding one-hour window of minute buckets. Admission charges the
//! request and its USD estimate up front so concurrent admits cannot
//! overshoot a ceiling; browser time and tokens are charged as they are
//! observed. Buckets older than two hours are evicted on every write.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};
use urwa_config::CostConfig;
use urwa_types::{Clock, Strategy};

/// Window length that counts toward ceilings.
const WINDOW_MINUTES: u64 = 60;
/// Buckets older than this are dropped entirely.
const EVICT_AFTER_MINUTES: u64 = 120;

#[derive(Debug, Default, Clone)]
struct Bucket {
    minute: u64,
    llm_tokens: u64,
    browser_ms: u64,
    requests: u64,
    usd: f64,
}

/// Which ceiling rejected an admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostResource {
    LlmTokens,
    BrowserMinutes,
    Requests,
    Usd,
}

/// Aggregate usage over the current window, for telemetry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostUsage {
    pub llm_tokens: u64,
    pub browser_minutes: f64,
    pub requests: u64,
    pub usd_estimate: f64,
    pub llm_tokens_limit: u64,
    pub browser_minutes_limit: f64,
    pub requests_limit: u64,
    pub usd_limit: f64,
    pub exceeded: Vec<CostResource>,
}

/// Sliding-window cost controller.
pub struct CostController {
    config: CostConfig,
    clock: Arc<dyn Clock>,
    buckets: Mutex<VecDeque<Bucket>>,
}

impl CostController {
    pub fn new(config: CostConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            buckets: Mutex::new(VecDeque::new()),
        }
    }

    fn now_minute(&self) -> u64 {
        self.clock.now_ms() / 60_000
    }

    fn usd_per_request(&self, strategy: Strategy) -> f64 {
        match strategy {
            Strategy::Light => self.config.usd_per_request_light,
            Strategy::Stealth => self.config.usd_per_request_stealth,
            Strategy::Ultra => self.config.usd_per_request_ultra,
        }
    }

    fn evict_and_sum(buckets: &mut VecDeque<Bucket>, now_minute: u64) -> Bucket {
        while let Some(front) = buckets.front() {
            if now_minute.saturating_sub(front.minute) >= EVICT_AFTER_MINUTES {
                buckets.pop_front();
            } else {
                break;
            }
        }

        let mut totals = Bucket::default();
        for bucket in buckets.iter() {
            if now_minute.saturating_sub(bucket.minute) < WINDOW_MINUTES {
                totals.llm_tokens += bucket.llm_tokens;
                totals.browser_ms += bucket.browser_ms;
                totals.requests += bucket.requests;
                totals.usd += bucket.usd;
            }
        }
        totals
    }

    fn current_bucket<'a>(
        buckets: &'a mut VecDeque<Bucket>,
        now_minute: u64,
    ) -> &'a mut Bucket {
        let needs_new = buckets
            .back()
            .map(|b| b.minute != now_minute)
            .unwrap_or(true);
        if needs_new {
            buckets.push_back(Bucket {
                minute: now_minute,
                ..Default::default()
            });
        }
        buckets.back_mut().expect("bucket just pushed")
    }

    /// Admit one request of the given strategy, charging its request count
    /// and USD estimate. Rejects with the first exceeded resource.
    pub fn admit(&self, strategy: Strategy) -> Result<(), CostResource> {
        let ceilings = &self.config.hour_ceilings;
        let now_minute = self.now_minute();
        let mut buckets = self.buckets.lock();
        let totals = Self::evict_and_sum(&mut buckets, now_minute);

        let usd_next = totals.usd + self.usd_per_request(strategy);

        if totals.llm_tokens > ceilings.llm_tokens {
            warn!(strategy = %strategy, "Cost ceiling hit: llm tokens");
            return Err(CostResource::LlmTokens);
        }
        if totals.browser_ms as f64 / 60_000.0 > ceilings.browser_minutes {
            warn!(strategy = %strategy, "Cost ceiling hit: browser minutes");
            return Err(CostResource::BrowserMinutes);
        }
        if totals.requests + 1 > ceilings.requests {
            warn!(strategy = %strategy, "Cost ceiling hit: requests");
            return Err(CostResource::Requests);
        }
        if usd_next > ceilings.usd {
            warn!(strategy = %strategy, "Cost ceiling hit: usd");
            return Err(CostResource::Usd);
        }

        let bucket = Self::current_bucket(&mut buckets, now_minute);
        bucket.requests += 1;
        bucket.usd += self.usd_per_request(strategy);
        debug!(strategy = %strategy, requests = totals.requests + 1, "Cost admission granted");
        Ok(())
    }

    /// Charge elapsed browser time for stealth/ultra attempts.
    pub fn record_fetch(&self, strategy: Strategy, elapsed_ms: u64) {
        if !strategy.uses_browser() {
            return;
        }
        let now_minute = self.now_minute();
        let mut buckets = self.buckets.lock();
        Self::evict_and_sum(&mut buckets, now_minute);
        Self::current_bucket(&mut buckets, now_minute).browser_ms += elapsed_ms;
    }

    /// Charge LLM tokens consumed by downstream synthesis on our budget.
    pub fn record_tokens(&self, tokens: u64) {
        let now_minute = self.now_minute();
        let mut buckets = self.buckets.lock();
        Self::evict_and_sum(&mut buckets, now_minute);
        Self::current_bucket(&mut buckets, now_minute).llm_tokens += tokens;
    }

    /// Current window usage against the configured ceilings.
    pub fn usage(&self) -> CostUsage {
        let ceilings = &self.config.hour_ceilings;
        let now_minute = self.now_minute();
        let mut buckets = self.buckets.lock();
        let totals = Self::evict_and_sum(&mut buckets, now_minute);

        let browser_minutes = totals.browser_ms as f64 / 60_000.0;
        let mut exceeded = Vec::new();
        if totals.llm_tokens >= ceilings.llm_tokens {
            exceeded.push(CostResource::LlmTokens);
        }
        if browser_minutes >= ceilings.browser_minutes {
            exceeded.push(CostResource::BrowserMinutes);
        }
        if totals.requests >= ceilings.requests {
            exceeded.push(CostResource::Requests);
        }
        if totals.usd >= ceilings.usd {
            exceeded.push(CostResource::Usd);
        }

        CostUsage {
            llm_tokens: totals.llm_tokens,
            browser_minutes,
            requests: totals.requests,
            usd_estimate: totals.usd,
            llm_tokens_limit: ceilings.llm_tokens,
            browser_minutes_limit: ceilings.browser_minutes,
            requests_limit: ceilings.requests,
            usd_limit: ceilings.usd,
            exceeded,
        }
    }

    /// Number of retained minute buckets, for leak checks.
    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }
}
