//! Profile cache and probe coordination.

use crate::analyze::classify_probe;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;
use urwa_config::ProfileConfig;
use urwa_types::{domain_key, Fetcher, Risk, ScrapeContext, SiteProfile};

/// Domain profiler with a TTL'd, capacity-bounded cache.
pub struct SiteProfiler {
    config: ProfileConfig,
    probe_fetcher: Arc<dyn Fetcher>,
    cache: DashMap<String, SiteProfile>,
    probe_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SiteProfiler {
    /// `probe_fetcher` should be the light fetcher, body-capped to the
    /// configured probe size.
    pub fn new(config: ProfileConfig, probe_fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            config,
            probe_fetcher,
            cache: DashMap::new(),
            probe_locks: DashMap::new(),
        }
    }

    /// Profile for this URL's domain, probing on a cache miss.
    ///
    /// `crawl_delay` (from robots) overrides the risk-derived delay when
    /// larger. Concurrent callers on a cold domain share one probe; a
    /// caller that waits longer than the configured bound falls through
    /// with an uncached assumed-medium profile.
    pub async fn get(
        &self,
        url: &Url,
        ctx: &ScrapeContext,
        crawl_delay: Option<f64>,
    ) -> SiteProfile {
        let Some(domain) = domain_key(url) else {
            return SiteProfile::assumed_medium("unknown");
        };

        if let Some(profile) = self.fresh_profile(&domain) {
            return profile;
        }

        let lock = self
            .probe_locks
            .entry(domain.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let wait = Duration::from_secs(self.config.probe_wait_seconds);
        let guard = match tokio::time::timeout(wait, lock.lock()).await {
            Ok(guard) => guard,
            Err(_) => {
                warn!(domain = %domain, "Probe wait expired; assuming medium profile");
                return SiteProfile::assumed_medium(domain);
            }
        };

        // A peer may have probed while this caller waited.
        if let Some(profile) = self.fresh_profile(&domain) {
            drop(guard);
            return profile;
        }

        let profile = self.probe(&domain, url, ctx, crawl_delay).await;
        if !profile.ttl.is_zero() {
            self.cache.insert(domain.clone(), profile.clone());
            self.evict_over_capacity();
        }
        drop(guard);
        self.probe_locks.remove(&domain);
        profile
    }

    fn fresh_profile(&self, domain: &str) -> Option<SiteProfile> {
        let entry = self.cache.get(domain)?;
        if entry.is_expired() {
            None
        } else {
            Some(entry.clone())
        }
    }

    async fn probe(
        &self,
        domain: &str,
        url: &Url,
        ctx: &ScrapeContext,
        crawl_delay: Option<f64>,
    ) -> SiteProfile {
        debug!(domain = %domain, url = %url, "Probing domain");
        let mut outcome = self.probe_fetcher.fetch(ctx, url).await;

        if ctx.is_cancelled() {
            return SiteProfile::assumed_medium(domain);
        }

        // Cap what the classifier sees even if the fetcher did not truncate.
        if let Some(content) = outcome.content.take() {
            outcome.content = Some(content.slice(..content.len().min(self.config.probe_max_bytes)));
        }

        let analysis = classify_probe(&outcome);
        let table = &self.config.risk_delay_seconds;
        let mut delay = match analysis.risk {
            Risk::Low => table.low,
            Risk::Medium => table.medium,
            Risk::High => table.high,
            Risk::Extreme => table.extreme,
        };
        if let Some(robots_delay) = crawl_delay {
            delay = delay.max(robots_delay);
        }

        let ttl = if analysis.risk == Risk::Extreme {
            Duration::from_secs(self.config.extreme_ttl_seconds)
        } else {
            Duration::from_secs(self.config.ttl_seconds)
        };

        info!(
            domain = %domain,
            risk = %analysis.risk,
            risk_score = analysis.risk_score,
            strategy = %analysis.recommended_strategy,
            delay_seconds = delay,
            "Domain profiled"
        );

        SiteProfile {
            domain: domain.to_string(),
            risk: analysis.risk,
            risk_score: analysis.risk_score,
            protections: analysis.protections,
            recommended_strategy: analysis.recommended_strategy,
            recommended_delay_seconds: delay,
            computed_at: Instant::now(),
            ttl,
        }
    }

    /// Drop the cached profile, forcing a re-probe on next contact. Called
    /// after repeated terminal failures on a domain.
    pub fn invalidate(&self, domain: &str) {
        if self.cache.remove(domain).is_some() {
            info!(domain = %domain, "Profile invalidated");
        }
    }

    pub fn cached_domains(&self) -> usize {
        self.cache.len()
    }

    fn evict_over_capacity(&self) {
        while self.cache.len() > self.config.max_entries {
            let oldest = self
                .cache
                .iter()
                .min_by_key(|entry| entry.computed_at)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(domain) => {
                    self.cache.remove(&domain);
                    debug!(domain = %domain, "Evicted oldest profile over capacity");
                }
                None => break,
            }
        }
    }
}
