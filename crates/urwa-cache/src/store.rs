//! TTL cache and in-flight coalescing table.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::debug;
use urwa_config::CacheConfig;
use urwa_types::{ScrapeContext, ScrapeResult};

#[derive(Clone)]
struct CachedEntry {
    result: ScrapeResult,
    stored_at: Instant,
}

/// Role assigned to a caller entering the single-flight table.
pub enum Flight {
    /// This caller performs the work and publishes the result.
    Leader(FlightGuard),
    /// Another caller is already working on this fingerprint.
    Follower(watch::Receiver<Option<ScrapeResult>>),
}

/// Held by the single-flight leader. Publishing completes the flight;
/// dropping without publishing releases followers to try themselves.
pub struct FlightGuard {
    fingerprint: String,
    tx: watch::Sender<Option<ScrapeResult>>,
    table: Arc<DashMap<String, watch::Receiver<Option<ScrapeResult>>>>,
}

/// Fingerprint-keyed result cache with TTL and single-flight coalescing.
pub struct ResultCache {
    config: CacheConfig,
    entries: DashMap<String, CachedEntry>,
    in_flight: Arc<DashMap<String, watch::Receiver<Option<ScrapeResult>>>>,
}

impl ResultCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Fresh cached result for this fingerprint, marked as served from
    /// cache. Expired entries are dropped on read.
    pub fn get(&self, fingerprint: &str) -> Option<ScrapeResult> {
        let ttl = Duration::from_secs(self.config.ttl_seconds);
        let entry = self.entries.get(fingerprint)?;
        if entry.stored_at.elapsed() > ttl {
            drop(entry);
            self.entries.remove(fingerprint);
            return None;
        }
        let mut result = entry.result.clone();
        result.from_cache = true;
        Some(result)
    }

    /// Store a successful result.
    pub fn put(&self, fingerprint: &str, result: &ScrapeResult) {
        self.entries.insert(
            fingerprint.to_string(),
            CachedEntry {
                result: result.clone(),
                stored_at: Instant::now(),
            },
        );
        self.evict_over_capacity();
    }

    fn evict_over_capacity(&self) {
        while self.entries.len() > self.config.max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.stored_at)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Enter the single-flight table for a fingerprint. Exactly one of
    /// any set of concurrent callers becomes the leader.
    pub fn begin_flight(&self, fingerprint: &str) -> Flight {
        match self.in_flight.entry(fingerprint.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(occupied) => {
                debug!(fingerprint = %fingerprint, "Joining in-flight scrape");
                Flight::Follower(occupied.get().clone())
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let (tx, rx) = watch::channel(None);
                vacant.insert(rx);
                Flight::Leader(FlightGuard {
                    fingerprint: fingerprint.to_string(),
                    tx,
                    table: self.in_flight.clone(),
                })
            }
        }
    }

    /// Wait for the in-flight leader's result.
    ///
    /// `None` means the leader failed or gave up; the follower should run
    /// its own attempt (results race independently, no negative caching).
    pub async fn await_flight(
        mut rx: watch::Receiver<Option<ScrapeResult>>,
        ctx: &ScrapeContext,
    ) -> Option<ScrapeResult> {
        loop {
            if let Some(result) = rx.borrow().clone() {
                return Some(result);
            }
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        // Leader dropped without publishing.
                        return None;
                    }
                }
                _ = ctx.cancelled() => return None,
                _ = tokio::time::sleep(ctx.remaining()) => return None,
            }
        }
    }
}

impl FlightGuard {
    /// Publish a successful result to followers and the cache.
    pub fn complete(self, cache: &ResultCache, result: &ScrapeResult) {
        cache.put(&self.fingerprint, result);
        let _ = self.tx.send(Some(result.clone()));
        self.table.remove(&self.fingerprint);
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        // Completing removes the entry first; this covers the failure and
        // cancellation paths so followers never wait on a dead leader.
        self.table.remove(&self.fingerprint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use urwa_types::{FailureKind, ScrapeStatus, Strategy};

    fn success_result(url: &str) -> ScrapeResult {
        ScrapeResult {
            status: ScrapeStatus::Success,
            url: url.to_string(),
            final_url: None,
            content: Some("<html>body</html>".to_string()),
            content_length: Some(17),
            strategy_used: Some(Strategy::Light),
            attempts: 1,
            elapsed_ms: 40,
            confidence: None,
            failure_kind: None,
            trace_id: "t1".to_string(),
            from_cache: false,
        }
    }

    fn cache(ttl_seconds: u64, max_entries: usize) -> ResultCache {
        ResultCache::new(CacheConfig {
            ttl_seconds,
            max_entries,
        })
    }

    #[test]
    fn round_trips_and_marks_cached() {
        let cache = cache(3600, 16);
        cache.put("fp1", &success_result("https://example.com/"));
        let hit = cache.get("fp1").unwrap();
        assert!(hit.from_cache);
        assert_eq!(hit.content.as_deref(), Some("<html>body</html>"));
        assert!(cache.get("fp2").is_none());
    }

    #[tokio::test]
    async fn expired_entries_drop_on_read() {
        let cache = cache(0, 16);
        cache.put("fp1", &success_result("https://example.com/"));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(cache.get("fp1").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_evicts_oldest() {
        let cache = cache(3600, 2);
        cache.put("fp1", &success_result("https://example.com/1"));
        cache.put("fp2", &success_result("https://example.com/2"));
        cache.put("fp3", &success_result("https://example.com/3"));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("fp1").is_none());
        assert!(cache.get("fp3").is_some());
    }

    #[tokio::test]
    async fn follower_receives_leader_result() {
        let cache = std::sync::Arc::new(cache(3600, 16));
        let leader = match cache.begin_flight("fp1") {
            Flight::Leader(guard) => guard,
            Flight::Follower(_) => panic!("first caller should lead"),
        };
        let follower_rx = match cache.begin_flight("fp1") {
            Flight::Follower(rx) => rx,
            Flight::Leader(_) => panic!("second caller should follow"),
        };

        let (ctx, _handle) = ScrapeContext::new("t2", Duration::from_secs(5));
        let waiter = tokio::spawn(async move {
            ResultCache::await_flight(follower_rx, &ctx).await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        leader.complete(&cache, &success_result("https://example.com/"));

        let received = waiter.await.unwrap().expect("follower gets result");
        assert_eq!(received.url, "https://example.com/");
        // Flight table is clear; a new caller leads again.
        assert!(matches!(cache.begin_flight("fp1"), Flight::Leader(_)));
    }

    #[tokio::test]
    async fn follower_released_when_leader_fails() {
        let cache = cache(3600, 16);
        let leader = match cache.begin_flight("fp1") {
            Flight::Leader(guard) => guard,
            Flight::Follower(_) => panic!("first caller should lead"),
        };
        let follower_rx = match cache.begin_flight("fp1") {
            Flight::Follower(rx) => rx,
            Flight::Leader(_) => panic!("second caller should follow"),
        };

        let (ctx, _handle) = ScrapeContext::new("t2", Duration::from_secs(5));
        let waiter =
            tokio::spawn(async move { ResultCache::await_flight(follower_rx, &ctx).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(leader); // Leader errored out without a result.

        assert!(waiter.await.unwrap().is_none(), "follower proceeds alone");
        assert!(matches!(cache.begin_flight("fp1"), Flight::Leader(_)));
    }

    #[test]
    fn error_results_are_cacheable_but_not_stored_by_runner() {
        // The cache itself is agnostic; storing only successes is the
        // runner's contract. Verify an error round-trips anyway.
        let cache = cache(3600, 4);
        let error = ScrapeResult::error(
            "https://example.com/",
            FailureKind::Http5xx,
            3,
            100,
            "t9",
        );
        cache.put("fpe", &error);
        assert_eq!(
            cache.get("fpe").unwrap().failure_kind,
            Some(FailureKind::Http5xx)
        );
    }
}
