//! The scrape engine: admission gates, escalation, feedback loops.

use crate::confidence::ConfidenceScorer;
use crate::selector::choose_strategies;
use dashmap::DashMap;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;
use urwa_cache::{fingerprint, Flight, ResultCache};
use urwa_compliance::ComplianceGate;
use urwa_config::{RequestValidator, UrwaConfig};
use urwa_cost::{CostController, CostUsage};
use urwa_evidence::{EvidenceCapturer, EvidenceRecord};
use urwa_fetch::{FetcherSet, HttpFetcher};
use urwa_learner::Learner;
use urwa_monitoring::{
    new_trace_id, EventLog, HealthSnapshot, HealthStatus, LogLevel, LogRecord, Metrics,
};
use urwa_profiler::SiteProfiler;
use urwa_reliability::{
    parse_retry_after, CircuitBreakerRegistry, CircuitSnapshot, CircuitState, RateController,
    RetryDecision, RetryPolicy,
};
use urwa_types::{
    domain_key, Clock, FailureKind, FetchOutcome, Interrupted, RealClock, ScrapeContext,
    ScrapeRequest, ScrapeResult, ScrapeStatus, Strategy, StrategyStat, UrwaError,
};

/// Consecutive terminal failures on a domain before its profile is
/// invalidated and re-probed.
const PROFILE_INVALIDATE_AFTER: u32 = 3;

/// The orchestrator facade. One instance owns all per-domain registries;
/// every scrape call flows through `scrape`.
pub struct ScrapeEngine {
    config: UrwaConfig,
    validator: RequestValidator,
    compliance: ComplianceGate,
    profiler: SiteProfiler,
    rate: RateController,
    circuits: CircuitBreakerRegistry,
    retry_policy: RetryPolicy,
    learner: Learner,
    fetchers: FetcherSet,
    evidence: EvidenceCapturer,
    cache: ResultCache,
    cost: CostController,
    scorer: ConfidenceScorer,
    metrics: Metrics,
    event_log: EventLog,
    terminal_failures: DashMap<String, u32>,
}

impl ScrapeEngine {
    /// Build an engine against the real clock, replaying the learner
    /// journal when configured.
    pub async fn new(config: UrwaConfig, fetchers: FetcherSet) -> Result<Self, UrwaError> {
        Self::with_clock(config, fetchers, Arc::new(RealClock)).await
    }

    /// Build with an injected clock; tests drive circuit cooldowns and
    /// cost windows deterministically through it.
    pub async fn with_clock(
        config: UrwaConfig,
        fetchers: FetcherSet,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, UrwaError> {
        config.validate()?;

        // The engine always needs a light fetcher for probes; supply the
        // plain HTTP one when the deployment did not inject its own.
        let fetchers = if fetchers.has(Strategy::Light) {
            fetchers
        } else {
            fetchers.with_fetcher(Arc::new(
                HttpFetcher::new(
                    &config.user_agent,
                    config.strategy_timeouts.for_strategy(Strategy::Light),
                )?
                .with_max_body(8 * 1024 * 1024),
            ))
        };
        let probe_fetcher = fetchers
            .get(Strategy::Light)
            .expect("light fetcher just ensured");

        let compliance =
            ComplianceGate::new(config.compliance.clone(), config.user_agent.clone())?;
        let learner = Learner::open(config.learner.clone()).await?;

        Ok(Self {
            validator: RequestValidator::new(config.ssrf_allow_private),
            compliance,
            profiler: SiteProfiler::new(config.profile.clone(), probe_fetcher),
            rate: RateController::new(config.rate.clone()),
            circuits: CircuitBreakerRegistry::new(config.circuit.clone(), clock.clone()),
            retry_policy: RetryPolicy::default(),
            learner,
            fetchers,
            evidence: EvidenceCapturer::new(config.evidence.clone()),
            cache: ResultCache::new(config.cache.clone()),
            cost: CostController::new(config.cost.clone(), clock),
            scorer: ConfidenceScorer,
            metrics: Metrics::new(),
            event_log: EventLog::new(config.log_buffer_capacity),
            terminal_failures: DashMap::new(),
            config,
        })
    }

    /// Scrape one URL. Never fails out-of-band: every failure mode is a
    /// `ScrapeResult` with `status = error` and a `failure_kind`.
    pub async fn scrape(&self, request: ScrapeRequest) -> ScrapeResult {
        let timeout = Duration::from_secs(
            request
                .timeout_seconds
                .unwrap_or(self.config.default_timeout_seconds),
        );
        let (ctx, _cancel) = ScrapeContext::new(new_trace_id(), timeout);
        self.scrape_with_context(request, &ctx).await
    }

    /// Scrape under a caller-supplied context (cancellation, deadline).
    pub async fn scrape_with_context(
        &self,
        request: ScrapeRequest,
        ctx: &ScrapeContext,
    ) -> ScrapeResult {
        let started = Instant::now();
        let trace_id = ctx.trace_id().to_string();

        let url = match self.validator.validate(&request.url) {
            Ok(url) => url,
            Err(e) => {
                self.log(
                    LogLevel::Warn,
                    &trace_id,
                    "engine",
                    "request.invalid_url",
                    json!({"url": request.url, "error": e.to_string()}),
                );
                self.metrics
                    .incr_counter("scrape_total", &[("status", "error"), ("strategy", "none")]);
                return ScrapeResult::error(
                    request.url.clone(),
                    FailureKind::InvalidUrl,
                    0,
                    started.elapsed().as_millis() as u64,
                    trace_id,
                );
            }
        };

        let fp = fingerprint(&url, request.force_strategy);

        if !request.bypass_cache {
            if let Some(mut hit) = self.cache.get(&fp) {
                self.metrics.incr_counter("cache_hits", &[]);
                self.log(
                    LogLevel::Debug,
                    &trace_id,
                    "cache",
                    "cache.hit",
                    json!({"url": url.as_str()}),
                );
                hit.trace_id = trace_id;
                return hit;
            }

            match self.cache.begin_flight(&fp) {
                Flight::Leader(guard) => {
                    let result = self.run_scrape(&url, &request, ctx, started).await;
                    if result.is_success() {
                        guard.complete(&self.cache, &result);
                    }
                    return result;
                }
                Flight::Follower(rx) => {
                    self.log(
                        LogLevel::Debug,
                        &trace_id,
                        "cache",
                        "singleflight.wait",
                        json!({"url": url.as_str()}),
                    );
                    if let Some(mut result) = ResultCache::await_flight(rx, ctx).await {
                        result.trace_id = trace_id;
                        return result;
                    }
                    // Leader failed; race independently, no negative cache.
                }
            }
        }

        self.run_scrape(&url, &request, ctx, started).await
    }

    async fn run_scrape(
        &self,
        url: &Url,
        request: &ScrapeRequest,
        ctx: &ScrapeContext,
        started: Instant,
    ) -> ScrapeResult {
        let trace_id = ctx.trace_id().to_string();
        let Some(domain) = domain_key(url) else {
            return self.finish_error(url, FailureKind::InvalidUrl, 0, started, &trace_id);
        };

        // Compliance gate: nothing below runs for a denied URL.
        let decision = self.compliance.decide(url).await;
        if !decision.allowed {
            let kind = decision
                .reason
                .map(|r| r.failure_kind())
                .unwrap_or(FailureKind::ComplianceDenied);
            self.log(
                LogLevel::Info,
                &trace_id,
                "compliance",
                "compliance.denied",
                json!({"url": url.as_str(), "kind": kind.as_str()}),
            );
            return self.finish_error(url, kind, 0, started, &trace_id);
        }

        // Circuit admission. The half-open permit, when granted, lives for
        // the remainder of the call so trial concurrency stays bounded.
        let circuit = self.circuits.circuit(&domain);
        let _trial_permit = match circuit.try_acquire() {
            Ok(permit) => permit,
            Err(()) => {
                self.log(
                    LogLevel::Warn,
                    &trace_id,
                    "circuit",
                    "circuit.open",
                    json!({"domain": domain}),
                );
                return self.finish_error(url, FailureKind::CircuitOpen, 0, started, &trace_id);
            }
        };

        let profile = self.profiler.get(url, ctx, decision.crawl_delay).await;
        self.rate
            .configure_domain(&domain, profile.recommended_delay_seconds)
            .await;

        let stats = self.learner.stats(&domain);
        let order = choose_strategies(
            &profile,
            &stats,
            request.force_strategy,
            &self.fetchers.available(),
        );
        if order.is_empty() {
            self.log(
                LogLevel::Error,
                &trace_id,
                "engine",
                "selection.empty",
                json!({"domain": domain, "forced": request.force_strategy}),
            );
            return self.finish_error(url, FailureKind::InternalError, 0, started, &trace_id);
        }
        debug!(
            trace_id = %trace_id,
            domain = %domain,
            order = ?order,
            risk = %profile.risk,
            "Strategy order selected"
        );

        let mut attempts: u32 = 0;
        let mut last_kind = FailureKind::Unknown;
        let mut idx = 0usize;

        'strategy_loop: while idx < order.len() {
            let strategy = order[idx];
            let Some(fetcher) = self.fetchers.get(strategy) else {
                idx += 1;
                continue;
            };
            let strategy_timeout = self.config.strategy_timeouts.for_strategy(strategy);
            let mut attempt_in_strategy: u32 = 0;

            loop {
                if ctx.is_cancelled() {
                    last_kind = FailureKind::Cancelled;
                    break 'strategy_loop;
                }
                if ctx.is_expired() {
                    if attempts == 0 {
                        last_kind = FailureKind::Timeout;
                    }
                    break 'strategy_loop;
                }

                if let Err(resource) = self.cost.admit(strategy) {
                    self.log(
                        LogLevel::Warn,
                        &trace_id,
                        "cost",
                        "cost.exceeded",
                        json!({"strategy": strategy.name(), "resource": format!("{:?}", resource)}),
                    );
                    return self.finish_error(
                        url,
                        FailureKind::CostExceeded,
                        attempts,
                        started,
                        &trace_id,
                    );
                }

                match self.rate.acquire_slot(&domain, ctx).await {
                    Ok(()) => {}
                    Err(Interrupted::Cancelled) => {
                        last_kind = FailureKind::Cancelled;
                        break 'strategy_loop;
                    }
                    Err(Interrupted::DeadlineExceeded) => {
                        if attempts == 0 {
                            last_kind = FailureKind::Timeout;
                        }
                        break 'strategy_loop;
                    }
                }
                self.log(
                    LogLevel::Debug,
                    &trace_id,
                    "rate",
                    "rate.acquired",
                    json!({"domain": domain, "strategy": strategy.name()}),
                );

                let outcome = match tokio::time::timeout(strategy_timeout, fetcher.fetch(ctx, url))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => FetchOutcome::failed(
                        FailureKind::Timeout,
                        strategy_timeout.as_millis() as u64,
                    ),
                };
                attempts += 1;

                self.metrics.observe(
                    "fetch_duration_ms",
                    &[("strategy", strategy.name())],
                    outcome.elapsed_ms as f64,
                );
                self.rate.record_outcome(&domain, &outcome).await;
                self.cost.record_fetch(strategy, outcome.elapsed_ms);
                let current_delay = self.rate.current_delay(&domain).await;
                self.metrics
                    .set_gauge("rate_delay_seconds", &[("domain", &domain)], current_delay);

                if outcome.success {
                    circuit.record_success();
                    self.publish_circuit_gauge(&domain);
                    self.learner
                        .record(&domain, strategy, true, Some(outcome.elapsed_ms))
                        .await;
                    self.terminal_failures.remove(&domain);
                    self.log(
                        LogLevel::Info,
                        &trace_id,
                        "fetch",
                        &format!("fetch.{}.success", strategy.name()),
                        json!({"domain": domain, "elapsed_ms": outcome.elapsed_ms, "attempts": attempts}),
                    );
                    return self.finish_success(
                        url, &outcome, strategy, attempts, started, &trace_id,
                    );
                }

                let kind = outcome.failure_kind();
                last_kind = kind;
                circuit.record_failure(kind, url.as_str());
                self.publish_circuit_gauge(&domain);
                self.learner.record(&domain, strategy, false, None).await;
                self.log(
                    LogLevel::Warn,
                    &trace_id,
                    "fetch",
                    &format!("fetch.{}.failed.{}", strategy.name(), kind.as_str()),
                    json!({"domain": domain, "status": outcome.http_status, "attempt": attempts}),
                );

                if kind.warrants_evidence() {
                    self.evidence
                        .capture(&trace_id, &domain, url.as_str(), attempts, &outcome)
                        .await;
                    self.metrics.incr_counter("evidence_captured_total", &[]);
                }

                let retry_after = outcome.header("retry-after").and_then(parse_retry_after);
                match self
                    .retry_policy
                    .decide(kind, attempt_in_strategy, retry_after, strategy_timeout)
                {
                    RetryDecision::Retry(backoff) => {
                        attempt_in_strategy += 1;
                        debug!(
                            trace_id = %trace_id,
                            strategy = %strategy,
                            backoff_ms = backoff.as_millis() as u64,
                            "Retrying same strategy"
                        );
                        match ctx.sleep(backoff).await {
                            Ok(()) => continue,
                            Err(Interrupted::Cancelled) => {
                                last_kind = FailureKind::Cancelled;
                                break 'strategy_loop;
                            }
                            Err(Interrupted::DeadlineExceeded) => break 'strategy_loop,
                        }
                    }
                    RetryDecision::Escalate => {
                        if kind == FailureKind::Challenge {
                            // A challenge means the site outclasses this
                            // tier; jump straight to the heaviest option.
                            let heaviest = order.len() - 1;
                            if heaviest > idx {
                                info!(
                                    trace_id = %trace_id,
                                    from = %strategy,
                                    to = %order[heaviest],
                                    "Challenge detected; jumping to heaviest strategy"
                                );
                                idx = heaviest;
                            } else {
                                break 'strategy_loop;
                            }
                        } else {
                            idx += 1;
                        }
                        continue 'strategy_loop;
                    }
                    RetryDecision::Terminal => break 'strategy_loop,
                }
            }
        }

        self.note_terminal_failure(&domain, attempts);
        self.log(
            LogLevel::Warn,
            &trace_id,
            "engine",
            "scrape.error",
            json!({"domain": domain, "kind": last_kind.as_str(), "attempts": attempts}),
        );
        self.finish_error(url, last_kind, attempts, started, &trace_id)
    }

    fn finish_success(
        &self,
        url: &Url,
        outcome: &FetchOutcome,
        strategy: Strategy,
        attempts: u32,
        started: Instant,
        trace_id: &str,
    ) -> ScrapeResult {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        self.metrics.incr_counter(
            "scrape_total",
            &[("status", "success"), ("strategy", strategy.name())],
        );
        self.metrics.observe(
            "scrape_duration_seconds",
            &[("strategy", strategy.name())],
            elapsed_ms as f64 / 1000.0,
        );

        let confidence = self.scorer.score(outcome, strategy);
        let content = outcome
            .content
            .as_ref()
            .map(|b| String::from_utf8_lossy(b).into_owned());

        ScrapeResult {
            status: ScrapeStatus::Success,
            url: url.to_string(),
            final_url: outcome.final_url.clone(),
            content_length: content.as_ref().map(|c| c.len()),
            content,
            strategy_used: Some(strategy),
            attempts,
            elapsed_ms,
            confidence: Some(confidence),
            failure_kind: None,
            trace_id: trace_id.to_string(),
            from_cache: false,
        }
    }

    fn finish_error(
        &self,
        url: &Url,
        kind: FailureKind,
        attempts: u32,
        started: Instant,
        trace_id: &str,
    ) -> ScrapeResult {
        self.metrics
            .incr_counter("scrape_total", &[("status", "error"), ("strategy", "none")]);
        ScrapeResult::error(
            url.to_string(),
            kind,
            attempts,
            started.elapsed().as_millis() as u64,
            trace_id,
        )
    }

    fn note_terminal_failure(&self, domain: &str, attempts: u32) {
        if attempts == 0 {
            return;
        }
        let mut entry = self.terminal_failures.entry(domain.to_string()).or_insert(0);
        *entry += 1;
        if *entry >= PROFILE_INVALIDATE_AFTER {
            *entry = 0;
            drop(entry);
            warn!(domain = %domain, "Repeated terminal failures; invalidating profile");
            self.profiler.invalidate(domain);
        }
    }

    fn publish_circuit_gauge(&self, domain: &str) {
        let state = self.circuits.circuit(domain).state();
        let value = match state {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        };
        self.metrics
            .set_gauge("circuit_state", &[("domain", domain)], value);
    }

    fn log(
        &self,
        level: LogLevel,
        trace_id: &str,
        component: &str,
        msg: &str,
        fields: serde_json::Value,
    ) {
        self.event_log.record(level, trace_id, component, msg, fields);
    }

    // Telemetry surface, consumed by API/CLI layers.

    pub fn circuit_states(&self) -> Vec<CircuitSnapshot> {
        self.circuits.snapshots()
    }

    pub fn strategy_stats(
        &self,
        domain: Option<&str>,
    ) -> HashMap<String, HashMap<Strategy, StrategyStat>> {
        match domain {
            Some(domain) => {
                let mut map = HashMap::new();
                map.insert(domain.to_string(), self.learner.stats(domain));
                map
            }
            None => self.learner.all_stats(),
        }
    }

    pub fn cost_usage(&self) -> CostUsage {
        self.cost.usage()
    }

    pub fn recent_logs(&self, limit: usize, min_level: LogLevel) -> Vec<LogRecord> {
        self.event_log.recent(limit, min_level)
    }

    pub fn recent_evidence(&self, limit: usize) -> Vec<EvidenceRecord> {
        self.evidence.recent(limit)
    }

    pub fn health(&self) -> HealthSnapshot {
        let mut components = std::collections::BTreeMap::new();
        components.insert(
            "fetchers".to_string(),
            if self.fetchers.has(Strategy::Light) {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy {
                    error: "no light fetcher registered".to_string(),
                }
            },
        );
        components.insert(
            "learner_journal".to_string(),
            if self.config.learner.journal_path.is_none() || self.learner.is_persistent() {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded {
                    detail: "journal degraded to in-memory".to_string(),
                }
            },
        );
        let usage = self.cost.usage();
        components.insert(
            "cost".to_string(),
            if usage.exceeded.is_empty() {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded {
                    detail: format!("{} ceiling(s) exceeded", usage.exceeded.len()),
                }
            },
        );
        HealthSnapshot::from_components(components)
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Periodic housekeeping: stale rate state eviction. Deployments call
    /// this from a background task.
    pub fn run_maintenance(&self) {
        self.rate.cleanup_stale();
    }
}
