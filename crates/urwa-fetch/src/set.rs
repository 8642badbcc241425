//! Strategy-to-fetcher registry.

use std::collections::HashMap;
use std::sync::Arc;
use urwa_types::{Fetcher, Strategy};

/// The fetchers available to the engine, keyed by strategy.
///
/// Selection is data-driven: a closed set of three slots, no hierarchy.
/// Deployments without a browser stack simply leave stealth/ultra empty
/// and the selector never reaches them.
#[derive(Clone, Default)]
pub struct FetcherSet {
    fetchers: HashMap<Strategy, Arc<dyn Fetcher>>,
}

impl FetcherSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fetcher under its own declared strategy.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetchers.insert(fetcher.strategy(), fetcher);
        self
    }

    pub fn get(&self, strategy: Strategy) -> Option<Arc<dyn Fetcher>> {
        self.fetchers.get(&strategy).cloned()
    }

    pub fn has(&self, strategy: Strategy) -> bool {
        self.fetchers.contains_key(&strategy)
    }

    /// Registered strategies in escalation order.
    pub fn available(&self) -> Vec<Strategy> {
        Strategy::ESCALATION_ORDER
            .into_iter()
            .filter(|s| self.fetchers.contains_key(s))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fetchers.is_empty()
    }
}
