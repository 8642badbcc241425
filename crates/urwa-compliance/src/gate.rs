//! Combined compliance decision: blacklist first, then robots.txt.

use crate::robots::RobotsManager;
use std::collections::HashSet;
use tracing::{debug, info};
use url::Url;
use urwa_config::ComplianceConfig;
use urwa_types::{domain_key, FailureKind, UrwaError};

/// Why a URL was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Blacklisted,
    RobotsDisallow,
}

impl DenyReason {
    /// The failure kind surfaced to the caller. Blacklisting reads as an
    /// active block; robots denial is its own non-retryable kind.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            DenyReason::Blacklisted => FailureKind::Http4xxBlocked,
            DenyReason::RobotsDisallow => FailureKind::ComplianceDenied,
        }
    }
}

/// Outcome of the compliance gate for one URL.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub allowed: bool,
    pub reason: Option<DenyReason>,
    /// robots `Crawl-delay` seed for the rate controller, seconds.
    pub crawl_delay: Option<f64>,
}

impl Decision {
    fn allow(crawl_delay: Option<f64>) -> Self {
        Self {
            allowed: true,
            reason: None,
            crawl_delay,
        }
    }

    fn deny(reason: DenyReason) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            crawl_delay: None,
        }
    }
}

/// Gate every request passes before touching rate or circuit state.
pub struct ComplianceGate {
    robots: RobotsManager,
    blacklist: HashSet<String>,
}

impl ComplianceGate {
    pub fn new(config: ComplianceConfig, user_agent: String) -> Result<Self, UrwaError> {
        let blacklist = config
            .blacklist
            .iter()
            .map(|d| d.trim().to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        let robots = RobotsManager::new(config, user_agent)?;
        Ok(Self { robots, blacklist })
    }

    /// Decide whether this URL may be fetched at all.
    pub async fn decide(&self, url: &Url) -> Decision {
        if self.is_blacklisted(url) {
            info!(url = %url, "Denied: domain is blacklisted");
            return Decision::deny(DenyReason::Blacklisted);
        }

        let verdict = self.robots.check(url).await;
        if !verdict.allowed {
            info!(url = %url, "Denied: robots.txt disallows path");
            return Decision::deny(DenyReason::RobotsDisallow);
        }

        debug!(url = %url, crawl_delay = ?verdict.crawl_delay, "Compliance gate passed");
        Decision::allow(verdict.crawl_delay)
    }

    fn is_blacklisted(&self, url: &Url) -> bool {
        if self.blacklist.is_empty() {
            return false;
        }
        let host = url
            .host_str()
            .map(|h| h.to_ascii_lowercase())
            .unwrap_or_default();
        let domain = domain_key(url).unwrap_or_default();

        self.blacklist.iter().any(|entry| {
            host == *entry || domain == *entry || host.ends_with(&format!(".{}", entry))
        })
    }

    /// Add a domain to the blacklist at runtime.
    pub fn blacklist_domain(&mut self, domain: impl Into<String>) {
        self.blacklist.insert(domain.into().to_ascii_lowercase());
    }
}
