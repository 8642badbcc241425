//! robots.txt fetching, caching, and matching.

use dashmap::DashMap;
use robotstxt::DefaultMatcher;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;
use urwa_config::ComplianceConfig;
use urwa_types::{domain_key, UrwaError};

/// Outcome of a robots.txt check for one URL.
#[derive(Debug, Clone, PartialEq)]
pub struct RobotsVerdict {
    pub allowed: bool,
    /// `Crawl-delay` for our agent group (or `*`), in seconds.
    pub crawl_delay: Option<f64>,
}

#[derive(Debug, Clone)]
struct CachedRobots {
    content: String,
    crawl_delay: Option<f64>,
    cached_at: Instant,
    ttl: Duration,
}

impl CachedRobots {
    fn is_expired(&self) -> bool {
        self.cached_at.elapsed() > self.ttl
    }
}

/// Per-domain robots.txt manager.
pub struct RobotsManager {
    config: ComplianceConfig,
    user_agent: String,
    cache: DashMap<String, CachedRobots>,
    http_client: reqwest::Client,
}

impl RobotsManager {
    pub fn new(config: ComplianceConfig, user_agent: String) -> Result<Self, UrwaError> {
        let http_client = reqwest::Client::builder()
            .user_agent(&user_agent)
            .timeout(Duration::from_secs(config.robots_fetch_timeout_seconds))
            .gzip(true)
            .build()
            .map_err(|e| UrwaError::Http(format!("robots client: {}", e)))?;

        Ok(Self {
            config,
            user_agent,
            cache: DashMap::new(),
            http_client,
        })
    }

    /// Check whether our agent may fetch this URL.
    ///
    /// With `robots_respect` disabled everything is allowed and no fetch is
    /// made. Robots fetch failures are permissive but cached on a shorter
    /// TTL so a recovering site is re-read soon.
    pub async fn check(&self, url: &Url) -> RobotsVerdict {
        if !self.config.robots_respect {
            debug!(url = %url, "Robots respect disabled, allowing");
            return RobotsVerdict {
                allowed: true,
                crawl_delay: None,
            };
        }

        let Some(domain) = domain_key(url) else {
            return RobotsVerdict {
                allowed: true,
                crawl_delay: None,
            };
        };

        let robots = self.get_robots(&domain, url).await;
        let mut matcher = DefaultMatcher::default();
        let allowed =
            matcher.one_agent_allowed_by_robots(&robots.content, &self.user_agent, url.as_str());

        debug!(url = %url, domain = %domain, allowed = allowed, "Robots check completed");
        RobotsVerdict {
            allowed,
            crawl_delay: robots.crawl_delay,
        }
    }

    async fn get_robots(&self, domain: &str, url: &Url) -> CachedRobots {
        if let Some(cached) = self.cache.get(domain) {
            if !cached.is_expired() {
                debug!(domain = %domain, "Using cached robots.txt");
                return cached.clone();
            }
            debug!(domain = %domain, "Cached robots.txt expired");
        }

        let authority = match url.port() {
            Some(port) => format!("{}:{}", url.host_str().unwrap_or(domain), port),
            None => url.host_str().unwrap_or(domain).to_string(),
        };
        let robots_url = format!("{}://{}/robots.txt", url.scheme(), authority);
        debug!(domain = %domain, robots_url = %robots_url, "Fetching robots.txt");

        let (content, ttl) = match self.fetch_robots(&robots_url).await {
            Ok(content) => (
                content,
                Duration::from_secs(self.config.robots_cache_ttl_seconds),
            ),
            Err(e) => {
                warn!(domain = %domain, error = %e, "Failed to fetch robots.txt, caching as permissive");
                (
                    String::new(),
                    Duration::from_secs(self.config.robots_failure_ttl_seconds),
                )
            }
        };

        let crawl_delay = extract_crawl_delay(&content, &self.user_agent);
        let cached = CachedRobots {
            content,
            crawl_delay,
            cached_at: Instant::now(),
            ttl,
        };
        self.cache.insert(domain.to_string(), cached.clone());
        cached
    }

    async fn fetch_robots(&self, robots_url: &str) -> Result<String, reqwest::Error> {
        let response = self.http_client.get(robots_url).send().await?;
        if response.status().is_success() {
            response.text().await
        } else {
            // Absent robots.txt is definitive: permissive, full TTL.
            debug!(robots_url = %robots_url, status = %response.status(), "robots.txt not found");
            Ok(String::new())
        }
    }

    pub fn cached_domains(&self) -> usize {
        self.cache.len()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

/// Extract `Crawl-delay` for the given agent, falling back to the `*`
/// group. Group parsing follows robots.txt conventions: consecutive
/// `User-agent` lines open a group whose directives follow.
fn extract_crawl_delay(content: &str, user_agent: &str) -> Option<f64> {
    let agent_token = user_agent
        .split(['/', ' '])
        .next()
        .unwrap_or(user_agent)
        .to_lowercase();

    let mut current_agents: Vec<String> = Vec::new();
    let mut in_group_header = true;
    let mut wildcard_delay: Option<f64> = None;
    let mut agent_delay: Option<f64> = None;

    for raw_line in content.lines() {
        let line = raw_line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let Some((field, value)) = line.split_once(':') else {
            continue;
        };
        let field = field.trim().to_lowercase();
        let value = value.trim();

        match field.as_str() {
            "user-agent" => {
                if !in_group_header {
                    current_agents.clear();
                    in_group_header = true;
                }
                current_agents.push(value.to_lowercase());
            }
            "crawl-delay" => {
                in_group_header = false;
                if let Ok(delay) = value.parse::<f64>() {
                    let delay = delay.max(0.0);
                    if current_agents.iter().any(|a| agent_token.contains(a.as_str()) || a == &agent_token) {
                        agent_delay = Some(delay);
                    } else if current_agents.iter().any(|a| a == "*") {
                        wildcard_delay = Some(delay);
                    }
                }
            }
            _ => {
                in_group_header = false;
            }
        }
    }

    agent_delay.or(wildcard_delay)
}
