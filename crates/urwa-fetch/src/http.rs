//! The light strategy: a plain HTTP client.

use crate::classify::classify_response;
use async_trait::async_trait;
use bytes::BytesMut;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;
use urwa_types::{FailureKind, FetchOutcome, Fetcher, ScrapeContext, Strategy, UrwaError};

/// reqwest-backed light fetcher.
///
/// No evasion, no browser: gzip/brotli, a cookie store, and a bounded
/// redirect chain. Also used (with a body cap) as the profiler's probe
/// client.
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_body_bytes: Option<usize>,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, UrwaError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .gzip(true)
            .brotli(true)
            .cookie_store(true)
            .connect_timeout(Duration::from_secs(5))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| UrwaError::Http(format!("light fetcher client: {}", e)))?;

        Ok(Self {
            client,
            timeout,
            max_body_bytes: None,
        })
    }

    /// Cap the body read, truncating beyond `max_bytes`.
    pub fn with_max_body(mut self, max_bytes: usize) -> Self {
        self.max_body_bytes = Some(max_bytes);
        self
    }

    async fn execute(&self, ctx: &ScrapeContext, url: &Url) -> FetchOutcome {
        let started = Instant::now();
        let effective_timeout = self.timeout.min(ctx.remaining());
        if effective_timeout.is_zero() {
            return FetchOutcome::failed(FailureKind::Timeout, 0);
        }

        let request = self.client.get(url.clone()).timeout(effective_timeout);

        let response = tokio::select! {
            result = request.send() => result,
            _ = ctx.cancelled() => {
                debug!(url = %url, "Fetch cancelled mid-flight");
                return FetchOutcome::failed(
                    FailureKind::Cancelled,
                    started.elapsed().as_millis() as u64,
                );
            }
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                let elapsed = started.elapsed().as_millis() as u64;
                let kind = if e.is_timeout() {
                    FailureKind::Timeout
                } else if e.is_connect() {
                    FailureKind::Connection
                } else if e.is_redirect() {
                    FailureKind::Unknown
                } else {
                    FailureKind::Connection
                };
                warn!(url = %url, error = %e, kind = %kind, "Light fetch failed");
                return FetchOutcome::failed(kind, elapsed);
            }
        };

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        // The redirect chain is not observable through reqwest's pool;
        // approximate it from whether the final URL moved.
        let redirect_count = u32::from(final_url.trim_end_matches('/') != url.as_str().trim_end_matches('/'));

        let body = match self.read_body(ctx, response).await {
            Ok(body) => body,
            Err(kind) => {
                return FetchOutcome {
                    success: false,
                    kind: Some(kind),
                    http_status: Some(status),
                    final_url: Some(final_url),
                    headers,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    ..Default::default()
                };
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match classify_response(status, &body) {
            None => FetchOutcome {
                success: true,
                content: Some(body.freeze()),
                final_url: Some(final_url),
                http_status: Some(status),
                headers,
                elapsed_ms,
                kind: None,
                evidence_handle: None,
                redirect_count,
            },
            Some(kind) => {
                debug!(url = %url, status = status, kind = %kind, "Light fetch classified as failure");
                FetchOutcome {
                    success: false,
                    content: Some(body.freeze()),
                    final_url: Some(final_url),
                    http_status: Some(status),
                    headers,
                    elapsed_ms,
                    kind: Some(kind),
                    evidence_handle: None,
                    redirect_count,
                }
            }
        }
    }

    async fn read_body(
        &self,
        ctx: &ScrapeContext,
        mut response: reqwest::Response,
    ) -> Result<BytesMut, FailureKind> {
        let mut body = BytesMut::new();
        loop {
            let chunk = tokio::select! {
                chunk = response.chunk() => chunk,
                _ = ctx.cancelled() => return Err(FailureKind::Cancelled),
            };
            match chunk {
                Ok(Some(chunk)) => {
                    body.extend_from_slice(&chunk);
                    if let Some(cap) = self.max_body_bytes {
                        if body.len() >= cap {
                            body.truncate(cap);
                            return Ok(body);
                        }
                    }
                }
                Ok(None) => return Ok(body),
                Err(e) if e.is_timeout() => return Err(FailureKind::Timeout),
                Err(_) => return Err(FailureKind::Connection),
            }
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn strategy(&self) -> Strategy {
        Strategy::Light
    }

    async fn fetch(&self, ctx: &ScrapeContext, url: &Url) -> FetchOutcome {
        self.execute(ctx, url).await
    }
}
