//! Port definitions implemented outside the core.

use crate::context::ScrapeContext;
use crate::outcome::FetchOutcome;
use crate::strategy::Strategy;
use async_trait::async_trait;
use url::Url;

/// A fetch strategy implementation.
///
/// Contract:
/// - Returns promptly when the context is cancelled; reports its own timer
///   expiry as `FailureKind::Timeout`.
/// - Never sleeps for rate control; pacing belongs to the runner.
/// - Never fails out-of-band: every failure is a `FetchOutcome` with a
///   populated `kind`.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// The strategy this fetcher implements.
    fn strategy(&self) -> Strategy;

    /// Fetch the URL, classifying any failure in-band.
    async fn fetch(&self, ctx: &ScrapeContext, url: &Url) -> FetchOutcome;
}
