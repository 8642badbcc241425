//! Fetcher implementations for the urwa scraping core.
//!
//! The *light* strategy ships here as a plain reqwest client with response
//! classification. Stealth and ultra are external implementations of the
//! same `Fetcher` trait wired in through the `FetcherSet`; the core never
//! assumes anything about them beyond the contract.

mod classify;
mod http;
mod set;

pub use classify::{classify_response, looks_like_challenge};
pub use http::HttpFetcher;
pub use set::FetcherSet;
