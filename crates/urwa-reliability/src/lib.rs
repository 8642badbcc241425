//! Reliability patterns for the urwa scraping core.
//!
//! Three pieces, all keyed per domain: circuit breakers that stop hammering
//! a failing site, a rate controller that paces and adapts request spacing,
//! and the typed retry policy that decides whether a failure is worth
//! retrying on the same strategy before escalating.

pub mod circuit;
pub mod rate;
pub mod retry;

pub use circuit::{CircuitBreakerRegistry, CircuitSnapshot, CircuitState, DomainCircuit};
pub use rate::RateController;
pub use retry::{parse_retry_after, RetryDecision, RetryPolicy};
