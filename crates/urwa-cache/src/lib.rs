//! Result caching keyed on request fingerprints, with single-flight
//! coalescing of concurrent identical requests.
//!
//! The fingerprint hashes the normalized URL together with the option
//! fields that change the fetched bytes. Concurrent calls sharing a
//! fingerprint elect a leader through the in-flight table; followers wait
//! for the leader's result and fall through to their own attempt if the
//! leader fails (no negative caching).

mod fingerprint;
mod store;

pub use fingerprint::{fingerprint, normalize_url};
pub use store::{Flight, FlightGuard, ResultCache};
