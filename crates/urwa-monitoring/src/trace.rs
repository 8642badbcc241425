//! Trace ID minting.

use uuid::Uuid;

/// Mint a new trace ID: 32 lowercase hex characters, one per scrape call.
pub fn new_trace_id() -> String {
    Uuid::new_v4().simple().to_string()
}
