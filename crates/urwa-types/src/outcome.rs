//! Fetch outcome type returned by every fetcher.

use crate::failure::FailureKind;
use bytes::Bytes;

/// The in-band result of a single fetch attempt.
///
/// Fetchers never return `Err`; anything that went wrong is described by
/// `kind`. Headers are carried for evidence capture and `Retry-After`
/// handling.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub success: bool,
    pub content: Option<Bytes>,
    pub final_url: Option<String>,
    pub http_status: Option<u16>,
    pub headers: Vec<(String, String)>,
    pub elapsed_ms: u64,
    pub kind: Option<FailureKind>,
    pub evidence_handle: Option<String>,
    pub redirect_count: u32,
}

impl FetchOutcome {
    /// Successful outcome with content.
    pub fn ok(content: Bytes, elapsed_ms: u64) -> Self {
        Self {
            success: true,
            content: Some(content),
            elapsed_ms,
            ..Default::default()
        }
    }

    /// Failed outcome of the given kind.
    pub fn failed(kind: FailureKind, elapsed_ms: u64) -> Self {
        Self {
            success: false,
            kind: Some(kind),
            elapsed_ms,
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_final_url(mut self, url: impl Into<String>) -> Self {
        self.final_url = Some(url.into());
        self
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    /// The failure kind, defaulting to `Unknown` for malformed failures.
    pub fn failure_kind(&self) -> FailureKind {
        self.kind.unwrap_or(FailureKind::Unknown)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_length(&self) -> usize {
        self.content.as_ref().map(|b| b.len()).unwrap_or(0)
    }
}
