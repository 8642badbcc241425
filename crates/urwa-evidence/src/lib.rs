//! Evidence capture on terminal failures.
//!
//! When a fetch fails in a way worth investigating (challenge, block, rate
//! limit), the capturer persists what came back: a metadata file, the
//! response headers, and the first few KiB of body, in a directory named
//! by the call's trace ID. Retention is a rolling cap evicting oldest
//! first. Capture is best-effort by contract: storage trouble is logged
//! and never alters the scrape outcome.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::path::PathBuf;
use tracing::{debug, warn};
use urwa_config::EvidenceConfig;
use urwa_types::{FailureKind, FetchOutcome};

/// One captured failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub trace_id: String,
    pub domain: String,
    pub url: String,
    pub attempt: u32,
    pub kind: FailureKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    /// Short SHA-256 digest of the response headers.
    pub headers_digest: String,
    /// Lossy excerpt of the response body, capped at the configured size.
    pub body_excerpt: String,
    /// Directory holding the on-disk artifacts, when persistence is on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    pub captured_at: DateTime<Utc>,
}

/// Rolling evidence store.
pub struct EvidenceCapturer {
    config: EvidenceConfig,
    index: Mutex<VecDeque<EvidenceRecord>>,
}

impl EvidenceCapturer {
    pub fn new(config: EvidenceConfig) -> Self {
        Self {
            config,
            index: Mutex::new(VecDeque::new()),
        }
    }

    /// Capture evidence for a failed attempt. Returns the artifact handle
    /// when the on-disk write succeeded.
    pub async fn capture(
        &self,
        trace_id: &str,
        domain: &str,
        url: &str,
        attempt: u32,
        outcome: &FetchOutcome,
    ) -> Option<String> {
        let kind = outcome.failure_kind();
        let headers_digest = digest_headers(&outcome.headers);
        let excerpt_cap = self.config.body_excerpt_bytes;
        let body_excerpt = outcome
            .content
            .as_ref()
            .map(|body| {
                let window = &body[..body.len().min(excerpt_cap)];
                String::from_utf8_lossy(window).into_owned()
            })
            .unwrap_or_default();

        let handle = match &self.config.dir {
            Some(root) => {
                match self
                    .write_artifacts(root, trace_id, attempt, outcome, &body_excerpt, kind)
                    .await
                {
                    Ok(dir) => Some(dir),
                    Err(e) => {
                        warn!(trace_id = %trace_id, error = %e, "Evidence write failed; keeping in-memory record only");
                        None
                    }
                }
            }
            None => None,
        };

        let record = EvidenceRecord {
            trace_id: trace_id.to_string(),
            domain: domain.to_string(),
            url: url.to_string(),
            attempt,
            kind,
            http_status: outcome.http_status,
            headers_digest,
            body_excerpt,
            handle: handle.clone(),
            captured_at: Utc::now(),
        };

        debug!(trace_id = %trace_id, domain = %domain, kind = %kind, "Captured evidence");
        let evicted = {
            let mut index = self.index.lock();
            index.push_back(record);
            let mut evicted = Vec::new();
            while index.len() > self.config.retention_count {
                if let Some(old) = index.pop_front() {
                    evicted.push(old);
                }
            }
            evicted
        };

        for old in evicted {
            self.remove_artifacts(old).await;
        }

        handle
    }

    async fn write_artifacts(
        &self,
        root: &PathBuf,
        trace_id: &str,
        attempt: u32,
        outcome: &FetchOutcome,
        body_excerpt: &str,
        kind: FailureKind,
    ) -> std::io::Result<String> {
        let dir = root.join(trace_id);
        tokio::fs::create_dir_all(&dir).await?;

        let meta = serde_json::json!({
            "trace_id": trace_id,
            "attempt": attempt,
            "kind": kind,
            "http_status": outcome.http_status,
            "final_url": outcome.final_url,
            "elapsed_ms": outcome.elapsed_ms,
            "captured_at": Utc::now(),
        });
        tokio::fs::write(dir.join("meta.json"), serde_json::to_vec_pretty(&meta)?).await?;

        let headers: serde_json::Map<String, serde_json::Value> = outcome
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        tokio::fs::write(
            dir.join("headers.json"),
            serde_json::to_vec_pretty(&serde_json::Value::Object(headers))?,
        )
        .await?;

        tokio::fs::write(dir.join("body.bin"), body_excerpt.as_bytes()).await?;

        Ok(dir.to_string_lossy().into_owned())
    }

    async fn remove_artifacts(&self, record: EvidenceRecord) {
        let Some(handle) = record.handle else {
            return;
        };
        // Another retained record may still point at this trace directory.
        let still_referenced = {
            let index = self.index.lock();
            index
                .iter()
                .any(|r| r.handle.as_deref() == Some(handle.as_str()))
        };
        if still_referenced {
            return;
        }
        if let Err(e) = tokio::fs::remove_dir_all(&handle).await {
            debug!(handle = %handle, error = %e, "Failed to remove evicted evidence");
        }
    }

    /// Newest-first recent records.
    pub fn recent(&self, limit: usize) -> Vec<EvidenceRecord> {
        let index = self.index.lock();
        index.iter().rev().take(limit).cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.index.lock().len()
    }

    pub fn is_persistent(&self) -> bool {
        self.config.dir.is_some()
    }
}

fn digest_headers(headers: &[(String, String)]) -> String {
    let mut hasher = Sha256::new();
    for (name, value) in headers {
        hasher.update(name.as_bytes());
        hasher.update(b": ");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::TempDir;

    fn failed_outcome() -> FetchOutcome {
        FetchOutcome {
            success: false,
            content: Some(Bytes::from_static(b"<html>blocked</html>")),
            http_status: Some(403),
            headers: vec![("server".to_string(), "cloudflare".to_string())],
            elapsed_ms: 42,
            kind: Some(FailureKind::Http4xxBlocked),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn captures_artifacts_on_disk() {
        let dir = TempDir::new().unwrap();
        let capturer = EvidenceCapturer::new(EvidenceConfig {
            dir: Some(dir.path().to_path_buf()),
            ..EvidenceConfig::default()
        });

        let handle = capturer
            .capture("trace1", "example.com", "https://example.com/x", 1, &failed_outcome())
            .await
            .expect("handle");

        let handle_path = PathBuf::from(&handle);
        assert!(handle_path.join("meta.json").exists());
        assert!(handle_path.join("headers.json").exists());
        assert!(handle_path.join("body.bin").exists());

        let record = &capturer.recent(1)[0];
        assert_eq!(record.kind, FailureKind::Http4xxBlocked);
        assert_eq!(record.http_status, Some(403));
        assert!(record.body_excerpt.contains("blocked"));
    }

    #[tokio::test]
    async fn retention_cap_holds() {
        let capturer = EvidenceCapturer::new(EvidenceConfig {
            dir: None,
            retention_count: 3,
            ..EvidenceConfig::default()
        });

        for i in 0..10 {
            capturer
                .capture(
                    &format!("trace{}", i),
                    "example.com",
                    "https://example.com/x",
                    1,
                    &failed_outcome(),
                )
                .await;
        }
        assert_eq!(capturer.count(), 3);
        let recent = capturer.recent(10);
        assert_eq!(recent[0].trace_id, "trace9");
        assert_eq!(recent[2].trace_id, "trace7");
    }

    #[tokio::test]
    async fn eviction_removes_artifacts() {
        let dir = TempDir::new().unwrap();
        let capturer = EvidenceCapturer::new(EvidenceConfig {
            dir: Some(dir.path().to_path_buf()),
            retention_count: 1,
            ..EvidenceConfig::default()
        });

        let first = capturer
            .capture("trace-a", "example.com", "https://example.com/1", 1, &failed_outcome())
            .await
            .unwrap();
        capturer
            .capture("trace-b", "example.com", "https://example.com/2", 1, &failed_outcome())
            .await
            .unwrap();

        assert_eq!(capturer.count(), 1);
        assert!(!PathBuf::from(first).exists(), "evicted artifacts removed");
    }

    #[tokio::test]
    async fn excerpt_capped() {
        let capturer = EvidenceCapturer::new(EvidenceConfig {
            dir: None,
            body_excerpt_bytes: 8,
            ..EvidenceConfig::default()
        });
        let outcome = FetchOutcome {
            content: Some(Bytes::from(vec![b'a'; 100])),
            kind: Some(FailureKind::Challenge),
            ..FetchOutcome::default()
        };
        capturer
            .capture("t", "example.com", "https://example.com/", 1, &outcome)
            .await;
        assert_eq!(capturer.recent(1)[0].body_excerpt.len(), 8);
    }

    #[tokio::test]
    async fn headers_digest_is_stable() {
        let a = digest_headers(&[("a".to_string(), "1".to_string())]);
        let b = digest_headers(&[("a".to_string(), "1".to_string())]);
        let c = digest_headers(&[("a".to_string(), "2".to_string())]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }
}
