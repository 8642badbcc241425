//! Per-call context: trace ID, deadline, cancellation.
//!
//! Every scrape call owns one `ScrapeContext`. All suspension points in the
//! core (single-flight waits, probe waits, rate slots, fetches, retry
//! backoffs) select against it so cancellation and deadline expiry unwind
//! promptly.

use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Why a context-aware wait was cut short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    Cancelled,
    DeadlineExceeded,
}

/// Cancels the paired `ScrapeContext` when invoked (or dropped callers keep
/// the context running; dropping the handle does not cancel).
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        // Receivers observe the change; send only fails when every context
        // clone is gone, in which case there is nothing to cancel.
        let _ = self.tx.send(true);
    }
}

/// Context threaded through one scrape call.
#[derive(Debug, Clone)]
pub struct ScrapeContext {
    trace_id: String,
    deadline: Instant,
    cancel_rx: watch::Receiver<bool>,
}

impl ScrapeContext {
    /// Create a context expiring `timeout` from now.
    pub fn new(trace_id: impl Into<String>, timeout: Duration) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                trace_id: trace_id.into(),
                deadline: Instant::now() + timeout,
                cancel_rx: rx,
            },
            CancelHandle { tx },
        )
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Resolves when the context is cancelled; pends forever otherwise.
    pub async fn cancelled(&self) {
        let mut rx = self.cancel_rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender gone: cancellation can no longer arrive.
                std::future::pending::<()>().await;
            }
        }
    }

    /// Sleep for `duration`, waking early on cancellation or deadline.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        if self.is_cancelled() {
            return Err(Interrupted::Cancelled);
        }
        let remaining = self.remaining();
        if remaining.is_zero() {
            return Err(Interrupted::DeadlineExceeded);
        }
        let capped = duration.min(remaining);
        tokio::select! {
            _ = tokio::time::sleep(capped) => {
                if duration > remaining {
                    Err(Interrupted::DeadlineExceeded)
                } else {
                    Ok(())
                }
            }
            _ = self.cancelled() => Err(Interrupted::Cancelled),
        }
    }

    /// Sleep until `instant`, waking early on cancellation or deadline.
    pub async fn sleep_until(&self, instant: Instant) -> Result<(), Interrupted> {
        let now = Instant::now();
        if instant <= now {
            return Ok(());
        }
        self.sleep(instant - now).await
    }
}
