//! Structured log records with a bounded in-memory buffer.
//!
//! Records are mirrored to `tracing` at emission so normal subscribers see
//! them, while the buffer serves the `recent_logs` telemetry query without
//! touching the subscriber stack.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// One structured log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub ts: DateTime<Utc>,
    pub level: LogLevel,
    pub trace_id: String,
    pub component: String,
    pub msg: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub fields: Value,
}

/// Bounded ring buffer of structured log records.
pub struct EventLog {
    buffer: Mutex<VecDeque<LogRecord>>,
    capacity: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    /// Append a record and mirror it to `tracing`.
    pub fn record(
        &self,
        level: LogLevel,
        trace_id: &str,
        component: &str,
        msg: &str,
        fields: Value,
    ) {
        match level {
            LogLevel::Debug => {
                tracing::debug!(trace_id = %trace_id, component = %component, fields = %fields, "{}", msg)
            }
            LogLevel::Info => {
                tracing::info!(trace_id = %trace_id, component = %component, fields = %fields, "{}", msg)
            }
            LogLevel::Warn => {
                tracing::warn!(trace_id = %trace_id, component = %component, fields = %fields, "{}", msg)
            }
            LogLevel::Error => {
                tracing::error!(trace_id = %trace_id, component = %component, fields = %fields, "{}", msg)
            }
        }

        let record = LogRecord {
            ts: Utc::now(),
            level,
            trace_id: trace_id.to_string(),
            component: component.to_string(),
            msg: msg.to_string(),
            fields,
        };

        let mut buffer = self.buffer.lock();
        if buffer.len() == self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(record);
    }

    /// Newest-first slice of recent records at or above `min_level`.
    pub fn recent(&self, limit: usize, min_level: LogLevel) -> Vec<LogRecord> {
        let buffer = self.buffer.lock();
        buffer
            .iter()
            .rev()
            .filter(|r| r.level >= min_level)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }
}
