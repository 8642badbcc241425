//! Adaptive strategy learning.
//!
//! Records every (domain, strategy) attempt outcome, exposes the stats the
//! selector uses to bias future ordering, and persists everything to an
//! append-only NDJSON journal so a restarted process starts with trained
//! priors. The journal compacts to one aggregate line per live pair once
//! it grows past a multiple of the live set; a failing journal degrades
//! the learner to in-memory operation rather than failing scrapes.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use urwa_config::LearnerConfig;
use urwa_types::{Strategy, StrategyStat, UrwaError};

/// One journal line: either a raw outcome event or a compacted aggregate.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum JournalLine {
    Aggregate {
        ts: DateTime<Utc>,
        domain: String,
        strategy: Strategy,
        attempts: u64,
        successes: u64,
        avg_response_ms: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_success_at: Option<DateTime<Utc>>,
    },
    Event {
        ts: DateTime<Utc>,
        domain: String,
        strategy: Strategy,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        elapsed_ms: Option<u64>,
    },
}

struct Journal {
    path: PathBuf,
    file: Mutex<tokio::fs::File>,
    line_count: AtomicUsize,
    degraded: AtomicBool,
    compact_multiplier: usize,
}

/// Strategy outcome learner with optional persistence.
pub struct Learner {
    stats: DashMap<String, HashMap<Strategy, StrategyStat>>,
    journal: Option<Journal>,
}

impl Learner {
    /// In-memory learner with no persistence.
    pub fn in_memory() -> Self {
        Self {
            stats: DashMap::new(),
            journal: None,
        }
    }

    /// Open the learner, replaying the journal when configured.
    pub async fn open(config: LearnerConfig) -> Result<Self, UrwaError> {
        let Some(path) = config.journal_path else {
            return Ok(Self::in_memory());
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let stats = DashMap::new();
        let mut line_count = 0usize;
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                for line in content.lines() {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    line_count += 1;
                    match serde_json::from_str::<JournalLine>(line) {
                        Ok(entry) => apply_line(&stats, entry),
                        Err(e) => {
                            warn!(error = %e, "Skipping malformed journal line");
                        }
                    }
                }
                info!(
                    path = %path.display(),
                    lines = line_count,
                    domains = stats.len(),
                    "Replayed strategy journal"
                );
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No journal yet; starting fresh");
            }
            Err(e) => return Err(e.into()),
        }

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            stats,
            journal: Some(Journal {
                path,
                file: Mutex::new(file),
                line_count: AtomicUsize::new(line_count),
                degraded: AtomicBool::new(false),
                compact_multiplier: config.compact_multiplier.max(2),
            }),
        })
    }

    /// Record one attempt outcome.
    pub async fn record(
        &self,
        domain: &str,
        strategy: Strategy,
        success: bool,
        elapsed_ms: Option<u64>,
    ) {
        self.stats
            .entry(domain.to_string())
            .or_default()
            .entry(strategy)
            .or_default()
            .record(success, elapsed_ms);

        if let Some(journal) = &self.journal {
            self.append_event(journal, domain, strategy, success, elapsed_ms)
                .await;
        }
    }

    async fn append_event(
        &self,
        journal: &Journal,
        domain: &str,
        strategy: Strategy,
        success: bool,
        elapsed_ms: Option<u64>,
    ) {
        if journal.degraded.load(Ordering::Relaxed) {
            return;
        }

        let entry = JournalLine::Event {
            ts: Utc::now(),
            domain: domain.to_string(),
            strategy,
            success,
            elapsed_ms,
        };
        let mut line = match serde_json::to_string(&entry) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to serialize journal entry");
                return;
            }
        };
        line.push('\n');

        {
            let mut file = journal.file.lock().await;
            if let Err(e) = file.write_all(line.as_bytes()).await {
                warn!(error = %e, "Journal write failed; learner degrading to in-memory");
                journal.degraded.store(true, Ordering::Relaxed);
                return;
            }
        }

        let lines = journal.line_count.fetch_add(1, Ordering::Relaxed) + 1;
        let live_pairs = self.live_pair_count().max(1);
        if lines > live_pairs * journal.compact_multiplier {
            self.compact(journal).await;
        }
    }

    fn live_pair_count(&self) -> usize {
        self.stats.iter().map(|entry| entry.value().len()).sum()
    }

    /// Rewrite the journal as one aggregate line per live pair.
    async fn compact(&self, journal: &Journal) {
        let mut lines = String::new();
        let mut count = 0usize;
        for entry in self.stats.iter() {
            for (strategy, stat) in entry.value().iter() {
                let line = JournalLine::Aggregate {
                    ts: Utc::now(),
                    domain: entry.key().clone(),
                    strategy: *strategy,
                    attempts: stat.attempts,
                    successes: stat.successes,
                    avg_response_ms: stat.avg_response_ms,
                    last_success_at: stat.last_success_at,
                };
                match serde_json::to_string(&line) {
                    Ok(serialized) => {
                        lines.push_str(&serialized);
                        lines.push('\n');
                        count += 1;
                    }
                    Err(e) => warn!(error = %e, "Skipping pair during compaction"),
                }
            }
        }

        let tmp_path = journal.path.with_extension("journal.tmp");
        let mut file = journal.file.lock().await;
        let result: std::io::Result<tokio::fs::File> = async {
            tokio::fs::write(&tmp_path, lines.as_bytes()).await?;
            tokio::fs::rename(&tmp_path, &journal.path).await?;
            tokio::fs::OpenOptions::new()
                .append(true)
                .open(&journal.path)
                .await
        }
        .await;

        match result {
            Ok(new_file) => {
                *file = new_file;
                journal.line_count.store(count, Ordering::Relaxed);
                info!(lines = count, path = %journal.path.display(), "Compacted strategy journal");
            }
            Err(e) => {
                warn!(error = %e, "Journal compaction failed; learner degrading to in-memory");
                journal.degraded.store(true, Ordering::Relaxed);
            }
        }
    }

    /// Snapshot of one domain's stats.
    pub fn stats(&self, domain: &str) -> HashMap<Strategy, StrategyStat> {
        self.stats
            .get(domain)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Snapshot of everything, for telemetry.
    pub fn all_stats(&self) -> HashMap<String, HashMap<Strategy, StrategyStat>> {
        self.stats
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Whether the journal is configured and still healthy.
    pub fn is_persistent(&self) -> bool {
        self.journal
            .as_ref()
            .map(|j| !j.degraded.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    pub fn journal_lines(&self) -> usize {
        self.journal
            .as_ref()
            .map(|j| j.line_count.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

fn apply_line(stats: &DashMap<String, HashMap<Strategy, StrategyStat>>, line: JournalLine) {
    match line {
        JournalLine::Event {
            domain,
            strategy,
            success,
            elapsed_ms,
            ..
        } => {
            stats
                .entry(domain)
                .or_default()
                .entry(strategy)
                .or_default()
                .record(success, elapsed_ms);
        }
        JournalLine::Aggregate {
            domain,
            strategy,
            attempts,
            successes,
            avg_response_ms,
            last_success_at,
            ..
        } => {
            stats.entry(domain).or_default().insert(
                strategy,
                StrategyStat {
                    attempts,
                    successes,
                    avg_response_ms,
                    last_success_at,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn journal_config(dir: &TempDir) -> LearnerConfig {
        LearnerConfig {
            journal_path: Some(dir.path().join("strategy.journal")),
            compact_multiplier: 10,
        }
    }

    #[tokio::test]
    async fn records_and_snapshots() {
        let learner = Learner::in_memory();
        learner
            .record("example.com", Strategy::Light, true, Some(120))
            .await;
        learner
            .record("example.com", Strategy::Light, false, None)
            .await;
        learner
            .record("example.com", Strategy::Stealth, true, Some(900))
            .await;

        let stats = learner.stats("example.com");
        assert_eq!(stats[&Strategy::Light].attempts, 2);
        assert_eq!(stats[&Strategy::Light].successes, 1);
        assert_eq!(stats[&Strategy::Stealth].attempts, 1);
        assert!(learner.stats("other.example").is_empty());
    }

    #[tokio::test]
    async fn journal_survives_restart() {
        let dir = TempDir::new().unwrap();

        {
            let learner = Learner::open(journal_config(&dir)).await.unwrap();
            for _ in 0..6 {
                learner
                    .record("example.com", Strategy::Light, true, Some(100))
                    .await;
            }
            assert!(learner.is_persistent());
        }

        let reopened = Learner::open(journal_config(&dir)).await.unwrap();
        let stats = reopened.stats("example.com");
        assert_eq!(stats[&Strategy::Light].attempts, 6);
        assert_eq!(stats[&Strategy::Light].successes, 6);
        assert!(stats[&Strategy::Light].is_trusted());
    }

    #[tokio::test]
    async fn journal_compacts_when_oversized() {
        let dir = TempDir::new().unwrap();
        let config = LearnerConfig {
            journal_path: Some(dir.path().join("strategy.journal")),
            compact_multiplier: 2,
        };

        let learner = Learner::open(config.clone()).await.unwrap();
        // One live pair, multiplier 2: the third event triggers compaction.
        for _ in 0..5 {
            learner
                .record("example.com", Strategy::Light, true, Some(50))
                .await;
        }
        assert!(
            learner.journal_lines() <= 3,
            "journal should have compacted, has {} lines",
            learner.journal_lines()
        );

        // Aggregates replay losslessly.
        let reopened = Learner::open(config).await.unwrap();
        assert_eq!(reopened.stats("example.com")[&Strategy::Light].attempts, 5);
    }

    #[tokio::test]
    async fn no_journal_means_in_memory() {
        let learner = Learner::open(LearnerConfig::default()).await.unwrap();
        learner
            .record("example.com", Strategy::Ultra, false, None)
            .await;
        assert!(!learner.is_persistent());
        assert_eq!(learner.stats("example.com")[&Strategy::Ultra].attempts, 1);
    }

    #[tokio::test]
    async fn all_stats_reports_every_domain() {
        let learner = Learner::in_memory();
        learner.record("a.example", Strategy::Light, true, None).await;
        learner.record("b.example", Strategy::Ultra, false, None).await;
        let all = learner.all_stats();
        assert_eq!(all.len(), 2);
    }
}
