//! Append-only JSON-lines ledger.
//!
//! Completions go to `completions.jsonl`, reward adjustments to
//! `rewards.jsonl`. Each reward line carries the resulting balance, so the
//! balances are rebuilt on open by keeping the last line per identity.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use backon::BackoffBuilder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{CompletionLedger, CompletionRecord, RewardLedger};
use crate::common::error::LedgerResult;

pub const COMPLETIONS_FILE: &str = "completions.jsonl";
pub const REWARDS_FILE: &str = "rewards.jsonl";

/// One line of `rewards.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardEntry {
    pub identity: String,
    pub delta: f64,
    pub balance: f64,
    pub timestamp: DateTime<Utc>,
}

/// Backoff for a single ledger write: 50ms initial, 3 retries.
fn write_backoff() -> impl Iterator<Item = Duration> {
    backon::ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(50))
        .with_max_delay(Duration::from_secs(1))
        .with_jitter()
        .with_max_times(3)
        .build()
}

pub struct FileLedger {
    directory: PathBuf,
    balances: Mutex<HashMap<String, f64>>,
    completions: Mutex<()>,
}

impl FileLedger {
    /// Open (or create) a ledger directory and replay reward balances.
    pub async fn open(directory: impl AsRef<Path>) -> LedgerResult<Self> {
        let directory = directory.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&directory).await?;

        let balances = replay_balances(&directory.join(REWARDS_FILE)).await?;
        debug!(
            directory = %directory.display(),
            identities = balances.len(),
            "Replayed reward balances"
        );

        Ok(Self {
            directory,
            balances: Mutex::new(balances),
            completions: Mutex::new(()),
        })
    }

    #[cfg(test)]
    pub async fn balance(&self, identity: &str) -> f64 {
        self.balances.lock().await.get(identity).copied().unwrap_or(0.0)
    }

    async fn append_line<T: Serialize>(&self, file: &str, entry: &T) -> LedgerResult<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let path = self.directory.join(file);

        let mut backoff = write_backoff();
        loop {
            match append(&path, line.as_bytes()).await {
                Ok(()) => return Ok(()),
                Err(e) => match backoff.next() {
                    Some(delay) => {
                        warn!(
                            path = %path.display(),
                            error = %e,
                            "Ledger write failed, retrying in {:.2}s",
                            delay.as_secs_f64()
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(e.into()),
                },
            }
        }
    }
}

async fn append(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path).await?;
    file.write_all(bytes).await?;
    file.flush().await
}

async fn replay_balances(path: &Path) -> LedgerResult<HashMap<String, f64>> {
    let mut balances = HashMap::new();
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(balances),
        Err(e) => return Err(e.into()),
    };

    for (number, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<RewardEntry>(line) {
            Ok(entry) => {
                balances.insert(entry.identity, entry.balance);
            }
            Err(e) => warn!(line = number + 1, error = %e, "Skipping corrupt reward entry"),
        }
    }
    Ok(balances)
}

#[async_trait]
impl CompletionLedger for FileLedger {
    async fn record_completion(&self, record: CompletionRecord) -> LedgerResult<()> {
        let _guard = self.completions.lock().await;
        self.append_line(COMPLETIONS_FILE, &record).await
    }
}

#[async_trait]
impl RewardLedger for FileLedger {
    async fn adjust_reward(&self, identity: &str, delta: f64) -> LedgerResult<f64> {
        let mut balances = self.balances.lock().await;
        let balance = balances.get(identity).copied().unwrap_or(0.0) + delta;

        let entry = RewardEntry {
            identity: identity.to_string(),
            delta,
            balance,
            timestamp: Utc::now(),
        };
        self.append_line(REWARDS_FILE, &entry).await?;

        // Only commit once the line is on disk
        balances.insert(identity.to_string(), balance);
        Ok(balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::LedgerError;

    #[tokio::test]
    async fn test_rewards_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let ledger = FileLedger::open(dir.path()).await.unwrap();
            ledger.adjust_reward("Alice", 0.5).await.unwrap();
            ledger.adjust_reward("Alice", 0.5).await.unwrap();
            assert_eq!(ledger.adjust_reward("Bob", -1.0).await.unwrap(), -1.0);
        }

        let reopened = FileLedger::open(dir.path()).await.unwrap();
        assert_eq!(reopened.balance("Alice").await, 1.0);
        assert_eq!(reopened.balance("Bob").await, -1.0);
        assert_eq!(reopened.adjust_reward("Alice", 0.5).await.unwrap(), 1.5);
    }

    #[tokio::test]
    async fn test_completion_lines_appended() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::open(dir.path()).await.unwrap();

        for label in ["Nest of the Grootslangs", "The Canyon Colossus"] {
            ledger
                .record_completion(CompletionRecord {
                    participants: vec!["Alice".into(), "Bob".into(), "Carol".into(), "Dave".into()],
                    label: label.into(),
                    timestamp: Utc::now(),
                })
                .await
                .unwrap();
        }

        let contents = std::fs::read_to_string(dir.path().join(COMPLETIONS_FILE)).unwrap();
        let records: Vec<CompletionRecord> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].label, "The Canyon Colossus");
        assert_eq!(records[0].participants.len(), 4);
    }

    #[tokio::test]
    async fn test_corrupt_reward_line_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let valid = serde_json::to_string(&RewardEntry {
            identity: "Alice".into(),
            delta: 2.0,
            balance: 2.0,
            timestamp: Utc::now(),
        })
        .unwrap();
        std::fs::write(
            dir.path().join(REWARDS_FILE),
            format!("{}\n{{not json\n", valid),
        )
        .unwrap();

        let ledger = FileLedger::open(dir.path()).await.unwrap();
        assert_eq!(ledger.balance("Alice").await, 2.0);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_balance_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let ledger_dir = dir.path().join("ledger");
        let ledger = FileLedger::open(&ledger_dir).await.unwrap();
        ledger.adjust_reward("Alice", 1.0).await.unwrap();

        std::fs::remove_dir_all(&ledger_dir).unwrap();

        let result = ledger.adjust_reward("Alice", 1.0).await;
        assert!(matches!(result, Err(LedgerError::Io(_))));
        assert_eq!(ledger.balance("Alice").await, 1.0);
    }
}
