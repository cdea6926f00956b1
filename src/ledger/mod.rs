//! Persistence collaborators for side effects derived from chat lines.
//!
//! The relay never waits on these: effects are executed on spawned tasks
//! and failures are logged.

pub mod file;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::common::error::{LedgerError, LedgerResult};
use crate::config::types::{LedgerConfig, LedgerKind};

pub use file::FileLedger;
pub use memory::MemoryLedger;

/// A completion shared by several players, such as a guild raid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub participants: Vec<String>,
    pub label: String,
    pub timestamp: DateTime<Utc>,
}

/// Stores completion records.
#[async_trait]
pub trait CompletionLedger: Send + Sync {
    async fn record_completion(&self, record: CompletionRecord) -> LedgerResult<()>;
}

/// Tracks reward balances per identity.
#[async_trait]
pub trait RewardLedger: Send + Sync {
    /// Apply `delta` and return the new balance.
    async fn adjust_reward(&self, identity: &str, delta: f64) -> LedgerResult<f64>;
}

/// The ledgers used by the effect runner.
#[derive(Clone)]
pub struct Ledgers {
    pub completions: Arc<dyn CompletionLedger>,
    pub rewards: Arc<dyn RewardLedger>,
}

impl Ledgers {
    /// Both ledgers backed by one in-memory store.
    pub fn in_memory() -> (Self, Arc<MemoryLedger>) {
        let ledger = Arc::new(MemoryLedger::new());
        let ledgers = Self {
            completions: ledger.clone(),
            rewards: ledger.clone(),
        };
        (ledgers, ledger)
    }
}

/// Build the ledgers selected by configuration.
pub async fn build_ledgers(config: &LedgerConfig) -> LedgerResult<Ledgers> {
    match config.kind {
        LedgerKind::Memory => {
            info!("Using in-memory ledger, records are lost on restart");
            Ok(Ledgers::in_memory().0)
        }
        LedgerKind::File => {
            let directory = config.directory.as_deref().ok_or_else(|| LedgerError::Unavailable {
                message: "ledger.directory is required for the file ledger".to_string(),
            })?;
            let ledger = Arc::new(FileLedger::open(directory).await?);
            info!(directory, "Using file ledger");
            Ok(Ledgers {
                completions: ledger.clone(),
                rewards: ledger,
            })
        }
    }
}
