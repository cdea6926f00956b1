//! In-memory ledger.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{CompletionLedger, CompletionRecord, RewardLedger};
use crate::common::error::LedgerResult;

#[derive(Debug, Default)]
pub struct MemoryLedger {
    completions: Mutex<Vec<CompletionRecord>>,
    balances: Mutex<HashMap<String, f64>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn completions(&self) -> Vec<CompletionRecord> {
        self.completions.lock().await.clone()
    }

    /// Current balance, zero for unknown identities.
    #[cfg(test)]
    pub async fn balance(&self, identity: &str) -> f64 {
        self.balances.lock().await.get(identity).copied().unwrap_or(0.0)
    }
}

#[async_trait]
impl CompletionLedger for MemoryLedger {
    async fn record_completion(&self, record: CompletionRecord) -> LedgerResult<()> {
        self.completions.lock().await.push(record);
        Ok(())
    }
}

#[async_trait]
impl RewardLedger for MemoryLedger {
    async fn adjust_reward(&self, identity: &str, delta: f64) -> LedgerResult<f64> {
        let mut balances = self.balances.lock().await;
        let balance = balances.entry(identity.to_string()).or_insert(0.0);
        *balance += delta;
        Ok(*balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_rewards_accumulate_per_identity() {
        let ledger = MemoryLedger::new();

        assert_eq!(ledger.adjust_reward("Alice", 0.5).await.unwrap(), 0.5);
        assert_eq!(ledger.adjust_reward("Alice", 0.5).await.unwrap(), 1.0);
        assert_eq!(ledger.adjust_reward("Bob", -1.0).await.unwrap(), -1.0);

        assert_eq!(ledger.balance("Alice").await, 1.0);
        assert_eq!(ledger.balance("Nobody").await, 0.0);
    }

    #[tokio::test]
    async fn test_completions_kept_in_order() {
        let ledger = MemoryLedger::new();
        for label in ["first", "second"] {
            ledger
                .record_completion(CompletionRecord {
                    participants: vec!["Alice".into()],
                    label: label.into(),
                    timestamp: Utc::now(),
                })
                .await
                .unwrap();
        }

        let labels: Vec<String> = ledger.completions().await.into_iter().map(|r| r.label).collect();
        assert_eq!(labels, vec!["first", "second"]);
    }
}
