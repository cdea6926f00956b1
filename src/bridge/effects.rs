//! Execution of side effects requested by classification rules.
//!
//! Effects run on their own tasks so a slow or failing ledger never holds
//! up the relay loop. Failures are logged and dropped.

use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::game::patterns::Effect;
use crate::ledger::{CompletionRecord, Ledgers};

pub struct EffectRunner {
    ledgers: Ledgers,
    tasks: JoinSet<()>,
}

impl EffectRunner {
    pub fn new(ledgers: Ledgers) -> Self {
        Self {
            ledgers,
            tasks: JoinSet::new(),
        }
    }

    /// Spawn one task per effect.
    pub fn dispatch(&mut self, effects: Vec<Effect>) {
        self.reap();
        for effect in effects {
            let ledgers = self.ledgers.clone();
            self.tasks.spawn(async move { run_effect(&ledgers, effect).await });
        }
    }

    /// Number of effect tasks not yet reaped.
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every pending effect to finish.
    pub async fn drain(&mut self) {
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                warn!("Effect task failed: {}", e);
            }
        }
    }

    fn reap(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            if let Err(e) = result {
                warn!("Effect task failed: {}", e);
            }
        }
    }
}

async fn run_effect(ledgers: &Ledgers, effect: Effect) {
    match effect {
        Effect::RecordCompletion {
            participants,
            label,
        } => {
            let record = CompletionRecord {
                participants,
                label,
                timestamp: Utc::now(),
            };
            let label = record.label.clone();
            match ledgers.completions.record_completion(record).await {
                Ok(()) => info!(label = %label, "Recorded completion"),
                Err(e) => error!(label = %label, error = %e, "Failed to record completion"),
            }
        }
        Effect::AdjustReward { identity, delta } => {
            match ledgers.rewards.adjust_reward(&identity, delta).await {
                Ok(balance) => info!(identity = %identity, delta, balance, "Adjusted reward"),
                Err(e) => error!(identity = %identity, delta, error = %e, "Failed to adjust reward"),
            }
        }
    }
}
