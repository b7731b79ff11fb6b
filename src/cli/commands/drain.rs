use anyhow::Result;
use docflow::{CycleOutcome, DocflowConfig, Scheduler};

use super::{open_store, services, Command};

pub struct DrainCommand {
    config: DocflowConfig,
    max_cycles: usize,
}

impl DrainCommand {
    pub fn new(config: DocflowConfig, max_cycles: usize) -> Self {
        Self { config, max_cycles }
    }
}

impl Command for DrainCommand {
    async fn execute(&self) -> Result<()> {
        let store = open_store(&self.config).await?;
        let scheduler = Scheduler::new(services(&self.config, store.clone()), &self.config)?;

        let outcomes = scheduler.drain(self.max_cycles).await;
        for outcome in &outcomes {
            match outcome {
                CycleOutcome::Idle => println!("⏳ No pending activities"),
                CycleOutcome::Completed { id } => println!("✅ Completed {id}"),
                CycleOutcome::Failed { id, reason } => println!("❌ Failed {id}: {reason}"),
                CycleOutcome::Stalled { id, kind } => {
                    println!("⚠️  Stalled {id}: unknown kind '{kind}'")
                }
                CycleOutcome::Deferred { id } => println!("⏸️  Deferred {id}: input not ready"),
                CycleOutcome::NotClaimed { id } => println!("🔒 Skipped {id}: claimed elsewhere"),
                CycleOutcome::SelectionError(e) => println!("⚠️  Store error: {e}"),
            }
        }
        println!("📊 {} cycle(s) run", outcomes.len());

        store.close().await;
        Ok(())
    }
}
