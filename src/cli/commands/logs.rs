use anyhow::Result;
use docflow::{ActivityStore, DocflowConfig};
use uuid::Uuid;

use super::{open_store, Command};

pub struct LogsCommand {
    config: DocflowConfig,
    workflow: Uuid,
}

impl LogsCommand {
    pub fn new(config: DocflowConfig, workflow: Uuid) -> Self {
        Self { config, workflow }
    }
}

impl Command for LogsCommand {
    async fn execute(&self) -> Result<()> {
        let store = open_store(&self.config).await?;
        let entries = store.logs(self.workflow).await?;
        if entries.is_empty() {
            println!("📭 No journal entries for workflow {}", self.workflow);
        }
        for entry in &entries {
            let activity = entry
                .activity_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{}  {:<10} {:<36}  {}",
                entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
                entry.status,
                activity,
                entry.message
            );
        }
        store.close().await;
        Ok(())
    }
}
