use anyhow::{anyhow, Result};
use chrono::Utc;
use docflow::store::{ActivityFilter, ActivityPatch};
use docflow::workflow::WorkflowLog;
use docflow::{ActivityStatus, ActivityStore, DocflowConfig};
use uuid::Uuid;

use super::{open_store, Command};

/// External status change, the only way out of Failed
pub struct ResetCommand {
    config: DocflowConfig,
    activity: Uuid,
    status: String,
}

impl ResetCommand {
    pub fn new(config: DocflowConfig, activity: Uuid, status: String) -> Self {
        Self {
            config,
            activity,
            status,
        }
    }
}

impl Command for ResetCommand {
    async fn execute(&self) -> Result<()> {
        let status: ActivityStatus = self.status.parse()?;
        let store = open_store(&self.config).await?;

        let activity = store
            .get(self.activity)
            .await?
            .ok_or_else(|| anyhow!("activity {} not found", self.activity))?;
        store
            .update_where(
                &ActivityFilter::by_id(activity.id),
                &ActivityPatch::status(status),
            )
            .await?;
        store
            .append_log(&WorkflowLog::for_activity(
                &activity,
                status.as_str(),
                format!("manually reset from {}", activity.status),
                Utc::now(),
            ))
            .await?;

        println!("🔄 {} {} → {}", activity.id, activity.status, status);
        store.close().await;
        Ok(())
    }
}
