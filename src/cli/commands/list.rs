use anyhow::Result;
use docflow::store::{ActivityFilter, ActivityQuery};
use docflow::{ActivityStore, DocflowConfig};
use uuid::Uuid;

use super::{open_store, Command};

pub struct ListCommand {
    config: DocflowConfig,
    workflow: Option<Uuid>,
}

impl ListCommand {
    pub fn new(config: DocflowConfig, workflow: Option<Uuid>) -> Self {
        Self { config, workflow }
    }
}

impl Command for ListCommand {
    async fn execute(&self) -> Result<()> {
        let store = open_store(&self.config).await?;
        let mut filter = ActivityFilter::default();
        if let Some(workflow) = self.workflow {
            filter = filter.workflow(workflow);
        }
        let activities = store.query(&ActivityQuery::new(filter).ascending()).await?;

        if activities.is_empty() {
            println!("📭 No activities");
        }
        for activity in &activities {
            println!(
                "{:>3}  {:<10} {:<24} {}  workflow {}",
                activity.order,
                activity.status.as_str(),
                activity.kind.wire_name(),
                activity.id,
                activity.workflow_id
            );
            for (key, value) in &activity.parameters {
                println!("       {key} = {value}");
            }
        }

        store.close().await;
        Ok(())
    }
}
