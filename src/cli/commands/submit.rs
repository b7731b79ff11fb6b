use anyhow::{Context, Result};
use chrono::Utc;
use docflow::{ActivityStore, DocflowConfig, WorkflowDefinition};
use std::path::PathBuf;

use super::{open_store, Command};

pub struct SubmitCommand {
    config: DocflowConfig,
    definition: PathBuf,
}

impl SubmitCommand {
    pub fn new(config: DocflowConfig, definition: PathBuf) -> Self {
        Self { config, definition }
    }
}

impl Command for SubmitCommand {
    async fn execute(&self) -> Result<()> {
        let definition = WorkflowDefinition::from_file(&self.definition)
            .with_context(|| format!("loading {}", self.definition.display()))?;
        let (workflow, activities) = definition.into_records(Utc::now())?;

        let store = open_store(&self.config).await?;
        store.insert_workflow(&workflow).await?;
        for activity in &activities {
            store.insert(activity).await?;
        }

        println!("📋 Workflow '{}' submitted", workflow.name);
        println!("   id: {}", workflow.id);
        for activity in &activities {
            println!(
                "   {:>3}  {:<24} {:<8} {}",
                activity.order, activity.kind, activity.status, activity.id
            );
        }

        store.close().await;
        Ok(())
    }
}
