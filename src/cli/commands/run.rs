use anyhow::Result;
use docflow::{DocflowConfig, Scheduler, ShutdownCoordinator};
use tracing::info;

use super::{open_store, services, Command};

pub struct RunCommand {
    config: DocflowConfig,
}

impl RunCommand {
    pub fn new(config: DocflowConfig) -> Self {
        Self { config }
    }
}

impl Command for RunCommand {
    async fn execute(&self) -> Result<()> {
        let store = open_store(&self.config).await?;
        let scheduler = Scheduler::new(services(&self.config, store.clone()), &self.config)?;

        let shutdown = ShutdownCoordinator::new();
        shutdown.install_signal_handlers()?;

        println!(
            "🚀 Polling for pending activities every {}s (Ctrl-C to stop)",
            self.config.scheduler.poll_interval_secs
        );
        scheduler.run(shutdown.token()).await;

        store.close().await;
        info!("Activity store closed");
        println!("👋 Scheduler stopped");
        Ok(())
    }
}
