use anyhow::Result;
use clap::Parser;

mod cli;

use cli::commands::drain::DrainCommand;
use cli::commands::list::ListCommand;
use cli::commands::logs::LogsCommand;
use cli::commands::reset::ResetCommand;
use cli::commands::run::RunCommand;
use cli::commands::submit::SubmitCommand;
use cli::commands::Command;
use cli::{Cli, Commands};
use docflow::DocflowConfig;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            DocflowConfig::load_env_file()?;
            DocflowConfig::load(Some(path))?
        }
        None => docflow::config()?.clone(),
    };
    docflow::init_telemetry(&config.observability)?;

    tokio::runtime::Runtime::new()?.block_on(async {
        match cli.command {
            Commands::Run => RunCommand::new(config).execute().await,
            Commands::Drain { max_cycles } => {
                DrainCommand::new(config, max_cycles).execute().await
            }
            Commands::Submit { definition } => {
                SubmitCommand::new(config, definition).execute().await
            }
            Commands::List { workflow } => ListCommand::new(config, workflow).execute().await,
            Commands::Reset { activity, status } => {
                ResetCommand::new(config, activity, status).execute().await
            }
            Commands::Logs { workflow } => LogsCommand::new(config, workflow).execute().await,
        }
    })
}
