use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

pub mod commands;

#[derive(Parser)]
#[command(name = "docflow")]
#[command(about = "Document workflow activity scheduler")]
#[command(long_about = "docflow runs document workflows one activity at a time: quality check, \
                       format conversion and packaging, in order. Submit a workflow with \
                       'docflow submit' and process it with 'docflow run'.")]
pub struct Cli {
    /// Configuration file layered over docflow.toml
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Poll for pending activities until interrupted
    Run,
    /// Process pending activities until none are left, then exit
    Drain {
        /// Stop after this many cycles even if work remains
        #[arg(long, default_value = "1000")]
        max_cycles: usize,
    },
    /// Create a workflow and its activities from a TOML or JSON definition
    Submit {
        /// Definition file
        definition: PathBuf,
    },
    /// List activities in execution order
    List {
        /// Only show activities of this workflow
        #[arg(long)]
        workflow: Option<Uuid>,
    },
    /// Set an activity's status by hand
    Reset {
        /// Activity id
        activity: Uuid,
        /// New status
        #[arg(long, default_value = "pending")]
        status: String,
    },
    /// Show the status journal of a workflow
    Logs {
        /// Workflow id
        workflow: Uuid,
    },
}
