use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use super::command::{CommandError, CommandExecutor, ProcessCommandExecutor};
use crate::config::ConversionConfig;

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("converter binary '{0}' not found")]
    NotFound(String),

    #[error("converter exited with status {status_code}: {stderr}")]
    Failed { status_code: i32, stderr: String },

    #[error("converter produced no output file {0}")]
    NoOutput(String),

    #[error("conversion IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ConversionError {
    fn from(err: std::io::Error) -> Self {
        ConversionError::Io(err.to_string())
    }
}

impl From<CommandError> for ConversionError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::CommandNotFound { command } => ConversionError::NotFound(command),
            CommandError::Io { message } => ConversionError::Io(message),
        }
    }
}

/// Opaque binary-to-binary document conversion
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    async fn convert(&self, source: &[u8]) -> Result<Vec<u8>, ConversionError>;

    /// Extension of produced documents, without the dot
    fn target_extension(&self) -> String;
}

/// Converts through a headless office suite
///
/// Each call gets its own scratch directory holding `source.<ext>`; the
/// converter is expected to write `source.<target>` next to it.
pub struct OfficeConverter {
    program: String,
    source_extension: String,
    target_extension: String,
    executor: Arc<dyn CommandExecutor>,
}

impl OfficeConverter {
    pub fn new(config: &ConversionConfig) -> Self {
        Self::with_executor(config, Arc::new(ProcessCommandExecutor))
    }

    pub fn with_executor(config: &ConversionConfig, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            program: config.program.clone(),
            source_extension: config.source_extension.clone(),
            target_extension: config.target_extension.clone(),
            executor,
        }
    }
}

#[async_trait]
impl DocumentConverter for OfficeConverter {
    async fn convert(&self, source: &[u8]) -> Result<Vec<u8>, ConversionError> {
        let scratch = tempfile::tempdir()?;
        let input = scratch.path().join(format!("source.{}", self.source_extension));
        let output = scratch.path().join(format!("source.{}", self.target_extension));
        tokio::fs::write(&input, source).await?;

        let args = vec![
            "--headless".to_string(),
            "--convert-to".to_string(),
            self.target_extension.clone(),
            "--outdir".to_string(),
            scratch.path().display().to_string(),
            input.display().to_string(),
        ];
        debug!(program = %self.program, ?args, "Running converter");

        let result = self
            .executor
            .execute(&self.program, &args, scratch.path())
            .await?;
        if !result.success() {
            warn!(status = result.status_code, stderr = %result.stderr.trim(), "Converter failed");
            return Err(ConversionError::Failed {
                status_code: result.status_code,
                stderr: result.stderr.trim().to_string(),
            });
        }

        match tokio::fs::read(&output).await {
            Ok(bytes) if !bytes.is_empty() => Ok(bytes),
            Ok(_) => Err(ConversionError::NoOutput(output.display().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ConversionError::NoOutput(output.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn target_extension(&self) -> String {
        self.target_extension.clone()
    }
}
