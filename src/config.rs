use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for docflow
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DocflowConfig {
    /// Poll loop and dispatch policies
    pub scheduler: SchedulerConfig,
    /// Quality-check thresholds
    pub quality_check: QualityCheckConfig,
    /// External converter invocation
    pub conversion: ConversionConfig,
    /// Packaging input selection
    pub packaging: PackagingConfig,
    /// Blob storage location and URL settings
    pub storage: StorageConfig,
    /// Activity store database
    pub database: DatabaseConfig,
    /// Observability settings
    pub observability: ObservabilityConfig,
}

/// What to do with a Pending activity whose kind has no handler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownKindPolicy {
    /// Mark it Failed so the queue moves on
    #[default]
    Fail,
    /// Log and leave it Pending; it is re-selected every cycle
    Stall,
}

/// How a converted document reaches packaging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffPolicy {
    /// Also write the reference into the lowest-order Pending packaging
    /// activity, whichever workflow it belongs to
    #[default]
    PendingPackaging,
    /// Only ordinary chaining carries the reference
    Chained,
}

/// How an activity is moved to Processing before its handler runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimMode {
    /// Update by id regardless of current status
    #[default]
    Unconditional,
    /// Update only while still Pending; zero rows means someone else has it
    Conditional,
}

/// Where packaging takes its input documents from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PackagingSource {
    /// The `PdfPath`/`PdfUrl` reference on the activity
    #[default]
    ConvertedReference,
    /// Every converted document under the storage prefix
    StoragePrefix,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Wait between cycles
    pub poll_interval_secs: u64,
    pub unknown_kind: UnknownKindPolicy,
    pub handoff: HandoffPolicy,
    pub claim: ClaimMode,
    /// Leave an activity Pending instead of running a handler that
    /// reports itself not ready
    pub defer_unready: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            unknown_kind: UnknownKindPolicy::default(),
            handoff: HandoffPolicy::default(),
            claim: ClaimMode::default(),
            defer_unready: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct QualityCheckConfig {
    pub min_words: usize,
    pub min_paragraphs: usize,
}

impl Default for QualityCheckConfig {
    fn default() -> Self {
        Self {
            min_words: 50,
            min_paragraphs: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Office suite binary, looked up on PATH
    pub program: String,
    pub source_extension: String,
    pub target_extension: String,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            program: "soffice".to_string(),
            source_extension: "docx".to_string(),
            target_extension: "pdf".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PackagingConfig {
    pub source: PackagingSource,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding blobs
    pub root: String,
    /// Address under which `root` is served
    pub public_base_url: String,
    /// HMAC key for signed URLs
    pub signing_secret: String,
    pub cache_control: String,
    /// Where converted documents are written
    pub converted_prefix: String,
    /// Where archives are written
    pub package_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: ".docflow/blobs".to_string(),
            public_base_url: "http://localhost:8080/storage/v1/object/public/pdf".to_string(),
            signing_secret: "change-me".to_string(),
            cache_control: "3600".to_string(),
            converted_prefix: "pdf_journals".to_string(),
            package_prefix: "packages".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database URL
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://.docflow/docflow.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default filter directive; `RUST_LOG` overrides it
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}

impl DocflowConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. `docflow.toml` in the working directory
    /// 3. An explicit configuration file
    /// 4. Environment variables (prefixed with DOCFLOW_, nested with `__`)
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut builder =
            Config::builder().add_source(Config::try_from(&DocflowConfig::default())?);

        if Path::new("docflow.toml").exists() {
            builder = builder.add_source(File::with_name("docflow"));
        }

        if let Some(path) = explicit {
            if !path.exists() {
                anyhow::bail!("configuration file {} does not exist", path.display());
            }
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix("DOCFLOW")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<DocflowConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = DocflowConfig::load_env_file();
        DocflowConfig::load(None)
    });

/// Get the global configuration
pub fn config() -> Result<&'static DocflowConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = DocflowConfig::default();
        assert_eq!(config.scheduler.poll_interval_secs, 5);
        assert_eq!(config.scheduler.unknown_kind, UnknownKindPolicy::Fail);
        assert_eq!(config.scheduler.handoff, HandoffPolicy::PendingPackaging);
        assert_eq!(config.scheduler.claim, ClaimMode::Unconditional);
        assert!(!config.scheduler.defer_unready);
        assert_eq!(config.quality_check.min_words, 50);
        assert_eq!(config.quality_check.min_paragraphs, 2);
        assert_eq!(config.storage.cache_control, "3600");
        assert_eq!(config.storage.converted_prefix, "pdf_journals");
        assert_eq!(config.packaging.source, PackagingSource::ConvertedReference);
    }

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            r#"
[scheduler]
poll_interval_secs = 1
unknown_kind = "stall"
handoff = "chained"

[quality_check]
min_words = 10

[packaging]
source = "storage_prefix"
"#,
        )
        .unwrap();

        let config = DocflowConfig::load(Some(&path)).unwrap();
        assert_eq!(config.scheduler.poll_interval_secs, 1);
        assert_eq!(config.scheduler.unknown_kind, UnknownKindPolicy::Stall);
        assert_eq!(config.scheduler.handoff, HandoffPolicy::Chained);
        assert_eq!(config.quality_check.min_words, 10);
        // untouched keys keep their defaults
        assert_eq!(config.quality_check.min_paragraphs, 2);
        assert_eq!(config.packaging.source, PackagingSource::StoragePrefix);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        assert!(DocflowConfig::load(Some(Path::new("/nonexistent/docflow.toml"))).is_err());
    }

    #[test]
    fn test_save_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.toml");
        let mut config = DocflowConfig::default();
        config.scheduler.claim = ClaimMode::Conditional;
        config.save_to_file(&path).unwrap();

        let reloaded = DocflowConfig::load(Some(&path)).unwrap();
        assert_eq!(reloaded.scheduler.claim, ClaimMode::Conditional);
    }
}
