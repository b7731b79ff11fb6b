use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{validate_path, BlobError, BlobObject, BlobStore, UploadOptions, UrlSigner};
use crate::config::StorageConfig;

/// Blob store rooted at a local directory
///
/// Object paths map one-to-one onto files below `root`. Cache-control is not
/// persisted; whatever serves `public_base_url` decides caching.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
    signer: UrlSigner,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str, signing_secret: &str) -> Self {
        Self {
            root: root.into(),
            signer: UrlSigner::new(public_base_url, signing_secret),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(&config.root, &config.public_base_url, &config.signing_secret)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, BlobError> {
        validate_path(path)?;
        Ok(self.root.join(path.trim_end_matches('/')))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn upload(
        &self,
        bytes: &[u8],
        path: &str,
        options: &UploadOptions,
    ) -> Result<String, BlobError> {
        let target = self.resolve(path)?;
        if !options.overwrite && tokio::fs::try_exists(&target).await? {
            return Err(BlobError::AlreadyExists(path.to_string()));
        }
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;
        debug!(path, bytes = bytes.len(), cache_control = %options.cache_control, "Stored blob");
        Ok(path.to_string())
    }

    fn public_url(&self, path: &str) -> String {
        self.signer.public_url(path)
    }

    fn signed_url(&self, path: &str, ttl_secs: u64) -> String {
        self.signer.signed_url(path, ttl_secs, Utc::now().timestamp())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BlobObject>, BlobError> {
        let dir = self.resolve(prefix)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut objects = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            objects.push(BlobObject {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: metadata.len(),
            });
        }
        objects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(objects)
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>, BlobError> {
        let target = self.resolve(path)?;
        match tokio::fs::read(&target).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
