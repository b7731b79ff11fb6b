use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::{validate_path, BlobError, BlobObject, BlobStore, UploadOptions, UrlSigner};

/// Blob store held in process memory
#[derive(Debug)]
pub struct InMemoryBlobStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
    signer: UrlSigner,
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new("memory://blobs")
    }
}

impl InMemoryBlobStore {
    pub fn new(public_base_url: &str) -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            signer: UrlSigner::new(public_base_url, "in-memory"),
        }
    }

    /// Every stored path, sorted
    pub async fn paths(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn upload(
        &self,
        bytes: &[u8],
        path: &str,
        options: &UploadOptions,
    ) -> Result<String, BlobError> {
        validate_path(path)?;
        let mut objects = self.objects.write().await;
        if !options.overwrite && objects.contains_key(path) {
            return Err(BlobError::AlreadyExists(path.to_string()));
        }
        objects.insert(path.to_string(), bytes.to_vec());
        Ok(path.to_string())
    }

    fn public_url(&self, path: &str) -> String {
        self.signer.public_url(path)
    }

    fn signed_url(&self, path: &str, ttl_secs: u64) -> String {
        self.signer.signed_url(path, ttl_secs, Utc::now().timestamp())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BlobObject>, BlobError> {
        validate_path(prefix)?;
        let dir = format!("{}/", prefix.trim_end_matches('/'));
        let objects = self.objects.read().await;
        Ok(objects
            .iter()
            .filter_map(|(path, bytes)| {
                let name = path.strip_prefix(&dir)?;
                (!name.contains('/')).then(|| BlobObject {
                    name: name.to_string(),
                    size: bytes.len() as u64,
                })
            })
            .collect())
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>, BlobError> {
        self.objects
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(path.to_string()))
    }
}
