//! Blob storage abstraction for uploaded and generated files.
//!
//! [`BlobStore`] is the seam between handlers and wherever document bytes
//! live. [`FsBlobStore`] keeps them under a local directory and hands out
//! URLs below a configured public base; [`InMemoryBlobStore`] is used in
//! tests.

pub mod fs;
pub mod memory;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

pub use fs::FsBlobStore;
pub use memory::InMemoryBlobStore;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("blob already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid blob path: {0}")]
    InvalidPath(String),

    #[error("blob IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Options for [`BlobStore::upload`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    pub cache_control: String,
    /// Replace an existing object at the same path
    pub overwrite: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            cache_control: "3600".to_string(),
            overwrite: true,
        }
    }
}

/// Listing entry; `name` is relative to the listed prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobObject {
    pub name: String,
    pub size: u64,
}

#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` at `path`; returns the stored path
    async fn upload(
        &self,
        bytes: &[u8],
        path: &str,
        options: &UploadOptions,
    ) -> Result<String, BlobError>;

    fn public_url(&self, path: &str) -> String;

    fn signed_url(&self, path: &str, ttl_secs: u64) -> String;

    /// Direct children of `prefix`, sorted by name
    async fn list(&self, prefix: &str) -> Result<Vec<BlobObject>, BlobError>;

    async fn download(&self, path: &str) -> Result<Vec<u8>, BlobError>;
}

/// Reject absolute paths, empty segments and parent references
pub fn validate_path(path: &str) -> Result<(), BlobError> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() || trimmed.starts_with('/') {
        return Err(BlobError::InvalidPath(path.to_string()));
    }
    let invalid_segment = |segment: &str| {
        segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\')
    };
    if trimmed.split('/').any(invalid_segment) {
        return Err(BlobError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// Builds public and signed URLs below a base address
#[derive(Debug, Clone)]
pub struct UrlSigner {
    base_url: String,
    secret: String,
}

impl UrlSigner {
    pub fn new(base_url: &str, secret: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            secret: secret.to_string(),
        }
    }

    pub fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// `<public url>?expires=<unix secs>&token=<base64url hmac>`
    pub fn signed_url(&self, path: &str, ttl_secs: u64, now_unix: i64) -> String {
        let expires = now_unix.saturating_add(ttl_secs as i64);
        let token = self.token(path, expires);
        format!("{}?expires={expires}&token={token}", self.public_url(path))
    }

    /// Constant-time check of `token` against `path` and `expires`
    pub fn verify(&self, path: &str, expires: i64, token: &str, now_unix: i64) -> bool {
        if expires < now_unix {
            return false;
        }
        let Ok(tag) = URL_SAFE_NO_PAD.decode(token) else {
            return false;
        };
        self.mac(path, expires).is_some_and(|mac| mac.verify_slice(&tag).is_ok())
    }

    fn token(&self, path: &str, expires: i64) -> String {
        self.mac(path, expires)
            .map(|mac| URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
            .unwrap_or_default()
    }

    fn mac(&self, path: &str, expires: i64) -> Option<Hmac<Sha256>> {
        // HMAC accepts keys of any length
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.as_bytes()).ok()?;
        mac.update(path.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        Some(mac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_path() {
        assert!(validate_path("pdf_journals/a.pdf").is_ok());
        assert!(validate_path("pdf_journals/").is_ok());
        assert!(validate_path("").is_err());
        assert!(validate_path("/etc/passwd").is_err());
        assert!(validate_path("a/../b").is_err());
        assert!(validate_path("a//b").is_err());
    }

    #[test]
    fn test_signed_url_round_trip() {
        let signer = UrlSigner::new("https://files.local/storage/", "secret");
        assert_eq!(
            signer.public_url("packages/x.zip"),
            "https://files.local/storage/packages/x.zip"
        );

        let url = signer.signed_url("packages/x.zip", 60, 1_000);
        assert!(url.starts_with("https://files.local/storage/packages/x.zip?expires=1060&token="));
        let token = url.rsplit("token=").next().unwrap();
        assert!(signer.verify("packages/x.zip", 1060, token, 1_030));
        assert!(!signer.verify("packages/x.zip", 1060, token, 1_061));
        assert!(!signer.verify("packages/y.zip", 1060, token, 1_030));
    }

    #[test]
    fn test_verify_rejects_altered_tokens() {
        let signer = UrlSigner::new("https://files.local/storage", "secret");
        let url = signer.signed_url("pdf_journals/a.pdf", 300, 5_000);
        let token = url.rsplit("token=").next().unwrap();
        assert!(signer.verify("pdf_journals/a.pdf", 5_300, token, 5_300));

        let mut flipped = token.to_string();
        let last = flipped.pop().unwrap();
        flipped.push(if last == 'A' { 'B' } else { 'A' });
        assert!(!signer.verify("pdf_journals/a.pdf", 5_300, &flipped, 5_000));

        // Truncated, undecodable and foreign-key tokens
        assert!(!signer.verify("pdf_journals/a.pdf", 5_300, &token[..10], 5_000));
        assert!(!signer.verify("pdf_journals/a.pdf", 5_300, "not base64!", 5_000));
        assert!(!signer.verify("pdf_journals/a.pdf", 5_300, "", 5_000));
        let other = UrlSigner::new("https://files.local/storage", "other-secret");
        assert!(!other.verify("pdf_journals/a.pdf", 5_300, token, 5_000));

        // Expiry is checked before the token
        assert!(!signer.verify("pdf_journals/a.pdf", 5_300, token, 5_301));
        assert!(!signer.verify("pdf_journals/a.pdf", 5_299, token, 5_000));
    }
}
