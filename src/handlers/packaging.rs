use async_trait::async_trait;
use std::io::{Cursor, Write};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::{ActivityHandler, HandlerError, HandlerOutput};
use crate::blob::{BlobStore, UploadOptions};
use crate::config::{PackagingSource, StorageConfig};
use crate::external::DocumentFetcher;
use crate::workflow::params::PackageOutput;
use crate::workflow::{Activity, ConvertedDocument};

/// A file going into the archive
#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    name: String,
    bytes: Vec<u8>,
}

/// Bundles converted documents into one zip archive
pub struct PackagingHandler {
    blobs: Arc<dyn BlobStore>,
    fetcher: Arc<dyn DocumentFetcher>,
    source: PackagingSource,
    converted_prefix: String,
    converted_extension: String,
    package_prefix: String,
    upload: UploadOptions,
}

impl PackagingHandler {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        fetcher: Arc<dyn DocumentFetcher>,
        storage: &StorageConfig,
        source: PackagingSource,
        converted_extension: &str,
    ) -> Self {
        Self {
            blobs,
            fetcher,
            source,
            converted_prefix: storage.converted_prefix.trim_end_matches('/').to_string(),
            converted_extension: format!(".{}", converted_extension.to_ascii_lowercase()),
            package_prefix: storage.package_prefix.trim_end_matches('/').to_string(),
            upload: UploadOptions {
                cache_control: storage.cache_control.clone(),
                overwrite: true,
            },
        }
    }

    async fn referenced_entry(&self, activity: &Activity) -> Result<Vec<Entry>, HandlerError> {
        let document = ConvertedDocument::from_parameters(&activity.parameters)?;
        let bytes = match &document {
            ConvertedDocument::Stored { path } => self.blobs.download(path).await?,
            ConvertedDocument::Remote { url } => self.fetcher.fetch(url).await?,
        };
        if bytes.is_empty() {
            return Err(HandlerError::EmptyDocument(document.file_name()));
        }
        Ok(vec![Entry {
            name: document.file_name(),
            bytes,
        }])
    }

    async fn prefix_entries(&self) -> Result<Vec<Entry>, HandlerError> {
        let listed = self.blobs.list(&format!("{}/", self.converted_prefix)).await?;
        let mut entries = Vec::new();
        for object in listed
            .into_iter()
            .filter(|o| o.name.to_ascii_lowercase().ends_with(&self.converted_extension))
        {
            let path = format!("{}/{}", self.converted_prefix, object.name);
            let bytes = self.blobs.download(&path).await?;
            entries.push(Entry {
                name: object.name,
                bytes,
            });
        }
        if entries.is_empty() {
            return Err(HandlerError::NoInput(format!(
                "no {} files under {}/",
                self.converted_extension, self.converted_prefix
            )));
        }
        Ok(entries)
    }
}

fn build_archive(entries: &[Entry]) -> Result<Vec<u8>, HandlerError> {
    let archive_error = |e: &dyn std::fmt::Display| HandlerError::Archive(e.to_string());
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for entry in entries {
        zip.start_file(entry.name.as_str(), options)
            .map_err(|e| archive_error(&e))?;
        zip.write_all(&entry.bytes).map_err(|e| archive_error(&e))?;
    }
    let cursor = zip.finish().map_err(|e| archive_error(&e))?;
    Ok(cursor.into_inner())
}

#[async_trait]
impl ActivityHandler for PackagingHandler {
    fn name(&self) -> &'static str {
        "packaging"
    }

    fn is_ready(&self, activity: &Activity) -> bool {
        match self.source {
            PackagingSource::ConvertedReference => {
                ConvertedDocument::present_in(&activity.parameters)
            }
            PackagingSource::StoragePrefix => true,
        }
    }

    async fn handle(&self, activity: &Activity) -> Result<HandlerOutput, HandlerError> {
        let entries = match self.source {
            PackagingSource::ConvertedReference => self.referenced_entry(activity).await?,
            PackagingSource::StoragePrefix => self.prefix_entries().await?,
        };
        debug!(activity.id = %activity.id, files = entries.len(), "Building package");

        let archive = build_archive(&entries)?;
        let path = format!("{}/{}_package.zip", self.package_prefix, Uuid::new_v4());
        let path = self.blobs.upload(&archive, &path, &self.upload).await?;
        let output = PackageOutput {
            url: self.blobs.public_url(&path),
            path,
        };
        info!(
            activity.id = %activity.id,
            path = %output.path,
            files = entries.len(),
            "Package stored"
        );

        Ok(HandlerOutput::pass(output.to_parameters()))
    }
}
