use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{ActivityHandler, HandlerError, HandlerOutput};
use crate::blob::{BlobStore, UploadOptions};
use crate::config::{HandoffPolicy, StorageConfig};
use crate::external::{DocumentConverter, DocumentFetcher};
use crate::store::{ActivityFilter, ActivityPatch, ActivityQuery, ActivityStore};
use crate::workflow::params::ConversionOutput;
use crate::workflow::{Activity, ActivityKind, ActivityStatus, SourceDocument};

/// Converts the source document and publishes the result to blob storage
pub struct FormatConversionHandler {
    fetcher: Arc<dyn DocumentFetcher>,
    converter: Arc<dyn DocumentConverter>,
    blobs: Arc<dyn BlobStore>,
    store: Arc<dyn ActivityStore>,
    prefix: String,
    upload: UploadOptions,
    handoff: HandoffPolicy,
}

impl FormatConversionHandler {
    pub fn new(
        fetcher: Arc<dyn DocumentFetcher>,
        converter: Arc<dyn DocumentConverter>,
        blobs: Arc<dyn BlobStore>,
        store: Arc<dyn ActivityStore>,
        storage: &StorageConfig,
        handoff: HandoffPolicy,
    ) -> Self {
        Self {
            fetcher,
            converter,
            blobs,
            store,
            prefix: storage.converted_prefix.trim_end_matches('/').to_string(),
            upload: UploadOptions {
                cache_control: storage.cache_control.clone(),
                overwrite: true,
            },
            handoff,
        }
    }

    fn output_path(&self) -> String {
        format!(
            "{}/{}_journal.{}",
            self.prefix,
            Uuid::new_v4(),
            self.converter.target_extension()
        )
    }

    /// Copy the converted reference onto the first Pending packaging
    /// activity in the whole store. Best effort: failures are logged only.
    async fn hand_off(&self, source: &Activity, output: &ConversionOutput) {
        let query = ActivityQuery::new(
            ActivityFilter::default()
                .status(ActivityStatus::Pending)
                .kind(ActivityKind::Packaging),
        )
        .ascending()
        .limit(1);

        let target = match self.store.query(&query).await {
            Ok(found) => found.into_iter().next(),
            Err(e) => {
                warn!(
                    activity.id = %source.id,
                    error = %e,
                    "Failed to look up packaging activity for handoff"
                );
                return;
            }
        };
        let Some(target) = target else {
            debug!(activity.id = %source.id, "No pending packaging activity to hand off to");
            return;
        };

        let patch = ActivityPatch::default().merge_parameters(output.to_parameters());
        match self
            .store
            .update_where(&ActivityFilter::by_id(target.id), &patch)
            .await
        {
            Ok(_) => info!(
                activity.id = %source.id,
                target.id = %target.id,
                target.workflow_id = %target.workflow_id,
                "Handed converted document to packaging"
            ),
            Err(e) => warn!(
                activity.id = %source.id,
                target.id = %target.id,
                error = %e,
                "Handoff failed"
            ),
        }
    }
}

#[async_trait]
impl ActivityHandler for FormatConversionHandler {
    fn name(&self) -> &'static str {
        "format-conversion"
    }

    async fn handle(&self, activity: &Activity) -> Result<HandlerOutput, HandlerError> {
        let source = SourceDocument::from_activity(activity)?;
        let bytes = self.fetcher.fetch(&source.file_url).await?;
        if bytes.is_empty() {
            return Err(HandlerError::EmptyDocument(source.file_url));
        }

        let converted = self.converter.convert(&bytes).await?;
        let path = self.output_path();
        let path = self.blobs.upload(&converted, &path, &self.upload).await?;
        let output = ConversionOutput {
            url: self.blobs.public_url(&path),
            path,
        };
        info!(
            activity.id = %activity.id,
            path = %output.path,
            bytes = converted.len(),
            "Converted document stored"
        );

        if self.handoff == HandoffPolicy::PendingPackaging {
            self.hand_off(activity, &output).await;
        }

        Ok(HandlerOutput::pass(output.to_parameters()))
    }
}
