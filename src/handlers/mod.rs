//! Activity handlers and the machinery around them.
//!
//! A handler only turns an activity's parameters into output parameters and
//! a verdict. [`HandlerRunner`] owns the status protocol around that call:
//! Processing on entry, Completed or Failed on exit, timestamps, the journal,
//! and swallowing errors so nothing escapes into the poll loop.

pub mod docx;
pub mod format_conversion;
pub mod packaging;
pub mod quality_check;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::blob::BlobError;
use crate::clock::Clock;
use crate::config::ClaimMode;
use crate::external::{ConversionError, FetchError};
use crate::store::{ActivityFilter, ActivityPatch, ActivityStore, StoreError};
use crate::workflow::{
    Activity, ActivityStatus, HandlerKind, ParameterError, Parameters, WorkflowLog,
};

pub use format_conversion::FormatConversionHandler;
pub use packaging::PackagingHandler;
pub use quality_check::QualityCheckHandler;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    MissingParameter(#[from] ParameterError),

    #[error("document {0} is empty")]
    EmptyDocument(String),

    #[error("could not read document structure: {0}")]
    Extraction(String),

    #[error("could not build archive: {0}")]
    Archive(String),

    #[error("no input documents: {0}")]
    NoInput(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Whether a handler accepted the activity's input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    /// Validation failed; output parameters are still persisted
    Reject(Vec<String>),
}

/// What a handler produced on a completed attempt
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerOutput {
    pub parameters: Parameters,
    pub verdict: Verdict,
}

impl HandlerOutput {
    pub fn pass(parameters: Parameters) -> Self {
        Self {
            parameters,
            verdict: Verdict::Pass,
        }
    }

    pub fn reject(parameters: Parameters, reasons: Vec<String>) -> Self {
        Self {
            parameters,
            verdict: Verdict::Reject(reasons),
        }
    }
}

/// One attempt at the payload work of an activity. Implementations never
/// retry and never touch the activity's own status.
#[async_trait]
pub trait ActivityHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the activity carries what this handler needs
    fn is_ready(&self, _activity: &Activity) -> bool {
        true
    }

    async fn handle(&self, activity: &Activity) -> Result<HandlerOutput, HandlerError>;
}

/// Result of running a handler under the status protocol
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    /// Completed; carries the activity as persisted
    Completed(Activity),
    /// Failed; the activity was marked Failed (if the store allowed it)
    Failed { reason: String },
    /// Another worker owns the activity, or it no longer exists
    NotClaimed,
    /// The claim could not be written; the activity is untouched
    Unavailable { reason: String },
}

/// Applies the status protocol around a handler call
#[derive(Clone)]
pub struct HandlerRunner {
    store: Arc<dyn ActivityStore>,
    clock: Arc<dyn Clock>,
    claim: ClaimMode,
}

impl HandlerRunner {
    pub fn new(store: Arc<dyn ActivityStore>, clock: Arc<dyn Clock>, claim: ClaimMode) -> Self {
        Self {
            store,
            clock,
            claim,
        }
    }

    pub async fn run(&self, handler: &dyn ActivityHandler, activity: &Activity) -> HandlerOutcome {
        let mut activity = activity.clone();
        let started_at = self.clock.now();

        let filter = match self.claim {
            ClaimMode::Unconditional => ActivityFilter::by_id(activity.id),
            ClaimMode::Conditional => {
                ActivityFilter::by_id(activity.id).status(ActivityStatus::Pending)
            }
        };
        let claim = ActivityPatch::status(ActivityStatus::Processing).started_at(started_at);
        match self.store.update_where(&filter, &claim).await {
            Ok(0) => {
                info!(
                    activity.id = %activity.id,
                    handler = handler.name(),
                    "Activity already claimed"
                );
                return HandlerOutcome::NotClaimed;
            }
            Ok(_) => claim.apply(&mut activity),
            Err(e) => {
                error!(activity.id = %activity.id, error = %e, "Failed to claim activity");
                return HandlerOutcome::Unavailable {
                    reason: e.to_string(),
                };
            }
        }
        self.journal(&activity, "Processing", format!("{} started", handler.name()))
            .await;

        let output = match handler.handle(&activity).await {
            Ok(output) => output,
            Err(e) => {
                let reason = e.to_string();
                warn!(
                    activity.id = %activity.id,
                    handler = handler.name(),
                    error = %reason,
                    "Activity failed"
                );
                return self.mark_failed(&mut activity, reason).await;
            }
        };

        let (status, reason) = match &output.verdict {
            Verdict::Pass => (ActivityStatus::Completed, None),
            Verdict::Reject(reasons) => (ActivityStatus::Failed, Some(reasons.join("; "))),
        };
        let patch = ActivityPatch::status(status)
            .ended_at(self.clock.now())
            .merge_parameters(output.parameters);
        if let Err(e) = self
            .store
            .update_where(&ActivityFilter::by_id(activity.id), &patch)
            .await
        {
            error!(activity.id = %activity.id, error = %e, "Failed to persist handler output");
            let reason = format!("could not persist output: {e}");
            return self.mark_failed(&mut activity, reason).await;
        }
        patch.apply(&mut activity);

        match reason {
            None => {
                info!(
                    activity.id = %activity.id,
                    handler = handler.name(),
                    "Activity completed"
                );
                let message = format!("{} completed", handler.name());
                self.journal(&activity, status.as_str(), message).await;
                HandlerOutcome::Completed(activity)
            }
            Some(reason) => {
                warn!(
                    activity.id = %activity.id,
                    handler = handler.name(),
                    %reason,
                    "Activity rejected"
                );
                self.journal(&activity, status.as_str(), reason.clone()).await;
                HandlerOutcome::Failed { reason }
            }
        }
    }

    /// Failed + `ended_at`, no output parameters. A store error here is
    /// logged only; the journal entry is still attempted.
    async fn mark_failed(&self, activity: &mut Activity, reason: String) -> HandlerOutcome {
        let patch = ActivityPatch::status(ActivityStatus::Failed).ended_at(self.clock.now());
        match self
            .store
            .update_where(&ActivityFilter::by_id(activity.id), &patch)
            .await
        {
            Ok(_) => patch.apply(activity),
            Err(e) => {
                error!(activity.id = %activity.id, error = %e, "Failed to mark activity failed")
            }
        }
        self.journal(activity, ActivityStatus::Failed.as_str(), reason.clone())
            .await;
        HandlerOutcome::Failed { reason }
    }

    async fn journal(&self, activity: &Activity, status: &str, message: String) {
        let entry = WorkflowLog::for_activity(activity, status, message, self.clock.now());
        if let Err(e) = self.store.append_log(&entry).await {
            warn!(activity.id = %activity.id, error = %e, "Failed to write journal entry");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("no handler registered for {0}")]
    MissingHandler(HandlerKind),

    #[error("handler for {0} registered more than once")]
    DuplicateHandler(HandlerKind),
}

/// Complete dispatch table: one handler per [`HandlerKind`]
#[derive(Clone)]
pub struct HandlerRegistry {
    quality_check: Arc<dyn ActivityHandler>,
    format_conversion: Arc<dyn ActivityHandler>,
    packaging: Arc<dyn ActivityHandler>,
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    pub fn handler(&self, kind: HandlerKind) -> &dyn ActivityHandler {
        match kind {
            HandlerKind::QualityCheck => self.quality_check.as_ref(),
            HandlerKind::FormatConversion => self.format_conversion.as_ref(),
            HandlerKind::Packaging => self.packaging.as_ref(),
        }
    }
}

#[derive(Default)]
pub struct HandlerRegistryBuilder {
    quality_check: Option<Arc<dyn ActivityHandler>>,
    format_conversion: Option<Arc<dyn ActivityHandler>>,
    packaging: Option<Arc<dyn ActivityHandler>>,
    errors: Vec<RegistryError>,
}

impl HandlerRegistryBuilder {
    pub fn register(mut self, kind: HandlerKind, handler: Arc<dyn ActivityHandler>) -> Self {
        let slot = match kind {
            HandlerKind::QualityCheck => &mut self.quality_check,
            HandlerKind::FormatConversion => &mut self.format_conversion,
            HandlerKind::Packaging => &mut self.packaging,
        };
        if slot.replace(handler).is_some() {
            self.errors.push(RegistryError::DuplicateHandler(kind));
        }
        self
    }

    pub fn build(self) -> Result<HandlerRegistry, RegistryError> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }
        Ok(HandlerRegistry {
            quality_check: self
                .quality_check
                .ok_or(RegistryError::MissingHandler(HandlerKind::QualityCheck))?,
            format_conversion: self
                .format_conversion
                .ok_or(RegistryError::MissingHandler(HandlerKind::FormatConversion))?,
            packaging: self
                .packaging
                .ok_or(RegistryError::MissingHandler(HandlerKind::Packaging))?,
        })
    }
}
