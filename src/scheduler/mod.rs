//! The poll loop.
//!
//! Every cycle selects the globally lowest-order Pending activity, routes it
//! by kind, records the transition and, on success, activates the next step
//! of the same workflow. One activity per cycle, one cycle at a time.

pub mod chaining;

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::blob::BlobStore;
use crate::clock::Clock;
use crate::config::{ClaimMode, DocflowConfig, SchedulerConfig, UnknownKindPolicy};
use crate::external::{DocumentConverter, DocumentFetcher};
use crate::handlers::{
    FormatConversionHandler, HandlerOutcome, HandlerRegistry, HandlerRunner, PackagingHandler,
    QualityCheckHandler, RegistryError,
};
use crate::store::{ActivityFilter, ActivityPatch, ActivityQuery, ActivityStore};
use crate::telemetry;
use crate::workflow::{Activity, ActivityStatus, Dispatch, HandlerKind, WorkflowLog};

pub use chaining::{ChainStep, Chainer};

/// Collaborators the scheduler and its handlers are wired with
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn ActivityStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub fetcher: Arc<dyn DocumentFetcher>,
    pub converter: Arc<dyn DocumentConverter>,
    pub clock: Arc<dyn Clock>,
}

/// What a single cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing was Pending
    Idle,
    Completed { id: Uuid },
    Failed { id: Uuid, reason: String },
    /// Unknown kind left Pending; it will be selected again
    Stalled { id: Uuid, kind: String },
    /// Handler not ready and deferral is on; left Pending
    Deferred { id: Uuid },
    /// Claimed by someone else between selection and dispatch
    NotClaimed { id: Uuid },
    /// The store failed; nothing was changed
    SelectionError(String),
}

impl CycleOutcome {
    /// A cycle that will repeat identically if nothing external changes
    fn is_stuck(&self) -> bool {
        matches!(
            self,
            CycleOutcome::Stalled { .. } | CycleOutcome::Deferred { .. }
        )
    }
}

pub struct Scheduler {
    store: Arc<dyn ActivityStore>,
    clock: Arc<dyn Clock>,
    registry: HandlerRegistry,
    runner: HandlerRunner,
    chainer: Chainer,
    settings: SchedulerConfig,
}

impl Scheduler {
    /// Scheduler with the standard quality-check, conversion and packaging
    /// handlers
    pub fn new(services: Services, config: &DocflowConfig) -> Result<Self, RegistryError> {
        let quality_check =
            QualityCheckHandler::new(services.fetcher.clone(), config.quality_check.clone());
        let format_conversion = FormatConversionHandler::new(
            services.fetcher.clone(),
            services.converter.clone(),
            services.blobs.clone(),
            services.store.clone(),
            &config.storage,
            config.scheduler.handoff,
        );
        let packaging = PackagingHandler::new(
            services.blobs.clone(),
            services.fetcher.clone(),
            &config.storage,
            config.packaging.source,
            &services.converter.target_extension(),
        );

        let registry = HandlerRegistry::builder()
            .register(HandlerKind::QualityCheck, Arc::new(quality_check))
            .register(HandlerKind::FormatConversion, Arc::new(format_conversion))
            .register(HandlerKind::Packaging, Arc::new(packaging))
            .build()?;

        Ok(Self::with_registry(
            services.store,
            services.clock,
            registry,
            config.scheduler.clone(),
        ))
    }

    pub fn with_registry(
        store: Arc<dyn ActivityStore>,
        clock: Arc<dyn Clock>,
        registry: HandlerRegistry,
        settings: SchedulerConfig,
    ) -> Self {
        Self {
            runner: HandlerRunner::new(store.clone(), clock.clone(), settings.claim),
            chainer: Chainer::new(store.clone(), clock.clone()),
            store,
            clock,
            registry,
            settings,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.settings.poll_interval_secs)
    }

    /// One Scan → Dispatch step
    pub async fn run_cycle(&self) -> CycleOutcome {
        let query = ActivityQuery::new(ActivityFilter::default().status(ActivityStatus::Pending))
            .ascending()
            .limit(1);
        let candidate = match self.store.query(&query).await {
            Ok(found) => found.into_iter().next(),
            Err(e) => {
                warn!(error = %e, "Failed to select next activity");
                return CycleOutcome::SelectionError(e.to_string());
            }
        };
        let Some(activity) = candidate else {
            debug!("No pending activities");
            return CycleOutcome::Idle;
        };

        let span = telemetry::activity_span(&activity);
        self.dispatch(activity).instrument(span).await
    }

    async fn dispatch(&self, activity: Activity) -> CycleOutcome {
        info!("Processing activity");
        match activity.kind.dispatch() {
            Dispatch::Marker => self.complete_marker(activity).await,
            Dispatch::Unrecognized(kind) => self.unrecognized(activity, kind).await,
            Dispatch::Handler(kind) => {
                let handler = self.registry.handler(kind);
                if self.settings.defer_unready && !handler.is_ready(&activity) {
                    info!(handler = handler.name(), "Handler not ready, leaving activity pending");
                    return CycleOutcome::Deferred { id: activity.id };
                }
                match self.runner.run(handler, &activity).await {
                    HandlerOutcome::Completed(done) => {
                        self.chainer.activate_successor(&done).await;
                        CycleOutcome::Completed { id: done.id }
                    }
                    HandlerOutcome::Failed { reason } => CycleOutcome::Failed {
                        id: activity.id,
                        reason,
                    },
                    HandlerOutcome::NotClaimed => CycleOutcome::NotClaimed { id: activity.id },
                    HandlerOutcome::Unavailable { reason } => CycleOutcome::SelectionError(reason),
                }
            }
        }
    }

    /// Start/End: straight to Completed, parameters untouched
    async fn complete_marker(&self, mut activity: Activity) -> CycleOutcome {
        let patch = ActivityPatch::status(ActivityStatus::Completed)
            .started_at(self.clock.now())
            .ended_at(self.clock.now());
        match self.store.update_where(&self.claim_filter(&activity), &patch).await {
            Ok(0) => return CycleOutcome::NotClaimed { id: activity.id },
            Ok(_) => patch.apply(&mut activity),
            Err(e) => {
                error!(error = %e, "Failed to complete marker activity");
                return CycleOutcome::SelectionError(e.to_string());
            }
        }
        info!("Marker activity completed");
        let message = format!("{} marker completed", activity.kind);
        self.journal(&activity, ActivityStatus::Completed.as_str(), message)
            .await;
        self.chainer.activate_successor(&activity).await;
        CycleOutcome::Completed { id: activity.id }
    }

    async fn unrecognized(&self, mut activity: Activity, kind: String) -> CycleOutcome {
        match self.settings.unknown_kind {
            UnknownKindPolicy::Stall => {
                warn!(kind = %kind, "Unknown activity kind, leaving it pending");
                CycleOutcome::Stalled {
                    id: activity.id,
                    kind,
                }
            }
            UnknownKindPolicy::Fail => {
                warn!(kind = %kind, "Unknown activity kind, marking it failed");
                let patch =
                    ActivityPatch::status(ActivityStatus::Failed).ended_at(self.clock.now());
                let filter = self.claim_filter(&activity);
                match self.store.update_where(&filter, &patch).await {
                    Ok(0) => return CycleOutcome::NotClaimed { id: activity.id },
                    Ok(_) => patch.apply(&mut activity),
                    Err(e) => {
                        error!(error = %e, "Failed to mark unknown activity failed");
                        return CycleOutcome::SelectionError(e.to_string());
                    }
                }
                let reason = format!("unknown activity kind '{kind}'");
                self.journal(&activity, ActivityStatus::Failed.as_str(), reason.clone())
                    .await;
                CycleOutcome::Failed {
                    id: activity.id,
                    reason,
                }
            }
        }
    }

    fn claim_filter(&self, activity: &Activity) -> ActivityFilter {
        match self.settings.claim {
            ClaimMode::Unconditional => ActivityFilter::by_id(activity.id),
            ClaimMode::Conditional => {
                ActivityFilter::by_id(activity.id).status(ActivityStatus::Pending)
            }
        }
    }

    async fn journal(&self, activity: &Activity, status: &str, message: String) {
        let entry = WorkflowLog::for_activity(activity, status, message, self.clock.now());
        if let Err(e) = self.store.append_log(&entry).await {
            warn!(error = %e, "Failed to write journal entry");
        }
    }

    /// Poll until `shutdown` is cancelled. A running cycle is never
    /// interrupted; cancellation ends the wait between cycles.
    pub async fn run(&self, shutdown: CancellationToken) {
        let span = info_span!(
            "scheduler",
            instance = %telemetry::instance_id(),
            poll_interval_secs = self.settings.poll_interval_secs,
        );
        async {
            info!("Activity scheduler started");
            let interval = self.poll_interval();
            loop {
                if shutdown.is_cancelled() {
                    break;
                }

                let correlation_id = telemetry::generate_correlation_id();
                let outcome = self
                    .run_cycle()
                    .instrument(info_span!("cycle", correlation.id = %correlation_id))
                    .await;
                debug!(?outcome, "Cycle finished");

                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            info!("Activity scheduler stopped");
        }
        .instrument(span)
        .await
    }

    /// Run cycles back to back until nothing is Pending, the store fails,
    /// the same stuck outcome repeats, or `max_cycles` is reached
    pub async fn drain(&self, max_cycles: usize) -> Vec<CycleOutcome> {
        let mut outcomes: Vec<CycleOutcome> = Vec::new();
        for _ in 0..max_cycles {
            let outcome = self.run_cycle().await;
            let stop = match &outcome {
                CycleOutcome::Idle | CycleOutcome::SelectionError(_) => true,
                stuck if stuck.is_stuck() => outcomes.last() == Some(stuck),
                _ => false,
            };
            outcomes.push(outcome);
            if stop {
                break;
            }
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::InMemoryBlobStore;
    use crate::clock::SystemClock;
    use crate::external::{MockDocumentConverter, MockDocumentFetcher};
    use crate::store::{InMemoryActivityStore, MockActivityStore, StoreError};
    use crate::workflow::ActivityKind;

    fn services(store: Arc<dyn ActivityStore>) -> Services {
        let mut converter = MockDocumentConverter::new();
        converter
            .expect_target_extension()
            .return_const("pdf".to_string());
        Services {
            store,
            blobs: Arc::new(InMemoryBlobStore::default()),
            fetcher: Arc::new(MockDocumentFetcher::new()),
            converter: Arc::new(converter),
            clock: Arc::new(SystemClock),
        }
    }

    fn scheduler(store: Arc<dyn ActivityStore>, config: &DocflowConfig) -> Scheduler {
        Scheduler::new(services(store), config).unwrap()
    }

    #[tokio::test]
    async fn test_idle_when_nothing_pending() {
        let store = Arc::new(InMemoryActivityStore::new());
        let scheduler = scheduler(store, &DocflowConfig::default());
        assert_eq!(scheduler.run_cycle().await, CycleOutcome::Idle);
    }

    #[tokio::test]
    async fn test_selection_error_mutates_nothing() {
        let mut store = MockActivityStore::new();
        store
            .expect_query()
            .returning(|_| Err(StoreError::Backend("connection reset".into())));
        store.expect_update_where().never();
        store.expect_append_log().never();

        let scheduler = scheduler(Arc::new(store), &DocflowConfig::default());
        assert!(matches!(
            scheduler.run_cycle().await,
            CycleOutcome::SelectionError(_)
        ));
    }

    #[tokio::test]
    async fn test_marker_completes_and_activates_successor() {
        let workflow = Uuid::new_v4();
        let start = Activity::new(workflow, ActivityKind::Start, 0).with_parameter("FileUrl", "u");
        let end = Activity::new(workflow, ActivityKind::End, 1)
            .with_status(ActivityStatus::Completed);
        let store = Arc::new(
            InMemoryActivityStore::with_activities(vec![start.clone(), end.clone()])
                .await
                .unwrap(),
        );
        let scheduler = scheduler(store.clone(), &DocflowConfig::default());

        assert_eq!(
            scheduler.run_cycle().await,
            CycleOutcome::Completed { id: start.id }
        );
        let done = store.get(start.id).await.unwrap().unwrap();
        assert_eq!(done.status, ActivityStatus::Completed);
        assert_eq!(done.parameters, start.parameters);
        assert!(done.started_at.is_some() && done.ended_at.is_some());

        let next = store.get(end.id).await.unwrap().unwrap();
        assert_eq!(next.status, ActivityStatus::Pending);
    }

    #[tokio::test]
    async fn test_unknown_kind_fails_by_default() {
        let activity = Activity::new(Uuid::new_v4(), ActivityKind::parse("Send Email"), 0);
        let store = Arc::new(
            InMemoryActivityStore::with_activities(vec![activity.clone()])
                .await
                .unwrap(),
        );
        let scheduler = scheduler(store.clone(), &DocflowConfig::default());

        assert!(matches!(
            scheduler.run_cycle().await,
            CycleOutcome::Failed { id, .. } if id == activity.id
        ));
        assert_eq!(scheduler.run_cycle().await, CycleOutcome::Idle);
        let failed = store.get(activity.id).await.unwrap().unwrap();
        assert_eq!(failed.status, ActivityStatus::Failed);
        assert!(failed.ended_at.is_some());
    }

    #[tokio::test]
    async fn test_deferral_leaves_unready_packaging_pending() {
        let packaging = Activity::new(Uuid::new_v4(), ActivityKind::Packaging, 3);
        let store = Arc::new(
            InMemoryActivityStore::with_activities(vec![packaging.clone()])
                .await
                .unwrap(),
        );
        let mut config = DocflowConfig::default();
        config.scheduler.defer_unready = true;
        let scheduler = scheduler(store.clone(), &config);

        let outcomes = scheduler.drain(10).await;
        assert_eq!(
            outcomes,
            vec![
                CycleOutcome::Deferred { id: packaging.id },
                CycleOutcome::Deferred { id: packaging.id }
            ]
        );
        let stored = store.get(packaging.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ActivityStatus::Pending);
        assert!(stored.started_at.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_cancellation() {
        let store = Arc::new(InMemoryActivityStore::new());
        let scheduler = Arc::new(scheduler(store, &DocflowConfig::default()));
        let token = CancellationToken::new();

        let handle = tokio::spawn({
            let scheduler = scheduler.clone();
            let token = token.clone();
            async move { scheduler.run(token).await }
        });

        tokio::time::sleep(Duration::from_secs(12)).await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
