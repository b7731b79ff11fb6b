use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::clock::Clock;
use crate::store::{ActivityFilter, ActivityPatch, ActivityQuery, ActivityStore};
use crate::workflow::{Activity, ActivityStatus, Parameters, WorkflowLog};

/// Result of trying to unblock the next step of a workflow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainStep {
    /// The successor was set to Pending
    Activated { id: Uuid },
    /// No activity at `order + 1`; the workflow has run out of steps
    Finished,
    /// The store could not be read or written; the successor is unchanged
    Broken { reason: String },
}

/// Activates the successor of a completed activity
#[derive(Clone)]
pub struct Chainer {
    store: Arc<dyn ActivityStore>,
    clock: Arc<dyn Clock>,
}

impl Chainer {
    pub fn new(store: Arc<dyn ActivityStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Look up `(workflow, order + 1)` and set it Pending whatever its
    /// current status, copying over any parameter keys it lacks.
    /// The workflow record itself is never updated.
    pub async fn activate_successor(&self, completed: &Activity) -> ChainStep {
        let Some(next_order) = completed.order.checked_add(1) else {
            return self.finished(completed).await;
        };

        let query = ActivityQuery::new(
            ActivityFilter::default()
                .workflow(completed.workflow_id)
                .order(next_order),
        )
        .limit(1);
        let successor = match self.store.query(&query).await {
            Ok(found) => found.into_iter().next(),
            Err(e) => {
                error!(
                    workflow.id = %completed.workflow_id,
                    error = %e,
                    "Failed to look up successor"
                );
                return ChainStep::Broken {
                    reason: e.to_string(),
                };
            }
        };
        let Some(successor) = successor else {
            return self.finished(completed).await;
        };

        let carried: Parameters = completed
            .parameters
            .iter()
            .filter(|(key, _)| !successor.parameters.contains_key(*key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let mut patch = ActivityPatch::status(ActivityStatus::Pending);
        if !carried.is_empty() {
            patch = patch.merge_parameters(carried);
        }

        if let Err(e) = self
            .store
            .update_where(&ActivityFilter::by_id(successor.id), &patch)
            .await
        {
            error!(activity.id = %successor.id, error = %e, "Failed to activate successor");
            return ChainStep::Broken {
                reason: e.to_string(),
            };
        }

        info!(
            activity.id = %successor.id,
            activity.kind = %successor.kind,
            activity.order = successor.order,
            previous.status = %successor.status,
            "Activated next activity"
        );
        let entry = WorkflowLog::for_activity(
            &successor,
            ActivityStatus::Pending.as_str(),
            format!("activated after {} completed", completed.kind),
            self.clock.now(),
        );
        if let Err(e) = self.store.append_log(&entry).await {
            error!(activity.id = %successor.id, error = %e, "Failed to write journal entry");
        }
        ChainStep::Activated { id: successor.id }
    }

    async fn finished(&self, completed: &Activity) -> ChainStep {
        info!(
            workflow.id = %completed.workflow_id,
            activity.order = completed.order,
            "No further activities, workflow finished"
        );
        let entry = WorkflowLog::for_workflow(
            completed.workflow_id,
            "Finished",
            format!("last activity ({}) completed", completed.kind),
            self.clock.now(),
        );
        if let Err(e) = self.store.append_log(&entry).await {
            error!(
                workflow.id = %completed.workflow_id,
                error = %e,
                "Failed to write journal entry"
            );
        }
        ChainStep::Finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::store::{InMemoryActivityStore, MockActivityStore, StoreError};
    use crate::workflow::ActivityKind;

    fn chainer(store: Arc<dyn ActivityStore>) -> Chainer {
        Chainer::new(store, Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn test_activates_next_order_and_carries_missing_keys() {
        let workflow = Uuid::new_v4();
        let completed = Activity::new(workflow, ActivityKind::QualityCheck, 1)
            .with_status(ActivityStatus::Completed)
            .with_parameter("FileUrl", "https://files/doc.docx")
            .with_parameter("WordCount", "120");
        let successor = Activity::new(workflow, ActivityKind::FormatConversion, 2)
            .with_status(ActivityStatus::Failed)
            .with_parameter("WordCount", "own");
        let elsewhere = Activity::new(Uuid::new_v4(), ActivityKind::Packaging, 2)
            .with_status(ActivityStatus::Completed);
        let store = Arc::new(
            InMemoryActivityStore::with_activities(vec![
                completed.clone(),
                successor.clone(),
                elsewhere.clone(),
            ])
            .await
            .unwrap(),
        );

        let step = chainer(store.clone()).activate_successor(&completed).await;
        assert_eq!(step, ChainStep::Activated { id: successor.id });

        let activated = store.get(successor.id).await.unwrap().unwrap();
        assert_eq!(activated.status, ActivityStatus::Pending);
        assert_eq!(activated.parameter("FileUrl"), Some("https://files/doc.docx"));
        // existing keys are never overwritten by the predecessor
        assert_eq!(activated.parameter("WordCount"), Some("own"));

        let untouched = store.get(elsewhere.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, ActivityStatus::Completed);
    }

    #[tokio::test]
    async fn test_last_activity_finishes_workflow() {
        let workflow = Uuid::new_v4();
        let end =
            Activity::new(workflow, ActivityKind::End, 4).with_status(ActivityStatus::Completed);
        let store = Arc::new(
            InMemoryActivityStore::with_activities(vec![end.clone()])
                .await
                .unwrap(),
        );

        assert_eq!(
            chainer(store.clone()).activate_successor(&end).await,
            ChainStep::Finished
        );
        let journal = store.logs(workflow).await.unwrap();
        assert_eq!(journal.len(), 1);
        assert_eq!(journal[0].status, "Finished");
        assert_eq!(journal[0].activity_id, None);
    }

    #[tokio::test]
    async fn test_max_order_does_not_overflow() {
        let end = Activity::new(Uuid::new_v4(), ActivityKind::End, i32::MAX);
        let mut store = MockActivityStore::new();
        store.expect_query().never();
        store.expect_append_log().times(1).returning(|_| Ok(()));
        assert_eq!(
            chainer(Arc::new(store)).activate_successor(&end).await,
            ChainStep::Finished
        );
    }

    #[tokio::test]
    async fn test_lookup_failure_is_reported() {
        let mut store = MockActivityStore::new();
        store
            .expect_query()
            .returning(|_| Err(StoreError::Backend("timeout".into())));
        store.expect_update_where().never();
        let completed = Activity::new(Uuid::new_v4(), ActivityKind::Start, 0);
        assert!(matches!(
            chainer(Arc::new(store)).activate_successor(&completed).await,
            ChainStep::Broken { .. }
        ));
    }
}
