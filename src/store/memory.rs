use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ActivityFilter, ActivityPatch, ActivityQuery, ActivityStore, SortDirection, StoreError};
use crate::workflow::{Activity, Workflow, WorkflowLog};

#[derive(Debug, Default)]
struct State {
    // insertion order is the tie-breaker for equal `order` values
    activities: Vec<Activity>,
    workflows: Vec<Workflow>,
    logs: Vec<WorkflowLog>,
}

/// Process-local store, used by tests and single-shot runs
#[derive(Debug, Default)]
pub struct InMemoryActivityStore {
    state: RwLock<State>,
}

impl InMemoryActivityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with activities
    pub async fn with_activities(activities: Vec<Activity>) -> Result<Self, StoreError> {
        let store = Self::new();
        for activity in &activities {
            store.insert(activity).await?;
        }
        Ok(store)
    }

    /// Snapshot of every activity in insertion order
    pub async fn snapshot(&self) -> Vec<Activity> {
        self.state.read().await.activities.clone()
    }
}

#[async_trait]
impl ActivityStore for InMemoryActivityStore {
    async fn insert_workflow(&self, workflow: &Workflow) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.workflows.iter().any(|w| w.id == workflow.id) {
            return Err(StoreError::Duplicate(workflow.id));
        }
        state.workflows.push(workflow.clone());
        Ok(())
    }

    async fn workflows(&self) -> Result<Vec<Workflow>, StoreError> {
        Ok(self.state.read().await.workflows.clone())
    }

    async fn insert(&self, activity: &Activity) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.activities.iter().any(|a| a.id == activity.id) {
            return Err(StoreError::Duplicate(activity.id));
        }
        state.activities.push(activity.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Activity>, StoreError> {
        let state = self.state.read().await;
        Ok(state.activities.iter().find(|a| a.id == id).cloned())
    }

    async fn query(&self, query: &ActivityQuery) -> Result<Vec<Activity>, StoreError> {
        let state = self.state.read().await;
        let mut found: Vec<Activity> = state
            .activities
            .iter()
            .filter(|a| query.filter.matches(a))
            .cloned()
            .collect();

        // sort_by_key is stable, so ties keep insertion order
        match query.order_by {
            Some(SortDirection::Ascending) => found.sort_by_key(|a| a.order),
            Some(SortDirection::Descending) => found.sort_by_key(|a| std::cmp::Reverse(a.order)),
            None => {}
        }

        if let Some(limit) = query.limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    async fn update_where(
        &self,
        filter: &ActivityFilter,
        patch: &ActivityPatch,
    ) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let mut touched = 0;
        for activity in state.activities.iter_mut().filter(|a| filter.matches(a)) {
            patch.apply(activity);
            touched += 1;
        }
        Ok(touched)
    }

    async fn replace(&self, activity: &Activity) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let slot = state
            .activities
            .iter_mut()
            .find(|a| a.id == activity.id)
            .ok_or(StoreError::NotFound(activity.id))?;
        *slot = activity.clone();
        Ok(())
    }

    async fn append_log(&self, entry: &WorkflowLog) -> Result<(), StoreError> {
        self.state.write().await.logs.push(entry.clone());
        Ok(())
    }

    async fn logs(&self, workflow_id: Uuid) -> Result<Vec<WorkflowLog>, StoreError> {
        let state = self.state.read().await;
        let mut entries: Vec<WorkflowLog> = state
            .logs
            .iter()
            .filter(|l| l.workflow_id == workflow_id)
            .cloned()
            .collect();
        entries.sort_by_key(|l| l.timestamp);
        Ok(entries)
    }
}
