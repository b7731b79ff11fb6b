//! Activity store contract.
//!
//! The scheduler consumes the store through [`ActivityStore`]; it never owns
//! the records. Two update styles are supported because handlers use both:
//! sparse field updates selected by a predicate ([`ActivityStore::update_where`])
//! and wholesale replacement of a fetched-then-mutated record
//! ([`ActivityStore::replace`]).

pub mod memory;
#[cfg(feature = "database")]
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use crate::workflow::{Activity, ActivityKind, ActivityStatus, Parameters, Workflow, WorkflowLog};

pub use memory::InMemoryActivityStore;
#[cfg(feature = "database")]
pub use sqlite::SqliteActivityStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("activity {0} not found")]
    NotFound(Uuid),

    #[error("record {0} already exists")]
    Duplicate(Uuid),

    #[error("failed to decode stored record: {0}")]
    Decode(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Decode(err.to_string())
    }
}

/// Equality predicate over activity fields; unset fields match anything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityFilter {
    pub id: Option<Uuid>,
    pub workflow_id: Option<Uuid>,
    pub status: Option<ActivityStatus>,
    pub kind: Option<ActivityKind>,
    pub order: Option<i32>,
}

impl ActivityFilter {
    pub fn by_id(id: Uuid) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn status(mut self, status: ActivityStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn kind(mut self, kind: ActivityKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn workflow(mut self, workflow_id: Uuid) -> Self {
        self.workflow_id = Some(workflow_id);
        self
    }

    pub fn order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    pub fn matches(&self, activity: &Activity) -> bool {
        self.id.is_none_or(|id| activity.id == id)
            && self.workflow_id.is_none_or(|w| activity.workflow_id == w)
            && self.status.is_none_or(|s| activity.status == s)
            && self.kind.as_ref().is_none_or(|k| &activity.kind == k)
            && self.order.is_none_or(|o| activity.order == o)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Filtered, optionally ordered query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityQuery {
    pub filter: ActivityFilter,
    /// Sort by `order`; `None` keeps insertion order
    pub order_by: Option<SortDirection>,
    pub limit: Option<usize>,
}

impl ActivityQuery {
    pub fn new(filter: ActivityFilter) -> Self {
        Self {
            filter,
            order_by: None,
            limit: None,
        }
    }

    pub fn ascending(mut self) -> Self {
        self.order_by = Some(SortDirection::Ascending);
        self
    }

    pub fn descending(mut self) -> Self {
        self.order_by = Some(SortDirection::Descending);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Sparse update. Parameters are merged key by key (last write wins);
/// existing keys are never removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityPatch {
    pub status: Option<ActivityStatus>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub parameters: Option<Parameters>,
}

impl ActivityPatch {
    pub fn status(status: ActivityStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    pub fn ended_at(mut self, at: DateTime<Utc>) -> Self {
        self.ended_at = Some(at);
        self
    }

    pub fn merge_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = Some(parameters);
        self
    }

    pub fn apply(&self, activity: &mut Activity) {
        if let Some(status) = self.status {
            activity.status = status;
        }
        if let Some(at) = self.started_at {
            activity.started_at = Some(at);
        }
        if let Some(at) = self.ended_at {
            activity.ended_at = Some(at);
        }
        if let Some(parameters) = &self.parameters {
            for (key, value) in parameters {
                activity.parameters.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Persistent collection of activities, workflows and the status journal
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn insert_workflow(&self, workflow: &Workflow) -> Result<(), StoreError>;

    async fn workflows(&self) -> Result<Vec<Workflow>, StoreError>;

    async fn insert(&self, activity: &Activity) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Activity>, StoreError>;

    async fn query(&self, query: &ActivityQuery) -> Result<Vec<Activity>, StoreError>;

    /// Apply `patch` to every activity matching `filter`; returns rows touched
    async fn update_where(
        &self,
        filter: &ActivityFilter,
        patch: &ActivityPatch,
    ) -> Result<u64, StoreError>;

    /// Overwrite a record wholesale
    async fn replace(&self, activity: &Activity) -> Result<(), StoreError>;

    async fn append_log(&self, entry: &WorkflowLog) -> Result<(), StoreError>;

    async fn logs(&self, workflow_id: Uuid) -> Result<Vec<WorkflowLog>, StoreError>;
}
