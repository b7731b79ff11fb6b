//! Workflow submission files.
//!
//! A definition names the workflow and lists its activities. It is the
//! creation path the scheduler itself never takes. Activities start Pending
//! unless the definition gives a `status`; later steps are normally
//! submitted `Waiting` so only chaining releases them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

use super::types::{Activity, ActivityKind, ActivityStatus, Parameters, Workflow};

#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid TOML definition: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid JSON definition: {0}")]
    Json(#[from] serde_json::Error),

    #[error("workflow has no activities")]
    Empty,

    #[error("order {0} is used by more than one activity")]
    DuplicateOrder(i32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityDefinition {
    pub kind: ActivityKind,
    pub order: i32,
    #[serde(default)]
    pub parameters: Parameters,
    /// Initial status; Pending when omitted
    #[serde(default)]
    pub status: Option<ActivityStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    pub activities: Vec<ActivityDefinition>,
}

impl WorkflowDefinition {
    /// Read a `.json` or `.toml` file; anything not ending in `.json` is
    /// parsed as TOML
    pub fn from_file(path: &Path) -> Result<Self, DefinitionError> {
        let raw = std::fs::read_to_string(path).map_err(|source| DefinitionError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Ok(serde_json::from_str(&raw)?)
        } else {
            Ok(toml::from_str(&raw)?)
        }
    }

    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.activities.is_empty() {
            return Err(DefinitionError::Empty);
        }
        let mut seen = BTreeSet::new();
        for activity in &self.activities {
            if !seen.insert(activity.order) {
                return Err(DefinitionError::DuplicateOrder(activity.order));
            }
        }
        Ok(())
    }

    /// Records ready to insert, activities sorted by order
    pub fn into_records(
        self,
        now: DateTime<Utc>,
    ) -> Result<(Workflow, Vec<Activity>), DefinitionError> {
        self.validate()?;
        let workflow = Workflow::new(&self.name, now);
        let mut activities: Vec<Activity> = self
            .activities
            .into_iter()
            .map(|definition| {
                let mut activity = Activity::new(workflow.id, definition.kind, definition.order);
                activity.parameters = definition.parameters;
                if let Some(status) = definition.status {
                    activity.status = status;
                }
                activity
            })
            .collect();
        activities.sort_by_key(|a| a.order);
        Ok((workflow, activities))
    }
}
