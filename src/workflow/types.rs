// Core types for the activity state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// String-to-string blackboard carried between activities
pub type Parameters = BTreeMap<String, String>;

/// Category of an activity, deciding how the scheduler dispatches it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ActivityKind {
    /// Structural marker opening a workflow
    Start,
    /// Structural marker closing a workflow
    End,
    /// Document quality check ("Online QC")
    QualityCheck,
    /// Document format conversion ("PDF Journal Publication")
    FormatConversion,
    /// Archive packaging ("Package Creation")
    Packaging,
    /// Any value not in the known set, kept verbatim
    Unrecognized(String),
}

impl ActivityKind {
    /// The name written to the store
    pub fn wire_name(&self) -> &str {
        match self {
            ActivityKind::Start => "Start",
            ActivityKind::End => "End",
            ActivityKind::QualityCheck => "Online QC",
            ActivityKind::FormatConversion => "PDF Journal Publication",
            ActivityKind::Packaging => "Package Creation",
            ActivityKind::Unrecognized(raw) => raw,
        }
    }

    /// Parse a stored kind; never fails, unknown values are preserved
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "start" => ActivityKind::Start,
            "end" => ActivityKind::End,
            "online qc" | "qualitycheck" | "quality_check" => ActivityKind::QualityCheck,
            "pdf journal publication" | "formatconversion" | "format_conversion" => {
                ActivityKind::FormatConversion
            }
            "package creation" | "packaging" => ActivityKind::Packaging,
            _ => ActivityKind::Unrecognized(raw.to_string()),
        }
    }

    /// How the scheduler routes this kind
    pub fn dispatch(&self) -> Dispatch {
        match self {
            ActivityKind::Start | ActivityKind::End => Dispatch::Marker,
            ActivityKind::QualityCheck => Dispatch::Handler(HandlerKind::QualityCheck),
            ActivityKind::FormatConversion => Dispatch::Handler(HandlerKind::FormatConversion),
            ActivityKind::Packaging => Dispatch::Handler(HandlerKind::Packaging),
            ActivityKind::Unrecognized(raw) => Dispatch::Unrecognized(raw.clone()),
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl From<String> for ActivityKind {
    fn from(raw: String) -> Self {
        ActivityKind::parse(&raw)
    }
}

impl From<ActivityKind> for String {
    fn from(kind: ActivityKind) -> Self {
        kind.wire_name().to_string()
    }
}

/// Kinds that carry payload work and therefore need a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HandlerKind {
    QualityCheck,
    FormatConversion,
    Packaging,
}

impl HandlerKind {
    pub const ALL: [HandlerKind; 3] = [
        HandlerKind::QualityCheck,
        HandlerKind::FormatConversion,
        HandlerKind::Packaging,
    ];

    pub fn activity_kind(self) -> ActivityKind {
        match self {
            HandlerKind::QualityCheck => ActivityKind::QualityCheck,
            HandlerKind::FormatConversion => ActivityKind::FormatConversion,
            HandlerKind::Packaging => ActivityKind::Packaging,
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.activity_kind())
    }
}

/// Routing decision for one activity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Start/End: completed directly, no handler
    Marker,
    Handler(HandlerKind),
    Unrecognized(String),
}

/// Activity lifecycle status. Only moves forward except through chaining
/// or an external reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityStatus {
    /// Created but held until chaining releases it; never selected
    Waiting,
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityStatus::Waiting => "Waiting",
            ActivityStatus::Pending => "Pending",
            ActivityStatus::Processing => "Processing",
            ActivityStatus::Completed => "Completed",
            ActivityStatus::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ActivityStatus::Completed | ActivityStatus::Failed)
    }
}

impl fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown activity status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for ActivityStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "waiting" => Ok(ActivityStatus::Waiting),
            "pending" => Ok(ActivityStatus::Pending),
            "processing" => Ok(ActivityStatus::Processing),
            "completed" => Ok(ActivityStatus::Completed),
            "failed" => Ok(ActivityStatus::Failed),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

/// One step in a workflow's ordered sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub kind: ActivityKind,
    pub status: ActivityStatus,
    /// Strict position within the workflow
    pub order: i32,
    #[serde(default)]
    pub parameters: Parameters,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Activity {
    /// A fresh Pending activity with a generated id
    pub fn new(workflow_id: Uuid, kind: ActivityKind, order: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            kind,
            status: ActivityStatus::Pending,
            order,
            parameters: Parameters::new(),
            started_at: None,
            ended_at: None,
        }
    }

    pub fn with_parameter(mut self, key: &str, value: impl Into<String>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }

    pub fn with_status(mut self, status: ActivityStatus) -> Self {
        self.status = status;
        self
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }
}

/// An ordered collection of activities. Owned by the submission path;
/// the scheduler only reads ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    pub fn new(name: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            status: ActivityStatus::Pending.to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Journal entry for a status change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowLog {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub activity_id: Option<Uuid>,
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl WorkflowLog {
    pub fn for_activity(
        activity: &Activity,
        status: &str,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id: activity.workflow_id,
            activity_id: Some(activity.id),
            status: status.to_string(),
            message: message.into(),
            timestamp,
        }
    }

    pub fn for_workflow(
        workflow_id: Uuid,
        status: &str,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            activity_id: None,
            status: status.to_string(),
            message: message.into(),
            timestamp,
        }
    }
}
