// Workflow data model: activities, kinds, statuses and the parameter blackboard

pub mod definition;
pub mod params;
pub mod types;

pub use definition::{ActivityDefinition, DefinitionError, WorkflowDefinition};
pub use params::{ConvertedDocument, ParameterError, SourceDocument};
pub use types::{
    Activity, ActivityKind, ActivityStatus, Dispatch, HandlerKind, Parameters, Workflow,
    WorkflowLog,
};
