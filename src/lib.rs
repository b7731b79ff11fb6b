// docflow - document workflow activity scheduler
// Exposes the scheduler, handlers and store/blob seams for the binary and tests

pub mod blob;
pub mod clock;
pub mod config;
pub mod external;
pub mod handlers;
pub mod scheduler;
pub mod shutdown;
pub mod store;
pub mod telemetry;
pub mod workflow;

// Re-export key types for easy access
pub use blob::{BlobError, BlobStore, FsBlobStore, InMemoryBlobStore, UploadOptions};
pub use clock::{Clock, SteppingClock, SystemClock};
pub use config::{config, DocflowConfig};
pub use external::{
    DocumentConverter, DocumentFetcher, HttpDocumentFetcher, OfficeConverter,
};
pub use handlers::{ActivityHandler, HandlerError, HandlerRegistry, RegistryError};
pub use scheduler::{CycleOutcome, Scheduler, Services};
pub use shutdown::ShutdownCoordinator;
pub use store::{ActivityStore, InMemoryActivityStore, StoreError};
#[cfg(feature = "database")]
pub use store::SqliteActivityStore;
pub use telemetry::{generate_correlation_id, init_telemetry};
pub use workflow::{Activity, ActivityKind, ActivityStatus, Workflow, WorkflowDefinition};
