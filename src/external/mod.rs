//! External capabilities the handlers depend on
//!
//! Document retrieval over HTTP and format conversion through an office
//! suite binary. Both sit behind traits so handlers can be exercised
//! without network access or a converter installed.

pub mod command;
pub mod convert;
pub mod fetch;

pub use command::{CommandError, CommandExecutor, CommandOutput, ProcessCommandExecutor};
pub use convert::{ConversionError, DocumentConverter, OfficeConverter};
pub use fetch::{DocumentFetcher, FetchError, HttpDocumentFetcher};

#[cfg(any(test, feature = "testing"))]
pub use convert::MockDocumentConverter;
#[cfg(any(test, feature = "testing"))]
pub use fetch::MockDocumentFetcher;
