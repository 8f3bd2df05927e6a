//! dte-transmitter library exports

pub mod background;
pub mod clients;
pub mod config;
pub mod document;
pub mod error;
pub mod pipeline;
pub mod pool;
pub mod storage;
pub mod traits;

// Re-exports
pub use error::{ServerError, ServerResult, StorageError};
pub use pipeline::{DocumentDraft, DocumentIssuer, IssueReceipt};
pub use storage::{DocumentStatus, SqliteStore};
pub use traits::{AuthorityClient, SigningClient};
