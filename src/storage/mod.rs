//! Storage module
//!
//! Durable state of the pipeline: documents and their lifecycle, the
//! contingency queue, the signer pool and control-number sequences, all in
//! one SQLite database.

pub mod sqlite;

pub use sqlite::{
    AssignedSigner, ContingencyPayload, ContingencyRecord, ContingencyStatus, DocumentRecord,
    DocumentStatus, HealthStatus, NewDocument, NewSigner, Signer, SqliteConfig, SqliteStore,
    Taxpayer, TransitionDetails,
};
