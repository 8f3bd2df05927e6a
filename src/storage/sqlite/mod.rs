// File: src/storage/sqlite/mod.rs

mod config;
mod contingency;
mod documents;
mod schema;
mod sequences;
mod signers;
mod store;
mod taxpayers;

// Public exports
pub use config::SqliteConfig;
pub use contingency::{ContingencyPayload, ContingencyRecord, ContingencyStatus};
pub use documents::{DocumentRecord, DocumentStatus, NewDocument, TransitionDetails};
pub use signers::{AssignedSigner, HealthStatus, NewSigner, Signer};
pub use store::SqliteStore;
pub use taxpayers::Taxpayer;
