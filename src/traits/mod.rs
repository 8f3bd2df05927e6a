//! Trait definitions for the external services the pipeline talks to

pub mod authority;
pub mod signing;

// Re-export all types
pub use authority::{
    AuthorityClient, AuthorityCredentials, BatchOutcome, BatchSubmission, ProcessedDocument,
    RejectedDocument, SingleSubmission, TransmissionResult,
};
pub use signing::{SigningClient, SigningCredentials};
