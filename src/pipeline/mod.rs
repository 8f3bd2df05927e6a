//! Request-path pipeline: classification, lifecycle tracking, the
//! contingency queue and the issuance orchestrator.

pub mod classifier;
pub mod contingency;
pub mod issuer;
pub mod tracker;

pub use classifier::{classify, should_retry, Outcome};
pub use contingency::ContingencyQueue;
pub use issuer::{DocumentDraft, DocumentIssuer, IssueReceipt};
pub use tracker::DocumentTracker;
