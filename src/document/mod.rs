//! DTE document model: catalogues, structured body, control numbers and
//! the event documents sent alongside regular DTEs.

pub mod body;
pub mod control_number;
pub mod events;
pub mod types;

pub use body::{DocumentBody, Identification};
pub use control_number::{ControlNumberScope, ControlNumberService};
pub use events::{AffectedDocument, ContingencyEvent, InvalidatedDocument, InvalidationEvent, Issuer};
pub use types::{ContingencyReason, DocumentType, Environment};
