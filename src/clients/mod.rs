//! Outbound HTTP clients: signing service and tax authority

pub mod authority;
pub mod error;
pub mod signer;

pub use authority::{AuthorityConfig, HttpAuthorityClient};
pub use error::ClientError;
pub use signer::HttpSigningClient;
