//! Signing service trait definition

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

use crate::clients::error::ClientError;
use crate::storage::{HealthStatus, Signer};

/// What a signer needs to unlock the taxpayer's private key
#[derive(Clone, PartialEq, Eq)]
pub struct SigningCredentials {
    pub tax_id: String,
    pub private_key_password: String,
}

impl fmt::Debug for SigningCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningCredentials")
            .field("tax_id", &self.tax_id)
            .field("private_key_password", &"<redacted>")
            .finish()
    }
}

/// External signing service client
///
/// Implementations never retry; retry policy belongs to the caller.
#[async_trait]
pub trait SigningClient: Send + Sync {
    /// Sign a document body with the given signer, returning the compact signed token
    async fn sign(
        &self,
        credentials: &SigningCredentials,
        document: &Value,
        signer: &Signer,
    ) -> Result<String, ClientError>;

    /// Probe the signer's status endpoint
    async fn probe(&self, signer: &Signer) -> HealthStatus;
}
