//! Tax authority client trait definition

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::clients::error::ClientError;
use crate::document::{DocumentType, Environment};

/// Login for the authority's auth endpoint
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorityCredentials {
    /// Taxpayer tax id
    pub user: String,
    pub password: String,
}

impl fmt::Debug for AuthorityCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorityCredentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Structured answer of the authority to a single submission or an invalidation
///
/// Produced for every HTTP response, including non-2xx ones; transport
/// failures are reported as `ClientError` instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransmissionResult {
    pub success: bool,
    /// Authority-reported state (`PROCESADO`, `RECHAZADO`, ...)
    pub status: Option<String>,
    pub reception_stamp: Option<String>,
    pub response_code: Option<String>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub error_details: Vec<String>,
    pub raw_response: Option<String>,
}

impl TransmissionResult {
    /// Result for a response that carried no authority envelope
    pub fn http_failure(status: u16, body: String) -> Self {
        Self {
            success: false,
            response_code: Some(status.to_string()),
            error: Some(format!("HTTP error {}", status)),
            raw_response: Some(body),
            ..Default::default()
        }
    }

    /// Best human-readable description of a failed result
    pub fn failure_message(&self) -> String {
        self.message
            .clone()
            .or_else(|| self.error.clone())
            .or_else(|| self.status.clone())
            .unwrap_or_else(|| "unknown authority response".to_string())
    }
}

/// One signed document sent on its own
#[derive(Debug, Clone)]
pub struct SingleSubmission {
    pub document_id: Uuid,
    pub environment: Environment,
    pub document_type: DocumentType,
    pub schema_version: u32,
    pub signed_token: String,
}

/// Signed documents of one taxpayer and one type sent as a batch
#[derive(Debug, Clone)]
pub struct BatchSubmission {
    /// Our id for the submission (`idEnvio`)
    pub batch_id: Uuid,
    pub environment: Environment,
    pub document_type: DocumentType,
    pub schema_version: u32,
    pub signed_tokens: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedDocument {
    pub document_id: Uuid,
    pub reception_stamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedDocument {
    pub document_id: Uuid,
    pub message: String,
}

/// Resolution reported so far for a batch; documents still in flight are absent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub processed: Vec<ProcessedDocument>,
    pub rejected: Vec<RejectedDocument>,
}

impl BatchOutcome {
    pub fn is_empty(&self) -> bool {
        self.processed.is_empty() && self.rejected.is_empty()
    }

    pub fn resolved_count(&self) -> usize {
        self.processed.len() + self.rejected.len()
    }
}

/// Tax authority reception API
///
/// Implementations obtain and cache the auth token themselves, which is why
/// every call carries the taxpayer's credentials.
#[async_trait]
pub trait AuthorityClient: Send + Sync {
    /// Obtain a token (served from cache while it is fresh)
    async fn authenticate(&self, credentials: &AuthorityCredentials) -> Result<String, ClientError>;

    async fn transmit_single(
        &self,
        credentials: &AuthorityCredentials,
        submission: &SingleSubmission,
    ) -> Result<TransmissionResult, ClientError>;

    /// Declare a contingency period; `true` when the authority received it
    async fn transmit_contingency_event(
        &self,
        credentials: &AuthorityCredentials,
        signed_event: &str,
    ) -> Result<bool, ClientError>;

    /// Submit a batch, returning the authority's batch code when accepted for processing
    async fn transmit_batch(
        &self,
        credentials: &AuthorityCredentials,
        submission: &BatchSubmission,
    ) -> Result<Option<String>, ClientError>;

    async fn poll_batch(
        &self,
        credentials: &AuthorityCredentials,
        authority_batch_id: &str,
    ) -> Result<BatchOutcome, ClientError>;

    async fn transmit_invalidation(
        &self,
        credentials: &AuthorityCredentials,
        environment: Environment,
        signed_event: &str,
    ) -> Result<TransmissionResult, ClientError>;
}
