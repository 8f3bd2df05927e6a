//! Server error types

use reqwest::StatusCode;
use thiserror::Error;
use uuid::Uuid;

use crate::clients::error::ClientError;
use crate::storage::DocumentStatus;

/// Main error type for the issuance pipeline and its collaborators
#[derive(Debug, Error)]
pub enum ServerError {
    // ========== Document Errors ==========
    /// Document not found
    #[error("document not found: {0}")]
    DocumentNotFound(Uuid),

    /// Document id already used
    #[error("duplicate document: {0}")]
    DuplicateDocument(Uuid),

    /// Status change not allowed by the document state machine
    #[error("invalid transition for document {document_id}: {from} -> {to}")]
    InvalidTransition {
        document_id: Uuid,
        from: DocumentStatus,
        to: DocumentStatus,
    },

    /// Invalidation requested for a document that is already invalidated
    #[error("document {0} is already invalidated")]
    AlreadyInvalidated(Uuid),

    /// Operation not possible in the document's current status
    #[error("document {document_id} cannot be invalidated while {status}")]
    InvalidState {
        document_id: Uuid,
        status: DocumentStatus,
    },

    /// Unexpected failure after the document was persisted (document is now ERROR)
    #[error("document {document_id} failed: {reason}")]
    DocumentFailed { document_id: Uuid, reason: String },

    // ========== Validation Errors ==========
    /// Taxpayer credentials not registered
    #[error("taxpayer not found: {0}")]
    TaxpayerNotFound(String),

    /// Every candidate signer is unhealthy or at capacity
    #[error("no signer available for taxpayer {0}")]
    NoSignerAvailable(String),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // ========== External Service Errors ==========
    /// Signer service failed
    #[error("signing failed: {0}")]
    Signing(ClientError),

    /// Tax authority call failed without a structured answer
    #[error("transmission failed: {0}")]
    Transmission(ClientError),

    /// Tax authority refused the request
    #[error("rejected by tax authority: {0}")]
    AuthorityRejected(String),

    // ========== Storage Errors ==========
    /// Storage operation failed
    #[error("storage error: {0}")]
    Storage(StorageError),

    // ========== Server Errors ==========
    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

/// Storage-specific errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Transaction failed
    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    /// Stored data could not be decoded
    #[error("data corruption: {0}")]
    Corruption(String),

    /// SQLite database error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Server result type alias
pub type ServerResult<T> = Result<T, ServerError>;

impl ServerError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            ServerError::InvalidArgument(_) | ServerError::TaxpayerNotFound(_) => {
                StatusCode::BAD_REQUEST
            }

            // 404 Not Found
            ServerError::DocumentNotFound(_) => StatusCode::NOT_FOUND,

            // 409 Conflict
            ServerError::DuplicateDocument(_)
            | ServerError::InvalidTransition { .. }
            | ServerError::AlreadyInvalidated(_)
            | ServerError::InvalidState { .. } => StatusCode::CONFLICT,

            // 422 Unprocessable Entity
            ServerError::AuthorityRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,

            // 502 Bad Gateway
            ServerError::Signing(ClientError::InvalidResponse(_))
            | ServerError::Transmission(ClientError::InvalidResponse(_)) => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            ServerError::NoSignerAvailable(_)
            | ServerError::Signing(_)
            | ServerError::Transmission(_) => StatusCode::SERVICE_UNAVAILABLE,

            // 500 Internal Server Error
            ServerError::DocumentFailed { .. }
            | ServerError::Storage(_)
            | ServerError::Internal(_)
            | ServerError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            ServerError::DocumentNotFound(_) => "DOCUMENT_NOT_FOUND",
            ServerError::DuplicateDocument(_) => "DUPLICATE_DOCUMENT",
            ServerError::InvalidTransition { .. } => "INVALID_TRANSITION",
            ServerError::AlreadyInvalidated(_) => "ALREADY_INVALIDATED",
            ServerError::InvalidState { .. } => "INVALID_STATE",
            ServerError::DocumentFailed { .. } => "DOCUMENT_FAILED",
            ServerError::TaxpayerNotFound(_) => "TAXPAYER_NOT_FOUND",
            ServerError::NoSignerAvailable(_) => "NO_SIGNER_AVAILABLE",
            ServerError::InvalidArgument(_) => "INVALID_ARGUMENT",
            ServerError::Signing(_) => "SIGNING_ERROR",
            ServerError::Transmission(_) => "TRANSMISSION_ERROR",
            ServerError::AuthorityRejected(_) => "AUTHORITY_REJECTED",
            ServerError::Storage(_) => "STORAGE_ERROR",
            ServerError::Internal(_) => "INTERNAL_ERROR",
            ServerError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Check if error is recoverable (client can retry)
    pub fn is_recoverable(&self) -> bool {
        match self {
            ServerError::NoSignerAvailable(_) => true,
            ServerError::Signing(e) | ServerError::Transmission(e) => e.is_transport(),
            ServerError::Storage(StorageError::ConnectionFailed(_)) => true,
            _ => false,
        }
    }

    /// Document id the caller can follow up on, when one was already persisted
    pub fn document_id(&self) -> Option<Uuid> {
        match self {
            ServerError::DocumentFailed { document_id, .. }
            | ServerError::InvalidTransition { document_id, .. }
            | ServerError::InvalidState { document_id, .. } => Some(*document_id),
            ServerError::DocumentNotFound(id)
            | ServerError::DuplicateDocument(id)
            | ServerError::AlreadyInvalidated(id) => Some(*id),
            _ => None,
        }
    }
}

// Conversions from external errors

impl From<serde_json::Error> for ServerError {
    fn from(e: serde_json::Error) -> Self {
        ServerError::InvalidArgument(e.to_string())
    }
}

impl From<rusqlite::Error> for ServerError {
    fn from(e: rusqlite::Error) -> Self {
        ServerError::Storage(StorageError::Sqlite(e))
    }
}

impl From<StorageError> for ServerError {
    fn from(e: StorageError) -> Self {
        ServerError::Storage(e)
    }
}
