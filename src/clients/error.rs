//! HTTP client error types shared by the signer and tax authority clients

use thiserror::Error;

/// Outbound call errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Network communication error (connect refused, DNS, reset)
    #[error("network error: {0}")]
    Network(String),

    /// Request timeout
    #[error("timeout after {0} seconds")]
    Timeout(u64),

    /// Service answered with a non-success HTTP status
    #[error("HTTP error {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// Response could not be understood
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Authentication against the tax authority failed
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Service not configured
    #[error("not configured: {0}")]
    NotConfigured(String),
}

impl ClientError {
    /// Build from a reqwest error, keeping timeouts distinct from other transport failures
    pub fn from_reqwest(e: reqwest::Error, timeout_secs: u64) -> Self {
        if e.is_timeout() {
            ClientError::Timeout(timeout_secs)
        } else if e.is_connect() {
            ClientError::Network(format!("connection failed: {}", e))
        } else if e.is_decode() {
            ClientError::InvalidResponse(e.to_string())
        } else {
            ClientError::Network(e.to_string())
        }
    }

    /// No HTTP response was obtained at all
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Network(_) | ClientError::Timeout(_))
    }

    /// HTTP status carried by the error, if any
    pub fn http_status(&self) -> Option<u16> {
        match self {
            ClientError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}
