//! Transmission outcome classification
//!
//! Pure functions of the attempt's result and error; no I/O.

use crate::clients::error::ClientError;
use crate::document::ContingencyReason;
use crate::traits::TransmissionResult;

/// Authority state strings meaning a definitive refusal
const REJECTED_STATES: &[&str] = &["RECHAZADO", "REJECTED"];

/// Substrings of a response code or error text that indicate a transient failure
const TRANSIENT_MARKERS: &[&str] = &[
    "http error",
    "connect",
    "timeout",
    "timed out",
    "service unavailable",
    "503",
    "504",
    "401",
    "unauthorized",
];

/// Where a transmission attempt leaves the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Accepted,
    Rejected,
    /// Retryable failure, goes to the contingency queue
    Retry,
    /// Neither accepted, rejected nor retryable
    Failed,
}

pub fn is_rejected(result: &TransmissionResult) -> bool {
    result
        .status
        .as_deref()
        .map(|s| REJECTED_STATES.iter().any(|r| s.trim().eq_ignore_ascii_case(r)))
        .unwrap_or(false)
}

fn has_transient_marker(text: &str) -> bool {
    let text = text.to_ascii_lowercase();
    TRANSIENT_MARKERS.iter().any(|m| text.contains(m))
}

fn is_transient_error(error: &ClientError) -> bool {
    match error {
        ClientError::Network(_) | ClientError::Timeout(_) => true,
        ClientError::HttpStatus { status, .. } => *status >= 500 || *status == 401,
        _ => false,
    }
}

/// Whether a failed transmission should be queued for retransmission
pub fn should_retry(result: Option<&TransmissionResult>, error: Option<&ClientError>) -> bool {
    if let Some(result) = result {
        if is_rejected(result) || result.success {
            return false;
        }
    }

    if let Some(error) = error {
        if is_transient_error(error) {
            return true;
        }
    }

    if let Some(result) = result {
        let code = result.response_code.as_deref().map(has_transient_marker);
        let text = result.error.as_deref().map(has_transient_marker);
        if code == Some(true) || text == Some(true) {
            return true;
        }
    }

    result.is_none() && error.is_none()
}

pub fn classify(result: Option<&TransmissionResult>, error: Option<&ClientError>) -> Outcome {
    if let Some(result) = result {
        if is_rejected(result) {
            return Outcome::Rejected;
        }
        if result.success {
            return Outcome::Accepted;
        }
    }

    if should_retry(result, error) {
        Outcome::Retry
    } else {
        Outcome::Failed
    }
}

fn is_unavailable_status(status: u16) -> bool {
    status >= 500
}

impl ContingencyReason {
    /// Contingency type matching a retryable failure
    pub fn from_failure(result: Option<&TransmissionResult>, error: Option<&ClientError>) -> Self {
        match error {
            Some(ClientError::Timeout(_)) => return Self::authority_unavailable(),
            Some(ClientError::HttpStatus { status, .. }) if is_unavailable_status(*status) => {
                return Self::authority_unavailable()
            }
            Some(ClientError::Network(text)) => {
                let lower = text.to_ascii_lowercase();
                if lower.contains("connect") || lower.contains("dns") || lower.contains("resolve") {
                    return Self::issuer_connectivity();
                }
                return Self::other(text);
            }
            Some(other) => return Self::other(&other.to_string()),
            None => {}
        }

        let Some(result) = result else {
            return Self::authority_unavailable();
        };

        let code_unavailable = result
            .response_code
            .as_deref()
            .and_then(|c| c.trim().parse::<u16>().ok())
            .map(is_unavailable_status)
            .unwrap_or(false);
        let text = result.error.clone().unwrap_or_else(|| result.failure_message());
        let lower = text.to_ascii_lowercase();

        if code_unavailable
            || lower.contains("timeout")
            || lower.contains("timed out")
            || lower.contains("service unavailable")
            || lower.contains("503")
            || lower.contains("504")
        {
            Self::authority_unavailable()
        } else {
            Self::other(&text)
        }
    }
}
