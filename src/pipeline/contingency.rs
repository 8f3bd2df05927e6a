//! Contingency queue
//!
//! Store-and-forward for documents whose transmission failed in a retryable way.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::document::{ContingencyReason, Environment};
use crate::error::{ServerError, ServerResult};
use crate::storage::{
    ContingencyPayload, ContingencyRecord, DocumentRecord, SqliteStore,
};

const DEFAULT_ENQUEUE_ATTEMPTS: u32 = 3;
const DEFAULT_ENQUEUE_BACKOFF: Duration = Duration::from_millis(200);

#[derive(Clone)]
pub struct ContingencyQueue {
    store: Arc<SqliteStore>,
    max_attempts: u32,
    backoff: Duration,
}

impl ContingencyQueue {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self {
            store,
            max_attempts: DEFAULT_ENQUEUE_ATTEMPTS,
            backoff: DEFAULT_ENQUEUE_BACKOFF,
        }
    }

    pub fn with_retry(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff = backoff;
        self
    }

    /// Queue a signed document and move it to CONTINGENCY
    ///
    /// Returns whether the document was queued; failures are logged, never raised.
    pub async fn enqueue(
        &self,
        document: &DocumentRecord,
        environment: Environment,
        reason: &ContingencyReason,
        original_error: Option<String>,
    ) -> bool {
        let Some(signed_token) = document.signed_token.clone() else {
            tracing::error!(document_id = %document.document_id, "Cannot queue a document without signed token");
            return false;
        };

        let schema_version = document.unsigned_payload["identificacion"]["version"]
            .as_u64()
            .map(|v| v as u32)
            .unwrap_or_else(|| document.document_type.schema_version());

        let payload = ContingencyPayload {
            document_id: document.document_id,
            signed_token,
            unsigned_payload: document.unsigned_payload.clone(),
            taxpayer_tax_id: document.taxpayer_id.clone(),
            environment,
            schema_version,
            contingency_reason_code: reason.code,
            contingency_reason_text: reason.text.clone(),
            original_error,
            stored_at: Utc::now(),
        };

        for attempt in 1..=self.max_attempts {
            match self.store.enqueue_contingency(document.document_type, &payload) {
                Ok(contingency_id) => {
                    tracing::warn!(
                        document_id = %document.document_id,
                        tax_id = %document.taxpayer_id,
                        contingency_id,
                        reason_code = reason.code,
                        "Document queued for retransmission"
                    );
                    return true;
                }
                Err(e @ ServerError::Storage(_)) if attempt < self.max_attempts => {
                    tracing::warn!(
                        document_id = %document.document_id,
                        attempt,
                        error = %e,
                        "Contingency enqueue failed, retrying"
                    );
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                Err(e) => {
                    tracing::error!(
                        document_id = %document.document_id,
                        attempt,
                        error = %e,
                        "Contingency enqueue failed"
                    );
                    return false;
                }
            }
        }

        false
    }

    /// Pending records, oldest first
    pub fn pending_batch(&self, limit: usize) -> ServerResult<Vec<ContingencyRecord>> {
        self.store.pending_contingency(limit)
    }

    /// Persist a re-signed payload before it is submitted
    pub fn store_resigned(&self, record: &ContingencyRecord, payload: &ContingencyPayload) -> ServerResult<()> {
        self.store.store_resigned_payload(record.contingency_id, payload)
    }

    pub fn record_batch_attempt(&self, contingency_ids: &[i64]) -> ServerResult<()> {
        self.store.record_batch_attempt(contingency_ids)
    }

    pub fn mark_processed(&self, record: &ContingencyRecord, stamp: &str) -> ServerResult<()> {
        self.store.mark_contingency_processed(record.contingency_id, stamp)?;
        tracing::info!(
            document_id = %record.document_id,
            contingency_id = record.contingency_id,
            "Contingency document processed"
        );
        Ok(())
    }

    pub fn mark_failed(&self, record: &ContingencyRecord, message: &str) -> ServerResult<()> {
        self.store.mark_contingency_failed(record.contingency_id, message)?;
        tracing::warn!(
            document_id = %record.document_id,
            contingency_id = record.contingency_id,
            message = %message,
            "Contingency document rejected"
        );
        Ok(())
    }
}
