//! Document state tracker
//!
//! Single entry point for lifecycle changes; the storage layer enforces the
//! allowed transitions, this layer names them and logs them.

use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ServerError, ServerResult};
use crate::storage::{
    ContingencyRecord, DocumentRecord, DocumentStatus, NewDocument, SqliteStore, TransitionDetails,
};

#[derive(Clone)]
pub struct DocumentTracker {
    store: Arc<SqliteStore>,
}

impl DocumentTracker {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }

    pub fn record_signed(&self, document: &NewDocument) -> ServerResult<DocumentRecord> {
        let record = self.store.insert_document(document)?;
        tracing::info!(
            document_id = %record.document_id,
            tax_id = %record.taxpayer_id,
            control_number = %record.control_number,
            "Document signed"
        );
        Ok(record)
    }

    pub fn mark_processed(&self, id: Uuid, stamp: Option<&str>) -> ServerResult<DocumentRecord> {
        let details = TransitionDetails {
            reception_stamp: stamp.map(str::to_string),
            ..Default::default()
        };
        let record = self
            .store
            .transition_document(id, DocumentStatus::Processed, &details)?;
        tracing::info!(document_id = %id, stamp = ?stamp, "Document processed by authority");
        Ok(record)
    }

    pub fn mark_rejected(
        &self,
        id: Uuid,
        message: &str,
        details: Vec<String>,
    ) -> ServerResult<DocumentRecord> {
        let record = self.store.transition_document(
            id,
            DocumentStatus::Rejected,
            &TransitionDetails::failed(message, details),
        )?;
        tracing::warn!(document_id = %id, message = %message, "Document rejected by authority");
        Ok(record)
    }

    pub fn mark_transmission_error(
        &self,
        id: Uuid,
        message: &str,
        details: Vec<String>,
    ) -> ServerResult<DocumentRecord> {
        let record = self.store.transition_document(
            id,
            DocumentStatus::TransmissionError,
            &TransitionDetails::failed(message, details),
        )?;
        tracing::warn!(document_id = %id, message = %message, "Document transmission failed");
        Ok(record)
    }

    pub fn mark_invalidated(&self, id: Uuid) -> ServerResult<DocumentRecord> {
        let record = self.store.transition_document(
            id,
            DocumentStatus::Invalidated,
            &TransitionDetails::default(),
        )?;
        tracing::info!(document_id = %id, "Document invalidated");
        Ok(record)
    }

    /// Record an unexpected failure; never fails itself
    pub fn mark_error(&self, id: Uuid, error: &ServerError) {
        let details = TransitionDetails::failed(error.to_string(), vec![]);
        match self
            .store
            .transition_document(id, DocumentStatus::Error, &details)
        {
            Ok(_) => tracing::error!(document_id = %id, error = %error, "Document set to ERROR"),
            Err(e) => tracing::error!(
                document_id = %id,
                error = %error,
                mark_error = %e,
                "Could not set document to ERROR"
            ),
        }
    }

    pub fn get(&self, id: Uuid) -> ServerResult<DocumentRecord> {
        self.store
            .get_document(id)?
            .ok_or(ServerError::DocumentNotFound(id))
    }

    pub fn contingency_for(&self, id: Uuid) -> ServerResult<Vec<ContingencyRecord>> {
        self.store.contingency_for_document(id)
    }
}
