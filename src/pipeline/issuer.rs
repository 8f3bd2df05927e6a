//! Issuance pipeline
//!
//! Runs one request end to end: control number, signing, persistence,
//! transmission and classification. Also owns the invalidation flow.

use chrono::{Datelike, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

use super::classifier::{classify, Outcome};
use super::contingency::ContingencyQueue;
use super::tracker::DocumentTracker;
use crate::clients::error::ClientError;
use crate::document::{
    ContingencyReason, ControlNumberScope, ControlNumberService, DocumentBody, InvalidatedDocument,
    InvalidationEvent, Issuer,
};
use crate::error::{ServerError, ServerResult};
use crate::pool::SignerPool;
use crate::storage::{
    ContingencyRecord, DocumentRecord, DocumentStatus, NewDocument, SqliteStore, Taxpayer,
};
use crate::traits::{AuthorityClient, SigningClient, SingleSubmission, TransmissionResult};

/// A document assembled by the request builder, not yet numbered or signed
#[derive(Debug, Clone)]
pub struct DocumentDraft {
    pub taxpayer_id: String,
    /// Four-character establishment code
    pub establishment: String,
    /// Four-character point-of-sale code
    pub point_of_sale: String,
    pub total_amount: f64,
    /// Body with `codigoGeneracion` already set by the caller
    pub body: DocumentBody,
}

/// What the caller gets back for an issued or invalidated document
#[derive(Debug, Clone, PartialEq)]
pub struct IssueReceipt {
    pub document_id: Uuid,
    pub control_number: String,
    pub status: DocumentStatus,
    pub reception_stamp: Option<String>,
    pub message: Option<String>,
    pub error_details: Vec<String>,
}

impl IssueReceipt {
    fn from_record(record: &DocumentRecord, message: Option<String>) -> Self {
        Self {
            document_id: record.document_id,
            control_number: record.control_number.clone(),
            status: record.status,
            reception_stamp: record.reception_stamp.clone(),
            message: message.or_else(|| record.error_message.clone()),
            error_details: record.error_details.clone(),
        }
    }
}

/// Orchestrates the signer pool, the signing and authority clients and the stores
pub struct DocumentIssuer {
    store: Arc<SqliteStore>,
    pool: SignerPool,
    signing: Arc<dyn SigningClient>,
    authority: Arc<dyn AuthorityClient>,
    control_numbers: ControlNumberService,
    tracker: DocumentTracker,
    queue: ContingencyQueue,
}

impl DocumentIssuer {
    pub fn new(
        store: Arc<SqliteStore>,
        signing: Arc<dyn SigningClient>,
        authority: Arc<dyn AuthorityClient>,
    ) -> Self {
        Self {
            pool: SignerPool::new(Arc::clone(&store)),
            control_numbers: ControlNumberService::new(Arc::clone(&store)),
            tracker: DocumentTracker::new(Arc::clone(&store)),
            queue: ContingencyQueue::new(Arc::clone(&store)),
            store,
            signing,
            authority,
        }
    }

    pub fn with_queue(mut self, queue: ContingencyQueue) -> Self {
        self.queue = queue;
        self
    }

    fn taxpayer(&self, tax_id: &str) -> ServerResult<Taxpayer> {
        self.store
            .get_taxpayer(tax_id)?
            .ok_or_else(|| ServerError::TaxpayerNotFound(tax_id.to_string()))
    }

    /// Issue one document
    pub async fn issue(&self, draft: DocumentDraft) -> ServerResult<IssueReceipt> {
        let DocumentDraft {
            taxpayer_id,
            establishment,
            point_of_sale,
            total_amount,
            mut body,
        } = draft;

        // Validation: nothing is persisted on failure
        let taxpayer = self.taxpayer(&taxpayer_id)?;
        let document_id = Uuid::parse_str(&body.identification.generation_code).map_err(|_| {
            ServerError::InvalidArgument(format!(
                "invalid generation code {:?}",
                body.identification.generation_code
            ))
        })?;
        if body.identification.environment != taxpayer.environment {
            return Err(ServerError::InvalidArgument(format!(
                "document environment {} does not match taxpayer environment {}",
                body.identification.environment, taxpayer.environment
            )));
        }
        if self.store.get_document(document_id)?.is_some() {
            return Err(ServerError::DuplicateDocument(document_id));
        }

        let document_type = body.identification.document_type;
        let year = body
            .issue_date()
            .and_then(|d| d.get(0..4))
            .and_then(|y| y.parse::<i32>().ok())
            .unwrap_or_else(|| Utc::now().year());
        let scope = ControlNumberScope {
            taxpayer_id: taxpayer.tax_id.clone(),
            document_type,
            establishment,
            point_of_sale,
            year,
        };
        scope.validate()?;

        // The lease comes first so a request without a signer allocates no number
        let lease = self.pool.acquire(&taxpayer.tax_id)?;

        let control_number = self.control_numbers.next(&scope)?;
        body.set_control_number(&control_number);
        body.mark_normal_operation();
        let unsigned = body.to_value()?;

        // Signing: a failure leaves no document behind
        let signed_token = self
            .signing
            .sign(&taxpayer.signing_credentials(), &unsigned, lease.signer())
            .await
            .map_err(|e| {
                tracing::warn!(
                    document_id = %document_id,
                    signer = %lease.signer().name,
                    error = %e,
                    "Signing failed"
                );
                ServerError::Signing(e)
            })?;
        drop(lease);

        let record = self.tracker.record_signed(&NewDocument {
            document_id,
            taxpayer_id: taxpayer.tax_id.clone(),
            document_type,
            unsigned_payload: unsigned,
            signed_token: signed_token.clone(),
            control_number,
            total_amount,
        })?;

        let submission = SingleSubmission {
            document_id,
            environment: taxpayer.environment,
            document_type,
            schema_version: body.identification.version,
            signed_token,
        };

        match self.transmit_and_resolve(&taxpayer, &record, &submission).await {
            Ok(receipt) => Ok(receipt),
            Err(e) => {
                self.tracker.mark_error(document_id, &e);
                Err(ServerError::DocumentFailed {
                    document_id,
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn transmit_and_resolve(
        &self,
        taxpayer: &Taxpayer,
        record: &DocumentRecord,
        submission: &SingleSubmission,
    ) -> ServerResult<IssueReceipt> {
        let attempt = self
            .authority
            .transmit_single(&taxpayer.authority_credentials(), submission)
            .await;

        let (result, error): (Option<TransmissionResult>, Option<ClientError>) = match attempt {
            Ok(result) => (Some(result), None),
            Err(e) => (None, Some(e)),
        };
        let id = record.document_id;

        match classify(result.as_ref(), error.as_ref()) {
            Outcome::Accepted => {
                let stamp = result.as_ref().and_then(|r| r.reception_stamp.as_deref());
                let updated = self.tracker.mark_processed(id, stamp)?;
                Ok(IssueReceipt::from_record(&updated, None))
            }
            Outcome::Rejected => {
                let result = result.unwrap_or_default();
                let updated = self.tracker.mark_rejected(
                    id,
                    &result.failure_message(),
                    result.error_details.clone(),
                )?;
                Ok(IssueReceipt::from_record(&updated, None))
            }
            Outcome::Retry => {
                let reason = ContingencyReason::from_failure(result.as_ref(), error.as_ref());
                let original_error = error
                    .as_ref()
                    .map(|e| e.to_string())
                    .or_else(|| result.as_ref().map(|r| r.failure_message()));

                let queued = self
                    .queue
                    .enqueue(record, taxpayer.environment, &reason, original_error)
                    .await;
                if !queued {
                    return Err(ServerError::Internal(
                        "document could not be queued for retransmission".into(),
                    ));
                }
                let updated = self.tracker.get(id)?;
                Ok(IssueReceipt::from_record(&updated, Some(reason.text)))
            }
            Outcome::Failed => {
                let (message, details) = match (&result, &error) {
                    (Some(r), _) => (r.failure_message(), r.error_details.clone()),
                    (None, Some(e)) => (e.to_string(), vec![]),
                    (None, None) => ("no response".to_string(), vec![]),
                };
                let updated = self.tracker.mark_transmission_error(id, &message, details)?;
                Ok(IssueReceipt::from_record(&updated, None))
            }
        }
    }

    /// Void a document the authority already processed
    pub async fn invalidate(
        &self,
        document_id: Uuid,
        motive: Map<String, Value>,
    ) -> ServerResult<IssueReceipt> {
        let document = self.tracker.get(document_id)?;
        match document.status {
            DocumentStatus::Processed => {}
            DocumentStatus::Invalidated => return Err(ServerError::AlreadyInvalidated(document_id)),
            status => {
                return Err(ServerError::InvalidState {
                    document_id,
                    status,
                })
            }
        }
        let reception_stamp = document.reception_stamp.clone().ok_or(ServerError::InvalidState {
            document_id,
            status: document.status,
        })?;

        let taxpayer = self.taxpayer(&document.taxpayer_id)?;
        let issue_date = DocumentBody::from_value(document.unsigned_payload.clone())
            .ok()
            .and_then(|b| b.issue_date().map(str::to_string));

        let event = InvalidationEvent {
            event_id: Uuid::new_v4(),
            environment: taxpayer.environment,
            issuer: Issuer {
                tax_id: taxpayer.tax_id.clone(),
                name: taxpayer.name.clone(),
            },
            document: InvalidatedDocument {
                document_id,
                document_type: document.document_type,
                control_number: document.control_number.clone(),
                reception_stamp,
                issue_date,
            },
            motive,
            requested_at: Utc::now(),
        };

        let signed_event = {
            let lease = self.pool.acquire(&taxpayer.tax_id)?;
            self.signing
                .sign(&taxpayer.signing_credentials(), &event.to_value(), lease.signer())
                .await
                .map_err(ServerError::Signing)?
        };

        let result = self
            .authority
            .transmit_invalidation(
                &taxpayer.authority_credentials(),
                taxpayer.environment,
                &signed_event,
            )
            .await
            .map_err(ServerError::Transmission)?;

        if result.success {
            let updated = self.tracker.mark_invalidated(document_id)?;
            let mut receipt = IssueReceipt::from_record(&updated, result.message.clone());
            receipt.reception_stamp = result.reception_stamp.or(receipt.reception_stamp);
            Ok(receipt)
        } else {
            tracing::warn!(
                document_id = %document_id,
                message = %result.failure_message(),
                "Invalidation refused by authority"
            );
            Ok(IssueReceipt {
                document_id,
                control_number: document.control_number,
                status: document.status,
                reception_stamp: document.reception_stamp,
                message: Some(result.failure_message()),
                error_details: result.error_details,
            })
        }
    }

    /// Current state of a document
    pub fn get_document(&self, document_id: Uuid) -> ServerResult<DocumentRecord> {
        self.tracker.get(document_id)
    }

    /// Contingency history of a document
    pub fn contingency_for_document(&self, document_id: Uuid) -> ServerResult<Vec<ContingencyRecord>> {
        self.tracker.contingency_for(document_id)
    }
}
