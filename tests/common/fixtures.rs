//! Test fixtures: stores, mock clients and document drafts

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use dte_transmitter::background::{RetransmissionConfig, RetransmissionJob};
use dte_transmitter::clients::ClientError;
use dte_transmitter::document::{DocumentBody, DocumentType, Environment};
use dte_transmitter::pipeline::{ContingencyQueue, DocumentDraft, DocumentIssuer};
use dte_transmitter::storage::{HealthStatus, NewSigner, Signer, SqliteStore, Taxpayer};
use dte_transmitter::traits::{
    AuthorityClient, AuthorityCredentials, BatchOutcome, BatchSubmission, SigningClient,
    SigningCredentials, SingleSubmission, TransmissionResult,
};

pub const NIT_A: &str = "06140101011011";
pub const NIT_B: &str = "06142202022022";

// ========== Stores ==========

pub fn test_store() -> Arc<SqliteStore> {
    let store = SqliteStore::in_memory().expect("Failed to create in-memory storage");
    store.initialize().expect("Failed to initialize storage");
    Arc::new(store)
}

pub fn register_taxpayer(store: &SqliteStore, tax_id: &str) {
    store
        .upsert_taxpayer(&Taxpayer {
            tax_id: tax_id.to_string(),
            name: format!("Contribuyente {}", tax_id),
            signer_credential: "clave-privada".to_string(),
            authority_password: "clave-api".to_string(),
            environment: Environment::Test,
        })
        .expect("Failed to register taxpayer");
}

/// Active, healthy signer with room for `max_concurrent` requests
pub fn register_signer(store: &SqliteStore, name: &str, max_concurrent: u32) -> Signer {
    let signer = store
        .insert_signer(&NewSigner {
            name: name.to_string(),
            endpoint_url: format!("http://{}:8113/firmardocumento/", name),
            certificate_location: format!("/certs/{}", name),
            max_concurrent,
            priority: 1,
        })
        .expect("Failed to register signer");
    store
        .update_signer_health(signer.id, HealthStatus::Healthy)
        .expect("Failed to mark signer healthy");
    store.get_signer(signer.id).unwrap().unwrap()
}

// ========== Documents ==========

pub fn body(document_type: DocumentType, tax_id: &str) -> DocumentBody {
    DocumentBody::from_value(json!({
        "identificacion": {
            "version": document_type.schema_version(),
            "ambiente": "00",
            "tipoDte": document_type.code(),
            "numeroControl": null,
            "codigoGeneracion": Uuid::new_v4().to_string().to_uppercase(),
            "tipoModelo": 1,
            "tipoOperacion": 1,
            "tipoContingencia": null,
            "motivoContin": null,
            "fecEmi": "2026-10-16",
            "horEmi": "09:30:00",
            "tipoMoneda": "USD"
        },
        "emisor": { "nit": tax_id, "nombre": "Contribuyente" },
        "cuerpoDocumento": [
            { "numItem": 1, "descripcion": "Servicio", "cantidad": 1, "precioUni": 10.0 }
        ],
        "resumen": { "totalPagar": 11.3 }
    }))
    .expect("valid test body")
}

pub fn draft(tax_id: &str, document_type: DocumentType) -> DocumentDraft {
    DocumentDraft {
        taxpayer_id: tax_id.to_string(),
        establishment: "M001".to_string(),
        point_of_sale: "P001".to_string(),
        total_amount: 11.3,
        body: body(document_type, tax_id),
    }
}

pub fn draft_id(draft: &DocumentDraft) -> Uuid {
    Uuid::parse_str(&draft.body.identification.generation_code).unwrap()
}

// ========== Mock signing client ==========

/// Signs as `{nit}|{codigoGeneracion}|{tipoOperacion}`
pub struct MockSigningClient {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
    /// Generation codes whose signing fails
    pub fail_for: Mutex<Vec<String>>,
    /// Load seen on the signer row while signing
    pub observed_load: Mutex<Vec<u32>>,
    store: Option<Arc<SqliteStore>>,
}

impl MockSigningClient {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            fail_for: Mutex::new(vec![]),
            observed_load: Mutex::new(vec![]),
            store: None,
        }
    }

    /// Records the signer's persisted load on every call
    pub fn observing(store: Arc<SqliteStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::new()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SigningClient for MockSigningClient {
    async fn sign(
        &self,
        credentials: &SigningCredentials,
        document: &Value,
        signer: &Signer,
    ) -> Result<String, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(store) = &self.store {
            if let Ok(Some(s)) = store.get_signer(signer.id) {
                self.observed_load.lock().unwrap().push(s.current_load);
            }
        }

        let code = document["identificacion"]["codigoGeneracion"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        if self.fail.load(Ordering::SeqCst) || self.fail_for.lock().unwrap().contains(&code) {
            return Err(ClientError::Timeout(30));
        }

        Ok(format!(
            "{}|{}|{}",
            credentials.tax_id, code, document["identificacion"]["tipoOperacion"]
        ))
    }

    async fn probe(&self, _signer: &Signer) -> HealthStatus {
        HealthStatus::Healthy
    }
}

// ========== Mock authority client ==========

pub fn accepted(stamp: &str) -> TransmissionResult {
    TransmissionResult {
        success: true,
        status: Some("PROCESADO".to_string()),
        reception_stamp: Some(stamp.to_string()),
        response_code: Some("001".to_string()),
        message: Some("RECIBIDO".to_string()),
        ..Default::default()
    }
}

pub fn rejected(message: &str) -> TransmissionResult {
    TransmissionResult {
        success: false,
        status: Some("RECHAZADO".to_string()),
        response_code: Some("004".to_string()),
        message: Some(message.to_string()),
        error: Some(message.to_string()),
        error_details: vec!["Campo #/resumen/totalPagar no valido".to_string()],
        ..Default::default()
    }
}

pub struct MockAuthorityClient {
    /// Scripted single-submission replies; accepted with a generated stamp when empty
    pub single_replies: Mutex<VecDeque<Result<TransmissionResult, ClientError>>>,
    pub singles: Mutex<Vec<SingleSubmission>>,
    pub event_accepted: AtomicBool,
    /// Delay before answering a contingency event, in milliseconds
    pub event_delay_ms: AtomicU64,
    pub events: Mutex<Vec<(String, String)>>,
    pub batches: Mutex<Vec<(String, BatchSubmission)>>,
    pub outcome: Mutex<BatchOutcome>,
    pub polls: AtomicUsize,
    pub invalidation_reply: Mutex<Option<Result<TransmissionResult, ClientError>>>,
    pub invalidations: Mutex<Vec<String>>,
    pub auth_calls: AtomicUsize,
}

impl MockAuthorityClient {
    pub fn new() -> Self {
        Self {
            single_replies: Mutex::new(VecDeque::new()),
            singles: Mutex::new(vec![]),
            event_accepted: AtomicBool::new(true),
            event_delay_ms: AtomicU64::new(0),
            events: Mutex::new(vec![]),
            batches: Mutex::new(vec![]),
            outcome: Mutex::new(BatchOutcome::default()),
            polls: AtomicUsize::new(0),
            invalidation_reply: Mutex::new(None),
            invalidations: Mutex::new(vec![]),
            auth_calls: AtomicUsize::new(0),
        }
    }

    pub fn reply_single(&self, reply: Result<TransmissionResult, ClientError>) {
        self.single_replies.lock().unwrap().push_back(reply);
    }

    /// Calls that touch contingency work (events, batches, polls)
    pub fn contingency_calls(&self) -> usize {
        self.events.lock().unwrap().len()
            + self.batches.lock().unwrap().len()
            + self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthorityClient for MockAuthorityClient {
    async fn authenticate(&self, _credentials: &AuthorityCredentials) -> Result<String, ClientError> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        Ok("Bearer test-token".to_string())
    }

    async fn transmit_single(
        &self,
        _credentials: &AuthorityCredentials,
        submission: &SingleSubmission,
    ) -> Result<TransmissionResult, ClientError> {
        self.singles.lock().unwrap().push(submission.clone());
        self.single_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(accepted(&format!("SELLO-{}", submission.document_id))))
    }

    async fn transmit_contingency_event(
        &self,
        credentials: &AuthorityCredentials,
        signed_event: &str,
    ) -> Result<bool, ClientError> {
        let delay = self.event_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.events
            .lock()
            .unwrap()
            .push((credentials.user.clone(), signed_event.to_string()));
        Ok(self.event_accepted.load(Ordering::SeqCst))
    }

    async fn transmit_batch(
        &self,
        credentials: &AuthorityCredentials,
        submission: &BatchSubmission,
    ) -> Result<Option<String>, ClientError> {
        let mut batches = self.batches.lock().unwrap();
        batches.push((credentials.user.clone(), submission.clone()));
        Ok(Some(format!("LOTE-{}", batches.len())))
    }

    async fn poll_batch(
        &self,
        _credentials: &AuthorityCredentials,
        _authority_batch_id: &str,
    ) -> Result<BatchOutcome, ClientError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(self.outcome.lock().unwrap().clone())
    }

    async fn transmit_invalidation(
        &self,
        _credentials: &AuthorityCredentials,
        _environment: Environment,
        signed_event: &str,
    ) -> Result<TransmissionResult, ClientError> {
        self.invalidations.lock().unwrap().push(signed_event.to_string());
        self.invalidation_reply
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok(accepted("SELLO-ANULACION")))
    }
}

// ========== Assembled components ==========

pub struct TestEnv {
    pub store: Arc<SqliteStore>,
    pub signing: Arc<MockSigningClient>,
    pub authority: Arc<MockAuthorityClient>,
}

impl TestEnv {
    /// Store with taxpayer A and one healthy signer
    pub fn new() -> Self {
        let store = test_store();
        register_taxpayer(&store, NIT_A);
        register_signer(&store, "firmador-1", 5);
        Self {
            signing: Arc::new(MockSigningClient::observing(Arc::clone(&store))),
            authority: Arc::new(MockAuthorityClient::new()),
            store,
        }
    }

    pub fn issuer(&self) -> DocumentIssuer {
        DocumentIssuer::new(
            Arc::clone(&self.store),
            self.signing.clone(),
            self.authority.clone(),
        )
        .with_queue(ContingencyQueue::new(Arc::clone(&self.store)).with_retry(2, Duration::ZERO))
    }

    /// Retransmission job that polls once and gives up immediately
    pub fn retransmission_job(&self) -> RetransmissionJob {
        RetransmissionJob::new(
            Arc::clone(&self.store),
            self.signing.clone(),
            self.authority.clone(),
            RetransmissionConfig {
                poll_interval_secs: 0,
                poll_deadline_secs: 0,
                ..Default::default()
            },
        )
    }
}
