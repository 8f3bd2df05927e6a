//! End-to-end issuance and invalidation tests against mocked signer and authority

mod common;

use common::*;
use dte_transmitter::clients::ClientError;
use dte_transmitter::document::DocumentType;
use dte_transmitter::pipeline::DocumentIssuer;
use dte_transmitter::storage::{ContingencyStatus, DocumentStatus, SqliteStore};
use dte_transmitter::traits::TransmissionResult;
use dte_transmitter::ServerError;
use serde_json::{json, Map, Value};
use std::sync::atomic::Ordering;

fn motive() -> Map<String, Value> {
    json!({
        "tipoAnulacion": 2,
        "motivoAnulacion": "Error en monto",
        "nombreResponsable": "Responsable",
        "tipDocResponsable": "36",
        "numDocResponsable": NIT_A
    })
    .as_object()
    .cloned()
    .unwrap()
}

// ========== Issuance ==========

#[tokio::test]
async fn test_accepted_document_is_processed_with_stamp() {
    let env = TestEnv::new();
    env.authority.reply_single(Ok(accepted("SELLO-1")));
    let draft = draft(NIT_A, DocumentType::Invoice);
    let id = draft_id(&draft);

    let receipt = env.issuer().issue(draft).await.unwrap();
    assert_eq!(receipt.status, DocumentStatus::Processed);
    assert_eq!(receipt.reception_stamp.as_deref(), Some("SELLO-1"));

    let doc = assert_document_status(&env.store, id, DocumentStatus::Processed);
    assert_stamped(&doc, "SELLO-1");
    assert_eq!(doc.control_number, receipt.control_number);
    assert_eq!(doc.unsigned_payload["identificacion"]["numeroControl"], doc.control_number);
    assert_eq!(doc.unsigned_payload["identificacion"]["tipoOperacion"], 1);
    assert!(env.store.contingency_for_document(id).unwrap().is_empty());

    let singles = env.authority.singles.lock().unwrap();
    assert_eq!(singles.len(), 1);
    assert_eq!(singles[0].document_id, id);
    assert_eq!(singles[0].schema_version, 1);
}

#[tokio::test]
async fn test_timeout_moves_document_to_contingency() {
    let env = TestEnv::new();
    env.authority.reply_single(Err(ClientError::Timeout(45)));
    let draft = draft(NIT_A, DocumentType::TaxCreditInvoice);
    let id = draft_id(&draft);

    let receipt = env.issuer().issue(draft).await.unwrap();
    assert_eq!(receipt.status, DocumentStatus::Contingency);

    let doc = assert_document_status(&env.store, id, DocumentStatus::Contingency);
    assert_contingency_statuses(&env.store, id, &[ContingencyStatus::Pending]);

    let record = &env.store.contingency_for_document(id).unwrap()[0];
    assert_eq!(record.payload.unsigned_payload, doc.unsigned_payload);
    assert_eq!(record.payload.signed_token, doc.signed_token.clone().unwrap());
    assert_eq!(record.payload.taxpayer_tax_id, NIT_A);
    assert_eq!(record.payload.contingency_reason_code, 1);
    assert_eq!(record.payload.schema_version, 3);
    assert_eq!(
        record.payload.original_error.as_deref(),
        Some("timeout after 45 seconds")
    );
}

#[tokio::test]
async fn test_unreachable_authority_is_connectivity_contingency() {
    let env = TestEnv::new();
    env.authority.reply_single(Err(ClientError::Network(
        "connection failed: dns error".into(),
    )));
    let draft = draft(NIT_A, DocumentType::Invoice);
    let id = draft_id(&draft);

    env.issuer().issue(draft).await.unwrap();

    let record = &env.store.contingency_for_document(id).unwrap()[0];
    assert_eq!(record.payload.contingency_reason_code, 3);
}

#[tokio::test]
async fn test_service_unavailable_is_queued() {
    let env = TestEnv::new();
    env.authority.reply_single(Ok(TransmissionResult::http_failure(503, "down".into())));
    let draft = draft(NIT_A, DocumentType::Invoice);
    let id = draft_id(&draft);

    let receipt = env.issuer().issue(draft).await.unwrap();
    assert_eq!(receipt.status, DocumentStatus::Contingency);
    assert_contingency_statuses(&env.store, id, &[ContingencyStatus::Pending]);
}

#[tokio::test]
async fn test_rejected_document_keeps_authority_message() {
    let env = TestEnv::new();
    env.authority.reply_single(Ok(rejected("Monto total no coincide")));
    let draft = draft(NIT_A, DocumentType::Invoice);
    let id = draft_id(&draft);

    let receipt = env.issuer().issue(draft).await.unwrap();
    assert_eq!(receipt.status, DocumentStatus::Rejected);

    let doc = assert_document_status(&env.store, id, DocumentStatus::Rejected);
    assert!(doc.error_message.unwrap().contains("Monto total no coincide"));
    assert_eq!(doc.error_details.len(), 1);
    assert!(env.store.contingency_for_document(id).unwrap().is_empty());
}

#[tokio::test]
async fn test_observed_document_is_transmission_error() {
    let env = TestEnv::new();
    env.authority.reply_single(Ok(TransmissionResult {
        success: false,
        status: Some("OBSERVADO".into()),
        response_code: Some("002".into()),
        error: Some("documento con observaciones".into()),
        ..Default::default()
    }));
    let draft = draft(NIT_A, DocumentType::Invoice);
    let id = draft_id(&draft);

    let receipt = env.issuer().issue(draft).await.unwrap();
    assert_eq!(receipt.status, DocumentStatus::TransmissionError);
    assert_document_status(&env.store, id, DocumentStatus::TransmissionError);
    assert!(env.store.contingency_for_document(id).unwrap().is_empty());
}

#[tokio::test]
async fn test_control_numbers_increase_by_one() {
    let env = TestEnv::new();
    let issuer = env.issuer();

    let mut sequences = vec![];
    for _ in 0..3 {
        let receipt = issuer.issue(draft(NIT_A, DocumentType::Invoice)).await.unwrap();
        assert!(receipt.control_number.starts_with("DTE-01-M001P001-2026"));
        sequences.push(control_sequence(&receipt.control_number));
    }
    assert_eq!(sequences, vec![1, 2, 3]);

    // separate scope, separate sequence
    let mut other = draft(NIT_A, DocumentType::Invoice);
    other.point_of_sale = "P002".into();
    let receipt = issuer.issue(other).await.unwrap();
    assert_eq!(control_sequence(&receipt.control_number), 1);

    let receipt = issuer
        .issue(draft(NIT_A, DocumentType::CreditNote))
        .await
        .unwrap();
    assert!(receipt.control_number.starts_with("DTE-05-"));
    assert_eq!(control_sequence(&receipt.control_number), 1);
}

#[tokio::test]
async fn test_signer_load_is_taken_and_released() {
    let env = TestEnv::new();
    env.issuer().issue(draft(NIT_A, DocumentType::Invoice)).await.unwrap();

    assert_eq!(*env.signing.observed_load.lock().unwrap(), vec![1]);
    let signer = &env.store.active_signers().unwrap()[0];
    assert_eq!(signer.current_load, 0);
}

#[tokio::test]
async fn test_signing_failure_persists_nothing() {
    let env = TestEnv::new();
    env.signing.fail.store(true, Ordering::SeqCst);

    let err = env
        .issuer()
        .issue(draft(NIT_A, DocumentType::Invoice))
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::Signing(_)));
    assert_eq!(env.store.document_count().unwrap(), 0);
    assert!(env.authority.singles.lock().unwrap().is_empty());
    assert_eq!(env.store.active_signers().unwrap()[0].current_load, 0);
}

#[tokio::test]
async fn test_unknown_taxpayer_is_rejected_before_signing() {
    let env = TestEnv::new();
    let err = env
        .issuer()
        .issue(draft(NIT_B, DocumentType::Invoice))
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::TaxpayerNotFound(_)));
    assert_eq!(env.signing.call_count(), 0);
    assert_eq!(env.store.document_count().unwrap(), 0);
}

#[tokio::test]
async fn test_no_available_signer() {
    let store = test_store();
    register_taxpayer(&store, NIT_A);
    let signer = register_signer(&store, "firmador-1", 1);
    store.set_signer_active(signer.id, false).unwrap();

    let issuer = DocumentIssuer::new(
        Arc::clone(&store),
        Arc::new(MockSigningClient::new()),
        Arc::new(MockAuthorityClient::new()),
    );
    let err = issuer
        .issue(draft(NIT_A, DocumentType::Invoice))
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::NoSignerAvailable(_)));
    assert_eq!(store.document_count().unwrap(), 0);
}

#[tokio::test]
async fn test_missing_signer_allocates_no_control_number() {
    let env = TestEnv::new();
    let issuer = env.issuer();
    let signer = env.store.active_signers().unwrap()[0].clone();

    let first = issuer.issue(draft(NIT_A, DocumentType::Invoice)).await.unwrap();

    env.store.set_signer_active(signer.id, false).unwrap();
    let err = issuer
        .issue(draft(NIT_A, DocumentType::Invoice))
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::NoSignerAvailable(_)));

    env.store.set_signer_active(signer.id, true).unwrap();
    let second = issuer.issue(draft(NIT_A, DocumentType::Invoice)).await.unwrap();

    assert_eq!(control_sequence(&first.control_number), 1);
    assert_eq!(control_sequence(&second.control_number), 2);
    assert_eq!(env.store.document_count().unwrap(), 2);
}

#[tokio::test]
async fn test_duplicate_generation_code() {
    let env = TestEnv::new();
    let issuer = env.issuer();
    let first = draft(NIT_A, DocumentType::Invoice);
    let second = first.clone();

    issuer.issue(first).await.unwrap();
    let err = issuer.issue(second).await.unwrap_err();
    assert!(matches!(err, ServerError::DuplicateDocument(_)));
    assert_eq!(env.store.document_count().unwrap(), 1);
}

#[tokio::test]
async fn test_environment_mismatch_is_invalid() {
    let env = TestEnv::new();
    let mut draft = draft(NIT_A, DocumentType::Invoice);
    draft.body.identification.environment = dte_transmitter::document::Environment::Production;

    let err = env.issuer().issue(draft).await.unwrap_err();
    assert!(matches!(err, ServerError::InvalidArgument(_)));
    assert_eq!(err.status_code(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_storage_failure_after_persist_marks_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dte.db");
    let store = Arc::new(SqliteStore::new(&path).unwrap());
    store.initialize().unwrap();
    register_taxpayer(&store, NIT_A);
    register_signer(&store, "firmador-1", 5);

    // queue table disappears underneath the running service
    let other = rusqlite::Connection::open(&path).unwrap();
    other.execute_batch("DROP TABLE contingency_records").unwrap();

    let authority = Arc::new(MockAuthorityClient::new());
    authority.reply_single(Err(ClientError::Timeout(45)));
    let issuer = DocumentIssuer::new(
        Arc::clone(&store),
        Arc::new(MockSigningClient::new()),
        authority,
    )
    .with_queue(
        dte_transmitter::pipeline::ContingencyQueue::new(Arc::clone(&store))
            .with_retry(1, std::time::Duration::ZERO),
    );

    let draft = draft(NIT_A, DocumentType::Invoice);
    let id = draft_id(&draft);
    let err = issuer.issue(draft).await.unwrap_err();

    assert!(matches!(err, ServerError::DocumentFailed { .. }));
    assert_eq!(err.document_id(), Some(id));
    assert_document_status(&store, id, DocumentStatus::Error);
}

// ========== Invalidation ==========

#[tokio::test]
async fn test_invalidate_processed_document() {
    let env = TestEnv::new();
    let issuer = env.issuer();
    env.authority.reply_single(Ok(accepted("SELLO-1")));
    let draft = draft(NIT_A, DocumentType::Invoice);
    let id = draft_id(&draft);
    issuer.issue(draft).await.unwrap();

    let receipt = issuer.invalidate(id, motive()).await.unwrap();
    assert_eq!(receipt.status, DocumentStatus::Invalidated);
    assert_document_status(&env.store, id, DocumentStatus::Invalidated);
    assert_eq!(env.authority.invalidations.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_invalidating_twice_is_refused_without_mutation() {
    let env = TestEnv::new();
    let issuer = env.issuer();
    let draft = draft(NIT_A, DocumentType::Invoice);
    let id = draft_id(&draft);
    issuer.issue(draft).await.unwrap();
    issuer.invalidate(id, motive()).await.unwrap();
    let before = env.store.get_document(id).unwrap().unwrap();
    let signed_before = env.signing.call_count();

    let err = issuer.invalidate(id, motive()).await.unwrap_err();
    assert!(matches!(err, ServerError::AlreadyInvalidated(_)));
    assert!(err.to_string().contains("already invalidated"));

    let after = env.store.get_document(id).unwrap().unwrap();
    assert_eq!(after.status, DocumentStatus::Invalidated);
    assert_eq!(after.updated_at, before.updated_at);
    assert_eq!(env.signing.call_count(), signed_before);
    assert_eq!(env.authority.invalidations.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_rejected_document_cannot_be_invalidated() {
    let env = TestEnv::new();
    let issuer = env.issuer();
    env.authority.reply_single(Ok(rejected("NIT invalido")));
    let draft = draft(NIT_A, DocumentType::Invoice);
    let id = draft_id(&draft);
    issuer.issue(draft).await.unwrap();

    let err = issuer.invalidate(id, motive()).await.unwrap_err();
    assert!(matches!(
        err,
        ServerError::InvalidState {
            status: DocumentStatus::Rejected,
            ..
        }
    ));
    assert_document_status(&env.store, id, DocumentStatus::Rejected);
    assert!(env.authority.invalidations.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_refused_invalidation_leaves_document_processed() {
    let env = TestEnv::new();
    let issuer = env.issuer();
    let draft = draft(NIT_A, DocumentType::Invoice);
    let id = draft_id(&draft);
    issuer.issue(draft).await.unwrap();
    *env.authority.invalidation_reply.lock().unwrap() =
        Some(Ok(rejected("Plazo de anulacion vencido")));

    let receipt = issuer.invalidate(id, motive()).await.unwrap();
    assert_eq!(receipt.status, DocumentStatus::Processed);
    assert!(receipt.message.unwrap().contains("Plazo de anulacion vencido"));
    assert_document_status(&env.store, id, DocumentStatus::Processed);
}

#[tokio::test]
async fn test_invalidate_unknown_document() {
    let env = TestEnv::new();
    let err = env
        .issuer()
        .invalidate(uuid::Uuid::new_v4(), motive())
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::DocumentNotFound(_)));
}
