//! HTTP client for the tax authority reception API

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::config::AuthorityConfig;
use super::token::TokenCache;
use super::wire::{
    AuthBody, AuthEnvelope, AuthForm, BatchRequest, BatchResponse, ContingencyRequest,
    InvalidationRequest, PollResponse, ReceptionResponse, SingleRequest, AUTH_OK, STATE_RECEIVED,
};
use crate::clients::error::ClientError;
use crate::document::events::INVALIDATION_EVENT_VERSION;
use crate::document::Environment;
use crate::traits::{
    AuthorityClient, AuthorityCredentials, BatchOutcome, BatchSubmission, SingleSubmission,
    TransmissionResult,
};

/// Authority client over HTTP with a per-taxpayer token cache
pub struct HttpAuthorityClient {
    client: reqwest::Client,
    config: AuthorityConfig,
    tokens: TokenCache,
    next_submission_id: AtomicU64,
}

impl HttpAuthorityClient {
    pub fn new(config: AuthorityConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;

        let tokens = TokenCache::new(
            Duration::from_secs(config.token_ttl_secs),
            Duration::from_secs(config.token_refresh_margin_secs),
        );

        Ok(Self {
            client,
            config,
            tokens,
            next_submission_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &AuthorityConfig {
        &self.config
    }

    fn submission_id(&self) -> u64 {
        self.next_submission_id.fetch_add(1, Ordering::Relaxed)
    }

    fn transport_error(&self, e: reqwest::Error) -> ClientError {
        ClientError::from_reqwest(e, self.config.timeout_secs)
    }

    /// Authenticated POST; returns status and body text for any HTTP response
    async fn post_authorized<T: Serialize + ?Sized>(
        &self,
        credentials: &AuthorityCredentials,
        path: &str,
        body: &T,
    ) -> Result<(StatusCode, String), ClientError> {
        let token = self.authenticate(credentials).await?;
        let url = self.config.url(path);

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, token)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        self.read_response(credentials, response).await
    }

    async fn get_authorized(
        &self,
        credentials: &AuthorityCredentials,
        url: &str,
    ) -> Result<(StatusCode, String), ClientError> {
        let token = self.authenticate(credentials).await?;

        let response = self
            .client
            .get(url)
            .header(reqwest::header::AUTHORIZATION, token)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        self.read_response(credentials, response).await
    }

    async fn read_response(
        &self,
        credentials: &AuthorityCredentials,
        response: reqwest::Response,
    ) -> Result<(StatusCode, String), ClientError> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.tokens.evict(&credentials.user);
        }
        let text = response.text().await.map_err(|e| self.transport_error(e))?;
        Ok((status, text))
    }

    /// Structured result for any HTTP answer to a reception-style call
    fn reception_result(status: StatusCode, body: String) -> TransmissionResult {
        match ReceptionResponse::parse(&body) {
            Some(envelope) => envelope.into_result(body),
            None if status.is_success() => TransmissionResult {
                success: false,
                response_code: Some(status.as_u16().to_string()),
                error: Some("invalid response: missing authority envelope".to_string()),
                raw_response: Some(body),
                ..Default::default()
            },
            None => TransmissionResult::http_failure(status.as_u16(), body),
        }
    }
}

#[async_trait]
impl AuthorityClient for HttpAuthorityClient {
    async fn authenticate(&self, credentials: &AuthorityCredentials) -> Result<String, ClientError> {
        if let Some(token) = self.tokens.get(&credentials.user) {
            return Ok(token);
        }

        tracing::debug!(tax_id = %credentials.user, "Authenticating with tax authority");

        let response = self
            .client
            .post(self.config.url(&self.config.auth_path))
            .form(&AuthForm {
                user: &credentials.user,
                pwd: &credentials.password,
            })
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        if status.is_server_error() {
            return Err(ClientError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }
        if !status.is_success() {
            return Err(ClientError::AuthFailed(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        let envelope: AuthEnvelope = serde_json::from_str(&body)
            .map_err(|e| ClientError::InvalidResponse(format!("malformed auth response: {}", e)))?;
        if envelope.status != AUTH_OK {
            return Err(ClientError::AuthFailed(format!(
                "authority answered {}: {}",
                envelope.status, envelope.body
            )));
        }
        let auth: AuthBody = serde_json::from_value(envelope.body)
            .map_err(|e| ClientError::InvalidResponse(format!("auth response without token: {}", e)))?;

        let token = auth.authorization();
        self.tokens.insert(&credentials.user, token.clone());
        tracing::info!(tax_id = %credentials.user, "Authenticated with tax authority");

        Ok(token)
    }

    async fn transmit_single(
        &self,
        credentials: &AuthorityCredentials,
        submission: &SingleSubmission,
    ) -> Result<TransmissionResult, ClientError> {
        let request = SingleRequest {
            ambiente: submission.environment.code(),
            id_envio: self.submission_id(),
            version: submission.schema_version,
            tipo_dte: submission.document_type.code(),
            documento: &submission.signed_token,
            codigo_generacion: submission.document_id.to_string().to_uppercase(),
        };

        let (status, body) = self
            .post_authorized(credentials, &self.config.reception_path, &request)
            .await?;

        let result = Self::reception_result(status, body);
        tracing::debug!(
            document_id = %submission.document_id,
            http_status = status.as_u16(),
            success = result.success,
            "Single submission answered"
        );
        Ok(result)
    }

    async fn transmit_contingency_event(
        &self,
        credentials: &AuthorityCredentials,
        signed_event: &str,
    ) -> Result<bool, ClientError> {
        let request = ContingencyRequest {
            nit: &credentials.user,
            documento: signed_event,
        };

        let (status, body) = self
            .post_authorized(credentials, &self.config.contingency_path, &request)
            .await?;

        match ReceptionResponse::parse(&body) {
            Some(envelope) => {
                let received = envelope
                    .estado
                    .as_deref()
                    .map(|s| s.eq_ignore_ascii_case(STATE_RECEIVED))
                    .unwrap_or(false);
                if !received {
                    tracing::warn!(
                        tax_id = %credentials.user,
                        estado = ?envelope.estado,
                        message = ?envelope.descripcion_msg,
                        observations = ?envelope.observaciones,
                        "Contingency event not received"
                    );
                }
                Ok(received)
            }
            None if status.is_success() => Err(ClientError::InvalidResponse(
                "contingency response without estado".into(),
            )),
            None => Err(ClientError::HttpStatus {
                status: status.as_u16(),
                body,
            }),
        }
    }

    async fn transmit_batch(
        &self,
        credentials: &AuthorityCredentials,
        submission: &BatchSubmission,
    ) -> Result<Option<String>, ClientError> {
        let request = BatchRequest {
            ambiente: submission.environment.code(),
            id_envio: submission.batch_id.to_string().to_uppercase(),
            version: submission.schema_version,
            nit_emisor: &credentials.user,
            documentos: &submission.signed_tokens,
        };

        let (status, body) = self
            .post_authorized(credentials, &self.config.batch_path, &request)
            .await?;

        if !status.is_success() && serde_json::from_str::<BatchResponse>(&body).is_err() {
            return Err(ClientError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let response: BatchResponse = serde_json::from_str(&body)
            .map_err(|e| ClientError::InvalidResponse(format!("malformed batch response: {}", e)))?;

        match response.codigo_lote {
            Some(code) if !code.is_empty() => Ok(Some(code)),
            _ => {
                tracing::warn!(
                    batch_id = %submission.batch_id,
                    http_status = status.as_u16(),
                    estado = ?response.estado,
                    message = ?response.descripcion_msg,
                    "Batch not accepted"
                );
                Ok(None)
            }
        }
    }

    async fn poll_batch(
        &self,
        credentials: &AuthorityCredentials,
        authority_batch_id: &str,
    ) -> Result<BatchOutcome, ClientError> {
        let url = format!(
            "{}{}",
            self.config.url(&self.config.batch_poll_path),
            authority_batch_id
        );

        let (status, body) = self.get_authorized(credentials, &url).await?;

        // Batch not registered yet on the authority side
        if status == StatusCode::NOT_FOUND {
            return Ok(BatchOutcome::default());
        }
        if !status.is_success() {
            return Err(ClientError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let response: PollResponse = serde_json::from_str(&body)
            .map_err(|e| ClientError::InvalidResponse(format!("malformed poll response: {}", e)))?;
        Ok(response.into_outcome())
    }

    async fn transmit_invalidation(
        &self,
        credentials: &AuthorityCredentials,
        environment: Environment,
        signed_event: &str,
    ) -> Result<TransmissionResult, ClientError> {
        let request = InvalidationRequest {
            ambiente: environment.code(),
            id_envio: self.submission_id(),
            version: INVALIDATION_EVENT_VERSION,
            documento: signed_event,
        };

        let (status, body) = self
            .post_authorized(credentials, &self.config.invalidation_path, &request)
            .await?;

        Ok(Self::reception_result(status, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentType;
    use mockito::{Matcher, Server};
    use serde_json::json;
    use uuid::Uuid;

    const AUTH_OK_BODY: &str =
        r#"{"status":"OK","body":{"user":"06140101011011","token":"Bearer tok-1","tokenType":"Bearer"}}"#;

    fn credentials() -> AuthorityCredentials {
        AuthorityCredentials {
            user: "06140101011011".into(),
            password: "clave-mh".into(),
        }
    }

    fn client(server: &Server) -> HttpAuthorityClient {
        HttpAuthorityClient::new(AuthorityConfig::for_base_url(server.url())).unwrap()
    }

    fn submission() -> SingleSubmission {
        SingleSubmission {
            document_id: Uuid::new_v4(),
            environment: Environment::Test,
            document_type: DocumentType::Invoice,
            schema_version: 1,
            signed_token: "eyJ.signed".into(),
        }
    }

    #[tokio::test]
    async fn test_authenticate_caches_token() {
        let mut server = Server::new_async().await;
        let auth = server
            .mock("POST", "/seguridad/auth")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("user".into(), "06140101011011".into()),
                Matcher::UrlEncoded("pwd".into(), "clave-mh".into()),
            ]))
            .with_status(200)
            .with_body(AUTH_OK_BODY)
            .expect(1)
            .create_async()
            .await;

        let client = client(&server);
        assert_eq!(client.authenticate(&credentials()).await.unwrap(), "Bearer tok-1");
        assert_eq!(client.authenticate(&credentials()).await.unwrap(), "Bearer tok-1");
        auth.assert_async().await;
    }

    #[tokio::test]
    async fn test_authenticate_rejected() {
        let mut server = Server::new_async().await;
        let _auth = server
            .mock("POST", "/seguridad/auth")
            .with_status(200)
            .with_body(r#"{"status":"ERROR","body":{"codigo":"401","descripcionMsg":"Usuario no valido"}}"#)
            .create_async()
            .await;

        let result = client(&server).authenticate(&credentials()).await;
        assert!(matches!(result, Err(ClientError::AuthFailed(_))));
    }

    #[tokio::test]
    async fn test_transmit_single_processed() {
        let mut server = Server::new_async().await;
        let _auth = server
            .mock("POST", "/seguridad/auth")
            .with_status(200)
            .with_body(AUTH_OK_BODY)
            .create_async()
            .await;
        let sub = submission();
        let reception = server
            .mock("POST", "/fesv/recepciondte")
            .match_header("authorization", "Bearer tok-1")
            .match_body(Matcher::PartialJson(json!({
                "ambiente": "00",
                "version": 1,
                "tipoDte": "01",
                "documento": "eyJ.signed",
                "codigoGeneracion": sub.document_id.to_string().to_uppercase(),
            })))
            .with_status(200)
            .with_body(r#"{"estado":"PROCESADO","selloRecibido":"SELLO-1","codigoMsg":"001","descripcionMsg":"RECIBIDO","observaciones":[]}"#)
            .create_async()
            .await;

        let result = client(&server)
            .transmit_single(&credentials(), &sub)
            .await
            .unwrap();

        reception.assert_async().await;
        assert!(result.success);
        assert_eq!(result.reception_stamp.as_deref(), Some("SELLO-1"));
    }

    #[tokio::test]
    async fn test_transmit_single_rejection_on_400_is_structured() {
        let mut server = Server::new_async().await;
        let _auth = server
            .mock("POST", "/seguridad/auth")
            .with_status(200)
            .with_body(AUTH_OK_BODY)
            .create_async()
            .await;
        let _reception = server
            .mock("POST", "/fesv/recepciondte")
            .with_status(400)
            .with_body(r#"{"estado":"RECHAZADO","codigoMsg":"096","descripcionMsg":"NUMERO DE CONTROL YA EXISTE","observaciones":[]}"#)
            .create_async()
            .await;

        let result = client(&server)
            .transmit_single(&credentials(), &submission())
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.status.as_deref(), Some("RECHAZADO"));
        assert_eq!(result.response_code.as_deref(), Some("096"));
    }

    #[tokio::test]
    async fn test_transmit_single_gateway_error_without_envelope() {
        let mut server = Server::new_async().await;
        let _auth = server
            .mock("POST", "/seguridad/auth")
            .with_status(200)
            .with_body(AUTH_OK_BODY)
            .create_async()
            .await;
        let _reception = server
            .mock("POST", "/fesv/recepciondte")
            .with_status(503)
            .with_body("Service Unavailable")
            .create_async()
            .await;

        let result = client(&server)
            .transmit_single(&credentials(), &submission())
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.response_code.as_deref(), Some("503"));
        assert_eq!(result.error.as_deref(), Some("HTTP error 503"));
    }

    #[tokio::test]
    async fn test_unauthorized_evicts_token() {
        let mut server = Server::new_async().await;
        let auth = server
            .mock("POST", "/seguridad/auth")
            .with_status(200)
            .with_body(AUTH_OK_BODY)
            .expect(2)
            .create_async()
            .await;
        let _reception = server
            .mock("POST", "/fesv/recepciondte")
            .with_status(401)
            .create_async()
            .await;

        let client = client(&server);
        let first = client.transmit_single(&credentials(), &submission()).await.unwrap();
        assert_eq!(first.response_code.as_deref(), Some("401"));
        client.transmit_single(&credentials(), &submission()).await.unwrap();

        auth.assert_async().await;
    }

    #[tokio::test]
    async fn test_contingency_event() {
        let mut server = Server::new_async().await;
        let _auth = server
            .mock("POST", "/seguridad/auth")
            .with_status(200)
            .with_body(AUTH_OK_BODY)
            .create_async()
            .await;
        let event = server
            .mock("POST", "/fesv/contingencia")
            .match_body(Matcher::PartialJson(json!({
                "nit": "06140101011011",
                "documento": "eyJ.event",
            })))
            .with_status(200)
            .with_body(r#"{"estado":"RECIBIDO","fechaHora":"16/10/2026 10:00:00","mensaje":"","selloRecibido":"EV-1","observaciones":[]}"#)
            .create_async()
            .await;

        let received = client(&server)
            .transmit_contingency_event(&credentials(), "eyJ.event")
            .await
            .unwrap();
        event.assert_async().await;
        assert!(received);
    }

    #[tokio::test]
    async fn test_contingency_event_rejected() {
        let mut server = Server::new_async().await;
        let _auth = server
            .mock("POST", "/seguridad/auth")
            .with_status(200)
            .with_body(AUTH_OK_BODY)
            .create_async()
            .await;
        let _event = server
            .mock("POST", "/fesv/contingencia")
            .with_status(400)
            .with_body(r#"{"estado":"RECHAZADO","observaciones":["fecha invalida"]}"#)
            .create_async()
            .await;

        let received = client(&server)
            .transmit_contingency_event(&credentials(), "eyJ.event")
            .await
            .unwrap();
        assert!(!received);
    }

    #[tokio::test]
    async fn test_batch_and_poll() {
        let mut server = Server::new_async().await;
        let _auth = server
            .mock("POST", "/seguridad/auth")
            .with_status(200)
            .with_body(AUTH_OK_BODY)
            .create_async()
            .await;
        let batch_id = Uuid::new_v4();
        let _batch = server
            .mock("POST", "/fesv/recepcionlote/")
            .match_body(Matcher::PartialJson(json!({
                "idEnvio": batch_id.to_string().to_uppercase(),
                "nitEmisor": "06140101011011",
                "version": 3,
                "documentos": ["t1", "t2"],
            })))
            .with_status(200)
            .with_body(r#"{"estado":"RECIBIDO","codigoLote":"LOTE-77","descripcionMsg":"Lote recibido"}"#)
            .create_async()
            .await;
        let doc = Uuid::new_v4();
        let _poll = server
            .mock("GET", "/fesv/recepcion/consultadtelote/LOTE-77")
            .with_status(200)
            .with_body(format!(
                r#"{{"procesados":[{{"codigoGeneracion":"{}","selloRecibido":"S-1"}}],"rechazados":[]}}"#,
                doc.to_string().to_uppercase()
            ))
            .create_async()
            .await;

        let client = client(&server);
        let code = client
            .transmit_batch(
                &credentials(),
                &BatchSubmission {
                    batch_id,
                    environment: Environment::Test,
                    document_type: DocumentType::TaxCreditInvoice,
                    schema_version: 3,
                    signed_tokens: vec!["t1".into(), "t2".into()],
                },
            )
            .await
            .unwrap();
        assert_eq!(code.as_deref(), Some("LOTE-77"));

        let outcome = client.poll_batch(&credentials(), "LOTE-77").await.unwrap();
        assert_eq!(outcome.processed.len(), 1);
        assert_eq!(outcome.processed[0].document_id, doc);
        assert!(outcome.rejected.is_empty());
    }

    #[tokio::test]
    async fn test_poll_not_found_is_empty() {
        let mut server = Server::new_async().await;
        let _auth = server
            .mock("POST", "/seguridad/auth")
            .with_status(200)
            .with_body(AUTH_OK_BODY)
            .create_async()
            .await;
        let _poll = server
            .mock("GET", "/fesv/recepcion/consultadtelote/LOTE-1")
            .with_status(404)
            .create_async()
            .await;

        let outcome = client(&server).poll_batch(&credentials(), "LOTE-1").await.unwrap();
        assert!(outcome.is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_is_error() {
        let mut config = AuthorityConfig::for_base_url("http://invalid.local:9999");
        config.timeout_secs = 1;
        let client = HttpAuthorityClient::new(config).unwrap();
        let result = client.transmit_single(&credentials(), &submission()).await;
        assert!(matches!(
            result,
            Err(ClientError::Network(_)) | Err(ClientError::Timeout(_))
        ));
    }
}
