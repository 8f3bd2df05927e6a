//! HTTP client for the signing service

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::error::ClientError;
use crate::storage::{HealthStatus, Signer};
use crate::traits::{SigningClient, SigningCredentials};

/// Envelope status for a successful signature
const SIGNER_OK: &str = "OK";

#[derive(Serialize)]
struct SignRequest<'a> {
    nit: &'a str,
    activo: bool,
    #[serde(rename = "passwordPri")]
    password_pri: &'a str,
    #[serde(rename = "dteJson")]
    dte_json: &'a Value,
}

#[derive(Deserialize)]
struct SignerEnvelope {
    status: String,
    #[serde(default)]
    body: Value,
}

/// Signing client over HTTP
pub struct HttpSigningClient {
    client: reqwest::Client,
    timeout: Duration,
    health_timeout: Duration,
}

impl HttpSigningClient {
    /// Create a client with separate budgets for signing and health probes
    pub fn new(timeout_secs: u64, health_timeout_secs: u64) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;

        Ok(Self {
            client,
            timeout: Duration::from_secs(timeout_secs),
            health_timeout: Duration::from_secs(health_timeout_secs),
        })
    }

    fn status_url(signer: &Signer) -> String {
        format!("{}/status", signer.endpoint_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl SigningClient for HttpSigningClient {
    async fn sign(
        &self,
        credentials: &SigningCredentials,
        document: &Value,
        signer: &Signer,
    ) -> Result<String, ClientError> {
        tracing::debug!(signer = %signer.name, tax_id = %credentials.tax_id, "Requesting signature");

        let request = SignRequest {
            nit: &credentials.tax_id,
            activo: true,
            password_pri: &credentials.private_key_password,
            dte_json: document,
        };

        let response = self
            .client
            .post(&signer.endpoint_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ClientError::from_reqwest(e, self.timeout.as_secs()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: SignerEnvelope = response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(format!("malformed signer response: {}", e)))?;

        if envelope.status != SIGNER_OK {
            return Err(ClientError::InvalidResponse(format!(
                "signer answered {}: {}",
                envelope.status, envelope.body
            )));
        }

        match envelope.body {
            Value::String(token) if !token.is_empty() => Ok(token),
            other => Err(ClientError::InvalidResponse(format!(
                "signer returned no token: {}",
                other
            ))),
        }
    }

    async fn probe(&self, signer: &Signer) -> HealthStatus {
        let result = self
            .client
            .get(Self::status_url(signer))
            .timeout(self.health_timeout)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => HealthStatus::Healthy,
            Ok(response) => {
                tracing::debug!(signer = %signer.name, status = %response.status(), "Signer status check failed");
                HealthStatus::Unhealthy
            }
            Err(e) if e.is_timeout() => HealthStatus::Timeout,
            Err(e) => {
                tracing::debug!(signer = %signer.name, error = %e, "Signer unreachable");
                HealthStatus::Error
            }
        }
    }
}
