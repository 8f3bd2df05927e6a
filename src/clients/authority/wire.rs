//! Request and response bodies of the authority API

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::traits::{BatchOutcome, ProcessedDocument, RejectedDocument, TransmissionResult};

/// Authority state for an accepted document
pub const STATE_PROCESSED: &str = "PROCESADO";
/// Authority state for a received contingency event
pub const STATE_RECEIVED: &str = "RECIBIDO";
/// Auth envelope status on success
pub const AUTH_OK: &str = "OK";

#[derive(Serialize)]
pub struct AuthForm<'a> {
    pub user: &'a str,
    pub pwd: &'a str,
}

#[derive(Deserialize)]
pub struct AuthEnvelope {
    pub status: String,
    #[serde(default)]
    pub body: serde_json::Value,
}

#[derive(Deserialize)]
pub struct AuthBody {
    pub token: String,
    #[serde(rename = "tokenType", default)]
    pub token_type: Option<String>,
}

impl AuthBody {
    /// Value for the Authorization header
    pub fn authorization(&self) -> String {
        if self.token.starts_with("Bearer ") {
            self.token.clone()
        } else {
            format!(
                "{} {}",
                self.token_type.as_deref().unwrap_or("Bearer"),
                self.token
            )
        }
    }
}

#[derive(Serialize)]
pub struct SingleRequest<'a> {
    pub ambiente: &'a str,
    #[serde(rename = "idEnvio")]
    pub id_envio: u64,
    pub version: u32,
    #[serde(rename = "tipoDte")]
    pub tipo_dte: &'a str,
    pub documento: &'a str,
    #[serde(rename = "codigoGeneracion")]
    pub codigo_generacion: String,
}

#[derive(Serialize)]
pub struct ContingencyRequest<'a> {
    pub nit: &'a str,
    pub documento: &'a str,
}

#[derive(Serialize)]
pub struct BatchRequest<'a> {
    pub ambiente: &'a str,
    #[serde(rename = "idEnvio")]
    pub id_envio: String,
    pub version: u32,
    #[serde(rename = "nitEmisor")]
    pub nit_emisor: &'a str,
    pub documentos: &'a [String],
}

#[derive(Serialize)]
pub struct InvalidationRequest<'a> {
    pub ambiente: &'a str,
    #[serde(rename = "idEnvio")]
    pub id_envio: u64,
    pub version: u32,
    pub documento: &'a str,
}

/// Answer to single submissions, invalidations and contingency events
#[derive(Debug, Deserialize)]
pub struct ReceptionResponse {
    pub estado: Option<String>,
    #[serde(rename = "selloRecibido", default)]
    pub sello_recibido: Option<String>,
    #[serde(rename = "codigoMsg", default)]
    pub codigo_msg: Option<String>,
    #[serde(rename = "descripcionMsg", default)]
    pub descripcion_msg: Option<String>,
    #[serde(default)]
    pub observaciones: Option<Vec<String>>,
}

impl ReceptionResponse {
    /// Parse a body that carries the authority envelope (an `estado` field)
    pub fn parse(body: &str) -> Option<Self> {
        serde_json::from_str::<Self>(body)
            .ok()
            .filter(|r| r.estado.is_some())
    }

    pub fn into_result(self, raw: String) -> TransmissionResult {
        let success = self
            .estado
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case(STATE_PROCESSED))
            .unwrap_or(false);

        TransmissionResult {
            success,
            status: self.estado,
            reception_stamp: self.sello_recibido,
            response_code: self.codigo_msg,
            error: if success {
                None
            } else {
                self.descripcion_msg.clone()
            },
            message: self.descripcion_msg,
            error_details: self.observaciones.unwrap_or_default(),
            raw_response: Some(raw),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BatchResponse {
    #[serde(rename = "codigoLote", default)]
    pub codigo_lote: Option<String>,
    #[serde(default)]
    pub estado: Option<String>,
    #[serde(rename = "descripcionMsg", default)]
    pub descripcion_msg: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PolledDocument {
    #[serde(rename = "codigoGeneracion")]
    pub codigo_generacion: String,
    #[serde(rename = "selloRecibido", default)]
    pub sello_recibido: Option<String>,
    #[serde(rename = "descripcionMsg", default)]
    pub descripcion_msg: Option<String>,
    #[serde(default)]
    pub observaciones: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PollResponse {
    #[serde(default)]
    pub procesados: Vec<PolledDocument>,
    #[serde(default)]
    pub rechazados: Vec<PolledDocument>,
}

fn parse_generation_code(code: &str) -> Option<Uuid> {
    match Uuid::parse_str(code) {
        Ok(id) => Some(id),
        Err(_) => {
            tracing::warn!(generation_code = %code, "Ignoring batch entry with unparseable generation code");
            None
        }
    }
}

impl PollResponse {
    pub fn into_outcome(self) -> BatchOutcome {
        let processed = self
            .procesados
            .into_iter()
            .filter_map(|doc| {
                let document_id = parse_generation_code(&doc.codigo_generacion)?;
                match doc.sello_recibido {
                    Some(stamp) if !stamp.is_empty() => Some(ProcessedDocument {
                        document_id,
                        reception_stamp: stamp,
                    }),
                    _ => {
                        tracing::warn!(document_id = %document_id, "Processed entry without reception stamp");
                        None
                    }
                }
            })
            .collect();

        let rejected = self
            .rechazados
            .into_iter()
            .filter_map(|doc| {
                let document_id = parse_generation_code(&doc.codigo_generacion)?;
                let mut parts: Vec<String> = doc.descripcion_msg.into_iter().collect();
                parts.extend(doc.observaciones.unwrap_or_default());
                let message = if parts.is_empty() {
                    "rechazado por el MH".to_string()
                } else {
                    parts.join("; ")
                };
                Some(RejectedDocument {
                    document_id,
                    message,
                })
            })
            .collect();

        BatchOutcome {
            processed,
            rejected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reception_processed() {
        let raw = r#"{"version":2,"ambiente":"00","estado":"PROCESADO","selloRecibido":"SELLO-1","codigoMsg":"001","descripcionMsg":"RECIBIDO","observaciones":[]}"#;
        let result = ReceptionResponse::parse(raw).unwrap().into_result(raw.into());
        assert!(result.success);
        assert_eq!(result.reception_stamp.as_deref(), Some("SELLO-1"));
        assert_eq!(result.response_code.as_deref(), Some("001"));
        assert!(result.error.is_none());
    }

    #[test]
    fn test_reception_rejected_keeps_observations() {
        let raw = r#"{"estado":"RECHAZADO","selloRecibido":null,"codigoMsg":"004","descripcionMsg":"[identificacion.codigoGeneracion] YA EXISTE","observaciones":["obs 1"]}"#;
        let result = ReceptionResponse::parse(raw).unwrap().into_result(raw.into());
        assert!(!result.success);
        assert_eq!(result.status.as_deref(), Some("RECHAZADO"));
        assert_eq!(result.error_details, vec!["obs 1".to_string()]);
        assert!(result.error.unwrap().contains("YA EXISTE"));
    }

    #[test]
    fn test_body_without_envelope() {
        assert!(ReceptionResponse::parse("<html>Bad Gateway</html>").is_none());
        assert!(ReceptionResponse::parse(r#"{"message":"x"}"#).is_none());
    }

    #[test]
    fn test_auth_header_value() {
        let body = AuthBody {
            token: "Bearer eyJ".into(),
            token_type: Some("Bearer".into()),
        };
        assert_eq!(body.authorization(), "Bearer eyJ");
        let body = AuthBody {
            token: "eyJ".into(),
            token_type: None,
        };
        assert_eq!(body.authorization(), "Bearer eyJ");
    }

    #[test]
    fn test_poll_outcome() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let raw = format!(
            r#"{{"procesados":[{{"codigoGeneracion":"{}","selloRecibido":"S-A"}}],
                "rechazados":[{{"codigoGeneracion":"{}","descripcionMsg":"NIT no existe","observaciones":["ver receptor"]}},
                              {{"codigoGeneracion":"garbage"}}]}}"#,
            a.to_string().to_uppercase(),
            b.to_string().to_uppercase()
        );
        let outcome = serde_json::from_str::<PollResponse>(&raw)
            .unwrap()
            .into_outcome();
        assert_eq!(outcome.processed.len(), 1);
        assert_eq!(outcome.processed[0].document_id, a);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].document_id, b);
        assert_eq!(outcome.rejected[0].message, "NIT no existe; ver receptor");
    }
}
