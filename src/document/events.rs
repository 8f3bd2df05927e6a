//! Authority event documents (contingency declaration, invalidation)
//!
//! Both are signed through the signer pool like any other DTE.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::types::{ContingencyReason, DocumentType, Environment};

pub const CONTINGENCY_EVENT_VERSION: u32 = 3;
pub const INVALIDATION_EVENT_VERSION: u32 = 2;

/// The authority works in local time (UTC-6)
const AUTHORITY_UTC_OFFSET_SECS: i32 = -6 * 3600;

fn authority_time(t: DateTime<Utc>) -> DateTime<FixedOffset> {
    let offset = FixedOffset::east_opt(AUTHORITY_UTC_OFFSET_SECS).unwrap_or_else(|| Utc.fix());
    t.with_timezone(&offset)
}

fn date(t: DateTime<Utc>) -> String {
    authority_time(t).format("%Y-%m-%d").to_string()
}

fn time(t: DateTime<Utc>) -> String {
    authority_time(t).format("%H:%M:%S").to_string()
}

/// Issuer fields repeated in every event
#[derive(Debug, Clone)]
pub struct Issuer {
    pub tax_id: String,
    pub name: String,
}

/// Document covered by a contingency event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffectedDocument {
    pub document_id: Uuid,
    pub document_type: DocumentType,
}

/// Declaration that the issuer was offline between two instants
#[derive(Debug, Clone)]
pub struct ContingencyEvent {
    pub event_id: Uuid,
    pub environment: Environment,
    pub issuer: Issuer,
    pub affected: Vec<AffectedDocument>,
    pub outage_start: DateTime<Utc>,
    pub outage_end: DateTime<Utc>,
    pub reason: ContingencyReason,
    pub transmitted_at: DateTime<Utc>,
}

impl ContingencyEvent {
    pub fn to_value(&self) -> Value {
        let details: Vec<Value> = self
            .affected
            .iter()
            .enumerate()
            .map(|(i, doc)| {
                json!({
                    "noItem": i + 1,
                    "codigoGeneracion": doc.document_id.to_string().to_uppercase(),
                    "tipoDoc": doc.document_type.code(),
                })
            })
            .collect();

        // Free text is only accepted for type 5 ("other")
        let reason_text = if self.reason.code == 5 {
            Value::String(self.reason.text.clone())
        } else {
            Value::Null
        };

        json!({
            "identificacion": {
                "version": CONTINGENCY_EVENT_VERSION,
                "ambiente": self.environment.code(),
                "codigoGeneracion": self.event_id.to_string().to_uppercase(),
                "fTransmision": date(self.transmitted_at),
                "hTransmision": time(self.transmitted_at),
            },
            "emisor": {
                "nit": self.issuer.tax_id,
                "nombre": self.issuer.name,
            },
            "detalleDTE": details,
            "motivo": {
                "fInicio": date(self.outage_start),
                "fFin": date(self.outage_end),
                "hInicio": time(self.outage_start),
                "hFin": time(self.outage_end),
                "tipoContingencia": self.reason.code,
                "motivoContingencia": reason_text,
            }
        })
    }
}

/// Reference to the processed document being invalidated
#[derive(Debug, Clone)]
pub struct InvalidatedDocument {
    pub document_id: Uuid,
    pub document_type: DocumentType,
    pub control_number: String,
    pub reception_stamp: String,
    pub issue_date: Option<String>,
}

/// Request to void a document the authority already accepted
#[derive(Debug, Clone)]
pub struct InvalidationEvent {
    pub event_id: Uuid,
    pub environment: Environment,
    pub issuer: Issuer,
    pub document: InvalidatedDocument,
    /// `motivo` section as assembled by the caller (type, responsible party, ...)
    pub motive: Map<String, Value>,
    pub requested_at: DateTime<Utc>,
}

impl InvalidationEvent {
    pub fn to_value(&self) -> Value {
        json!({
            "identificacion": {
                "version": INVALIDATION_EVENT_VERSION,
                "ambiente": self.environment.code(),
                "codigoGeneracion": self.event_id.to_string().to_uppercase(),
                "fecAnula": date(self.requested_at),
                "horAnula": time(self.requested_at),
            },
            "emisor": {
                "nit": self.issuer.tax_id,
                "nombre": self.issuer.name,
            },
            "documento": {
                "tipoDte": self.document.document_type.code(),
                "codigoGeneracion": self.document.document_id.to_string().to_uppercase(),
                "selloRecibido": self.document.reception_stamp,
                "numeroControl": self.document.control_number,
                "fecEmi": self.document.issue_date,
            },
            "motivo": Value::Object(self.motive.clone()),
        })
    }
}
