//! Structured document body
//!
//! Only the identification block is typed; every other section is kept as
//! schema-agnostic JSON because its shape depends on the document type.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::types::{ContingencyReason, DocumentType, Environment};
use crate::error::{ServerError, ServerResult};

/// Transmission model: 1 = prior (normal), 2 = deferred (contingency)
pub const MODEL_NORMAL: u8 = 1;
pub const MODEL_DEFERRED: u8 = 2;

/// Operation type: 1 = normal transmission, 2 = transmission under contingency
pub const OPERATION_NORMAL: u8 = 1;
pub const OPERATION_CONTINGENCY: u8 = 2;

/// Key under which the authority's reception stamp is kept in the stored body
pub const RECEPTION_STAMP_KEY: &str = "selloRecibido";

fn normal_flag() -> u8 {
    1
}

/// `identificacion` block of a DTE
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identification {
    pub version: u32,

    #[serde(rename = "ambiente")]
    pub environment: Environment,

    #[serde(rename = "tipoDte")]
    pub document_type: DocumentType,

    #[serde(rename = "numeroControl", default)]
    pub control_number: Option<String>,

    #[serde(rename = "codigoGeneracion")]
    pub generation_code: String,

    #[serde(rename = "tipoModelo", default = "normal_flag")]
    pub model_type: u8,

    #[serde(rename = "tipoOperacion", default = "normal_flag")]
    pub operation_type: u8,

    #[serde(rename = "tipoContingencia", default)]
    pub contingency_type: Option<u8>,

    #[serde(rename = "motivoContin", default)]
    pub contingency_reason: Option<String>,

    /// Remaining identification fields (issue date/time, currency, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A DTE body before signing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentBody {
    #[serde(rename = "identificacion")]
    pub identification: Identification,

    #[serde(flatten)]
    pub sections: Map<String, Value>,
}

impl DocumentBody {
    pub fn from_value(value: Value) -> ServerResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| ServerError::InvalidArgument(format!("malformed document body: {}", e)))
    }

    pub fn from_json(json: &str) -> ServerResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| ServerError::InvalidArgument(format!("malformed document body: {}", e)))
    }

    pub fn to_value(&self) -> ServerResult<Value> {
        serde_json::to_value(self).map_err(|e| ServerError::Internal(e.to_string()))
    }

    pub fn to_json(&self) -> ServerResult<String> {
        serde_json::to_string(self).map_err(|e| ServerError::Internal(e.to_string()))
    }

    pub fn set_control_number(&mut self, control_number: &str) {
        self.identification.control_number = Some(control_number.to_string());
    }

    /// Flags for a document transmitted right after signing
    pub fn mark_normal_operation(&mut self) {
        let id = &mut self.identification;
        id.model_type = MODEL_NORMAL;
        id.operation_type = OPERATION_NORMAL;
        id.contingency_type = None;
        id.contingency_reason = None;
    }

    /// Flags for a document re-signed for retransmission under contingency
    pub fn mark_contingency(&mut self, reason: &ContingencyReason) {
        let id = &mut self.identification;
        id.model_type = MODEL_DEFERRED;
        id.operation_type = OPERATION_CONTINGENCY;
        id.contingency_type = Some(reason.code);
        id.contingency_reason = Some(reason.text.clone());
    }

    pub fn is_contingency(&self) -> bool {
        self.identification.operation_type == OPERATION_CONTINGENCY
    }

    pub fn set_reception_stamp(&mut self, stamp: &str) {
        self.sections
            .insert(RECEPTION_STAMP_KEY.to_string(), Value::String(stamp.to_string()));
    }

    pub fn reception_stamp(&self) -> Option<&str> {
        self.sections.get(RECEPTION_STAMP_KEY).and_then(Value::as_str)
    }

    /// Issue date (`fecEmi`) as written by the document builder
    pub fn issue_date(&self) -> Option<&str> {
        self.identification.extra.get("fecEmi").and_then(Value::as_str)
    }
}
