//! Control number allocation
//!
//! Every document-creation path goes through [`ControlNumberService`], which is
//! backed by the persistent per-scope sequence table.

use std::sync::Arc;

use super::types::DocumentType;
use crate::error::{ServerError, ServerResult};
use crate::storage::SqliteStore;

/// Largest sequence that fits the 11-digit sequence field
pub const MAX_SEQUENCE: u64 = 99_999_999_999;

/// Scope of one control-number sequence
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ControlNumberScope {
    pub taxpayer_id: String,
    pub document_type: DocumentType,
    /// Four-character establishment code (e.g. `M001`)
    pub establishment: String,
    /// Four-character point-of-sale code (e.g. `P001`)
    pub point_of_sale: String,
    pub year: i32,
}

impl ControlNumberScope {
    pub fn validate(&self) -> ServerResult<()> {
        if self.taxpayer_id.trim().is_empty() {
            return Err(ServerError::InvalidArgument("taxpayer id is empty".into()));
        }
        for (name, code) in [
            ("establishment", &self.establishment),
            ("point of sale", &self.point_of_sale),
        ] {
            if code.len() != 4 || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(ServerError::InvalidArgument(format!(
                    "{} code must be 4 alphanumeric characters, got {:?}",
                    name, code
                )));
            }
        }
        if !(1000..=9999).contains(&self.year) {
            return Err(ServerError::InvalidArgument(format!(
                "invalid year {}",
                self.year
            )));
        }
        Ok(())
    }

    /// Render `DTE-{type}-{establishment}{pos}-{year}{sequence:011}`
    pub fn format(&self, sequence: u64) -> ServerResult<String> {
        if sequence == 0 || sequence > MAX_SEQUENCE {
            return Err(ServerError::Internal(format!(
                "control number sequence {} out of range",
                sequence
            )));
        }
        Ok(format!(
            "DTE-{}-{}{}-{}{:011}",
            self.document_type.code(),
            self.establishment.to_ascii_uppercase(),
            self.point_of_sale.to_ascii_uppercase(),
            self.year,
            sequence
        ))
    }
}

/// Single authoritative control-number source
#[derive(Clone)]
pub struct ControlNumberService {
    store: Arc<SqliteStore>,
}

impl ControlNumberService {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }

    /// Allocate the next control number for the scope
    pub fn next(&self, scope: &ControlNumberScope) -> ServerResult<String> {
        scope.validate()?;
        let sequence = self.store.next_control_sequence(scope)?;
        scope.format(sequence)
    }
}
