// File: src/storage/sqlite/sequences.rs

use super::store::{now_nanos, SqliteStore};
use crate::document::control_number::{ControlNumberScope, MAX_SEQUENCE};
use crate::error::{ServerError, ServerResult};
use rusqlite::{params, OptionalExtension};

impl SqliteStore {
    /// Allocate the next value of a control-number sequence
    ///
    /// The sequence row is created on first use for the scope's year; values
    /// start at 1 and are never handed out twice, even if the caller later fails.
    pub fn next_control_sequence(&self, scope: &ControlNumberScope) -> ServerResult<u64> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let establishment = scope.establishment.to_ascii_uppercase();
        let point_of_sale = scope.point_of_sale.to_ascii_uppercase();

        let current: Option<i64> = tx
            .query_row(
                "SELECT next_value FROM control_number_sequences
                 WHERE taxpayer_id = ?1 AND document_type = ?2 AND establishment = ?3
                   AND point_of_sale = ?4 AND year = ?5",
                params![
                    scope.taxpayer_id,
                    scope.document_type.code(),
                    establishment,
                    point_of_sale,
                    scope.year,
                ],
                |row| row.get(0),
            )
            .optional()?;

        let value = current.unwrap_or(1);
        if value < 1 || value as u64 > MAX_SEQUENCE {
            return Err(ServerError::Internal(format!(
                "control number sequence exhausted for {} {} in {}",
                scope.taxpayer_id, scope.document_type, scope.year
            )));
        }

        tx.execute(
            "INSERT INTO control_number_sequences
                 (taxpayer_id, document_type, establishment, point_of_sale, year, next_value, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(taxpayer_id, document_type, establishment, point_of_sale, year)
             DO UPDATE SET next_value = excluded.next_value, updated_at = excluded.updated_at",
            params![
                scope.taxpayer_id,
                scope.document_type.code(),
                establishment,
                point_of_sale,
                scope.year,
                value + 1,
                now_nanos(),
            ],
        )?;

        tx.commit()?;
        Ok(value as u64)
    }
}
