//! Signer pool manager
//!
//! Chooses a healthy, least-loaded signer for a taxpayer, honoring the
//! taxpayer's assignments, and accounts for the load it places on it.

mod lease;
pub mod selector;

use std::sync::Arc;

use crate::error::{ServerError, ServerResult};
use crate::storage::{Signer, SqliteStore};

pub use lease::SignerLease;

/// Attempts before giving up when concurrent acquirers keep taking the last slot
const DEFAULT_ACQUIRE_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct SignerPool {
    store: Arc<SqliteStore>,
    acquire_attempts: usize,
}

impl SignerPool {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self {
            store,
            acquire_attempts: DEFAULT_ACQUIRE_ATTEMPTS,
        }
    }

    /// Pick a signer without taking load
    ///
    /// The shared pool is used only when none of the taxpayer's assigned signers
    /// is active and healthy; assigned signers that are merely full give `None`.
    pub fn select_signer(&self, taxpayer_id: &str) -> ServerResult<Option<Signer>> {
        let candidates = self.store.assigned_available_signers(taxpayer_id)?;
        if !candidates.is_empty() {
            return Ok(selector::select_assigned(&candidates).cloned());
        }

        let pool = self.store.available_signers()?;
        Ok(selector::select_from_pool(&pool).cloned())
    }

    /// Pick a signer and take one unit of its load
    pub fn acquire(&self, taxpayer_id: &str) -> ServerResult<SignerLease> {
        for attempt in 1..=self.acquire_attempts {
            let signer = self
                .select_signer(taxpayer_id)?
                .ok_or_else(|| ServerError::NoSignerAvailable(taxpayer_id.to_string()))?;

            if self.store.try_increment_load(signer.id)? {
                tracing::debug!(
                    tax_id = %taxpayer_id,
                    signer = %signer.name,
                    load = signer.current_load + 1,
                    "Signer acquired"
                );
                return Ok(SignerLease::new(Arc::clone(&self.store), signer));
            }

            tracing::debug!(
                tax_id = %taxpayer_id,
                signer = %signer.name,
                attempt,
                "Signer filled up concurrently, selecting again"
            );
        }

        Err(ServerError::NoSignerAvailable(taxpayer_id.to_string()))
    }

    /// Allow a taxpayer to use a signer
    pub fn assign(&self, taxpayer_id: &str, signer_id: i64, is_primary: bool) -> ServerResult<()> {
        self.store.assign_signer(taxpayer_id, signer_id, is_primary)
    }
}
