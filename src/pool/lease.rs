//! Signer load lease

use std::sync::Arc;

use crate::storage::{Signer, SqliteStore};

/// One unit of load held on a signer
///
/// Created only after the load was incremented; dropping it gives the unit
/// back, whatever path the signing attempt took.
pub struct SignerLease {
    store: Arc<SqliteStore>,
    signer: Signer,
}

impl SignerLease {
    pub(crate) fn new(store: Arc<SqliteStore>, signer: Signer) -> Self {
        Self { store, signer }
    }

    pub fn signer(&self) -> &Signer {
        &self.signer
    }
}

impl Drop for SignerLease {
    fn drop(&mut self) {
        if let Err(e) = self.store.decrement_load(self.signer.id) {
            tracing::error!(signer = %self.signer.name, error = %e, "Failed to release signer load");
        }
    }
}

impl std::fmt::Debug for SignerLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerLease")
            .field("signer_id", &self.signer.id)
            .field("signer", &self.signer.name)
            .finish()
    }
}
