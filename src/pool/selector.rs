//! Signer ordering rules

use std::cmp::Ordering;

use crate::storage::{AssignedSigner, Signer};

fn by_load_then_priority(a: &Signer, b: &Signer) -> Ordering {
    a.current_load
        .cmp(&b.current_load)
        .then(a.priority.cmp(&b.priority))
        .then(a.id.cmp(&b.id))
}

/// Best assigned signer with spare capacity: primary first, then least loaded, then priority
pub fn select_assigned(candidates: &[AssignedSigner]) -> Option<&Signer> {
    candidates
        .iter()
        .filter(|c| c.signer.is_available() && c.signer.has_capacity())
        .min_by(|a, b| {
            b.is_primary
                .cmp(&a.is_primary)
                .then_with(|| by_load_then_priority(&a.signer, &b.signer))
        })
        .map(|c| &c.signer)
}

/// Best signer of the whole pool with spare capacity: least loaded, then priority
pub fn select_from_pool(signers: &[Signer]) -> Option<&Signer> {
    signers
        .iter()
        .filter(|s| s.is_available() && s.has_capacity())
        .min_by(|a, b| by_load_then_priority(a, b))
}
