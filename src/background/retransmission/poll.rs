//! Batch outcome polling
//!
//! Polls the authority for one batch until every expected document is
//! resolved or the deadline passes; whatever is still unknown stays pending.

use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::traits::{AuthorityClient, AuthorityCredentials, BatchOutcome};

pub async fn poll_until_resolved(
    authority: &dyn AuthorityClient,
    credentials: &AuthorityCredentials,
    batch_code: &str,
    expected: &HashSet<Uuid>,
    poll_interval: Duration,
    deadline: Duration,
) -> BatchOutcome {
    let give_up_at = Instant::now() + deadline;
    let mut outcome = BatchOutcome::default();
    let mut resolved: HashSet<Uuid> = HashSet::new();
    let mut wait = poll_interval;

    loop {
        tokio::time::sleep(wait).await;

        match authority.poll_batch(credentials, batch_code).await {
            Ok(polled) => {
                for doc in polled.processed {
                    if expected.contains(&doc.document_id) && resolved.insert(doc.document_id) {
                        outcome.processed.push(doc);
                    }
                }
                for doc in polled.rejected {
                    if expected.contains(&doc.document_id) && resolved.insert(doc.document_id) {
                        outcome.rejected.push(doc);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(batch_code = %batch_code, error = %e, "Batch poll failed, will retry");
            }
        }

        if resolved.len() >= expected.len() {
            tracing::debug!(batch_code = %batch_code, "Batch fully resolved");
            break;
        }
        if Instant::now() >= give_up_at {
            tracing::warn!(
                batch_code = %batch_code,
                resolved = resolved.len(),
                expected = expected.len(),
                "Batch poll deadline reached"
            );
            break;
        }
        // never sleep past the deadline
        wait = poll_interval.min(give_up_at.saturating_duration_since(Instant::now()));
    }

    outcome
}
