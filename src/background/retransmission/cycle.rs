//! One retransmission cycle
//!
//! Works taxpayer by taxpayer. A group is abandoned for the tick when its
//! contingency event is not accepted; records that fail to re-sign or whose
//! batch is not accepted stay pending.

use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use uuid::Uuid;

use super::job::{RetransmissionJob, TickReport};
use super::poll::poll_until_resolved;
use crate::document::{AffectedDocument, ContingencyEvent, DocumentBody, DocumentType, Issuer};
use crate::error::{ServerError, ServerResult};
use crate::storage::{ContingencyPayload, ContingencyRecord, Taxpayer};
use crate::traits::{AuthorityCredentials, BatchSubmission};

#[derive(Debug, Default)]
struct GroupReport {
    processed: usize,
    rejected: usize,
    left_pending: usize,
}

/// A record whose body was re-signed for contingency transmission
struct Resigned {
    record: ContingencyRecord,
    signed_token: String,
}

impl RetransmissionJob {
    pub(super) async fn run_cycle(&self) -> ServerResult<TickReport> {
        let pending = self.queue.pending_batch(self.config.batch_size)?;
        let mut report = TickReport {
            loaded: pending.len(),
            ..Default::default()
        };
        if pending.is_empty() {
            return Ok(report);
        }

        let mut groups: BTreeMap<String, Vec<ContingencyRecord>> = BTreeMap::new();
        for record in pending {
            groups
                .entry(record.payload.taxpayer_tax_id.clone())
                .or_default()
                .push(record);
        }
        report.groups = groups.len();

        tracing::info!(
            records = report.loaded,
            groups = report.groups,
            "Retransmitting contingency records"
        );

        for (tax_id, records) in groups {
            let count = records.len();
            match self.process_group(&tax_id, records).await {
                Ok(group) => {
                    report.processed += group.processed;
                    report.rejected += group.rejected;
                    report.left_pending += group.left_pending;
                }
                Err(e) => {
                    tracing::warn!(
                        tax_id = %tax_id,
                        records = count,
                        error = %e,
                        "Contingency group left pending"
                    );
                    report.left_pending += count;
                }
            }
        }

        Ok(report)
    }

    async fn process_group(
        &self,
        tax_id: &str,
        records: Vec<ContingencyRecord>,
    ) -> ServerResult<GroupReport> {
        let taxpayer = self
            .store
            .get_taxpayer(tax_id)?
            .ok_or_else(|| ServerError::TaxpayerNotFound(tax_id.to_string()))?;
        let credentials = taxpayer.authority_credentials();

        self.authority
            .authenticate(&credentials)
            .await
            .map_err(ServerError::Transmission)?;

        self.send_contingency_event(&taxpayer, &credentials, &records)
            .await?;

        let mut report = GroupReport::default();
        let mut resigned = Vec::with_capacity(records.len());
        for record in records {
            match self.resign(&taxpayer, &record).await {
                Ok(signed_token) => resigned.push(Resigned {
                    record,
                    signed_token,
                }),
                Err(e) => {
                    tracing::warn!(
                        document_id = %record.document_id,
                        error = %e,
                        "Re-signing failed, record stays pending"
                    );
                    report.left_pending += 1;
                }
            }
        }

        let mut by_type: BTreeMap<DocumentType, Vec<Resigned>> = BTreeMap::new();
        for item in resigned {
            by_type.entry(item.record.document_type).or_default().push(item);
        }

        for (document_type, items) in by_type {
            let batch = self
                .submit_and_resolve(&taxpayer, &credentials, document_type, &items)
                .await;
            report.processed += batch.processed;
            report.rejected += batch.rejected;
            report.left_pending += batch.left_pending;
        }

        Ok(report)
    }

    async fn sign(&self, taxpayer: &Taxpayer, payload: &Value) -> ServerResult<String> {
        let lease = self.pool.acquire(&taxpayer.tax_id)?;
        self.signing
            .sign(&taxpayer.signing_credentials(), payload, lease.signer())
            .await
            .map_err(ServerError::Signing)
    }

    async fn send_contingency_event(
        &self,
        taxpayer: &Taxpayer,
        credentials: &AuthorityCredentials,
        records: &[ContingencyRecord],
    ) -> ServerResult<()> {
        let first = records
            .first()
            .ok_or_else(|| ServerError::Internal("empty contingency group".into()))?;
        let outage_start = records
            .iter()
            .map(|r| r.payload.stored_at)
            .min()
            .unwrap_or(first.payload.stored_at);
        let outage_end = records
            .iter()
            .map(|r| r.payload.stored_at)
            .max()
            .unwrap_or(first.payload.stored_at);

        let event = ContingencyEvent {
            event_id: Uuid::new_v4(),
            environment: taxpayer.environment,
            issuer: Issuer {
                tax_id: taxpayer.tax_id.clone(),
                name: taxpayer.name.clone(),
            },
            affected: records
                .iter()
                .map(|r| AffectedDocument {
                    document_id: r.document_id,
                    document_type: r.document_type,
                })
                .collect(),
            outage_start,
            outage_end,
            reason: first.payload.reason(),
            transmitted_at: Utc::now(),
        };

        let signed_event = self.sign(taxpayer, &event.to_value()).await?;
        let accepted = self
            .authority
            .transmit_contingency_event(credentials, &signed_event)
            .await
            .map_err(ServerError::Transmission)?;

        if !accepted {
            return Err(ServerError::AuthorityRejected(format!(
                "contingency event {} not received",
                event.event_id
            )));
        }

        tracing::info!(
            tax_id = %taxpayer.tax_id,
            event_id = %event.event_id,
            documents = records.len(),
            "Contingency event received by authority"
        );
        Ok(())
    }

    /// Rewrite the identification block for contingency, sign again and persist
    async fn resign(&self, taxpayer: &Taxpayer, record: &ContingencyRecord) -> ServerResult<String> {
        let mut body = DocumentBody::from_value(record.payload.unsigned_payload.clone())?;
        body.mark_contingency(&record.payload.reason());
        let unsigned = body.to_value()?;

        let signed_token = self.sign(taxpayer, &unsigned).await?;

        let payload = ContingencyPayload {
            signed_token: signed_token.clone(),
            unsigned_payload: unsigned,
            ..record.payload.clone()
        };
        self.queue.store_resigned(record, &payload)?;

        Ok(signed_token)
    }

    async fn submit_and_resolve(
        &self,
        taxpayer: &Taxpayer,
        credentials: &AuthorityCredentials,
        document_type: DocumentType,
        items: &[Resigned],
    ) -> GroupReport {
        let mut report = GroupReport::default();
        let schema_version = items
            .first()
            .map(|i| i.record.payload.schema_version)
            .unwrap_or_else(|| document_type.schema_version());

        let submission = BatchSubmission {
            batch_id: Uuid::new_v4(),
            environment: taxpayer.environment,
            document_type,
            schema_version,
            signed_tokens: items.iter().map(|i| i.signed_token.clone()).collect(),
        };

        let batch_code = match self.authority.transmit_batch(credentials, &submission).await {
            Ok(Some(code)) => code,
            Ok(None) => {
                tracing::warn!(
                    tax_id = %taxpayer.tax_id,
                    document_type = %document_type,
                    "Batch not accepted by authority, records stay pending"
                );
                report.left_pending = items.len();
                return report;
            }
            Err(e) => {
                tracing::warn!(
                    tax_id = %taxpayer.tax_id,
                    document_type = %document_type,
                    error = %e,
                    "Batch submission failed, records stay pending"
                );
                report.left_pending = items.len();
                return report;
            }
        };

        let ids: Vec<i64> = items.iter().map(|i| i.record.contingency_id).collect();
        if let Err(e) = self.queue.record_batch_attempt(&ids) {
            tracing::warn!(batch_code = %batch_code, error = %e, "Could not record batch attempt");
        }

        tracing::info!(
            tax_id = %taxpayer.tax_id,
            batch_code = %batch_code,
            document_type = %document_type,
            documents = items.len(),
            "Contingency batch submitted"
        );

        let expected: HashSet<Uuid> = items.iter().map(|i| i.record.document_id).collect();
        let outcome = poll_until_resolved(
            self.authority.as_ref(),
            credentials,
            &batch_code,
            &expected,
            Duration::from_secs(self.config.poll_interval_secs),
            Duration::from_secs(self.config.poll_deadline_secs),
        )
        .await;

        for item in items {
            let id = item.record.document_id;
            let processed = outcome.processed.iter().find(|p| p.document_id == id);
            let rejected = outcome.rejected.iter().find(|r| r.document_id == id);

            let result = match (processed, rejected) {
                (Some(p), _) => self
                    .queue
                    .mark_processed(&item.record, &p.reception_stamp)
                    .map(|_| report.processed += 1),
                (None, Some(r)) => self
                    .queue
                    .mark_failed(&item.record, &r.message)
                    .map(|_| report.rejected += 1),
                (None, None) => {
                    report.left_pending += 1;
                    Ok(())
                }
            };

            if let Err(e) = result {
                tracing::error!(document_id = %id, error = %e, "Could not record batch outcome");
                report.left_pending += 1;
            }
        }

        report
    }
}
