// File: src/background/retransmission/job.rs

use chrono::NaiveTime;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::interval;

use super::config::RetransmissionConfig;
use crate::pipeline::ContingencyQueue;
use crate::pool::SignerPool;
use crate::storage::SqliteStore;
use crate::traits::{AuthorityClient, SigningClient};

/// Summary of one retransmission tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Another cycle held the guard; nothing was read
    pub skipped: bool,
    /// The tick budget ran out before the cycle finished
    pub timed_out: bool,
    pub loaded: usize,
    pub groups: usize,
    pub processed: usize,
    pub rejected: usize,
    pub left_pending: usize,
}

/// Contingency retransmission background job
///
/// Drains the contingency queue on each tick:
/// - Groups pending records by taxpayer
/// - Sends the contingency event, re-signs and submits one batch per document type
/// - Polls each batch and resolves the documents it reports
///
/// A single-slot guard keeps cycles from overlapping, also across clones.
#[derive(Clone)]
pub struct RetransmissionJob {
    pub(super) store: Arc<SqliteStore>,
    pub(super) queue: ContingencyQueue,
    pub(super) pool: SignerPool,
    pub(super) signing: Arc<dyn SigningClient>,
    pub(super) authority: Arc<dyn AuthorityClient>,
    pub(super) config: RetransmissionConfig,
    guard: Arc<Semaphore>,
}

impl RetransmissionJob {
    pub fn new(
        store: Arc<SqliteStore>,
        signing: Arc<dyn SigningClient>,
        authority: Arc<dyn AuthorityClient>,
        config: RetransmissionConfig,
    ) -> Self {
        Self {
            queue: ContingencyQueue::new(Arc::clone(&store)),
            pool: SignerPool::new(Arc::clone(&store)),
            store,
            signing,
            authority,
            config,
            guard: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn config(&self) -> &RetransmissionConfig {
        &self.config
    }

    /// Run retransmission as a background task
    ///
    /// Runs until shutdown signal is received via broadcast channel.
    pub async fn run(&self, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        let mut ticker = interval(Duration::from_secs(self.config.interval_secs.max(1)));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = chrono::Local::now().time();
                    if !self.should_run_at(now) {
                        tracing::debug!(%now, "Outside retransmission window, skipping tick");
                        continue;
                    }
                    self.tick().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Retransmission job shutting down");
                    break;
                }
            }
        }
    }

    /// Whether a scheduled tick may start at this local time
    pub fn should_run_at(&self, now: NaiveTime) -> bool {
        self.config.window.map_or(true, |window| window.contains(now))
    }

    /// Run one cycle unless another one is in progress
    pub async fn tick(&self) -> TickReport {
        let Ok(_permit) = self.guard.try_acquire() else {
            tracing::warn!("Retransmission cycle already running, skipping tick");
            return TickReport {
                skipped: true,
                ..Default::default()
            };
        };

        let budget = Duration::from_secs(self.config.tick_budget_secs);
        let report = match tokio::time::timeout(budget, self.run_cycle()).await {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Retransmission cycle failed");
                TickReport::default()
            }
            Err(_) => {
                tracing::error!(
                    budget_secs = self.config.tick_budget_secs,
                    "Retransmission cycle exceeded its budget, aborted"
                );
                TickReport {
                    timed_out: true,
                    ..Default::default()
                }
            }
        };

        if report.loaded > 0 || report.timed_out {
            tracing::info!(
                loaded = report.loaded,
                groups = report.groups,
                processed = report.processed,
                rejected = report.rejected,
                left_pending = report.left_pending,
                timed_out = report.timed_out,
                "Retransmission tick finished"
            );
        } else {
            tracing::debug!("No pending contingency records");
        }

        report
    }

    /// Whether a cycle currently holds the guard
    pub fn is_running(&self) -> bool {
        self.guard.available_permits() == 0
    }

    #[cfg(test)]
    pub(crate) fn guard(&self) -> Arc<Semaphore> {
        Arc::clone(&self.guard)
    }
}
