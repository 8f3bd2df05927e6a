// File: src/background/mod.rs

//! Background job management
//!
//! This module implements the jobs that run outside the request path:
//! - Retransmit documents held in the contingency queue
//! - Probe signer endpoints and keep their health status current
//!
//! Jobs discover pending work by querying the database on each tick.

pub mod config;
pub mod health_check;
pub mod retransmission;

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::storage::SqliteStore;
use crate::traits::{AuthorityClient, SigningClient};

pub use config::BackgroundConfig;
pub use health_check::{HealthCheckConfig, SignerHealthJob};
pub use retransmission::{OperatingWindow, RetransmissionConfig, RetransmissionJob, TickReport};

/// Background job runner
///
/// Owns the shutdown channel; jobs run until `shutdown` is called.
pub struct BackgroundJobRunner {
    store: Arc<SqliteStore>,
    signing: Arc<dyn SigningClient>,
    authority: Arc<dyn AuthorityClient>,
    config: BackgroundConfig,
    shutdown_tx: broadcast::Sender<()>,
}

impl BackgroundJobRunner {
    pub fn new(
        store: Arc<SqliteStore>,
        signing: Arc<dyn SigningClient>,
        authority: Arc<dyn AuthorityClient>,
        config: BackgroundConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            store,
            signing,
            authority,
            config,
            shutdown_tx,
        }
    }

    /// Start all background jobs
    pub fn start(&self) -> Vec<tokio::task::JoinHandle<()>> {
        if self.config.disabled {
            tracing::info!("Background jobs disabled via DTE_BACKGROUND_DISABLED=true");
            return vec![];
        }

        let mut handles = Vec::new();

        // 1. Contingency retransmission
        {
            let job = RetransmissionJob::new(
                Arc::clone(&self.store),
                Arc::clone(&self.signing),
                Arc::clone(&self.authority),
                self.config.retransmission.clone(),
            );
            let shutdown_rx = self.shutdown_tx.subscribe();
            handles.push(tokio::spawn(async move {
                job.run(shutdown_rx).await;
            }));
            tracing::info!(
                interval_secs = self.config.retransmission.interval_secs,
                batch_size = self.config.retransmission.batch_size,
                window = ?self.config.retransmission.window,
                "Retransmission job started"
            );
        }

        // 2. Signer health monitor
        {
            let job = SignerHealthJob::new(
                Arc::clone(&self.store),
                Arc::clone(&self.signing),
                self.config.health_check.clone(),
            );
            let shutdown_rx = self.shutdown_tx.subscribe();
            handles.push(tokio::spawn(async move {
                job.run(shutdown_rx).await;
            }));
            tracing::info!(
                interval_secs = self.config.health_check.interval_secs,
                "Signer health job started"
            );
        }

        tracing::info!(job_count = handles.len(), "Background jobs started");

        handles
    }

    /// Signal all jobs to shutdown gracefully
    pub fn shutdown(&self) {
        tracing::info!("Signaling background jobs to shutdown");
        let _ = self.shutdown_tx.send(());
    }
}
