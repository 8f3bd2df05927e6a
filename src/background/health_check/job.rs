// File: src/background/health_check/job.rs

use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use super::config::HealthCheckConfig;
use crate::error::ServerResult;
use crate::storage::{HealthStatus, SqliteStore};
use crate::traits::SigningClient;

/// Signer health background job
///
/// Probes every active signer and records the result. Never touches load:
/// load is accounted by signer leases.
pub struct SignerHealthJob {
    store: Arc<SqliteStore>,
    signing: Arc<dyn SigningClient>,
    config: HealthCheckConfig,
}

/// Probe results of one round
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub probed: usize,
    pub healthy: usize,
}

impl SignerHealthJob {
    pub fn new(
        store: Arc<SqliteStore>,
        signing: Arc<dyn SigningClient>,
        config: HealthCheckConfig,
    ) -> Self {
        Self {
            store,
            signing,
            config,
        }
    }

    /// Run health checks as a background task
    ///
    /// Runs until shutdown signal is received via broadcast channel.
    pub async fn run(&self, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        let mut ticker = interval(Duration::from_secs(self.config.interval_secs.max(1)));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.check_all().await {
                        tracing::error!(error = %e, "Signer health check failed");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Signer health job shutting down");
                    break;
                }
            }
        }
    }

    /// Probe every active signer once
    pub async fn check_all(&self) -> ServerResult<HealthReport> {
        let signers = self.store.active_signers()?;
        let mut report = HealthReport::default();

        for signer in signers {
            let status = self.signing.probe(&signer).await;
            report.probed += 1;
            if status == HealthStatus::Healthy {
                report.healthy += 1;
            }

            if status != signer.health_status {
                tracing::info!(
                    signer = %signer.name,
                    from = %signer.health_status,
                    to = %status,
                    "Signer health changed"
                );
            }

            if let Err(e) = self.store.update_signer_health(signer.id, status) {
                tracing::warn!(signer = %signer.name, error = %e, "Could not record signer health");
            }
        }

        tracing::debug!(
            probed = report.probed,
            healthy = report.healthy,
            "Signer health round finished"
        );
        Ok(report)
    }
}
