// File: src/background/health_check/mod.rs

//! Signer health monitor
//!
//! Periodically probes each active signer's status endpoint.

pub mod config;
pub mod job;

pub use config::HealthCheckConfig;
pub use job::{HealthReport, SignerHealthJob};
