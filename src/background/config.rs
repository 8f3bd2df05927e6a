// File: src/background/config.rs

use super::health_check::HealthCheckConfig;
use super::retransmission::RetransmissionConfig;

/// Global background jobs configuration
#[derive(Debug, Clone, Default)]
pub struct BackgroundConfig {
    /// Disable all background jobs (for testing)
    pub disabled: bool,

    pub retransmission: RetransmissionConfig,
    pub health_check: HealthCheckConfig,
}

impl BackgroundConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self {
            disabled: std::env::var("DTE_BACKGROUND_DISABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            retransmission: RetransmissionConfig::from_env(),
            health_check: HealthCheckConfig::from_env(),
        }
    }
}
