// File: src/background/health_check/config.rs

/// Signer health monitor configuration
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    /// How often to probe every active signer (seconds)
    pub interval_secs: u64,

    /// Timeout per probe (seconds)
    pub timeout_secs: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300, // 5 minutes
            timeout_secs: 5,
        }
    }
}

impl HealthCheckConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self {
            interval_secs: std::env::var("DTE_HEALTH_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300),
            timeout_secs: std::env::var("DTE_HEALTH_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        }
    }
}
