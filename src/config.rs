//! Service configuration

use crate::background::BackgroundConfig;
use crate::clients::AuthorityConfig;

/// Service configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub log_level: String,
    /// Timeout per signing call in seconds
    pub signer_timeout_secs: u64,
    pub authority: AuthorityConfig,
    pub background: BackgroundConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "./dte.db".to_string(),
            log_level: "info".to_string(),
            signer_timeout_secs: 30,
            authority: AuthorityConfig::default(),
            background: BackgroundConfig::default(),
        }
    }
}

impl Config {
    /// Load from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            database_path: std::env::var("DTE_DATABASE_PATH").unwrap_or(defaults.database_path),
            log_level: std::env::var("DTE_LOG_LEVEL").unwrap_or(defaults.log_level),
            signer_timeout_secs: std::env::var("DTE_SIGNER_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.signer_timeout_secs),
            authority: AuthorityConfig::from_env(),
            background: BackgroundConfig::from_env(),
        }
    }
}
