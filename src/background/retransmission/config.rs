// File: src/background/retransmission/config.rs

use super::window::OperatingWindow;

/// Retransmission job configuration
#[derive(Debug, Clone)]
pub struct RetransmissionConfig {
    /// How often to drain the contingency queue (seconds)
    pub interval_secs: u64,

    /// Max pending records loaded per tick
    pub batch_size: usize,

    /// Wait between batch outcome polls (seconds)
    pub poll_interval_secs: u64,

    /// How long to poll one batch before leaving the rest pending (seconds)
    pub poll_deadline_secs: u64,

    /// Hard wall-clock limit for one tick (seconds)
    pub tick_budget_secs: u64,

    /// Only run inside this window; always run when unset
    pub window: Option<OperatingWindow>,
}

impl Default for RetransmissionConfig {
    fn default() -> Self {
        Self {
            interval_secs: 1800,     // 30 minutes
            batch_size: 50,
            poll_interval_secs: 10,
            poll_deadline_secs: 120, // 2 minutes
            tick_budget_secs: 600,   // 10 minutes
            window: None,
        }
    }
}

impl RetransmissionConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let window = match std::env::var("DTE_RETRY_WINDOW") {
            Ok(raw) if !raw.trim().is_empty() => match OperatingWindow::parse(&raw) {
                Some(window) => Some(window),
                None => {
                    tracing::warn!(value = %raw, "Ignoring malformed DTE_RETRY_WINDOW");
                    None
                }
            },
            _ => None,
        };

        Self {
            interval_secs: std::env::var("DTE_RETRY_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.interval_secs),
            batch_size: std::env::var("DTE_RETRY_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.batch_size),
            poll_interval_secs: std::env::var("DTE_RETRY_POLL_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.poll_interval_secs),
            poll_deadline_secs: std::env::var("DTE_RETRY_POLL_DEADLINE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.poll_deadline_secs),
            tick_budget_secs: std::env::var("DTE_RETRY_TICK_BUDGET_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.tick_budget_secs),
            window,
        }
    }
}
