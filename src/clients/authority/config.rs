// File: src/clients/authority/config.rs

/// Tax authority endpoints and timing
#[derive(Debug, Clone)]
pub struct AuthorityConfig {
    /// Base URL of the authority API (test or production host)
    pub base_url: String,

    pub auth_path: String,
    pub reception_path: String,
    pub batch_path: String,
    /// Batch poll path; the authority batch code is appended
    pub batch_poll_path: String,
    pub contingency_path: String,
    pub invalidation_path: String,

    /// Per-call timeout (seconds)
    pub timeout_secs: u64,

    /// Lifetime assumed for an auth token (seconds)
    pub token_ttl_secs: u64,

    /// Re-authenticate this long before the token expires (seconds)
    pub token_refresh_margin_secs: u64,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            base_url: "https://apitest.dtes.mh.gob.sv".to_string(),
            auth_path: "/seguridad/auth".to_string(),
            reception_path: "/fesv/recepciondte".to_string(),
            batch_path: "/fesv/recepcionlote/".to_string(),
            batch_poll_path: "/fesv/recepcion/consultadtelote/".to_string(),
            contingency_path: "/fesv/contingencia".to_string(),
            invalidation_path: "/fesv/anulardte".to_string(),
            timeout_secs: 45,
            token_ttl_secs: 86_400,
            token_refresh_margin_secs: 300,
        }
    }
}

fn env_string(key: &str, default: String) -> String {
    std::env::var(key)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default)
}

impl AuthorityConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env_string("DTE_AUTHORITY_BASE_URL", defaults.base_url),
            auth_path: env_string("DTE_AUTHORITY_AUTH_PATH", defaults.auth_path),
            reception_path: env_string("DTE_AUTHORITY_RECEPTION_PATH", defaults.reception_path),
            batch_path: env_string("DTE_AUTHORITY_BATCH_PATH", defaults.batch_path),
            batch_poll_path: env_string("DTE_AUTHORITY_BATCH_POLL_PATH", defaults.batch_poll_path),
            contingency_path: env_string("DTE_AUTHORITY_CONTINGENCY_PATH", defaults.contingency_path),
            invalidation_path: env_string(
                "DTE_AUTHORITY_INVALIDATION_PATH",
                defaults.invalidation_path,
            ),
            timeout_secs: std::env::var("DTE_AUTHORITY_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_secs),
            token_ttl_secs: std::env::var("DTE_AUTHORITY_TOKEN_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.token_ttl_secs),
            token_refresh_margin_secs: std::env::var("DTE_AUTHORITY_TOKEN_REFRESH_MARGIN_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.token_refresh_margin_secs),
        }
    }

    /// Join the base URL and a path
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// URL for a test server (all paths under `base_url`)
    pub fn for_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }
}
