//! Per-taxpayer auth token cache

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Auth tokens keyed by taxpayer tax id
#[derive(Debug)]
pub struct TokenCache {
    tokens: Mutex<HashMap<String, CachedToken>>,
    ttl: Duration,
    refresh_margin: Duration,
}

impl TokenCache {
    pub fn new(ttl: Duration, refresh_margin: Duration) -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            ttl,
            refresh_margin,
        }
    }

    /// Token still valid beyond the refresh margin
    pub fn get(&self, user: &str) -> Option<String> {
        let tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        tokens
            .get(user)
            .filter(|cached| Instant::now() + self.refresh_margin < cached.expires_at)
            .map(|cached| cached.token.clone())
    }

    pub fn insert(&self, user: &str, token: String) {
        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        tokens.insert(
            user.to_string(),
            CachedToken {
                token,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drop a token the authority no longer accepts
    pub fn evict(&self, user: &str) {
        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        if tokens.remove(user).is_some() {
            tracing::debug!(tax_id = %user, "Evicted authority token");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_token_is_served() {
        let cache = TokenCache::new(Duration::from_secs(3600), Duration::from_secs(60));
        cache.insert("0614", "Bearer abc".into());
        assert_eq!(cache.get("0614").as_deref(), Some("Bearer abc"));
        assert_eq!(cache.get("other"), None);
    }

    #[test]
    fn test_token_inside_refresh_margin_is_stale() {
        let cache = TokenCache::new(Duration::from_secs(60), Duration::from_secs(300));
        cache.insert("0614", "Bearer abc".into());
        assert_eq!(cache.get("0614"), None);
    }

    #[test]
    fn test_evict() {
        let cache = TokenCache::new(Duration::from_secs(3600), Duration::ZERO);
        cache.insert("0614", "Bearer abc".into());
        cache.evict("0614");
        assert_eq!(cache.get("0614"), None);
    }
}
