//! Memoized bearer token with explicit expiry.
//!
//! The mutex is held across the refresh, so concurrent callers that find the
//! token missing or near expiry wait for one login instead of each running
//! their own.

use std::future::Future;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

/// Refresh this long before the token actually expires
pub const DEFAULT_REFRESH_BUFFER_SECS: i64 = 600;

#[derive(Debug, Clone)]
pub struct CachedToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

pub struct TokenCache {
    slot: Mutex<Option<CachedToken>>,
    refresh_buffer: Duration,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_REFRESH_BUFFER_SECS))
    }
}

impl TokenCache {
    pub fn new(refresh_buffer: Duration) -> Self {
        Self {
            slot: Mutex::new(None),
            refresh_buffer,
        }
    }

    /// Cached token if still fresh, otherwise the result of `refresh`
    pub async fn get_or_refresh<F, Fut>(&self, refresh: F) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedToken>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(token) = slot.as_ref() {
            if token.expires_at > Utc::now() + self.refresh_buffer {
                return Ok(token.value.clone());
            }
        }

        let fresh = refresh().await?;
        let value = fresh.value.clone();
        *slot = Some(fresh);
        Ok(value)
    }

    /// Drop the cached token (e.g. after a 401)
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn token(value: &str, ttl: Duration) -> CachedToken {
        CachedToken {
            value: value.to_string(),
            expires_at: Utc::now() + ttl,
        }
    }

    #[tokio::test]
    async fn test_fresh_token_is_reused() {
        let cache = TokenCache::default();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_refresh(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(token("abc", Duration::hours(1)))
                })
                .await
                .unwrap();
            assert_eq!(value, "abc");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_token_inside_buffer_is_refreshed() {
        let cache = TokenCache::default();
        cache
            .get_or_refresh(|| async { Ok(token("old", Duration::minutes(5))) })
            .await
            .unwrap();

        let value = cache
            .get_or_refresh(|| async { Ok(token("new", Duration::hours(1))) })
            .await
            .unwrap();
        assert_eq!(value, "new");
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let cache = Arc::new(TokenCache::default());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_refresh(|| async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        Ok(token("shared", Duration::hours(1)))
                    })
                    .await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "shared");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refresh() {
        let cache = TokenCache::default();
        cache
            .get_or_refresh(|| async { Ok(token("first", Duration::hours(1))) })
            .await
            .unwrap();
        cache.invalidate().await;
        let value = cache
            .get_or_refresh(|| async { Ok(token("second", Duration::hours(1))) })
            .await
            .unwrap();
        assert_eq!(value, "second");
    }
}
