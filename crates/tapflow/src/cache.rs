//! Single-entry cache with an expiry instant.
//!
//! Used for values that are expensive to look up but safe to serve slightly
//! stale: the admin notification list and the bot's own display number.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

struct Entry<T> {
    value: T,
    expires_at: Instant,
}

/// Holds at most one value, refreshed lazily on read once it has expired.
pub struct TtlCache<T> {
    ttl: Duration,
    slot: Mutex<Option<Entry<T>>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    /// Seed the cache with a value that never expires.
    pub fn fixed(value: T) -> Self {
        Self {
            ttl: Duration::MAX,
            slot: Mutex::new(Some(Entry {
                value,
                expires_at: far_future(),
            })),
        }
    }

    /// The cached value, if present and unexpired.
    pub async fn get(&self) -> Option<T> {
        let slot = self.slot.lock().await;
        slot.as_ref()
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone())
    }

    pub async fn set(&self, value: T) {
        let mut slot = self.slot.lock().await;
        *slot = Some(Entry {
            value,
            expires_at: self.expiry(),
        });
    }

    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }

    /// Return the cached value or run `refresh` to replace it.
    ///
    /// The lock is held across `refresh`, so concurrent readers wait for one
    /// lookup instead of all issuing their own. A failed refresh leaves the
    /// slot untouched.
    pub async fn get_or_refresh<F, Fut, E>(&self, refresh: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(entry) = slot.as_ref()
            && entry.expires_at > Instant::now()
        {
            return Ok(entry.value.clone());
        }

        let value = refresh().await?;
        *slot = Some(Entry {
            value: value.clone(),
            expires_at: self.expiry(),
        });
        Ok(value)
    }

    fn expiry(&self) -> Instant {
        Instant::now()
            .checked_add(self.ttl)
            .unwrap_or_else(far_future)
    }
}

fn far_future() -> Instant {
    // Roughly thirty years; `Instant` has no MAX.
    Instant::now() + Duration::from_secs(60 * 60 * 24 * 365 * 30)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn refresh_runs_once_while_fresh() {
        let cache = TtlCache::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value: Result<Vec<String>, ()> = cache
                .get_or_refresh(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec!["250700000001".to_string()])
                })
                .await;
            assert_eq!(value.unwrap(), vec!["250700000001".to_string()]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entry_is_refreshed() {
        let cache = TtlCache::new(Duration::ZERO);
        cache.set(1u32).await;
        assert_eq!(cache.get().await, None);

        let value: Result<u32, ()> = cache.get_or_refresh(|| async { Ok(2) }).await;
        assert_eq!(value.unwrap(), 2);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_slot_empty() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(60));
        let value: Result<u32, &str> = cache.get_or_refresh(|| async { Err("down") }).await;
        assert_eq!(value.unwrap_err(), "down");
        assert_eq!(cache.get().await, None);
    }

    #[tokio::test]
    async fn fixed_value_and_invalidate() {
        let cache = TtlCache::fixed("250788000000".to_string());
        assert_eq!(cache.get().await.as_deref(), Some("250788000000"));
        cache.invalidate().await;
        assert_eq!(cache.get().await, None);
    }
}
