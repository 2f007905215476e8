use async_trait::async_trait;
use std::{collections::HashMap, time::Duration};
use tokio::{sync::Mutex, time::Instant};

use crate::error::Result;

/// Time-to-live as reported by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    Remaining(Duration),
    /// Key exists but never expires
    Persistent,
    Missing,
}

impl Ttl {
    /// Decode a Redis `PTTL` reply
    pub fn from_pttl(millis: i64) -> Self {
        match millis {
            -2 => Ttl::Missing,
            m if m < 0 => Ttl::Persistent,
            m => Ttl::Remaining(Duration::from_millis(m as u64)),
        }
    }

    /// Remaining time, or `default` when the key is missing or never expires
    pub fn or_default(self, default: Duration) -> Duration {
        match self {
            Ttl::Remaining(remaining) => remaining,
            Ttl::Persistent | Ttl::Missing => default,
        }
    }
}

/// Atomic key-value primitives the window counter is built on.
///
/// Every operation must be atomic on the store side; callers never lock.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Set `key` to `value`, expiring after `ttl`. Returns whether the write was acknowledged.
    async fn set_with_expiry(&self, key: &str, value: i64, ttl: Duration) -> Result<bool>;

    /// Raw stored value, `None` when the key does not exist
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Increment by one and return the new value. An absent key starts at 0.
    async fn incr(&self, key: &str) -> Result<i64>;

    async fn ttl(&self, key: &str) -> Result<Ttl>;

    /// Delete `key`, returning the number of keys removed
    async fn del(&self, key: &str) -> Result<u64>;

    async fn health_check(&self) -> Result<()>;
}

#[derive(Debug, Clone)]
struct Slot {
    value: String,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Single-process store with Redis-compatible semantics.
///
/// Expiry follows the tokio clock, so paused-time tests can advance past a window.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<String, Slot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a key with an arbitrary value, keeping its expiry
    pub async fn put_raw(&self, key: &str, value: &str) {
        let mut slots = self.slots.lock().await;
        let expires_at = slots.get(key).and_then(|slot| slot.expires_at);
        slots.insert(
            key.to_string(),
            Slot {
                value: value.to_string(),
                expires_at,
            },
        );
    }

    /// Number of keys that have not expired
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let slots = self.slots.lock().await;
        slots.values().filter(|slot| slot.is_live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn purge_expired(slots: &mut HashMap<String, Slot>, key: &str, now: Instant) {
        if slots.get(key).map_or(false, |slot| !slot.is_live(now)) {
            slots.remove(key);
        }
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn set_with_expiry(&self, key: &str, value: i64, ttl: Duration) -> Result<bool> {
        let mut slots = self.slots.lock().await;
        slots.insert(
            key.to_string(),
            Slot {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let mut slots = self.slots.lock().await;
        Self::purge_expired(&mut slots, key, now);
        Ok(slots.get(key).map(|slot| slot.value.clone()))
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let now = Instant::now();
        let mut slots = self.slots.lock().await;
        Self::purge_expired(&mut slots, key, now);

        let slot = slots.entry(key.to_string()).or_insert_with(|| Slot {
            value: "0".to_string(),
            expires_at: None,
        });
        let current: i64 = slot.value.parse().map_err(|_| {
            crate::error::RateLimitError::Redis(redis::RedisError::from((
                redis::ErrorKind::TypeError,
                "value is not an integer or out of range",
            )))
        })?;
        let next = current + 1;
        slot.value = next.to_string();
        Ok(next)
    }

    async fn ttl(&self, key: &str) -> Result<Ttl> {
        let now = Instant::now();
        let mut slots = self.slots.lock().await;
        Self::purge_expired(&mut slots, key, now);

        Ok(match slots.get(key) {
            None => Ttl::Missing,
            Some(Slot { expires_at: None, .. }) => Ttl::Persistent,
            Some(Slot {
                expires_at: Some(at),
                ..
            }) => Ttl::Remaining(at.saturating_duration_since(now)),
        })
    }

    async fn del(&self, key: &str) -> Result<u64> {
        let now = Instant::now();
        let mut slots = self.slots.lock().await;
        Self::purge_expired(&mut slots, key, now);
        Ok(u64::from(slots.remove(key).is_some()))
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_from_pttl() {
        assert_eq!(Ttl::from_pttl(-2), Ttl::Missing);
        assert_eq!(Ttl::from_pttl(-1), Ttl::Persistent);
        assert_eq!(Ttl::from_pttl(1500), Ttl::Remaining(Duration::from_millis(1500)));
        assert_eq!(Ttl::from_pttl(0), Ttl::Remaining(Duration::ZERO));

        let default = Duration::from_secs(60);
        assert_eq!(Ttl::Persistent.or_default(default), default);
        assert_eq!(Ttl::Missing.or_default(default), default);
        assert_eq!(Ttl::from_pttl(10).or_default(default), Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_store_expiry() {
        let store = MemoryStore::new();
        assert!(store.set_with_expiry("k", 1, Duration::from_secs(2)).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("1"));
        assert_eq!(
            store.ttl("k").await.unwrap(),
            Ttl::Remaining(Duration::from_secs(2))
        );

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.ttl("k").await.unwrap(), Ttl::Missing);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_memory_store_incr_on_absent_key_has_no_ttl() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("k").await.unwrap(), 1);
        assert_eq!(store.incr("k").await.unwrap(), 2);
        assert_eq!(store.ttl("k").await.unwrap(), Ttl::Persistent);
    }

    #[tokio::test]
    async fn test_memory_store_incr_keeps_expiry() {
        let store = MemoryStore::new();
        store.set_with_expiry("k", 1, Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.incr("k").await.unwrap(), 2);
        assert!(matches!(store.ttl("k").await.unwrap(), Ttl::Remaining(_)));
    }

    #[tokio::test]
    async fn test_memory_store_del() {
        let store = MemoryStore::new();
        store.set_with_expiry("k", 1, Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.del("k").await.unwrap(), 1);
        assert_eq!(store.del("k").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_memory_store_incr_rejects_non_integer() {
        let store = MemoryStore::new();
        store.put_raw("k", "garbage").await;
        assert!(store.incr("k").await.is_err());
    }
}
