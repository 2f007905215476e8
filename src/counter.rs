use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

use crate::{
    error::{RateLimitError, Result},
    store::{CounterStore, Ttl},
};

/// Fixed-window counter kept entirely in the shared store.
///
/// Holds no window state of its own; every call is a store round trip.
#[derive(Clone)]
pub struct WindowCounter {
    store: Arc<dyn CounterStore>,
}

impl WindowCounter {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    /// Start a window at count 1
    pub async fn create_window(&self, key: &str, window: Duration) -> Result<bool> {
        check_key(key)?;
        self.store.set_with_expiry(key, 1, window).await
    }

    /// Current count, or `None` when the window is absent or its value is unreadable
    pub async fn read_count(&self, key: &str) -> Result<Option<u64>> {
        check_key(key)?;
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };

        match raw.trim().parse::<u64>() {
            Ok(count) => Ok(Some(count)),
            Err(_) => {
                warn!("Discarding malformed counter value {:?} for key {}", raw, key);
                Ok(None)
            }
        }
    }

    /// Atomically add one to the window, recreating it if it expired underneath us
    pub async fn increment_count(&self, key: &str, window: Duration) -> Result<u64> {
        check_key(key)?;
        let count = self.store.incr(key).await?;

        if count <= 1 {
            // The increment started from nothing, so the key carries no expiry.
            debug!("Window for key {} vanished before increment, recreating", key);
            self.create_window(key, window).await?;
            return Ok(1);
        }

        Ok(count as u64)
    }

    /// Raw expiry state of the window
    pub async fn window_ttl(&self, key: &str) -> Result<Ttl> {
        check_key(key)?;
        self.store.ttl(key).await
    }

    /// Time until the window expires, falling back to `default` when the store has no TTL
    pub async fn time_remaining(&self, key: &str, default: Duration) -> Result<Duration> {
        Ok(self.window_ttl(key).await?.or_default(default))
    }

    /// Drop the window. Returns whether one existed.
    pub async fn reset(&self, key: &str) -> Result<bool> {
        check_key(key)?;
        Ok(self.store.del(key).await? > 0)
    }

    pub async fn health_check(&self) -> Result<()> {
        self.store.health_check().await
    }
}

fn check_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(RateLimitError::Config(
            "Counter key must not be empty".to_string(),
        ));
    }
    Ok(())
}
