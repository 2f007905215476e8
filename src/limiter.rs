use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

use crate::{
    config::EngineConfig,
    counter::WindowCounter,
    error::Result,
    key::resolve_key,
    matcher::{match_route, RequestDescriptor, RouteMatch},
    redis::StoreSource,
    store::{CounterStore, Ttl},
    utils::{duration_to_millis, retry_after_secs},
};

pub const STATUS_OK: u16 = 200;
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Admission verdict for a single request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Whitelisted client or ignored route; nothing was counted
    Bypass,
    Admitted {
        limit: u32,
        window: Duration,
        remaining: u32,
    },
    Rejected {
        limit: u32,
        window: Duration,
        retry_after_secs: u64,
        message: String,
    },
}

impl Decision {
    pub fn status(&self) -> u16 {
        match self {
            Decision::Bypass | Decision::Admitted { .. } => STATUS_OK,
            Decision::Rejected { .. } => STATUS_TOO_MANY_REQUESTS,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Decision::Rejected { .. })
    }

    pub fn limit(&self) -> Option<u32> {
        match self {
            Decision::Bypass => None,
            Decision::Admitted { limit, .. } | Decision::Rejected { limit, .. } => Some(*limit),
        }
    }

    pub fn remaining(&self) -> Option<u32> {
        match self {
            Decision::Bypass => None,
            Decision::Admitted { remaining, .. } => Some(*remaining),
            Decision::Rejected { .. } => Some(0),
        }
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Decision::Rejected {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

/// Counting parameters resolved for one request
#[derive(Debug, Clone, PartialEq, Eq)]
struct Plan {
    key: String,
    limit: u32,
    window: Duration,
}

/// Fixed-window decision engine shared by every request handler.
///
/// Each call re-reads the shared store, so any number of processes pointed
/// at the same store agree on one counter per key.
pub struct RateLimiter {
    config: EngineConfig,
    counter: WindowCounter,
}

impl RateLimiter {
    /// Create a limiter over an already constructed store
    pub fn new(config: EngineConfig, store: Arc<dyn CounterStore>) -> Self {
        Self {
            config,
            counter: WindowCounter::new(store),
        }
    }

    /// Create a limiter backed by Redis, honouring the configured `auto_connect`
    pub async fn connect(config: EngineConfig, source: StoreSource) -> Result<Self> {
        let client = source.into_client(config.auto_connect).await?;
        Ok(Self::new(config, Arc::new(client)))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn plan(&self, request: &RequestDescriptor) -> Option<Plan> {
        let client = request.client_address.as_deref();

        let (limit, window, suffix) =
            match match_route(request, &self.config.whitelist, &self.config.rules) {
                RouteMatch::Admit | RouteMatch::Ignore => return None,
                RouteMatch::Override(rule) => (
                    rule.limit.unwrap_or(self.config.limit),
                    rule.window.unwrap_or(self.config.window),
                    Some(rule.override_suffix()),
                ),
                RouteMatch::NoMatch => (self.config.limit, self.config.window, None),
            };

        Some(Plan {
            key: resolve_key(client, &self.config.namespace, suffix),
            limit,
            window,
        })
    }

    /// Decide whether to admit a request.
    ///
    /// Errors mean the decision could not be made (store unreachable); a
    /// rejection is a successful `Decision::Rejected`.
    pub async fn process(&self, request: &RequestDescriptor) -> Result<Decision> {
        let Some(plan) = self.plan(request) else {
            debug!(
                "Bypassing rate limit for {:?} {:?}",
                request.client_address, request.path
            );
            return Ok(Decision::Bypass);
        };

        let limit = u64::from(plan.limit);

        match self.counter.read_count(&plan.key).await? {
            None => self.open_window(&plan).await,
            Some(count) if count.saturating_add(1) < limit => {
                let count = self.counter.increment_count(&plan.key, plan.window).await?;
                let remaining = limit.saturating_sub(count) as u32;
                debug!("Key {} at {}/{}, {} remaining", plan.key, count, limit, remaining);
                Ok(Decision::Admitted {
                    limit: plan.limit,
                    window: plan.window,
                    remaining,
                })
            }
            Some(count) => {
                let time_left = match self.counter.window_ttl(&plan.key).await? {
                    // INCR recreated the key but its expiry was never set
                    Ttl::Persistent => {
                        warn!("Key {} at count {} has no expiry, reopening", plan.key, count);
                        return self.open_window(&plan).await;
                    }
                    ttl => ttl.or_default(plan.window),
                };
                if duration_to_millis(time_left) == 0 {
                    debug!("Window for key {} expired at count {}, reopening", plan.key, count);
                    return self.open_window(&plan).await;
                }

                let retry_after = retry_after_secs(time_left);
                warn!(
                    "Rate limit exceeded for key {} ({}/{}), retry after {}s",
                    plan.key, count, limit, retry_after
                );
                Ok(Decision::Rejected {
                    limit: plan.limit,
                    window: plan.window,
                    retry_after_secs: retry_after,
                    message: self.config.message.clone(),
                })
            }
        }
    }

    async fn open_window(&self, plan: &Plan) -> Result<Decision> {
        if !self.counter.create_window(&plan.key, plan.window).await? {
            warn!("Store did not acknowledge new window for key {}", plan.key);
        }
        debug!("Opened window for key {} ({}ms)", plan.key, plan.window.as_millis());

        Ok(Decision::Admitted {
            limit: plan.limit,
            window: plan.window,
            remaining: plan.limit - 1,
        })
    }

    /// Clear the window this request would count against.
    /// Returns `false` when nothing was stored or the request is never counted.
    pub async fn reset(&self, request: &RequestDescriptor) -> Result<bool> {
        match self.plan(request) {
            Some(plan) => self.counter.reset(&plan.key).await,
            None => Ok(false),
        }
    }

    /// Health check for the shared store
    pub async fn health_check(&self) -> Result<()> {
        self.counter.health_check().await
    }
}
