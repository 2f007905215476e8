//! Shared Rate Limit
//!
//! Fixed-window request admission for services running as several
//! independent processes. Counters live in a shared Redis store, so every
//! process sees the same window per client and route; atomicity comes from
//! the store's own primitives rather than from in-process locks.

pub mod config;
pub mod counter;
pub mod error;
pub mod key;
pub mod limiter;
pub mod matcher;
pub mod metrics;
pub mod middleware;
pub mod redis;
pub mod service;
pub mod store;
pub mod utils;

// Re-export main types
pub use crate::config::{EngineConfig, RateLimitConfig, RouteRule};
pub use crate::error::{RateLimitError, Result};
pub use crate::limiter::{Decision, RateLimiter};
pub use crate::matcher::RequestDescriptor;
pub use crate::redis::{RedisClient, RedisConfig, StoreSource};
pub use crate::service::RateLimitService;
pub use crate::store::{CounterStore, MemoryStore};
