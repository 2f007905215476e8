use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use std::{future::Future, sync::Arc, time::Duration};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::{
    error::{RateLimitError, Result},
    store::{CounterStore, Ttl},
    utils::duration_to_millis,
};

/// Redis client configuration
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub connection_timeout: Option<Duration>,
    pub command_timeout: Option<Duration>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connection_timeout: Some(Duration::from_secs(5)),
            command_timeout: Some(Duration::from_secs(1)),
        }
    }
}

/// Where the limiter gets its Redis client from
#[derive(Clone)]
pub enum StoreSource {
    /// Build a new client from options
    FromOptions(RedisConfig),
    /// Share a client the caller already owns
    FromExistingClient(RedisClient),
}

impl StoreSource {
    /// Resolve into a client. `auto_connect` only applies to `FromOptions`.
    pub async fn into_client(self, auto_connect: bool) -> Result<RedisClient> {
        match self {
            StoreSource::FromOptions(config) if auto_connect => RedisClient::new(config).await,
            StoreSource::FromOptions(config) => RedisClient::lazy(config),
            StoreSource::FromExistingClient(client) => Ok(client),
        }
    }
}

/// Redis client wrapper implementing the counter store primitives
#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
    connection: Arc<OnceCell<ConnectionManager>>,
    config: RedisConfig,
}

impl RedisClient {
    /// Create a new Redis client, connecting and verifying with PING
    pub async fn new(config: RedisConfig) -> Result<Self> {
        let client = Self::lazy(config)?;

        info!("Testing Redis connection with PING...");
        client.health_check().await?;

        info!("Redis client initialized successfully");
        Ok(client)
    }

    /// Create a client that connects on its first command
    pub fn lazy(config: RedisConfig) -> Result<Self> {
        info!("Creating Redis client for URL: {}", config.url);

        let client = redis::Client::open(config.url.clone()).map_err(|e| {
            warn!("Failed to create Redis client: {}", e);
            RateLimitError::Redis(e)
        })?;

        Ok(Self {
            client,
            connection: Arc::new(OnceCell::new()),
            config,
        })
    }

    /// Whether a connection manager has been established
    pub fn is_connected(&self) -> bool {
        self.connection.initialized()
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        let connection = self
            .connection
            .get_or_try_init(|| async {
                let timeout = self.config.connection_timeout.unwrap_or(Duration::from_secs(10));
                debug!("Establishing Redis connection manager...");

                match tokio::time::timeout(timeout, self.client.get_connection_manager()).await {
                    Ok(Ok(conn)) => {
                        info!("Connection manager established successfully");
                        Ok(conn)
                    }
                    Ok(Err(e)) => {
                        warn!("Failed to create connection manager: {}", e);
                        Err(RateLimitError::Redis(e))
                    }
                    Err(_) => {
                        warn!(
                            "Timeout while creating connection manager ({}ms)",
                            timeout.as_millis()
                        );
                        Err(RateLimitError::StoreUnavailable(
                            "Timeout while creating Redis connection manager".to_string(),
                        ))
                    }
                }
            })
            .await?;

        Ok(connection.clone())
    }

    /// Run one command under the configured command timeout
    async fn run<T, F>(&self, operation: &str, command: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        let timeout = self.config.command_timeout.unwrap_or(Duration::from_secs(5));
        match tokio::time::timeout(timeout, command).await {
            Ok(result) => result.map_err(RateLimitError::Redis),
            Err(_) => {
                warn!("Redis {} timeout ({}ms)", operation, timeout.as_millis());
                Err(RateLimitError::StoreUnavailable(format!(
                    "Timeout during Redis {}",
                    operation
                )))
            }
        }
    }
}

#[async_trait]
impl CounterStore for RedisClient {
    async fn set_with_expiry(&self, key: &str, value: i64, ttl: Duration) -> Result<bool> {
        let mut conn = self.connection().await?;
        let millis = duration_to_millis(ttl).max(1);
        let reply: redis::Value = self
            .run(
                "SET",
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("PX")
                    .arg(millis)
                    .query_async(&mut conn),
            )
            .await?;
        Ok(matches!(reply, redis::Value::Okay))
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        self.run("GET", conn.get::<_, Option<String>>(key)).await
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut conn = self.connection().await?;
        self.run("INCR", conn.incr::<_, _, i64>(key, 1)).await
    }

    async fn ttl(&self, key: &str) -> Result<Ttl> {
        let mut conn = self.connection().await?;
        let millis: i64 = self
            .run("PTTL", redis::cmd("PTTL").arg(key).query_async(&mut conn))
            .await?;
        Ok(Ttl::from_pttl(millis))
    }

    async fn del(&self, key: &str) -> Result<u64> {
        let mut conn = self.connection().await?;
        self.run("DEL", conn.del::<_, u64>(key)).await
    }

    async fn health_check(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        self.run("PING", redis::cmd("PING").query_async::<_, ()>(&mut conn))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Tests marked #[ignore] need a Redis server on localhost:6379.
    // Run with: cargo test -- --ignored

    #[test]
    fn test_redis_config() {
        let config = RedisConfig::default();
        assert_eq!(config.url, "redis://localhost:6379");
        assert_eq!(config.command_timeout, Some(Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_lazy_client_does_not_connect() {
        let client = RedisClient::lazy(RedisConfig {
            url: "redis://127.0.0.1:1".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let result = RedisClient::lazy(RedisConfig {
            url: "not a url".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(RateLimitError::Redis(_))));
    }

    #[tokio::test]
    async fn test_existing_client_is_reused() {
        let client = RedisClient::lazy(RedisConfig::default()).unwrap();
        let resolved = StoreSource::FromExistingClient(client.clone())
            .into_client(true)
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&client.connection, &resolved.connection));
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_primitives() {
        let client = RedisClient::new(RedisConfig::default())
            .await
            .expect("Failed to connect to Redis");
        let key = format!("shared-ratelimit-test-{}", std::process::id());

        assert!(client.set_with_expiry(&key, 1, Duration::from_secs(5)).await.unwrap());
        assert_eq!(client.get(&key).await.unwrap().as_deref(), Some("1"));
        assert_eq!(client.incr(&key).await.unwrap(), 2);
        assert!(matches!(client.ttl(&key).await.unwrap(), Ttl::Remaining(_)));
        assert_eq!(client.del(&key).await.unwrap(), 1);
        assert_eq!(client.ttl(&key).await.unwrap(), Ttl::Missing);
    }
}
