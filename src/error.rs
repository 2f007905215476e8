use thiserror::Error;

/// Result type for rate limit operations
pub type Result<T> = std::result::Result<T, RateLimitError>;

/// Errors that can occur while deciding on a request
#[derive(Error, Debug)]
pub enum RateLimitError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),
}

impl RateLimitError {
    /// Whether the shared store could not be reached or did not answer in time
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, RateLimitError::Redis(_) | RateLimitError::StoreUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_unavailable_classification() {
        let err = RateLimitError::StoreUnavailable("timeout".to_string());
        assert!(err.is_store_unavailable());

        let err = RateLimitError::Redis(redis::RedisError::from((
            redis::ErrorKind::IoError,
            "connection refused",
        )));
        assert!(err.is_store_unavailable());

        let err = RateLimitError::Config("empty key".to_string());
        assert!(!err.is_store_unavailable());
        assert_eq!(err.to_string(), "Configuration error: empty key");
    }
}
