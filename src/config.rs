use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, time::Duration};

use crate::{
    error::{RateLimitError, Result},
    redis::RedisConfig,
    utils::trim_trailing_slash,
};

/// Prefix for environment overrides, e.g. `RATELIMIT_LIMIT=50` or `RATELIMIT_REDIS__URL=...`
pub const ENV_PREFIX: &str = "RATELIMIT";

/// Rate limit configuration as written by operators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub whitelist: Vec<String>,
    #[serde(default)]
    pub routes: Vec<RouteRule>,
    #[serde(default = "default_message")]
    pub message: String,
    #[serde(default = "default_auto_connect")]
    pub auto_connect: bool,
    #[serde(default)]
    pub redis: RedisSettings,
}

/// A per-route override. Exactly one of `path` or `pattern` must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteRule {
    pub path: Option<String>,
    pub pattern: Option<String>,
    pub method: Option<String>,
    pub limit: Option<u32>,
    pub window_ms: Option<u64>,
    pub ignore: Option<bool>,
}

/// Connection parameters for the shared store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSettings {
    #[serde(default = "default_redis_url")]
    pub url: String,
    pub connection_timeout_ms: Option<u64>,
    pub command_timeout_ms: Option<u64>,
}

fn default_limit() -> u32 {
    100
}

fn default_window_ms() -> u64 {
    60_000
}

fn default_message() -> String {
    "Too many requests, please try again later.".to_string()
}

fn default_auto_connect() -> bool {
    true
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            window_ms: default_window_ms(),
            namespace: String::new(),
            whitelist: Vec::new(),
            routes: Vec::new(),
            message: default_message(),
            auto_connect: default_auto_connect(),
            redis: RedisSettings::default(),
        }
    }
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            connection_timeout_ms: None,
            command_timeout_ms: None,
        }
    }
}

impl RedisSettings {
    /// Convert into client options, keeping client defaults for unset timeouts
    pub fn to_redis_config(&self) -> RedisConfig {
        let defaults = RedisConfig::default();
        RedisConfig {
            url: self.url.clone(),
            connection_timeout: self
                .connection_timeout_ms
                .map(Duration::from_millis)
                .or(defaults.connection_timeout),
            command_timeout: self
                .command_timeout_ms
                .map(Duration::from_millis)
                .or(defaults.command_timeout),
        }
    }
}

/// How a route rule recognises a request path
#[derive(Debug, Clone)]
pub enum PathMatcher {
    /// Literal path, stored without a trailing slash
    Exact(String),
    Pattern(Regex),
}

impl PathMatcher {
    /// Trailing slashes are ignored on both sides for exact paths.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathMatcher::Exact(expected) => trim_trailing_slash(path) == expected,
            PathMatcher::Pattern(regex) => regex.is_match(path),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PathMatcher::Exact(path) => path,
            PathMatcher::Pattern(regex) => regex.as_str(),
        }
    }
}

/// Route rule with defaults applied, ready for read-only matching
#[derive(Debug, Clone)]
pub struct CompiledRouteRule {
    pub matcher: PathMatcher,
    /// Upper-cased HTTP method
    pub method: String,
    pub limit: Option<u32>,
    pub window: Option<Duration>,
    pub ignore: bool,
    override_suffix: String,
}

impl CompiledRouteRule {
    fn compile(rule: &RouteRule) -> Result<Self> {
        let matcher = match (&rule.path, &rule.pattern) {
            (Some(path), None) => PathMatcher::Exact(trim_trailing_slash(path).to_string()),
            (None, Some(pattern)) => PathMatcher::Pattern(Regex::new(pattern).map_err(|e| {
                RateLimitError::Config(format!("Invalid route pattern '{}': {}", pattern, e))
            })?),
            (Some(_), Some(_)) => {
                return Err(RateLimitError::Config(
                    "Route rule must set either path or pattern, not both".to_string(),
                ))
            }
            (None, None) => {
                return Err(RateLimitError::Config(
                    "Route rule must set a path or a pattern".to_string(),
                ))
            }
        };

        let method = rule
            .method
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or("GET")
            .to_ascii_uppercase();

        if rule.limit == Some(0) {
            return Err(RateLimitError::Config(format!(
                "Route '{}' limit must be at least 1",
                matcher.as_str()
            )));
        }
        if rule.window_ms == Some(0) {
            return Err(RateLimitError::Config(format!(
                "Route '{}' window must be at least 1ms",
                matcher.as_str()
            )));
        }

        let override_suffix = format!("{}:{}", method, matcher.as_str()).to_lowercase();

        Ok(Self {
            matcher,
            method,
            limit: rule.limit,
            window: rule.window_ms.map(Duration::from_millis),
            ignore: rule.ignore.unwrap_or(false),
            override_suffix,
        })
    }

    /// Key segment that separates this route's counter from the default one
    pub fn override_suffix(&self) -> &str {
        &self.override_suffix
    }

    pub fn matches(&self, path: &str, method: &str) -> bool {
        self.method.eq_ignore_ascii_case(method) && self.matcher.matches(path)
    }
}

/// Process-wide engine configuration, immutable after compilation
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub limit: u32,
    pub window: Duration,
    pub namespace: String,
    pub whitelist: HashSet<String>,
    pub rules: Vec<CompiledRouteRule>,
    pub message: String,
    pub auto_connect: bool,
    pub redis: RedisSettings,
}

impl EngineConfig {
    /// Validate a configuration and normalise every rule once
    pub fn compile(config: RateLimitConfig) -> Result<Self> {
        if config.limit == 0 {
            return Err(RateLimitError::Config("limit must be at least 1".to_string()));
        }
        if config.window_ms == 0 {
            return Err(RateLimitError::Config("window must be at least 1ms".to_string()));
        }

        let rules = config
            .routes
            .iter()
            .map(CompiledRouteRule::compile)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            limit: config.limit,
            window: Duration::from_millis(config.window_ms),
            namespace: config.namespace,
            whitelist: config.whitelist.into_iter().collect(),
            rules,
            message: config.message,
            auto_connect: config.auto_connect,
            redis: config.redis,
        })
    }
}

/// Load configuration from YAML string
pub fn load_config_from_yaml(yaml: &str) -> Result<RateLimitConfig> {
    Ok(serde_yaml::from_str(yaml)?)
}

/// Load configuration from a YAML file, applying `RATELIMIT_*` environment overrides
pub fn load_config_from_file(path: &str) -> Result<RateLimitConfig> {
    if !std::path::Path::new(path).exists() {
        return Err(RateLimitError::Config(format!("Config file not found: {}", path)));
    }

    let settings = config::Config::builder()
        .add_source(config::File::new(path, config::FileFormat::Yaml))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}
