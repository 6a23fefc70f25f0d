//! Configuration management for hashcash approval
//!
//! Supports configuration files (YAML/JSON) and `HASHCASH_*` environment
//! variables layered over defaults, with validation and typed accessors.

use crate::client::{BackoffConfig, RpcClient};
use crate::types::parse_address;
use crate::{Error, Result};
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "HASHCASH";

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Trace => write!(f, "trace"),
        }
    }
}

/// Log output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
    Pretty,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
            LogFormat::Pretty => write!(f, "pretty"),
        }
    }
}

/// Complete configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// JSON-RPC endpoint of the node
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Verifying paymaster, source of the required difficulty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster: Option<String>,

    /// Trusted forwarder, source of sender nonces
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forwarder: Option<String>,

    /// Proxy factory for CREATE2 proxy accounts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_factory: Option<String>,

    /// Unsuccessful trials between checkpoints
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u64,

    /// HTTP timeout in milliseconds
    #[serde(default = "default_http_timeout")]
    pub http_timeout: u64,

    /// Retry attempts for RPC reads (0 disables retries)
    #[serde(default)]
    pub max_retries: usize,

    /// Base retry delay in milliseconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,

    /// Maximum retry delay in milliseconds
    #[serde(default = "default_max_retry_delay")]
    pub max_retry_delay: u64,

    /// Concurrent searches in a pool (0 uses the number of CPUs)
    #[serde(default)]
    pub search_concurrency: usize,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,

    /// Log output format
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            paymaster: None,
            forwarder: None,
            proxy_factory: None,
            checkpoint_interval: default_checkpoint_interval(),
            http_timeout: default_http_timeout(),
            max_retries: 0,
            retry_delay: default_retry_delay(),
            max_retry_delay: default_max_retry_delay(),
            search_concurrency: 0,
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Load defaults, then `path` if given and present, then `HASHCASH_*` variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder().add_source(::config::Config::try_from(&Self::default())?);
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(false));
        }
        let config: Self = builder
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration text; `name` decides the format by extension
    ///
    /// `.json` files (or text starting with `{`) are JSON, anything else YAML.
    pub fn from_contents(contents: &str, name: &str) -> Result<Self> {
        let is_json = Path::new(name).extension().and_then(|s| s.to_str()) == Some("json")
            || contents.trim_start().starts_with('{');

        let config: Self = if is_json {
            serde_json::from_str(contents)?
        } else {
            serde_yaml::from_str(contents)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a configuration file
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path).await?;
        Self::from_contents(&contents, &path.to_string_lossy())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.rpc_url).map_err(|e| Error::config(format!("Invalid RPC URL: {}", e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::config(format!("Unsupported RPC URL scheme: {}", url.scheme())));
        }

        for (name, value) in [
            ("paymaster", &self.paymaster),
            ("forwarder", &self.forwarder),
            ("proxy_factory", &self.proxy_factory),
        ] {
            if let Some(value) = value {
                parse_address(value).map_err(|e| Error::config(format!("Invalid {} address: {}", name, e)))?;
            }
        }

        if self.checkpoint_interval == 0 {
            return Err(Error::config("Checkpoint interval must be greater than 0"));
        }

        if self.retry_delay > self.max_retry_delay {
            return Err(Error::config("Retry delay must not exceed max retry delay"));
        }

        Ok(())
    }

    /// Get paymaster address
    pub fn paymaster_address(&self) -> Result<Address> {
        required_address("paymaster", &self.paymaster)
    }

    /// Get forwarder address
    pub fn forwarder_address(&self) -> Result<Address> {
        required_address("forwarder", &self.forwarder)
    }

    /// Get proxy factory address
    pub fn proxy_factory_address(&self) -> Result<Address> {
        required_address("proxy_factory", &self.proxy_factory)
    }

    /// Get HTTP timeout duration
    pub fn http_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.http_timeout)
    }

    /// Get retry delay duration
    pub fn retry_delay_duration(&self) -> Duration {
        Duration::from_millis(self.retry_delay)
    }

    /// Get max retry delay duration
    pub fn max_retry_delay_duration(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay)
    }

    /// Backoff policy for RPC reads
    pub fn backoff_config(&self) -> BackoffConfig {
        BackoffConfig {
            initial_delay: self.retry_delay_duration(),
            max_delay: self.max_retry_delay_duration(),
            max_retries: self.max_retries,
            ..BackoffConfig::default()
        }
    }

    /// RPC client for the configured node
    pub fn rpc_client(&self) -> Result<RpcClient> {
        Ok(RpcClient::new(&self.rpc_url, self.http_timeout_duration())?.with_backoff_config(self.backoff_config()))
    }
}

fn required_address(name: &str, value: &Option<String>) -> Result<Address> {
    let value = value
        .as_deref()
        .ok_or_else(|| Error::config(format!("No {} address configured", name)))?;
    parse_address(value).map_err(|e| Error::config(format!("Invalid {} address: {}", name, e)))
}

// Default value functions for serde
fn default_rpc_url() -> String { "http://localhost:8545".to_string() }
fn default_checkpoint_interval() -> u64 { crate::hashcash::DEFAULT_CHECKPOINT_INTERVAL }
fn default_http_timeout() -> u64 { 30000 }
fn default_retry_delay() -> u64 { 100 }
fn default_max_retry_delay() -> u64 { 5000 }
fn default_log_level() -> LogLevel { LogLevel::Info }
fn default_log_format() -> LogFormat { LogFormat::Text }
