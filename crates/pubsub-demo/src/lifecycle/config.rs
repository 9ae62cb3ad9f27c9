//! Application configuration.
//!
//! Precedence (highest to lowest):
//! 1. Environment variables (`PUBSUB_DEMO_MESSAGE_COUNT`)
//! 2. The TOML file named by `PUBSUB_DEMO_CONFIG`, if set
//! 3. Default values
//!
//! ```toml
//! topic_name = "demo"
//! queue_name = "demo"
//! message_count = 100
//! publish_timeout_ms = 30000
//!
//! [drain]
//! max_batch_size = 10
//! idle_backoff_ms = 50
//!
//! [drain.receive_retry]
//! max_attempts = 3
//! initial_delay_ms = 100
//! backoff_multiplier = 2.0
//! max_delay_ms = 1000
//!
//! [broker]
//! region = "us-east-1"
//! account_id = "000000000000"
//! ```

use crate::broker::{BrokerConfig, MAX_RECEIVE_BATCH};
use pubsub_flow::{DrainConfig, RetryPolicy};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const CONFIG_PATH_ENV: &str = "PUBSUB_DEMO_CONFIG";
pub const MESSAGE_COUNT_ENV: &str = "PUBSUB_DEMO_MESSAGE_COUNT";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub topic_name: String,
    pub queue_name: String,
    /// Subscription protocol.
    pub protocol: String,
    pub message_count: u32,
    /// Body of message `i` is this prefix followed by `i`.
    pub message_prefix: String,
    /// Upper bound for one publish. `0` waits indefinitely.
    pub publish_timeout_ms: u64,
    pub drain: DrainConfig,
    pub broker: BrokerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            topic_name: "demo".to_string(),
            queue_name: "demo".to_string(),
            protocol: pubsub_flow::SQS_PROTOCOL.to_string(),
            message_count: 100,
            message_prefix: "message: ".to_string(),
            publish_timeout_ms: 30_000,
            drain: DrainConfig::default(),
            broker: BrokerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads the file named by `PUBSUB_DEMO_CONFIG` (defaults if unset), applies
    /// environment overrides and validates the result.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => {
                let path = PathBuf::from(path);
                debug!(path = %path.display(), "Loading config");
                Self::load_from_file(&path)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        debug!(?config, "Loaded configuration");
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Applies overrides looked up by environment variable name.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(count) = lookup(MESSAGE_COUNT_ENV) {
            self.message_count = count.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{MESSAGE_COUNT_ENV} is not a count: {count:?}"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.topic_name.is_empty() {
            return Err(ConfigError::Invalid("topic_name is empty".into()));
        }
        if self.queue_name.is_empty() {
            return Err(ConfigError::Invalid("queue_name is empty".into()));
        }
        if !(1..=MAX_RECEIVE_BATCH).contains(&self.drain.max_batch_size) {
            return Err(ConfigError::Invalid(format!(
                "drain.max_batch_size must be between 1 and {MAX_RECEIVE_BATCH}, got {}",
                self.drain.max_batch_size
            )));
        }
        check_retry("drain.receive_retry", &self.drain.receive_retry)?;
        check_retry("drain.ack_retry", &self.drain.ack_retry)?;
        Ok(())
    }

    pub fn publish_timeout(&self) -> Option<Duration> {
        (self.publish_timeout_ms > 0).then(|| Duration::from_millis(self.publish_timeout_ms))
    }

    /// Body of the `sequence`-th message.
    pub fn message_body(&self, sequence: u32) -> String {
        format!("{}{sequence}", self.message_prefix)
    }
}

fn check_retry(field: &str, policy: &RetryPolicy) -> Result<(), ConfigError> {
    if policy.max_attempts == 0 {
        return Err(ConfigError::Invalid(format!(
            "{field}.max_attempts must be at least 1"
        )));
    }
    if policy.backoff_multiplier < 1.0 {
        return Err(ConfigError::Invalid(format!(
            "{field}.backoff_multiplier must be at least 1.0"
        )));
    }
    Ok(())
}
