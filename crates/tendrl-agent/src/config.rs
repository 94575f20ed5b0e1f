//! Agent configuration.
//!
//! Built once at startup from CLI flags and environment variables, validated,
//! then shared read-only (`Arc<Config>`) with every component. Nothing
//! mutates configuration after [`Config::resolve`] returns.
//!
//! Environment variables:
//! - `TENDRL_KEY` — fallback credential when `--apiKey` is not given
//! - `TENDRL_APP_URL` — override the upstream base URL
//! - `TENDRL_SOCKET_PATH` — override the local socket path

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::cli::Args;

/// Default upstream API base URL.
pub const DEFAULT_APP_URL: &str = "https://app.tendrl.com/api";

#[cfg(unix)]
const DEFAULT_STATE_DIR: &str = "/var/lib/tendrl";
#[cfg(windows)]
const DEFAULT_STATE_DIR: &str = "C:\\ProgramData\\tendrl";

const SOCKET_FILE_NAME: &str = "tendrl_agent.sock";

/// Immutable agent configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Bearer credential sent on every upstream call.
    pub api_key: String,
    /// Upstream API base URL, no trailing slash.
    pub app_url: String,
    /// Directory holding the socket; provisioned at startup.
    pub state_dir: PathBuf,
    /// Local stream socket the agent listens on.
    pub socket_path: PathBuf,
    /// Initial egress flush cadence, before the controller takes over.
    pub flush_interval: Duration,
    pub min_batch_size: usize,
    pub max_batch_size: usize,
    /// Queue capacity; producers block once this many messages are buffered.
    pub max_queue_size: usize,
    pub target_cpu_percent: f64,
    pub target_mem_percent: f64,
    pub min_batch_interval: Duration,
    pub max_batch_interval: Duration,
    /// Accepted for queue-driven scaling; not consumed by the controller.
    pub scale_factor: f64,
}

impl Default for Config {
    fn default() -> Self {
        let state_dir = PathBuf::from(DEFAULT_STATE_DIR);
        let socket_path = state_dir.join(SOCKET_FILE_NAME);
        Self {
            api_key: String::new(),
            app_url: DEFAULT_APP_URL.to_string(),
            state_dir,
            socket_path,
            flush_interval: Duration::from_millis(250),
            min_batch_size: 10,
            max_batch_size: 200,
            max_queue_size: 1000,
            target_cpu_percent: 70.0,
            target_mem_percent: 80.0,
            min_batch_interval: Duration::from_millis(100),
            max_batch_interval: Duration::from_secs(1),
            scale_factor: 0.5,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing API key: pass --apiKey or set TENDRL_KEY")]
    MissingApiKey,
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    /// Resolves the effective configuration from flags and environment.
    pub fn resolve(args: Args) -> Result<Self, ConfigError> {
        let api_key = args
            .api_key
            .or_else(|| env::var("TENDRL_KEY").ok())
            .unwrap_or_default();

        let app_url = env::var("TENDRL_APP_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_APP_URL.to_string());

        let socket_path = env::var("TENDRL_SOCKET_PATH")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR).join(SOCKET_FILE_NAME));
        let state_dir = socket_path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR));

        let config = Self {
            api_key,
            app_url,
            state_dir,
            socket_path,
            flush_interval: args.flush_interval,
            min_batch_size: args.min_batch_size,
            max_batch_size: args.max_batch_size,
            max_queue_size: args.max_queue,
            target_cpu_percent: args.target_cpu,
            target_mem_percent: args.target_mem,
            min_batch_interval: args.min_interval,
            max_batch_interval: args.max_interval,
            scale_factor: args.scale_factor,
        };

        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints; called by [`Config::resolve`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if self.min_batch_size == 0 {
            return Err(ConfigError::Invalid("minBatchSize must be at least 1".into()));
        }
        if self.min_batch_size > self.max_batch_size {
            return Err(ConfigError::Invalid(format!(
                "minBatchSize ({}) must not exceed maxBatchSize ({})",
                self.min_batch_size, self.max_batch_size
            )));
        }
        if self.max_queue_size == 0 {
            return Err(ConfigError::Invalid("maxQueue must be at least 1".into()));
        }
        if self.min_batch_interval > self.max_batch_interval {
            return Err(ConfigError::Invalid(format!(
                "minInterval ({:?}) must not exceed maxInterval ({:?})",
                self.min_batch_interval, self.max_batch_interval
            )));
        }
        if self.target_cpu_percent <= 0.0 || self.target_mem_percent <= 0.0 {
            return Err(ConfigError::Invalid(
                "targetCPU and targetMem must be positive".into(),
            ));
        }
        Ok(())
    }
}
