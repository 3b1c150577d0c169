//! Relay configuration.
//!
//! Sources, lowest precedence first: built-in defaults, the TOML config file,
//! `DIFY_RELAY_*` environment variables (`__` separates nested keys), then
//! the plain `DIFY_API_URL` / `DIFY_API_KEY` variables.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;

use crate::relay::FramePolicy;

/// Config file read from the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "dify-relay.toml";

/// Prefix for structured environment overrides.
pub const ENV_PREFIX: &str = "DIFY_RELAY";

pub const API_URL_ENV: &str = "DIFY_API_URL";
pub const API_KEY_ENV: &str = "DIFY_API_KEY";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_TIMEOUT_SECS: u64 = 3600;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("config file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("{field} is not configured; set {env} or `{field}` in {file}", file = DEFAULT_CONFIG_FILE)]
    Missing {
        field: &'static str,
        env: &'static str,
    },

    #[error("upstream.timeout_secs must be between 1 and {max}, got {0}", max = MAX_TIMEOUT_SECS)]
    InvalidTimeout(u64),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// `host:port` form accepted by `TcpListener::bind`; the host may be a name.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Where and how to reach the agent API.
#[derive(Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Full chat-messages endpoint URL.
    #[serde(default)]
    pub api_url: String,
    /// Bearer credential for the app.
    #[serde(default)]
    pub api_key: String,
    /// Bound on connecting, waiting for the response head and each line read.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl UpstreamConfig {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// Keep the key out of logs.
impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayConfig {
    /// Handling of upstream lines that are not valid events.
    #[serde(default)]
    pub malformed_frames: FramePolicy,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl AppConfig {
    /// Load from the given file (or the default one, if present) and the
    /// process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_from(path, std::env::vars())
    }

    /// Load with an explicit set of environment variables.
    pub fn load_from(
        path: Option<&Path>,
        env: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, ConfigError> {
        let env: config::Map<String, String> = env.into_iter().collect();

        let file = match path {
            Some(path) if !path.exists() => {
                return Err(ConfigError::FileNotFound(path.to_path_buf()));
            }
            Some(path) => File::from(path).format(FileFormat::Toml).required(true),
            None => File::new(DEFAULT_CONFIG_FILE, FileFormat::Toml).required(false),
        };

        let built = Config::builder()
            .set_default("server.host", DEFAULT_HOST)?
            .set_default("server.port", i64::from(DEFAULT_PORT))?
            .set_default("upstream.timeout_secs", DEFAULT_TIMEOUT_SECS as i64)?
            .set_default("relay.malformed_frames", "fail")?
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(env.clone())),
            )
            .set_override_option("upstream.api_url", env.get(API_URL_ENV).cloned())?
            .set_override_option("upstream.api_key", env.get(API_KEY_ENV).cloned())?
            .build()?;

        let config: AppConfig = built.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upstream.api_url.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "upstream.api_url",
                env: API_URL_ENV,
            });
        }
        if self.upstream.api_key.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "upstream.api_key",
                env: API_KEY_ENV,
            });
        }
        if !(1..=MAX_TIMEOUT_SECS).contains(&self.upstream.timeout_secs) {
            return Err(ConfigError::InvalidTimeout(self.upstream.timeout_secs));
        }
        Ok(())
    }
}
