//! Server configuration.
//!
//! Configuration is layered, later sources winning:
//! - Built-in defaults
//! - TOML file: `$DROPS_CONFIG`, else the first of `drops.toml`,
//!   `/etc/drops/drops.toml`, `~/.config/drops/drops.toml` that exists
//! - Environment variables (`DROPS_PORT`, `DROPS_LIMITS__MAX_METRIC_POINTS`, ...)

use anyhow::{ensure, Context, Result};
use drops_core::{RegistryConfig, RouterConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "DROPS_CONFIG";

const CONFIG_PATHS: [&str; 3] = [
    "drops.toml",
    "/etc/drops/drops.toml",
    "~/.config/drops/drops.toml",
];

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// RPC relay behaviour.
    #[serde(default)]
    pub rpc: RpcConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Points retained per metric per station.
    #[serde(default = "default_max_metric_points")]
    pub max_metric_points: usize,

    /// Longest accepted protocol line in bytes.
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,

    /// Lines queued per connection before forwarding blocks.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,

    /// Deadline for queueing and writing one line, in milliseconds.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

/// RPC relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Answer a station's pending runs with `ERR` when it disconnects.
    #[serde(default = "default_true")]
    pub fail_pending_on_disconnect: bool,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    19406
}

fn default_true() -> bool {
    true
}

fn default_max_metric_points() -> usize {
    100
}

fn default_max_line_length() -> usize {
    drops_protocol::MAX_LINE_LENGTH
}

fn default_outbound_queue() -> usize {
    256
}

fn default_write_timeout_ms() -> u64 {
    5_000
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            limits: LimitsConfig::default(),
            rpc: RpcConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_metric_points: default_max_metric_points(),
            max_line_length: default_max_line_length(),
            outbound_queue: default_outbound_queue(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            fail_pending_on_disconnect: true,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load and validate configuration from the default locations.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, an
    /// environment override has the wrong type, or validation fails.
    pub fn load() -> Result<Self> {
        let path = Self::locate();
        let config = Self::load_from(path.as_deref())?;
        config.validate()?;
        Ok(config)
    }

    /// Find the config file to use, if any.
    fn locate() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Some(PathBuf::from(shellexpand::tilde(&path).as_ref()));
        }

        CONFIG_PATHS
            .iter()
            .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
            .find(|path| path.exists())
    }

    /// Load configuration from an optional file plus `DROPS_*` environment
    /// overrides. Does not validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or any value is invalid.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!("Loading configuration from {}", path.display());
            builder = builder.add_source(config::File::new(
                &path.to_string_lossy(),
                config::FileFormat::Toml,
            ));
        }

        builder
            .add_source(
                config::Environment::with_prefix("DROPS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// Reject settings the server cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first offending setting.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.limits.max_metric_points > 0,
            "limits.max_metric_points must be positive"
        );
        ensure!(
            self.limits.max_line_length > 0,
            "limits.max_line_length must be positive"
        );
        ensure!(
            self.limits.outbound_queue > 0,
            "limits.outbound_queue must be positive"
        );
        ensure!(
            self.limits.write_timeout_ms > 0,
            "limits.write_timeout_ms must be positive"
        );
        self.bind_addr()?;
        Ok(())
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if `host:port` is not a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }

    /// Deadline for queueing and writing one line.
    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.limits.write_timeout_ms)
    }

    /// Registry settings derived from this configuration.
    #[must_use]
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            max_metric_points: self.limits.max_metric_points,
        }
    }

    /// Router settings derived from this configuration.
    #[must_use]
    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            fail_pending_on_disconnect: self.rpc.fail_pending_on_disconnect,
        }
    }
}
