use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, ConfigError, File, FileFormat};
use serde::Deserialize;

/// Minimum payment, in sats, that triggers a minting job.
pub const DEFAULT_THRESHOLD_SATS: u64 = 1_641;

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub watch: WatchConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

impl MonitorConfig {
    pub fn load() -> Result<Self> {
        let configured_path = std::env::var("BITBAR_MONITOR_CONFIG")
            .unwrap_or_else(|_| "config/monitor.toml".to_string());
        assert!(
            !configured_path.is_empty(),
            "Configuration path must be non-empty"
        );
        assert!(
            configured_path.len() < 4096,
            "Configuration path length exceeds hard limit"
        );

        let mut builder = Config::builder()
            .add_source(File::new(&configured_path, FileFormat::Toml).required(true));

        if let Ok(env_override) = std::env::var("BITBAR_MONITOR_ENV") {
            if !env_override.is_empty() {
                let env_file = format!("config/monitor.{}.toml", env_override);
                if Path::new(&env_file).exists() {
                    builder = builder.add_source(File::new(&env_file, FileFormat::Toml));
                }
            }
        }

        let settings = builder
            .build()
            .map_err(|err| map_config_error(err, &configured_path))?;
        let config: Self = settings
            .try_deserialize()
            .context("Failed to deserialize monitor configuration")?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        assert!(
            !self.database.url.is_empty(),
            "Database URL must be specified"
        );
        assert!(
            self.server.port > 0,
            "Server port must be greater than zero"
        );
        assert!(
            !self.watch.address.is_empty(),
            "Watched address must be specified"
        );
        assert!(
            self.watch.address.len() < 128,
            "Watched address exceeds length bound"
        );
        assert!(
            !self.watch.explorer_url.is_empty(),
            "Explorer base URL must be specified"
        );
        assert!(
            self.watch.threshold_sats > 0,
            "Eligibility threshold must be positive"
        );
        self.poller.ensure_bounds()?;
        if let Some(days) = self.retention.sweep_days {
            assert!(days > 0, "Retention horizon must be at least one day");
            assert!(days <= 3_650, "Retention horizon exceeds ten years");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Option<IpAddr>,
    pub port: u16,
}

impl ServerConfig {
    pub fn address(&self) -> SocketAddr {
        let host = self.host.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert!(self.port != 0, "HTTP port cannot be zero");
        SocketAddr::new(host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "DatabaseConfig::default_max_connections")]
    pub max_connections: u32,
}

impl DatabaseConfig {
    const fn default_max_connections() -> u32 {
        5
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    /// The single deposit address this process monitors.
    pub address: String,
    /// Base URL of the block-explorer REST API, e.g. `https://mempool.space/api`.
    pub explorer_url: String,
    #[serde(default = "WatchConfig::default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "WatchConfig::default_threshold_sats")]
    pub threshold_sats: u64,
}

impl WatchConfig {
    pub fn request_timeout(&self) -> Duration {
        assert!(
            self.request_timeout_ms >= 100,
            "Upstream timeout must be at least 100ms"
        );
        assert!(
            self.request_timeout_ms <= 60_000,
            "Upstream timeout cannot exceed 60 seconds"
        );
        Duration::from_millis(self.request_timeout_ms)
    }

    const fn default_request_timeout_ms() -> u64 {
        5_000
    }

    const fn default_threshold_sats() -> u64 {
        DEFAULT_THRESHOLD_SATS
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollerConfig {
    #[serde(default = "PollerConfig::default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl PollerConfig {
    pub fn poll_interval(&self) -> Duration {
        assert!(
            self.poll_interval_ms >= 100,
            "Poll interval must be >= 100ms"
        );
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn ensure_bounds(&self) -> Result<()> {
        assert!(
            self.poll_interval_ms >= 100,
            "Poll interval must be >= 100ms"
        );
        assert!(
            self.poll_interval_ms <= 3_600_000,
            "Poll interval exceeds one hour"
        );
        Ok(())
    }

    const fn default_poll_interval_ms() -> u64 {
        10_000
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: Self::default_poll_interval_ms(),
        }
    }
}

/// Optional sweep of settled rows. Pending rows are never swept.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetentionConfig {
    pub sweep_days: Option<u32>,
}

/// Runtime settings for the minter worker. The wallet name and payload file
/// come from the command line; everything else is environment-driven so the
/// worker can run next to any monitor instance.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub server_url: String,
    pub interval: Duration,
    pub inter_dispatch: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub command_template: String,
    pub status_port: u16,
    pub data_dir: PathBuf,
}

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";
pub const DEFAULT_COMMAND_TEMPLATE: &str =
    "ord wallet --name {wallet} inscribe --fee-rate 1 --file {file} --destination {destination}";

impl WorkerConfig {
    pub fn from_env() -> Result<Self> {
        let server_url =
            std::env::var("SERVER_URL").unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());
        assert!(!server_url.is_empty(), "SERVER_URL must be non-empty");

        let interval_ms = env_u64("MINT_INTERVAL_MS", 30_000)?;
        assert!(interval_ms >= 1_000, "Worker interval must be >= 1s");

        let inter_dispatch_ms = env_u64("INTER_DISPATCH_MS", 1_000)?;
        assert!(
            inter_dispatch_ms >= 1_000,
            "Inter-dispatch delay must be >= 1s"
        );

        let max_retries = u32::try_from(env_u64("MAX_RETRIES", 3)?)
            .context("MAX_RETRIES exceeds u32 bounds")?;
        assert!(max_retries >= 1, "MAX_RETRIES must be at least 1");
        assert!(max_retries <= 100, "MAX_RETRIES exceeds defensive limit");

        let retry_backoff_ms = env_u64("MINT_RETRY_BACKOFF_MS", 5_000)?;
        assert!(
            retry_backoff_ms <= 600_000,
            "Retry backoff exceeds ten minutes"
        );

        let command_template = std::env::var("MINT_COMMAND_TEMPLATE")
            .unwrap_or_else(|_| DEFAULT_COMMAND_TEMPLATE.to_string());
        assert!(
            command_template.contains("{destination}"),
            "Command template must reference {{destination}}"
        );

        let status_port = u16::try_from(env_u64("MINT_STATUS_PORT", 3100)?)
            .context("MINT_STATUS_PORT exceeds u16 bounds")?;
        assert!(status_port > 0, "Status port cannot be zero");

        let data_dir =
            PathBuf::from(std::env::var("MINT_DATA_DIR").unwrap_or_else(|_| ".".to_string()));

        Ok(Self {
            server_url,
            interval: Duration::from_millis(interval_ms),
            inter_dispatch: Duration::from_millis(inter_dispatch_ms),
            max_retries,
            retry_backoff: Duration::from_millis(retry_backoff_ms),
            command_template,
            status_port,
            data_dir,
        })
    }
}

fn env_u64(name: &str, default: u64) -> Result<u64> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("{name} must be an unsigned integer, got {raw:?}")),
        Err(_) => Ok(default),
    }
}

fn map_config_error(err: ConfigError, path: &str) -> ConfigError {
    match err {
        ConfigError::NotFound(_) => ConfigError::NotFound(path.to_string()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_threshold_matches_eligibility_rule() {
        assert_eq!(DEFAULT_THRESHOLD_SATS, 1_641);
    }

    #[test]
    fn default_command_template_names_all_placeholders() {
        for placeholder in ["{wallet}", "{file}", "{destination}"] {
            assert!(
                DEFAULT_COMMAND_TEMPLATE.contains(placeholder),
                "template missing {placeholder}"
            );
        }
    }

    #[test]
    fn poller_defaults_are_in_bounds() {
        let poller = PollerConfig::default();
        assert!(poller.ensure_bounds().is_ok());
        assert_eq!(poller.poll_interval(), Duration::from_secs(10));
    }
}
