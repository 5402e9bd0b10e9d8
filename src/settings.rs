use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Result, ensure};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::cli::{Cli, LogFormat};
use crate::proxy::http::ReadLimits;

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

fn default_max_header_size() -> usize {
    32 * 1024
}

fn default_max_request_body_size() -> u64 {
    64 * 1024 * 1024
}

fn default_header_read_chunk() -> usize {
    4096
}

fn default_relay_buffer_size() -> usize {
    64 * 1024
}

fn default_forward_port() -> u16 {
    80
}

fn default_connect_port() -> u16 {
    443
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    #[serde(default = "default_log_format")]
    pub log: LogFormat,
    /// Upper bound for the request line, headers and terminator together.
    #[serde(default = "default_max_header_size")]
    pub max_header_size: usize,
    #[serde(default = "default_max_request_body_size")]
    pub max_request_body_size: u64,
    #[serde(default = "default_header_read_chunk")]
    pub header_read_chunk: usize,
    #[serde(default = "default_relay_buffer_size")]
    pub relay_buffer_size: usize,
    #[serde(default = "default_forward_port")]
    pub forward_default_port: u16,
    #[serde(default = "default_connect_port")]
    pub connect_default_port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            log: default_log_format(),
            max_header_size: default_max_header_size(),
            max_request_body_size: default_max_request_body_size(),
            header_read_chunk: default_header_read_chunk(),
            relay_buffer_size: default_relay_buffer_size(),
            forward_default_port: default_forward_port(),
            connect_default_port: default_connect_port(),
        }
    }
}

impl Settings {
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(config_path) = resolve_config_path(cli) {
            builder = builder.add_source(File::from(config_path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("TUNNELPROXY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder = builder
            .set_override_option("listen", cli.listen.map(|addr| addr.to_string()))
            .map_err(to_anyhow)?;

        let cfg = builder.build().map_err(to_anyhow)?;
        let settings: Settings = cfg.try_deserialize().map_err(to_anyhow)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn read_limits(&self) -> ReadLimits {
        ReadLimits {
            max_header_size: self.max_header_size,
            max_body_size: self.max_request_body_size,
            read_chunk: self.header_read_chunk,
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.max_header_size > 0,
            "max_header_size must be greater than 0 (got {})",
            self.max_header_size
        );
        ensure!(
            self.max_request_body_size > 0,
            "max_request_body_size must be greater than 0 (got {})",
            self.max_request_body_size
        );
        ensure!(
            self.header_read_chunk > 0,
            "header_read_chunk must be greater than 0 (got {})",
            self.header_read_chunk
        );
        ensure!(
            self.relay_buffer_size > 0,
            "relay_buffer_size must be greater than 0 (got {})",
            self.relay_buffer_size
        );
        ensure!(
            self.forward_default_port > 0,
            "forward_default_port must be a non-zero port"
        );
        ensure!(
            self.connect_default_port > 0,
            "connect_default_port must be a non-zero port"
        );
        Ok(())
    }
}

fn to_anyhow(err: ConfigError) -> anyhow::Error {
    anyhow::anyhow!(err)
}

impl Cli {
    pub fn config_path(&self) -> Option<&Path> {
        self.config.as_deref()
    }
}

/// An explicit `--config` is always used (and must exist); otherwise the first
/// default location that exists, if any.
fn resolve_config_path(cli: &Cli) -> Option<PathBuf> {
    if let Some(path) = cli.config_path() {
        return Some(path.to_path_buf());
    }
    default_config_candidates()
        .into_iter()
        .find(|candidate| candidate.exists())
}

fn default_config_candidates() -> [PathBuf; 2] {
    [
        PathBuf::from("/etc/tunnelproxy/tunnelproxy.toml"),
        PathBuf::from("tunnelproxy.toml"),
    ]
}
