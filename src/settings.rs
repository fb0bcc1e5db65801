use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;

use anyhow::{Result, ensure};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::cli::{Cli, LogFormat};

fn default_listen() -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 8080))
}

fn default_accept_threads() -> usize {
    1
}

fn default_workers() -> usize {
    4
}

fn default_max_size() -> usize {
    64 * 1024 * 1024
}

fn default_log_format() -> LogFormat {
    LogFormat::Json
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Address the TCP listener binds.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// Reserved; a single acceptor thread is spawned regardless.
    #[serde(default = "default_accept_threads")]
    pub accept_threads: usize,
    /// Hard ceiling on concurrently serviced connections.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Cache byte budget over the sum of key and value sizes.
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    #[serde(default = "default_log_format")]
    pub log: LogFormat,
}

impl Settings {
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut builder = Config::builder();

        // Unlike a proxy, the cache daemon is useful with no configuration
        // at all; a config file is only required when named explicitly.
        if let Some(path) = cli.config.as_deref() {
            builder = builder.add_source(File::from(path.to_path_buf()).required(true));
        } else if let Some(path) = default_config_candidates().into_iter().find(|p| p.exists()) {
            builder = builder.add_source(File::from(path).required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix("CACHEWIRE")
                .separator("__")
                .try_parsing(true),
        );

        let cfg = builder.build().map_err(to_anyhow)?;
        let settings: Settings = cfg.try_deserialize().map_err(to_anyhow)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.workers > 0,
            "workers must be at least 1 (got {})",
            self.workers
        );
        ensure!(
            self.accept_threads > 0,
            "accept_threads must be at least 1 (got {})",
            self.accept_threads
        );
        ensure!(
            self.max_size > 0,
            "max_size must be greater than 0 bytes (got {})",
            self.max_size
        );
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            accept_threads: default_accept_threads(),
            workers: default_workers(),
            max_size: default_max_size(),
            log: default_log_format(),
        }
    }
}

fn to_anyhow(err: ConfigError) -> anyhow::Error {
    anyhow::anyhow!(err)
}

fn default_config_candidates() -> [PathBuf; 2] {
    [
        PathBuf::from("/etc/cachewire/cachewire.toml"),
        PathBuf::from("cachewire.toml"),
    ]
}
