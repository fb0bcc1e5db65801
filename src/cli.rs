use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Parser)]
#[command(name = "cachewire", about = "Cachewire in-memory LRU cache server")]
pub struct Cli {
    /// Path to the runtime configuration file (defaults to
    /// /etc/cachewire/cachewire.toml, then ./cachewire.toml, if present).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}
