use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "tunnelproxy",
    about = "Forward HTTP proxy with CONNECT tunneling"
)]
pub struct Cli {
    /// Path to the configuration file (defaults to ./tunnelproxy.toml if present).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Address to listen on, overriding the configuration file.
    #[arg(long)]
    pub listen: Option<SocketAddr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}
