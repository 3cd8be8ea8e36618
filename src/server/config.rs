//! Configuration types and constants for the chatline server.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

/// Events buffered per live connection before it is treated as stalled.
pub(crate) const LIVE_QUEUE_CAPACITY: usize = 64;
/// Upper bound on a single websocket write.
pub(crate) const LIVE_WRITE_TIMEOUT: Duration = Duration::from_secs(5);
/// Inline image/audio payloads can be large; matches the upload limit.
pub(crate) const MAX_BODY_SIZE: usize = 50 * 1024 * 1024; // 50 MiB
pub(crate) const MAX_ASSET_SIZE: usize = MAX_BODY_SIZE;

pub(crate) const DEFAULT_BIND: &str = "127.0.0.1:5001";
pub(crate) const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;
pub(crate) const DEFAULT_ASSET_BASE_URL: &str = "/assets";

/// Direct-messaging server with live presence and message push.
///
/// Configuration can be set via CLI arguments or environment variables.
/// CLI arguments take precedence over environment variables.
#[derive(Parser, Debug)]
#[command(name = "chatline", version, about)]
pub struct Cli {
    /// HTTP server bind address [env: CHATLINE_BIND] [default: 127.0.0.1:5001]
    #[arg(long, short = 'b', global = true)]
    pub bind: Option<String>,

    /// Data directory for the database [env: CHATLINE_HOME] [default: ~/.chatline]
    #[arg(long, short = 'd', global = true)]
    pub data_dir: Option<PathBuf>,

    /// Give up on a message store operation after this many milliseconds
    /// [env: CHATLINE_STORE_TIMEOUT_MS] [default: 5000]
    #[arg(long, global = true)]
    pub store_timeout_ms: Option<u64>,

    /// Directory for uploaded image/audio assets; unset stores raw payloads
    /// [env: CHATLINE_ASSET_DIR]
    #[arg(long, global = true)]
    pub asset_dir: Option<PathBuf>,

    /// URL prefix returned for uploaded assets [env: CHATLINE_ASSET_BASE_URL] [default: /assets]
    #[arg(long, global = true)]
    pub asset_base_url: Option<String>,

    /// Log filter used when RUST_LOG is unset [default: info]
    #[arg(long, global = true)]
    pub log: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the server (default).
    Serve,
    /// Create a user and print a session token for it.
    AddUser {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        avatar: Option<String>,
        /// Session lifetime in hours; omitted means the token never expires.
        #[arg(long)]
        ttl_hours: Option<u64>,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub data_dir: PathBuf,
    pub store_timeout: Duration,
    pub asset_dir: Option<PathBuf>,
    pub asset_base_url: String,
    pub log_filter: String,
}

impl Config {
    pub fn from_cli_and_env(cli: &Cli) -> Self {
        let data_dir = cli
            .data_dir
            .clone()
            .or_else(|| std::env::var("CHATLINE_HOME").ok().map(PathBuf::from))
            .unwrap_or_else(|| {
                std::env::var("HOME")
                    .map(|h| PathBuf::from(h).join(".chatline"))
                    .unwrap_or_else(|_| PathBuf::from(".chatline"))
            });

        let bind_addr = cli
            .bind
            .clone()
            .or_else(|| std::env::var("CHATLINE_BIND").ok())
            .unwrap_or_else(|| DEFAULT_BIND.to_string());

        let store_timeout_ms = cli
            .store_timeout_ms
            .or_else(|| {
                std::env::var("CHATLINE_STORE_TIMEOUT_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
            })
            .unwrap_or(DEFAULT_STORE_TIMEOUT_MS);

        let asset_dir = cli
            .asset_dir
            .clone()
            .or_else(|| std::env::var("CHATLINE_ASSET_DIR").ok().map(PathBuf::from));

        let asset_base_url = cli
            .asset_base_url
            .clone()
            .or_else(|| std::env::var("CHATLINE_ASSET_BASE_URL").ok())
            .unwrap_or_else(|| DEFAULT_ASSET_BASE_URL.to_string());

        let log_filter = cli.log.clone().unwrap_or_else(|| "info".to_string());

        Self {
            bind_addr,
            data_dir,
            store_timeout: Duration::from_millis(store_timeout_ms),
            asset_dir,
            asset_base_url,
            log_filter,
        }
    }
}
