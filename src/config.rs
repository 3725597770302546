//! CLI argument surfaces for the server and client binaries.

use clap::Parser;
use std::path::PathBuf;

/// The file store server.
#[derive(Parser, Debug)]
#[command(name = "parceld", about = "A small multi-user remote file store server")]
pub struct ServerConfig {
    /// Root directory to serve. Contains `users.json`, `public/`, and per-user homes.
    #[arg(long)]
    pub root: PathBuf,

    /// Port to listen on.
    #[arg(long, default_value_t = 9000)]
    pub port: u16,

    /// Optional path to write logs to, in addition to stderr.
    #[arg(long)]
    pub log: Option<PathBuf>,

    /// Raise the log filter to `debug`.
    #[arg(short, long)]
    pub verbose: bool,
}

/// The interactive file store client.
#[derive(Parser, Debug)]
#[command(name = "parcel", about = "A small multi-user remote file store client")]
pub struct ClientConfig {
    /// `[user@]host:port` of the server to connect to.
    pub target: String,
}

/// A parsed `[user@]host:port` client target.
#[derive(Debug, Eq, PartialEq)]
pub struct Target {
    /// Username to authenticate as, if given. `None` means public mode.
    pub username: Option<String>,
    /// The server's host and port.
    pub address: String,
}

impl Target {
    /// Parses a `ClientConfig::target` string.
    pub fn parse(raw: &str) -> anyhow::Result<Target> {
        match raw.split_once('@') {
            Some((user, address)) => {
                if user.is_empty() {
                    anyhow::bail!("username before '@' must not be empty");
                }
                Ok(Target {
                    username: Some(user.to_string()),
                    address: address.to_string(),
                })
            }
            None => Ok(Target {
                username: None,
                address: raw.to_string(),
            }),
        }
    }
}
