//! Thin entry point for the server binary: parse configuration, set up logging, serve.

use anyhow::Context;
use clap::Parser;
use parcel::config::ServerConfig;
use parcel::credentials::Credentials;
use parcel::filelocks::FileLocks;
use parcel::journal::TransferJournal;
use parcel::session::Shared;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();
    init_logging(&config)?;

    if !config.root.is_dir() {
        tokio::fs::create_dir_all(&config.root)
            .await
            .with_context(|| format!("failed to create root directory {}", config.root.display()))?;
    }
    tokio::fs::create_dir_all(config.root.join("public"))
        .await
        .context("failed to create the public directory")?;

    let credentials = Credentials::load(&config.root).await.context("failed to load users.json")?;
    let shared = Shared {
        root: config.root.clone(),
        credentials: Arc::new(credentials),
        locks: FileLocks::new(),
        journal: TransferJournal::new(),
    };

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse().context("failed to build listen address")?;
    parcel::reactor::serve(addr, shared).await.context("server loop exited with an error")?;
    Ok(())
}

fn init_logging(config: &ServerConfig) -> anyhow::Result<()> {
    let default_level = if config.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match &config.log {
        Some(path) => {
            let file = std::fs::File::create(path).with_context(|| format!("failed to open log file {}", path.display()))?;
            subscriber.with_writer(std::sync::Mutex::new(file)).init();
        }
        None => subscriber.init(),
    }
    Ok(())
}
