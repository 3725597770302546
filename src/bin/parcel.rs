//! Thin entry point for the interactive client binary.

use anyhow::Context;
use clap::Parser;
use parcel::client::{default_local_dir, help_text, is_local_command, ClientDriver};
use parcel::config::{ClientConfig, Target};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::new("info")).init();

    let config = ClientConfig::parse();
    let target = match Target::parse(&config.target) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let stream = match TcpStream::connect(&target.address).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("failed to connect to {}: {e}", target.address);
            std::process::exit(2);
        }
    };

    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut driver = ClientDriver::new(stream, default_local_dir());

    let greeting = driver.authenticate(target.username.as_deref(), &mut stdin).await.context("authentication failed")?;
    println!("{greeting}");

    loop {
        let mut line = String::new();
        let bytes_read = stdin.read_line(&mut line).await.context("failed reading from stdin")?;
        if bytes_read == 0 {
            break;
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            continue;
        }
        if is_local_command(line) {
            println!("{}", help_text());
            continue;
        }
        if line == "EXIT" {
            let _ = driver.send_command(line).await;
            break;
        }
        match driver.send_command(line).await {
            Ok(reply) => println!("{reply}"),
            Err(e) => println!("{}", e.to_wire()),
        }
    }

    Ok(())
}
