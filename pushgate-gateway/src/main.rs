//! Pushgate
//!
//! Accepts batched push requests over HTTP, fans them out per device
//! token, and delivers each one to APNs or FCM through a bounded
//! worker pool.

use anyhow::{anyhow, Context};
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use pushgate_config::AppConfig;
use pushgate_gateway::server::{self, SERVER_NAME};
use pushgate_gateway::Gateway;

#[derive(Parser, Debug)]
#[command(name = "pushgate", about = "multi-platform push notification gateway")]
struct Args {
    /// configuration file path
    #[arg(short = 'c', value_name = "FILE")]
    config: Option<String>,

    /// port number for the HTTP front-end
    #[arg(short = 'p', value_name = "PORT")]
    port: Option<String>,

    /// number of workers for push notification
    #[arg(short = 'w', value_name = "N")]
    workers: Option<usize>,

    /// size of internal queue for push notification
    #[arg(short = 'q', value_name = "N")]
    queue: Option<usize>,

    /// print version and exit
    #[arg(short = 'v')]
    version: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.version {
        println!("{} {}", SERVER_NAME, env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let mut config = AppConfig::load(args.config.as_deref())
        .map_err(|e| anyhow!("failed to load configuration: {}", e))?;
    config.apply_flags(args.port, args.workers, args.queue);

    pushgate_logging::init(SERVER_NAME, &config.log.level, &config.log.format);

    info!("Starting pushgate");

    let port: u16 = config
        .core
        .port
        .parse()
        .map_err(|_| anyhow!("invalid port: {}", config.core.port))?;

    let gateway = Arc::new(Gateway::init(config)?);

    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind port {}", port))?;

    info!(port, "pushgate listening");

    server::serve(gateway, listener).await
}
