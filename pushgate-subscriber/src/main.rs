//! Pushgate Subscriber
//!
//! Consumes batched push requests from the message bus and delivers
//! them through the same pipeline as the HTTP front-end, draining
//! fully per envelope.

use anyhow::anyhow;
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use pushgate_bus::NatsBus;
use pushgate_config::AppConfig;
use pushgate_gateway::Gateway;
use pushgate_subscriber::Subscriber;

#[derive(Parser, Debug)]
#[command(name = "pushgate-subscriber", about = "message-bus adapter for pushgate")]
struct Args {
    /// configuration file path
    #[arg(short = 'c', value_name = "FILE")]
    config: Option<String>,

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
        println!("pushgate-subscriber {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let mut config = AppConfig::load(args.config.as_deref())
        .map_err(|e| anyhow!("failed to load configuration: {}", e))?;
    config.apply_flags(None, args.workers, args.queue);

    pushgate_logging::init("pushgate-subscriber", &config.log.level, &config.log.format);

    info!("Starting pushgate subscriber");

    let bus = NatsBus::new(&config.bus.url, &config.bus.subject)
        .await
        .map_err(|e| anyhow!("failed to connect to message bus: {}", e))?;

    let gateway = Arc::new(Gateway::init(config)?);
    let subscriber = Subscriber::new(Arc::new(bus), Arc::clone(&gateway));

    info!("pushgate subscriber running. Press Ctrl+C to stop.");

    tokio::select! {
        result = subscriber.run() => {
            if let Err(err) = result {
                error!(error = %err, "Subscriber error");
            }
        }
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    gateway.shutdown().await;
    info!("pushgate subscriber stopped");

    Ok(())
}
