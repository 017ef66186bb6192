use anyhow::{Context, Result};
use clap::Parser;
use netpass_client::{
    broker::BrokerSession,
    config::{Config, FileConfig},
    context::ClientContext,
    dispatcher::Dispatcher,
    identity::IdentityResolver,
};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// CLI arguments for the tunnel client
#[derive(Parser, Debug)]
#[command(name = "netpass")]
#[command(about = "Expose local HTTP and WebSocket services through the NetPass broker", long_about = None)]
#[command(version)]
struct Args {
    /// JSON config file with api_key, host and auto_update
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Broker/API base URL, overrides the config file
    #[arg(long, env = "NETPASS_HOST")]
    host: Option<String>,

    /// API key for identity assignment, overrides the config file
    #[arg(short = 'k', long, env = "NETPASS_KEY")]
    api_key: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Local HTTP request timeout in seconds
    #[arg(long, default_value = "10")]
    request_timeout: u64,
}

impl Args {
    fn into_config(self) -> netpass_common::Result<Config> {
        let file = FileConfig::load(&self.config);
        let config = Config::resolve(file, self.host, self.api_key)?;
        Ok(config.with_request_timeout(Duration::from_secs(self.request_timeout)))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("NetPass client v{}", env!("CARGO_PKG_VERSION"));

    let config = args.into_config().context("Invalid configuration")?;
    info!("Broker: {}:{}", config.broker_domain, config.broker_port);
    if config.auto_update {
        warn!("auto_update is set, but this build does not update itself");
    }

    let identity = IdentityResolver::new(&config)?
        .resolve()
        .await
        .context("Cannot establish a client identity")?;
    let ctx = Arc::new(ClientContext::new(config, identity));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let session = BrokerSession::connect(ctx.clone())?;
    let dispatcher = Arc::new(Dispatcher::new(
        ctx.clone(),
        session.publisher(),
        shutdown_rx.clone(),
    )?);

    let mut broker = tokio::spawn(session.run(dispatcher, shutdown_rx));

    // Run until interrupted
    tokio::select! {
        result = &mut broker => {
            error!("Broker session exited: {:?}", result);
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down gracefully...");
        }
    }

    let _ = shutdown_tx.send(true);
    match broker.await {
        Ok(Ok(())) => info!("Disconnected"),
        Ok(Err(e)) => error!("Broker session failed: {}", e),
        Err(e) => error!("Broker task panicked: {}", e),
    }

    Ok(())
}
