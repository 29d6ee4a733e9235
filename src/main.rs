use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing_subscriber::EnvFilter;

use podrelay::config::Config;
use podrelay::k8s::source::InventorySource;
use podrelay::k8s::watch::KubeSource;
use podrelay::session::supervisor::Supervisor;
use podrelay::synthetic::SyntheticSource;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// host:port of the collector to relay to
    #[arg(long, default_value = "localhost:8712")]
    server_address: String,

    /// Generate synthetic inventory instead of watching a cluster
    #[arg(long)]
    synthetic: bool,

    /// Log the relay's lifecycle and every outbound event
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> podrelay::error::Result<()> {
    let args = Args::parse();
    let config = Config {
        collector_addr: args.server_address,
        synthetic: args.synthetic,
        verbose: args.verbose,
    };
    init_tracing(config.verbose);

    let source: Box<dyn InventorySource> = if config.synthetic {
        Box::new(SyntheticSource::new())
    } else {
        let client = podrelay::k8s::client::new(podrelay::k8s::USER_AGENT).await?;
        Box::new(KubeSource::new(client))
    };

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => shutdown.cancel(),
            Err(e) => error!("Failed to listen for shutdown: {e}"),
        }
    });

    Supervisor::new(config, source).run(cancel).await;
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        concat!(env!("CARGO_PKG_NAME"), "=debug")
    } else {
        concat!(env!("CARGO_PKG_NAME"), "=warn")
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}
