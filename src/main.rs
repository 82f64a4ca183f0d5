use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dncache::config::{self, ServerConfig};
use dncache::control::watch_commands;
use dncache::server::Server;
use dncache::Cache;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dncache")]
#[command(version)]
#[command(about = "Caching DNS forwarder. Type `exit` to stop it.")]
struct Cli {
    /// Address to listen on
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// UDP port to listen on
    #[arg(short, long, default_value_t = config::DEFAULT_PORT)]
    port: u16,

    /// Upstream resolver address
    #[arg(short, long, default_value_t = config::DEFAULT_UPSTREAM)]
    upstream: IpAddr,

    #[arg(long, default_value_t = config::DEFAULT_PORT)]
    upstream_port: u16,

    /// Seconds to wait for the upstream reply
    #[arg(short, long, default_value_t = config::DEFAULT_UPSTREAM_TIMEOUT.as_secs())]
    timeout: u64,

    /// Cache snapshot file
    #[arg(short, long, default_value = config::DEFAULT_CACHE_FILE)]
    cache_file: PathBuf,

    /// Seconds between cache sweeps
    #[arg(long, default_value_t = config::DEFAULT_SWEEP_INTERVAL.as_secs())]
    sweep_interval: u64,

    /// Queries resolved at once
    #[arg(long, default_value_t = config::DEFAULT_MAX_IN_FLIGHT)]
    max_in_flight: usize,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            listen: SocketAddr::new(self.bind, self.port),
            upstream: SocketAddr::new(self.upstream, self.upstream_port),
            upstream_timeout: Duration::from_secs(self.timeout),
            cache_file: self.cache_file,
            sweep_interval: Duration::from_secs(self.sweep_interval.max(1)),
            max_in_flight: self.max_in_flight.max(1),
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let cache = Arc::new(Cache::load(&config.cache_file));

    let server = Server::bind(config, cache).await.map_err(|e| {
        error!(error = %e, "could not start server");
        e
    })?;

    let shutdown = CancellationToken::new();

    tokio::spawn(watch_commands(
        BufReader::new(tokio::io::stdin()),
        shutdown.clone(),
    ));

    let interrupted = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, stopping server");
            interrupted.cancel();
        }
    });

    server.run(shutdown).await?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(serve(cli.into_config()));

    // A pending stdin read cannot be cancelled, so don't wait for it
    runtime.shutdown_background();

    result
}
