use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::resolver::Resolver;
use crate::{Cache, DnsError, MAX_MESSAGE_LEN};

pub struct Server {
    socket: Arc<UdpSocket>,
    resolver: Arc<Resolver>,
    config: ServerConfig,
}

impl Server {
    /// Binds the listening socket. Failing to bind is the one fatal error.
    pub async fn bind(config: ServerConfig, cache: Arc<Cache>) -> Result<Self, DnsError> {
        let socket = UdpSocket::bind(config.listen)
            .await
            .map_err(|e| DnsError::Bind(config.listen, e))?;

        let resolver = Resolver::new(cache, config.upstream, config.upstream_timeout);

        Ok(Self::with_resolver(socket, resolver, config))
    }

    pub fn with_resolver(socket: UdpSocket, resolver: Resolver, config: ServerConfig) -> Self {
        Self {
            socket: Arc::new(socket),
            resolver: Arc::new(resolver),
            config,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, DnsError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn cache(&self) -> Arc<Cache> {
        Arc::clone(self.resolver.cache())
    }

    /// Serves queries until `shutdown` is cancelled, then sweeps the cache and
    /// writes a final snapshot. Queries still being resolved are left to finish
    /// on their own.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), DnsError> {
        info!(
            listen = %self.local_addr()?,
            upstream = %self.config.upstream,
            "dns server running"
        );

        let sweeper = tokio::spawn(sweep_periodically(
            self.cache(),
            self.config.cache_file.clone(),
            self.config.sweep_interval,
            shutdown.clone(),
        ));

        let in_flight = Arc::new(Semaphore::new(self.config.max_in_flight));
        let mut buf = [0; MAX_MESSAGE_LEN];

        loop {
            // Wait for a free slot before taking the next datagram off the socket
            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = Arc::clone(&in_flight).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let (len, client) = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok(received) => received,
                    Err(e) => {
                        // e.g. ICMP port unreachable from an earlier reply
                        debug!(error = %e, "receive failed");
                        continue;
                    }
                },
            };

            let data = Bytes::copy_from_slice(&buf[..len]);
            let socket = Arc::clone(&self.socket);
            let resolver = Arc::clone(&self.resolver);

            tokio::spawn(async move {
                let _permit = permit;
                match resolver.handle_request(&socket, &data, client).await {
                    Ok(outcome) => debug!(%client, ?outcome, "query answered"),
                    Err(e) => warn!(%client, error = %e, "query dropped"),
                }
            });
        }

        info!("no longer accepting queries");

        if let Err(e) = sweeper.await {
            error!(error = %e, "cache sweeper failed");
        }

        sweep_and_save(self.cache(), &self.config.cache_file).await;

        info!("dns server stopped");
        Ok(())
    }
}

async fn sweep_periodically(
    cache: Arc<Cache>,
    cache_file: PathBuf,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    // The first tick completes immediately
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("cache sweeper shutting down");
                break;
            }
            _ = interval.tick() => sweep_and_save(Arc::clone(&cache), &cache_file).await,
        }
    }
}

/// Sweeps expired records and writes the snapshot. Failures are logged only.
async fn sweep_and_save(cache: Arc<Cache>, cache_file: &Path) {
    let cache_file = cache_file.to_owned();

    let result = tokio::task::spawn_blocking(move || {
        let stats = cache.sweep();
        cache.save(&cache_file).map(|_| stats)
    })
    .await;

    match result {
        Ok(Ok(stats)) => info!(
            keys = stats.keys_remaining,
            expired = stats.expired,
            "cache swept"
        ),
        Ok(Err(e)) => warn!(error = %e, "cache snapshot not saved"),
        Err(e) => error!(error = %e, "cache sweep panicked"),
    }
}
