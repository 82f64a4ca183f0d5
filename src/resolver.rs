use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::{
    build_response, extract_records, unix_now, Cache, DnsError, Query, MAX_MESSAGE_LEN,
};

type Clock = Arc<dyn Fn() -> f64 + Send + Sync>;

/// How a query was answered. `answers` counts the records actually sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    CacheHit { answers: usize },
    Forwarded { cached: usize },
}

/// Answers queries from the cache, forwarding misses to a single upstream
pub struct Resolver {
    cache: Arc<Cache>,
    upstream: SocketAddr,
    timeout: Duration,
    clock: Clock,
}

impl Resolver {
    pub fn new(cache: Arc<Cache>, upstream: SocketAddr, timeout: Duration) -> Self {
        Self {
            cache,
            upstream,
            timeout,
            clock: Arc::new(unix_now),
        }
    }

    /// Replaces the wall clock used for freshness checks and insert timestamps
    pub fn with_clock(mut self, clock: impl Fn() -> f64 + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    /// Resolves one client datagram and sends the reply through `socket`.
    ///
    /// Malformed queries and upstream failures are returned as errors without
    /// anything being sent; the client is expected to retransmit.
    #[instrument(level = "debug", skip(self, socket, data))]
    pub async fn handle_request(
        &self,
        socket: &UdpSocket,
        data: &[u8],
        client: SocketAddr,
    ) -> Result<Outcome, DnsError> {
        let query = Query::parse(data)?;
        let now = (self.clock)();

        // Records in their last fraction of a second would go out with a zero ttl
        let fresh: Vec<_> = self
            .cache
            .lookup_at(&query.key(), now)
            .into_iter()
            .filter(|r| r.remaining_ttl(now) > 0)
            .collect();

        if !fresh.is_empty() {
            debug!(name = %query.name, type_ = query.type_, "cache hit");
            let response = build_response(&query, &fresh, now);
            socket.send_to(&response, client).await?;
            // Unencodable or truncated records are not in the reply
            let answers = u16::from_be_bytes([response[6], response[7]]) as usize;
            return Ok(Outcome::CacheHit { answers });
        }

        debug!(name = %query.name, type_ = query.type_, "cache miss");
        let reply = self.forward(&query).await?;

        // The client gets whatever upstream said, even if we cannot decode it
        if let Err(e) = socket.send_to(&reply, client).await {
            warn!(%client, error = %e, "failed to pass upstream reply on");
        }

        let records = match extract_records(&reply, (self.clock)()) {
            Ok(records) => records,
            Err(e) => {
                warn!(name = %query.name, error = %e, "not caching undecodable reply");
                Vec::new()
            }
        };

        let cached = records.len();
        self.cache.extend(records);

        Ok(Outcome::Forwarded { cached })
    }

    /// Sends the raw query upstream and waits for the matching reply.
    /// A single attempt is made; there is no retry.
    pub async fn forward(&self, query: &Query) -> Result<Bytes, DnsError> {
        let unreachable = |e| DnsError::UpstreamUnreachable(self.upstream, e);

        let bind_addr: SocketAddr = if self.upstream.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let sock = UdpSocket::bind(bind_addr).await.map_err(unreachable)?;
        // Only datagrams from the upstream are delivered on a connected socket
        sock.connect(self.upstream).await.map_err(unreachable)?;
        sock.send(&query.raw).await.map_err(unreachable)?;

        let deadline = Instant::now() + self.timeout;
        let mut buf = [0; MAX_MESSAGE_LEN];

        loop {
            let len = match tokio::time::timeout_at(deadline, sock.recv(&mut buf)).await {
                Ok(received) => received.map_err(unreachable)?,
                Err(_) => return Err(DnsError::UpstreamTimeout(self.upstream, self.timeout)),
            };

            if len >= 2 && u16::from_be_bytes([buf[0], buf[1]]) == query.id {
                return Ok(Bytes::copy_from_slice(&buf[..len]));
            }

            debug!(len, "ignoring upstream datagram for another transaction");
        }
    }
}
