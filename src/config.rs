use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 53;
pub const DEFAULT_UPSTREAM: IpAddr = IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8));
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(120);
pub const DEFAULT_CACHE_FILE: &str = "cache.json";
pub const DEFAULT_MAX_IN_FLIGHT: usize = 1024;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the listening socket binds to
    pub listen: SocketAddr,
    pub upstream: SocketAddr,
    pub upstream_timeout: Duration,
    pub cache_file: PathBuf,
    pub sweep_interval: Duration,
    /// Queries resolved concurrently before the receive loop waits
    pub max_in_flight: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            upstream: SocketAddr::new(DEFAULT_UPSTREAM, DEFAULT_PORT),
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
            cache_file: PathBuf::from(DEFAULT_CACHE_FILE),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}
