use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DnsError {
    /// Wire data ran out or a label was not valid text
    #[error("format error: {0}")]
    Format(String),

    #[error("malformed query: {0}")]
    MalformedQuery(String),

    #[error("could not decode record: {0}")]
    RecordDecode(String),

    #[error("unsupported record type {0}")]
    UnsupportedType(u16),

    #[error("no reply from upstream {0} within {1:?}")]
    UpstreamTimeout(SocketAddr, Duration),

    #[error("upstream {0} unreachable: {1}")]
    UpstreamUnreachable(SocketAddr, #[source] std::io::Error),

    #[error("cache snapshot {0} is corrupt: {1}")]
    SnapshotCorrupt(PathBuf, #[source] serde_json::Error),

    #[error("failed to write cache snapshot {0}: {1}")]
    SnapshotWrite(PathBuf, #[source] std::io::Error),

    #[error("failed to bind {0}: {1}")]
    Bind(SocketAddr, #[source] std::io::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DnsError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }
}
