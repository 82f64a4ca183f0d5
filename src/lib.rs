use std::io::Cursor;

use bytes::Bytes;

mod error;
pub use error::DnsError;

mod header;
pub use header::{Flags, Header};

mod name;
pub use name::{read_name, write_name};

mod message;
pub use message::{build_response, extract_records, MAX_MESSAGE_LEN};

mod question;
pub use question::Query;

mod record;
pub use record::ResourceRecord;

mod record_type;
pub use record_type::RecordType;

pub mod cache;
pub use cache::{Cache, CacheKey};

pub mod config;
pub mod control;
pub mod resolver;
pub mod server;

pub trait Networkable: Sized {
    fn to_bytes(&self) -> Bytes;

    fn from_bytes(bytes: &mut Cursor<&[u8]>) -> Result<Self, DnsError>;
}

/// Wall clock time as fractional unix seconds, the timestamp unit of cached records
pub fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
