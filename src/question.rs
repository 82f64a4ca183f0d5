use std::io::Cursor;

use bytes::{Buf, Bytes};
use tracing::instrument;

use crate::header::HEADER_LEN;
use crate::name::read_name;
use crate::{CacheKey, DnsError};

/// An inbound query, alive for the duration of one request
#[derive(Debug, Clone)]
pub struct Query {
    pub id: u16,
    pub name: String,
    pub type_: u16,
    /// The question section exactly as the client sent it
    pub question: Bytes,
    pub raw: Bytes,
}

impl Query {
    /// Reads the transaction id and the first question of a client datagram.
    /// The question must carry its type and class fields.
    #[instrument(level = "debug", skip_all)]
    pub fn parse(data: &[u8]) -> Result<Self, DnsError> {
        if data.len() < HEADER_LEN {
            return Err(DnsError::MalformedQuery(format!(
                "{} bytes is shorter than a header",
                data.len()
            )));
        }

        let mut bytes = Cursor::new(data);
        let id = bytes.get_u16();

        bytes.set_position(HEADER_LEN as u64);
        let name = read_name(&mut bytes).map_err(|e| DnsError::MalformedQuery(e.to_string()))?;

        if bytes.remaining() < 4 {
            return Err(DnsError::MalformedQuery(
                "question is missing its type or class".to_owned(),
            ));
        }

        let type_ = bytes.get_u16();
        let _class = bytes.get_u16();

        let raw = Bytes::copy_from_slice(data);
        let question = raw.slice(HEADER_LEN..bytes.position() as usize);

        Ok(Self {
            id,
            name,
            type_,
            question,
            raw,
        })
    }

    pub fn key(&self) -> CacheKey {
        CacheKey::new(self.type_, &self.name)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::name::write_name;

    pub(crate) fn query_bytes(id: u16, name: &str, type_: u16) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u16(id);
        // rd set
        buf.put_u16(0x0100);
        buf.put_u16(1);
        buf.put_u16(0);
        buf.put_u16(0);
        buf.put_u16(0);
        write_name(&mut buf, name).unwrap();
        buf.put_u16(type_);
        buf.put_u16(1);
        buf.to_vec()
    }

    #[test]
    fn parses_query() {
        let data = query_bytes(0x1234, "example.com", 1);
        let query = Query::parse(&data).unwrap();

        assert_eq!(query.id, 0x1234);
        assert_eq!(query.name, "example.com");
        assert_eq!(query.type_, 1);
        assert_eq!(&query.question[..], &data[12..]);
        assert_eq!(query.key(), CacheKey::new(1, "example.com"));
    }

    #[test]
    fn keeps_unsupported_types() {
        let data = query_bytes(7, "example.com", 15);
        assert_eq!(Query::parse(&data).unwrap().type_, 15);
    }

    #[test]
    fn keeps_case() {
        let data = query_bytes(7, "ExAmple.COM", 1);
        assert_eq!(Query::parse(&data).unwrap().name, "ExAmple.COM");
    }

    #[test]
    fn rejects_short_datagrams() {
        for len in [0, 1, 11, 12] {
            let data = vec![0u8; len];
            assert!(matches!(
                Query::parse(&data),
                Err(DnsError::MalformedQuery(_))
            ));
        }
    }

    #[test]
    fn rejects_label_overrun() {
        let mut data = query_bytes(1, "example.com", 1);
        data.truncate(16);
        assert!(matches!(
            Query::parse(&data),
            Err(DnsError::MalformedQuery(_))
        ));
    }

    #[test]
    fn rejects_missing_type() {
        let mut data = query_bytes(1, "example.com", 1);
        data.truncate(data.len() - 3);
        assert!(Query::parse(&data).is_err());
    }
}
