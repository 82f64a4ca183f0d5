use std::io::Cursor;
use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::name::{read_name, write_name};
use crate::{CacheKey, DnsError, RecordType};

const CLASS_IN: u16 = 1;

/// A decoded answer, authority or additional record as obtained from upstream.
/// Records are never mutated; a re-fetch produces a fresh record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: RecordType,
    /// Dotted quad, IPv6 text form or domain name depending on the type
    pub data: String,
    /// Seconds, as received
    pub ttl: u32,
    /// Unix seconds at which the record was obtained
    #[serde(rename = "timestamp")]
    pub inserted_at: f64,
}

impl ResourceRecord {
    pub fn new(
        name: impl Into<String>,
        type_: RecordType,
        data: impl Into<String>,
        ttl: u32,
        inserted_at: f64,
    ) -> Self {
        Self {
            name: name.into(),
            type_,
            data: data.into(),
            ttl,
            inserted_at,
        }
    }

    pub fn key(&self) -> CacheKey {
        CacheKey::new(self.type_.to_int(), &self.name)
    }

    pub fn is_expired(&self, now: f64) -> bool {
        now - self.inserted_at >= self.ttl as f64
    }

    /// Whole seconds left before expiry, never negative and never above the original ttl
    pub fn remaining_ttl(&self, now: f64) -> u32 {
        let age = (now - self.inserted_at).max(0.0);
        (self.ttl as f64 - age).max(0.0) as u32
    }

    /// Writes the record as an uncompressed answer advertising `ttl`
    pub fn write_answer(&self, buf: &mut BytesMut, ttl: u32) -> Result<(), DnsError> {
        // Encode rdata first so a bad record leaves nothing behind in `buf`
        let rdata = encode_rdata(self.type_, &self.data)?;

        let mut answer = BytesMut::new();
        write_name(&mut answer, &self.name)?;
        answer.put_u16(self.type_.to_int());
        answer.put_u16(CLASS_IN);
        answer.put_u32(ttl);
        answer.put_u16(rdata.len() as u16);
        answer.extend_from_slice(&rdata);

        buf.extend_from_slice(&answer);
        Ok(())
    }
}

/// Decodes `rd_length` bytes of rdata at the cursor into its text form.
/// Name-valued rdata may point anywhere in the message behind the cursor.
pub fn decode_rdata(
    type_: RecordType,
    rd_length: u16,
    bytes: &mut Cursor<&[u8]>,
) -> Result<String, DnsError> {
    let rd_length = rd_length as usize;
    if bytes.remaining() < rd_length {
        return Err(DnsError::RecordDecode(format!(
            "{type_} rdata of {rd_length} bytes runs past the end of the message"
        )));
    }

    match type_ {
        RecordType::A => {
            if rd_length != 4 {
                return Err(DnsError::RecordDecode(format!(
                    "A rdata must be 4 bytes, got {rd_length}"
                )));
            }
            Ok(Ipv4Addr::from(bytes.get_u32()).to_string())
        }
        RecordType::Aaaa => {
            if rd_length != 16 {
                return Err(DnsError::RecordDecode(format!(
                    "AAAA rdata must be 16 bytes, got {rd_length}"
                )));
            }
            Ok(Ipv6Addr::from(bytes.get_u128()).to_string())
        }
        RecordType::Ns | RecordType::Ptr => {
            let rdata_end = bytes.position() + rd_length as u64;
            let name = read_name(bytes).map_err(|e| DnsError::RecordDecode(e.to_string()))?;
            if bytes.position() > rdata_end {
                return Err(DnsError::RecordDecode(format!(
                    "{type_} name overruns its {rd_length} byte rdata"
                )));
            }
            Ok(name)
        }
    }
}

pub fn encode_rdata(type_: RecordType, data: &str) -> Result<Bytes, DnsError> {
    let mut ret = BytesMut::new();

    match type_ {
        RecordType::A => {
            let addr: Ipv4Addr = data
                .parse()
                .map_err(|_| DnsError::format(format!("bad A data {data:?}")))?;
            ret.put_u32(addr.into());
        }
        RecordType::Aaaa => {
            let addr: Ipv6Addr = data
                .parse()
                .map_err(|_| DnsError::format(format!("bad AAAA data {data:?}")))?;
            ret.put_u128(addr.into());
        }
        RecordType::Ns | RecordType::Ptr => write_name(&mut ret, data)?,
    }

    Ok(ret.into())
}
