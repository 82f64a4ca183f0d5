use std::io::Cursor;

use bytes::{Buf, Bytes, BytesMut};
use tracing::{debug, instrument, warn};

use super::Networkable;
use crate::header::{Flags, Header, HEADER_LEN};
use crate::name::{read_name, skip_name};
use crate::record::decode_rdata;
use crate::{DnsError, Query, RecordType, ResourceRecord};

/// Largest message a client accepts over plain UDP
pub const MAX_MESSAGE_LEN: usize = 512;

const RECORD_HEADER_LEN: usize = 10;

enum Entry {
    Record(ResourceRecord),
    Unsupported(u16),
    Undecodable(DnsError),
}

/// Reads one record. An `Err` means the message framing itself is broken and
/// the cursor can no longer be trusted; an unreadable owner name or rdata is
/// reported as `Entry::Undecodable` with the cursor already past the record.
fn read_entry(bytes: &mut Cursor<&[u8]>, now: f64) -> Result<Entry, DnsError> {
    let start = bytes.position();
    let name = match read_name(bytes) {
        Ok(name) => Ok(name),
        Err(e) => {
            bytes.set_position(start);
            skip_name(bytes)?;
            Err(e)
        }
    };

    if bytes.remaining() < RECORD_HEADER_LEN {
        return Err(DnsError::format("record header runs past the end of the message"));
    }

    let type_ = bytes.get_u16();
    let _class = bytes.get_u16();
    let ttl = bytes.get_u32();
    let rd_length = bytes.get_u16();

    let rdata_start = bytes.position();
    let rdata_end = rdata_start + rd_length as u64;
    if rdata_end > bytes.get_ref().len() as u64 {
        return Err(DnsError::format("rdata runs past the end of the message"));
    }

    let entry = match (name, RecordType::try_from(type_)) {
        (Err(e), _) => Entry::Undecodable(e),
        (Ok(name), Ok(type_)) => match decode_rdata(type_, rd_length, bytes) {
            Ok(data) => Entry::Record(ResourceRecord::new(name, type_, data, ttl, now)),
            Err(e) => Entry::Undecodable(e),
        },
        (Ok(_), Err(_)) => Entry::Unsupported(type_),
    };

    // Name-valued rdata leaves the cursor wherever its pointers ended
    bytes.set_position(rdata_end);

    Ok(entry)
}

/// Decodes the answer, authority and additional sections of an upstream reply.
///
/// Records of unsupported types are skipped, as are records whose owner name
/// or rdata cannot be decoded. If the framing breaks part way through, the
/// records read so far are returned.
#[instrument(level = "debug", skip_all)]
pub fn extract_records(data: &[u8], now: f64) -> Result<Vec<ResourceRecord>, DnsError> {
    let mut bytes = Cursor::new(data);
    let header = Header::from_bytes(&mut bytes)?;

    for _ in 0..header.num_questions {
        read_name(&mut bytes)?;
        if bytes.remaining() < 4 {
            return Err(DnsError::format("question runs past the end of the message"));
        }
        bytes.advance(4);
    }

    let sections = [
        ("answer", header.num_answers),
        ("authority", header.num_authorities),
        ("additional", header.num_additionals),
    ];

    let mut records = Vec::new();

    for (section, count) in sections {
        for _ in 0..count {
            match read_entry(&mut bytes, now) {
                Ok(Entry::Record(record)) => records.push(record),
                Ok(Entry::Unsupported(type_)) => {
                    debug!(section, type_, "skipping record of unsupported type");
                }
                Ok(Entry::Undecodable(e)) => {
                    warn!(section, error = %e, "skipping undecodable record");
                }
                Err(e) => {
                    warn!(section, error = %e, "reply framing broken, keeping records read so far");
                    return Ok(records);
                }
            }
        }
    }

    Ok(records)
}

/// Synthesizes a reply to `query` from cached records.
///
/// Every answer advertises its remaining ttl. Records with no time left, or
/// whose data cannot be encoded, are left out and the answer count only covers
/// what was written. If the answers do not fit in a UDP message the rest are
/// dropped and the truncation flag is set.
#[instrument(level = "debug", skip_all)]
pub fn build_response(query: &Query, records: &[ResourceRecord], now: f64) -> Bytes {
    let mut flags = Flags::response();
    let mut answers = BytesMut::new();
    let mut num_answers: u16 = 0;

    let budget = MAX_MESSAGE_LEN.saturating_sub(HEADER_LEN + query.question.len());

    for record in records {
        let ttl = record.remaining_ttl(now);
        if ttl == 0 {
            continue;
        }

        let mut answer = BytesMut::new();
        if let Err(e) = record.write_answer(&mut answer, ttl) {
            warn!(name = %record.name, error = %e, "leaving unencodable record out of reply");
            continue;
        }

        if answers.len() + answer.len() > budget {
            flags.set_tc(true);
            break;
        }

        answers.extend_from_slice(&answer);
        num_answers += 1;
    }

    let mut header = Header::new(query.id, flags);
    header.num_questions = 1;
    header.num_answers = num_answers;

    let mut response = BytesMut::with_capacity(HEADER_LEN + query.question.len() + answers.len());
    response.extend_from_slice(&header.to_bytes());
    response.extend_from_slice(&query.question);
    response.extend_from_slice(&answers);

    response.into()
}
