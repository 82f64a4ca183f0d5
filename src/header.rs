use std::io::Cursor;

use bitfield::bitfield;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::{instrument, warn};

use super::Networkable;
use crate::DnsError;

pub const HEADER_LEN: usize = 12;

bitfield! {
    #[derive(Clone, Copy, Default)]
    pub struct Flags(u16);
    impl Debug;
    u8;
    // query or response
    pub qr, set_qr: 15;
    // query type
    pub opcode, set_opcode: 14, 11;
    // authoritative answerer
    pub aa, set_aa: 10;
    // truncation
    pub tc, set_tc: 9;
    // recursion desired
    pub rd, set_rd: 8;
    // recursion available
    pub ra, set_ra: 7;
    // reserved
    pub z, set_z: 6;
    pub ad, set_ad: 5;
    pub cd, set_cd: 4;
    // response code
    pub rcode, set_rcode: 3, 0;
}

impl Flags {
    /// Standard response with recursion desired and available, no error (0x8180)
    pub fn response() -> Self {
        let mut flags = Self::default();
        flags.set_qr(true);
        flags.set_rd(true);
        flags.set_ra(true);
        flags
    }

    pub fn bits(&self) -> u16 {
        self.0
    }
}

#[derive(Debug, Default)]
pub struct Header {
    pub id: u16,
    pub flags: Flags,
    pub num_questions: u16,
    pub num_answers: u16,
    pub num_authorities: u16,
    pub num_additionals: u16,
}

impl Header {
    pub fn new(id: u16, flags: Flags) -> Self {
        Self {
            id,
            flags,
            ..Default::default()
        }
    }
}

impl Networkable for Header {
    #[instrument(level = "trace", skip_all)]
    fn to_bytes(&self) -> Bytes {
        let mut ret = BytesMut::with_capacity(HEADER_LEN);
        ret.put_u16(self.id);
        ret.put_u16(self.flags.bits());
        ret.put_u16(self.num_questions);
        ret.put_u16(self.num_answers);
        ret.put_u16(self.num_authorities);
        ret.put_u16(self.num_additionals);

        ret.into()
    }

    #[instrument(level = "trace", skip_all)]
    fn from_bytes(bytes: &mut Cursor<&[u8]>) -> Result<Self, DnsError> {
        if bytes.remaining() < HEADER_LEN {
            warn!("insufficient remaining bytes");
            return Err(DnsError::format("message shorter than a header"));
        }

        let id = bytes.get_u16();
        let flags = Flags(bytes.get_u16());
        let qd_count = bytes.get_u16();
        let an_count = bytes.get_u16();
        let ns_count = bytes.get_u16();
        let ar_count = bytes.get_u16();

        Ok(Self {
            id,
            flags,
            num_questions: qd_count,
            num_answers: an_count,
            num_authorities: ns_count,
            num_additionals: ar_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_flags_match_standard_reply() {
        assert_eq!(Flags::response().bits(), 0x8180);
        assert_eq!(Flags::response().rcode(), 0);
    }

    #[test]
    fn header_round_trip() {
        let mut header = Header::new(0xBEEF, Flags::response());
        header.num_questions = 1;
        header.num_answers = 3;

        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(&bytes[..4], &[0xBE, 0xEF, 0x81, 0x80]);

        let parsed = Header::from_bytes(&mut Cursor::new(&bytes[..])).unwrap();
        assert_eq!(parsed.id, 0xBEEF);
        assert_eq!(parsed.num_questions, 1);
        assert_eq!(parsed.num_answers, 3);
        assert_eq!(parsed.num_additionals, 0);
        assert!(parsed.flags.qr());
    }

    #[test]
    fn short_header_is_rejected() {
        let data = [0u8; 11];
        assert!(Header::from_bytes(&mut Cursor::new(&data[..])).is_err());
    }
}
