use std::io::Cursor;

use bytes::{Buf, BufMut, BytesMut};
use itertools::Itertools;

use crate::DnsError;

const POINTER_TAG: u8 = 0b1100_0000;
const MAX_LABEL_LEN: usize = 63;

// Real messages never chain more than a handful of pointers.
// Anything beyond this is a loop.
const MAX_JUMPS: usize = 32;

/// Reads a possibly compressed domain name starting at the cursor position.
///
/// When the name contains a compression pointer the cursor is left just past
/// the first pointer, no matter how many further pointers were followed.
/// Otherwise it is left just past the terminating zero label.
pub fn read_name(bytes: &mut Cursor<&[u8]>) -> Result<String, DnsError> {
    let mut labels: Vec<String> = Vec::new();
    let mut resume_at: Option<u64> = None;
    let mut jumps = 0;

    loop {
        if !bytes.has_remaining() {
            return Err(DnsError::format("name runs past the end of the message"));
        }

        let len = bytes.get_u8();

        if len & POINTER_TAG == POINTER_TAG {
            // Compressed
            if !bytes.has_remaining() {
                return Err(DnsError::format("truncated compression pointer"));
            }

            let pointer = (((len & !POINTER_TAG) as u16) << 8) | (bytes.get_u8() as u16);

            if resume_at.is_none() {
                resume_at = Some(bytes.position());
            }

            jumps += 1;
            if jumps > MAX_JUMPS {
                return Err(DnsError::format("compression pointer loop"));
            }

            if pointer as usize >= bytes.get_ref().len() {
                return Err(DnsError::format(format!(
                    "compression pointer {pointer} outside the message"
                )));
            }

            bytes.set_position(pointer as u64);
            continue;
        }

        if len & POINTER_TAG != 0 {
            return Err(DnsError::format(format!("unknown label kind {len:#04x}")));
        }

        if len == 0 {
            break;
        }

        // Uncompressed
        let len = len as usize;
        if bytes.remaining() < len {
            return Err(DnsError::format("label runs past the end of the message"));
        }

        let chars = bytes.copy_to_bytes(len);
        let label = std::str::from_utf8(&chars)
            .map_err(|_| DnsError::format("label is not valid text"))?;
        labels.push(label.to_owned());
    }

    if let Some(position) = resume_at {
        bytes.set_position(position);
    }

    Ok(labels.iter().join("."))
}

/// Moves the cursor past a name without decoding its labels or following
/// pointers. Fails only when the name does not end inside the message.
pub fn skip_name(bytes: &mut Cursor<&[u8]>) -> Result<(), DnsError> {
    loop {
        if !bytes.has_remaining() {
            return Err(DnsError::format("name runs past the end of the message"));
        }

        let len = bytes.get_u8();

        if len & POINTER_TAG == POINTER_TAG {
            if !bytes.has_remaining() {
                return Err(DnsError::format("truncated compression pointer"));
            }
            bytes.advance(1);
            return Ok(());
        }

        if len & POINTER_TAG != 0 {
            return Err(DnsError::format(format!("unknown label kind {len:#04x}")));
        }

        if len == 0 {
            return Ok(());
        }

        if bytes.remaining() < len as usize {
            return Err(DnsError::format("label runs past the end of the message"));
        }
        bytes.advance(len as usize);
    }
}

/// Writes `name` as plain length-prefixed labels. Compression is never used.
pub fn write_name(buf: &mut BytesMut, name: &str) -> Result<(), DnsError> {
    // Empty labels only come from the root name or a trailing dot
    for label in name.split('.').filter(|l| !l.is_empty()) {
        if label.len() > MAX_LABEL_LEN {
            return Err(DnsError::format(format!("label too long in {name}")));
        }

        buf.put_u8(label.len() as u8);
        buf.extend_from_slice(label.as_bytes());
    }

    buf.put_u8(0);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(name: &str) -> Vec<u8> {
        let mut buf = BytesMut::new();
        write_name(&mut buf, name).unwrap();
        buf.to_vec()
    }

    #[test]
    fn writes_labels() {
        assert_eq!(
            encoded("www.example.com"),
            b"\x03www\x07example\x03com\x00".to_vec()
        );
        assert_eq!(encoded("example.com."), encoded("example.com"));
        assert_eq!(encoded(""), vec![0]);
    }

    #[test]
    fn rejects_long_labels() {
        let name = format!("{}.com", "a".repeat(64));
        assert!(write_name(&mut BytesMut::new(), &name).is_err());
    }

    #[test]
    fn reads_uncompressed() {
        let data = encoded("ns1.example.com");
        let mut cursor = Cursor::new(&data[..]);

        assert_eq!(read_name(&mut cursor).unwrap(), "ns1.example.com");
        assert_eq!(cursor.position() as usize, data.len());
    }

    #[test]
    fn follows_pointer_and_resumes_after_it() {
        // 2 bytes of padding, then example.com at offset 2, then www + pointer to it
        let mut data = vec![0xAA, 0xBB];
        data.extend(encoded("example.com"));
        let second = data.len();
        data.extend(b"\x03www\xC0\x02");
        data.push(0xFF);

        let mut cursor = Cursor::new(&data[..]);
        cursor.set_position(2);
        assert_eq!(read_name(&mut cursor).unwrap(), "example.com");

        cursor.set_position(second as u64);
        assert_eq!(read_name(&mut cursor).unwrap(), "www.example.com");
        // Past the 2 byte pointer, not past the pointed-to name
        assert_eq!(cursor.position() as usize, second + 6);
    }

    #[test]
    fn chained_pointers_resume_after_first() {
        let mut data = encoded("com");
        // offset 5: example + pointer to com
        data.extend(b"\x07example\xC0\x00");
        // offset 15: pointer straight to example.com
        let start = data.len();
        data.extend(b"\xC0\x05");

        let mut cursor = Cursor::new(&data[..]);
        cursor.set_position(start as u64);
        assert_eq!(read_name(&mut cursor).unwrap(), "example.com");
        assert_eq!(cursor.position() as usize, start + 2);
    }

    #[test]
    fn compressed_matches_uncompressed() {
        let plain = encoded("mail.example.org");
        let mut data = plain.clone();
        let start = data.len();
        data.extend(b"\xC0\x00");

        let mut a = Cursor::new(&data[..]);
        let mut b = Cursor::new(&data[..]);
        b.set_position(start as u64);

        assert_eq!(read_name(&mut a).unwrap(), read_name(&mut b).unwrap());
    }

    #[test]
    fn detects_pointer_loop() {
        let data = [0xC0, 0x00];
        let mut cursor = Cursor::new(&data[..]);
        assert!(read_name(&mut cursor).is_err());
    }

    #[test]
    fn skips_names_it_cannot_read() {
        // Not valid text, but well framed
        let mut data = vec![2, 0xFF, 0xFE, 0];
        // Looping pointer
        data.extend([0xC0, 0x04]);
        data.push(0xAA);

        let mut cursor = Cursor::new(&data[..]);
        assert!(read_name(&mut cursor).is_err());

        cursor.set_position(0);
        skip_name(&mut cursor).unwrap();
        assert_eq!(cursor.position(), 4);

        assert!(read_name(&mut cursor.clone()).is_err());
        skip_name(&mut cursor).unwrap();
        assert_eq!(cursor.position(), 6);
    }

    #[test]
    fn skip_detects_overrun() {
        for data in [&b"\x07exam"[..], &b"\x03com"[..], &[0xC0][..], &[0x40, 0][..]] {
            assert!(skip_name(&mut Cursor::new(data)).is_err());
        }
    }

    #[test]
    fn detects_overrun() {
        let data = b"\x07exam";
        let mut cursor = Cursor::new(&data[..]);
        assert!(read_name(&mut cursor).is_err());

        let data = b"\x03com";
        let mut cursor = Cursor::new(&data[..]);
        assert!(read_name(&mut cursor).is_err());

        let data = [0xC0, 0x40];
        let mut cursor = Cursor::new(&data[..]);
        assert!(read_name(&mut cursor).is_err());
    }
}
