use std::fmt::Display;

use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;
use serde::{Deserialize, Serialize};

use crate::DnsError;

/// The record types the codec can decode, cache and re-encode.
/// Anything else is forwarded untouched but never cached.
#[derive(FromPrimitive, Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
pub enum RecordType {
    A = 1,
    Ns = 2,
    Ptr = 12,
    Aaaa = 28,
}

impl RecordType {
    pub fn to_int(self) -> u16 {
        self as u16
    }
}

impl From<RecordType> for u16 {
    fn from(value: RecordType) -> Self {
        value.to_int()
    }
}

impl TryFrom<u16> for RecordType {
    type Error = DnsError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::from_u16(value).ok_or(DnsError::UnsupportedType(value))
    }
}

impl Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::A => "A",
            Self::Ns => "NS",
            Self::Ptr => "PTR",
            Self::Aaaa => "AAAA",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::RecordType;

    #[test]
    fn converts_supported_codes() {
        assert_eq!(RecordType::try_from(1).unwrap(), RecordType::A);
        assert_eq!(RecordType::try_from(2).unwrap(), RecordType::Ns);
        assert_eq!(RecordType::try_from(12).unwrap(), RecordType::Ptr);
        assert_eq!(RecordType::try_from(28).unwrap(), RecordType::Aaaa);
        assert_eq!(RecordType::Aaaa.to_int(), 28);
    }

    #[test]
    fn rejects_unsupported_codes() {
        // CNAME, MX, TXT
        for code in [5, 15, 16, 0, 65535] {
            assert!(RecordType::try_from(code).is_err());
        }
    }

    #[test]
    fn serializes_as_number() {
        assert_eq!(serde_json::to_string(&RecordType::Ptr).unwrap(), "12");
        let t: RecordType = serde_json::from_str("28").unwrap();
        assert_eq!(t, RecordType::Aaaa);
        assert!(serde_json::from_str::<RecordType>("5").is_err());
    }
}
