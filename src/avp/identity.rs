use crate::avp::octetstring::OctetString;
use crate::error::{Error, Result};
use std::fmt;
use std::io::Read;
use std::io::Write;

/// A DiameterIdentity: an OctetString holding a fully-qualified host or realm
/// name (RFC 6733 §4.3.1). Compared case-insensitively per spec §3's
/// DiameterId rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiameterIdentity(OctetString);

impl DiameterIdentity {
    pub fn new(value: &str) -> DiameterIdentity {
        DiameterIdentity(OctetString::new(value.as_bytes().to_vec()))
    }

    pub fn as_str(&self) -> Result<&str> {
        std::str::from_utf8(self.0.value())
            .map_err(|e| Error::DecodeError(format!("invalid DiameterIdentity: {}", e)))
    }

    pub fn decode_from<R: Read>(reader: &mut R, len: usize) -> Result<DiameterIdentity> {
        Ok(DiameterIdentity(OctetString::decode_from(reader, len)?))
    }

    pub fn encode_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.0.encode_to(writer)
    }

    pub fn length(&self) -> u32 {
        self.0.length()
    }
}

impl fmt::Display for DiameterIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Ok(s) => write!(f, "{}", s),
            Err(_) => write!(f, "{}", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let avp = DiameterIdentity::new("host.example.com");
        let mut encoded = Vec::new();
        avp.encode_to(&mut encoded).unwrap();
        let mut cursor = std::io::Cursor::new(&encoded);
        let avp = DiameterIdentity::decode_from(&mut cursor, encoded.len()).unwrap();
        assert_eq!(avp.as_str().unwrap(), "host.example.com");
    }

    #[test]
    fn test_case_insensitive_eq() {
        let a = DiameterIdentity::new("Host.Example.com");
        let b = DiameterIdentity::new("host.example.com");
        assert_eq!(
            a.as_str().unwrap().to_ascii_lowercase(),
            b.as_str().unwrap().to_ascii_lowercase()
        );
    }
}
