use crate::avp::octetstring::OctetString;
use crate::error::{Error, Result};
use std::fmt;
use std::io::Read;
use std::io::Write;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiameterUri(OctetString);

impl DiameterUri {
    pub fn new(value: &str) -> DiameterUri {
        DiameterUri(OctetString::new(value.as_bytes().to_vec()))
    }

    pub fn as_str(&self) -> Result<&str> {
        std::str::from_utf8(self.0.value())
            .map_err(|e| Error::DecodeError(format!("invalid DiameterURI: {}", e)))
    }

    pub fn decode_from<R: Read>(reader: &mut R, len: usize) -> Result<DiameterUri> {
        Ok(DiameterUri(OctetString::decode_from(reader, len)?))
    }

    pub fn encode_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.0.encode_to(writer)
    }

    pub fn length(&self) -> u32 {
        self.0.length()
    }
}

impl fmt::Display for DiameterUri {
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
        let avp = DiameterUri::new("aaa://host.example.com:3868");
        let mut encoded = Vec::new();
        avp.encode_to(&mut encoded).unwrap();
        let mut cursor = std::io::Cursor::new(&encoded);
        let avp = DiameterUri::decode_from(&mut cursor, encoded.len()).unwrap();
        assert_eq!(avp.as_str().unwrap(), "aaa://host.example.com:3868");
    }
}
