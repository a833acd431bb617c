use crate::avp::Avp;
use crate::dictionary::Dictionary;
use crate::error::{Error, Result};
use std::fmt;
use std::io::{Read, Seek, Write};

/// A Grouped AVP: a sequence of nested AVPs (RFC 6733 §4.4). Decoding walks
/// the dictionary's Rule set for the owning AVP's code the same way a
/// command body does, so a malformed group reports `MissingAvp` /
/// `InvalidAvpValue` against the nested AVP, not just a length mismatch.
#[derive(Debug, Clone)]
pub struct Grouped {
    avps: Vec<Avp>,
}

impl Grouped {
    pub fn new(avps: Vec<Avp>) -> Grouped {
        Grouped { avps }
    }

    pub fn avps(&self) -> &[Avp] {
        &self.avps
    }

    pub fn add(&mut self, avp: Avp) {
        self.avps.push(avp);
    }

    pub fn get(&self, code: u32) -> Option<&Avp> {
        self.avps.iter().find(|a| a.code() == code)
    }

    pub fn decode_from<R: Read + Seek>(reader: &mut R, len: usize, dict: &Dictionary) -> Result<Grouped> {
        let mut avps = Vec::new();
        let mut offset = 0usize;
        while offset < len {
            let avp = Avp::decode_from(reader, dict)?;
            offset += avp.wire_length() as usize;
            avps.push(avp);
        }
        if offset != len {
            return Err(Error::DecodeError(
                "invalid group AVP, length mismatch".into(),
            ));
        }
        Ok(Grouped { avps })
    }

    pub fn encode_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        for avp in &self.avps {
            avp.encode_to(writer)?;
        }
        Ok(())
    }

    pub fn length(&self) -> u32 {
        self.avps.iter().map(|avp| avp.wire_length()).sum()
    }
}

impl fmt::Display for Grouped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for avp in &self.avps {
            write!(f, "\n  {}", avp)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avp::{Avp, AvpValue};
    use crate::dictionary::Dictionary;

    #[test]
    fn test_encode_decode() {
        let dict = Dictionary::new_default();
        let group = Grouped::new(vec![
            Avp::new(416, None, false, false, AvpValue::Enumerated(super::super::enumerated::Enumerated::new(1))),
            Avp::new(415, None, false, false, AvpValue::Unsigned32(super::super::unsigned32::Unsigned32::new(1000))),
        ]);
        let mut encoded = Vec::new();
        group.encode_to(&mut encoded).unwrap();
        let mut cursor = std::io::Cursor::new(&encoded);
        let decoded = Grouped::decode_from(&mut cursor, encoded.len(), &dict).unwrap();
        assert_eq!(decoded.avps().len(), 2);
        assert_eq!(decoded.get(416).unwrap().code(), 416);
    }
}
