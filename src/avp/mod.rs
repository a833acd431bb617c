//! AVP format (RFC 6733 §4.1):
//!
//!   0                   1                   2                   3
//!   0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |                           AVP Code                           |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |    Flags      |                  AVP Length                  |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |                     Vendor-ID (optional)                     |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |    Data ...
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!
//! AVP Flags:
//!   0 1 2 3 4 5 6 7
//!  +-+-+-+-+-+-+-+-+  V(endor), M(andatory), P(rivate)
//!  |V M P r r r r r|  r(eserved)
//!  +-+-+-+-+-+-+-+-+

pub mod address;
pub mod enumerated;
pub mod float32;
pub mod float64;
pub mod group;
pub mod identity;
pub mod integer32;
pub mod integer64;
pub mod octetstring;
pub mod time;
pub mod unsigned32;
pub mod unsigned64;
pub mod uri;
pub mod utf8string;

use crate::dictionary::{AvpDataType, Dictionary};
use crate::error::{Error, Result};
use std::fmt;
use std::io::{Read, Seek, SeekFrom, Write};

use self::address::Address;
use self::enumerated::Enumerated;
use self::float32::Float32;
use self::float64::Float64;
use self::group::Grouped;
use self::identity::DiameterIdentity;
use self::integer32::Integer32;
use self::integer64::Integer64;
use self::octetstring::OctetString;
use self::time::Time;
use self::unsigned32::Unsigned32;
use self::unsigned64::Unsigned64;
use self::uri::DiameterUri;
use self::utf8string::UTF8String;

pub mod flags {
    pub const VENDOR: u8 = 0x80;
    pub const MANDATORY: u8 = 0x40;
    pub const PRIVATE: u8 = 0x20;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvpFlags {
    pub vendor: bool,
    pub mandatory: bool,
    pub private: bool,
}

impl AvpFlags {
    pub fn from_byte(b: u8) -> AvpFlags {
        AvpFlags {
            vendor: (b & flags::VENDOR) != 0,
            mandatory: (b & flags::MANDATORY) != 0,
            private: (b & flags::PRIVATE) != 0,
        }
    }

    pub fn to_byte(self) -> u8 {
        let mut b = 0u8;
        if self.vendor {
            b |= flags::VENDOR;
        }
        if self.mandatory {
            b |= flags::MANDATORY;
        }
        if self.private {
            b |= flags::PRIVATE;
        }
        b
    }
}

#[derive(Debug, Clone)]
pub struct AvpHeader {
    pub code: u32,
    pub flags: AvpFlags,
    pub length: u32,
    pub vendor_id: Option<u32>,
}

impl AvpHeader {
    pub fn decode_from<R: Read>(reader: &mut R) -> Result<AvpHeader> {
        let mut b = [0; 8];
        reader.read_exact(&mut b)?;

        let code = u32::from_be_bytes([b[0], b[1], b[2], b[3]]);
        let flags = AvpFlags::from_byte(b[4]);
        let length = u32::from_be_bytes([0, b[5], b[6], b[7]]);

        let vendor_id = if flags.vendor {
            let mut v = [0; 4];
            reader.read_exact(&mut v)?;
            Some(u32::from_be_bytes(v))
        } else {
            None
        };

        Ok(AvpHeader {
            code,
            flags,
            length,
            vendor_id,
        })
    }

    pub fn encode_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.code.to_be_bytes())?;
        writer.write_all(&[self.flags.to_byte()])?;
        writer.write_all(&self.length.to_be_bytes()[1..4])?;
        if let Some(vendor_id) = self.vendor_id {
            writer.write_all(&vendor_id.to_be_bytes())?;
        }
        Ok(())
    }

    pub fn wire_length(&self) -> u32 {
        if self.vendor_id.is_some() {
            12
        } else {
            8
        }
    }
}

#[derive(Debug, Clone)]
pub enum AvpValue {
    Address(Address),
    DiameterIdentity(DiameterIdentity),
    DiameterUri(DiameterUri),
    Enumerated(Enumerated),
    Float32(Float32),
    Float64(Float64),
    Grouped(Grouped),
    Integer32(Integer32),
    Integer64(Integer64),
    OctetString(OctetString),
    Time(Time),
    Unsigned32(Unsigned32),
    Unsigned64(Unsigned64),
    UTF8String(UTF8String),
}

impl AvpValue {
    pub fn length(&self) -> u32 {
        match self {
            AvpValue::Address(v) => v.length(),
            AvpValue::DiameterIdentity(v) => v.length(),
            AvpValue::DiameterUri(v) => v.length(),
            AvpValue::Enumerated(v) => v.length(),
            AvpValue::Float32(v) => v.length(),
            AvpValue::Float64(v) => v.length(),
            AvpValue::Grouped(v) => v.length(),
            AvpValue::Integer32(v) => v.length(),
            AvpValue::Integer64(v) => v.length(),
            AvpValue::OctetString(v) => v.length(),
            AvpValue::Time(v) => v.length(),
            AvpValue::Unsigned32(v) => v.length(),
            AvpValue::Unsigned64(v) => v.length(),
            AvpValue::UTF8String(v) => v.length(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            AvpValue::Address(_) => "Address",
            AvpValue::DiameterIdentity(_) => "DiameterIdentity",
            AvpValue::DiameterUri(_) => "DiameterURI",
            AvpValue::Enumerated(_) => "Enumerated",
            AvpValue::Float32(_) => "Float32",
            AvpValue::Float64(_) => "Float64",
            AvpValue::Grouped(_) => "Grouped",
            AvpValue::Integer32(_) => "Integer32",
            AvpValue::Integer64(_) => "Integer64",
            AvpValue::OctetString(_) => "OctetString",
            AvpValue::Time(_) => "Time",
            AvpValue::Unsigned32(_) => "Unsigned32",
            AvpValue::Unsigned64(_) => "Unsigned64",
            AvpValue::UTF8String(_) => "UTF8String",
        }
    }

    fn encode_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            AvpValue::Address(v) => v.encode_to(writer),
            AvpValue::DiameterIdentity(v) => v.encode_to(writer),
            AvpValue::DiameterUri(v) => v.encode_to(writer),
            AvpValue::Enumerated(v) => v.encode_to(writer),
            AvpValue::Float32(v) => v.encode_to(writer),
            AvpValue::Float64(v) => v.encode_to(writer),
            AvpValue::Grouped(v) => v.encode_to(writer),
            AvpValue::Integer32(v) => v.encode_to(writer),
            AvpValue::Integer64(v) => v.encode_to(writer),
            AvpValue::OctetString(v) => v.encode_to(writer),
            AvpValue::Time(v) => v.encode_to(writer),
            AvpValue::Unsigned32(v) => v.encode_to(writer),
            AvpValue::Unsigned64(v) => v.encode_to(writer),
            AvpValue::UTF8String(v) => v.encode_to(writer),
        }
    }
}

impl fmt::Display for AvpValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AvpValue::Address(v) => v.fmt(f),
            AvpValue::DiameterIdentity(v) => v.fmt(f),
            AvpValue::DiameterUri(v) => v.fmt(f),
            AvpValue::Enumerated(v) => v.fmt(f),
            AvpValue::Float32(v) => v.fmt(f),
            AvpValue::Float64(v) => v.fmt(f),
            AvpValue::Grouped(v) => v.fmt(f),
            AvpValue::Integer32(v) => v.fmt(f),
            AvpValue::Integer64(v) => v.fmt(f),
            AvpValue::OctetString(v) => v.fmt(f),
            AvpValue::Time(v) => v.fmt(f),
            AvpValue::Unsigned32(v) => v.fmt(f),
            AvpValue::Unsigned64(v) => v.fmt(f),
            AvpValue::UTF8String(v) => v.fmt(f),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Avp {
    header: AvpHeader,
    value: AvpValue,
    padding: u8,
}

fn pad_to_32_bits(length: u32) -> u8 {
    ((4 - (length & 0b11)) % 4) as u8
}

impl Avp {
    pub fn new(code: u32, vendor_id: Option<u32>, mandatory: bool, private: bool, value: AvpValue) -> Avp {
        let flags = AvpFlags {
            vendor: vendor_id.is_some(),
            mandatory,
            private,
        };
        let padding = pad_to_32_bits(value.length());
        let header_len = if vendor_id.is_some() { 12 } else { 8 };
        let header = AvpHeader {
            code,
            flags,
            length: header_len + value.length(),
            vendor_id,
        };
        Avp {
            header,
            value,
            padding,
        }
    }

    pub fn new_unsigned32(code: u32, vendor_id: Option<u32>, mandatory: bool, value: u32) -> Avp {
        Avp::new(code, vendor_id, mandatory, false, AvpValue::Unsigned32(Unsigned32::new(value)))
    }

    pub fn new_identity(code: u32, vendor_id: Option<u32>, mandatory: bool, value: &str) -> Avp {
        Avp::new(
            code,
            vendor_id,
            mandatory,
            false,
            AvpValue::DiameterIdentity(DiameterIdentity::new(value)),
        )
    }

    pub fn new_utf8string(code: u32, vendor_id: Option<u32>, mandatory: bool, value: &str) -> Avp {
        Avp::new(code, vendor_id, mandatory, false, AvpValue::UTF8String(UTF8String::new(value)))
    }

    pub fn new_enumerated(code: u32, vendor_id: Option<u32>, mandatory: bool, value: i32) -> Avp {
        Avp::new(code, vendor_id, mandatory, false, AvpValue::Enumerated(Enumerated::new(value)))
    }

    pub fn new_grouped(code: u32, vendor_id: Option<u32>, mandatory: bool, avps: Vec<Avp>) -> Avp {
        Avp::new(code, vendor_id, mandatory, false, AvpValue::Grouped(Grouped::new(avps)))
    }

    pub fn code(&self) -> u32 {
        self.header.code
    }

    pub fn vendor_id(&self) -> Option<u32> {
        self.header.vendor_id
    }

    pub fn flags(&self) -> &AvpFlags {
        &self.header.flags
    }

    pub fn value(&self) -> &AvpValue {
        &self.value
    }

    pub fn as_utf8string(&self) -> Option<&str> {
        match &self.value {
            AvpValue::UTF8String(v) => Some(v.value()),
            _ => None,
        }
    }

    pub fn as_identity(&self) -> Option<&str> {
        match &self.value {
            AvpValue::DiameterIdentity(v) => v.as_str().ok(),
            _ => None,
        }
    }

    pub fn as_unsigned32(&self) -> Option<u32> {
        match &self.value {
            AvpValue::Unsigned32(v) => Some(v.value()),
            _ => None,
        }
    }

    pub fn as_enumerated(&self) -> Option<i32> {
        match &self.value {
            AvpValue::Enumerated(v) => Some(v.value()),
            _ => None,
        }
    }

    pub fn as_grouped(&self) -> Option<&Grouped> {
        match &self.value {
            AvpValue::Grouped(v) => Some(v),
            _ => None,
        }
    }

    /// Total on-wire size including header and padding, used to advance a
    /// decode cursor and to compute a message's declared length.
    pub fn wire_length(&self) -> u32 {
        self.header.length + self.padding as u32
    }

    pub fn decode_from<R: Read + Seek>(reader: &mut R, dict: &Dictionary) -> Result<Avp> {
        let header = AvpHeader::decode_from(reader)?;
        let value_length = header
            .length
            .checked_sub(header.wire_length())
            .ok_or_else(|| Error::DecodeError("AVP length shorter than its header".into()))?;

        let data_type = dict.avp_data_type(header.code, header.vendor_id);

        let value = match data_type {
            Some(AvpDataType::Address) => AvpValue::Address(Address::decode_from(reader, value_length as usize)?),
            Some(AvpDataType::DiameterIdentity) => {
                AvpValue::DiameterIdentity(DiameterIdentity::decode_from(reader, value_length as usize)?)
            }
            Some(AvpDataType::DiameterUri) => {
                AvpValue::DiameterUri(DiameterUri::decode_from(reader, value_length as usize)?)
            }
            Some(AvpDataType::Enumerated) => AvpValue::Enumerated(Enumerated::decode_from(reader)?),
            Some(AvpDataType::Float32) => AvpValue::Float32(Float32::decode_from(reader)?),
            Some(AvpDataType::Float64) => AvpValue::Float64(Float64::decode_from(reader)?),
            Some(AvpDataType::Grouped) => {
                AvpValue::Grouped(Grouped::decode_from(reader, value_length as usize, dict)?)
            }
            Some(AvpDataType::Integer32) => AvpValue::Integer32(Integer32::decode_from(reader)?),
            Some(AvpDataType::Integer64) => AvpValue::Integer64(Integer64::decode_from(reader)?),
            Some(AvpDataType::Time) => AvpValue::Time(Time::decode_from(reader)?),
            Some(AvpDataType::Unsigned32) => AvpValue::Unsigned32(Unsigned32::decode_from(reader)?),
            Some(AvpDataType::Unsigned64) => AvpValue::Unsigned64(Unsigned64::decode_from(reader)?),
            Some(AvpDataType::UTF8String) => {
                AvpValue::UTF8String(UTF8String::decode_from(reader, value_length as usize)?)
            }
            // Unknown AVP codes (no dictionary entry) decode as raw OctetString
            // rather than failing the whole message, unless the M-bit forces
            // the caller to reject it (handled by the codec layer, spec §4.2).
            Some(AvpDataType::OctetString) | None => {
                AvpValue::OctetString(OctetString::decode_from(reader, value_length as usize)?)
            }
        };

        let padding = pad_to_32_bits(value_length);
        if padding > 0 {
            reader.seek(SeekFrom::Current(padding as i64))?;
        }

        Ok(Avp {
            header,
            value,
            padding,
        })
    }

    pub fn encode_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.header.encode_to(writer)?;
        self.value.encode_to(writer)?;
        for _ in 0..self.padding {
            writer.write_all(&[0])?;
        }
        Ok(())
    }
}

impl fmt::Display for Avp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let vendor = self.header.vendor_id.map(|v| v.to_string()).unwrap_or_default();
        write!(
            f,
            "{:<24} vendor={:<8} code={:<5} V={} M={} P={} type={:<16} value={}",
            "", // name resolution happens at the display layer (diameter::display), not here
            vendor,
            self.header.code,
            self.header.flags.vendor as u8,
            self.header.flags.mandatory as u8,
            self.header.flags.private as u8,
            self.value.type_name(),
            self.value
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_decode_encode_header() {
        let data = [
            0x00, 0x00, 0x00, 0x64, // code
            0x40, 0x00, 0x00, 0x0C, // flags, length
        ];

        let mut cursor = Cursor::new(&data);
        let header = AvpHeader::decode_from(&mut cursor).unwrap();

        assert_eq!(header.code, 100);
        assert_eq!(header.length, 12);
        assert!(!header.flags.vendor);
        assert!(header.flags.mandatory);
        assert_eq!(header.vendor_id, None);

        let mut encoded = Vec::new();
        header.encode_to(&mut encoded).unwrap();
        assert_eq!(encoded, data);
    }

    #[test]
    fn test_decode_encode_header_with_vendor() {
        let data = [
            0x00, 0x00, 0x00, 0x64, 0x80, 0x00, 0x00, 0x0C, 0x00, 0x00, 0x00, 0xC8,
        ];

        let mut cursor = Cursor::new(&data);
        let header = AvpHeader::decode_from(&mut cursor).unwrap();
        assert_eq!(header.vendor_id, Some(200));

        let mut encoded = Vec::new();
        header.encode_to(&mut encoded).unwrap();
        assert_eq!(encoded, data);
    }

    #[test]
    fn test_unknown_avp_falls_back_to_octetstring() {
        let dict = Dictionary::new_default();
        let avp = Avp::new(
            999999,
            None,
            false,
            false,
            AvpValue::OctetString(OctetString::new(vec![1, 2, 3, 4])),
        );
        let mut encoded = Vec::new();
        avp.encode_to(&mut encoded).unwrap();
        let mut cursor = Cursor::new(&encoded);
        let decoded = Avp::decode_from(&mut cursor, &dict).unwrap();
        assert_eq!(decoded.code(), 999999);
        assert!(matches!(decoded.value(), AvpValue::OctetString(_)));
    }
}
