//! Address format (RFC 6733 §4.3.1): a 2-byte AddressType followed by the
//! address itself. Only the IPv4 (1) and IPv6 (2) families used by the base
//! protocol's own AVPs (e.g. Host-IP-Address) are implemented.

use crate::error::{Error, Result};
use std::fmt;
use std::io::Read;
use std::io::Write;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

const ADDRESS_FAMILY_IPV4: u16 = 1;
const ADDRESS_FAMILY_IPV6: u16 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Address(IpAddr);

impl Address {
    pub fn new(value: IpAddr) -> Address {
        Address(value)
    }

    pub fn value(&self) -> IpAddr {
        self.0
    }

    pub fn decode_from<R: Read>(reader: &mut R, len: usize) -> Result<Address> {
        let mut b = vec![0u8; len];
        reader.read_exact(&mut b)?;
        if b.len() < 2 {
            return Err(Error::DecodeError("address AVP too short".into()));
        }
        let family = u16::from_be_bytes([b[0], b[1]]);
        match family {
            ADDRESS_FAMILY_IPV4 if b.len() == 6 => {
                Ok(Address(IpAddr::V4(Ipv4Addr::new(b[2], b[3], b[4], b[5]))))
            }
            ADDRESS_FAMILY_IPV6 if b.len() == 18 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&b[2..18]);
                Ok(Address(IpAddr::V6(Ipv6Addr::from(octets))))
            }
            _ => Err(Error::DecodeError(format!(
                "unsupported or malformed address family {}",
                family
            ))),
        }
    }

    pub fn encode_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        match self.0 {
            IpAddr::V4(v4) => {
                writer.write_all(&ADDRESS_FAMILY_IPV4.to_be_bytes())?;
                writer.write_all(&v4.octets())?;
            }
            IpAddr::V6(v6) => {
                writer.write_all(&ADDRESS_FAMILY_IPV6.to_be_bytes())?;
                writer.write_all(&v6.octets())?;
            }
        }
        Ok(())
    }

    pub fn length(&self) -> u32 {
        match self.0 {
            IpAddr::V4(_) => 6,
            IpAddr::V6(_) => 18,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_v4() {
        let addr = Address::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        let mut encoded = Vec::new();
        addr.encode_to(&mut encoded).unwrap();
        let mut cursor = std::io::Cursor::new(&encoded);
        let decoded = Address::decode_from(&mut cursor, encoded.len()).unwrap();
        assert_eq!(decoded.value(), addr.value());
    }

    #[test]
    fn test_encode_decode_v6() {
        let addr = Address::new(IpAddr::V6(Ipv6Addr::LOCALHOST));
        let mut encoded = Vec::new();
        addr.encode_to(&mut encoded).unwrap();
        let mut cursor = std::io::Cursor::new(&encoded);
        let decoded = Address::decode_from(&mut cursor, encoded.len()).unwrap();
        assert_eq!(decoded.value(), addr.value());
    }
}
