//! Diameter message and header model (RFC 6733 §3).
//!
//! Raw packet format:
//!   0                   1                   2                   3
//!   0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |    Version    |                 Message Length                |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  | command flags |                  Command-Code                 |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |                         Application-ID                        |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |                      Hop-by-Hop Identifier                    |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |                      End-to-End Identifier                    |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!
//! Command Flags:
//!   0 1 2 3 4 5 6 7
//!  +-+-+-+-+-+-+-+-+  R(equest), P(roxyable), E(rror)
//!  |R P E T r r r r|  T(Potentially re-transmitted message), r(eserved)
//!  +-+-+-+-+-+-+-+-+
//!
//! Unlike the teacher's original `CommandCode`/`ApplicationId` fixed enums,
//! commands and applications here are dynamic `u32`s resolved against the
//! runtime [`crate::dictionary::Dictionary`] (spec §3's Command/Application
//! entities are inserted and looked up at runtime, not compiled in).

use crate::avp::Avp;
use crate::dictionary::Dictionary;
use crate::error::{Error, Result};
use std::io::{Read, Seek, Write};

/// Maximum inbound message length (spec §4.2): 2^16 - 1 bytes.
pub const MAX_MESSAGE_LENGTH: u32 = 0xFFFF;

pub mod flags {
    pub const REQUEST: u8 = 0x80;
    pub const PROXYABLE: u8 = 0x40;
    pub const ERROR: u8 = 0x20;
    pub const RETRANSMIT: u8 = 0x10;
}

/// 32-bit Diameter Result-Code / Disconnect-Cause carrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResultCode(pub u32);

impl ResultCode {
    pub const DIAMETER_SUCCESS: ResultCode = ResultCode(2001);
    pub const DIAMETER_COMMAND_UNSUPPORTED: ResultCode = ResultCode(3001);
    pub const DIAMETER_UNABLE_TO_DELIVER: ResultCode = ResultCode(3002);
    pub const DIAMETER_REALM_NOT_SERVED: ResultCode = ResultCode(3003);
    pub const DIAMETER_TOO_BUSY: ResultCode = ResultCode(3004);
    pub const DIAMETER_LOOP_DETECTED: ResultCode = ResultCode(3005);
    pub const DIAMETER_APPLICATION_UNSUPPORTED: ResultCode = ResultCode(3007);
    pub const DIAMETER_ELECTION_LOST: ResultCode = ResultCode(4003);
    pub const DIAMETER_MISSING_AVP: ResultCode = ResultCode(5005);
    pub const DIAMETER_INVALID_AVP_VALUE: ResultCode = ResultCode(5004);
    pub const DIAMETER_INVALID_AVP_LENGTH: ResultCode = ResultCode(5014);

    pub fn is_success(&self) -> bool {
        (2000..3000).contains(&self.0)
    }

    pub fn is_protocol_error(&self) -> bool {
        (3000..4000).contains(&self.0)
    }

    pub fn is_permanent_failure(&self) -> bool {
        (5000..6000).contains(&self.0)
    }
}

/// Disconnect-Cause AVP values carried in DPR (spec §4.6 backoff mapping).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectCause {
    Rebooting = 0,
    Busy = 1,
    DoNotWantToTalkToYou = 2,
}

impl DisconnectCause {
    pub fn from_i32(v: i32) -> Option<DisconnectCause> {
        match v {
            0 => Some(DisconnectCause::Rebooting),
            1 => Some(DisconnectCause::Busy),
            2 => Some(DisconnectCause::DoNotWantToTalkToYou),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFlags {
    pub request: bool,
    pub proxyable: bool,
    pub error: bool,
    pub retransmit: bool,
}

impl CommandFlags {
    pub fn request() -> CommandFlags {
        CommandFlags {
            request: true,
            proxyable: false,
            error: false,
            retransmit: false,
        }
    }

    pub fn from_byte(b: u8) -> CommandFlags {
        CommandFlags {
            request: (b & flags::REQUEST) != 0,
            proxyable: (b & flags::PROXYABLE) != 0,
            error: (b & flags::ERROR) != 0,
            retransmit: (b & flags::RETRANSMIT) != 0,
        }
    }

    pub fn to_byte(self) -> u8 {
        let mut b = 0u8;
        if self.request {
            b |= flags::REQUEST;
        }
        if self.proxyable {
            b |= flags::PROXYABLE;
        }
        if self.error {
            b |= flags::ERROR;
        }
        if self.retransmit {
            b |= flags::RETRANSMIT;
        }
        b
    }
}

#[derive(Debug, Clone)]
pub struct DiameterHeader {
    pub version: u8,
    pub length: u32,
    pub flags: CommandFlags,
    pub code: u32,
    pub application_id: u32,
    pub hop_by_hop_id: u32,
    pub end_to_end_id: u32,
}

impl DiameterHeader {
    pub const WIRE_LENGTH: u32 = 20;

    pub fn decode_from<R: Read>(reader: &mut R) -> Result<DiameterHeader> {
        let mut b = [0u8; 20];
        reader.read_exact(&mut b)?;

        let version = b[0];
        if version != 1 {
            return Err(Error::UnsupportedVersion(version));
        }
        let length = u32::from_be_bytes([0, b[1], b[2], b[3]]);
        if length > MAX_MESSAGE_LENGTH {
            return Err(Error::MessageTooLarge(length));
        }
        let flags = CommandFlags::from_byte(b[4]);
        if flags.request && flags.error {
            return Err(Error::ProtocolViolation(
                "R and E command flags both set".into(),
            ));
        }
        let code = u32::from_be_bytes([0, b[5], b[6], b[7]]);
        let application_id = u32::from_be_bytes([b[8], b[9], b[10], b[11]]);
        let hop_by_hop_id = u32::from_be_bytes([b[12], b[13], b[14], b[15]]);
        let end_to_end_id = u32::from_be_bytes([b[16], b[17], b[18], b[19]]);

        Ok(DiameterHeader {
            version,
            length,
            flags,
            code,
            application_id,
            hop_by_hop_id,
            end_to_end_id,
        })
    }

    pub fn encode_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&[self.version])?;
        writer.write_all(&self.length.to_be_bytes()[1..4])?;
        writer.write_all(&[self.flags.to_byte()])?;
        writer.write_all(&self.code.to_be_bytes()[1..4])?;
        writer.write_all(&self.application_id.to_be_bytes())?;
        writer.write_all(&self.hop_by_hop_id.to_be_bytes())?;
        writer.write_all(&self.end_to_end_id.to_be_bytes())?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct DiameterMessage {
    pub header: DiameterHeader,
    pub avps: Vec<Avp>,
}

impl DiameterMessage {
    pub fn new(
        code: u32,
        application_id: u32,
        flags: CommandFlags,
        hop_by_hop_id: u32,
        end_to_end_id: u32,
    ) -> DiameterMessage {
        DiameterMessage {
            header: DiameterHeader {
                version: 1,
                length: DiameterHeader::WIRE_LENGTH,
                flags,
                code,
                application_id,
                hop_by_hop_id,
                end_to_end_id,
            },
            avps: Vec::new(),
        }
    }

    pub fn is_request(&self) -> bool {
        self.header.flags.request
    }

    pub fn is_error(&self) -> bool {
        self.header.flags.error
    }

    pub fn add_avp(&mut self, avp: Avp) {
        self.header.length += avp.wire_length();
        self.avps.push(avp);
    }

    pub fn get_avp(&self, code: u32) -> Option<&Avp> {
        self.avps
            .iter()
            .find(|a| a.code() == code && a.vendor_id().is_none())
    }

    pub fn get_avp_vendor(&self, code: u32, vendor_id: u32) -> Option<&Avp> {
        self.avps
            .iter()
            .find(|a| a.code() == code && a.vendor_id() == Some(vendor_id))
    }

    /// Session-Id AVP (code 263), if present.
    pub fn session_id(&self) -> Option<&str> {
        self.get_avp(263).and_then(|a| a.as_utf8string())
    }

    /// Builds an answer skeleton from this request: R-bit cleared, same
    /// code/application-id/hop-by-hop/end-to-end id, Session-Id copied if
    /// present (spec §4.2 "Answer construction from a request").
    pub fn new_answer(&self) -> DiameterMessage {
        let mut answer_flags = self.header.flags;
        answer_flags.request = false;
        answer_flags.error = false;
        let mut answer = DiameterMessage::new(
            self.header.code,
            self.header.application_id,
            answer_flags,
            self.header.hop_by_hop_id,
            self.header.end_to_end_id,
        );
        if let Some(avp) = self.get_avp(263) {
            answer.add_avp(avp.clone());
        }
        answer
    }

    /// Error-flagged answer skeleton: header only, plus Result-Code and
    /// Session-Id, per §4.2 ("An error flag variant preserves only the
    /// header skeleton").
    pub fn new_error_answer(&self, result_code: ResultCode) -> DiameterMessage {
        let mut answer = self.new_answer();
        answer.header.flags.error = true;
        answer.add_avp(Avp::new_unsigned32(268, None, true, result_code.0));
        answer
    }

    pub fn decode_from<R: Read + Seek>(reader: &mut R, dict: &Dictionary) -> Result<DiameterMessage> {
        let header = DiameterHeader::decode_from(reader)?;
        let mut avps = Vec::new();
        let mut offset = DiameterHeader::WIRE_LENGTH;
        while offset < header.length {
            let avp = Avp::decode_from(reader, dict)?;
            offset += avp.wire_length();
            avps.push(avp);
        }
        Ok(DiameterMessage { header, avps })
    }

    pub fn encode_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.header.encode_to(writer)?;
        for avp in &self.avps {
            avp.encode_to(writer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avp::Avp;
    use crate::dictionary::Dictionary;

    #[test]
    fn test_new_answer_copies_session_id() {
        let mut req = DiameterMessage::new(257, 0, CommandFlags::request(), 1, 2);
        req.add_avp(Avp::new_utf8string(263, None, true, "host;123;456"));
        let ans = req.new_answer();
        assert!(!ans.is_request());
        assert_eq!(ans.header.code, 257);
        assert_eq!(ans.session_id(), Some("host;123;456"));
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let dict = Dictionary::new_default();
        let mut req = DiameterMessage::new(257, 0, CommandFlags::request(), 42, 43);
        req.add_avp(Avp::new_identity(264, None, true, "host.example.net"));
        req.add_avp(Avp::new_unsigned32(296, None, true, 7));

        let mut bytes = Vec::new();
        req.encode_to(&mut bytes).unwrap();

        let mut cursor = std::io::Cursor::new(bytes);
        let decoded = DiameterMessage::decode_from(&mut cursor, &dict).unwrap();
        assert_eq!(decoded.header.code, 257);
        assert_eq!(decoded.header.hop_by_hop_id, 42);
        assert_eq!(decoded.avps.len(), 2);
    }

    #[test]
    fn test_reject_r_and_e_both_set() {
        let mut flags = CommandFlags::request();
        flags.error = true;
        let msg = DiameterMessage::new(257, 0, flags, 1, 1);
        let mut bytes = Vec::new();
        msg.encode_to(&mut bytes).unwrap();
        let mut cursor = std::io::Cursor::new(bytes);
        let dict = Dictionary::new_default();
        let err = DiameterMessage::decode_from(&mut cursor, &dict).unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation(_)));
    }
}
