//! Crate-wide error type.
//!
//! Kept as a flat, hand-written enum in the same shape as the teacher's
//! original `diameter` crate (no `thiserror`): one variant per failure kind
//! named in the base-protocol spec, `Display` written by hand, `From` impls
//! for the std/native-tls errors the codec and transport layers bubble up.

use std::fmt;

use crate::diameter::ResultCode;

pub type Result<T> = std::result::Result<T, Error>;

/// A `Failed-AVP`-style pointer: the offending AVP code/vendor, attached to
/// decode/validation errors so a caller can build a precise error answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailedAvp {
    pub code: u32,
    pub vendor_id: Option<u32>,
}

#[derive(Debug)]
pub enum Error {
    /// Malformed bytes on the wire (bad header, truncated AVP, etc).
    DecodeError(String),
    /// Failure while serializing a message/AVP.
    EncodeError(String),
    /// AVP code has no dictionary entry and was not vendor/private.
    UnknownAvpCode(u32),
    /// A Rule-mandated AVP is missing from a Grouped AVP or command.
    MissingAvp(FailedAvp),
    /// AVP value does not satisfy its declared base type.
    InvalidAvpValue(FailedAvp),
    /// AVP declared length disagrees with its base type's fixed size.
    InvalidAvpLength(FailedAvp),
    /// Declared message length exceeds the 2^16-1 inbound cap.
    MessageTooLarge(u32),
    /// Header carries an unsupported Diameter version.
    UnsupportedVersion(u8),
    /// Command flags are self-contradictory (R and E both set).
    ProtocolViolation(String),
    /// Dictionary insert collided with an existing key.
    AlreadyExists(String),
    /// Dictionary or peer-table lookup found nothing.
    NotFound(String),
    /// Dictionary insert referenced a missing or mismatched parent.
    InvalidArgument(String),
    /// No viable next-hop peer for a forwarded request.
    NoRoute(String),
    /// A peer-facing protocol error carrying a Diameter Result-Code.
    PeerError(ResultCode, String),
    ClientError(String),
    ServerError(String),
    IoError(std::io::Error),
    TlsError(native_tls::Error),
    TryFromSliceError(std::array::TryFromSliceError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::DecodeError(msg) => write!(f, "decode error: {}", msg),
            Error::EncodeError(msg) => write!(f, "encode error: {}", msg),
            Error::UnknownAvpCode(code) => write!(f, "unknown AVP code: {}", code),
            Error::MissingAvp(a) => write!(f, "missing mandatory AVP code={}", a.code),
            Error::InvalidAvpValue(a) => write!(f, "invalid AVP value code={}", a.code),
            Error::InvalidAvpLength(a) => write!(f, "invalid AVP length code={}", a.code),
            Error::MessageTooLarge(len) => write!(f, "message length {} exceeds maximum", len),
            Error::UnsupportedVersion(v) => write!(f, "unsupported diameter version {}", v),
            Error::ProtocolViolation(msg) => write!(f, "protocol violation: {}", msg),
            Error::AlreadyExists(msg) => write!(f, "already exists: {}", msg),
            Error::NotFound(msg) => write!(f, "not found: {}", msg),
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            Error::NoRoute(msg) => write!(f, "no route: {}", msg),
            Error::PeerError(rc, msg) => write!(f, "peer error {}: {}", rc.0, msg),
            Error::ClientError(msg) => write!(f, "{}", msg),
            Error::ServerError(msg) => write!(f, "{}", msg),
            Error::IoError(e) => write!(f, "{}", e),
            Error::TlsError(e) => write!(f, "{}", e),
            Error::TryFromSliceError(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<std::array::TryFromSliceError> for Error {
    fn from(err: std::array::TryFromSliceError) -> Error {
        Error::TryFromSliceError(err)
    }
}

impl From<native_tls::Error> for Error {
    fn from(err: native_tls::Error) -> Error {
        Error::TlsError(err)
    }
}
