//! HTTP/2 protocol values exchanged between the codec, the bridge, and the
//! application connection.
//!
//! These are plain value types. None of them performs any wire encoding; the
//! codec behind [`crate::codec::Http2Codec`] owns the byte representation.

mod headers;
mod settings;

use std::fmt;

pub use headers::{CONTENT_ENCODING, CONTENT_LENGTH, HeaderField, Headers};
pub use settings::Settings;
use static_assertions::const_assert;

/// Largest stream identifier representable in the 31-bit field.
const MAX_STREAM_ID: u32 = 0x7fff_ffff;

const_assert!(MAX_STREAM_ID % 2 == 1);

/// Identifier of an HTTP/2 stream.
///
/// Client-initiated streams are odd, server-initiated streams are even, and
/// zero addresses the connection itself.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId(u32);

impl StreamId {
    /// The connection-level pseudo stream.
    pub const CONNECTION: StreamId = StreamId(0);
    /// The highest valid stream identifier.
    pub const MAX: StreamId = StreamId(MAX_STREAM_ID);

    /// Create a stream identifier, clearing the reserved high bit.
    #[must_use]
    pub const fn new(id: u32) -> Self { Self(id & MAX_STREAM_ID) }

    /// Return the raw identifier.
    #[must_use]
    pub const fn as_u32(self) -> u32 { self.0 }

    /// Returns `true` for the connection-level identifier `0`.
    #[must_use]
    pub const fn is_connection(self) -> bool { self.0 == 0 }

    /// Returns `true` when the identifier belongs to a client-initiated stream.
    #[must_use]
    pub const fn is_client_initiated(self) -> bool { self.0 % 2 == 1 }

    /// Returns `true` when the identifier belongs to a server-initiated stream.
    #[must_use]
    pub const fn is_server_initiated(self) -> bool { self.0 != 0 && self.0 % 2 == 0 }
}

impl From<u32> for StreamId {
    fn from(value: u32) -> Self { Self::new(value) }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// HTTP/2 error code carried by `RST_STREAM` and `GOAWAY` (RFC 7540 §7).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ErrorCode(u32);

impl ErrorCode {
    pub const NO_ERROR: ErrorCode = ErrorCode(0x0);
    pub const PROTOCOL_ERROR: ErrorCode = ErrorCode(0x1);
    pub const INTERNAL_ERROR: ErrorCode = ErrorCode(0x2);
    pub const FLOW_CONTROL_ERROR: ErrorCode = ErrorCode(0x3);
    pub const SETTINGS_TIMEOUT: ErrorCode = ErrorCode(0x4);
    pub const STREAM_CLOSED: ErrorCode = ErrorCode(0x5);
    pub const FRAME_SIZE_ERROR: ErrorCode = ErrorCode(0x6);
    pub const REFUSED_STREAM: ErrorCode = ErrorCode(0x7);
    pub const CANCEL: ErrorCode = ErrorCode(0x8);
    pub const COMPRESSION_ERROR: ErrorCode = ErrorCode(0x9);
    pub const CONNECT_ERROR: ErrorCode = ErrorCode(0xa);
    pub const ENHANCE_YOUR_CALM: ErrorCode = ErrorCode(0xb);
    pub const INADEQUATE_SECURITY: ErrorCode = ErrorCode(0xc);
    pub const HTTP_1_1_REQUIRED: ErrorCode = ErrorCode(0xd);

    /// Wrap a raw error code. Unknown codes are preserved.
    #[must_use]
    pub const fn new(code: u32) -> Self { Self(code) }

    /// Return the raw code.
    #[must_use]
    pub const fn as_u32(self) -> u32 { self.0 }

    /// Registered name of the code, if it is one RFC 7540 defines.
    #[must_use]
    pub const fn name(self) -> Option<&'static str> {
        let name = match self.0 {
            0x0 => "NO_ERROR",
            0x1 => "PROTOCOL_ERROR",
            0x2 => "INTERNAL_ERROR",
            0x3 => "FLOW_CONTROL_ERROR",
            0x4 => "SETTINGS_TIMEOUT",
            0x5 => "STREAM_CLOSED",
            0x6 => "FRAME_SIZE_ERROR",
            0x7 => "REFUSED_STREAM",
            0x8 => "CANCEL",
            0x9 => "COMPRESSION_ERROR",
            0xa => "CONNECT_ERROR",
            0xb => "ENHANCE_YOUR_CALM",
            0xc => "INADEQUATE_SECURITY",
            0xd => "HTTP_1_1_REQUIRED",
            _ => return None,
        };
        Some(name)
    }
}

impl From<u32> for ErrorCode {
    fn from(value: u32) -> Self { Self(value) }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "0x{:x}", self.0),
        }
    }
}

/// Stream priority parameters carried on `HEADERS` and `PRIORITY` frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Priority {
    /// Stream this one depends on.
    pub dependency: StreamId,
    /// Weight in the range 1..=256, stored as on the wire (0..=255).
    pub weight: u8,
    /// Whether the dependency is exclusive.
    pub exclusive: bool,
}

impl Default for Priority {
    /// RFC 7540 §5.3.5 default: depend on the connection with weight 16.
    fn default() -> Self {
        Self {
            dependency: StreamId::CONNECTION,
            weight: 15,
            exclusive: false,
        }
    }
}

/// Opaque eight-byte payload of a `PING` frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PingPayload(pub [u8; 8]);

impl From<u64> for PingPayload {
    fn from(value: u64) -> Self { Self(value.to_be_bytes()) }
}

/// Raw flag byte of an HTTP/2 frame header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FrameFlags(pub u8);

impl FrameFlags {
    pub const END_STREAM: u8 = 0x1;
    pub const ACK: u8 = 0x1;
    pub const END_HEADERS: u8 = 0x4;
    pub const PADDED: u8 = 0x8;
    pub const PRIORITY: u8 = 0x20;

    /// Returns `true` if every bit in `mask` is set.
    #[must_use]
    pub const fn contains(self, mask: u8) -> bool { self.0 & mask == mask }
}

/// Which side of the session this bridge represents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Role {
    Client,
    #[default]
    Server,
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(1, true, false)]
    #[case(2, false, true)]
    #[case(0, false, false)]
    #[case(0x7fff_ffff, true, false)]
    fn stream_parity(#[case] raw: u32, #[case] client: bool, #[case] server: bool) {
        let id = StreamId::new(raw);
        assert_eq!(id.is_client_initiated(), client);
        assert_eq!(id.is_server_initiated(), server);
    }

    #[test]
    fn reserved_bit_is_cleared() {
        assert_eq!(StreamId::new(0x8000_0003).as_u32(), 3);
    }

    #[rstest]
    #[case(ErrorCode::CANCEL, "CANCEL")]
    #[case(ErrorCode::NO_ERROR, "NO_ERROR")]
    #[case(ErrorCode::new(0x42), "0x42")]
    fn error_code_display(#[case] code: ErrorCode, #[case] expected: &str) {
        assert_eq!(code.to_string(), expected);
    }

    #[test]
    fn default_priority_has_weight_sixteen() {
        let priority = Priority::default();
        assert_eq!(u16::from(priority.weight) + 1, 16);
        assert!(priority.dependency.is_connection());
    }

    #[test]
    fn flags_contains_checks_all_bits() {
        let flags = FrameFlags(FrameFlags::END_STREAM | FrameFlags::END_HEADERS);
        assert!(flags.contains(FrameFlags::END_HEADERS));
        assert!(!flags.contains(FrameFlags::PADDED));
    }
}
