//! Canonical error and result types for the crate.
//!
//! [`Http2Error`] carries protocol violations reported by the codec, while
//! [`BridgeError`] is the single error surface of the bridge itself.

use std::{io, sync::Arc};

use thiserror::Error;

use crate::{
    event::FrameKind,
    frame::{ErrorCode, StreamId},
};

/// An HTTP/2 protocol violation scoped to the connection or to one stream.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Http2Error {
    /// The whole connection is unusable; the default reaction is `GOAWAY`.
    #[error("connection error ({code}): {message}")]
    Connection { code: ErrorCode, message: String },
    /// Only one stream is affected; the default reaction is `RST_STREAM`.
    #[error("stream {stream_id} error ({code}): {message}")]
    Stream {
        stream_id: StreamId,
        code: ErrorCode,
        message: String,
    },
}

impl Http2Error {
    /// Build a connection-level error.
    pub fn connection(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Connection {
            code,
            message: message.into(),
        }
    }

    /// Build a stream-level error.
    pub fn stream(stream_id: StreamId, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Stream {
            stream_id,
            code,
            message: message.into(),
        }
    }

    /// HTTP/2 error code to put on the wire.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Connection { code, .. } | Self::Stream { code, .. } => *code,
        }
    }

    /// Affected stream for stream-level errors.
    #[must_use]
    pub fn stream_id(&self) -> Option<StreamId> {
        match self {
            Self::Connection { .. } => None,
            Self::Stream { stream_id, .. } => Some(*stream_id),
        }
    }
}

/// Errors surfaced by the bridge.
#[derive(Clone, Debug, Error)]
pub enum BridgeError {
    /// A frame kind reached the bridge that must be handled elsewhere.
    #[error("{0} frames are not handled at the bridge layer")]
    Unsupported(FrameKind),
    /// A connection-directed event arrived before the first `SETTINGS`.
    #[error("{0} received before the connection was established")]
    ConnectionAbsent(FrameKind),
    /// The channel was closed before the write could complete.
    #[error("channel closed")]
    ChannelClosed,
    /// No local stream identifiers remain for push promises.
    #[error("local stream identifiers exhausted")]
    StreamIdsExhausted,
    /// A protocol violation.
    #[error(transparent)]
    Protocol(#[from] Http2Error),
    /// The transport failed.
    #[error("transport error: {0}")]
    Io(Arc<io::Error>),
}

impl From<io::Error> for BridgeError {
    fn from(error: io::Error) -> Self { Self::Io(Arc::new(error)) }
}

impl BridgeError {
    /// Returns `true` for errors that indicate broken wiring between the
    /// codec and the bridge rather than a runtime failure.
    #[must_use]
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::Unsupported(_) | Self::ConnectionAbsent(_))
    }
}

/// Canonical result alias used by `h2-bridge` public APIs.
pub type Result<T, E = BridgeError> = std::result::Result<T, E>;
