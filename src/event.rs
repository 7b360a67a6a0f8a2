//! Events reported by the codec to the bridge.
//!
//! Decoded frames, stream lifecycle transitions, `GOAWAY` notifications, and
//! protocol errors all arrive as a single [`CodecEvent`] value so the bridge
//! can route them with one `match`.

use std::fmt;

use bytes::Bytes;

use crate::{
    error::Http2Error,
    frame::{ErrorCode, FrameFlags, Headers, PingPayload, Priority, Settings, StreamId},
};

/// A decoded inbound frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameEvent {
    Data {
        stream_id: StreamId,
        data: Bytes,
        padding: u8,
        end_of_stream: bool,
        /// Bytes counted against the inbound window, padding included.
        ///
        /// Connections return this amount through
        /// [`Writer::consume`](crate::write_path::Writer::consume); it is not
        /// changed when the payload is rewritten by decompression.
        window_bytes: u32,
    },
    Headers {
        stream_id: StreamId,
        headers: Headers,
        priority: Option<Priority>,
        padding: u8,
        end_of_stream: bool,
    },
    Priority {
        stream_id: StreamId,
        priority: Priority,
    },
    RstStream {
        stream_id: StreamId,
        error_code: ErrorCode,
    },
    Settings(Settings),
    SettingsAck,
    Ping(PingPayload),
    PingAck(PingPayload),
    PushPromise {
        stream_id: StreamId,
        promised_stream_id: StreamId,
        headers: Headers,
        padding: u8,
    },
    GoAway {
        last_stream_id: StreamId,
        error_code: ErrorCode,
        debug_data: Bytes,
    },
    WindowUpdate {
        stream_id: StreamId,
        increment: u32,
    },
    Unknown {
        frame_type: u8,
        stream_id: StreamId,
        flags: FrameFlags,
        payload: Bytes,
    },
}

impl FrameEvent {
    /// Kind of this frame, used for logging and contract violations.
    #[must_use]
    pub fn kind(&self) -> FrameKind {
        match self {
            Self::Data { .. } => FrameKind::Data,
            Self::Headers { priority: None, .. } => FrameKind::Headers,
            Self::Headers {
                priority: Some(_), ..
            } => FrameKind::PriorityHeaders,
            Self::Priority { .. } => FrameKind::Priority,
            Self::RstStream { .. } => FrameKind::RstStream,
            Self::Settings(_) => FrameKind::Settings,
            Self::SettingsAck => FrameKind::SettingsAck,
            Self::Ping(_) => FrameKind::Ping,
            Self::PingAck(_) => FrameKind::PingAck,
            Self::PushPromise { .. } => FrameKind::PushPromise,
            Self::GoAway { .. } => FrameKind::GoAway,
            Self::WindowUpdate { .. } => FrameKind::WindowUpdate,
            Self::Unknown { .. } => FrameKind::Unknown,
        }
    }

    /// Stream the frame belongs to; `None` for connection-level frames.
    #[must_use]
    pub fn stream_id(&self) -> Option<StreamId> {
        match self {
            Self::Data { stream_id, .. }
            | Self::Headers { stream_id, .. }
            | Self::Priority { stream_id, .. }
            | Self::RstStream { stream_id, .. }
            | Self::PushPromise { stream_id, .. }
            | Self::WindowUpdate { stream_id, .. }
            | Self::Unknown { stream_id, .. } => {
                Some(*stream_id).filter(|id| !id.is_connection())
            }
            Self::Settings(_)
            | Self::SettingsAck
            | Self::Ping(_)
            | Self::PingAck(_)
            | Self::GoAway { .. } => None,
        }
    }
}

/// Frame kinds as seen by the bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Data,
    /// `HEADERS` without priority parameters.
    Headers,
    /// `HEADERS` carrying priority parameters.
    PriorityHeaders,
    Priority,
    RstStream,
    Settings,
    SettingsAck,
    Ping,
    PingAck,
    PushPromise,
    GoAway,
    WindowUpdate,
    Unknown,
}

impl FrameKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Data => "DATA",
            Self::Headers => "HEADERS",
            Self::PriorityHeaders => "HEADERS(priority)",
            Self::Priority => "PRIORITY",
            Self::RstStream => "RST_STREAM",
            Self::Settings => "SETTINGS",
            Self::SettingsAck => "SETTINGS(ack)",
            Self::Ping => "PING",
            Self::PingAck => "PING(ack)",
            Self::PushPromise => "PUSH_PROMISE",
            Self::GoAway => "GOAWAY",
            Self::WindowUpdate => "WINDOW_UPDATE",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Stream lifecycle transitions tracked by the codec's stream table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    Added(StreamId),
    Active(StreamId),
    HalfClosed(StreamId),
    Removed(StreamId),
    Closed(StreamId),
}

/// Whether a `GOAWAY` was written locally or read from the peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GoAwayDirection {
    Sent,
    Received,
}

/// A `GOAWAY` observed in either direction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GoAwayEvent {
    pub direction: GoAwayDirection,
    pub last_stream_id: StreamId,
    pub error_code: ErrorCode,
    pub debug_data: Bytes,
}

/// Everything the codec reports back to the bridge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CodecEvent {
    /// A frame handed to the frame listener.
    Frame(FrameEvent),
    /// A stream lifecycle transition.
    Stream(StreamEvent),
    /// A `GOAWAY` was sent or received.
    GoAway(GoAwayEvent),
    /// The remote flow controller changed a stream's writability.
    WritabilityChanged(StreamId),
    /// The decoder detected a protocol violation.
    Error(Http2Error),
}

impl From<FrameEvent> for CodecEvent {
    fn from(frame: FrameEvent) -> Self { Self::Frame(frame) }
}

impl From<StreamEvent> for CodecEvent {
    fn from(event: StreamEvent) -> Self { Self::Stream(event) }
}

impl From<Http2Error> for CodecEvent {
    fn from(error: Http2Error) -> Self { Self::Error(error) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_kind_depends_on_priority() {
        let plain = FrameEvent::Headers {
            stream_id: StreamId::new(1),
            headers: Headers::new(),
            priority: None,
            padding: 0,
            end_of_stream: false,
        };
        let prioritised = FrameEvent::Headers {
            stream_id: StreamId::new(1),
            headers: Headers::new(),
            priority: Some(Priority::default()),
            padding: 0,
            end_of_stream: false,
        };
        assert_eq!(plain.kind(), FrameKind::Headers);
        assert_eq!(prioritised.kind(), FrameKind::PriorityHeaders);
    }

    #[test]
    fn connection_level_frames_have_no_stream() {
        assert_eq!(FrameEvent::Ping(PingPayload::default()).stream_id(), None);
        let update = FrameEvent::WindowUpdate {
            stream_id: StreamId::CONNECTION,
            increment: 10,
        };
        assert_eq!(update.stream_id(), None);
    }
}
