//! The application-facing side of the bridge.
//!
//! A [`Connection`] is created once the peer's first `SETTINGS` frame has been
//! read and from then on receives every inbound frame and lifecycle
//! notification. Every callback runs on the event loop that owns the bridge
//! and receives a [`Writer`] for synchronous writes. Writes from other tasks
//! go through the [`BridgeHandle`](crate::handle::BridgeHandle) passed to the
//! connection factory.

use bytes::Bytes;
use log::debug;

use crate::{
    error::Http2Error,
    event::FrameEvent,
    frame::{ErrorCode, Headers, Priority, Settings, StreamId},
    write_path::Writer,
};

/// Application logic for one HTTP/2 session.
pub trait Connection: Send + 'static {
    /// The peer's first `SETTINGS` frame. Called exactly once, immediately
    /// after the connection has been created.
    fn on_settings_read(&mut self, writer: &mut Writer<'_>, settings: &Settings);

    /// A `HEADERS` frame carrying priority parameters.
    ///
    /// The bridge routes these through [`Connection::on_frame`] once the
    /// connection exists; the default implementation of `on_frame` forwards
    /// them here.
    fn on_headers_read(
        &mut self,
        writer: &mut Writer<'_>,
        stream_id: StreamId,
        headers: Headers,
        priority: Priority,
        padding: u8,
        end_of_stream: bool,
    );

    /// Any frame read after the connection was created.
    fn on_frame(&mut self, writer: &mut Writer<'_>, frame: FrameEvent) {
        match frame {
            FrameEvent::Headers {
                stream_id,
                headers,
                priority: Some(priority),
                padding,
                end_of_stream,
            } => self.on_headers_read(writer, stream_id, headers, priority, padding, end_of_stream),
            other => debug!(
                "frame ignored by connection: kind={}, stream={:?}",
                other.kind(),
                other.stream_id()
            ),
        }
    }

    /// A `GOAWAY` was written by this side.
    fn on_go_away_sent(&mut self, _last_stream_id: StreamId, _error_code: ErrorCode, _debug_data: &Bytes) {}

    /// A `GOAWAY` was read from the peer.
    fn on_go_away_received(
        &mut self,
        _last_stream_id: StreamId,
        _error_code: ErrorCode,
        _debug_data: &Bytes,
    ) {
    }

    /// A stream reached the closed state.
    fn on_stream_closed(&mut self, _writer: &mut Writer<'_>, _stream_id: StreamId) {}

    /// The remote flow controller changed whether `stream_id` can send.
    fn on_stream_writability_changed(&mut self, _writer: &mut Writer<'_>, _stream_id: StreamId) {}

    /// A connection-level protocol error, reported before the `GOAWAY` is
    /// written.
    fn on_connection_error(&mut self, _cause: &Http2Error) {}

    /// A stream-level protocol error, reported before the `RST_STREAM` is
    /// written.
    fn on_stream_error(&mut self, _stream_id: StreamId, _cause: &Http2Error) {}

    /// The transport is gone. No further callbacks follow.
    fn handle_closed(&mut self) {}

    /// Run `task` against this connection from the I/O side of the bridge.
    ///
    /// Implementations that need to hop to another executor can override
    /// this; the default runs the task immediately.
    fn execute_from_io<F>(&mut self, task: F)
    where
        F: FnOnce(&mut Self),
        Self: Sized,
    {
        task(self);
    }
}
