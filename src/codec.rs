//! Boundary to the HTTP/2 frame codec.
//!
//! The bridge never encodes or parses frames itself. Everything that touches
//! HPACK state, frame layout, or flow-control windows lives behind
//! [`Http2Codec`], and every method is invoked on the event loop that owns the
//! codec.

use bytes::{Bytes, BytesMut};

use crate::{
    channel::{Channel, WritePromise},
    error::Http2Error,
    event::CodecEvent,
    frame::{ErrorCode, FrameFlags, Headers, PingPayload, Settings, StreamId},
};

/// Encoder, decoder, and flow controllers of one HTTP/2 connection.
///
/// Write methods append encoded frames to the [`Channel`] together with the
/// supplied promise; they never flush. Synchronous notifications raised while
/// writing (for example the `GOAWAY` that was just sent, or a stream closed by
/// `RST_STREAM`) are reported through [`Channel::notify`].
pub trait Http2Codec: Send + 'static {
    /// Write the connection preface and initial `SETTINGS`.
    fn channel_active(&mut self, channel: &mut Channel);

    /// Release codec state once the transport is gone. Streams still open
    /// should be reported as closed through [`Channel::notify`].
    fn channel_inactive(&mut self, _channel: &mut Channel) {}

    /// Apply the settings carried by an `HTTP2-Settings` upgrade header as
    /// if they had been received.
    ///
    /// # Errors
    ///
    /// Returns an [`Http2Error`] if the settings cannot be applied.
    fn on_http_server_upgrade(
        &mut self,
        channel: &mut Channel,
        settings: &Settings,
    ) -> Result<(), Http2Error>;

    /// Record that this client initiated an upgrade; no settings are known yet.
    ///
    /// # Errors
    ///
    /// Returns an [`Http2Error`] if the upgrade stream cannot be created.
    fn on_http_client_upgrade(&mut self, channel: &mut Channel) -> Result<(), Http2Error>;

    /// Decode as many complete frames from `src` as possible.
    ///
    /// Consumed bytes are removed from `src`; protocol violations are pushed
    /// to `out` as [`CodecEvent::Error`].
    fn decode(&mut self, channel: &mut Channel, src: &mut BytesMut, out: &mut Vec<CodecEvent>);

    fn write_headers(
        &mut self,
        channel: &mut Channel,
        stream_id: StreamId,
        headers: &Headers,
        padding: u8,
        end_of_stream: bool,
        promise: WritePromise,
    );

    fn write_data(
        &mut self,
        channel: &mut Channel,
        stream_id: StreamId,
        data: Bytes,
        padding: u8,
        end_of_stream: bool,
        promise: WritePromise,
    );

    fn write_ping(
        &mut self,
        channel: &mut Channel,
        ack: bool,
        payload: PingPayload,
        promise: WritePromise,
    );

    fn write_rst_stream(
        &mut self,
        channel: &mut Channel,
        stream_id: StreamId,
        error_code: ErrorCode,
        promise: WritePromise,
    );

    fn write_go_away(
        &mut self,
        channel: &mut Channel,
        last_stream_id: StreamId,
        error_code: ErrorCode,
        debug_data: Bytes,
        promise: WritePromise,
    );

    fn write_settings(&mut self, channel: &mut Channel, settings: &Settings, promise: WritePromise);

    fn write_push_promise(
        &mut self,
        channel: &mut Channel,
        stream_id: StreamId,
        promised_stream_id: StreamId,
        headers: &Headers,
        padding: u8,
        promise: WritePromise,
    );

    /// Write a frame type the codec has no dedicated method for.
    fn write_frame(
        &mut self,
        channel: &mut Channel,
        frame_type: u8,
        stream_id: StreamId,
        flags: FrameFlags,
        payload: Bytes,
        promise: WritePromise,
    );

    /// Whether the remote flow controller would send more bytes on `stream_id`.
    fn is_writable(&self, stream_id: StreamId) -> bool;

    /// Write every byte the remote flow controller currently allows.
    ///
    /// # Errors
    ///
    /// Returns an [`Http2Error`] if the flow controller fails.
    fn write_pending_bytes(&mut self, channel: &mut Channel) -> Result<(), Http2Error>;

    /// Return `num_bytes` to the inbound window of `stream_id`.
    ///
    /// Returns `true` if a `WINDOW_UPDATE` was written.
    ///
    /// # Errors
    ///
    /// Returns an [`Http2Error`] if the bytes exceed what was received.
    fn consume_bytes(
        &mut self,
        channel: &mut Channel,
        stream_id: StreamId,
        num_bytes: u32,
    ) -> Result<bool, Http2Error>;

    /// Highest stream identifier opened by the peer, used for `GOAWAY`.
    fn last_remote_stream_id(&self) -> StreamId;

    /// Default reaction to a connection error: `GOAWAY`, then close.
    fn on_connection_error(&mut self, channel: &mut Channel, cause: &Http2Error) {
        let last_stream_id = self.last_remote_stream_id();
        self.write_go_away(
            channel,
            last_stream_id,
            cause.code(),
            Bytes::from(cause.to_string()),
            WritePromise::void(),
        );
        channel.flush();
        channel.close();
    }

    /// Default reaction to a stream error: `RST_STREAM`.
    fn on_stream_error(&mut self, channel: &mut Channel, stream_id: StreamId, cause: &Http2Error) {
        self.write_rst_stream(channel, stream_id, cause.code(), WritePromise::void());
        channel.flush();
    }
}
