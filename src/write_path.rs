//! Write operations executed on the owning event loop.
//!
//! [`Writer`] is the only place that calls the codec's encoder. Connection
//! callbacks receive one for inline writes and the bridge uses the same type to
//! apply [`Command`]s queued through a
//! [`BridgeHandle`](crate::handle::BridgeHandle). Before each operation the
//! writer applies any commands queued inline on the current loop, so writes
//! reach the wire in the order they were issued.

use bytes::Bytes;
use tracing::{debug, trace};

use crate::{
    channel::{Channel, WritePromise},
    codec::Http2Codec,
    dispatch::{self, Command},
    error::Result,
    frame::{ErrorCode, FrameFlags, Headers, PingPayload, Settings, StreamId},
    stream_ids::LocalStreamIds,
};

/// Inline write surface over the codec and channel of one bridge.
pub struct Writer<'a> {
    codec: &'a mut dyn Http2Codec,
    channel: &'a mut Channel,
    stream_ids: &'a LocalStreamIds,
}

impl<'a> Writer<'a> {
    pub(crate) fn new(
        codec: &'a mut dyn Http2Codec,
        channel: &'a mut Channel,
        stream_ids: &'a LocalStreamIds,
    ) -> Self {
        Self {
            codec,
            channel,
            stream_ids,
        }
    }

    /// Apply commands queued inline on this loop, then report whether a new
    /// write may proceed.
    ///
    /// Once a write site has raised a fault, nothing else is encoded until the
    /// bridge has handled it. Refused writes drop their promise, which fails
    /// it with [`BridgeError::ChannelClosed`](crate::error::BridgeError::ChannelClosed).
    fn ready(&mut self, op: &'static str) -> bool {
        for command in dispatch::take_inline() {
            self.apply(command);
        }
        if self.channel.has_fault() {
            debug!(op, "write refused: an earlier write failed");
            return false;
        }
        true
    }

    /// Execute a queued command.
    pub(crate) fn apply(&mut self, command: Command) {
        trace!(command = command.name(), "applying command");
        match command {
            Command::Headers {
                stream_id,
                headers,
                end_of_stream,
            } => self.write_headers(stream_id, &headers, end_of_stream),
            Command::Data {
                stream_id,
                data,
                end_of_stream,
            } => self.write_data(stream_id, data, end_of_stream),
            Command::Ping { payload, promise } => self.write_ping(payload, promise),
            Command::Frame {
                stream_id,
                frame_type,
                flags,
                payload,
            } => self.write_frame(stream_id, frame_type, flags, payload),
            Command::Reset {
                stream_id,
                error_code,
            } => self.write_reset(stream_id, error_code),
            Command::GoAway {
                error_code,
                last_stream_id,
                debug_data,
            } => self.write_go_away(error_code, last_stream_id, debug_data),
            Command::Settings { settings, promise } => self.write_settings(&settings, promise),
            Command::PushPromise {
                stream_id,
                promised_stream_id,
                headers,
                promise,
            } => self.write_push_promise(stream_id, promised_stream_id, &headers, promise),
        }
    }

    /// Encode a `HEADERS` frame without priority parameters and flush.
    pub fn write_headers(&mut self, stream_id: StreamId, headers: &Headers, end_of_stream: bool) {
        if !self.ready("headers") {
            return;
        }
        self.codec.write_headers(
            self.channel,
            stream_id,
            headers,
            0,
            end_of_stream,
            WritePromise::void(),
        );
        self.flush();
    }

    /// Encode a `DATA` frame and flush.
    ///
    /// When the stream is no longer writable after this write, or the write
    /// ends the stream, every byte the flow controller already allows is
    /// drained first. A drain failure is raised on the channel; later writes
    /// are refused until the bridge has handled it as an uncaught exception.
    pub fn write_data(&mut self, stream_id: StreamId, data: Bytes, end_of_stream: bool) {
        if !self.ready("data") {
            return;
        }
        self.codec.write_data(
            self.channel,
            stream_id,
            data,
            0,
            end_of_stream,
            WritePromise::void(),
        );
        if (end_of_stream || !self.codec.is_writable(stream_id))
            && let Err(err) = self.codec.write_pending_bytes(self.channel)
        {
            self.channel.raise(err.into());
        }
        self.flush();
    }

    /// Encode a non-ack `PING` and flush. `promise` completes once the frame
    /// is on the wire.
    pub fn write_ping(&mut self, payload: PingPayload, promise: WritePromise) {
        if !self.ready("ping") {
            return;
        }
        self.codec.write_ping(self.channel, false, payload, promise);
        self.flush();
    }

    /// Return `num_bytes` of inbound window for `stream_id`.
    ///
    /// Flushes only when a `WINDOW_UPDATE` was written. Flow-control errors
    /// are raised on the channel.
    pub fn consume(&mut self, stream_id: StreamId, num_bytes: u32) {
        if !self.ready("consume") {
            return;
        }
        match self.codec.consume_bytes(self.channel, stream_id, num_bytes) {
            Ok(true) => self.flush(),
            Ok(false) => {}
            Err(err) => self.channel.raise(err.into()),
        }
    }

    /// Encode an arbitrary frame and flush.
    pub fn write_frame(
        &mut self,
        stream_id: StreamId,
        frame_type: u8,
        flags: FrameFlags,
        payload: Bytes,
    ) {
        if !self.ready("frame") {
            return;
        }
        self.codec.write_frame(
            self.channel,
            frame_type,
            stream_id,
            flags,
            payload,
            WritePromise::void(),
        );
        self.flush();
    }

    /// Encode `RST_STREAM` and flush.
    pub fn write_reset(&mut self, stream_id: StreamId, error_code: ErrorCode) {
        if !self.ready("reset") {
            return;
        }
        self.codec
            .write_rst_stream(self.channel, stream_id, error_code, WritePromise::void());
        self.flush();
    }

    /// Encode `GOAWAY` and flush.
    pub fn write_go_away(
        &mut self,
        error_code: ErrorCode,
        last_stream_id: StreamId,
        debug_data: Bytes,
    ) {
        if !self.ready("go_away") {
            return;
        }
        self.codec.write_go_away(
            self.channel,
            last_stream_id,
            error_code,
            debug_data,
            WritePromise::void(),
        );
        self.flush();
    }

    /// Encode `SETTINGS` and flush. `promise` completes once the frame is on
    /// the wire.
    pub fn write_settings(&mut self, settings: &Settings, promise: WritePromise) {
        if !self.ready("settings") {
            return;
        }
        self.codec.write_settings(self.channel, settings, promise);
        self.flush();
    }

    /// Encode `PUSH_PROMISE` for an already reserved stream id.
    ///
    /// The frame is not flushed; it goes out with the next flushing write.
    pub fn write_push_promise(
        &mut self,
        stream_id: StreamId,
        promised_stream_id: StreamId,
        headers: &Headers,
        promise: WritePromise,
    ) {
        if !self.ready("push_promise") {
            return;
        }
        self.codec.write_push_promise(
            self.channel,
            stream_id,
            promised_stream_id,
            headers,
            0,
            promise,
        );
    }

    /// Reserve a local stream id and encode `PUSH_PROMISE` for it.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::StreamIdsExhausted`](crate::error::BridgeError::StreamIdsExhausted)
    /// when no local stream ids remain.
    pub fn push_promise(&mut self, stream_id: StreamId, headers: &Headers) -> Result<StreamId> {
        let promised_stream_id = self.stream_ids.next_id()?;
        self.write_push_promise(stream_id, promised_stream_id, headers, WritePromise::void());
        Ok(promised_stream_id)
    }

    /// Whether the remote flow controller would send more bytes on `stream_id`.
    #[must_use]
    pub fn is_writable(&self, stream_id: StreamId) -> bool { self.codec.is_writable(stream_id) }

    /// Returns `true` while the channel accepts writes.
    #[must_use]
    pub fn is_active(&self) -> bool { self.channel.is_active() }

    /// Ask the event loop to close the transport after pending frames.
    pub fn close(&mut self) { self.channel.close(); }

    fn flush(&mut self) { self.channel.flush(); }
}
