//! Recording doubles for exercising the bridge in tests.
//!
//! These helpers compile for all non-Loom builds so integration tests can
//! drive a bridge without a real HTTP/2 codec.
//!
//! [`RecordingCodec`] writes one text record per encoded frame
//! (`"<call:?>\n"`) and decodes a line-based inbound format:
//!
//! | line              | decoded event                                   |
//! |-------------------|-------------------------------------------------|
//! | `SETTINGS`        | `SETTINGS` frame with default values            |
//! | `HEADERS <id>`    | `HEADERS` with default priority for stream `id` |
//! | `DATA <id> <txt>` | `DATA` carrying `txt`                           |
//! | `PING`            | non-ack `PING`                                  |
//! | `GOAWAY <last>`   | `GOAWAY` received from the peer                 |
//! | `CLOSE <id>`      | stream `id` closed                              |

use std::{
    collections::{BTreeSet, VecDeque},
    io,
    sync::{Arc, Mutex, PoisonError},
};

use bytes::{Bytes, BytesMut};

use crate::{
    channel::{Channel, WritePromise},
    codec::Http2Codec,
    connection::Connection,
    decompress::Decompressor,
    error::Http2Error,
    event::{CodecEvent, FrameEvent, GoAwayDirection, GoAwayEvent, StreamEvent},
    frame::{ErrorCode, FrameFlags, Headers, PingPayload, Priority, Settings, StreamId},
    write_path::Writer,
};

/// Something the codec was asked to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CodecCall {
    Preface,
    Inactive,
    ServerUpgrade(Settings),
    ClientUpgrade,
    Headers {
        stream_id: StreamId,
        end_of_stream: bool,
    },
    Data {
        stream_id: StreamId,
        data: Bytes,
        end_of_stream: bool,
    },
    Ping(PingPayload),
    Reset {
        stream_id: StreamId,
        error_code: ErrorCode,
    },
    GoAway {
        last_stream_id: StreamId,
        error_code: ErrorCode,
    },
    Settings(Settings),
    PushPromise {
        stream_id: StreamId,
        promised_stream_id: StreamId,
    },
    Frame {
        frame_type: u8,
        stream_id: StreamId,
    },
    WritePending,
    WindowUpdate {
        stream_id: StreamId,
        num_bytes: u32,
    },
}

/// Something the connection was told.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionCall {
    SettingsRead(Settings),
    HeadersRead {
        stream_id: StreamId,
        headers: Headers,
        priority: Priority,
        end_of_stream: bool,
    },
    Frame(FrameEvent),
    GoAwaySent {
        last_stream_id: StreamId,
        error_code: ErrorCode,
    },
    GoAwayReceived {
        last_stream_id: StreamId,
        error_code: ErrorCode,
    },
    StreamClosed(StreamId),
    WritabilityChanged(StreamId),
    ConnectionError(ErrorCode),
    StreamError(StreamId, ErrorCode),
    Closed,
}

/// One journal line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Entry {
    Codec(CodecCall),
    Connection(ConnectionCall),
    Hook(&'static str),
}

/// Shared, ordered record of codec and connection activity.
#[derive(Clone, Debug, Default)]
pub struct Journal(Arc<Mutex<Vec<Entry>>>);

impl Journal {
    pub fn record(&self, entry: Entry) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    /// Snapshot of every entry so far.
    #[must_use]
    pub fn entries(&self) -> Vec<Entry> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    #[must_use]
    pub fn codec_calls(&self) -> Vec<CodecCall> {
        self.entries()
            .into_iter()
            .filter_map(|entry| match entry {
                Entry::Codec(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn connection_calls(&self) -> Vec<ConnectionCall> {
        self.entries()
            .into_iter()
            .filter_map(|entry| match entry {
                Entry::Connection(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    /// Index of the first entry equal to `entry`.
    #[must_use]
    pub fn position(&self, entry: &Entry) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }

    pub fn clear(&self) { self.0.lock().unwrap_or_else(PoisonError::into_inner).clear(); }
}

/// Frame codec double that records every call and writes text records.
#[derive(Debug)]
pub struct RecordingCodec {
    journal: Journal,
    scripted: VecDeque<CodecEvent>,
    unwritable: BTreeSet<StreamId>,
    open_streams: BTreeSet<StreamId>,
    last_remote_stream_id: StreamId,
    window_update_on_consume: bool,
    pending_failure: Option<Http2Error>,
    consume_failure: Option<Http2Error>,
    upgrade_failure: Option<Http2Error>,
}

impl RecordingCodec {
    #[must_use]
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            scripted: VecDeque::new(),
            unwritable: BTreeSet::new(),
            open_streams: BTreeSet::new(),
            last_remote_stream_id: StreamId::CONNECTION,
            window_update_on_consume: true,
            pending_failure: None,
            consume_failure: None,
            upgrade_failure: None,
        }
    }

    /// Emit `event` on the next call to `decode`, before anything parsed
    /// from the input.
    pub fn script(&mut self, event: impl Into<CodecEvent>) { self.scripted.push_back(event.into()); }

    /// Control whether `stream_id` reports itself writable.
    pub fn set_writable(&mut self, stream_id: StreamId, writable: bool) {
        if writable {
            self.unwritable.remove(&stream_id);
        } else {
            self.unwritable.insert(stream_id);
        }
    }

    /// Control whether `consume_bytes` writes a `WINDOW_UPDATE`.
    pub fn set_window_update_on_consume(&mut self, enabled: bool) {
        self.window_update_on_consume = enabled;
    }

    /// Fail the next `write_pending_bytes` with `error`.
    pub fn fail_pending_with(&mut self, error: Http2Error) { self.pending_failure = Some(error); }

    /// Fail the next `consume_bytes` with `error`.
    pub fn fail_consume_with(&mut self, error: Http2Error) { self.consume_failure = Some(error); }

    /// Fail the upgrade performed on channel activation with `error`.
    pub fn fail_upgrade_with(&mut self, error: Http2Error) { self.upgrade_failure = Some(error); }

    /// Streams the codec still considers open.
    #[must_use]
    pub fn open_streams(&self) -> Vec<StreamId> { self.open_streams.iter().copied().collect() }

    fn emit(&self, channel: &mut Channel, call: CodecCall, promise: WritePromise) {
        let record = Bytes::from(format!("{call:?}\n"));
        self.journal.record(Entry::Codec(call));
        channel.write(record, promise);
    }

    fn parse_line(&mut self, line: &str) -> CodecEvent {
        let mut parts = line.splitn(3, ' ');
        let keyword = parts.next().unwrap_or_default();
        let id = parts
            .next()
            .and_then(|raw| raw.parse::<u32>().ok())
            .map(StreamId::new);
        match (keyword, id) {
            ("SETTINGS", None) => FrameEvent::Settings(Settings::default()).into(),
            ("PING", None) => FrameEvent::Ping(PingPayload::default()).into(),
            ("HEADERS", Some(stream_id)) => {
                self.open_streams.insert(stream_id);
                self.last_remote_stream_id = self.last_remote_stream_id.max(stream_id);
                FrameEvent::Headers {
                    stream_id,
                    headers: Headers::new().with(":path", "/"),
                    priority: Some(Priority::default()),
                    padding: 0,
                    end_of_stream: false,
                }
                .into()
            }
            ("DATA", Some(stream_id)) => {
                let data = Bytes::from(parts.next().unwrap_or_default().to_owned());
                let window_bytes = u32::try_from(data.len()).unwrap_or(u32::MAX);
                FrameEvent::Data {
                    stream_id,
                    data,
                    padding: 0,
                    end_of_stream: false,
                    window_bytes,
                }
                .into()
            }
            ("GOAWAY", Some(last_stream_id)) => CodecEvent::GoAway(GoAwayEvent {
                direction: GoAwayDirection::Received,
                last_stream_id,
                error_code: ErrorCode::NO_ERROR,
                debug_data: Bytes::new(),
            }),
            ("CLOSE", Some(stream_id)) => {
                self.open_streams.remove(&stream_id);
                StreamEvent::Closed(stream_id).into()
            }
            _ => Http2Error::connection(ErrorCode::PROTOCOL_ERROR, format!("unreadable frame: {line}"))
                .into(),
        }
    }
}

impl Http2Codec for RecordingCodec {
    fn channel_active(&mut self, channel: &mut Channel) {
        self.emit(channel, CodecCall::Preface, WritePromise::void());
    }

    fn channel_inactive(&mut self, channel: &mut Channel) {
        self.journal.record(Entry::Codec(CodecCall::Inactive));
        for stream_id in std::mem::take(&mut self.open_streams) {
            channel.notify(StreamEvent::Closed(stream_id).into());
        }
    }

    fn on_http_server_upgrade(
        &mut self,
        _channel: &mut Channel,
        settings: &Settings,
    ) -> Result<(), Http2Error> {
        self.journal
            .record(Entry::Codec(CodecCall::ServerUpgrade(*settings)));
        self.open_streams.insert(StreamId::new(1));
        self.last_remote_stream_id = StreamId::new(1);
        self.upgrade_failure.take().map_or(Ok(()), Err)
    }

    fn on_http_client_upgrade(&mut self, _channel: &mut Channel) -> Result<(), Http2Error> {
        self.journal.record(Entry::Codec(CodecCall::ClientUpgrade));
        self.open_streams.insert(StreamId::new(1));
        self.upgrade_failure.take().map_or(Ok(()), Err)
    }

    fn decode(&mut self, _channel: &mut Channel, src: &mut BytesMut, out: &mut Vec<CodecEvent>) {
        out.extend(self.scripted.drain(..));
        while let Some(end) = src.iter().position(|byte| *byte == b'\n') {
            let line = src.split_to(end + 1);
            let text = String::from_utf8_lossy(&line[..end]).trim().to_owned();
            if !text.is_empty() {
                out.push(self.parse_line(&text));
            }
        }
    }

    fn write_headers(
        &mut self,
        channel: &mut Channel,
        stream_id: StreamId,
        _headers: &Headers,
        _padding: u8,
        end_of_stream: bool,
        promise: WritePromise,
    ) {
        self.open_streams.insert(stream_id);
        self.emit(
            channel,
            CodecCall::Headers {
                stream_id,
                end_of_stream,
            },
            promise,
        );
    }

    fn write_data(
        &mut self,
        channel: &mut Channel,
        stream_id: StreamId,
        data: Bytes,
        _padding: u8,
        end_of_stream: bool,
        promise: WritePromise,
    ) {
        self.emit(
            channel,
            CodecCall::Data {
                stream_id,
                data,
                end_of_stream,
            },
            promise,
        );
    }

    fn write_ping(
        &mut self,
        channel: &mut Channel,
        _ack: bool,
        payload: PingPayload,
        promise: WritePromise,
    ) {
        self.emit(channel, CodecCall::Ping(payload), promise);
    }

    fn write_rst_stream(
        &mut self,
        channel: &mut Channel,
        stream_id: StreamId,
        error_code: ErrorCode,
        promise: WritePromise,
    ) {
        self.emit(
            channel,
            CodecCall::Reset {
                stream_id,
                error_code,
            },
            promise,
        );
        if self.open_streams.remove(&stream_id) {
            channel.notify(StreamEvent::Closed(stream_id).into());
        }
    }

    fn write_go_away(
        &mut self,
        channel: &mut Channel,
        last_stream_id: StreamId,
        error_code: ErrorCode,
        debug_data: Bytes,
        promise: WritePromise,
    ) {
        self.emit(
            channel,
            CodecCall::GoAway {
                last_stream_id,
                error_code,
            },
            promise,
        );
        channel.notify(CodecEvent::GoAway(GoAwayEvent {
            direction: GoAwayDirection::Sent,
            last_stream_id,
            error_code,
            debug_data,
        }));
    }

    fn write_settings(&mut self, channel: &mut Channel, settings: &Settings, promise: WritePromise) {
        self.emit(channel, CodecCall::Settings(*settings), promise);
    }

    fn write_push_promise(
        &mut self,
        channel: &mut Channel,
        stream_id: StreamId,
        promised_stream_id: StreamId,
        _headers: &Headers,
        _padding: u8,
        promise: WritePromise,
    ) {
        self.open_streams.insert(promised_stream_id);
        self.emit(
            channel,
            CodecCall::PushPromise {
                stream_id,
                promised_stream_id,
            },
            promise,
        );
    }

    fn write_frame(
        &mut self,
        channel: &mut Channel,
        frame_type: u8,
        stream_id: StreamId,
        _flags: FrameFlags,
        _payload: Bytes,
        promise: WritePromise,
    ) {
        self.emit(
            channel,
            CodecCall::Frame {
                frame_type,
                stream_id,
            },
            promise,
        );
    }

    fn is_writable(&self, stream_id: StreamId) -> bool { !self.unwritable.contains(&stream_id) }

    fn write_pending_bytes(&mut self, channel: &mut Channel) -> Result<(), Http2Error> {
        if let Some(error) = self.pending_failure.take() {
            return Err(error);
        }
        self.emit(channel, CodecCall::WritePending, WritePromise::void());
        Ok(())
    }

    fn consume_bytes(
        &mut self,
        channel: &mut Channel,
        stream_id: StreamId,
        num_bytes: u32,
    ) -> Result<bool, Http2Error> {
        if let Some(error) = self.consume_failure.take() {
            return Err(error);
        }
        if !self.window_update_on_consume {
            return Ok(false);
        }
        self.emit(
            channel,
            CodecCall::WindowUpdate {
                stream_id,
                num_bytes,
            },
            WritePromise::void(),
        );
        Ok(true)
    }

    fn last_remote_stream_id(&self) -> StreamId { self.last_remote_stream_id }
}

type Responder = Box<dyn FnMut(&mut Writer<'_>, StreamId) + Send + 'static>;

/// Connection double that records every callback.
pub struct RecordingConnection {
    journal: Journal,
    on_headers: Option<Responder>,
    on_settings: Option<Box<dyn FnMut(&mut Writer<'_>) + Send + 'static>>,
    on_stream_error: Option<Box<dyn FnMut(StreamId) + Send + 'static>>,
}

impl std::fmt::Debug for RecordingConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingConnection").finish_non_exhaustive()
    }
}

impl RecordingConnection {
    #[must_use]
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            on_headers: None,
            on_settings: None,
            on_stream_error: None,
        }
    }

    /// Run `responder` after every `HEADERS` read.
    #[must_use]
    pub fn respond_to_headers<F>(mut self, responder: F) -> Self
    where
        F: FnMut(&mut Writer<'_>, StreamId) + Send + 'static,
    {
        self.on_headers = Some(Box::new(responder));
        self
    }

    /// Run `action` after the peer's first `SETTINGS` was recorded.
    #[must_use]
    pub fn on_settings<F>(mut self, action: F) -> Self
    where
        F: FnMut(&mut Writer<'_>) + Send + 'static,
    {
        self.on_settings = Some(Box::new(action));
        self
    }

    /// Run `action` after every stream error was recorded.
    #[must_use]
    pub fn react_to_stream_errors<F>(mut self, action: F) -> Self
    where
        F: FnMut(StreamId) + Send + 'static,
    {
        self.on_stream_error = Some(Box::new(action));
        self
    }

    fn record(&self, call: ConnectionCall) { self.journal.record(Entry::Connection(call)); }
}

impl Connection for RecordingConnection {
    fn on_settings_read(&mut self, writer: &mut Writer<'_>, settings: &Settings) {
        self.record(ConnectionCall::SettingsRead(*settings));
        if let Some(action) = self.on_settings.as_mut() {
            action(writer);
        }
    }

    fn on_headers_read(
        &mut self,
        writer: &mut Writer<'_>,
        stream_id: StreamId,
        headers: Headers,
        priority: Priority,
        _padding: u8,
        end_of_stream: bool,
    ) {
        self.record(ConnectionCall::HeadersRead {
            stream_id,
            headers,
            priority,
            end_of_stream,
        });
        if let Some(responder) = self.on_headers.as_mut() {
            responder(writer, stream_id);
        }
    }

    fn on_frame(&mut self, writer: &mut Writer<'_>, frame: FrameEvent) {
        match frame {
            FrameEvent::Headers {
                stream_id,
                headers,
                priority: Some(priority),
                padding,
                end_of_stream,
            } => self.on_headers_read(writer, stream_id, headers, priority, padding, end_of_stream),
            other => self.record(ConnectionCall::Frame(other)),
        }
    }

    fn on_go_away_sent(&mut self, last_stream_id: StreamId, error_code: ErrorCode, _debug_data: &Bytes) {
        self.record(ConnectionCall::GoAwaySent {
            last_stream_id,
            error_code,
        });
    }

    fn on_go_away_received(
        &mut self,
        last_stream_id: StreamId,
        error_code: ErrorCode,
        _debug_data: &Bytes,
    ) {
        self.record(ConnectionCall::GoAwayReceived {
            last_stream_id,
            error_code,
        });
    }

    fn on_stream_closed(&mut self, _writer: &mut Writer<'_>, stream_id: StreamId) {
        self.record(ConnectionCall::StreamClosed(stream_id));
    }

    fn on_stream_writability_changed(&mut self, _writer: &mut Writer<'_>, stream_id: StreamId) {
        self.record(ConnectionCall::WritabilityChanged(stream_id));
    }

    fn on_connection_error(&mut self, cause: &Http2Error) {
        self.record(ConnectionCall::ConnectionError(cause.code()));
    }

    fn on_stream_error(&mut self, stream_id: StreamId, cause: &Http2Error) {
        self.record(ConnectionCall::StreamError(stream_id, cause.code()));
        if let Some(action) = self.on_stream_error.as_mut() {
            action(stream_id);
        }
    }

    fn handle_closed(&mut self) { self.record(ConnectionCall::Closed); }
}

/// Content encoding understood by [`test_decompressors`]: upper-cases ASCII.
pub const UPPERCASE_ENCODING: &str = "x-upper";
/// Content encoding understood by [`test_decompressors`]: always fails.
pub const FAILING_ENCODING: &str = "x-fail";

struct Uppercase;

impl Decompressor for Uppercase {
    fn decompress(&mut self, input: &[u8]) -> io::Result<Bytes> {
        Ok(Bytes::from(input.to_ascii_uppercase()))
    }
}

struct Failing;

impl Decompressor for Failing {
    fn decompress(&mut self, _input: &[u8]) -> io::Result<Bytes> {
        Err(io::Error::new(io::ErrorKind::InvalidData, "corrupt block"))
    }
}

/// Decompressor factory for [`UPPERCASE_ENCODING`] and [`FAILING_ENCODING`].
#[must_use]
pub fn test_decompressors(encoding: &str) -> Option<Box<dyn Decompressor>> {
    match encoding {
        UPPERCASE_ENCODING => Some(Box::new(Uppercase)),
        FAILING_ENCODING => Some(Box::new(Failing)),
        _ => None,
    }
}

/// Parse the text records written by [`RecordingCodec`].
#[must_use]
pub fn records(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::to_owned)
        .collect()
}
