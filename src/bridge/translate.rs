//! Translation of codec events into connection callbacks.

use std::sync::Arc;

use log::{debug, info};
use tracing::trace;

use super::{ConnectionSlot, Http2Bridge, InboundRoute, LifecycleState};
use crate::{
    codec::Http2Codec,
    connection::Connection,
    decompress::DecompressingListener,
    error::{BridgeError, Result},
    event::{CodecEvent, FrameEvent, FrameKind, GoAwayDirection, GoAwayEvent, StreamEvent},
    frame::{Settings, StreamId},
    metrics::{self, Direction},
    write_path::Writer,
};

impl<C, K> Http2Bridge<C, K>
where
    C: Connection,
    K: Http2Codec,
{
    /// Deliver one codec event. Events reaching a closed bridge are dropped.
    pub(super) fn route(&mut self, event: CodecEvent) {
        if self.state == LifecycleState::Closed {
            debug!("event dropped after close: loop_id={}, event={event:?}", self.id);
            return;
        }
        match event {
            CodecEvent::Frame(frame) => {
                metrics::inc_frames(Direction::Inbound);
                if let Err(err) = self.on_frame(frame) {
                    self.on_exception(err);
                }
            }
            CodecEvent::Stream(event) => self.on_stream_event(event),
            CodecEvent::GoAway(event) => self.on_go_away(event),
            CodecEvent::WritabilityChanged(stream_id) => self.on_writability_changed(stream_id),
            CodecEvent::Error(err) => {
                metrics::inc_errors("protocol");
                self.on_error(err);
            }
        }
    }

    fn on_frame(&mut self, frame: FrameEvent) -> Result<()> {
        if !self.slot.is_present() {
            return match frame {
                FrameEvent::Settings(settings) => self.establish(&settings),
                FrameEvent::Headers {
                    priority: Some(_), ..
                } => Err(BridgeError::ConnectionAbsent(FrameKind::PriorityHeaders)),
                other => Err(BridgeError::Unsupported(other.kind())),
            };
        }
        let Self {
            codec,
            channel,
            slot,
            stream_ids,
            ..
        } = self;
        let ConnectionSlot::Present { connection, route } = slot else {
            return Ok(());
        };
        let mut writer = Writer::new(codec, channel, stream_ids);
        let listener = match route {
            InboundRoute::Direct => {
                connection.on_frame(&mut writer, frame);
                return Ok(());
            }
            InboundRoute::Decompressing(listener) => listener,
        };
        let mut frames = Vec::with_capacity(1);
        let decoded = listener.process(frame, &mut frames);
        for frame in frames {
            connection.on_frame(&mut writer, frame);
        }
        if let Err(err) = decoded {
            metrics::inc_errors("protocol");
            self.on_error(err);
        }
        Ok(())
    }

    /// Create the connection for the peer's first `SETTINGS`.
    fn establish(&mut self, settings: &Settings) -> Result<()> {
        let factory = self
            .factory
            .take()
            .ok_or(BridgeError::ConnectionAbsent(FrameKind::Settings))?;
        let mut connection = factory(&self.handle);
        let route = match &self.decompressor {
            Some(factory) => {
                InboundRoute::Decompressing(DecompressingListener::new(Arc::clone(factory)))
            }
            None => InboundRoute::Direct,
        };
        info!(
            "connection established: loop_id={}, decompressing={}",
            self.id,
            route.is_decompressing()
        );
        self.state.advance(LifecycleState::SettingsReceived);
        {
            let mut writer = self.writer();
            connection.on_settings_read(&mut writer, settings);
        }
        self.hooks.connection_established(&mut connection);
        self.slot = ConnectionSlot::Present { connection, route };
        Ok(())
    }

    fn on_stream_event(&mut self, event: StreamEvent) {
        let StreamEvent::Closed(stream_id) = event else {
            trace!(?event, "stream transition ignored");
            return;
        };
        let Self {
            codec,
            channel,
            slot,
            stream_ids,
            ..
        } = self;
        match slot {
            ConnectionSlot::Present { connection, route } => {
                route.stream_closed(stream_id);
                let mut writer = Writer::new(codec, channel, stream_ids);
                connection.on_stream_closed(&mut writer, stream_id);
            }
            ConnectionSlot::Absent => {
                debug!("stream closed before connection: stream={stream_id}");
            }
        }
    }

    fn on_go_away(&mut self, event: GoAwayEvent) {
        let GoAwayEvent {
            direction,
            last_stream_id,
            error_code,
            debug_data,
        } = event;
        let Some(connection) = self.slot.connection_mut() else {
            debug!(
                "goaway before connection: direction={direction:?}, last_stream={last_stream_id}, \
                 code={error_code}"
            );
            return;
        };
        match direction {
            GoAwayDirection::Sent => {
                connection.on_go_away_sent(last_stream_id, error_code, &debug_data);
            }
            GoAwayDirection::Received => {
                connection.on_go_away_received(last_stream_id, error_code, &debug_data);
            }
        }
    }

    fn on_writability_changed(&mut self, stream_id: StreamId) {
        let Self {
            codec,
            channel,
            slot,
            stream_ids,
            ..
        } = self;
        let Some(connection) = slot.connection_mut() else {
            debug!("writability change before connection: stream={stream_id}");
            return;
        };
        let mut writer = Writer::new(codec, channel, stream_ids);
        connection.on_stream_writability_changed(&mut writer, stream_id);
    }
}
