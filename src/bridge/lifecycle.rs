//! Channel lifecycle, error handling, and teardown.

use log::{debug, error, info, warn};

use super::{ConnectionSlot, Http2Bridge, Upgrade};
use crate::{
    codec::Http2Codec,
    connection::Connection,
    error::{BridgeError, Http2Error},
    frame::ErrorCode,
    idle::IdleState,
    metrics,
};

/// Progress of a bridge through its life.
///
/// States only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    /// Built, transport not yet active.
    Created,
    /// The connection preface has been written.
    PrefaceSent,
    /// The peer's first `SETTINGS` created the connection.
    SettingsReceived,
    /// A close was requested; the transport is still up.
    Closing,
    /// The transport is gone. No further events are delivered.
    Closed,
}

impl LifecycleState {
    pub(crate) fn advance(&mut self, next: Self) {
        if next > *self {
            *self = next;
        }
    }
}

impl<C, K> Http2Bridge<C, K>
where
    C: Connection,
    K: Http2Codec,
{
    /// The transport became active: write the preface, apply any HTTP/1.1
    /// upgrade, and flush.
    pub fn channel_active(&mut self) {
        self.enter(|bridge| {
            bridge.codec.channel_active(&mut bridge.channel);
            bridge.state.advance(LifecycleState::PrefaceSent);
            let upgraded = match bridge.upgrade.take() {
                Some(Upgrade::Server(settings)) => {
                    bridge.codec.on_http_server_upgrade(&mut bridge.channel, &settings)
                }
                Some(Upgrade::Client) => bridge.codec.on_http_client_upgrade(&mut bridge.channel),
                None => Ok(()),
            };
            if let Err(err) = upgraded {
                bridge.channel.raise(err.into());
            }
            bridge.channel.flush();
            info!("bridge active: loop_id={}", bridge.id);
        });
    }

    /// The transport is gone.
    ///
    /// The codec releases its streams first, then the connection learns the
    /// transport closed and the removed hooks run. Nothing reaches the
    /// connection afterwards.
    pub fn channel_inactive(&mut self) {
        if self.state == LifecycleState::Closed {
            return;
        }
        self.enter(|bridge| {
            bridge.catch_up();
            bridge.codec.channel_inactive(&mut bridge.channel);
            bridge.settle();
            bridge.channel.mark_inactive();
            match &mut bridge.slot {
                ConnectionSlot::Present { connection, .. } => {
                    connection.execute_from_io(C::handle_closed);
                    bridge.hooks.connection_removed(connection);
                }
                ConnectionSlot::Absent => {
                    debug!("bridge closed before connection: loop_id={}", bridge.id);
                }
            }
            bridge.state = LifecycleState::Closed;
            info!("bridge inactive: loop_id={}", bridge.id);
        });
    }

    /// Idle notifications. Only combined read and write idleness closes the
    /// channel.
    pub fn user_event(&mut self, event: IdleState) {
        self.enter(|bridge| match event {
            IdleState::AllIdle => {
                info!("closing idle connection: loop_id={}", bridge.id);
                bridge.close();
            }
            IdleState::ReaderIdle | IdleState::WriterIdle => {
                debug!("idle event ignored: loop_id={}, event={event:?}", bridge.id);
            }
        });
    }

    /// An error escaped from processing on the loop. Protocol errors take the
    /// usual connection or stream error path; the channel is closed either
    /// way.
    pub fn exception_caught(&mut self, err: BridgeError) {
        self.enter(|bridge| bridge.on_exception(err));
    }

    /// Ask the event loop to close the transport.
    pub fn close(&mut self) {
        self.channel.close();
        self.state.advance(LifecycleState::Closing);
    }

    pub(super) fn on_exception(&mut self, err: BridgeError) {
        if self.state >= LifecycleState::Closing || self.channel.is_close_requested() {
            debug!("error while closing ignored: loop_id={}, error={err}", self.id);
            return;
        }
        if err.is_contract_violation() {
            error!("bridge contract violated: loop_id={}, error={err}", self.id);
            metrics::inc_errors("contract");
        } else {
            warn!("uncaught bridge error: loop_id={}, error={err}", self.id);
            metrics::inc_errors("exception");
        }
        let cause = match err {
            BridgeError::Protocol(cause) => cause,
            other => Http2Error::connection(ErrorCode::INTERNAL_ERROR, other.to_string()),
        };
        self.on_error(cause);
        self.close();
    }

    /// Notify the connection of a protocol error, then let the codec react
    /// with `RST_STREAM` or `GOAWAY`. Writes the connection issued from its
    /// callback go out before the codec's reaction.
    pub(super) fn on_error(&mut self, cause: Http2Error) {
        match cause.stream_id() {
            Some(stream_id) => {
                warn!(
                    "stream error: loop_id={}, stream={stream_id}, code={}",
                    self.id,
                    cause.code()
                );
                if let Some(connection) = self.slot.connection_mut() {
                    connection.execute_from_io(|c| c.on_stream_error(stream_id, &cause));
                }
                self.catch_up();
                self.codec
                    .on_stream_error(&mut self.channel, stream_id, &cause);
            }
            None => {
                warn!(
                    "connection error: loop_id={}, code={}, error={cause}",
                    self.id,
                    cause.code()
                );
                if let Some(connection) = self.slot.connection_mut() {
                    connection.execute_from_io(|c| c.on_connection_error(&cause));
                }
                self.catch_up();
                self.codec.on_connection_error(&mut self.channel, &cause);
            }
        }
    }
}
