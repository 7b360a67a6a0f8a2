//! The HTTP/2 connection bridge.
//!
//! [`Http2Bridge`] owns the codec, the channel, and the lazily created
//! [`Connection`]. It is driven by an event loop through a small set of entry
//! points (`channel_active`, `decode`, `apply`, `user_event`,
//! `channel_inactive`). Each entry point runs inside the bridge's dispatch
//! scope and, before returning, settles everything the work produced: faults
//! raised at write sites, inline commands, and codec notifications.

mod lifecycle;
mod slot;
mod translate;


use std::{fmt, sync::Arc};

use bytes::BytesMut;
pub use lifecycle::LifecycleState;
use log::debug;
pub(crate) use slot::{ConnectionSlot, InboundRoute};

use crate::{
    channel::Channel,
    codec::Http2Codec,
    connection::Connection,
    decompress::DecompressorFactory,
    dispatch::{self, Command, CommandQueue, Dispatcher, LoopId},
    event::CodecEvent,
    frame::{Role, Settings},
    handle::BridgeHandle,
    hooks::BridgeHooks,
    stream_ids::LocalStreamIds,
    write_path::Writer,
};

/// Creates the connection once the peer's first `SETTINGS` arrives.
pub type ConnectionFactory<C> = Box<dyn FnOnce(&BridgeHandle) -> C + Send + 'static>;

/// How this HTTP/2 session was started from HTTP/1.1.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Upgrade {
    /// Server side; carries the settings decoded from `HTTP2-Settings`.
    Server(Settings),
    /// Client side; stream 1 belongs to the upgrade request.
    Client,
}

pub(crate) struct BridgeParts<C, K> {
    pub(crate) codec: K,
    pub(crate) factory: ConnectionFactory<C>,
    pub(crate) hooks: BridgeHooks<C>,
    pub(crate) decompressor: Option<Arc<dyn DecompressorFactory>>,
    pub(crate) upgrade: Option<Upgrade>,
    pub(crate) role: Role,
}

/// Adapter between an HTTP/2 frame codec and an application [`Connection`].
pub struct Http2Bridge<C, K> {
    id: LoopId,
    codec: K,
    channel: Channel,
    slot: ConnectionSlot<C>,
    factory: Option<ConnectionFactory<C>>,
    hooks: BridgeHooks<C>,
    decompressor: Option<Arc<dyn DecompressorFactory>>,
    upgrade: Option<Upgrade>,
    state: LifecycleState,
    handle: BridgeHandle,
    stream_ids: Arc<LocalStreamIds>,
}

impl<C, K> fmt::Debug for Http2Bridge<C, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Http2Bridge")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("connection", &self.slot.is_present())
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

impl<C, K> Http2Bridge<C, K>
where
    C: Connection,
    K: Http2Codec,
{
    pub(crate) fn new(parts: BridgeParts<C, K>) -> (Self, CommandQueue) {
        let BridgeParts {
            codec,
            factory,
            hooks,
            decompressor,
            upgrade,
            role,
        } = parts;
        let id = LoopId::next();
        let (dispatcher, queue) = Dispatcher::new(id);
        let upgraded = matches!(upgrade, Some(Upgrade::Client));
        let stream_ids = Arc::new(LocalStreamIds::new(role, upgraded));
        let handle = BridgeHandle::new(dispatcher, Arc::clone(&stream_ids));
        debug!("bridge created: loop_id={id}, role={role:?}, upgrade={upgrade:?}");
        let bridge = Self {
            id,
            codec,
            channel: Channel::new(),
            slot: ConnectionSlot::Absent,
            factory: Some(factory),
            hooks,
            decompressor,
            upgrade,
            state: LifecycleState::Created,
            handle,
            stream_ids,
        };
        (bridge, queue)
    }

    /// Identifier of the event loop that owns this bridge.
    #[must_use]
    pub fn loop_id(&self) -> LoopId { self.id }

    /// A handle for writing from other tasks or threads.
    #[must_use]
    pub fn handle(&self) -> BridgeHandle { self.handle.clone() }

    #[must_use]
    pub fn state(&self) -> LifecycleState { self.state }

    /// Returns `true` once the peer's first `SETTINGS` created the connection.
    #[must_use]
    pub fn is_established(&self) -> bool { self.slot.is_present() }

    /// Returns `true` if inbound `DATA` is decoded before reaching the
    /// connection.
    #[must_use]
    pub fn is_decompressing(&self) -> bool {
        matches!(&self.slot, ConnectionSlot::Present { route, .. } if route.is_decompressing())
    }

    #[must_use]
    pub fn connection(&self) -> Option<&C> { self.slot.connection() }

    #[must_use]
    pub fn codec(&self) -> &K { &self.codec }

    pub fn codec_mut(&mut self) -> &mut K { &mut self.codec }

    #[must_use]
    pub fn channel(&self) -> &Channel { &self.channel }

    /// Mutable access to the channel, used by the event loop to take flushed
    /// frames.
    pub fn channel_mut(&mut self) -> &mut Channel { &mut self.channel }

    /// Decode inbound bytes and route every resulting event.
    pub fn decode(&mut self, src: &mut BytesMut) {
        self.enter(|bridge| {
            let mut events = Vec::new();
            bridge.codec.decode(&mut bridge.channel, src, &mut events);
            for event in events {
                bridge.route(event);
                bridge.settle();
            }
        });
    }

    /// Route one codec event as if it had just been decoded.
    pub fn handle_event(&mut self, event: CodecEvent) { self.enter(|bridge| bridge.route(event)); }

    /// Run a command taken from the bridge's [`CommandQueue`].
    pub fn apply(&mut self, command: Command) {
        self.enter(|bridge| bridge.writer().apply(command));
    }

    /// Write inline on the owning loop.
    pub fn write<R>(&mut self, f: impl FnOnce(&mut Writer<'_>) -> R) -> R {
        self.enter(|bridge| f(&mut bridge.writer()))
    }

    /// Run `f` against the connection, if it exists, on the owning loop.
    pub fn with_connection<R>(&mut self, f: impl FnOnce(&mut C, &mut Writer<'_>) -> R) -> Option<R> {
        self.enter(|bridge| {
            let Self {
                codec,
                channel,
                slot,
                stream_ids,
                ..
            } = bridge;
            let connection = slot.connection_mut()?;
            let mut writer = Writer::new(codec, channel, stream_ids);
            Some(f(connection, &mut writer))
        })
    }

    fn writer(&mut self) -> Writer<'_> {
        Writer::new(&mut self.codec, &mut self.channel, &self.stream_ids)
    }

    /// Run `f` inside this bridge's dispatch scope, then settle.
    fn enter<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        dispatch::enter(self.id, || {
            let result = f(self);
            self.settle();
            result
        })
    }

    /// Apply commands queued inline on this loop. Returns `false` if none
    /// were queued.
    fn catch_up(&mut self) -> bool {
        let inline = dispatch::take_inline();
        if inline.is_empty() {
            return false;
        }
        let mut writer = self.writer();
        for command in inline {
            writer.apply(command);
        }
        true
    }

    /// Process write faults, inline commands, and codec notifications until
    /// none remain.
    fn settle(&mut self) {
        loop {
            if let Some(fault) = self.channel.take_fault() {
                self.on_exception(fault);
                continue;
            }
            if self.catch_up() {
                continue;
            }
            if let Some(event) = self.channel.take_notification() {
                self.route(event);
                continue;
            }
            break;
        }
    }
}
