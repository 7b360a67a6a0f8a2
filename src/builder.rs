//! Builder for configuring a bridge.

use std::{fmt, sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::{
    bridge::{BridgeParts, Http2Bridge, Upgrade},
    codec::Http2Codec,
    connection::Connection,
    decompress::DecompressorFactory,
    dispatch::CommandQueue,
    event_loop::EventLoop,
    frame::{Role, Settings},
    handle::BridgeHandle,
    hooks::BridgeHooks,
    idle::IdleConfig,
};

/// Default capacity of the event loop's read buffer.
pub const DEFAULT_READ_BUFFER_CAPACITY: usize = 16 * 1024;

/// Builder for [`Http2Bridge`] and its [`EventLoop`].
///
/// Everything configured here is fixed once the bridge is built. The codec
/// owns protocol configuration such as the initial local settings; the
/// builder only decides how the bridge around it behaves.
pub struct BridgeBuilder<C, K> {
    codec: K,
    factory: Box<dyn FnOnce(&BridgeHandle) -> C + Send + 'static>,
    role: Role,
    upgrade: Option<Upgrade>,
    decompressor: Option<Arc<dyn DecompressorFactory>>,
    idle: IdleConfig,
    read_buffer_capacity: usize,
    hooks: BridgeHooks<C>,
}

impl<C, K> fmt::Debug for BridgeBuilder<C, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeBuilder")
            .field("role", &self.role)
            .field("upgrade", &self.upgrade)
            .field("decompression", &self.decompressor.is_some())
            .field("idle", &self.idle)
            .field("read_buffer_capacity", &self.read_buffer_capacity)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl<C, K> BridgeBuilder<C, K>
where
    C: Connection,
    K: Http2Codec,
{
    /// Start configuring a server-side bridge around `codec`.
    ///
    /// `factory` runs once, when the peer's first `SETTINGS` frame arrives,
    /// and receives the handle the connection can keep for off-loop writes.
    pub fn new<F>(codec: K, factory: F) -> Self
    where
        F: FnOnce(&BridgeHandle) -> C + Send + 'static,
    {
        Self {
            codec,
            factory: Box::new(factory),
            role: Role::Server,
            upgrade: None,
            decompressor: None,
            idle: IdleConfig::default(),
            read_buffer_capacity: DEFAULT_READ_BUFFER_CAPACITY,
            hooks: BridgeHooks::default(),
        }
    }

    /// Set which side of the session this bridge represents.
    #[must_use]
    pub fn role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Continue a server-side HTTP/1.1 upgrade. `settings` are the values
    /// decoded from the request's `HTTP2-Settings` header and are applied as
    /// if received when the channel becomes active.
    #[must_use]
    pub fn server_upgrade(mut self, settings: Settings) -> Self {
        self.role = Role::Server;
        self.upgrade = Some(Upgrade::Server(settings));
        self
    }

    /// Continue a client-side HTTP/1.1 upgrade. Stream 1 belongs to the
    /// upgrade request, so locally initiated streams start at 3.
    #[must_use]
    pub fn client_upgrade(mut self) -> Self {
        self.role = Role::Client;
        self.upgrade = Some(Upgrade::Client);
        self
    }

    /// Decode inbound bodies with decoders from `factory`.
    #[must_use]
    pub fn decompressor(mut self, factory: impl DecompressorFactory) -> Self {
        self.decompressor = Some(Arc::new(factory));
        self
    }

    /// Decode `gzip` and `deflate` bodies with the built-in decoders.
    #[cfg(feature = "decompression")]
    #[must_use]
    pub fn content_decoders(self) -> Self { self.decompressor(crate::decompress::ContentDecoders) }

    /// Configure idle detection.
    #[must_use]
    pub fn idle(mut self, config: IdleConfig) -> Self {
        self.idle = config;
        self
    }

    /// Close the connection after `timeout` without reads or writes.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle.all = Some(timeout);
        self
    }

    /// Set the initial capacity of the event loop's read buffer.
    #[must_use]
    pub fn read_buffer_capacity(mut self, capacity: usize) -> Self {
        debug_assert!(capacity > 0, "capacity must be greater than zero");
        self.read_buffer_capacity = capacity;
        self
    }

    /// Run `hook` after the connection has handled the peer's first
    /// `SETTINGS`.
    #[must_use]
    pub fn on_connection_established<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&mut C) + Send + 'static,
    {
        self.hooks.on_connection_established.push(Box::new(hook));
        self
    }

    /// Run `hook` after the connection has been told the transport closed.
    #[must_use]
    pub fn on_connection_removed<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&mut C) + Send + 'static,
    {
        self.hooks.on_connection_removed.push(Box::new(hook));
        self
    }

    /// Build the bridge and the queue of commands submitted through its
    /// handles.
    ///
    /// The caller drives the bridge: it must call
    /// [`Http2Bridge::apply`] for every queued command.
    #[must_use]
    pub fn build(self) -> (Http2Bridge<C, K>, CommandQueue) {
        let Self {
            codec,
            factory,
            role,
            upgrade,
            decompressor,
            hooks,
            ..
        } = self;
        Http2Bridge::new(BridgeParts {
            codec,
            factory,
            hooks,
            decompressor,
            upgrade,
            role,
        })
    }

    /// Build the bridge together with an event loop that drives it.
    #[must_use]
    pub fn build_event_loop(self, shutdown: CancellationToken) -> (EventLoop<C, K>, BridgeHandle) {
        let idle = self.idle;
        let read_buffer_capacity = self.read_buffer_capacity;
        let (bridge, commands) = self.build();
        let handle = bridge.handle();
        let event_loop = EventLoop::new(bridge, commands, shutdown)
            .with_idle(idle)
            .with_read_buffer_capacity(read_buffer_capacity);
        (event_loop, handle)
    }
}
