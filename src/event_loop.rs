//! Event loop driving one bridge over an async transport.
//!
//! The loop owns the bridge exclusively. It polls a shutdown token, the
//! bridge's command queue, the transport, and the idle timer using a
//! `tokio::select!` loop. The `biased` keyword ensures shutdown is observed
//! first and queued commands run before more input is decoded. After every
//! step the frames the bridge flushed are written to the transport and their
//! promises completed.

use std::{
    future,
    panic::AssertUnwindSafe,
    sync::atomic::{AtomicU64, Ordering},
};

use bytes::BytesMut;
use futures::FutureExt;
use log::{debug, error, info, warn};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    task::JoinHandle,
    time::{Instant, sleep_until},
};
use tokio_util::sync::CancellationToken;

use crate::{
    bridge::Http2Bridge,
    builder::DEFAULT_READ_BUFFER_CAPACITY,
    channel::{Channel, Outbound},
    codec::Http2Codec,
    connection::Connection,
    dispatch::CommandQueue,
    error::{BridgeError, Result},
    idle::{IdleConfig, IdleTracker},
    metrics,
    panic::format_panic,
};

static ACTIVE_BRIDGES: AtomicU64 = AtomicU64::new(0);

/// RAII guard counting running event loops.
struct ActiveBridge;

impl ActiveBridge {
    fn new() -> Self {
        ACTIVE_BRIDGES.fetch_add(1, Ordering::Relaxed);
        metrics::inc_bridges();
        Self
    }
}

impl Drop for ActiveBridge {
    fn drop(&mut self) {
        ACTIVE_BRIDGES.fetch_sub(1, Ordering::Relaxed);
        metrics::dec_bridges();
    }
}

/// Return the number of event loops currently running.
#[must_use]
pub fn active_bridge_count() -> u64 { ACTIVE_BRIDGES.load(Ordering::Relaxed) }

/// Drives an [`Http2Bridge`] over a transport until either side closes.
pub struct EventLoop<C, K> {
    bridge: Http2Bridge<C, K>,
    commands: CommandQueue,
    shutdown: CancellationToken,
    idle: IdleConfig,
    read_buffer_capacity: usize,
}

impl<C, K> EventLoop<C, K>
where
    C: Connection,
    K: Http2Codec,
{
    #[must_use]
    pub fn new(bridge: Http2Bridge<C, K>, commands: CommandQueue, shutdown: CancellationToken) -> Self {
        Self {
            bridge,
            commands,
            shutdown,
            idle: IdleConfig::default(),
            read_buffer_capacity: DEFAULT_READ_BUFFER_CAPACITY,
        }
    }

    #[must_use]
    pub fn with_idle(mut self, idle: IdleConfig) -> Self {
        self.idle = idle;
        self
    }

    #[must_use]
    pub fn with_read_buffer_capacity(mut self, capacity: usize) -> Self {
        self.read_buffer_capacity = capacity;
        self
    }

    #[must_use]
    pub fn bridge(&self) -> &Http2Bridge<C, K> { &self.bridge }

    /// Run until the peer closes the transport, the bridge asks to close, or
    /// shutdown is requested. Returns the bridge after teardown.
    pub async fn run<T>(self, mut transport: T) -> Http2Bridge<C, K>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let Self {
            mut bridge,
            mut commands,
            shutdown,
            idle,
            read_buffer_capacity,
        } = self;
        let _guard = ActiveBridge::new();
        let loop_id = bridge.loop_id();
        info!(
            "event loop started: loop_id={loop_id}, active={}",
            active_bridge_count()
        );

        let mut tracker = IdleTracker::new(idle, Instant::now());
        let mut buf = BytesMut::with_capacity(read_buffer_capacity);
        let mut commands_open = true;

        bridge.channel_active();
        let mut written = write_flushed(bridge.channel_mut(), &mut transport, &mut tracker).await;

        while written.is_ok() && !bridge.channel().is_close_requested() {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => {
                    info!("shutdown requested: loop_id={loop_id}");
                    bridge.close();
                }

                command = commands.recv(), if commands_open => match command {
                    Some(command) => bridge.apply(command),
                    None => commands_open = false,
                },

                read = transport.read_buf(&mut buf) => match read {
                    Ok(0) => {
                        debug!("transport closed by peer: loop_id={loop_id}");
                        break;
                    }
                    Ok(_) => {
                        tracker.record_read(Instant::now());
                        bridge.decode(&mut buf);
                    }
                    Err(err) => {
                        warn!("transport read failed: loop_id={loop_id}, error={err}");
                        bridge.exception_caught(err.into());
                    }
                },

                () = wait_idle(tracker.next_deadline()) => {
                    while let Some(state) = tracker.poll_expired(Instant::now()) {
                        bridge.user_event(state);
                    }
                }
            }
            written = write_flushed(bridge.channel_mut(), &mut transport, &mut tracker).await;
        }

        if let Err(err) = written {
            warn!("transport write failed: loop_id={loop_id}, error={err}");
        }
        if let Err(err) = transport.shutdown().await {
            debug!("transport shutdown failed: loop_id={loop_id}, error={err}");
        }
        bridge.channel_inactive();
        info!("event loop finished: loop_id={loop_id}");
        bridge
    }

    /// Spawn the loop on the current runtime, logging and discarding any
    /// panic raised by the connection or codec.
    pub fn spawn<T>(self, transport: T) -> JoinHandle<Option<Http2Bridge<C, K>>>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let loop_id = self.bridge.loop_id();
        tokio::spawn(async move {
            match AssertUnwindSafe(self.run(transport)).catch_unwind().await {
                Ok(bridge) => Some(bridge),
                Err(panic) => {
                    metrics::inc_errors("panic");
                    let panic_msg = format_panic(&*panic);
                    // Emit via both `log` and `tracing` for tests that capture either.
                    error!("event loop panicked: panic={panic_msg}, loop_id={loop_id}");
                    tracing::error!(panic = %panic_msg, %loop_id, "event loop panicked");
                    None
                }
            }
        })
    }
}

async fn wait_idle(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}

/// Write every flushed frame, then complete the promises of those frames.
///
/// On failure every promise not yet completed fails with the transport error.
async fn write_flushed<T>(
    channel: &mut Channel,
    transport: &mut T,
    tracker: &mut IdleTracker,
) -> Result<()>
where
    T: AsyncWrite + Unpin,
{
    let outbound = channel.take_flushed();
    if outbound.is_empty() {
        return Ok(());
    }
    let mut written = Vec::with_capacity(outbound.len());
    let mut pending = outbound.into_iter();
    let mut failure = None;
    for Outbound { bytes, promise } in pending.by_ref() {
        if let Err(err) = transport.write_all(&bytes).await {
            let err = BridgeError::from(err);
            promise.fail(err.clone());
            failure = Some(err);
            break;
        }
        written.push(promise);
    }
    if failure.is_none()
        && let Err(err) = transport.flush().await
    {
        failure = Some(BridgeError::from(err));
    }
    match failure {
        None => {
            tracker.record_write(Instant::now());
            for promise in written {
                promise.succeed();
            }
            Ok(())
        }
        Some(err) => {
            for promise in written {
                promise.fail(err.clone());
            }
            for Outbound { promise, .. } in pending {
                promise.fail(err.clone());
            }
            Err(err)
        }
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use tokio::io::{AsyncWriteExt, duplex};
    use tracing_test::traced_test;

    use super::*;
    use crate::{
        builder::BridgeBuilder,
        handle::BridgeHandle,
        test_support::{Journal, RecordingCodec, RecordingConnection},
    };

    /// A panicking connection callback is logged and ends only its own loop.
    #[traced_test]
    #[tokio::test]
    async fn spawn_logs_connection_panic() {
        let journal = Journal::default();
        let codec = RecordingCodec::new(journal.clone());
        let (event_loop, _handle) = BridgeBuilder::new(codec, move |_handle: &BridgeHandle| {
            RecordingConnection::new(journal).respond_to_headers(|_, _| panic!("boom"))
        })
        .build_event_loop(CancellationToken::new());
        let loop_id = event_loop.bridge().loop_id();
        let (mut peer, transport) = duplex(1024);

        let task = event_loop.spawn(transport);
        peer.write_all(b"SETTINGS\nHEADERS 1\n")
            .await
            .expect("write to bridge");
        let outcome = task.await.expect("join event loop");
        assert!(outcome.is_none());

        logs_assert(|lines: &[&str]| {
            lines
                .iter()
                .find(|line| {
                    line.contains("event loop panicked")
                        && line.contains("panic=boom")
                        && line.contains(&format!("loop_id={loop_id}"))
                })
                .map(|_| ())
                .ok_or_else(|| "panic log not found".to_string())
        });
    }

    #[tokio::test]
    async fn transport_write_failure_ends_the_loop() {
        let journal = Journal::default();
        let codec = RecordingCodec::new(journal.clone());
        let (event_loop, _handle) = BridgeBuilder::new(codec, move |_handle: &BridgeHandle| {
            RecordingConnection::new(journal)
        })
        .build_event_loop(CancellationToken::new());
        let (peer, transport) = duplex(1024);
        drop(peer);

        let bridge = event_loop.run(transport).await;
        assert_eq!(bridge.state(), crate::bridge::LifecycleState::Closed);
        assert!(!bridge.channel().is_active());
    }
}
