//! Outbound side of the transport as seen from the event loop.
//!
//! A [`Channel`] buffers encoded frames until they are flushed, records close
//! requests, and carries notifications and faults raised by the codec while a
//! write is in progress. The event loop drains flushed frames to the socket
//! and completes their [`WritePromise`]s once the bytes have been written.

use std::{
    collections::VecDeque,
    fmt,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::{
    error::{BridgeError, Result},
    event::CodecEvent,
    metrics::{self, Direction},
};

type CompletionCallback = Box<dyn FnOnce(Result<()>) + Send + 'static>;

enum Completion {
    Void,
    Future(oneshot::Sender<Result<()>>),
    Callback(CompletionCallback),
}

/// Completion side of a single write.
///
/// Dropping a promise without completing it reports
/// [`BridgeError::ChannelClosed`] to whoever is waiting on it.
pub struct WritePromise(Option<Completion>);

impl WritePromise {
    /// A promise nobody observes.
    #[must_use]
    pub fn void() -> Self { Self(Some(Completion::Void)) }

    /// A promise paired with a [`WriteFuture`].
    #[must_use]
    pub fn pair() -> (Self, WriteFuture) {
        let (tx, rx) = oneshot::channel();
        (Self(Some(Completion::Future(tx))), WriteFuture(rx))
    }

    /// A promise that runs `callback` on the event loop when the write
    /// completes or fails.
    #[must_use]
    pub fn from_fn<F>(callback: F) -> Self
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        Self(Some(Completion::Callback(Box::new(callback))))
    }

    /// Mark the write as successful.
    pub fn succeed(self) { self.complete(Ok(())); }

    /// Mark the write as failed.
    pub fn fail(self, error: BridgeError) { self.complete(Err(error)); }

    /// Deliver `result` to the waiting side.
    pub fn complete(mut self, result: Result<()>) {
        if let Some(completion) = self.0.take() {
            Self::deliver(completion, result);
        }
    }

    fn deliver(completion: Completion, result: Result<()>) {
        match completion {
            Completion::Void => {}
            Completion::Future(tx) => {
                let _ = tx.send(result);
            }
            Completion::Callback(callback) => callback(result),
        }
    }
}

impl Drop for WritePromise {
    fn drop(&mut self) {
        if let Some(completion) = self.0.take() {
            Self::deliver(completion, Err(BridgeError::ChannelClosed));
        }
    }
}

impl fmt::Debug for WritePromise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.0 {
            None => "completed",
            Some(Completion::Void) => "void",
            Some(Completion::Future(_)) => "future",
            Some(Completion::Callback(_)) => "callback",
        };
        f.debug_tuple("WritePromise").field(&kind).finish()
    }
}

/// Resolves once the paired [`WritePromise`] completes.
///
/// Never assume synchronous completion: the event loop resolves the future
/// only after the frame has been written to the transport.
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct WriteFuture(oneshot::Receiver<Result<()>>);

impl Future for WriteFuture {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(BridgeError::ChannelClosed)))
    }
}

/// An encoded frame waiting for the transport.
#[derive(Debug)]
pub struct Outbound {
    pub bytes: Bytes,
    pub promise: WritePromise,
}

/// Event-loop owned view of the transport.
#[derive(Debug)]
pub struct Channel {
    open: bool,
    close_requested: bool,
    pending: Vec<Outbound>,
    flushed: VecDeque<Outbound>,
    notifications: VecDeque<CodecEvent>,
    faults: VecDeque<BridgeError>,
    flushes: u64,
}

impl Default for Channel {
    fn default() -> Self { Self::new() }
}

impl Channel {
    /// Create an open channel with empty buffers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            open: true,
            close_requested: false,
            pending: Vec::new(),
            flushed: VecDeque::new(),
            notifications: VecDeque::new(),
            faults: VecDeque::new(),
            flushes: 0,
        }
    }

    /// Returns `true` until the channel is closed or a close was requested.
    #[must_use]
    pub fn is_active(&self) -> bool { self.open && !self.close_requested }

    /// Returns `true` once [`Channel::close`] has been called.
    #[must_use]
    pub fn is_close_requested(&self) -> bool { self.close_requested }

    /// Buffer one encoded frame until the next flush.
    ///
    /// Writes on an inactive channel fail their promise immediately.
    pub fn write(&mut self, bytes: Bytes, promise: WritePromise) {
        if !self.is_active() {
            promise.fail(BridgeError::ChannelClosed);
            return;
        }
        metrics::inc_frames(Direction::Outbound);
        self.pending.push(Outbound { bytes, promise });
    }

    /// Hand every buffered write to the transport.
    pub fn flush(&mut self) {
        self.flushes += 1;
        self.flushed.extend(self.pending.drain(..));
    }

    /// Ask the event loop to close the transport once flushed frames are out.
    pub fn close(&mut self) {
        if !self.close_requested {
            log::debug!("channel close requested: pending={}", self.pending.len());
        }
        self.close_requested = true;
    }

    /// Number of flushes performed so far.
    #[must_use]
    pub fn flush_count(&self) -> u64 { self.flushes }

    /// Number of written but not yet flushed frames.
    #[must_use]
    pub fn pending_len(&self) -> usize { self.pending.len() }

    /// Take every flushed frame, in write order.
    pub fn take_flushed(&mut self) -> Vec<Outbound> { self.flushed.drain(..).collect() }

    /// Report a synchronous codec notification, such as a `GOAWAY` that was
    /// just written.
    pub fn notify(&mut self, event: CodecEvent) { self.notifications.push_back(event); }

    /// Report a failure at a write site. Writes through a
    /// [`Writer`](crate::write_path::Writer) are refused until the bridge
    /// has handled it like an uncaught exception.
    pub fn raise(&mut self, error: BridgeError) { self.faults.push_back(error); }

    /// Returns `true` while a raised fault waits to be handled.
    #[must_use]
    pub fn has_fault(&self) -> bool { !self.faults.is_empty() }

    pub(crate) fn take_notification(&mut self) -> Option<CodecEvent> {
        self.notifications.pop_front()
    }

    pub(crate) fn take_fault(&mut self) -> Option<BridgeError> { self.faults.pop_front() }

    /// Mark the transport as gone and fail every write still waiting on it.
    pub(crate) fn mark_inactive(&mut self) {
        self.open = false;
        for outbound in self.pending.drain(..).chain(self.flushed.drain(..)) {
            outbound.promise.fail(BridgeError::ChannelClosed);
        }
    }
}
