//! Thread-affinity gate for write operations.
//!
//! Every write is represented by an owned [`Command`]. A [`Dispatcher`] routes
//! it either onto the inline queue of the event loop that is currently running
//! (when the caller is that loop) or onto the loop's FIFO command channel.
//! Ordering is delegated entirely to those two queues; the dispatcher keeps no
//! state of its own.

use std::{
    cell::RefCell,
    collections::VecDeque,
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::{
    channel::WritePromise,
    frame::{ErrorCode, FrameFlags, Headers, PingPayload, Settings, StreamId},
};

static NEXT_LOOP_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of the event loop that owns a bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LoopId(u64);

impl LoopId {
    pub(crate) fn next() -> Self { Self(NEXT_LOOP_ID.fetch_add(1, Ordering::Relaxed)) }

    #[must_use]
    pub fn as_u64(self) -> u64 { self.0 }
}

impl fmt::Display for LoopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "loop-{}", self.0) }
}

/// A write operation waiting to run on the owning event loop.
#[derive(Debug)]
pub enum Command {
    Headers {
        stream_id: StreamId,
        headers: Headers,
        end_of_stream: bool,
    },
    Data {
        stream_id: StreamId,
        data: Bytes,
        end_of_stream: bool,
    },
    Ping {
        payload: PingPayload,
        promise: WritePromise,
    },
    Frame {
        stream_id: StreamId,
        frame_type: u8,
        flags: FrameFlags,
        payload: Bytes,
    },
    Reset {
        stream_id: StreamId,
        error_code: ErrorCode,
    },
    GoAway {
        error_code: ErrorCode,
        last_stream_id: StreamId,
        debug_data: Bytes,
    },
    Settings {
        settings: Settings,
        promise: WritePromise,
    },
    PushPromise {
        stream_id: StreamId,
        promised_stream_id: StreamId,
        headers: Headers,
        promise: WritePromise,
    },
}

impl Command {
    /// Short name used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Headers { .. } => "headers",
            Self::Data { .. } => "data",
            Self::Ping { .. } => "ping",
            Self::Frame { .. } => "frame",
            Self::Reset { .. } => "reset",
            Self::GoAway { .. } => "go_away",
            Self::Settings { .. } => "settings",
            Self::PushPromise { .. } => "push_promise",
        }
    }
}

struct LoopScope {
    id: LoopId,
    inline: RefCell<VecDeque<Command>>,
}

tokio::task_local! {
    static EVENT_LOOP: LoopScope;
}

/// Run `f` as the event loop `id`.
///
/// While `f` runs, commands dispatched to `id` from this task are queued
/// inline instead of being sent through the command channel. Re-entering the
/// loop that is already current keeps the existing inline queue.
pub(crate) fn enter<R>(id: LoopId, f: impl FnOnce() -> R) -> R {
    if current() == Some(id) {
        return f();
    }
    let scope = LoopScope {
        id,
        inline: RefCell::new(VecDeque::new()),
    };
    EVENT_LOOP.sync_scope(scope, f)
}

/// The event loop the calling code is running on, if any.
pub(crate) fn current() -> Option<LoopId> { EVENT_LOOP.try_with(|scope| scope.id).ok() }

/// Take every command queued inline on the current loop.
pub(crate) fn take_inline() -> VecDeque<Command> {
    EVENT_LOOP
        .try_with(|scope| scope.inline.take())
        .unwrap_or_default()
}

/// Receiving end of a bridge's command channel, owned by the event loop.
#[derive(Debug)]
pub struct CommandQueue(mpsc::UnboundedReceiver<Command>);

impl CommandQueue {
    /// Wait for the next queued command.
    ///
    /// Returns `None` once every sender has been dropped.
    pub async fn recv(&mut self) -> Option<Command> { self.0.recv().await }

    /// Take a queued command without waiting.
    pub fn try_recv(&mut self) -> Option<Command> { self.0.try_recv().ok() }
}

/// Routes commands to the event loop that owns a bridge.
#[derive(Clone, Debug)]
pub(crate) struct Dispatcher {
    owner: LoopId,
    tx: mpsc::UnboundedSender<Command>,
}

impl Dispatcher {
    pub(crate) fn new(owner: LoopId) -> (Self, CommandQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { owner, tx }, CommandQueue(rx))
    }

    pub(crate) fn owner(&self) -> LoopId { self.owner }

    pub(crate) fn is_closed(&self) -> bool { self.tx.is_closed() }

    /// Queue `command` for execution on the owning loop.
    ///
    /// Never fails. If the loop has already shut down, the command is dropped
    /// and any promise it carries resolves with
    /// [`BridgeError::ChannelClosed`](crate::error::BridgeError::ChannelClosed).
    pub(crate) fn dispatch(&self, command: Command) {
        let mut command = Some(command);
        let _ = EVENT_LOOP.try_with(|scope| {
            if scope.id == self.owner {
                scope.inline.borrow_mut().extend(command.take());
            }
        });
        match command {
            None => trace!(loop_id = self.owner.as_u64(), "command queued inline"),
            Some(command) => {
                let name = command.name();
                if self.tx.send(command).is_err() {
                    debug!(
                        loop_id = self.owner.as_u64(),
                        command = name,
                        "event loop gone; dropping command"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reset(stream: u32) -> Command {
        Command::Reset {
            stream_id: StreamId::new(stream),
            error_code: ErrorCode::CANCEL,
        }
    }

    #[test]
    fn foreign_caller_uses_the_channel() {
        let (dispatcher, mut queue) = Dispatcher::new(LoopId::next());
        dispatcher.dispatch(reset(1));
        dispatcher.dispatch(reset(3));
        let order: Vec<_> = std::iter::from_fn(|| queue.try_recv())
            .map(|command| match command {
                Command::Reset { stream_id, .. } => stream_id.as_u32(),
                other => panic!("unexpected command {other:?}"),
            })
            .collect();
        assert_eq!(order, vec![1, 3]);
    }

    #[test]
    fn owning_loop_queues_inline() {
        let id = LoopId::next();
        let (dispatcher, mut queue) = Dispatcher::new(id);
        let inline = enter(id, || {
            dispatcher.dispatch(reset(5));
            take_inline()
        });
        assert_eq!(inline.len(), 1);
        assert!(queue.try_recv().is_none());
    }

    #[test]
    fn other_loop_still_uses_the_channel() {
        let (dispatcher, mut queue) = Dispatcher::new(LoopId::next());
        let inline = enter(LoopId::next(), || {
            dispatcher.dispatch(reset(7));
            take_inline()
        });
        assert!(inline.is_empty());
        assert!(queue.try_recv().is_some());
    }

    #[test]
    fn reentering_keeps_the_inline_queue() {
        let id = LoopId::next();
        let (dispatcher, _queue) = Dispatcher::new(id);
        let inline = enter(id, || {
            enter(id, || dispatcher.dispatch(reset(9)));
            take_inline()
        });
        assert_eq!(inline.len(), 1);
    }

    #[tokio::test]
    async fn dispatch_after_shutdown_fails_the_promise() {
        let (dispatcher, queue) = Dispatcher::new(LoopId::next());
        drop(queue);
        let (promise, future) = WritePromise::pair();
        dispatcher.dispatch(Command::Ping {
            payload: PingPayload::default(),
            promise,
        });
        assert!(dispatcher.is_closed());
        assert!(future.await.is_err());
    }

    #[test]
    fn take_inline_outside_a_loop_is_empty() {
        assert!(take_inline().is_empty());
        assert_eq!(current(), None);
    }
}
