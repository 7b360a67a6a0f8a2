//! Cloneable handle used to write to a bridge from any task or thread.
//!
//! Every method packages the write as a [`Command`] and hands it to the
//! dispatcher. Called from the owning event loop, the command runs before the
//! next write on that loop; called from anywhere else, it is queued on the
//! loop's command channel and runs in submission order.

use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use bytes::Bytes;
use tracing::debug;

use crate::{
    channel::{WriteFuture, WritePromise},
    dispatch::{Command, Dispatcher, LoopId},
    error::{BridgeError, Result},
    frame::{ErrorCode, FrameFlags, Headers, PingPayload, Settings, StreamId},
    stream_ids::LocalStreamIds,
};

/// Thread-safe write surface of one bridge.
#[derive(Clone, Debug)]
pub struct BridgeHandle {
    dispatcher: Dispatcher,
    stream_ids: Arc<LocalStreamIds>,
}

impl BridgeHandle {
    pub(crate) fn new(dispatcher: Dispatcher, stream_ids: Arc<LocalStreamIds>) -> Self {
        Self {
            dispatcher,
            stream_ids,
        }
    }

    /// Identifier of the event loop that owns the bridge.
    #[must_use]
    pub fn loop_id(&self) -> LoopId { self.dispatcher.owner() }

    /// Returns `true` once the owning event loop has stopped accepting
    /// commands.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.dispatcher.is_closed() }

    /// Write `HEADERS` for `stream_id`.
    pub fn write_headers(&self, stream_id: StreamId, headers: Headers, end_of_stream: bool) {
        self.dispatcher.dispatch(Command::Headers {
            stream_id,
            headers,
            end_of_stream,
        });
    }

    /// Write `DATA` for `stream_id`.
    pub fn write_data(&self, stream_id: StreamId, data: Bytes, end_of_stream: bool) {
        self.dispatcher.dispatch(Command::Data {
            stream_id,
            data,
            end_of_stream,
        });
    }

    /// Write a non-ack `PING`.
    ///
    /// The returned future resolves once the frame has been written to the
    /// transport, or with [`BridgeError::ChannelClosed`] if it never is.
    pub fn write_ping(&self, payload: PingPayload) -> WriteFuture {
        let (promise, future) = WritePromise::pair();
        self.dispatcher.dispatch(Command::Ping { payload, promise });
        future
    }

    /// Write a frame of arbitrary type.
    pub fn write_frame(&self, stream_id: StreamId, frame_type: u8, flags: FrameFlags, payload: Bytes) {
        self.dispatcher.dispatch(Command::Frame {
            stream_id,
            frame_type,
            flags,
            payload,
        });
    }

    /// Write `RST_STREAM` for `stream_id`.
    pub fn write_reset(&self, stream_id: StreamId, error_code: ErrorCode) {
        self.dispatcher.dispatch(Command::Reset {
            stream_id,
            error_code,
        });
    }

    /// Write `GOAWAY`.
    pub fn write_go_away(&self, error_code: ErrorCode, last_stream_id: StreamId, debug_data: Bytes) {
        self.dispatcher.dispatch(Command::GoAway {
            error_code,
            last_stream_id,
            debug_data,
        });
    }

    /// Write `SETTINGS`.
    ///
    /// The returned future resolves once the frame has been written to the
    /// transport.
    pub fn write_settings(&self, settings: Settings) -> WriteFuture {
        let (promise, future) = WritePromise::pair();
        self.dispatcher.dispatch(Command::Settings { settings, promise });
        future
    }

    /// Reserve a local stream id and write `PUSH_PROMISE` for it.
    ///
    /// The id is reserved on the calling thread. `handler` runs exactly once:
    /// with the promised id after the frame was written, or with the error
    /// that prevented it. Exhausted stream ids are reported before anything
    /// is dispatched.
    pub fn write_push_promise<F>(&self, stream_id: StreamId, headers: Headers, handler: F)
    where
        F: FnOnce(Result<StreamId>) + Send + 'static,
    {
        let promised_stream_id = match self.stream_ids.next_id() {
            Ok(id) => id,
            Err(err) => {
                debug!(stream_id = stream_id.as_u32(), error = %err, "push promise not sent");
                handler(Err(err));
                return;
            }
        };
        let promise =
            WritePromise::from_fn(move |result| handler(result.map(|()| promised_stream_id)));
        self.dispatcher.dispatch(Command::PushPromise {
            stream_id,
            promised_stream_id,
            headers,
            promise,
        });
    }

    /// Future-returning form of [`BridgeHandle::write_push_promise`].
    pub fn push_promise(&self, stream_id: StreamId, headers: Headers) -> PushPromiseFuture {
        let promised_stream_id = match self.stream_ids.next_id() {
            Ok(id) => id,
            Err(err) => return PushPromiseFuture(PushState::Failed(Some(err))),
        };
        let (promise, written) = WritePromise::pair();
        self.dispatcher.dispatch(Command::PushPromise {
            stream_id,
            promised_stream_id,
            headers,
            promise,
        });
        PushPromiseFuture(PushState::Pending {
            promised_stream_id,
            written,
        })
    }
}

enum PushState {
    Failed(Option<BridgeError>),
    Pending {
        promised_stream_id: StreamId,
        written: WriteFuture,
    },
}

/// Resolves to the promised stream id once the `PUSH_PROMISE` has been
/// written.
#[must_use = "futures do nothing unless polled"]
pub struct PushPromiseFuture(PushState);

impl Future for PushPromiseFuture {
    type Output = Result<StreamId>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().0 {
            PushState::Failed(err) => {
                Poll::Ready(Err(err.take().unwrap_or(BridgeError::ChannelClosed)))
            }
            PushState::Pending {
                promised_stream_id,
                written,
            } => {
                let promised = *promised_stream_id;
                Pin::new(written)
                    .poll(cx)
                    .map(|result| result.map(|()| promised))
            }
        }
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::{
        dispatch::{CommandQueue, LoopId},
        frame::Role,
    };

    fn handle() -> (BridgeHandle, CommandQueue) {
        let (dispatcher, queue) = Dispatcher::new(LoopId::next());
        let ids = Arc::new(LocalStreamIds::new(Role::Server, false));
        (BridgeHandle::new(dispatcher, ids), queue)
    }

    #[tokio::test]
    async fn push_promise_reserves_ids_before_dispatch() {
        let (handle, mut queue) = handle();
        let first = handle.push_promise(StreamId::new(1), Headers::new());
        let second = handle.push_promise(StreamId::new(1), Headers::new());

        let mut promised = Vec::new();
        while let Some(command) = queue.try_recv() {
            match command {
                Command::PushPromise {
                    promised_stream_id,
                    promise,
                    ..
                } => {
                    promised.push(promised_stream_id.as_u32());
                    promise.succeed();
                }
                other => panic!("unexpected command {other:?}"),
            }
        }
        assert_eq!(promised, vec![2, 4]);
        assert_eq!(first.await.expect("first push").as_u32(), 2);
        assert_eq!(second.await.expect("second push").as_u32(), 4);
    }

    #[test]
    fn exhausted_ids_fail_without_dispatching() {
        let (dispatcher, mut queue) = Dispatcher::new(LoopId::next());
        let ids = Arc::new(LocalStreamIds::starting_at(0x8000_0000));
        let handle = BridgeHandle::new(dispatcher, ids);
        let seen = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&seen);
        handle.write_push_promise(StreamId::new(1), Headers::new(), move |result| {
            *slot.lock().expect("lock") = Some(result);
        });
        assert!(matches!(
            seen.lock().expect("lock").take(),
            Some(Err(BridgeError::StreamIdsExhausted))
        ));
        assert!(queue.try_recv().is_none());
    }

    #[tokio::test]
    async fn ping_fails_when_loop_is_gone() {
        let (handle, queue) = handle();
        drop(queue);
        assert!(handle.is_closed());
        assert!(matches!(
            handle.write_ping(PingPayload::from(7)).await,
            Err(BridgeError::ChannelClosed)
        ));
    }
}
