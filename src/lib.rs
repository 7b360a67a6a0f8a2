#![doc(html_root_url = "https://docs.rs/h2-bridge/latest")]
//! Public API for the `h2-bridge` library.
//!
//! This crate adapts a sans-I/O HTTP/2 frame codec to an application
//! connection object. The bridge creates the connection when the peer's
//! first `SETTINGS` frame arrives, translates decoded frames into connection
//! callbacks, and funnels writes from any task back onto the event loop that
//! owns the codec.

pub mod bridge;
pub mod builder;
pub mod channel;
pub mod codec;
pub mod connection;
pub mod decompress;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod event_loop;
pub mod frame;
pub mod handle;
pub mod hooks;
pub mod idle;
pub mod metrics;
pub mod panic;
pub mod stream_ids;
#[cfg(not(loom))]
pub mod test_support;
pub mod write_path;

pub use bridge::{ConnectionFactory, Http2Bridge, LifecycleState, Upgrade};
pub use builder::BridgeBuilder;
pub use channel::{Channel, WriteFuture, WritePromise};
pub use codec::Http2Codec;
pub use connection::Connection;
#[cfg(feature = "decompression")]
pub use decompress::ContentDecoders;
pub use decompress::{Decompressor, DecompressorFactory};
pub use dispatch::{Command, CommandQueue, LoopId};
/// Result type alias re-exported for convenience.
pub use error::Result;
pub use error::{BridgeError, Http2Error};
pub use event::{CodecEvent, FrameEvent, FrameKind, GoAwayDirection, GoAwayEvent, StreamEvent};
pub use event_loop::{EventLoop, active_bridge_count};
pub use frame::{ErrorCode, FrameFlags, Headers, PingPayload, Priority, Role, Settings, StreamId};
pub use handle::{BridgeHandle, PushPromiseFuture};
pub use hooks::BridgeHooks;
pub use idle::{IdleConfig, IdleState};
pub use metrics::{BRIDGES_ACTIVE, Direction, ERRORS_TOTAL, FRAMES_PROCESSED};
pub use write_path::Writer;
