//! Shared utilities for integration tests.
//!
//! Builds event loops around the recording codec and connection, and reads
//! the text records the codec writes to the transport.

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::time::Duration;

use h2_bridge::{
    BridgeBuilder,
    BridgeHandle,
    EventLoop,
    test_support::{Journal, RecordingCodec, RecordingConnection, records},
};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub type TestLoop = EventLoop<RecordingConnection, RecordingCodec>;
pub type TestBuilder = BridgeBuilder<RecordingConnection, RecordingCodec>;

/// How long a test waits for the bridge before giving up.
pub const PATIENCE: Duration = Duration::from_secs(5);

/// Build an event loop around a recording codec and connection.
pub fn bridge_loop(
    journal: &Journal,
    shutdown: CancellationToken,
    configure: impl FnOnce(TestBuilder) -> TestBuilder,
    connection: impl FnOnce(RecordingConnection) -> RecordingConnection + Send + 'static,
) -> (TestLoop, BridgeHandle) {
    let codec = RecordingCodec::new(journal.clone());
    let for_connection = journal.clone();
    let builder = BridgeBuilder::new(codec, move |_handle: &BridgeHandle| {
        connection(RecordingConnection::new(for_connection))
    });
    configure(builder).build_event_loop(shutdown)
}

/// Read from `peer` until `count` complete records have arrived.
pub async fn read_records<R>(peer: &mut R, count: usize) -> TestResult<Vec<String>>
where
    R: AsyncRead + Unpin,
{
    let mut received = Vec::new();
    tokio::time::timeout(PATIENCE, async {
        let mut chunk = [0_u8; 1024];
        while received.iter().filter(|byte| **byte == b'\n').count() < count {
            let n = peer.read(&mut chunk).await?;
            if n == 0 {
                return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof));
            }
            received.extend_from_slice(&chunk[..n]);
        }
        Ok(())
    })
    .await??;
    Ok(records(&received))
}
