#![cfg(not(loom))]
//! Tests driving a bridge through its event loop over an in-memory transport.

mod common;

use std::time::Duration;

use bytes::Bytes;
use common::{PATIENCE, TestResult, bridge_loop, read_records};
use h2_bridge::{
    BridgeError,
    ErrorCode,
    Headers,
    LifecycleState,
    PingPayload,
    StreamId,
    active_bridge_count,
    test_support::{CodecCall, ConnectionCall, Journal},
};
use proptest::prelude::*;
use rstest::rstest;
use tokio::io::{AsyncWriteExt, duplex};
use tokio_util::sync::CancellationToken;

#[rstest]
#[tokio::test]
async fn serves_a_request_and_tears_down_on_eof() -> TestResult {
    let journal = Journal::default();
    let (event_loop, _handle) =
        bridge_loop(&journal, CancellationToken::new(), |builder| builder, |connection| {
            connection.respond_to_headers(|writer, stream_id| {
                writer.write_headers(stream_id, &Headers::new().with(":status", "204"), true);
            })
        });
    let (mut peer, transport) = duplex(4096);
    let task = tokio::spawn(event_loop.run(transport));

    assert_eq!(read_records(&mut peer, 1).await?, vec!["Preface"]);
    peer.write_all(b"SETTINGS\nHEADERS 1\n").await?;
    let response = read_records(&mut peer, 1).await?;
    assert!(response[0].starts_with("Headers { stream_id: StreamId(1)"));

    drop(peer);
    let bridge = tokio::time::timeout(PATIENCE, task).await??;
    assert_eq!(bridge.state(), LifecycleState::Closed);
    let calls = journal.connection_calls();
    assert_eq!(calls.last(), Some(&ConnectionCall::Closed));
    assert!(calls.contains(&ConnectionCall::StreamClosed(StreamId::new(1))));
    Ok(())
}

#[tokio::test]
async fn shutdown_token_closes_the_bridge() -> TestResult {
    let journal = Journal::default();
    let shutdown = CancellationToken::new();
    let (event_loop, _handle) = bridge_loop(&journal, shutdown.clone(), |b| b, |c| c);
    let (mut peer, transport) = duplex(4096);
    let task = tokio::spawn(event_loop.run(transport));

    read_records(&mut peer, 1).await?;
    assert!(active_bridge_count() >= 1);
    shutdown.cancel();

    let bridge = tokio::time::timeout(PATIENCE, task).await??;
    assert_eq!(bridge.state(), LifecycleState::Closed);
    assert_eq!(journal.codec_calls().last(), Some(&CodecCall::Inactive));
    Ok(())
}

#[tokio::test]
async fn connection_error_writes_go_away_before_closing() -> TestResult {
    let journal = Journal::default();
    let (event_loop, _handle) = bridge_loop(&journal, CancellationToken::new(), |b| b, |c| c);
    let (mut peer, transport) = duplex(4096);
    let task = tokio::spawn(event_loop.run(transport));

    read_records(&mut peer, 1).await?;
    peer.write_all(b"SETTINGS\nHEADERS 5\nGARBAGE\n").await?;
    let records = read_records(&mut peer, 1).await?;
    assert!(records[0].starts_with("GoAway { last_stream_id: StreamId(5)"));

    let bridge = tokio::time::timeout(PATIENCE, task).await??;
    assert_eq!(bridge.state(), LifecycleState::Closed);
    assert!(journal.connection_calls().contains(&ConnectionCall::ConnectionError(
        ErrorCode::PROTOCOL_ERROR
    )));
    Ok(())
}

#[tokio::test]
async fn push_promise_completes_with_the_next_flushing_write() -> TestResult {
    let journal = Journal::default();
    let (event_loop, handle) = bridge_loop(&journal, CancellationToken::new(), |b| b, |c| c);
    let (mut peer, transport) = duplex(4096);
    let task = tokio::spawn(event_loop.run(transport));

    read_records(&mut peer, 1).await?;
    peer.write_all(b"SETTINGS\nHEADERS 1\n").await?;

    let pushed = handle.push_promise(StreamId::new(1), Headers::new().with(":path", "/style.css"));
    handle.write_headers(StreamId::new(2), Headers::new().with(":status", "200"), true);
    assert_eq!(tokio::time::timeout(PATIENCE, pushed).await??, StreamId::new(2));

    let records = read_records(&mut peer, 2).await?;
    assert!(records[0].starts_with("PushPromise"));
    assert!(records[1].starts_with("Headers { stream_id: StreamId(2)"));

    drop(peer);
    tokio::time::timeout(PATIENCE, task).await??;
    Ok(())
}

#[tokio::test]
async fn handle_fails_writes_once_the_loop_is_gone() -> TestResult {
    let journal = Journal::default();
    let (event_loop, handle) = bridge_loop(&journal, CancellationToken::new(), |b| b, |c| c);
    let (peer, transport) = duplex(4096);
    drop(peer);
    let bridge = event_loop.run(transport).await;
    drop(bridge);

    assert!(handle.is_closed());
    let written = handle.write_ping(PingPayload::from(9));
    assert!(matches!(written.await, Err(BridgeError::ChannelClosed)));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn all_idle_closes_the_connection() -> TestResult {
    let journal = Journal::default();
    let (event_loop, _handle) = bridge_loop(
        &journal,
        CancellationToken::new(),
        |builder| builder.idle_timeout(Duration::from_secs(30)),
        |c| c,
    );
    let (_peer, transport) = duplex(4096);

    let bridge = event_loop.run(transport).await;
    assert_eq!(bridge.state(), LifecycleState::Closed);
    assert_eq!(journal.codec_calls(), vec![CodecCall::Preface, CodecCall::Inactive]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn activity_keeps_an_idle_connection_open() -> TestResult {
    let journal = Journal::default();
    let (event_loop, _handle) = bridge_loop(
        &journal,
        CancellationToken::new(),
        |builder| builder.idle_timeout(Duration::from_secs(30)),
        |c| c,
    );
    let (mut peer, transport) = duplex(4096);
    let task = tokio::spawn(event_loop.run(transport));

    read_records(&mut peer, 1).await?;
    peer.write_all(b"SETTINGS\n").await?;
    for _ in 0..3 {
        tokio::time::sleep(Duration::from_secs(20)).await;
        peer.write_all(b"PING\n").await?;
    }
    assert!(!task.is_finished());

    let bridge = task.await?;
    assert_eq!(bridge.state(), LifecycleState::Closed);
    let pings = journal
        .connection_calls()
        .iter()
        .filter(|call| matches!(call, ConnectionCall::Frame(_)))
        .count();
    assert_eq!(pings, 3);
    Ok(())
}

/// Parse the `w<writer>-<index>` tag carried by a recorded `DATA` frame.
fn writer_tag(record: &str) -> Option<(usize, usize)> {
    const MARKER: &str = "data: b\"w";
    let start = record.find(MARKER)? + MARKER.len();
    let rest = &record[start..];
    let (writer, index) = rest[..rest.find('"')?].split_once('-')?;
    Some((writer.parse().ok()?, index.parse().ok()?))
}

fn threads_keep_their_own_order(writers: usize, per_writer: usize) -> TestResult {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;
    runtime.block_on(async {
        let journal = Journal::default();
        let (event_loop, handle) = bridge_loop(&journal, CancellationToken::new(), |b| b, |c| c);
        let (mut peer, transport) = duplex(64 * 1024);
        let task = tokio::spawn(event_loop.run(transport));
        read_records(&mut peer, 1).await?;
        peer.write_all(b"SETTINGS\n").await?;

        let threads: Vec<_> = (0..writers)
            .map(|writer| {
                let handle = handle.clone();
                std::thread::spawn(move || {
                    for index in 0..per_writer {
                        let payload = Bytes::from(format!("w{writer}-{index}"));
                        handle.write_data(StreamId::new(1), payload, false);
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().map_err(|_| "writer thread panicked")?;
        }

        let records = read_records(&mut peer, writers * per_writer).await?;
        let mut seen = vec![Vec::new(); writers];
        for record in &records {
            let (writer, index) =
                writer_tag(record).ok_or_else(|| format!("unexpected record {record}"))?;
            seen[writer].push(index);
        }
        let expected: Vec<usize> = (0..per_writer).collect();
        for (writer, indices) in seen.iter().enumerate() {
            assert_eq!(indices, &expected, "writer {writer} lost its order");
        }
        drop(peer);
        tokio::time::timeout(PATIENCE, task).await??;
        Ok(())
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn off_loop_writes_keep_each_threads_order(writers in 2_usize..5, per_writer in 1_usize..12) {
        let outcome = threads_keep_their_own_order(writers, per_writer);
        prop_assert!(outcome.is_ok(), "{outcome:?}");
    }
}
