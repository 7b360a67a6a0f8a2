#![cfg(all(not(loom), feature = "metrics"))]
//! Tests for `h2-bridge` metrics helpers.
//!
//! These tests verify that counters and gauges update as expected using
//! `metrics_util::debugging::DebuggingRecorder`.

use bytes::BytesMut;
use h2_bridge::{
    BridgeBuilder,
    BridgeHandle,
    ErrorCode,
    Headers,
    StreamId,
    metrics::{self as bridge_metrics, Direction},
    test_support::{Journal, RecordingCodec, RecordingConnection},
};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use rstest::rstest;
use serial_test::serial;

/// Creates a debugging recorder and snapshotter for metrics testing.
fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

fn counter_value(snapshotter: &Snapshotter, name: &str, label: (&str, &str)) -> u64 {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .filter(|(key, _, _, _)| {
            key.key().name() == name
                && key
                    .key()
                    .labels()
                    .any(|l| l.key() == label.0 && l.value() == label.1)
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(count) => count,
            _ => 0,
        })
        .sum()
}

#[rstest]
#[case(Direction::Inbound, "inbound")]
#[case(Direction::Outbound, "outbound")]
fn frame_metric_is_labelled_by_direction(#[case] direction: Direction, #[case] label: &str) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || bridge_metrics::inc_frames(direction));
    assert_eq!(
        counter_value(&snapshotter, bridge_metrics::FRAMES_PROCESSED, ("direction", label)),
        1
    );
}

#[test]
fn bridges_gauge_returns_to_zero() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        bridge_metrics::inc_bridges();
        bridge_metrics::inc_bridges();
        bridge_metrics::dec_bridges();
        bridge_metrics::dec_bridges();
    });
    let gauge = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .find(|(key, _, _, _)| key.key().name() == bridge_metrics::BRIDGES_ACTIVE)
        .map(|(_, _, _, value)| value);
    assert!(matches!(gauge, Some(DebugValue::Gauge(g)) if g.into_inner().abs() < f64::EPSILON));
}

#[test]
#[serial]
fn bridge_counts_frames_and_errors() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        let journal = Journal::default();
        let codec = RecordingCodec::new(journal.clone());
        let (mut bridge, _queue) = BridgeBuilder::new(codec, move |_handle: &BridgeHandle| {
            RecordingConnection::new(journal)
        })
        .build();
        bridge.channel_active();
        bridge.decode(&mut BytesMut::from("SETTINGS\nPING\nBROKEN\n"));
    });

    assert_eq!(
        counter_value(&snapshotter, bridge_metrics::FRAMES_PROCESSED, ("direction", "inbound")),
        2
    );
    assert_eq!(
        counter_value(&snapshotter, bridge_metrics::ERRORS_TOTAL, ("kind", "protocol")),
        1
    );
    // The preface and the GOAWAY written in reaction to the unreadable line.
    assert_eq!(
        counter_value(&snapshotter, bridge_metrics::FRAMES_PROCESSED, ("direction", "outbound")),
        2
    );
}

#[test]
#[serial]
fn outbound_frames_are_counted_once_each() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        let journal = Journal::default();
        let codec = RecordingCodec::new(journal.clone());
        let (mut bridge, _queue) = BridgeBuilder::new(codec, move |_handle: &BridgeHandle| {
            RecordingConnection::new(journal)
        })
        .build();
        bridge.channel_active();
        bridge.decode(&mut BytesMut::from("SETTINGS\n"));
        bridge.write(|writer| {
            writer
                .push_promise(StreamId::new(1), &Headers::new().with(":path", "/app.js"))
                .expect("push id available");
            writer.write_reset(StreamId::new(1), ErrorCode::CANCEL);
        });
    });

    assert_eq!(
        counter_value(&snapshotter, bridge_metrics::FRAMES_PROCESSED, ("direction", "outbound")),
        3
    );
}

#[test]
#[serial]
fn frames_before_settings_count_as_contract_violations() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        let journal = Journal::default();
        let codec = RecordingCodec::new(journal.clone());
        let (mut bridge, _queue) = BridgeBuilder::new(codec, move |_handle: &BridgeHandle| {
            RecordingConnection::new(journal)
        })
        .build();
        bridge.channel_active();
        bridge.decode(&mut BytesMut::from("PING\n"));
    });

    assert_eq!(
        counter_value(&snapshotter, bridge_metrics::ERRORS_TOTAL, ("kind", "contract")),
        1
    );
}
