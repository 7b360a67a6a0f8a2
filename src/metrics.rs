//! Metric helpers for `h2-bridge`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. With the `metrics` feature
//! disabled every helper compiles to a no-op.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking running bridges.
pub const BRIDGES_ACTIVE: &str = "h2_bridge_connections_active";
/// Name of the counter tracking frames crossing the bridge.
pub const FRAMES_PROCESSED: &str = "h2_bridge_frames_total";
/// Name of the counter tracking protocol errors and contract violations.
pub const ERRORS_TOTAL: &str = "h2_bridge_errors_total";

/// Direction of frame processing.
#[derive(Clone, Copy, Debug)]
pub enum Direction {
    /// Frames decoded from the peer.
    Inbound,
    /// Frames written on behalf of the connection.
    Outbound,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), expect(dead_code, reason = "only labels metrics"))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the running bridges gauge.
pub fn inc_bridges() {
    #[cfg(feature = "metrics")]
    gauge!(BRIDGES_ACTIVE).increment(1.0);
}

/// Decrement the running bridges gauge.
pub fn dec_bridges() {
    #[cfg(feature = "metrics")]
    gauge!(BRIDGES_ACTIVE).decrement(1.0);
}

/// Record a frame for the given direction.
pub fn inc_frames(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_PROCESSED, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record an error, labelled by where it was handled.
pub fn inc_errors(kind: &'static str) {
    #[cfg(feature = "metrics")]
    counter!(ERRORS_TOTAL, "kind" => kind).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = kind;
}
