//! Storage for the lazily created connection.

use crate::{decompress::DecompressingListener, frame::StreamId};

/// Where inbound frames go once the connection exists.
#[derive(Debug)]
pub(crate) enum InboundRoute {
    /// Straight to the connection.
    Direct,
    /// Through content decoding first.
    Decompressing(DecompressingListener),
}

impl InboundRoute {
    pub(crate) fn stream_closed(&mut self, stream_id: StreamId) {
        if let Self::Decompressing(listener) = self {
            listener.stream_closed(stream_id);
        }
    }

    pub(crate) fn is_decompressing(&self) -> bool { matches!(self, Self::Decompressing(_)) }
}

/// The connection of a bridge: absent until the peer's first `SETTINGS`, then
/// present for the rest of the bridge's life.
#[derive(Debug)]
pub(crate) enum ConnectionSlot<C> {
    Absent,
    Present { connection: C, route: InboundRoute },
}

impl<C> ConnectionSlot<C> {
    pub(crate) fn is_present(&self) -> bool { matches!(self, Self::Present { .. }) }

    pub(crate) fn connection(&self) -> Option<&C> {
        match self {
            Self::Absent => None,
            Self::Present { connection, .. } => Some(connection),
        }
    }

    pub(crate) fn connection_mut(&mut self) -> Option<&mut C> {
        match self {
            Self::Absent => None,
            Self::Present { connection, .. } => Some(connection),
        }
    }
}
