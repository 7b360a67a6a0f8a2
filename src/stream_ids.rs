//! Allocation of locally initiated stream identifiers.
//!
//! Push promises reserve their stream id on the caller's thread, before the
//! write is dispatched, so identifiers follow the order in which callers asked
//! for them rather than the order in which the event loop runs the writes.

#[cfg(not(loom))]
use std::sync::atomic::{AtomicU32, Ordering};

#[cfg(loom)]
use loom::sync::atomic::{AtomicU32, Ordering};

use crate::{
    error::{BridgeError, Result},
    frame::{Role, StreamId},
};

/// Lock-free allocator for local stream identifiers.
#[derive(Debug)]
pub struct LocalStreamIds {
    next: AtomicU32,
}

impl LocalStreamIds {
    /// Create an allocator for `role`.
    ///
    /// Servers start at 2. Clients start at 1, or at 3 when stream 1 was
    /// consumed by an HTTP/1.1 upgrade.
    #[must_use]
    pub fn new(role: Role, upgraded: bool) -> Self {
        let first = match (role, upgraded) {
            (Role::Server, _) => 2,
            (Role::Client, false) => 1,
            (Role::Client, true) => 3,
        };
        Self {
            next: AtomicU32::new(first),
        }
    }

    /// Reserve the next identifier.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::StreamIdsExhausted`] once the 31-bit space is
    /// used up.
    pub fn next_id(&self) -> Result<StreamId> {
        self.next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |id| {
                (id <= StreamId::MAX.as_u32()).then_some(id + 2)
            })
            .map(StreamId::new)
            .map_err(|_| BridgeError::StreamIdsExhausted)
    }

    /// The identifier the next call to [`LocalStreamIds::next_id`] would
    /// return, if any remain.
    #[must_use]
    pub fn peek(&self) -> Option<StreamId> {
        let id = self.next.load(Ordering::Acquire);
        (id <= StreamId::MAX.as_u32()).then(|| StreamId::new(id))
    }

    #[cfg(test)]
    pub(crate) fn starting_at(next: u32) -> Self {
        Self {
            next: AtomicU32::new(next),
        }
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use std::{collections::HashSet, sync::Arc, thread};

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Role::Server, false, 2)]
    #[case(Role::Server, true, 2)]
    #[case(Role::Client, false, 1)]
    #[case(Role::Client, true, 3)]
    fn first_id_follows_role(#[case] role: Role, #[case] upgraded: bool, #[case] first: u32) {
        let ids = LocalStreamIds::new(role, upgraded);
        assert_eq!(ids.next_id().expect("id available").as_u32(), first);
        assert_eq!(ids.next_id().expect("id available").as_u32(), first + 2);
    }

    #[test]
    fn exhaustion_is_reported_and_sticky() {
        let ids = LocalStreamIds::starting_at(0x7fff_fffe);
        assert_eq!(ids.next_id().expect("last id").as_u32(), 0x7fff_fffe);
        assert!(matches!(ids.next_id(), Err(BridgeError::StreamIdsExhausted)));
        assert!(matches!(ids.next_id(), Err(BridgeError::StreamIdsExhausted)));
        assert_eq!(ids.peek(), None);
    }

    #[test]
    fn concurrent_allocation_never_repeats() {
        let ids = Arc::new(LocalStreamIds::new(Role::Server, false));
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let ids = Arc::clone(&ids);
                thread::spawn(move || {
                    (0..250)
                        .map(|_| ids.next_id().expect("id available").as_u32())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for worker in workers {
            let allocated = worker.join().expect("worker panicked");
            assert!(allocated.windows(2).all(|pair| pair[0] < pair[1]));
            for id in allocated {
                assert!(id % 2 == 0);
                assert!(seen.insert(id), "duplicate stream id {id}");
            }
        }
        assert_eq!(seen.len(), 1000);
    }
}
