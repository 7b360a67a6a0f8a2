//! Lifecycle hooks invoked by the bridge.
//!
//! [`BridgeHooks`] stores the callbacks registered through
//! [`BridgeBuilder`](crate::builder::BridgeBuilder). The lists are fixed once
//! the bridge is built; nothing can subscribe or unsubscribe afterwards.

use std::fmt;

/// Type alias for connection lifecycle callbacks.
pub type ConnectionHook<C> = Box<dyn FnMut(&mut C) + Send + 'static>;

/// Callbacks run when the connection is created and when it goes away.
pub struct BridgeHooks<C> {
    /// Invoked after the connection has processed the peer's first
    /// `SETTINGS`.
    pub(crate) on_connection_established: Vec<ConnectionHook<C>>,
    /// Invoked after the connection has been told the transport closed.
    pub(crate) on_connection_removed: Vec<ConnectionHook<C>>,
}

impl<C> Default for BridgeHooks<C> {
    fn default() -> Self {
        Self {
            on_connection_established: Vec::new(),
            on_connection_removed: Vec::new(),
        }
    }
}

impl<C> fmt::Debug for BridgeHooks<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeHooks")
            .field("on_connection_established", &self.on_connection_established.len())
            .field("on_connection_removed", &self.on_connection_removed.len())
            .finish()
    }
}

impl<C> BridgeHooks<C> {
    /// Run every `on_connection_established` hook in registration order.
    pub fn connection_established(&mut self, connection: &mut C) {
        for hook in &mut self.on_connection_established {
            hook(connection);
        }
    }

    /// Run every `on_connection_removed` hook in registration order.
    pub fn connection_removed(&mut self, connection: &mut C) {
        for hook in &mut self.on_connection_removed {
            hook(connection);
        }
    }

    /// Returns `true` if no hooks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.on_connection_established.is_empty() && self.on_connection_removed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hooks_run_in_registration_order() {
        let mut hooks = BridgeHooks::<Vec<&'static str>>::default();
        hooks
            .on_connection_established
            .push(Box::new(|log: &mut Vec<_>| log.push("first")));
        hooks
            .on_connection_established
            .push(Box::new(|log: &mut Vec<_>| log.push("second")));
        hooks
            .on_connection_removed
            .push(Box::new(|log: &mut Vec<_>| log.push("removed")));

        let mut log = Vec::new();
        hooks.connection_established(&mut log);
        hooks.connection_removed(&mut log);
        assert_eq!(log, vec!["first", "second", "removed"]);
        assert!(!hooks.is_empty());
    }
}
