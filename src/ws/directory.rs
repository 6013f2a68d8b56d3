//! Connection directory: maps a logical identity to its live outbound channel.
//!
//! Sessions never hold sockets. They keep the [`ChannelId`] that was current
//! when the player was bound and look the channel up here at send time, so a
//! reconnect naturally invalidates stale handles without patching sessions.

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::ws::protocol::ServerMsg;

/// Opaque handle identifying one live connection of an identity
pub type ChannelId = Uuid;

struct ChannelEntry {
    id: ChannelId,
    tx: mpsc::UnboundedSender<ServerMsg>,
}

/// Registry of connected users. Read-only for the game core: it only queries
/// "send" and "is open"; registration happens in the WebSocket handler.
pub struct ConnectionDirectory {
    channels: DashMap<String, ChannelEntry>,
}

impl ConnectionDirectory {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Register a fresh channel for `identity`, superseding any previous one.
    /// Returns the new handle and the receiving half the socket writer drains.
    pub fn register(&self, identity: &str) -> (ChannelId, mpsc::UnboundedReceiver<ServerMsg>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.channels
            .insert(identity.to_string(), ChannelEntry { id, tx });
        (id, rx)
    }

    /// Remove the channel, but only if `channel` is still the current one.
    /// A reconnect may already have superseded it.
    pub fn unregister(&self, identity: &str, channel: ChannelId) {
        self.channels
            .remove_if(identity, |_, entry| entry.id == channel);
    }

    /// Whether the identity has a live channel at all
    pub fn is_open(&self, identity: &str) -> bool {
        self.channels
            .get(identity)
            .map(|entry| !entry.tx.is_closed())
            .unwrap_or(false)
    }

    /// Whether `channel` is still the identity's live channel
    pub fn is_current(&self, identity: &str, channel: ChannelId) -> bool {
        self.channels
            .get(identity)
            .map(|entry| entry.id == channel && !entry.tx.is_closed())
            .unwrap_or(false)
    }

    /// Current channel handle for the identity, if connected
    pub fn current(&self, identity: &str) -> Option<ChannelId> {
        self.channels.get(identity).map(|entry| entry.id)
    }

    /// Push a message to the identity's live channel. Returns false when the
    /// user is not connected; callers treat that as a no-op.
    pub fn send(&self, identity: &str, msg: ServerMsg) -> bool {
        match self.channels.get(identity) {
            Some(entry) => entry.tx.send(msg).is_ok(),
            None => false,
        }
    }

    pub fn connected_count(&self) -> usize {
        self.channels.len()
    }
}

impl Default for ConnectionDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::{CountdownData, ServerMsg};

    #[test]
    fn register_supersedes_previous_channel() {
        let dir = ConnectionDirectory::new();
        let (first, _rx1) = dir.register("ada");
        let (second, _rx2) = dir.register("ada");

        assert!(!dir.is_current("ada", first));
        assert!(dir.is_current("ada", second));
        assert_eq!(dir.current("ada"), Some(second));
    }

    #[test]
    fn unregister_ignores_superseded_handle() {
        let dir = ConnectionDirectory::new();
        let (old, _rx1) = dir.register("ada");
        let (current, _rx2) = dir.register("ada");

        // The old connection's cleanup must not tear down the new channel.
        dir.unregister("ada", old);
        assert!(dir.is_current("ada", current));

        dir.unregister("ada", current);
        assert!(!dir.is_open("ada"));
    }

    #[test]
    fn send_reaches_current_receiver() {
        let dir = ConnectionDirectory::new();
        let (_id, mut rx) = dir.register("ada");

        assert!(dir.send("ada", ServerMsg::Countdown(CountdownData { value: 3 })));
        assert!(matches!(
            rx.try_recv(),
            Ok(ServerMsg::Countdown(CountdownData { value: 3 }))
        ));

        assert!(!dir.send("ghost", ServerMsg::Countdown(CountdownData { value: 1 })));
    }

    #[test]
    fn dropped_receiver_reads_as_closed() {
        let dir = ConnectionDirectory::new();
        let (id, rx) = dir.register("ada");
        drop(rx);

        assert!(!dir.is_open("ada"));
        assert!(!dir.is_current("ada", id));
    }
}
