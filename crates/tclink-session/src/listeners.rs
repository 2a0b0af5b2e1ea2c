//! Listener registries.
//!
//! Listeners are stored as `Arc`s in a copy-on-iterate list: dispatch
//! clones the current list and calls it without holding the lock, so a
//! listener may add or remove listeners (itself included) while it runs.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tclink_protocol::Packet;

/// Receives every domain packet the registry recognizes.
pub type PacketListener<D> = dyn Fn(&D) + Send + Sync;

/// Receives primitive packets no converter recognized.
pub type RawPacketListener = dyn Fn(&Packet) + Send + Sync;

/// Answers a packet received over a connection. The returned bytes are
/// sent back to the requester; `None` means "no reply".
pub type ReplyHandler = dyn Fn(&Packet) -> Option<Vec<u8>> + Send + Sync;

/// Handle for removing a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

pub(crate) struct ListenerSet<L: ?Sized> {
    entries: RwLock<Vec<(ListenerId, Arc<L>)>>,
}

impl<L: ?Sized> Default for ListenerSet<L> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl<L: ?Sized> ListenerSet<L> {
    /// Adds `listener`. Adding the same `Arc` twice returns the id it
    /// already has.
    pub(crate) fn add(&self, listener: Arc<L>) -> ListenerId {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some((id, _)) = entries.iter().find(|(_, l)| Arc::ptr_eq(l, &listener)) {
            return *id;
        }
        let id = ListenerId::next();
        entries.push((id, listener));
        id
    }

    /// Removes the listener registered under `id`. Returns whether it was
    /// present.
    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    /// The current listeners, in registration order.
    pub(crate) fn snapshot(&self) -> Vec<Arc<L>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub(crate) fn clear(&self) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_same_arc_twice_returns_same_id() {
        let set: ListenerSet<RawPacketListener> = ListenerSet::default();
        let listener: Arc<RawPacketListener> = Arc::new(|_: &Packet| {});
        let first = set.add(Arc::clone(&listener));
        let second = set.add(listener);
        assert_eq!(first, second);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_add_distinct_listeners_get_distinct_ids() {
        let set: ListenerSet<RawPacketListener> = ListenerSet::default();
        let a = set.add(Arc::new(|_: &Packet| {}));
        let b = set.add(Arc::new(|_: &Packet| {}));
        assert_ne!(a, b);
        assert_eq!(set.snapshot().len(), 2);
    }

    #[test]
    fn test_remove_returns_whether_present() {
        let set: ListenerSet<RawPacketListener> = ListenerSet::default();
        let id = set.add(Arc::new(|_: &Packet| {}));
        assert!(set.remove(id));
        assert!(!set.remove(id));
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn test_snapshot_survives_clear() {
        let set: ListenerSet<RawPacketListener> = ListenerSet::default();
        set.add(Arc::new(|_: &Packet| {}));
        let snapshot = set.snapshot();
        set.clear();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(set.len(), 0);
    }
}
