//! WebSocket subscription table.
//!
//! Maps server-assigned subscription ids to the sinks that receive their
//! notifications. Removing an entry drops its sender, which closes the
//! subscriber's receiver.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::mpsc::error::TrySendError;

use ethwire_core::codec::SubscriptionId;
use ethwire_core::provider::NotificationSink;

/// What happened to one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The sink was full; the notification was dropped.
    Full,
    /// The subscriber went away; the entry has been removed.
    Closed,
    /// No subscription with that id.
    Unknown,
}

struct SubscriptionEntry {
    /// The method the subscription was created with (e.g. `eth_subscribe`).
    method: String,
    sink: NotificationSink,
}

/// Active subscriptions of one connection.
#[derive(Default)]
pub struct SubscriptionManager {
    entries: Mutex<HashMap<SubscriptionId, SubscriptionEntry>>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<SubscriptionId, SubscriptionEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `sink` under `id`. A previous sink for the same id is closed.
    ///
    /// Returns `true` if an existing entry was replaced.
    pub fn insert(&self, id: SubscriptionId, method: impl Into<String>, sink: NotificationSink) -> bool {
        let entry = SubscriptionEntry {
            method: method.into(),
            sink,
        };
        self.entries().insert(id, entry).is_some()
    }

    /// Forward a notification without blocking.
    pub fn dispatch(&self, id: &SubscriptionId, message: Value) -> Delivery {
        let mut entries = self.entries();
        let Some(entry) = entries.get(id) else {
            return Delivery::Unknown;
        };
        match entry.sink.try_send(message) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Closed(_)) => {
                entries.remove(id);
                Delivery::Closed
            }
        }
    }

    /// Remove a subscription, returning the method it was created with.
    pub fn remove(&self, id: &SubscriptionId) -> Option<String> {
        self.entries().remove(id).map(|e| e.method)
    }

    /// Remove every subscription, closing all sinks.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries();
        let n = entries.len();
        entries.clear();
        n
    }

    /// Number of active subscriptions.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Returns `true` if there are no active subscriptions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn sub(id: &str) -> SubscriptionId {
        SubscriptionId(id.into())
    }

    #[test]
    fn register_and_dispatch() {
        let mgr = SubscriptionManager::new();
        let (tx, mut rx) = mpsc::channel(4);
        mgr.insert(sub("0xdeadbeef"), "eth_subscribe", tx);

        assert_eq!(mgr.dispatch(&sub("0xdeadbeef"), json!({"number": "0x1"})), Delivery::Delivered);

        let msg = rx.try_recv().unwrap();
        assert_eq!(msg["number"], "0x1");
    }

    #[test]
    fn unknown_id_is_dropped() {
        let mgr = SubscriptionManager::new();
        assert_eq!(mgr.dispatch(&sub("0x9"), json!(1)), Delivery::Unknown);
    }

    #[test]
    fn full_sink_drops_but_keeps_entry() {
        let mgr = SubscriptionManager::new();
        let (tx, mut rx) = mpsc::channel(1);
        mgr.insert(sub("0x1"), "eth_subscribe", tx);

        assert_eq!(mgr.dispatch(&sub("0x1"), json!(1)), Delivery::Delivered);
        assert_eq!(mgr.dispatch(&sub("0x1"), json!(2)), Delivery::Full);
        assert_eq!(rx.try_recv().unwrap(), json!(1));
        assert_eq!(mgr.dispatch(&sub("0x1"), json!(3)), Delivery::Delivered);
        assert_eq!(rx.try_recv().unwrap(), json!(3));
    }

    #[test]
    fn dropped_receiver_unsubscribes() {
        let mgr = SubscriptionManager::new();
        let (tx, rx) = mpsc::channel(1);
        mgr.insert(sub("0x1"), "eth_subscribe", tx);
        drop(rx);

        assert_eq!(mgr.dispatch(&sub("0x1"), json!(1)), Delivery::Closed);
        assert!(mgr.is_empty());
    }

    #[test]
    fn remove_closes_sink() {
        let mgr = SubscriptionManager::new();
        let (tx, mut rx) = mpsc::channel(1);
        mgr.insert(sub("0x1"), "parity_subscribe", tx);

        assert_eq!(mgr.remove(&sub("0x1")).as_deref(), Some("parity_subscribe"));
        assert_eq!(mgr.len(), 0);
        assert!(matches!(rx.try_recv(), Err(mpsc::error::TryRecvError::Disconnected)));
        assert_eq!(mgr.remove(&sub("0x1")), None);
    }

    #[test]
    fn same_id_last_sink_wins() {
        let mgr = SubscriptionManager::new();
        let (first, mut first_rx) = mpsc::channel(1);
        let (second, mut second_rx) = mpsc::channel(1);
        assert!(!mgr.insert(sub("0x1"), "eth_subscribe", first));
        assert!(mgr.insert(sub("0x1"), "eth_subscribe", second));

        mgr.dispatch(&sub("0x1"), json!("head"));

        assert!(matches!(first_rx.try_recv(), Err(mpsc::error::TryRecvError::Disconnected)));
        assert_eq!(second_rx.try_recv().unwrap(), json!("head"));
    }

    #[test]
    fn clear_closes_everything() {
        let mgr = SubscriptionManager::new();
        let (a, mut a_rx) = mpsc::channel(1);
        let (b, _b_rx) = mpsc::channel(1);
        mgr.insert(sub("0xa"), "eth_subscribe", a);
        mgr.insert(sub("0xb"), "eth_subscribe", b);

        assert_eq!(mgr.clear(), 2);
        assert!(mgr.is_empty());
        assert!(matches!(a_rx.try_recv(), Err(mpsc::error::TryRecvError::Disconnected)));
    }
}
