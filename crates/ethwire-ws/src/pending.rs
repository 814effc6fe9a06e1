//! In-flight call correlation table.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use ethwire_core::codec::Envelope;
use ethwire_core::provider::NotificationSink;

/// A subscribe call's sink, registered when its response arrives.
pub struct PendingSubscription {
    pub method: String,
    pub sink: NotificationSink,
}

/// One caller waiting for the response with a given id.
pub struct PendingCall {
    pub reply: oneshot::Sender<Envelope>,
    pub subscription: Option<PendingSubscription>,
}

/// Calls awaiting a response, keyed by request id.
///
/// [`take`](Self::take) removes the entry under the lock, so each id is
/// delivered at most once.
#[derive(Default)]
pub struct PendingCalls {
    calls: Mutex<HashMap<String, PendingCall>>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    fn calls(&self) -> MutexGuard<'_, HashMap<String, PendingCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a call and return the receiver its response will arrive on.
    pub fn register(
        &self,
        id: impl Into<String>,
        subscription: Option<PendingSubscription>,
    ) -> oneshot::Receiver<Envelope> {
        let (reply, rx) = oneshot::channel();
        self.calls().insert(id.into(), PendingCall { reply, subscription });
        rx
    }

    /// Remove and return the call registered under `id`.
    pub fn take(&self, id: &str) -> Option<PendingCall> {
        self.calls().remove(id)
    }

    /// Forget a call whose caller gave up.
    pub fn cancel(&self, id: &str) {
        self.calls().remove(id);
    }

    /// Cancel `id` when the returned guard is dropped.
    ///
    /// Covers callers that abandon the call future (e.g. under a timeout).
    /// Cancelling an id whose response was already taken is a no-op.
    pub fn cancel_on_drop(&self, id: impl Into<String>) -> CancelOnDrop<'_> {
        CancelOnDrop {
            pending: self,
            id: id.into(),
        }
    }

    /// Drop every waiting call; their receivers observe a closed channel.
    pub fn clear(&self) -> usize {
        let mut calls = self.calls();
        let n = calls.len();
        calls.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.calls().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// See [`PendingCalls::cancel_on_drop`].
pub struct CancelOnDrop<'a> {
    pending: &'a PendingCalls,
    id: String,
}

impl Drop for CancelOnDrop<'_> {
    fn drop(&mut self) {
        self.pending.cancel(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethwire_core::codec::decode;

    #[test]
    fn take_delivers_once() {
        let pending = PendingCalls::new();
        let mut rx = pending.register("a1", None);

        let call = pending.take("a1").unwrap();
        assert!(pending.take("a1").is_none());

        let env = decode(br#"{"jsonrpc":"2.0","id":"a1","result":"0x1"}"#).unwrap();
        call.reply.send(env).unwrap();
        assert_eq!(rx.try_recv().unwrap().valid_id().as_deref(), Some("a1"));
    }

    #[test]
    fn clear_fails_waiters() {
        let pending = PendingCalls::new();
        let mut a = pending.register("a", None);
        let _b = pending.register("b", None);
        assert_eq!(pending.len(), 2);

        assert_eq!(pending.clear(), 2);
        assert!(pending.is_empty());
        assert!(matches!(a.try_recv(), Err(oneshot::error::TryRecvError::Closed)));
    }

    #[test]
    fn cancel_removes_entry() {
        let pending = PendingCalls::new();
        let _rx = pending.register("x", None);
        pending.cancel("x");
        assert!(pending.take("x").is_none());
    }

    #[test]
    fn guard_cancels_abandoned_call() {
        let pending = PendingCalls::new();
        let _rx = pending.register("gone", None);
        let _other = pending.register("kept", None);
        {
            let _guard = pending.cancel_on_drop("gone");
            assert_eq!(pending.len(), 2);
        }
        assert!(pending.take("gone").is_none());
        assert!(pending.take("kept").is_some());
    }
}
