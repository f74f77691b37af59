//! Typed publish/subscribe registry for channel events
//!
//! Subscribers are grouped by event kind and called in subscription order.
//! A subscriber that returns an error or panics is logged and skipped; the
//! rest still run and the channel keeps going.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{error, warn};

use super::{ChannelEvent, ChannelEventKind};

/// Subscriber callback
pub type Listener = Arc<dyn Fn(&ChannelEvent) -> anyhow::Result<()> + Send + Sync>;

/// Wrap a closure as a [`Listener`]
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&ChannelEvent) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Table {
    next_id: u64,
    by_kind: HashMap<ChannelEventKind, Vec<(SubscriptionId, Listener)>>,
}

/// Listener registry keyed by event kind
#[derive(Default)]
pub struct Listeners {
    table: Mutex<Table>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, kind: ChannelEventKind, listener: Listener) -> SubscriptionId {
        let mut table = self.lock();
        table.next_id += 1;
        let id = SubscriptionId(table.next_id);
        table.by_kind.entry(kind).or_default().push((id, listener));
        id
    }

    /// Remove a subscription; returns false if it was already gone
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut table = self.lock();
        for listeners in table.by_kind.values_mut() {
            if let Some(pos) = listeners.iter().position(|(sub, _)| *sub == id) {
                listeners.remove(pos);
                return true;
            }
        }
        false
    }

    pub fn clear(&self) {
        self.lock().by_kind.clear();
    }

    pub fn count(&self, kind: ChannelEventKind) -> usize {
        self.lock().by_kind.get(&kind).map_or(0, Vec::len)
    }

    pub fn total(&self) -> usize {
        self.lock().by_kind.values().map(Vec::len).sum()
    }

    /// Deliver an event to every subscriber of its kind
    ///
    /// Returns how many subscribers failed. The registry lock is not held
    /// while callbacks run, so a callback may subscribe or unsubscribe.
    pub fn emit(&self, event: &ChannelEvent) -> usize {
        let kind = event.kind();
        let snapshot: Vec<Listener> = self
            .lock()
            .by_kind
            .get(&kind)
            .map(|listeners| listeners.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();

        let mut failures = 0;
        for listener in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    warn!("{:?} listener failed: {:#}", kind, e);
                }
                Err(_) => {
                    failures += 1;
                    error!("{:?} listener panicked", kind);
                }
            }
        }
        failures
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::DisconnectReason;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter(hits: &Arc<AtomicUsize>) -> Listener {
        let hits = Arc::clone(hits);
        listener(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn disconnect_event() -> ChannelEvent {
        ChannelEvent::Disconnect {
            reason: DisconnectReason::TransportClosed,
        }
    }

    #[test]
    fn test_emit_reaches_only_matching_kind() {
        let listeners = Listeners::new();
        let hits = Arc::new(AtomicUsize::new(0));
        listeners.subscribe(ChannelEventKind::Disconnect, counter(&hits));
        listeners.subscribe(ChannelEventKind::Connect, counter(&hits));

        listeners.emit(&disconnect_event());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_emit_preserves_subscription_order() {
        let listeners = Listeners::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for n in 0..3 {
            let order = Arc::clone(&order);
            listeners.subscribe(
                ChannelEventKind::Disconnect,
                listener(move |_| {
                    order.lock().unwrap().push(n);
                    Ok(())
                }),
            );
        }

        listeners.emit(&disconnect_event());
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_failing_listener_does_not_block_siblings() {
        let listeners = Listeners::new();
        let hits = Arc::new(AtomicUsize::new(0));

        listeners.subscribe(
            ChannelEventKind::Disconnect,
            listener(|_| Err(anyhow::anyhow!("listener broke"))),
        );
        listeners.subscribe(
            ChannelEventKind::Disconnect,
            listener(|_| panic!("listener exploded")),
        );
        listeners.subscribe(ChannelEventKind::Disconnect, counter(&hits));

        let failures = listeners.emit(&disconnect_event());
        assert_eq!(failures, 2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // Still usable afterwards
        listeners.emit(&disconnect_event());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe() {
        let listeners = Listeners::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let id = listeners.subscribe(ChannelEventKind::Disconnect, counter(&hits));
        assert_eq!(listeners.count(ChannelEventKind::Disconnect), 1);

        assert!(listeners.unsubscribe(id));
        assert!(!listeners.unsubscribe(id));
        listeners.emit(&disconnect_event());

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(listeners.total(), 0);
    }

    #[test]
    fn test_listener_may_unsubscribe_itself() {
        let listeners = Arc::new(Listeners::new());
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let registry = Arc::clone(&listeners);
        let own_id = Arc::clone(&slot);
        let id = listeners.subscribe(
            ChannelEventKind::Disconnect,
            listener(move |_| {
                if let Some(id) = *own_id.lock().unwrap() {
                    registry.unsubscribe(id);
                }
                Ok(())
            }),
        );
        *slot.lock().unwrap() = Some(id);

        listeners.emit(&disconnect_event());
        assert_eq!(listeners.total(), 0);
    }
}
