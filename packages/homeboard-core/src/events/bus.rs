//! Synchronous in-process publish/subscribe.
//!
//! Handlers run on the publishing thread in registration order. The handler
//! list for a channel is snapshotted before dispatch and the lock released, so
//! handlers may publish, subscribe or unsubscribe; such changes apply from the
//! next publish on. A panicking handler is logged and skipped.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::BusEvent;

type Handler = Arc<dyn Fn(&BusEvent) + Send + Sync>;

struct Listener {
    id: u64,
    handler: Handler,
}

#[derive(Default)]
struct BusInner {
    listeners: RwLock<HashMap<String, Vec<Listener>>>,
    next_id: AtomicU64,
}

impl BusInner {
    fn remove(&self, channel: &str, id: u64) -> bool {
        let mut listeners = self.listeners.write();
        let Some(list) = listeners.get_mut(channel) else {
            return false;
        };
        let before = list.len();
        list.retain(|l| l.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            listeners.remove(channel);
        }
        removed
    }
}

/// In-process event bus.
///
/// Cloning is cheap; all clones share the same listener table.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for events published on `channel`.
    ///
    /// The handler stays registered until the returned [`Subscription`] is
    /// dropped or [`Subscription::unsubscribe`] is called.
    pub fn subscribe<F>(&self, channel: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        let channel = channel.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .write()
            .entry(channel.clone())
            .or_default()
            .push(Listener {
                id,
                handler: Arc::new(handler),
            });

        Subscription {
            bus: Arc::downgrade(&self.inner),
            channel,
            id,
        }
    }

    /// Delivers `event` to every handler on its channel.
    pub fn publish(&self, event: BusEvent) {
        let channel = event.channel();
        let handlers: Vec<Handler> = match self.inner.listeners.read().get(channel.as_ref()) {
            Some(list) => list.iter().map(|l| Arc::clone(&l.handler)).collect(),
            None => {
                log::trace!("[Bus] No listeners on {}", channel);
                return;
            }
        };

        for handler in handlers {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                log::error!(
                    "[Bus] Listener on {} panicked: {}",
                    channel,
                    panic_message(panic.as_ref())
                );
            }
        }
    }

    /// Number of handlers currently registered on `channel`.
    #[must_use]
    pub fn listener_count(&self, channel: &str) -> usize {
        self.inner
            .listeners
            .read()
            .get(channel)
            .map_or(0, |list| list.len())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Handle for a registered bus handler.
///
/// Dropping the handle removes the handler. The handle does not keep the bus
/// alive.
#[must_use = "dropping a Subscription immediately unsubscribes its handler"]
pub struct Subscription {
    bus: Weak<BusInner>,
    channel: String,
    id: u64,
}

impl Subscription {
    /// Channel the handler is registered on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Removes the handler now.
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Keeps the handler registered for the lifetime of the bus.
    pub fn detach(mut self) {
        self.bus = Weak::new();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            inner.remove(&self.channel, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::channels;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn view_changed(view: &str) -> BusEvent {
        BusEvent::ViewChanged {
            view: view.to_string(),
        }
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let subs: Vec<Subscription> = (0..3)
            .map(|i| {
                let order = Arc::clone(&order);
                bus.subscribe(channels::VIEW_CHANGED, move |_| order.lock().push(i))
            })
            .collect();

        bus.publish(view_changed("home"));

        assert_eq!(*order.lock(), vec![0, 1, 2]);
        drop(subs);
    }

    #[test]
    fn events_only_reach_their_channel() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        let _sub = bus.subscribe(channels::CONNECTED, move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(view_changed("home"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        bus.publish(BusEvent::Connected);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_handler_does_not_stop_later_handlers() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let _bad = bus.subscribe(channels::VIEW_CHANGED, |_| panic!("render failed"));
        let hits_clone = Arc::clone(&hits);
        let _good = bus.subscribe(channels::VIEW_CHANGED, move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(view_changed("cameras"));
        bus.publish(view_changed("home"));

        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dropping_subscription_stops_delivery() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        let sub = bus.subscribe(channels::VIEW_CHANGED, move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(view_changed("cameras"));
        drop(sub);
        bus.publish(view_changed("home"));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count(channels::VIEW_CHANGED), 0);
    }

    #[test]
    fn detached_subscription_stays_registered() {
        let bus = EventBus::new();
        bus.subscribe(channels::VIEW_CHANGED, |_| {}).detach();
        assert_eq!(bus.listener_count(channels::VIEW_CHANGED), 1);
    }

    #[test]
    fn changes_during_dispatch_apply_to_next_publish() {
        let bus = EventBus::new();
        let late_hits = Arc::new(AtomicUsize::new(0));
        let victim_hits = Arc::new(AtomicUsize::new(0));
        let victim: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let added: Arc<Mutex<Vec<Subscription>>> = Arc::new(Mutex::new(Vec::new()));

        let bus_clone = bus.clone();
        let victim_clone = Arc::clone(&victim);
        let added_clone = Arc::clone(&added);
        let late_clone = Arc::clone(&late_hits);
        let _first = bus.subscribe(channels::VIEW_CHANGED, move |_| {
            // Unsubscribe the victim and register a newcomer mid-dispatch
            victim_clone.lock().take();
            let late = Arc::clone(&late_clone);
            added_clone
                .lock()
                .push(bus_clone.subscribe(channels::VIEW_CHANGED, move |_| {
                    late.fetch_add(1, Ordering::SeqCst);
                }));
        });

        let victim_hits_clone = Arc::clone(&victim_hits);
        *victim.lock() = Some(bus.subscribe(channels::VIEW_CHANGED, move |_| {
            victim_hits_clone.fetch_add(1, Ordering::SeqCst);
        }));

        bus.publish(view_changed("cameras"));
        assert_eq!(victim_hits.load(Ordering::SeqCst), 1);
        assert_eq!(late_hits.load(Ordering::SeqCst), 0);

        bus.publish(view_changed("home"));
        assert_eq!(victim_hits.load(Ordering::SeqCst), 1);
        assert_eq!(late_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscription_outliving_bus_is_harmless() {
        let bus = EventBus::new();
        let sub = bus.subscribe(channels::VIEW_CHANGED, |_| {});
        drop(bus);
        assert_eq!(sub.channel(), channels::VIEW_CHANGED);
        drop(sub);
    }
}
