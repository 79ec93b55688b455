//! Bridge from the in-process bus to browser transport.
//!
//! The [`ClientEventBridge`] lives at the boundary between the synchronous
//! [`EventBus`] and the async browser sessions, mapping UI-facing bus events to
//! [`ClientEvent`]s on a `tokio::sync::broadcast` channel.

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;

use super::emitter::EventEmitter;
use super::{
    channels, BusEvent, ClientEvent, ConnectionEvent, EntityEvent, EventBus, PanelEvent,
    Subscription, ViewEvent,
};
use crate::state::EntityStore;
use crate::utils::now_millis;

/// Forwards bus events to browser sessions.
///
/// Besides the broadcast channel, events are mirrored to an optional external
/// [`EventEmitter`] that can be set after construction.
pub struct ClientEventBridge {
    tx: broadcast::Sender<ClientEvent>,
    /// Optional external emitter (e.g. debug logging)
    external_emitter: Arc<RwLock<Option<Arc<dyn EventEmitter>>>>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl ClientEventBridge {
    /// Creates a new bridge with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            external_emitter: Arc::new(RwLock::new(None)),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Starts forwarding bus traffic.
    ///
    /// Entity updates are enriched with the merged record from `store`.
    /// Calling this again replaces the previous subscriptions.
    pub fn attach(self: &Arc<Self>, bus: &EventBus, store: Arc<EntityStore>) {
        let mut subs = Vec::with_capacity(5);

        let weak = Arc::downgrade(self);
        subs.push(bus.subscribe(channels::CONNECTION_STATE, move |event| {
            if let (Some(bridge), BusEvent::ConnectionStateChanged(state)) =
                (weak.upgrade(), event)
            {
                bridge.emit_connection(ConnectionEvent::StateChanged {
                    state: *state,
                    timestamp: now_millis(),
                });
            }
        }));

        let weak = Arc::downgrade(self);
        subs.push(bus.subscribe(channels::AUTH_FAILED, move |event| {
            if let (Some(bridge), BusEvent::AuthFailed { message }) = (weak.upgrade(), event) {
                bridge.emit_connection(ConnectionEvent::AuthFailed {
                    message: message.clone(),
                    timestamp: now_millis(),
                });
            }
        }));

        let weak: Weak<Self> = Arc::downgrade(self);
        subs.push(bus.subscribe(channels::ENTITY_UPDATED, move |event| {
            let (Some(bridge), BusEvent::EntityUpdated { entity_id }) = (weak.upgrade(), event)
            else {
                return;
            };
            if let Some(entity) = store.get(entity_id) {
                bridge.emit_entity(EntityEvent::Updated {
                    entity,
                    timestamp: now_millis(),
                });
            }
        }));

        let weak = Arc::downgrade(self);
        subs.push(bus.subscribe(channels::VIEW_CHANGED, move |event| {
            if let (Some(bridge), BusEvent::ViewChanged { view }) = (weak.upgrade(), event) {
                bridge.emit_view(ViewEvent::Changed {
                    view: view.clone(),
                    timestamp: now_millis(),
                });
            }
        }));

        let weak = Arc::downgrade(self);
        subs.push(bus.subscribe(channels::PANEL_UPDATED, move |event| {
            if let (Some(bridge), BusEvent::PanelUpdated { panel, model }) = (weak.upgrade(), event)
            {
                bridge.emit_panel(PanelEvent::Updated {
                    panel: panel.clone(),
                    model: model.clone(),
                    timestamp: now_millis(),
                });
            }
        }));

        *self.subscriptions.lock() = subs;
    }

    /// Stops forwarding bus traffic.
    pub fn detach(&self) {
        self.subscriptions.lock().clear();
    }

    /// Sets an external emitter that receives a copy of every event.
    pub fn set_external_emitter(&self, emitter: Arc<dyn EventEmitter>) {
        *self.external_emitter.write() = Some(emitter);
    }

    /// Returns a new receiver for the broadcast channel.
    ///
    /// Browser sessions use this to subscribe to events.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }
}

/// Generates an [`EventEmitter`] method that forwards to the external emitter
/// (if set) and then sends to the broadcast channel.
macro_rules! impl_emit {
    ($method:ident, $event_ty:ty, $variant:ident) => {
        fn $method(&self, event: $event_ty) {
            if let Some(ref emitter) = *self.external_emitter.read() {
                emitter.$method(event.clone());
            }
            if let Err(e) = self.tx.send(ClientEvent::$variant(event)) {
                log::trace!("[EventBridge] No broadcast receivers: {}", e);
            }
        }
    };
}

impl EventEmitter for ClientEventBridge {
    impl_emit!(emit_connection, ConnectionEvent, Connection);
    impl_emit!(emit_entity, EntityEvent, Entity);
    impl_emit!(emit_view, ViewEvent, View);
    impl_emit!(emit_panel, PanelEvent, Panel);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::ConnectionState;
    use crate::state::EntityRecord;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn attached() -> (EventBus, Arc<EntityStore>, Arc<ClientEventBridge>) {
        let bus = EventBus::new();
        let store = Arc::new(EntityStore::new());
        let bridge = Arc::new(ClientEventBridge::new(16));
        bridge.attach(&bus, Arc::clone(&store));
        (bus, store, bridge)
    }

    #[test]
    fn view_changes_reach_browser_receivers() {
        let (bus, _store, bridge) = attached();
        let mut rx = bridge.subscribe();

        bus.publish(BusEvent::ViewChanged {
            view: "cameras".into(),
        });

        match rx.try_recv() {
            Ok(ClientEvent::View(ViewEvent::Changed { view, .. })) => assert_eq!(view, "cameras"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn entity_updates_carry_the_merged_record() {
        let (bus, store, bridge) = attached();
        let mut rx = bridge.subscribe();
        store.update(EntityRecord::new("sensor.x").with_state("on"));

        bus.publish(BusEvent::EntityUpdated {
            entity_id: "sensor.x".into(),
        });

        match rx.try_recv() {
            Ok(ClientEvent::Entity(EntityEvent::Updated { entity, .. })) => {
                assert_eq!(entity.entity_id, "sensor.x");
                assert_eq!(entity.state.as_deref(), Some("on"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn updates_for_unknown_entities_are_not_forwarded() {
        let (bus, _store, bridge) = attached();
        let mut rx = bridge.subscribe();

        bus.publish(BusEvent::EntityUpdated {
            entity_id: "sensor.ghost".into(),
        });

        assert!(rx.try_recv().is_err());
    }

    struct CountingEmitter {
        connection: AtomicUsize,
    }

    impl EventEmitter for CountingEmitter {
        fn emit_connection(&self, _event: ConnectionEvent) {
            self.connection.fetch_add(1, Ordering::SeqCst);
        }
        fn emit_entity(&self, _event: EntityEvent) {}
        fn emit_view(&self, _event: ViewEvent) {}
        fn emit_panel(&self, _event: PanelEvent) {}
    }

    #[test]
    fn external_emitter_receives_copies_without_receivers() {
        let (bus, _store, bridge) = attached();
        let counter = Arc::new(CountingEmitter {
            connection: AtomicUsize::new(0),
        });
        bridge.set_external_emitter(counter.clone());

        bus.publish(BusEvent::ConnectionStateChanged(ConnectionState::Connected));
        bus.publish(BusEvent::AuthFailed {
            message: "bad token".into(),
        });

        assert_eq!(counter.connection.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn detach_stops_forwarding() {
        let (bus, _store, bridge) = attached();
        let mut rx = bridge.subscribe();
        bridge.detach();

        bus.publish(BusEvent::ViewChanged { view: "home".into() });

        assert!(rx.try_recv().is_err());
        assert_eq!(bus.listener_count(channels::VIEW_CHANGED), 0);
    }
}
