//! Routes raw hub notifications into the entity store.
//!
//! The router is the store's only writer. For every applied change it
//! publishes `EntityUpdated` carrying just the entity id; consumers re-read the
//! store for the merged record.

use std::sync::Arc;

use serde_json::{Map, Value};

use super::CommandRegistry;
use crate::config::HubConfig;
use crate::events::{channels, BusEvent, EventBus, Subscription};
use crate::hub::ListItemsRequester;
use crate::protocol_constants::{ALL_LIST_ITEMS_ATTRIBUTE, LIST_ITEMS_ATTRIBUTE, STATE_CHANGED_EVENT};
use crate::state::EntityStore;

/// Holds the router's bus subscriptions. Dropping it stops routing.
pub struct EventRouter {
    subscriptions: Vec<Subscription>,
}

impl EventRouter {
    /// Subscribes the router to hub traffic on `bus`.
    pub fn start(
        bus: &EventBus,
        store: Arc<EntityStore>,
        requester: Arc<dyn ListItemsRequester>,
        commands: Arc<CommandRegistry>,
        config: &HubConfig,
    ) -> Self {
        let list_entities = Arc::new(config.list_entities.clone());
        let mut subscriptions = Vec::with_capacity(4);

        {
            let (bus_out, store, requester, list_entities) = (
                bus.clone(),
                Arc::clone(&store),
                Arc::clone(&requester),
                Arc::clone(&list_entities),
            );
            subscriptions.push(bus.subscribe(
                channels::hub_event(STATE_CHANGED_EVENT),
                move |event| {
                    if let BusEvent::HubEvent { data, .. } = event {
                        apply_state_changed(&bus_out, &store, &*requester, &list_entities, data);
                    }
                },
            ));
        }

        {
            let (bus_out, store, requester, list_entities) = (
                bus.clone(),
                Arc::clone(&store),
                Arc::clone(&requester),
                Arc::clone(&list_entities),
            );
            subscriptions.push(bus.subscribe(channels::STATES, move |event| {
                if let BusEvent::StatesLoaded { entities } = event {
                    apply_snapshot(&bus_out, &store, entities);
                    for entity_id in list_entities.iter() {
                        requester.request_list_items(entity_id);
                    }
                }
            }));
        }

        {
            let (bus_out, store) = (bus.clone(), Arc::clone(&store));
            subscriptions.push(bus.subscribe(channels::LIST_ITEMS, move |event| {
                if let BusEvent::ListItemsLoaded { entity_id, items } = event {
                    apply_list_items(&bus_out, &store, entity_id, items);
                }
            }));
        }

        subscriptions.push(bus.subscribe(
            channels::hub_event(&config.command_event_type),
            move |event| {
                if let BusEvent::HubEvent { data, .. } = event {
                    commands.dispatch(data);
                }
            },
        ));

        log::info!(
            "[Router] Routing state changes, snapshots, list items and '{}' commands",
            config.command_event_type
        );
        Self { subscriptions }
    }

    /// Number of bus subscriptions held.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}

fn apply_state_changed(
    bus: &EventBus,
    store: &EntityStore,
    requester: &dyn ListItemsRequester,
    list_entities: &[String],
    data: &Value,
) {
    let Some(new_state) = data.get("new_state").filter(|v| !v.is_null()) else {
        log::debug!(
            "[Router] state_changed without new_state for {}",
            data.get("entity_id").and_then(Value::as_str).unwrap_or("?")
        );
        return;
    };

    let Some(entity_id) = store.update_from_value(new_state) else {
        log::debug!("[Router] Ignoring state without an entity id");
        return;
    };

    bus.publish(BusEvent::EntityUpdated {
        entity_id: entity_id.clone(),
    });
    if list_entities.iter().any(|e| *e == entity_id) {
        requester.request_list_items(&entity_id);
    }
}

fn apply_snapshot(bus: &EventBus, store: &EntityStore, entities: &[Value]) {
    let mut applied = 0usize;
    for entity in entities {
        if let Some(entity_id) = store.update_from_value(entity) {
            applied += 1;
            bus.publish(BusEvent::EntityUpdated { entity_id });
        }
    }
    log::info!(
        "[Router] Applied snapshot: {} of {} entities",
        applied,
        entities.len()
    );
}

fn apply_list_items(bus: &EventBus, store: &EntityStore, entity_id: &str, items: &[Value]) {
    let mut attributes = Map::new();
    attributes.insert(LIST_ITEMS_ATTRIBUTE.to_string(), Value::Array(items.to_vec()));
    attributes.insert(
        ALL_LIST_ITEMS_ATTRIBUTE.to_string(),
        Value::Array(items.to_vec()),
    );

    if store.merge_attributes(entity_id, attributes) {
        log::debug!("[Router] {} items for {}", items.len(), entity_id);
        bus.publish(BusEvent::EntityUpdated {
            entity_id: entity_id.to_string(),
        });
    }
}
