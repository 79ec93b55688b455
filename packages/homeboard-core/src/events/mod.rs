//! Event system.
//!
//! Two layers live here:
//! - [`EventBus`]: the in-process, synchronous publish/subscribe bus that
//!   connects the hub client, the router, the view manager and the panels
//! - [`ClientEventBridge`]: forwards the UI-facing subset of bus traffic as
//!   [`ClientEvent`]s onto a `tokio::sync::broadcast` channel for browser sessions

mod bridge;
mod bus;
mod emitter;

pub use bridge::ClientEventBridge;
pub use bus::{EventBus, Subscription};
pub use emitter::{EventEmitter, LoggingEventEmitter};

use std::borrow::Cow;

use serde::Serialize;
use serde_json::Value;

use crate::hub::ConnectionState;
use crate::state::EntityRecord;

/// Channel names used on the [`EventBus`].
pub mod channels {
    /// Connection state transitions (every state).
    pub const CONNECTION_STATE: &str = "hub:connection-state";
    /// The hub accepted our credentials.
    pub const CONNECTED: &str = "hub:connected";
    /// The hub connection closed.
    pub const DISCONNECTED: &str = "hub:disconnected";
    /// The hub rejected our credentials.
    pub const AUTH_FAILED: &str = "hub:auth-failed";
    /// Prefix for raw hub events; the event type is appended.
    pub const HUB_EVENT_PREFIX: &str = "hub:event:";
    /// Full entity snapshot arrived.
    pub const STATES: &str = "hub:states";
    /// Items for a list entity arrived.
    pub const LIST_ITEMS: &str = "hub:list-items";
    /// An entity in the store changed.
    pub const ENTITY_UPDATED: &str = "hub:state-updated";
    /// The active view changed.
    pub const VIEW_CHANGED: &str = "view:changed";
    /// A panel's render model changed.
    pub const PANEL_UPDATED: &str = "panel:updated";

    /// Channel carrying raw hub events of the given type.
    pub fn hub_event(event_type: &str) -> String {
        format!("{}{}", HUB_EVENT_PREFIX, event_type)
    }
}

/// Events published on the in-process [`EventBus`].
#[derive(Debug, Clone)]
pub enum BusEvent {
    /// The realtime client moved to a new connection state.
    ConnectionStateChanged(ConnectionState),
    /// Authentication succeeded and subscriptions were requested.
    Connected,
    /// The transport closed; a reconnect is scheduled.
    Disconnected { reason: String },
    /// The hub rejected the access token.
    AuthFailed { message: String },
    /// A subscribed hub event; `data` is passed through untouched.
    HubEvent { event_type: String, data: Value },
    /// Full entity snapshot from a `get_states` request.
    StatesLoaded { entities: Vec<Value> },
    /// Items of a list entity.
    ListItemsLoaded { entity_id: String, items: Vec<Value> },
    /// The store record for this entity changed. Consumers re-read the store.
    EntityUpdated { entity_id: String },
    /// The active view changed.
    ViewChanged { view: String },
    /// A panel produced a new render model.
    PanelUpdated { panel: String, model: Value },
}

impl BusEvent {
    /// Returns the channel this event is delivered on.
    pub fn channel(&self) -> Cow<'static, str> {
        match self {
            Self::ConnectionStateChanged(_) => Cow::Borrowed(channels::CONNECTION_STATE),
            Self::Connected => Cow::Borrowed(channels::CONNECTED),
            Self::Disconnected { .. } => Cow::Borrowed(channels::DISCONNECTED),
            Self::AuthFailed { .. } => Cow::Borrowed(channels::AUTH_FAILED),
            Self::HubEvent { event_type, .. } => Cow::Owned(channels::hub_event(event_type)),
            Self::StatesLoaded { .. } => Cow::Borrowed(channels::STATES),
            Self::ListItemsLoaded { .. } => Cow::Borrowed(channels::LIST_ITEMS),
            Self::EntityUpdated { .. } => Cow::Borrowed(channels::ENTITY_UPDATED),
            Self::ViewChanged { .. } => Cow::Borrowed(channels::VIEW_CHANGED),
            Self::PanelUpdated { .. } => Cow::Borrowed(channels::PANEL_UPDATED),
        }
    }
}

/// Events pushed to browser sessions.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Hub connection status.
    Connection(ConnectionEvent),
    /// Entity state changes.
    Entity(EntityEvent),
    /// View switches.
    View(ViewEvent),
    /// Panel render models.
    Panel(PanelEvent),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ConnectionEvent {
    /// The connection state changed.
    StateChanged {
        state: ConnectionState,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The hub rejected the access token.
    AuthFailed {
        message: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EntityEvent {
    /// The merged record after an update.
    Updated {
        entity: EntityRecord,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ViewEvent {
    /// The dashboard switched to `view`.
    Changed {
        view: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PanelEvent {
    /// New render model for a panel.
    Updated {
        panel: String,
        model: Value,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

impl From<ConnectionEvent> for ClientEvent {
    fn from(event: ConnectionEvent) -> Self {
        ClientEvent::Connection(event)
    }
}

impl From<EntityEvent> for ClientEvent {
    fn from(event: EntityEvent) -> Self {
        ClientEvent::Entity(event)
    }
}

impl From<ViewEvent> for ClientEvent {
    fn from(event: ViewEvent) -> Self {
        ClientEvent::View(event)
    }
}

impl From<PanelEvent> for ClientEvent {
    fn from(event: PanelEvent) -> Self {
        ClientEvent::Panel(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hub_events_use_dynamic_channels() {
        let event = BusEvent::HubEvent {
            event_type: "state_changed".into(),
            data: Value::Null,
        };
        assert_eq!(event.channel(), "hub:event:state_changed");
        assert_eq!(
            BusEvent::EntityUpdated {
                entity_id: "sensor.x".into()
            }
            .channel(),
            channels::ENTITY_UPDATED
        );
    }

    #[test]
    fn client_events_serialize_with_category_and_type() {
        let event: ClientEvent = ViewEvent::Changed {
            view: "cameras".into(),
            timestamp: 42,
        }
        .into();
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"category": "view", "type": "changed", "view": "cameras", "timestamp": 42})
        );
    }
}
