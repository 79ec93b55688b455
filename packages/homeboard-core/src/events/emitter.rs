//! Optional secondary sinks for browser-facing events.
//!
//! The [`ClientEventBridge`](super::ClientEventBridge) always feeds the broadcast
//! channel; an [`EventEmitter`] can be attached to mirror the same events to
//! another consumer (a log, a test probe).

use super::{ConnectionEvent, EntityEvent, PanelEvent, ViewEvent};

/// Receives browser-facing events by category.
pub trait EventEmitter: Send + Sync {
    fn emit_connection(&self, event: ConnectionEvent);

    fn emit_entity(&self, event: EntityEvent);

    fn emit_view(&self, event: ViewEvent);

    fn emit_panel(&self, event: PanelEvent);
}

/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_connection(&self, event: ConnectionEvent) {
        tracing::debug!(?event, "connection_event");
    }

    fn emit_entity(&self, event: EntityEvent) {
        tracing::debug!(?event, "entity_event");
    }

    fn emit_view(&self, event: ViewEvent) {
        tracing::debug!(?event, "view_event");
    }

    fn emit_panel(&self, event: PanelEvent) {
        tracing::debug!(?event, "panel_event");
    }
}
