//! Hub connection state machine.
//!
//! [`RealtimeClient`] owns the connection state, the request id counter, the
//! pending-request table and an outbox of serialized frames. It performs no
//! I/O: [`HubConnection`](super::HubConnection) feeds it transport events and
//! drains the outbox onto the socket.
//!
//! Bus events produced by a transition are collected while the internal lock is
//! held and published after it is released, so bus handlers may call back into
//! the client (the router requests list items from inside a snapshot handler).

use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::futures::Notified;
use tokio::sync::Notify;

use super::backoff::Backoff;
use super::messages::{ClientMessage, ServerMessage};
use super::pending::{PendingRequests, RequestKind};
use super::{ConnectionState, Generation, ListItemsRequester};
use crate::config::HubConfig;
use crate::events::{BusEvent, EventBus};
use crate::protocol_constants::{LIST_ITEMS_ATTRIBUTE, STATE_CHANGED_EVENT};

/// What the driver should do after a frame was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Keep reading.
    Continue,
    /// Close the transport (the hub rejected our credentials).
    Close,
}

struct ClientInner {
    state: ConnectionState,
    generation: Generation,
    /// Last generation whose close was handled.
    closed_generation: Generation,
    next_id: u64,
    pending: PendingRequests,
    outbox: Vec<String>,
    auth_backoff: Backoff,
}

impl ClientInner {
    fn set_state(&mut self, state: ConnectionState, events: &mut Vec<BusEvent>) {
        if self.state != state {
            log::debug!("[Hub] State {} -> {}", self.state, state);
            self.state = state;
            events.push(BusEvent::ConnectionStateChanged(state));
        }
    }

    fn queue_frame(&mut self, message: &ClientMessage) {
        match message.to_text() {
            Ok(text) => self.outbox.push(text),
            Err(e) => log::error!("[Hub] Failed to serialize {:?}: {}", message, e),
        }
    }

    /// Assigns the next id, queues the frame and records it as pending.
    fn queue_request(&mut self, kind: RequestKind) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        let message = match &kind {
            RequestKind::SubscribeEvents { event_type } => ClientMessage::SubscribeEvents {
                id,
                event_type: event_type.clone(),
            },
            RequestKind::GetStates => ClientMessage::GetStates { id },
            RequestKind::ListItems { entity_id } => ClientMessage::ListItems {
                id,
                entity_id: entity_id.clone(),
            },
        };
        self.queue_frame(&message);
        let generation = self.generation;
        self.pending.insert(id, kind, generation);
        id
    }
}

/// Realtime client for the hub's WebSocket API.
pub struct RealtimeClient {
    config: HubConfig,
    bus: EventBus,
    inner: Mutex<ClientInner>,
    outbox_ready: Notify,
}

impl RealtimeClient {
    pub fn new(config: HubConfig, bus: EventBus) -> Self {
        let state = if config.enabled {
            ConnectionState::Idle
        } else {
            ConnectionState::Disabled
        };
        let auth_backoff = Backoff::new(config.auth_retry_initial(), config.auth_retry_max());

        Self {
            config,
            bus,
            inner: Mutex::new(ClientInner {
                state,
                generation: 0,
                closed_generation: 0,
                next_id: 1,
                pending: PendingRequests::new(),
                outbox: Vec::new(),
                auth_backoff,
            }),
            outbox_ready: Notify::new(),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn generation(&self) -> Generation {
        self.inner.lock().generation
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Starts a new connection attempt.
    ///
    /// Returns the attempt's generation, or `None` if an attempt is already in
    /// flight or the hub is disabled. Resets the id counter and abandons all
    /// pending requests.
    pub fn begin_connect(&self) -> Option<Generation> {
        if !self.config.enabled {
            return None;
        }

        let mut events = Vec::new();
        let generation = {
            let mut inner = self.inner.lock();
            if inner.state.is_active() {
                log::debug!(
                    "[Hub] Connect requested while {}; ignoring",
                    inner.state
                );
                return None;
            }

            inner.generation += 1;
            inner.next_id = 1;
            let abandoned = inner.pending.clear();
            if abandoned > 0 {
                log::debug!("[Hub] Abandoned {} pending request(s)", abandoned);
            }
            inner.outbox.clear();
            inner.set_state(ConnectionState::Connecting, &mut events);
            inner.generation
        };

        log::info!("[Hub] Connecting (attempt {})", generation);
        self.publish_all(events);
        Some(generation)
    }

    /// The transport for `generation` is open; wait for `auth_required`.
    pub fn transport_opened(&self, generation: Generation) -> bool {
        let mut events = Vec::new();
        let opened = {
            let mut inner = self.inner.lock();
            if inner.generation != generation || inner.state != ConnectionState::Connecting {
                log::debug!("[Hub] Ignoring transport open for attempt {}", generation);
                false
            } else {
                inner.set_state(ConnectionState::Authenticating, &mut events);
                true
            }
        };
        self.publish_all(events);
        opened
    }

    /// Handles one text frame received on `generation`.
    pub fn handle_frame(&self, generation: Generation, text: &str) -> FrameOutcome {
        let mut events = Vec::new();
        let (outcome, has_output) = {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                log::debug!(
                    "[Hub] Dropping frame from superseded attempt {} (current {})",
                    generation,
                    inner.generation
                );
                return FrameOutcome::Continue;
            }
            if !matches!(
                inner.state,
                ConnectionState::Authenticating | ConnectionState::Connected
            ) {
                log::debug!("[Hub] Ignoring frame while {}", inner.state);
                return FrameOutcome::Continue;
            }

            let message = match ServerMessage::parse(text) {
                Ok(message) => message,
                Err(e) => {
                    log::warn!("[Hub] Ignoring malformed frame: {}", e);
                    return FrameOutcome::Continue;
                }
            };

            let outcome = self.apply(&mut inner, generation, message, &mut events);
            (outcome, !inner.outbox.is_empty())
        };

        if has_output {
            self.outbox_ready.notify_one();
        }
        self.publish_all(events);
        outcome
    }

    fn apply(
        &self,
        inner: &mut ClientInner,
        generation: Generation,
        message: ServerMessage,
        events: &mut Vec<BusEvent>,
    ) -> FrameOutcome {
        match message {
            ServerMessage::AuthRequired { .. } => {
                if inner.state != ConnectionState::Authenticating {
                    log::debug!("[Hub] Unexpected auth_required while {}", inner.state);
                    return FrameOutcome::Continue;
                }
                log::debug!("[Hub] Sending credentials");
                inner.queue_frame(&ClientMessage::Auth {
                    access_token: self.config.token.clone(),
                });
            }
            ServerMessage::AuthOk { ha_version } => {
                if inner.state != ConnectionState::Authenticating {
                    log::debug!("[Hub] Unexpected auth_ok while {}", inner.state);
                    return FrameOutcome::Continue;
                }
                log::info!(
                    "[Hub] Authenticated (hub version {})",
                    ha_version.as_deref().unwrap_or("unknown")
                );
                inner.auth_backoff.reset();
                inner.set_state(ConnectionState::Connected, events);
                events.push(BusEvent::Connected);

                inner.queue_request(RequestKind::SubscribeEvents {
                    event_type: STATE_CHANGED_EVENT.to_string(),
                });
                inner.queue_request(RequestKind::SubscribeEvents {
                    event_type: self.config.command_event_type.clone(),
                });
                inner.queue_request(RequestKind::GetStates);
                for entity_id in &self.config.list_entities {
                    inner.queue_request(RequestKind::ListItems {
                        entity_id: entity_id.clone(),
                    });
                }
            }
            ServerMessage::AuthInvalid { message } => {
                let message = message.unwrap_or_else(|| "authentication rejected".to_string());
                log::error!("[Hub] Authentication rejected: {}", message);
                inner.outbox.clear();
                inner.set_state(ConnectionState::AuthRejected, events);
                events.push(BusEvent::AuthFailed { message });
                return FrameOutcome::Close;
            }
            ServerMessage::Result {
                id,
                success,
                result,
                error,
            } => {
                let Some(request) = inner.pending.take(id, generation) else {
                    log::debug!("[Hub] Ignoring result for unknown request id {}", id);
                    return FrameOutcome::Continue;
                };
                if !success {
                    log::warn!(
                        "[Hub] Request {} ({:?}) failed: {}",
                        id,
                        request.kind,
                        error.map_or_else(|| "unknown error".to_string(), |e| e.to_string())
                    );
                    return FrameOutcome::Continue;
                }
                match request.kind {
                    RequestKind::SubscribeEvents { event_type } => {
                        log::info!("[Hub] Subscribed to {}", event_type);
                    }
                    RequestKind::GetStates => {
                        let entities = match result {
                            Some(Value::Array(entities)) => entities,
                            other => {
                                log::warn!("[Hub] Snapshot result is not an array: {:?}", other);
                                Vec::new()
                            }
                        };
                        log::info!("[Hub] Received snapshot of {} entities", entities.len());
                        events.push(BusEvent::StatesLoaded { entities });
                    }
                    RequestKind::ListItems { entity_id } => {
                        let items = extract_list_items(result);
                        log::debug!("[Hub] {} list item(s) for {}", items.len(), entity_id);
                        events.push(BusEvent::ListItemsLoaded { entity_id, items });
                    }
                }
            }
            ServerMessage::Event { event, .. } => {
                events.push(BusEvent::HubEvent {
                    event_type: event.event_type,
                    data: event.data,
                });
            }
            ServerMessage::Unknown => {
                log::debug!("[Hub] Ignoring unsupported frame type");
            }
        }
        FrameOutcome::Continue
    }

    /// The transport for `generation` closed.
    ///
    /// The first close of the current attempt publishes one `Disconnected` and
    /// returns the reconnect delay. Duplicate or stale closes return `None`.
    pub fn transport_closed(&self, generation: Generation, reason: &str) -> Option<Duration> {
        let mut events = Vec::new();
        let delay = {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                log::debug!("[Hub] Ignoring close of superseded attempt {}", generation);
                return None;
            }
            if inner.closed_generation == generation {
                log::debug!("[Hub] Ignoring duplicate close of attempt {}", generation);
                return None;
            }
            inner.closed_generation = generation;
            inner.pending.clear();
            inner.outbox.clear();

            let delay = if inner.state == ConnectionState::AuthRejected {
                inner.auth_backoff.next_delay()
            } else {
                inner.set_state(ConnectionState::Disconnected, &mut events);
                self.config.reconnect_interval()
            };
            events.push(BusEvent::Disconnected {
                reason: reason.to_string(),
            });
            log::warn!(
                "[Hub] Disconnected ({}); reconnecting in {:?}",
                reason,
                delay
            );
            delay
        };

        self.publish_all(events);
        Some(delay)
    }

    /// Takes all frames waiting to be sent.
    pub fn drain_outbox(&self) -> Vec<String> {
        std::mem::take(&mut self.inner.lock().outbox)
    }

    /// Resolves when frames were queued outside of [`Self::handle_frame`].
    pub fn outbox_notified(&self) -> Notified<'_> {
        self.outbox_ready.notified()
    }

    fn publish_all(&self, events: Vec<BusEvent>) {
        for event in events {
            self.bus.publish(event);
        }
    }
}

impl ListItemsRequester for RealtimeClient {
    fn request_list_items(&self, entity_id: &str) -> Option<u64> {
        let id = {
            let mut inner = self.inner.lock();
            if inner.state != ConnectionState::Connected {
                log::debug!(
                    "[Hub] Not requesting items for {} while {}",
                    entity_id,
                    inner.state
                );
                return None;
            }
            inner.queue_request(RequestKind::ListItems {
                entity_id: entity_id.to_string(),
            })
        };
        self.outbox_ready.notify_one();
        Some(id)
    }
}

/// Pulls the item array out of a list-items result.
///
/// Accepts either `{"items": [...]}` or a bare array.
fn extract_list_items(result: Option<Value>) -> Vec<Value> {
    match result {
        Some(Value::Array(items)) => items,
        Some(Value::Object(mut obj)) => match obj.remove(LIST_ITEMS_ATTRIBUTE) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}
