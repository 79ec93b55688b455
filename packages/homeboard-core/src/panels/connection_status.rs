//! Hub connection status badge.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use super::{Panel, PanelContext, PanelSubscriptions};
use crate::events::{channels, BusEvent};
use crate::hub::ConnectionState;

pub const PANEL_NAME: &str = "connection_status";

/// Badge status shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusBadge {
    Connecting,
    Connected,
    Disconnected,
    AuthFailed,
    Disabled,
}

impl StatusBadge {
    fn label(self) -> &'static str {
        match self {
            Self::Connecting => "Hub: connecting",
            Self::Connected => "Hub: connected",
            Self::Disconnected => "Hub: disconnected",
            Self::AuthFailed => "Hub: authentication failed",
            Self::Disabled => "Hub: disabled",
        }
    }
}

#[derive(Debug)]
struct StatusState {
    connection: ConnectionState,
    /// Last rejection message; kept until the next successful auth.
    auth_error: Option<String>,
}

impl StatusState {
    fn badge(&self) -> StatusBadge {
        match self.connection {
            ConnectionState::Connected => StatusBadge::Connected,
            ConnectionState::Disabled => StatusBadge::Disabled,
            ConnectionState::AuthRejected => StatusBadge::AuthFailed,
            _ if self.auth_error.is_some() => StatusBadge::AuthFailed,
            ConnectionState::Disconnected => StatusBadge::Disconnected,
            ConnectionState::Idle
            | ConnectionState::Connecting
            | ConnectionState::Authenticating => StatusBadge::Connecting,
        }
    }

    fn model(&self) -> Value {
        let badge = self.badge();
        serde_json::json!({
            "status": badge,
            "label": badge.label(),
            "connectionState": self.connection,
            "message": self.auth_error,
        })
    }
}

/// Mirrors the hub connection lifecycle into a status badge.
pub struct ConnectionStatusPanel {
    ctx: PanelContext,
    state: Mutex<StatusState>,
    subs: PanelSubscriptions,
}

impl ConnectionStatusPanel {
    /// Creates the panel showing `initial` and starts listening.
    pub fn start(ctx: PanelContext, initial: ConnectionState) -> Arc<Self> {
        let panel = Arc::new(Self {
            ctx,
            state: Mutex::new(StatusState {
                connection: initial,
                auth_error: None,
            }),
            subs: PanelSubscriptions::default(),
        });

        let weak = Arc::downgrade(&panel);
        panel.subs.push(
            panel
                .ctx
                .bus
                .subscribe(channels::CONNECTION_STATE, move |event| {
                    if let (Some(panel), BusEvent::ConnectionStateChanged(state)) =
                        (weak.upgrade(), event)
                    {
                        panel.on_state(*state);
                    }
                }),
        );

        let weak = Arc::downgrade(&panel);
        panel
            .subs
            .push(panel.ctx.bus.subscribe(channels::AUTH_FAILED, move |event| {
                if let (Some(panel), BusEvent::AuthFailed { message }) = (weak.upgrade(), event) {
                    panel.on_auth_failed(message);
                }
            }));

        panel
    }

    pub fn badge(&self) -> StatusBadge {
        self.state.lock().badge()
    }

    fn on_state(&self, connection: ConnectionState) {
        let model = {
            let mut state = self.state.lock();
            if state.connection == connection {
                return;
            }
            state.connection = connection;
            if connection == ConnectionState::Connected {
                state.auth_error = None;
            }
            state.model()
        };
        self.ctx.publish_update(PANEL_NAME, model);
    }

    fn on_auth_failed(&self, message: &str) {
        let model = {
            let mut state = self.state.lock();
            state.auth_error = Some(message.to_string());
            state.model()
        };
        self.ctx.publish_update(PANEL_NAME, model);
    }
}

impl Panel for ConnectionStatusPanel {
    fn name(&self) -> &str {
        PANEL_NAME
    }

    fn snapshot(&self) -> Value {
        self.state.lock().model()
    }

    fn shutdown(&self) {
        self.subs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panels::test_support::{context, UpdateProbe};

    #[tokio::test]
    async fn follows_connection_state() {
        let ctx = context();
        let probe = UpdateProbe::attach(&ctx.bus, PANEL_NAME);
        let panel = ConnectionStatusPanel::start(ctx.clone(), ConnectionState::Idle);
        assert_eq!(panel.badge(), StatusBadge::Connecting);

        ctx.bus
            .publish(BusEvent::ConnectionStateChanged(ConnectionState::Connected));
        assert_eq!(panel.badge(), StatusBadge::Connected);
        assert_eq!(panel.snapshot()["label"], "Hub: connected");

        ctx.bus
            .publish(BusEvent::ConnectionStateChanged(ConnectionState::Disconnected));
        assert_eq!(panel.badge(), StatusBadge::Disconnected);
        assert_eq!(probe.count(), 2);
    }

    #[tokio::test]
    async fn auth_failure_sticks_until_connected() {
        let ctx = context();
        let panel = ConnectionStatusPanel::start(ctx.clone(), ConnectionState::Authenticating);

        ctx.bus.publish(BusEvent::AuthFailed {
            message: "Invalid access token".into(),
        });
        ctx.bus
            .publish(BusEvent::ConnectionStateChanged(ConnectionState::AuthRejected));
        ctx.bus
            .publish(BusEvent::ConnectionStateChanged(ConnectionState::Connecting));
        assert_eq!(panel.badge(), StatusBadge::AuthFailed);
        assert_eq!(panel.snapshot()["message"], "Invalid access token");

        ctx.bus
            .publish(BusEvent::ConnectionStateChanged(ConnectionState::Connected));
        assert_eq!(panel.badge(), StatusBadge::Connected);
        assert!(panel.snapshot()["message"].is_null());
    }

    #[tokio::test]
    async fn disabled_hub_and_shutdown() {
        let ctx = context();
        let panel = ConnectionStatusPanel::start(ctx.clone(), ConnectionState::Disabled);
        assert_eq!(panel.snapshot()["status"], "disabled");

        panel.shutdown();
        panel.shutdown();
        ctx.bus
            .publish(BusEvent::ConnectionStateChanged(ConnectionState::Connected));
        assert_eq!(panel.badge(), StatusBadge::Disabled);
    }
}
