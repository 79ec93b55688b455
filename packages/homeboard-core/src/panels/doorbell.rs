//! Doorbell overlay.
//!
//! Opens when the trigger sensor fires or a `doorbell_overlay` command
//! arrives, and closes on command, on dismissal from the browser, or after the
//! auto-close delay.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use super::{Panel, PanelContext, PanelSubscriptions, TimerSlot};
use crate::config::{is_trigger_state, DoorbellConfig};
use crate::events::{channels, BusEvent};
use crate::protocol_constants::CAMERA_PROXY_STREAM_PATH;
use crate::services::CommandRegistry;
use crate::state::EntityRecord;
use crate::utils::{now_millis, resolve_hub_url};

pub const PANEL_NAME: &str = "doorbell";

/// Command name handled by the overlay.
pub const DOORBELL_COMMAND: &str = "doorbell_overlay";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct OverlayState {
    visible: bool,
    status: Option<String>,
    media_url: Option<String>,
    shown_at: Option<u64>,
}

/// Picks the overlay stream URL.
///
/// Priority: configured stream URL, configured stream path, the camera's
/// `entity_picture`, then the hub's camera proxy stream. The result is resolved
/// against the hub URL.
pub fn resolve_stream_url(
    config: &DoorbellConfig,
    camera: Option<&EntityRecord>,
    hub_url: &str,
) -> Option<String> {
    let non_empty = |s: &Option<String>| s.clone().filter(|s| !s.trim().is_empty());

    let raw = non_empty(&config.stream_url)
        .or_else(|| non_empty(&config.stream_path))
        .or_else(|| {
            camera
                .and_then(|c| c.attr_str("entity_picture"))
                .filter(|p| !p.is_empty())
                .map(str::to_string)
        })
        .or_else(|| {
            (!config.camera_entity.is_empty())
                .then(|| format!("{}{}", CAMERA_PROXY_STREAM_PATH, config.camera_entity))
        })?;

    Some(resolve_hub_url(hub_url, &raw))
}

pub struct DoorbellPanel {
    ctx: PanelContext,
    config: DoorbellConfig,
    state: Mutex<OverlayState>,
    auto_close: TimerSlot,
    subs: PanelSubscriptions,
}

impl DoorbellPanel {
    /// Creates the overlay and, when enabled, registers its command.
    pub fn start(ctx: PanelContext, config: DoorbellConfig, commands: &CommandRegistry) -> Arc<Self> {
        let panel = Arc::new(Self {
            auto_close: TimerSlot::new(ctx.spawner.clone()),
            ctx,
            config,
            state: Mutex::new(OverlayState::default()),
            subs: PanelSubscriptions::default(),
        });

        if !panel.config.enabled {
            log::debug!("[Panels] Doorbell overlay disabled");
            return panel;
        }

        let weak = Arc::downgrade(&panel);
        panel.subs.push(
            panel
                .ctx
                .bus
                .subscribe(channels::ENTITY_UPDATED, move |event| {
                    if let (Some(panel), BusEvent::EntityUpdated { entity_id }) =
                        (weak.upgrade(), event)
                    {
                        panel.on_entity(entity_id);
                    }
                }),
        );

        let weak = Arc::downgrade(&panel);
        commands.register(DOORBELL_COMMAND, move |data| {
            if let Some(panel) = weak.upgrade() {
                panel.on_command(data);
            }
        });

        panel
    }

    fn on_entity(self: &Arc<Self>, entity_id: &str) {
        if entity_id == self.config.trigger_entity {
            let state = self.ctx.store.get(entity_id).and_then(|r| r.state);
            if is_trigger_state(&self.config.trigger_states, state.as_deref()) {
                log::info!("[Panels] Doorbell triggered by {}", entity_id);
                self.show(&self.config.active_label, None);
            }
        } else if entity_id == self.config.camera_entity && self.is_visible() {
            self.refresh_media();
        }
    }

    fn on_command(self: &Arc<Self>, data: &Value) {
        let action = data.get("action").and_then(Value::as_str).unwrap_or("show");
        if action.eq_ignore_ascii_case("hide") {
            self.hide();
            return;
        }
        let status = data
            .get("status")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(self.config.active_label.as_str());
        let stream_url = data
            .get("streamUrl")
            .or_else(|| data.get("stream_url"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty());
        self.show(status, stream_url);
    }

    fn default_media(&self) -> Option<String> {
        let camera = self.ctx.store.get(&self.config.camera_entity);
        resolve_stream_url(&self.config, camera.as_ref(), &self.ctx.hub_url)
    }

    /// Opens the overlay and restarts the auto-close countdown.
    pub fn show(self: &Arc<Self>, status: &str, stream_url: Option<&str>) {
        let media_url = match stream_url {
            Some(url) => Some(resolve_hub_url(&self.ctx.hub_url, url)),
            None => self.default_media(),
        };
        {
            let mut state = self.state.lock();
            state.visible = true;
            state.status = Some(status.to_string());
            state.media_url = media_url;
            state.shown_at = Some(now_millis());
        }

        if self.config.auto_close_ms > 0 {
            let weak: Weak<Self> = Arc::downgrade(self);
            self.auto_close
                .schedule(Duration::from_millis(self.config.auto_close_ms), move || {
                    if let Some(panel) = weak.upgrade() {
                        log::debug!("[Panels] Doorbell overlay auto-closing");
                        panel.hide();
                    }
                });
        }
        self.publish();
    }

    /// Closes the overlay. Returns false if it was already hidden.
    pub fn hide(&self) -> bool {
        self.auto_close.cancel();
        {
            let mut state = self.state.lock();
            if !state.visible {
                return false;
            }
            *state = OverlayState::default();
        }
        self.publish();
        true
    }

    pub fn is_visible(&self) -> bool {
        self.state.lock().visible
    }

    fn refresh_media(&self) {
        let media_url = self.default_media();
        {
            let mut state = self.state.lock();
            if !state.visible || state.media_url == media_url {
                return;
            }
            state.media_url = media_url;
        }
        self.publish();
    }

    fn publish(&self) {
        self.ctx.publish_update(PANEL_NAME, self.snapshot());
    }
}

impl Panel for DoorbellPanel {
    fn name(&self) -> &str {
        PANEL_NAME
    }

    fn snapshot(&self) -> Value {
        serde_json::to_value(&*self.state.lock()).unwrap_or(Value::Null)
    }

    fn shutdown(&self) {
        self.subs.clear();
        self.auto_close.cancel();
    }
}
