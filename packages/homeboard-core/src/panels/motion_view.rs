//! Switches to the camera view while motion is detected.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use super::{Panel, PanelContext, PanelSubscriptions, TimerSlot};
use crate::config::{is_trigger_state, MotionViewConfig};
use crate::events::{channels, BusEvent};

pub const PANEL_NAME: &str = "motion_view";

/// Watches trigger entities and schedules a single return view.
pub struct MotionViewController {
    ctx: PanelContext,
    config: MotionViewConfig,
    return_timer: TimerSlot,
    subs: PanelSubscriptions,
}

impl MotionViewController {
    pub fn start(ctx: PanelContext, config: MotionViewConfig) -> Arc<Self> {
        let controller = Arc::new(Self {
            return_timer: TimerSlot::new(ctx.spawner.clone()),
            ctx,
            config,
            subs: PanelSubscriptions::default(),
        });

        if !controller.config.enabled || controller.config.trigger_entities.is_empty() {
            log::debug!("[Panels] Motion view disabled");
            return controller;
        }

        let weak = Arc::downgrade(&controller);
        controller.subs.push(controller.ctx.bus.subscribe(
            channels::ENTITY_UPDATED,
            move |event| {
                let (Some(controller), BusEvent::EntityUpdated { entity_id }) =
                    (weak.upgrade(), event)
                else {
                    return;
                };
                if controller.config.trigger_entities.contains(entity_id) {
                    controller.check(entity_id);
                }
            },
        ));

        controller
    }

    fn check(self: &Arc<Self>, entity_id: &str) {
        let state = self.ctx.store.get(entity_id).and_then(|r| r.state);
        if is_trigger_state(&self.config.trigger_states, state.as_deref()) {
            log::info!("[Panels] Motion on {}, showing '{}'", entity_id, self.config.view);
            self.trigger();
        }
    }

    /// Shows the target view and restarts the return countdown.
    pub fn trigger(self: &Arc<Self>) {
        if let Err(e) = self.ctx.views.switch_view(&self.config.view) {
            log::warn!("[Panels] Motion view switch failed: {}", e);
            return;
        }

        let views = Arc::clone(&self.ctx.views);
        let return_view = self.config.return_view.clone();
        self.return_timer
            .schedule(Duration::from_millis(self.config.duration_ms), move || {
                if let Err(e) = views.switch_view(&return_view) {
                    log::warn!("[Panels] Motion return to '{}' failed: {}", return_view, e);
                }
            });
        self.ctx.publish_update(PANEL_NAME, self.snapshot());
    }

    pub fn is_active(&self) -> bool {
        self.return_timer.is_pending()
    }
}

impl Panel for MotionViewController {
    fn name(&self) -> &str {
        PANEL_NAME
    }

    fn snapshot(&self) -> Value {
        json!({
            "enabled": self.config.enabled,
            "active": self.is_active(),
            "view": self.config.view,
            "returnView": self.config.return_view,
        })
    }

    fn shutdown(&self) {
        self.subs.clear();
        self.return_timer.cancel();
    }
}
