//! Headless panel controllers.
//!
//! Each panel reads the entity store, filters bus notifications for the
//! entities it cares about and keeps a JSON render model for the browser. Every
//! secondary resource a panel owns (timers, stream retry loops, pollers) is
//! released by [`Panel::shutdown`], which must be idempotent.
//!
//! # Conventions
//!
//! - Bus handlers hold a `Weak` reference to their panel so a dropped panel
//!   stops reacting even if a subscription outlives it.
//! - A panel's own lock is released before it publishes `PanelUpdated`.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};

use crate::error::{HomeboardError, HomeboardResult};
use crate::events::{BusEvent, EventBus, Subscription};
use crate::runtime::TokioSpawner;
use crate::services::ViewManager;
use crate::state::EntityStore;

pub mod camera;
pub mod connection_status;
pub mod doorbell;
pub mod feed;
pub mod media;
pub mod motion_view;
pub mod timer;
pub mod todo;

pub use camera::{CameraPanel, TilePhase};
pub use connection_status::ConnectionStatusPanel;
pub use doorbell::DoorbellPanel;
pub use feed::{FeedError, FeedPanel, FeedSource, FeedStatus, HttpFeedSource};
pub use media::MediaPanel;
pub use motion_view::MotionViewController;
pub use timer::TimerSlot;
pub use todo::TodoPanel;

/// A dashboard panel controller.
pub trait Panel: Send + Sync {
    /// Stable name used in `PanelUpdated` events and the API.
    fn name(&self) -> &str;

    /// Current render model.
    fn snapshot(&self) -> Value;

    /// Releases every timer, task and subscription. Safe to call repeatedly.
    fn shutdown(&self);
}

/// Shared handles every panel is built from.
#[derive(Clone)]
pub struct PanelContext {
    pub bus: EventBus,
    pub store: Arc<EntityStore>,
    pub views: Arc<ViewManager>,
    pub spawner: TokioSpawner,
    /// Hub base URL, for resolving hub-relative media paths.
    pub hub_url: String,
}

impl PanelContext {
    /// Announces a new render model for `panel`.
    pub fn publish_update(&self, panel: &str, model: Value) {
        self.bus.publish(BusEvent::PanelUpdated {
            panel: panel.to_string(),
            model,
        });
    }
}

/// Subscriptions owned by a panel, dropped on shutdown.
#[derive(Default)]
pub(crate) struct PanelSubscriptions {
    subs: Mutex<Vec<Subscription>>,
}

impl PanelSubscriptions {
    pub(crate) fn push(&self, sub: Subscription) {
        self.subs.lock().push(sub);
    }

    /// Drops every subscription. Returns how many were held.
    pub(crate) fn clear(&self) -> usize {
        let subs = std::mem::take(&mut *self.subs.lock());
        subs.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.subs.lock().len()
    }
}

/// Stores `model` in `slot` and returns it if it differs from the previous one.
pub(crate) fn replace_model(slot: &Mutex<Value>, model: Value) -> Option<Value> {
    let mut current = slot.lock();
    if *current == model {
        return None;
    }
    *current = model.clone();
    Some(model)
}

/// Owns every panel of a dashboard instance.
#[derive(Default)]
pub struct PanelRegistry {
    panels: RwLock<Vec<Arc<dyn Panel>>>,
}

impl PanelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a panel. A panel with the same name is replaced and shut down.
    pub fn register(&self, panel: Arc<dyn Panel>) {
        let replaced = {
            let mut panels = self.panels.write();
            match panels.iter().position(|p| p.name() == panel.name()) {
                Some(index) => Some(std::mem::replace(&mut panels[index], panel)),
                None => {
                    panels.push(panel);
                    None
                }
            }
        };
        if let Some(old) = replaced {
            log::warn!("[Panels] Replacing panel '{}'", old.name());
            old.shutdown();
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Panel>> {
        self.panels.read().iter().find(|p| p.name() == name).cloned()
    }

    /// Render model of one panel.
    pub fn snapshot(&self, name: &str) -> HomeboardResult<Value> {
        self.get(name)
            .map(|p| p.snapshot())
            .ok_or_else(|| HomeboardError::PanelNotFound(name.to_string()))
    }

    /// Render models of all panels keyed by name.
    pub fn snapshots(&self) -> Value {
        let panels: Vec<Arc<dyn Panel>> = self.panels.read().clone();
        let map: Map<String, Value> = panels
            .iter()
            .map(|p| (p.name().to_string(), p.snapshot()))
            .collect();
        Value::Object(map)
    }

    pub fn names(&self) -> Vec<String> {
        self.panels
            .read()
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.panels.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.panels.read().is_empty()
    }

    /// Shuts every panel down. Panels stay registered.
    pub fn shutdown_all(&self) {
        let panels: Vec<Arc<dyn Panel>> = self.panels.read().clone();
        for panel in &panels {
            panel.shutdown();
        }
        log::info!("[Panels] Shut down {} panel(s)", panels.len());
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedPanel {
        name: &'static str,
        shutdowns: AtomicUsize,
    }

    impl Panel for FixedPanel {
        fn name(&self) -> &str {
            self.name
        }

        fn snapshot(&self) -> Value {
            json!({"panel": self.name})
        }

        fn shutdown(&self) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn fixed(name: &'static str) -> Arc<FixedPanel> {
        Arc::new(FixedPanel {
            name,
            shutdowns: AtomicUsize::new(0),
        })
    }

    #[test]
    fn snapshots_are_keyed_by_name() {
        let registry = PanelRegistry::new();
        registry.register(fixed("media"));
        registry.register(fixed("todo"));

        assert_eq!(registry.names(), vec!["media", "todo"]);
        assert_eq!(registry.snapshots()["todo"], json!({"panel": "todo"}));
        assert_eq!(registry.snapshot("media").unwrap(), json!({"panel": "media"}));
        assert_eq!(
            registry.snapshot("weather").unwrap_err().code(),
            "panel_not_found"
        );
    }

    #[test]
    fn replacing_a_panel_shuts_the_old_one_down() {
        let registry = PanelRegistry::new();
        let first = fixed("media");
        registry.register(Arc::clone(&first) as Arc<dyn Panel>);
        registry.register(fixed("media"));

        assert_eq!(registry.len(), 1);
        assert_eq!(first.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn shutdown_all_reaches_every_panel() {
        let registry = PanelRegistry::new();
        let (a, b) = (fixed("a"), fixed("b"));
        registry.register(Arc::clone(&a) as Arc<dyn Panel>);
        registry.register(Arc::clone(&b) as Arc<dyn Panel>);

        registry.shutdown_all();
        registry.shutdown_all();

        assert_eq!(a.shutdowns.load(Ordering::SeqCst), 2);
        assert_eq!(b.shutdowns.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn replace_model_reports_changes_only() {
        let slot = Mutex::new(Value::Null);
        assert!(replace_model(&slot, json!({"a": 1})).is_some());
        assert!(replace_model(&slot, json!({"a": 1})).is_none());
        assert!(replace_model(&slot, json!({"a": 2})).is_some());
    }
}
