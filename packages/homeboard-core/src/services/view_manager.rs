//! Active view tracking.

use parking_lot::RwLock;

use crate::config::ViewsConfig;
use crate::error::{HomeboardError, HomeboardResult};
use crate::events::{BusEvent, EventBus};

/// Owns the single active view and announces changes on the bus.
pub struct ViewManager {
    views: ViewsConfig,
    current: RwLock<String>,
    bus: EventBus,
}

impl ViewManager {
    /// Creates a manager showing the configured default view.
    pub fn new(views: ViewsConfig, bus: EventBus) -> Self {
        let current = RwLock::new(views.default_view.clone());
        Self {
            views,
            current,
            bus,
        }
    }

    /// Switches to `view`.
    ///
    /// Returns `Ok(false)` without publishing if `view` is already active, and
    /// an error if it is not a configured view. Otherwise publishes exactly one
    /// `ViewChanged`.
    pub fn switch_view(&self, view: &str) -> HomeboardResult<bool> {
        if !self.views.contains(view) {
            log::warn!("[View] Rejecting switch to unknown view '{}'", view);
            return Err(HomeboardError::UnknownView(view.to_string()));
        }

        {
            let mut current = self.current.write();
            if *current == view {
                log::debug!("[View] Already showing '{}'", view);
                return Ok(false);
            }
            log::info!("[View] Switching {} -> {}", *current, view);
            *current = view.to_string();
        }

        self.bus.publish(BusEvent::ViewChanged {
            view: view.to_string(),
        });
        Ok(true)
    }

    #[must_use]
    pub fn current_view(&self) -> String {
        self.current.read().clone()
    }

    /// Returns true if `view` is the active view.
    pub fn is_active(&self, view: &str) -> bool {
        *self.current.read() == view
    }

    pub fn views(&self) -> &[String] {
        &self.views.available
    }

    /// View that hosts the camera tiles.
    pub fn camera_view(&self) -> &str {
        &self.views.camera_view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::channels;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn manager() -> (ViewManager, Arc<AtomicUsize>, crate::events::Subscription) {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let sub = bus.subscribe(channels::VIEW_CHANGED, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (ViewManager::new(ViewsConfig::default(), bus), count, sub)
    }

    #[test]
    fn starts_on_default_view() {
        let (views, _, _sub) = manager();
        assert_eq!(views.current_view(), "home");
        assert!(views.is_active("home"));
    }

    #[test]
    fn switching_to_current_view_is_silent() {
        let (views, count, _sub) = manager();
        assert!(!views.switch_view("home").unwrap());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn switching_publishes_once() {
        let (views, count, _sub) = manager();
        assert!(views.switch_view("cameras").unwrap());
        assert_eq!(views.current_view(), "cameras");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unknown_views_are_rejected() {
        let (views, count, _sub) = manager();
        let err = views.switch_view("garage").unwrap_err();
        assert_eq!(err.code(), "unknown_view");
        assert_eq!(views.current_view(), "home");
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn handlers_see_the_new_view() {
        let bus = EventBus::new();
        let views = Arc::new(ViewManager::new(ViewsConfig::default(), bus.clone()));
        let seen = Arc::new(parking_lot::Mutex::new(String::new()));
        let (views_clone, seen_clone) = (Arc::clone(&views), Arc::clone(&seen));
        let _sub = bus.subscribe(channels::VIEW_CHANGED, move |_| {
            *seen_clone.lock() = views_clone.current_view();
        });

        views.switch_view("cameras").unwrap();
        assert_eq!(*seen.lock(), "cameras");
    }
}
