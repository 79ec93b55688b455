//! Dashboard command dispatch.
//!
//! Commands arrive as hub events of the configured command type with the
//! command name in `data.command`. Handlers are registered by name, so new
//! commands never touch the hub client.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use super::ViewManager;

/// Handler invoked with the full event `data` object.
pub type CommandHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Result of dispatching one command event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Handled,
    /// No handler is registered under this name.
    Unknown(String),
    /// The event had no usable `command` field.
    Malformed,
}

/// Name → handler table.
#[derive(Default)]
pub struct CommandRegistry {
    handlers: RwLock<HashMap<String, CommandHandler>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `name`, replacing any previous handler.
    pub fn register<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let name = name.into();
        if self
            .handlers
            .write()
            .insert(name.clone(), Arc::new(handler))
            .is_some()
        {
            log::warn!("[Router] Replaced handler for command '{}'", name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.read().contains_key(name)
    }

    /// Registered command names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Runs the handler named by `data.command`.
    ///
    /// The handler is invoked after the table lock is released, so handlers may
    /// register further commands.
    pub fn dispatch(&self, data: &Value) -> CommandOutcome {
        let Some(name) = data
            .get("command")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
        else {
            log::warn!("[Router] Ignoring command event without a name: {}", data);
            return CommandOutcome::Malformed;
        };

        let handler = self.handlers.read().get(name).cloned();
        match handler {
            Some(handler) => {
                log::debug!("[Router] Dispatching command '{}'", name);
                handler(data);
                CommandOutcome::Handled
            }
            None => {
                log::warn!("[Router] Unknown command '{}'", name);
                CommandOutcome::Unknown(name.to_string())
            }
        }
    }

    /// Registers `switch_view`, which switches to `data.view`.
    pub fn register_switch_view(&self, views: Arc<ViewManager>) {
        self.register("switch_view", move |data| {
            let Some(view) = data.get("view").and_then(Value::as_str) else {
                log::warn!("[Router] switch_view command without a view");
                return;
            };
            if let Err(e) = views.switch_view(view) {
                log::warn!("[Router] switch_view command failed: {}", e);
            }
        });
    }
}
