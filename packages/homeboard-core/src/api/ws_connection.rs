//! Browser WebSocket session tracking.
//!
//! - `WsConnectionManager`: registry of open sessions with a force-close switch
//! - `ConnectionGuard`: RAII handle that unregisters its session on drop

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::utils::now_millis;

/// Metadata kept per open session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    /// Unix timestamp in milliseconds.
    pub connected_at: u64,
}

/// Tracks open browser sessions.
///
/// Each session gets a child of the manager's token, so [`close_all`] ends every
/// session at once without touching ones opened afterwards.
///
/// [`close_all`]: WsConnectionManager::close_all
pub struct WsConnectionManager {
    sessions: DashMap<String, SessionInfo>,
    next_id: AtomicU64,
    /// Replaced after every `close_all`.
    root_token: RwLock<CancellationToken>,
}

impl WsConnectionManager {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
            root_token: RwLock::new(CancellationToken::new()),
        }
    }

    /// Registers a session. The guard unregisters it when dropped.
    pub fn register(self: &Arc<Self>) -> ConnectionGuard {
        let id = format!("ws-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let cancel_token = self.root_token.read().child_token();

        self.sessions.insert(
            id.clone(),
            SessionInfo {
                id: id.clone(),
                connected_at: now_millis(),
            },
        );
        log::info!(
            "[WS] Session opened: {} (total: {})",
            id,
            self.sessions.len()
        );

        ConnectionGuard {
            id,
            manager: Arc::clone(self),
            cancel_token,
        }
    }

    fn unregister(&self, id: &str) {
        if self.sessions.remove(id).is_some() {
            log::info!(
                "[WS] Session closed: {} (remaining: {})",
                id,
                self.sessions.len()
            );
        }
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.sessions.len()
    }

    /// Open sessions, oldest first.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> =
            self.sessions.iter().map(|s| s.value().clone()).collect();
        sessions.sort_by_key(|s| s.connected_at);
        sessions
    }

    /// Signals every open session to close.
    ///
    /// Returns how many sessions were signalled. New sessions can register
    /// afterwards.
    pub fn close_all(&self) -> usize {
        let count = self.sessions.len();
        let mut root = self.root_token.write();
        root.cancel();
        *root = CancellationToken::new();
        if count > 0 {
            log::info!("[WS] Force-closing {} session(s)", count);
        }
        count
    }
}

impl Default for WsConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps a session registered for as long as it lives.
pub struct ConnectionGuard {
    id: String,
    manager: Arc<WsConnectionManager>,
    cancel_token: CancellationToken,
}

impl ConnectionGuard {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Cancelled when the manager force-closes sessions.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.manager.unregister(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guards_unregister_on_drop() {
        let manager = Arc::new(WsConnectionManager::new());
        let first = manager.register();
        let second = manager.register();
        assert_ne!(first.id(), second.id());
        assert_eq!(manager.connection_count(), 2);

        drop(first);
        assert_eq!(manager.connection_count(), 1);
        assert_eq!(manager.sessions()[0].id, second.id());
    }

    #[test]
    fn close_all_spares_later_sessions() {
        let manager = Arc::new(WsConnectionManager::new());
        let old = manager.register();

        assert_eq!(manager.close_all(), 1);
        assert!(old.cancel_token().is_cancelled());

        let fresh = manager.register();
        assert!(!fresh.cancel_token().is_cancelled());
    }
}
