//! Outstanding hub requests.
//!
//! Pure data structure: no I/O and no locking of its own. The table lives
//! inside the realtime client's state and is cleared whenever a new connection
//! attempt begins.

use std::collections::HashMap;

use super::Generation;

/// What a request asked for, so its `result` can be routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    SubscribeEvents { event_type: String },
    GetStates,
    ListItems { entity_id: String },
}

/// A request awaiting its `result` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub kind: RequestKind,
    /// Connection the request was sent on.
    pub generation: Generation,
}

/// Request id → pending request.
#[derive(Debug, Default)]
pub struct PendingRequests {
    entries: HashMap<u64, PendingRequest>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a sent request.
    pub fn insert(&mut self, id: u64, kind: RequestKind, generation: Generation) {
        if let Some(previous) = self.entries.insert(id, PendingRequest { kind, generation }) {
            log::warn!(
                "[Hub] Request id {} reused; dropping pending {:?}",
                id,
                previous.kind
            );
        }
    }

    /// Removes and returns the request for `id` if it belongs to `generation`.
    ///
    /// Entries from another generation are dropped and `None` is returned.
    pub fn take(&mut self, id: u64, generation: Generation) -> Option<PendingRequest> {
        let entry = self.entries.remove(&id)?;
        if entry.generation != generation {
            log::debug!(
                "[Hub] Dropping pending request {} from generation {} (current {})",
                id,
                entry.generation,
                generation
            );
            return None;
        }
        Some(entry)
    }

    /// Removes every entry. Returns how many were abandoned.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    #[must_use]
    pub fn contains(&self, id: u64) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_table_is_empty() {
        let table = PendingRequests::new();
        assert!(table.is_empty());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn take_removes_matching_entry() {
        let mut table = PendingRequests::new();
        table.insert(3, RequestKind::GetStates, 1);

        let entry = table.take(3, 1).unwrap();
        assert_eq!(entry.kind, RequestKind::GetStates);
        assert!(!table.contains(3));
        assert!(table.take(3, 1).is_none());
    }

    #[test]
    fn unknown_id_returns_none() {
        let mut table = PendingRequests::new();
        table.insert(1, RequestKind::GetStates, 1);
        assert!(table.take(99, 1).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn stale_generation_is_dropped() {
        let mut table = PendingRequests::new();
        table.insert(
            5,
            RequestKind::ListItems {
                entity_id: "todo.shopping_list".into(),
            },
            1,
        );

        assert!(table.take(5, 2).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn clear_reports_abandoned_count() {
        let mut table = PendingRequests::new();
        table.insert(1, RequestKind::GetStates, 1);
        table.insert(
            2,
            RequestKind::SubscribeEvents {
                event_type: "state_changed".into(),
            },
            1,
        );

        assert_eq!(table.clear(), 2);
        assert!(table.is_empty());
    }
}
