use dashmap::DashMap;
use events::ConnectionId;
use log::*;
use std::sync::atomic::{AtomicU64, Ordering};

/// A registered display name plus its position in enumeration order.
#[derive(Debug, Clone)]
struct Entry {
    seq: u64,
    name: String,
}

/// Authoritative mapping of live connections to display names.
///
/// Keys are unique by construction. Names are not: several connections may
/// register the same name, and reverse lookups resolve to the earliest one.
/// Enumeration follows first-insertion order; renaming a connection keeps its
/// slot.
///
/// The registry lives only in memory. A restarted process starts empty.
pub struct Registry {
    entries: DashMap<ConnectionId, Entry>,
    next_seq: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Insert or overwrite the name for a connection. Always succeeds.
    pub fn set(&self, connection_id: &ConnectionId, name: impl Into<String>) {
        let name = name.into();
        self.entries
            .entry(connection_id.clone())
            .and_modify(|entry| entry.name = name.clone())
            .or_insert_with(|| Entry {
                seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
                name: name.clone(),
            });
        trace!("Registry set {} -> {}", connection_id, name);
    }

    /// Remove a connection, returning the name it had. No-op if absent.
    pub fn remove(&self, connection_id: &ConnectionId) -> Option<String> {
        self.entries
            .remove(connection_id)
            .map(|(_, entry)| entry.name)
    }

    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.entries.contains_key(connection_id)
    }

    pub fn name_of(&self, connection_id: &ConnectionId) -> Option<String> {
        self.entries
            .get(connection_id)
            .map(|entry| entry.name.clone())
    }

    /// First connection (in enumeration order) registered under `name`.
    pub fn find_connection_by_name(&self, name: &str) -> Option<ConnectionId> {
        self.entries
            .iter()
            .filter(|entry| entry.value().name == name)
            .min_by_key(|entry| entry.value().seq)
            .map(|entry| entry.key().clone())
    }

    /// Snapshot of every registered connection.
    pub fn all_connections(&self) -> Vec<ConnectionId> {
        self.ordered_snapshot()
            .into_iter()
            .map(|(connection_id, _)| connection_id)
            .collect()
    }

    /// Snapshot of every registered name, duplicates included.
    pub fn all_names(&self) -> Vec<String> {
        self.ordered_snapshot()
            .into_iter()
            .map(|(_, name)| name)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn ordered_snapshot(&self) -> Vec<(ConnectionId, String)> {
        let mut snapshot: Vec<(u64, ConnectionId, String)> = self
            .entries
            .iter()
            .map(|entry| {
                (
                    entry.value().seq,
                    entry.key().clone(),
                    entry.value().name.clone(),
                )
            })
            .collect();
        snapshot.sort_by_key(|(seq, _, _)| *seq);
        snapshot
            .into_iter()
            .map(|(_, connection_id, name)| (connection_id, name))
            .collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
