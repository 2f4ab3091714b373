//! Snapshot-based change tracker.
//!
//! # Responsibility
//! - Keep one entry per tracked entity: current value plus the last
//!   committed snapshot and its row version.
//! - Derive entry states by diffing current against snapshot.
//!
//! # Invariants
//! - At most one entry per persisted id (identity map).
//! - Added entries have no snapshot and keep insertion order.

use crate::model::{Entity, EntityId, UNSET_ID};
use crate::repo::{RowVersion, Versioned};
use std::collections::{BTreeMap, HashMap};

/// Tracking state of one entity inside a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Not known to the context.
    Detached,
    /// Staged for insertion.
    Added,
    /// Loaded and equal to its snapshot.
    Unchanged,
    /// Loaded and different from its snapshot.
    Modified,
    /// Staged for deletion.
    Deleted,
}

/// Context-local key of one tracked entry. Stable for the entry lifetime.
pub(crate) type EntryKey = u64;

pub(crate) struct Entry<T> {
    pub(crate) current: T,
    pub(crate) snapshot: Option<Versioned<T>>,
    pub(crate) deleted: bool,
    /// Entry key of a not yet committed owner (members added via a roster).
    pub(crate) owner: Option<EntryKey>,
}

impl<T: Entity> Entry<T> {
    pub(crate) fn state(&self) -> EntryState {
        match &self.snapshot {
            None => EntryState::Added,
            Some(_) if self.deleted => EntryState::Deleted,
            Some(snapshot) if !snapshot.entity.same_row(&self.current) => EntryState::Modified,
            Some(_) => EntryState::Unchanged,
        }
    }

    pub(crate) fn version(&self) -> Option<RowVersion> {
        self.snapshot.as_ref().map(|snapshot| snapshot.version)
    }
}

/// Identity map plus staged changes for one entity kind.
pub struct ChangeTracker<T> {
    entries: BTreeMap<EntryKey, Entry<T>>,
    by_id: HashMap<EntityId, EntryKey>,
    next_key: EntryKey,
}

impl<T> Default for ChangeTracker<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            by_id: HashMap::new(),
            next_key: 1,
        }
    }
}

impl<T: Entity> ChangeTracker<T> {
    /// Number of tracked entries, deleted and added ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn track_added(&mut self, value: T, owner: Option<EntryKey>) -> EntryKey {
        let key = self.allocate_key();
        self.entries.insert(
            key,
            Entry {
                current: value,
                snapshot: None,
                deleted: false,
                owner,
            },
        );
        key
    }

    /// Starts tracking a stored row unless its id is tracked already.
    ///
    /// An already tracked entry wins over the stored row, so local edits stay
    /// visible to later queries.
    pub(crate) fn attach(&mut self, row: Versioned<T>) -> EntryKey {
        let id = row.entity.id();
        if let Some(key) = self.by_id.get(&id) {
            return *key;
        }

        let key = self.allocate_key();
        self.entries.insert(
            key,
            Entry {
                current: row.entity.clone(),
                snapshot: Some(row),
                deleted: false,
                owner: None,
            },
        );
        self.by_id.insert(id, key);
        key
    }

    pub(crate) fn key_of(&self, id: EntityId) -> Option<EntryKey> {
        if id == UNSET_ID {
            return None;
        }
        self.by_id.get(&id).copied()
    }

    pub(crate) fn entry(&self, key: EntryKey) -> Option<&Entry<T>> {
        self.entries.get(&key)
    }

    pub(crate) fn entry_mut(&mut self, key: EntryKey) -> Option<&mut Entry<T>> {
        self.entries.get_mut(&key)
    }

    pub(crate) fn state_of(&self, key: EntryKey) -> EntryState {
        self.entries
            .get(&key)
            .map_or(EntryState::Detached, Entry::state)
    }

    /// First added entry whose current value satisfies `matches`.
    pub(crate) fn find_added(&self, matches: impl Fn(&T) -> bool) -> Option<EntryKey> {
        self.entries
            .iter()
            .find(|(_, entry)| entry.snapshot.is_none() && matches(&entry.current))
            .map(|(key, _)| *key)
    }

    /// Keys in tracking order, filtered by state.
    pub(crate) fn keys_in_state(&self, state: EntryState) -> Vec<EntryKey> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.state() == state)
            .map(|(key, _)| *key)
            .collect()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (EntryKey, &Entry<T>)> {
        self.entries.iter().map(|(key, entry)| (*key, entry))
    }

    pub(crate) fn has_changes(&self) -> bool {
        self.entries
            .values()
            .any(|entry| entry.state() != EntryState::Unchanged)
    }

    /// Records a successful insert of an entry whose value already carries
    /// its new id.
    pub(crate) fn mark_inserted(&mut self, key: EntryKey, version: RowVersion) {
        if let Some(entry) = self.entries.get_mut(&key) {
            let id = entry.current.id();
            entry.snapshot = Some(Versioned {
                entity: entry.current.clone(),
                version,
            });
            entry.owner = None;
            self.by_id.insert(id, key);
        }
    }

    pub(crate) fn mark_updated(&mut self, key: EntryKey, version: RowVersion) {
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.snapshot = Some(Versioned {
                entity: entry.current.clone(),
                version,
            });
        }
    }

    pub(crate) fn detach(&mut self, key: EntryKey) -> Option<Entry<T>> {
        let entry = self.entries.remove(&key)?;
        let id = entry.current.id();
        if self.by_id.get(&id) == Some(&key) {
            self.by_id.remove(&id);
        }
        Some(entry)
    }

    /// Drops staged changes: added entries go away, edits and deletions are
    /// reverted to their snapshots.
    pub(crate) fn reject_changes(&mut self) {
        self.entries.retain(|_, entry| entry.snapshot.is_some());
        for entry in self.entries.values_mut() {
            if let Some(snapshot) = &entry.snapshot {
                entry.current = snapshot.entity.clone();
            }
            entry.deleted = false;
        }
    }

    fn allocate_key(&mut self) -> EntryKey {
        let key = self.next_key;
        self.next_key += 1;
        key
    }
}
