//! Unit-of-work persistence context.
//!
//! # Responsibility
//! - Track rosters and members loaded from, or staged for, one named store.
//! - Commit staged insertions, edits and deletions in one store transaction.
//! - Evaluate queries against committed rows merged with local changes.
//!
//! # Invariants
//! - Identities are assigned only by a successful commit and never change.
//! - A failed commit writes nothing and leaves tracked state untouched.
//! - Store reads and commits hold the store gate, so contexts sharing a
//!   store name never interleave inside SQLite.
//! - Removing a roster removes its members (tracked ones immediately, the
//!   rest in the store at commit time).
//! - Entity field values reach the logs only with sensitive data logging
//!   enabled in [`ContextOptions`].

mod entities;
mod error;
mod query;
mod tracker;

pub use error::{ContextError, ContextResult};
pub use query::Query;
pub use tracker::{ChangeTracker, EntryState};

use crate::db::{open_gated, StoreGate, StoreName};
use crate::model::member::Member;
use crate::model::roster::ClassRoster;
use crate::model::{Entity, EntityId, UNSET_ID};
use crate::repo::member_repo::{MemberRepository, SqliteMemberRepository};
use crate::repo::roster_repo::{RosterRepository, SqliteRosterRepository};
use crate::repo::{RepoResult, RowVersion, Versioned, INITIAL_VERSION};
use log::{debug, error, info};
use rusqlite::Connection;
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::time::Instant;
use tracker::EntryKey;

/// Options used to open a [`RosterContext`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextOptions {
    pub store: StoreName,
    /// Include entity field values in commit diagnostics.
    pub sensitive_data_logging: bool,
}

impl ContextOptions {
    pub fn new(store: StoreName) -> Self {
        Self {
            store,
            sensitive_data_logging: false,
        }
    }

    pub fn enable_sensitive_data_logging(mut self) -> Self {
        self.sensitive_data_logging = true;
        self
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Entity kinds a [`RosterContext`] can track and query.
///
/// Implemented for [`ClassRoster`] and [`Member`] only.
pub trait TrackedEntity: Entity + sealed::Sealed + Sized {
    #[doc(hidden)]
    fn tracker(ctx: &RosterContext) -> &ChangeTracker<Self>;
    #[doc(hidden)]
    fn tracker_mut(ctx: &mut RosterContext) -> &mut ChangeTracker<Self>;
    #[doc(hidden)]
    fn fetch_all(conn: &Connection) -> RepoResult<Vec<Versioned<Self>>>;
    #[doc(hidden)]
    fn fetch_one(conn: &Connection, id: EntityId) -> RepoResult<Option<Versioned<Self>>>;
    /// Stages a new entity (and anything it owns) for insertion.
    #[doc(hidden)]
    fn stage_new(ctx: &mut RosterContext, entity: Self) -> ContextResult<u64>;
    /// Stages a tracked entry for deletion, cascading to owned entities.
    #[doc(hidden)]
    fn stage_removal(ctx: &mut RosterContext, key: u64);
    #[doc(hidden)]
    fn check_update(snapshot: &Self, updated: &Self) -> ContextResult<()>;
    /// Brings a value into the shape kept by the tracker.
    #[doc(hidden)]
    fn normalize(_entity: &mut Self) {}
    /// Hides rows made unreachable by pending local changes.
    #[doc(hidden)]
    fn is_visible(_ctx: &RosterContext, _entity: &Self) -> bool {
        true
    }
    /// Loads owned collections for query results.
    #[doc(hidden)]
    fn load_owned(_ctx: &mut RosterContext, _items: &mut [(u64, Self)]) -> ContextResult<()> {
        Ok(())
    }
}

/// Handle to an entity staged through [`RosterContext::add`].
///
/// Stays valid after commit, so callers can read the assigned identity.
pub struct EntryHandle<T> {
    key: EntryKey,
    _kind: PhantomData<fn() -> T>,
}

impl<T> EntryHandle<T> {
    fn new(key: EntryKey) -> Self {
        Self {
            key,
            _kind: PhantomData,
        }
    }
}

impl<T> Clone for EntryHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for EntryHandle<T> {}

impl<T> PartialEq for EntryHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<T> Eq for EntryHandle<T> {}

impl<T> Debug for EntryHandle<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryHandle").field("key", &self.key).finish()
    }
}

/// Mutable borrow of a tracked value, see [`RosterContext::entity_mut`].
///
/// Restores the tracked shape of the value on drop.
pub struct EntityMut<'a, T: TrackedEntity> {
    value: &'a mut T,
}

impl<T: TrackedEntity> Deref for EntityMut<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value
    }
}

impl<T: TrackedEntity> DerefMut for EntityMut<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value
    }
}

impl<T: TrackedEntity> Drop for EntityMut<'_, T> {
    fn drop(&mut self) {
        T::normalize(self.value);
    }
}

/// Scoped unit of work over one named store.
///
/// Dropping the context closes its connection and discards pending changes;
/// the store keeps everything that was committed.
pub struct RosterContext {
    options: ContextOptions,
    conn: Connection,
    gate: StoreGate,
    rosters: ChangeTracker<ClassRoster>,
    members: ChangeTracker<Member>,
}

impl RosterContext {
    /// Opens a context, creating the named store on first use.
    pub fn open(options: ContextOptions) -> ContextResult<Self> {
        let (conn, gate) = open_gated(&options.store)?;
        debug!(
            "event=context_open module=context status=ok store={} sensitive_data_logging={}",
            options.store, options.sensitive_data_logging
        );
        Ok(Self {
            options,
            conn,
            gate,
            rosters: ChangeTracker::default(),
            members: ChangeTracker::default(),
        })
    }

    /// Opens a context with default options.
    pub fn open_named(store: &StoreName) -> ContextResult<Self> {
        Self::open(ContextOptions::new(store.clone()))
    }

    pub fn store(&self) -> &StoreName {
        &self.options.store
    }

    /// Query over all rosters of this store.
    pub fn rosters(&self) -> Query<ClassRoster> {
        Query::new()
    }

    /// Query over all members of this store.
    pub fn members(&self) -> Query<Member> {
        Query::new()
    }

    /// Stages a new entity for insertion at the next commit.
    ///
    /// Adding a roster stages its `members` as well.
    ///
    /// # Errors
    /// - `ContextError::InvalidOperation` when the entity (or an owned
    ///   member) already has an identity, or a standalone member has no
    ///   owning roster.
    pub fn add<T: TrackedEntity>(&mut self, entity: T) -> ContextResult<EntryHandle<T>> {
        if entity.is_persisted() {
            return Err(ContextError::InvalidOperation(format!(
                "{} {} already has an identity and cannot be added again",
                T::KIND,
                entity.id()
            )));
        }
        let key = T::stage_new(self, entity)?;
        debug!(
            "event=entity_add module=context kind={} store={}",
            T::KIND,
            self.options.store
        );
        Ok(EntryHandle::new(key))
    }

    /// Tracked value behind `handle`, or `None` once it was detached.
    ///
    /// Rosters are tracked without their member collection.
    pub fn entity<T: TrackedEntity>(&self, handle: &EntryHandle<T>) -> Option<&T> {
        T::tracker(self)
            .entry(handle.key)
            .map(|entry| &entry.current)
    }

    /// Mutable access to a tracked value; edits are picked up by the next
    /// commit.
    ///
    /// Members pushed onto a roster's `members` here are discarded when the
    /// guard drops; add them with [`Member::for_roster`] instead.
    pub fn entity_mut<T: TrackedEntity>(
        &mut self,
        handle: &EntryHandle<T>,
    ) -> Option<EntityMut<'_, T>> {
        T::tracker_mut(self)
            .entry_mut(handle.key)
            .filter(|entry| !entry.deleted)
            .map(|entry| EntityMut {
                value: &mut entry.current,
            })
    }

    /// Stages a tracked entity for deletion.
    ///
    /// Entities that were added but never committed are simply un-staged.
    ///
    /// # Errors
    /// - `ContextError::NotTracked` when the context does not know `entity`.
    pub fn remove<T: TrackedEntity>(&mut self, entity: &T) -> ContextResult<()> {
        let tracker = T::tracker(self);
        let key = if entity.is_persisted() {
            tracker.key_of(entity.id())
        } else {
            tracker.find_added(|current| current.same_row(entity))
        };
        let key = key.ok_or(ContextError::NotTracked {
            kind: T::KIND,
            id: entity.id(),
        })?;
        self.remove_key::<T>(key)
    }

    /// Same as [`Self::remove`], addressed by handle.
    pub fn remove_entry<T: TrackedEntity>(&mut self, handle: &EntryHandle<T>) -> ContextResult<()> {
        self.remove_key::<T>(handle.key)
    }

    /// Replaces the tracked value of a loaded entity.
    ///
    /// The next commit writes it only if it differs from the last committed
    /// snapshot.
    ///
    /// # Errors
    /// - `ContextError::InvalidOperation` for uncommitted or deleted
    ///   entities and for changes of a member's owning roster.
    /// - `ContextError::NotTracked` when the entity was never loaded here.
    pub fn update<T: TrackedEntity>(&mut self, entity: &T) -> ContextResult<()> {
        if !entity.is_persisted() {
            return Err(ContextError::InvalidOperation(format!(
                "{} has no identity yet; edit staged additions through entity_mut",
                T::KIND
            )));
        }
        let id = entity.id();
        let tracker = T::tracker_mut(self);
        let Some(entry) = tracker.key_of(id).and_then(|key| tracker.entry_mut(key)) else {
            return Err(ContextError::NotTracked { kind: T::KIND, id });
        };
        if entry.deleted {
            return Err(ContextError::InvalidOperation(format!(
                "{} {id} is staged for deletion",
                T::KIND
            )));
        }
        if let Some(snapshot) = &entry.snapshot {
            T::check_update(&snapshot.entity, entity)?;
        }
        let mut current = entity.clone();
        T::normalize(&mut current);
        entry.current = current;
        Ok(())
    }

    /// Looks up an entity by identity, loading and tracking it if needed.
    ///
    /// Returns `None` for unknown ids and for entities staged for deletion.
    pub fn find<T: TrackedEntity>(&mut self, id: EntityId) -> ContextResult<Option<T>> {
        if let Some(key) = T::tracker(self).key_of(id) {
            return Ok(T::tracker(self)
                .entry(key)
                .filter(|entry| !entry.deleted)
                .map(|entry| entry.current.clone()));
        }
        if id == UNSET_ID {
            return Ok(None);
        }

        let row = {
            let gate = self.gate.clone();
            let _turn = gate.enter();
            T::fetch_one(&self.conn, id)?
        };
        let Some(row) = row else {
            return Ok(None);
        };
        let tracker = T::tracker_mut(self);
        let key = tracker.attach(row);
        Ok(tracker.entry(key).map(|entry| entry.current.clone()))
    }

    /// Tracking state of `entity` in this context.
    pub fn entry_state<T: TrackedEntity>(&self, entity: &T) -> EntryState {
        let tracker = T::tracker(self);
        let key = if entity.is_persisted() {
            tracker.key_of(entity.id())
        } else {
            tracker.find_added(|current| current.same_row(entity))
        };
        key.map_or(EntryState::Detached, |key| tracker.state_of(key))
    }

    /// Tracking state of the entry behind `handle`.
    pub fn handle_state<T: TrackedEntity>(&self, handle: &EntryHandle<T>) -> EntryState {
        T::tracker(self).state_of(handle.key)
    }

    /// Whether a commit would write anything.
    pub fn has_changes(&self) -> bool {
        self.rosters.has_changes() || self.members.has_changes()
    }

    /// Forgets staged additions and reverts edits and deletions.
    pub fn discard_changes(&mut self) {
        self.rosters.reject_changes();
        self.members.reject_changes();
    }

    /// Writes all staged changes in one transaction.
    ///
    /// Returns the number of affected entities: inserted, updated and deleted
    /// rows, members removed by roster cascade included.
    ///
    /// # Errors
    /// - `ContextError::ConcurrencyConflict` when a row changed or vanished
    ///   since it was loaded.
    /// - `ContextError::UnknownRoster` when a staged member points at a
    ///   roster missing from the store.
    pub fn commit(&mut self) -> ContextResult<usize> {
        let started_at = Instant::now();
        if !self.has_changes() {
            return Ok(0);
        }

        let gate = self.gate.clone();
        let _turn = gate.enter();
        let tx = self.conn.transaction()?;
        let outcome = match write_changes(
            &tx,
            &self.rosters,
            &self.members,
            self.options.sensitive_data_logging,
        ) {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(
                    "event=commit module=context status=error store={} duration_ms={} error={}",
                    self.options.store,
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err);
            }
        };
        tx.commit()?;

        let affected = outcome.affected();
        info!(
            "event=commit module=context status=ok store={} affected={} inserted={} updated={} deleted={} cascaded={} duration_ms={}",
            self.options.store,
            affected,
            outcome.roster_inserts.len() + outcome.member_inserts.len(),
            outcome.roster_updates.len() + outcome.member_updates.len(),
            outcome.roster_deletes.len() + outcome.member_deletes.len(),
            outcome.cascaded,
            started_at.elapsed().as_millis()
        );
        self.apply(outcome);
        Ok(affected)
    }

    pub(crate) fn evaluate<T: TrackedEntity + 'static>(
        &mut self,
        query: &Query<T>,
    ) -> ContextResult<Vec<T>> {
        let gate = self.gate.clone();
        let _turn = gate.enter();
        let rows = T::fetch_all(&self.conn)?;
        let tracker = T::tracker_mut(self);
        let mut keys = rows
            .into_iter()
            .map(|row| tracker.attach(row))
            .collect::<Vec<_>>();
        keys.extend(tracker.keys_in_state(EntryState::Added));

        let mut items = keys
            .into_iter()
            .filter_map(|key| {
                let entry = tracker.entry(key)?;
                (!entry.deleted).then(|| (key, entry.current.clone()))
            })
            .collect::<Vec<_>>();
        items.retain(|(_, value)| T::is_visible(self, value));
        if query.includes_members() {
            T::load_owned(self, &mut items)?;
        }
        items.retain(|(_, value)| query.matches(value));

        Ok(query
            .arrange(items)
            .into_iter()
            .map(|(_, value)| value)
            .collect())
    }

    fn remove_key<T: TrackedEntity>(&mut self, key: EntryKey) -> ContextResult<()> {
        match T::tracker(self).state_of(key) {
            EntryState::Detached => Err(ContextError::NotTracked {
                kind: T::KIND,
                id: UNSET_ID,
            }),
            EntryState::Deleted => Ok(()),
            _ => {
                T::stage_removal(self, key);
                debug!(
                    "event=entity_remove module=context kind={} store={}",
                    T::KIND,
                    self.options.store
                );
                Ok(())
            }
        }
    }

    fn apply(&mut self, outcome: CommitOutcome) {
        for (key, id) in outcome.roster_inserts {
            if let Some(entry) = self.rosters.entry_mut(key) {
                entry.current.assign_id(id);
            }
            self.rosters.mark_inserted(key, INITIAL_VERSION);
        }
        for (key, id, roster_id) in outcome.member_inserts {
            if let Some(entry) = self.members.entry_mut(key) {
                entry.current.assign_id(id);
                entry.current.assign_roster(roster_id);
            }
            self.members.mark_inserted(key, INITIAL_VERSION);
        }
        for (key, version) in outcome.roster_updates {
            self.rosters.mark_updated(key, version);
        }
        for (key, version) in outcome.member_updates {
            self.members.mark_updated(key, version);
        }
        for key in outcome.member_deletes {
            self.members.detach(key);
        }
        for (key, roster_id) in outcome.roster_deletes {
            self.rosters.detach(key);
            let owned = self
                .members
                .iter()
                .filter(|(_, entry)| entry.current.roster_id() == roster_id)
                .map(|(key, _)| key)
                .collect::<Vec<_>>();
            for member_key in owned {
                self.members.detach(member_key);
            }
        }
    }
}

impl Drop for RosterContext {
    fn drop(&mut self) {
        debug!(
            "event=context_close module=context store={} pending_changes={}",
            self.options.store,
            self.has_changes()
        );
    }
}

#[derive(Default)]
struct CommitOutcome {
    roster_inserts: Vec<(EntryKey, EntityId)>,
    member_inserts: Vec<(EntryKey, EntityId, EntityId)>,
    roster_updates: Vec<(EntryKey, RowVersion)>,
    member_updates: Vec<(EntryKey, RowVersion)>,
    member_deletes: Vec<EntryKey>,
    roster_deletes: Vec<(EntryKey, EntityId)>,
    cascaded: usize,
}

impl CommitOutcome {
    fn affected(&self) -> usize {
        self.roster_inserts.len()
            + self.member_inserts.len()
            + self.roster_updates.len()
            + self.member_updates.len()
            + self.member_deletes.len()
            + self.roster_deletes.len()
            + self.cascaded
    }
}

/// Issues every staged write against `conn` without touching the trackers.
///
/// Order: roster inserts, member inserts, updates, member deletes, roster
/// deletes (each preceded by removal of its remaining members).
fn write_changes(
    conn: &Connection,
    rosters: &ChangeTracker<ClassRoster>,
    members: &ChangeTracker<Member>,
    sensitive: bool,
) -> ContextResult<CommitOutcome> {
    let roster_repo = SqliteRosterRepository::new(conn);
    let member_repo = SqliteMemberRepository::new(conn);
    let mut outcome = CommitOutcome::default();

    for key in rosters.keys_in_state(EntryState::Added) {
        let Some(entry) = rosters.entry(key) else {
            continue;
        };
        let id = roster_repo.insert(&entry.current)?;
        log_write("insert", id, &entry.current, sensitive);
        outcome.roster_inserts.push((key, id));
    }

    for key in members.keys_in_state(EntryState::Added) {
        let Some(entry) = members.entry(key) else {
            continue;
        };
        let roster_id = match entry.owner {
            Some(owner) => outcome
                .roster_inserts
                .iter()
                .find(|(roster_key, _)| *roster_key == owner)
                .map(|(_, id)| *id)
                .ok_or_else(|| {
                    ContextError::InvalidOperation(
                        "member belongs to a roster that is no longer staged".to_string(),
                    )
                })?,
            None => {
                let roster_id = entry.current.roster_id();
                if !roster_repo.exists(roster_id)? {
                    return Err(ContextError::UnknownRoster(roster_id));
                }
                roster_id
            }
        };

        let mut row = entry.current.clone();
        row.assign_roster(roster_id);
        let id = member_repo.insert(&row)?;
        log_write("insert", id, &row, sensitive);
        outcome.member_inserts.push((key, id, roster_id));
    }

    for key in rosters.keys_in_state(EntryState::Modified) {
        let Some((entry, version)) = versioned_entry(rosters, key) else {
            continue;
        };
        let new_version = roster_repo.update(&entry.current, version)?;
        log_write("update", entry.current.id(), &entry.current, sensitive);
        outcome.roster_updates.push((key, new_version));
    }

    for key in members.keys_in_state(EntryState::Modified) {
        let Some((entry, version)) = versioned_entry(members, key) else {
            continue;
        };
        let new_version = member_repo.update(&entry.current, version)?;
        log_write("update", entry.current.id(), &entry.current, sensitive);
        outcome.member_updates.push((key, new_version));
    }

    for key in members.keys_in_state(EntryState::Deleted) {
        let Some((entry, version)) = versioned_entry(members, key) else {
            continue;
        };
        member_repo.delete(entry.current.id(), version)?;
        log_write("delete", entry.current.id(), &entry.current, sensitive);
        outcome.member_deletes.push(key);
    }

    for key in rosters.keys_in_state(EntryState::Deleted) {
        let Some((entry, version)) = versioned_entry(rosters, key) else {
            continue;
        };
        let id = entry.current.id();
        let cascaded = member_repo.delete_for_roster(id)?;
        roster_repo.delete(id, version)?;
        log_write("delete", id, &entry.current, sensitive);
        debug!(
            "event=commit_cascade module=context kind=roster id={} members_removed={}",
            id, cascaded
        );
        outcome.cascaded += cascaded;
        outcome.roster_deletes.push((key, id));
    }

    Ok(outcome)
}

fn versioned_entry<T: Entity>(
    tracker: &ChangeTracker<T>,
    key: EntryKey,
) -> Option<(&tracker::Entry<T>, RowVersion)> {
    let entry = tracker.entry(key)?;
    let version = entry.version()?;
    Some((entry, version))
}

fn log_write<T: Entity>(op: &str, id: EntityId, entity: &T, sensitive: bool) {
    if sensitive {
        debug!(
            "event=commit_write module=context op={} kind={} id={} values={:?}",
            op,
            T::KIND,
            id,
            entity
        );
    } else {
        debug!(
            "event=commit_write module=context op={} kind={} id={}",
            op,
            T::KIND,
            id
        );
    }
}
