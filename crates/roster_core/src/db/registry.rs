//! Process-wide registry of named in-memory stores.
//!
//! # Responsibility
//! - Validate store names.
//! - Create a store (anchor connection + migrations) on first use.
//! - Keep the anchor alive until the store is explicitly dropped.
//! - Hand every context of one store the same access gate.
//!
//! # Invariants
//! - `open_store` is idempotent per name.
//! - A registered store always has migrations fully applied.

use super::migrations::apply_migrations;
use super::open::connect_store;
use super::{DbError, DbResult};
use log::{error, info};
use once_cell::sync::Lazy;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use uuid::Uuid;

static STORES: Lazy<Mutex<HashMap<StoreName, StoreSlot>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Validated key selecting one isolated store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StoreName(String);

impl StoreName {
    /// Validates and wraps a store name.
    ///
    /// # Errors
    /// - `DbError::InvalidStoreName` when `name` is empty or contains
    ///   characters outside `[A-Za-z0-9._-]`.
    pub fn new(name: impl Into<String>) -> DbResult<Self> {
        let name = name.into();
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'));
        if !valid {
            return Err(DbError::InvalidStoreName(name));
        }
        Ok(Self(name))
    }

    /// Fresh random name, for stores that must not collide with any other.
    pub fn unique() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for StoreName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for StoreName {
    type Error = DbError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StoreName> for String {
    fn from(value: StoreName) -> Self {
        value.0
    }
}

/// Serializes store access of every context sharing one store name.
///
/// SQLite reports shared-cache table locks without consulting the busy
/// handler, so contexts take turns here instead.
#[derive(Debug, Clone, Default)]
pub(crate) struct StoreGate(Arc<Mutex<()>>);

impl StoreGate {
    /// Blocks until no other context of the same store is inside.
    pub(crate) fn enter(&self) -> MutexGuard<'_, ()> {
        // guards no data, so a poisoned lock is still usable
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn in_use(&self) -> bool {
        Arc::strong_count(&self.0) > 1
    }
}

struct StoreSlot {
    /// Keeps the in-memory database alive; `None` once dropped.
    anchor: Option<Connection>,
    gate: StoreGate,
}

/// Opens a connection to the named store, creating the store on first use.
///
/// The returned connection is not coordinated with contexts on the same
/// store; use it from one thread at a time next to them.
///
/// # Side effects
/// - First call per name creates the store and applies migrations.
/// - Emits `store_open` logging events with duration and status.
pub fn open_store(name: &StoreName) -> DbResult<Connection> {
    open_gated(name).map(|(conn, _)| conn)
}

/// Same as [`open_store`], plus the gate shared by all contexts of `name`.
pub(crate) fn open_gated(name: &StoreName) -> DbResult<(Connection, StoreGate)> {
    let started_at = Instant::now();
    let mut stores = lock_stores()?;
    let slot = stores.entry(name.clone()).or_insert_with(|| StoreSlot {
        anchor: None,
        gate: StoreGate::default(),
    });

    if slot.anchor.is_none() {
        // contexts from before a drop may still be using the database
        let gate = slot.gate.clone();
        let _turn = gate.enter();
        let (anchor, schema_version) = match create_store(name) {
            Ok(created) => created,
            Err(err) => {
                error!(
                    "event=store_open module=db status=error store={} duration_ms={} error_code=store_create_failed error={}",
                    name,
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err);
            }
        };
        slot.anchor = Some(anchor);
        info!(
            "event=store_open module=db status=ok store={} created=true schema_version={} duration_ms={}",
            name,
            schema_version,
            started_at.elapsed().as_millis()
        );
    }

    // connect while the registry is locked so a concurrent drop cannot
    // release the database in between
    let conn = connect_store(name)?;
    Ok((conn, slot.gate.clone()))
}

/// Releases a named store.
///
/// Returns `true` when the store was registered. Data disappears once the
/// last open context on that store is dropped.
pub fn drop_store(name: &StoreName) -> DbResult<bool> {
    let mut stores = lock_stores()?;
    let (existed, idle) = match stores.get_mut(name) {
        Some(slot) => (slot.anchor.take().is_some(), !slot.gate.in_use()),
        None => (false, false),
    };
    if idle {
        stores.remove(name);
    }
    info!(
        "event=store_drop module=db status=ok store={} existed={}",
        name, existed
    );
    Ok(existed)
}

/// Returns whether `name` is currently registered.
pub fn store_exists(name: &StoreName) -> DbResult<bool> {
    Ok(lock_stores()?
        .get(name)
        .is_some_and(|slot| slot.anchor.is_some()))
}

/// Lists registered store names in sorted order.
pub fn store_names() -> DbResult<Vec<StoreName>> {
    let mut names = lock_stores()?
        .iter()
        .filter(|(_, slot)| slot.anchor.is_some())
        .map(|(name, _)| name.clone())
        .collect::<Vec<_>>();
    names.sort();
    Ok(names)
}

fn create_store(name: &StoreName) -> DbResult<(Connection, u32)> {
    let mut anchor = connect_store(name)?;
    let outcome = apply_migrations(&mut anchor)?;
    Ok((anchor, outcome.to_version))
}

fn lock_stores() -> DbResult<MutexGuard<'static, HashMap<StoreName, StoreSlot>>> {
    STORES.lock().map_err(|_| DbError::RegistryPoisoned)
}

#[cfg(test)]
mod tests {
    use super::StoreName;
    use crate::db::DbError;

    #[test]
    fn store_name_accepts_uuid_and_simple_names() {
        assert!(StoreName::new("6ABIF_6AKIF").is_ok());
        assert!(StoreName::new("school.db-1").is_ok());
        assert!(StoreName::new(StoreName::unique().to_string()).is_ok());
    }

    #[test]
    fn store_name_rejects_empty_and_uri_characters() {
        for bad in ["", "a b", "x?mode=rwc", "a/b", "n&cache=private"] {
            let err = StoreName::new(bad).expect_err("name should be rejected");
            assert!(matches!(err, DbError::InvalidStoreName(name) if name == bad));
        }
    }

    #[test]
    fn store_name_deserialization_validates() {
        let name: StoreName = serde_json::from_str("\"6ABIF_6AKIF\"").unwrap();
        assert_eq!(name.as_str(), "6ABIF_6AKIF");
        assert!(serde_json::from_str::<StoreName>("\"a/b\"").is_err());
    }

    #[test]
    fn unique_names_do_not_repeat() {
        assert_ne!(StoreName::unique(), StoreName::unique());
    }
}
