//! SQLite storage bootstrap, named-store registry and schema migrations.
//!
//! # Responsibility
//! - Open and configure SQLite connections to named in-memory stores.
//! - Keep every named store alive for the process lifetime.
//! - Bring every new store up to the latest roster schema.
//!
//! # Invariants
//! - A store is registered only after its schema is current.
//! - Core code must not read/write entity data before migrations succeed.
//! - Two connections opened with the same store name observe the same data;
//!   different names never share data.
//! - Contexts sharing a store name read and commit one at a time.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;
mod registry;

pub(crate) use registry::{open_gated, StoreGate};
pub use registry::{drop_store, open_store, store_exists, store_names, StoreName};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// Store names end up inside a SQLite URI, so the alphabet is restricted.
    InvalidStoreName(String),
    /// A thread panicked while holding the store registry lock.
    RegistryPoisoned,
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "store schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::InvalidStoreName(name) => write!(
                f,
                "invalid store name `{name}`; expected non-empty [A-Za-z0-9._-]"
            ),
            Self::RegistryPoisoned => write!(f, "store registry lock is poisoned"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
            Self::InvalidStoreName(_) => None,
            Self::RegistryPoisoned => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
