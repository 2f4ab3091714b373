//! Repository layer for roster and member rows.
//!
//! # Responsibility
//! - Keep SQL and row mapping for each entity kind behind a trait.
//! - Enforce row-version checks on every update and delete.
//!
//! # Invariants
//! - Lists are returned in id order, which is insertion order.
//! - A write that matches no row at the expected version fails with
//!   `RepoError::VersionMismatch` instead of silently succeeding.

pub mod member_repo;
pub mod roster_repo;

use crate::db::DbError;
use crate::model::{EntityId, EntityKind};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Version counter stored next to every row.
pub type RowVersion = i64;

/// Version written by an insert.
pub const INITIAL_VERSION: RowVersion = 1;

/// Repository error for row persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// Row is missing or was rewritten since `expected` was read.
    VersionMismatch {
        kind: EntityKind,
        id: EntityId,
        expected: RowVersion,
    },
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::VersionMismatch { kind, id, expected } => write!(
                f,
                "{kind} {id} is missing or no longer at version {expected}"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::VersionMismatch { .. } => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Entity value paired with the row version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub entity: T,
    pub version: RowVersion,
}
