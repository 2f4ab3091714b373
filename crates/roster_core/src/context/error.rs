//! Context error type.

use crate::db::DbError;
use crate::model::{EntityId, EntityKind};
use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ContextResult<T> = Result<T, ContextError>;

/// Errors surfaced by [`super::RosterContext`] operations.
#[derive(Debug)]
pub enum ContextError {
    /// Misuse of the context API, e.g. adding an already persisted entity.
    InvalidOperation(String),
    /// Entity is not tracked by this context.
    NotTracked { kind: EntityKind, id: EntityId },
    /// Another writer changed or deleted the row since it was loaded.
    ConcurrencyConflict { kind: EntityKind, id: EntityId },
    /// Query required a match and found none.
    NotFound { kind: EntityKind },
    /// Query required exactly one match and found `count`.
    Ambiguous { kind: EntityKind, count: usize },
    /// Staged member references a roster that is not in the store.
    UnknownRoster(EntityId),
    Repo(RepoError),
    Db(DbError),
}

impl ContextError {
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

impl Display for ContextError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidOperation(message) => write!(f, "invalid operation: {message}"),
            Self::NotTracked { kind, id } => {
                write!(f, "{kind} {id} is not tracked by this context")
            }
            Self::ConcurrencyConflict { kind, id } => write!(
                f,
                "{kind} {id} was changed or deleted by another writer since it was loaded"
            ),
            Self::NotFound { kind } => write!(f, "no {kind} matches the query"),
            Self::Ambiguous { kind, count } => {
                write!(f, "expected exactly one {kind}, query matched {count}")
            }
            Self::UnknownRoster(id) => write!(f, "roster {id} does not exist in the store"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ContextError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ContextError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::VersionMismatch { kind, id, .. } => Self::ConcurrencyConflict { kind, id },
            other => Self::Repo(other),
        }
    }
}

impl From<DbError> for ContextError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for ContextError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

#[cfg(test)]
mod tests {
    use super::ContextError;
    use crate::model::EntityKind;
    use crate::repo::RepoError;

    #[test]
    fn version_mismatch_maps_to_concurrency_conflict() {
        let err = ContextError::from(RepoError::VersionMismatch {
            kind: EntityKind::Member,
            id: 4,
            expected: 2,
        });
        assert!(err.is_concurrency_conflict());
        assert_eq!(
            err.to_string(),
            "member 4 was changed or deleted by another writer since it was loaded"
        );
    }

    #[test]
    fn invalid_data_stays_a_repo_error() {
        let err = ContextError::from(RepoError::InvalidData("bad".to_string()));
        assert!(matches!(err, ContextError::Repo(RepoError::InvalidData(_))));
    }
}
