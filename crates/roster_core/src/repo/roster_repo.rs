//! Roster repository contract and SQLite implementation.

use super::{RepoError, RepoResult, RowVersion, Versioned, INITIAL_VERSION};
use crate::model::roster::ClassRoster;
use crate::model::{Entity, EntityId, EntityKind};
use rusqlite::{params, Connection, OptionalExtension, Row};

const ROSTER_SELECT_SQL: &str = "SELECT id, name, version FROM rosters";

/// Repository interface for roster rows.
pub trait RosterRepository {
    /// Inserts a roster row and returns the store-assigned id.
    fn insert(&self, roster: &ClassRoster) -> RepoResult<EntityId>;
    /// Rewrites scalar fields; returns the new row version.
    fn update(&self, roster: &ClassRoster, expected: RowVersion) -> RepoResult<RowVersion>;
    /// Deletes one roster row. Member rows must be gone already.
    fn delete(&self, id: EntityId, expected: RowVersion) -> RepoResult<()>;
    fn get(&self, id: EntityId) -> RepoResult<Option<Versioned<ClassRoster>>>;
    fn list(&self) -> RepoResult<Vec<Versioned<ClassRoster>>>;
    fn exists(&self, id: EntityId) -> RepoResult<bool>;
}

/// SQLite-backed roster repository.
pub struct SqliteRosterRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRosterRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl RosterRepository for SqliteRosterRepository<'_> {
    fn insert(&self, roster: &ClassRoster) -> RepoResult<EntityId> {
        self.conn.execute(
            "INSERT INTO rosters (name, version) VALUES (?1, ?2);",
            params![roster.name.as_str(), INITIAL_VERSION],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update(&self, roster: &ClassRoster, expected: RowVersion) -> RepoResult<RowVersion> {
        let changed = self.conn.execute(
            "UPDATE rosters
             SET name = ?1,
                 version = version + 1
             WHERE id = ?2
               AND version = ?3;",
            params![roster.name.as_str(), roster.id(), expected],
        )?;
        if changed == 0 {
            return Err(RepoError::VersionMismatch {
                kind: EntityKind::Roster,
                id: roster.id(),
                expected,
            });
        }
        Ok(expected + 1)
    }

    fn delete(&self, id: EntityId, expected: RowVersion) -> RepoResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM rosters WHERE id = ?1 AND version = ?2;",
            params![id, expected],
        )?;
        if changed == 0 {
            return Err(RepoError::VersionMismatch {
                kind: EntityKind::Roster,
                id,
                expected,
            });
        }
        Ok(())
    }

    fn get(&self, id: EntityId) -> RepoResult<Option<Versioned<ClassRoster>>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ROSTER_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_roster_row(row)?));
        }
        Ok(None)
    }

    fn list(&self) -> RepoResult<Vec<Versioned<ClassRoster>>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ROSTER_SELECT_SQL} ORDER BY id ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut rosters = Vec::new();
        while let Some(row) = rows.next()? {
            rosters.push(parse_roster_row(row)?);
        }
        Ok(rosters)
    }

    fn exists(&self, id: EntityId) -> RepoResult<bool> {
        let found = self
            .conn
            .query_row("SELECT 1 FROM rosters WHERE id = ?1;", [id], |row| {
                row.get::<_, i64>(0)
            })
            .optional()?;
        Ok(found.is_some())
    }
}

fn parse_roster_row(row: &Row<'_>) -> RepoResult<Versioned<ClassRoster>> {
    let id: EntityId = row.get("id")?;
    if id <= 0 {
        return Err(RepoError::InvalidData(format!(
            "invalid id `{id}` in rosters.id"
        )));
    }
    let version: RowVersion = row.get("version")?;
    Ok(Versioned {
        entity: ClassRoster::from_store(id, row.get("name")?),
        version,
    })
}
