//! Member repository contract and SQLite implementation.

use super::{RepoError, RepoResult, RowVersion, Versioned, INITIAL_VERSION};
use crate::model::member::Member;
use crate::model::{Entity, EntityId, EntityKind};
use chrono::NaiveDate;
use rusqlite::{params, Connection, Row};

const MEMBER_SELECT_SQL: &str = "SELECT
    id,
    roster_id,
    first_name,
    last_name,
    birth_date,
    version
FROM members";

/// Repository interface for member rows.
pub trait MemberRepository {
    /// Inserts a member row under `member.roster_id()`.
    fn insert(&self, member: &Member) -> RepoResult<EntityId>;
    /// Rewrites name and birth date; the owning roster is never rewritten.
    fn update(&self, member: &Member, expected: RowVersion) -> RepoResult<RowVersion>;
    fn delete(&self, id: EntityId, expected: RowVersion) -> RepoResult<()>;
    /// Deletes every member of one roster and returns how many were removed.
    fn delete_for_roster(&self, roster_id: EntityId) -> RepoResult<usize>;
    fn get(&self, id: EntityId) -> RepoResult<Option<Versioned<Member>>>;
    fn list(&self) -> RepoResult<Vec<Versioned<Member>>>;
    fn list_for_roster(&self, roster_id: EntityId) -> RepoResult<Vec<Versioned<Member>>>;
}

/// SQLite-backed member repository.
pub struct SqliteMemberRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteMemberRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn collect(
        &self,
        sql: &str,
        roster_id: Option<EntityId>,
    ) -> RepoResult<Vec<Versioned<Member>>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = match roster_id {
            Some(roster_id) => stmt.query([roster_id])?,
            None => stmt.query([])?,
        };
        let mut members = Vec::new();
        while let Some(row) = rows.next()? {
            members.push(parse_member_row(row)?);
        }
        Ok(members)
    }
}

impl MemberRepository for SqliteMemberRepository<'_> {
    fn insert(&self, member: &Member) -> RepoResult<EntityId> {
        self.conn.execute(
            "INSERT INTO members (
                roster_id,
                first_name,
                last_name,
                birth_date,
                version
            ) VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                member.roster_id(),
                member.first_name.as_str(),
                member.last_name.as_str(),
                member.birth_date,
                INITIAL_VERSION,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update(&self, member: &Member, expected: RowVersion) -> RepoResult<RowVersion> {
        let changed = self.conn.execute(
            "UPDATE members
             SET first_name = ?1,
                 last_name = ?2,
                 birth_date = ?3,
                 version = version + 1
             WHERE id = ?4
               AND version = ?5;",
            params![
                member.first_name.as_str(),
                member.last_name.as_str(),
                member.birth_date,
                member.id(),
                expected,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::VersionMismatch {
                kind: EntityKind::Member,
                id: member.id(),
                expected,
            });
        }
        Ok(expected + 1)
    }

    fn delete(&self, id: EntityId, expected: RowVersion) -> RepoResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM members WHERE id = ?1 AND version = ?2;",
            params![id, expected],
        )?;
        if changed == 0 {
            return Err(RepoError::VersionMismatch {
                kind: EntityKind::Member,
                id,
                expected,
            });
        }
        Ok(())
    }

    fn delete_for_roster(&self, roster_id: EntityId) -> RepoResult<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM members WHERE roster_id = ?1;", [roster_id])?;
        Ok(removed)
    }

    fn get(&self, id: EntityId) -> RepoResult<Option<Versioned<Member>>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{MEMBER_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_member_row(row)?));
        }
        Ok(None)
    }

    fn list(&self) -> RepoResult<Vec<Versioned<Member>>> {
        self.collect(&format!("{MEMBER_SELECT_SQL} ORDER BY id ASC;"), None)
    }

    fn list_for_roster(&self, roster_id: EntityId) -> RepoResult<Vec<Versioned<Member>>> {
        self.collect(
            &format!("{MEMBER_SELECT_SQL} WHERE roster_id = ?1 ORDER BY id ASC;"),
            Some(roster_id),
        )
    }
}

fn parse_member_row(row: &Row<'_>) -> RepoResult<Versioned<Member>> {
    let id: EntityId = row.get("id")?;
    let roster_id: EntityId = row.get("roster_id")?;
    if id <= 0 || roster_id <= 0 {
        return Err(RepoError::InvalidData(format!(
            "invalid ids `{id}`/`{roster_id}` in members.id/members.roster_id"
        )));
    }

    let birth_text: String = row.get("birth_date")?;
    let birth_date: NaiveDate = birth_text.parse().map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid birth date `{birth_text}` in members.birth_date"
        ))
    })?;

    Ok(Versioned {
        entity: Member::from_store(
            id,
            roster_id,
            row.get("first_name")?,
            row.get("last_name")?,
            birth_date,
        ),
        version: row.get("version")?,
    })
}
