//! Schema migrations for roster stores.
//!
//! # Responsibility
//! - List schema steps in the order they must run.
//! - Bring a fresh or older store up to the latest schema in one transaction.
//!
//! # Invariants
//! - Step versions start at 1 and increase by one.
//! - The schema version of a store lives in `PRAGMA user_version`.

use crate::db::{DbError, DbResult};
use log::{debug, info};
use rusqlite::Connection;

struct SchemaStep {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const STEPS: &[SchemaStep] = &[
    SchemaStep {
        version: 1,
        name: "rosters_and_members",
        sql: include_str!("0001_init.sql"),
    },
    SchemaStep {
        version: 2,
        name: "row_versions",
        sql: include_str!("0002_row_versions.sql"),
    },
];

/// Version range covered by one [`apply_migrations`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationOutcome {
    pub from_version: u32,
    pub to_version: u32,
}

impl MigrationOutcome {
    pub fn applied_steps(&self) -> u32 {
        self.to_version - self.from_version
    }
}

/// Schema version produced by the last known step.
pub fn latest_version() -> u32 {
    STEPS.last().map_or(0, |step| step.version)
}

/// Runs every step newer than the store's current schema version.
///
/// # Errors
/// - `DbError::UnsupportedSchemaVersion` when the store was written by a
///   newer schema.
/// - `DbError::Sqlite` when a step fails; nothing is applied in that case.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<MigrationOutcome> {
    let from_version = current_user_version(conn)?;
    let latest = latest_version();
    if from_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from_version,
            latest_supported: latest,
        });
    }

    let pending = STEPS
        .iter()
        .filter(|step| step.version > from_version)
        .collect::<Vec<_>>();
    if !pending.is_empty() {
        let tx = conn.transaction()?;
        for step in pending {
            tx.execute_batch(step.sql)?;
            tx.pragma_update(None, "user_version", step.version)?;
            debug!(
                "event=schema_step module=db version={} name={}",
                step.version, step.name
            );
        }
        tx.commit()?;
    }

    let outcome = MigrationOutcome {
        from_version,
        to_version: latest,
    };
    info!(
        "event=schema_migrate module=db status=ok from_version={} to_version={} applied={}",
        outcome.from_version,
        outcome.to_version,
        outcome.applied_steps()
    );
    Ok(outcome)
}

/// Schema version recorded in the store.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::{apply_migrations, current_user_version, latest_version, STEPS};
    use crate::db::DbError;
    use rusqlite::Connection;

    #[test]
    fn step_versions_are_consecutive() {
        for (index, step) in STEPS.iter().enumerate() {
            assert_eq!(step.version as usize, index + 1, "step {}", step.name);
        }
    }

    #[test]
    fn fresh_store_reaches_latest_version_once() {
        let mut conn = Connection::open_in_memory().unwrap();

        let first = apply_migrations(&mut conn).unwrap();
        assert_eq!(first.from_version, 0);
        assert_eq!(first.applied_steps(), latest_version());
        assert_eq!(current_user_version(&conn).unwrap(), latest_version());

        let second = apply_migrations(&mut conn).unwrap();
        assert_eq!(second.applied_steps(), 0);
    }

    #[test]
    fn newer_store_schema_is_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", latest_version() + 1)
            .unwrap();

        let err = apply_migrations(&mut conn).unwrap_err();
        assert!(matches!(
            err,
            DbError::UnsupportedSchemaVersion { db_version, .. } if db_version == latest_version() + 1
        ));
    }

    #[test]
    fn row_versions_default_to_one() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_migrations(&mut conn).unwrap();
        conn.execute("INSERT INTO rosters (name) VALUES ('5ABIF')", [])
            .unwrap();
        let version: i64 = conn
            .query_row("SELECT version FROM rosters", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }
}
