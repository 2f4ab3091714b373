//! Connection bootstrap utilities for named in-memory SQLite stores.
//!
//! # Responsibility
//! - Open shared-cache in-memory connections addressed by store name.
//! - Configure connection pragmas required by core behavior.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON`.
//! - Connections never touch the filesystem (`mode=memory`).

use super::registry::StoreName;
use super::DbResult;
use log::{debug, error};
use rusqlite::{Connection, OpenFlags};
use std::time::{Duration, Instant};

/// Opens one more connection to the shared in-memory database behind `name`.
///
/// The database only outlives this connection while some other connection
/// (the registry anchor) keeps it open. Callers outside `db` should go
/// through [`super::open_store`], which guarantees that and runs migrations.
pub(crate) fn connect_store(name: &StoreName) -> DbResult<Connection> {
    let started_at = Instant::now();
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;

    let conn = match Connection::open_with_flags(store_uri(name), flags) {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=store_connect module=db status=error store={} duration_ms={} error_code=store_open_failed error={}",
                name,
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    configure_connection(&conn)?;
    debug!(
        "event=store_connect module=db status=ok store={} duration_ms={}",
        name,
        started_at.elapsed().as_millis()
    );
    Ok(conn)
}

fn configure_connection(conn: &Connection) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(())
}

fn store_uri(name: &StoreName) -> String {
    format!("file:roster-{}?mode=memory&cache=shared", name.as_str())
}
