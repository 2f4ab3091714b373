use roster_core::db::migrations::{current_user_version, latest_version};
use roster_core::{
    drop_store, open_store, store_exists, store_names, ClassRoster, DbError, RosterContext,
    StoreName,
};
use std::thread;

#[test]
fn open_store_creates_schema_on_first_use() {
    let name = StoreName::unique();
    assert!(!store_exists(&name).unwrap());

    let conn = open_store(&name).unwrap();
    assert!(store_exists(&name).unwrap());
    assert_eq!(current_user_version(&conn).unwrap(), latest_version());
    assert_table_exists(&conn, "rosters");
    assert_table_exists(&conn, "members");
}

#[test]
fn open_store_is_idempotent_and_shares_data() {
    let name = StoreName::unique();
    let first = open_store(&name).unwrap();
    first
        .execute("INSERT INTO rosters (name) VALUES ('5ABIF_5AKIF');", [])
        .unwrap();

    let second = open_store(&name).unwrap();
    assert_eq!(current_user_version(&second).unwrap(), latest_version());
    assert_eq!(roster_rows(&second), 1);
}

#[test]
fn distinct_names_are_isolated() {
    let left = StoreName::unique();
    let right = StoreName::unique();

    let mut ctx = RosterContext::open_named(&left).unwrap();
    ctx.add(ClassRoster::new("6ABIF_6AKIF")).unwrap();
    ctx.commit().unwrap();

    assert_eq!(roster_rows(&open_store(&left).unwrap()), 1);
    assert_eq!(roster_rows(&open_store(&right).unwrap()), 0);
}

#[test]
fn data_outlives_every_context() {
    let name = StoreName::unique();
    {
        let mut ctx = RosterContext::open_named(&name).unwrap();
        ctx.add(ClassRoster::new("6ABIF_6AKIF")).unwrap();
        ctx.commit().unwrap();
    }

    let mut ctx = RosterContext::open_named(&name).unwrap();
    assert_eq!(ctx.rosters().count(&mut ctx).unwrap(), 1);
}

#[test]
fn drop_store_forgets_data_once_unused() {
    let name = StoreName::unique();
    {
        let mut ctx = RosterContext::open_named(&name).unwrap();
        ctx.add(ClassRoster::new("6ABIF_6AKIF")).unwrap();
        ctx.commit().unwrap();
    }

    assert!(drop_store(&name).unwrap());
    assert!(!drop_store(&name).unwrap());
    assert!(!store_exists(&name).unwrap());

    let mut ctx = RosterContext::open_named(&name).unwrap();
    assert_eq!(ctx.rosters().count(&mut ctx).unwrap(), 0);
}

#[test]
fn store_names_lists_registered_stores() {
    let name = StoreName::new(format!("listed-{}", StoreName::unique())).unwrap();
    open_store(&name).unwrap();
    assert!(store_names().unwrap().contains(&name));
}

#[test]
fn contexts_on_one_store_commit_from_many_threads() {
    const THREADS: usize = 4;
    const ROUNDS: usize = 50;
    let name = StoreName::unique();

    let workers = (0..THREADS)
        .map(|worker| {
            let name = name.clone();
            thread::spawn(move || {
                for round in 0..ROUNDS {
                    let mut ctx = RosterContext::open_named(&name).unwrap();
                    ctx.add(ClassRoster::new(format!("class-{worker}-{round}")))
                        .unwrap();
                    assert_eq!(ctx.commit().unwrap(), 1);
                    assert!(ctx.rosters().count(&mut ctx).unwrap() > round);
                }
            })
        })
        .collect::<Vec<_>>();
    for worker in workers {
        worker.join().unwrap();
    }

    let mut ctx = RosterContext::open_named(&name).unwrap();
    assert_eq!(ctx.rosters().count(&mut ctx).unwrap(), THREADS * ROUNDS);
}

#[test]
fn reopening_while_another_thread_drops_keeps_schema() {
    let name = StoreName::unique();
    open_store(&name).unwrap();

    let dropper = {
        let name = name.clone();
        thread::spawn(move || {
            for _ in 0..200 {
                drop_store(&name).unwrap();
            }
        })
    };
    for _ in 0..200 {
        let mut ctx = RosterContext::open_named(&name).unwrap();
        assert_eq!(ctx.rosters().count(&mut ctx).unwrap(), 0);
    }
    dropper.join().unwrap();
}

#[test]
fn invalid_store_names_are_rejected() {
    let err = StoreName::new("bad name?").unwrap_err();
    assert!(matches!(err, DbError::InvalidStoreName(_)));
}

fn roster_rows(conn: &rusqlite::Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM rosters;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &rusqlite::Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
