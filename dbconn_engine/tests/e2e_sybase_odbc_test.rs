//! Live tests against a Sybase ASE server reached through ODBC.
//!
//! Set `DBCONN_SYBASE_DSN` (for example in `.env`) to an ODBC connection
//! string with `Driver=` naming the ASE driver; without it these tests skip.

use dbconn_engine::{Connection, DbError, DriverRegistry, ResultSetExt};
use serial_test::serial;
use std::time::Instant;

mod helpers;
use helpers::get_sybase_test_dsn;

fn open() -> Option<Box<dyn Connection>> {
    dbconn_engine::test_helpers::init_test_logging();
    let Some(dsn) = get_sybase_test_dsn() else {
        eprintln!("⚠️  Skipping E2E test: DBCONN_SYBASE_DSN not set");
        return None;
    };
    let conn = DriverRegistry::default()
        .connect(&dsn)
        .expect("Failed to connect to Sybase");
    Some(conn)
}

#[test]
#[serial]
fn test_e2e_sybase_select_and_rowcount() {
    let Some(conn) = open() else {
        return;
    };
    let mut stmt = conn.statement().expect("Failed to allocate statement");

    let start = Instant::now();
    stmt.execute_sql(
        "create table #dbconn_e2e (id int not null, label varchar(20) null)",
    )
    .expect("Failed to create temp table");
    let rs = stmt
        .execute_sql(
            "insert into #dbconn_e2e values (1, 'one') \
             insert into #dbconn_e2e values (2, null)",
        )
        .expect("Failed to insert");
    while rs.more_results().unwrap() {}

    let rs = stmt
        .execute_sql("select id, label from #dbconn_e2e order by id")
        .expect("Failed to select");
    assert!(rs.more_results().unwrap());
    assert!(rs.next().unwrap());
    assert_eq!(rs.get_int("id").unwrap(), 1);
    assert_eq!(rs.get_string("label").unwrap(), "one");
    assert!(rs.next().unwrap());
    assert!(rs.is_null(1).unwrap());
    assert!(!rs.next().unwrap());
    println!("✓ Round trip finished in {:.2?}", start.elapsed());

    stmt.execute_sql("drop table #dbconn_e2e")
        .expect("Failed to drop temp table");
}

#[test]
#[serial]
fn test_e2e_sybase_failed_statement_reports_batch_failure() {
    let Some(conn) = open() else {
        return;
    };
    let mut stmt = conn.statement().expect("Failed to allocate statement");
    let err = match stmt.execute_sql("select * from dbconn_no_such_table") {
        Ok(_) => panic!("missing table should fail"),
        Err(e) => e,
    };
    assert!(err.is_batch_failure() || matches!(err, DbError::Native { .. }));
    println!("✓ Server reported: {}", err);
}

#[test]
#[serial]
fn test_e2e_sybase_connection_stays_alive() {
    let Some(mut conn) = open() else {
        return;
    };
    assert!(conn.alive());
    conn.set_autocommit(false).expect("Failed to start transaction");
    conn.rollback().expect("Failed to roll back");
    conn.set_autocommit(true).expect("Failed to restore autocommit");
    conn.disconnect().expect("Failed to disconnect");
    assert!(!conn.connected());
}
