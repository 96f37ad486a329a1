mod helpers;

use dbconn_engine::test_helpers::{ScriptedResult, ScriptedServer};
use dbconn_engine::{
    BatchFailureMode, DbError, Driver, DriverConfig, DriverRegistry, ResultSetExt, SybaseDriver,
};
use helpers::memory_conn_str;
use std::sync::Arc;

#[test]
fn test_default_registry_knows_both_engines() {
    let registry = DriverRegistry::default();
    assert_eq!(registry.names().unwrap(), vec!["sqlite", "sybase"]);

    let sqlite = registry.get("SQLite").unwrap();
    let caps = sqlite.capabilities();
    assert_eq!(caps.batch_failure_mode, BatchFailureMode::ContinueOnError);
    assert!(caps.supports_prepared_statements);
    assert!(!caps.supports_scrollable_cursors);

    let sybase = registry.get("sybase").unwrap();
    assert_eq!(
        sybase.capabilities().batch_failure_mode,
        BatchFailureMode::ServerDecides
    );
    assert!(sybase.version().contains("odbc"));
}

#[test]
fn test_unknown_driver_is_a_config_error() {
    let registry = DriverRegistry::default();
    assert!(matches!(registry.get("oracle"), Err(DbError::Config(_))));
    match registry.connect("Driver={Mystery DB};Server=x") {
        Err(DbError::Config(message)) => assert!(message.contains("No driver")),
        Err(e) => panic!("Expected Config error, got {:?}", e),
        Ok(_) => panic!("unknown driver should not connect"),
    }
}

#[test]
fn test_connect_routes_to_sqlite() {
    let registry = DriverRegistry::default();
    let conn = registry.connect(memory_conn_str()).unwrap();
    assert!(conn.connected());
    let mut stmt = conn.statement().unwrap();
    let rs = stmt.execute_sql("SELECT sqlite_version()").unwrap();
    assert!(rs.more_results().unwrap());
    assert!(rs.next().unwrap());
    assert!(!rs.get_string(0).unwrap().is_empty());
}

#[test]
fn test_registered_driver_replaces_default() {
    let server = ScriptedServer::new();
    server.push_batch(vec![ScriptedResult::Done(3)]);
    let registry = DriverRegistry::default();
    registry
        .register(Arc::new(SybaseDriver::new(
            DriverConfig::default(),
            Arc::new(server.clone()),
        )))
        .unwrap();
    assert!(registry.get("sybase").unwrap().version().contains("scripted"));

    let conn = registry
        .connect("Driver={Adaptive Server Enterprise};Server=scripted;Autocommit=1")
        .unwrap();
    let mut stmt = conn.statement().unwrap();
    let rs = stmt.execute_sql("update t set x = 1").unwrap();
    assert!(!rs.more_results().unwrap());
    assert_eq!(rs.rows_affected(), 3);
    assert_eq!(server.open_sessions(), 1);
}
