//! Helper functions for reading environment variables in tests

use std::path::Path;

/// Get the DBCONN_SYBASE_DSN connection string from environment
/// Returns None if not set (live tests return early in this case)
pub fn get_sybase_test_dsn() -> Option<String> {
    dbconn_engine::test_helpers::load_dotenv();
    std::env::var("DBCONN_SYBASE_DSN")
        .ok()
        .filter(|s| !s.is_empty())
}

/// In-memory SQLite database with autocommit on
pub fn memory_conn_str() -> &'static str {
    "Driver=SQLite;Database=:memory:;Autocommit=1"
}

/// SQLite database file at `path`, created when missing
pub fn sqlite_conn_str(path: &Path) -> String {
    format!("Driver=SQLite;Database={};Autocommit=1", path.display())
}
