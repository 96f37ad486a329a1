pub mod env;

#[allow(unused_imports)]
pub use env::{get_sybase_test_dsn, memory_conn_str, sqlite_conn_str};
