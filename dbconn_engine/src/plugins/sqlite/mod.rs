//! SQLite engine: blocking `step` calls over one handle per sub-statement.

pub mod connection;
pub mod ffi;
pub mod marshal;
pub mod result_set;
pub mod statement;

pub use connection::SqliteConnection;
pub use result_set::SqliteResults;
pub use statement::SqliteStatement;

use super::driver_plugin::{BatchFailureMode, Driver, DriverCapabilities, DriverContext};
use crate::config::{ConnectionConfig, DriverConfig};
use crate::engine::Connection;
use crate::error::Result;

pub struct SqliteDriver {
    ctx: DriverContext,
}

impl Default for SqliteDriver {
    fn default() -> Self {
        Self::new(DriverConfig::from_env())
    }
}

impl SqliteDriver {
    pub fn new(config: DriverConfig) -> Self {
        Self {
            ctx: DriverContext::new(config),
        }
    }

    pub fn context(&self) -> &DriverContext {
        &self.ctx
    }

    /// A connection that is not yet open.
    pub fn connection(&self, config: ConnectionConfig) -> SqliteConnection {
        SqliteConnection::new(config, self.ctx.clone())
    }

    pub fn version_number(&self) -> i32 {
        rusqlite::version_number()
    }
}

impl Driver for SqliteDriver {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> String {
        rusqlite::version().to_string()
    }

    fn capabilities(&self) -> DriverCapabilities {
        DriverCapabilities {
            supports_prepared_statements: true,
            supports_stored_procedures: false,
            supports_scrollable_cursors: false,
            supports_compute_results: false,
            batch_failure_mode: BatchFailureMode::ContinueOnError,
            driver_name: "SQLite".to_string(),
            driver_version: self.version(),
        }
    }

    fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        let mut conn = self.connection(config.clone());
        conn.connect()?;
        Ok(Box::new(conn))
    }
}
