//! Sybase ASE engine: commands are sent once and their results polled
//! through the CT-Library model in [`ctlib`].

pub mod catalog;
pub mod connection;
pub mod ctlib;
pub mod odbc_bridge;
pub mod result_set;
pub mod statement;

pub use connection::SybaseConnection;
pub use ctlib::{CtCommand, CtContext, CtContextFactory, CtResultType};
pub use odbc_bridge::OdbcCtFactory;
pub use result_set::SybaseResults;
pub use statement::SybaseStatement;

use super::driver_plugin::{BatchFailureMode, Driver, DriverCapabilities, DriverContext};
use crate::config::{ConnectionConfig, DriverConfig};
use crate::engine::Connection;
use crate::error::Result;
use std::sync::Arc;

pub struct SybaseDriver {
    ctx: DriverContext,
    factory: Arc<dyn CtContextFactory>,
}

impl Default for SybaseDriver {
    fn default() -> Self {
        Self::new(DriverConfig::from_env(), Arc::new(OdbcCtFactory))
    }
}

impl SybaseDriver {
    pub fn new(config: DriverConfig, factory: Arc<dyn CtContextFactory>) -> Self {
        Self {
            ctx: DriverContext::new(config),
            factory,
        }
    }

    pub fn context(&self) -> &DriverContext {
        &self.ctx
    }

    /// A connection that is not yet open.
    pub fn connection(&self, config: ConnectionConfig) -> SybaseConnection {
        SybaseConnection::new(config, self.ctx.clone(), Arc::clone(&self.factory))
    }
}

impl Driver for SybaseDriver {
    fn name(&self) -> &str {
        "sybase"
    }

    fn version(&self) -> String {
        format!("{} ({})", env!("CARGO_PKG_VERSION"), self.factory.name())
    }

    fn capabilities(&self) -> DriverCapabilities {
        DriverCapabilities {
            supports_prepared_statements: true,
            supports_stored_procedures: true,
            supports_scrollable_cursors: true,
            supports_compute_results: true,
            batch_failure_mode: BatchFailureMode::ServerDecides,
            driver_name: "Sybase ASE".to_string(),
            driver_version: self.version(),
        }
    }

    fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        let mut conn = self.connection(config.clone());
        conn.connect()?;
        Ok(Box::new(conn))
    }
}
