//! Statement and result-set layer over two database engines.
//!
//! SQLite runs statements with blocking `step` calls; Sybase ASE sends a
//! batch once and polls its results. Both surface the same [`Connection`],
//! [`Statement`] and [`ResultSet`] traits, and a [`DriverRegistry`] picks
//! the engine from a connection string.
//!
//! ```no_run
//! use dbconn_engine::{DriverRegistry, ResultSetExt};
//!
//! # fn main() -> dbconn_engine::Result<()> {
//! let registry = DriverRegistry::default();
//! let conn = registry.connect("Driver=SQLite;Database=:memory:")?;
//! let mut stmt = conn.statement()?;
//! let rs = stmt.execute_sql("SELECT 1 AS one; SELECT 'two'")?;
//! while rs.more_results()? {
//!     while rs.next()? {
//!         println!("{}", rs.get_string(0)?);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
mod error;
pub mod handles;
pub mod observability;
pub mod plugins;
pub mod protocol;
#[cfg(feature = "test-helpers")]
pub mod test_helpers;

pub use config::{ConnectionConfig, DriverConfig};
pub use engine::{
    Connection, CursorMode, ParamBinder, ResultSet, ResultSetExt, Statement, StatementExt,
};
pub use error::{DbError, ErrorCategory, Result};
pub use plugins::{
    BatchFailureMode, Driver, DriverCapabilities, DriverRegistry, SqliteDriver, SybaseDriver,
};
pub use protocol::{LogicalType, NativeType, Value};
