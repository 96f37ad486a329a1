pub mod access;
pub mod binder;
pub mod cursor;
pub mod sequencer;

pub use access::{ColumnRef, ResultSetExt, StatementExt};
pub use binder::ParamBinder;
pub use cursor::{CursorMode, Orientation, RowCursor};
pub use sequencer::{EventSource, LandedResult, ResultEvent, Sequencer, VisibleKind};

use crate::error::Result;
use crate::protocol::{ColumnDescriptor, LogicalType, Value};

/// Rows of the visible result plus the stream position of one execution.
///
/// Column indexes are 0-based; row ordinals are 1-based.
pub trait ResultSet {
    /// True once the visible result has produced a row.
    fn has_data(&self) -> bool;

    /// Moves to the next result carrying columns.
    fn more_results(&mut self) -> Result<bool>;

    /// Ordinal of the current row.
    fn row_count(&self) -> usize;

    /// Rows affected by the commands consumed so far in this execution.
    fn rows_affected(&self) -> u64;

    fn column_count(&self) -> usize;
    fn column_name(&self, index: usize) -> Result<&str>;
    fn column_index(&self, name: &str) -> Option<usize>;
    fn column(&self, index: usize) -> Result<&ColumnDescriptor>;

    fn next(&mut self) -> Result<bool>;
    fn prev(&mut self) -> Result<bool>;
    fn first(&mut self) -> Result<bool>;
    fn last(&mut self) -> Result<bool>;

    fn is_null(&self, index: usize) -> Result<bool>;

    /// Reads one cell of the current row as `kind`.
    fn value(&self, index: usize, kind: LogicalType) -> Result<Value>;
}

pub trait Statement {
    fn prepare(&mut self, sql: &str) -> Result<()>;

    /// Sets up a stored procedure call; parameters come from the catalog.
    fn call(&mut self, procedure: &str) -> Result<()>;

    fn execute_sql(&mut self, sql: &str) -> Result<&mut dyn ResultSet>;

    /// Re-runs the active command with the current parameter values.
    fn execute(&mut self) -> Result<&mut dyn ResultSet>;

    /// The result set of the last execution.
    fn results(&mut self) -> &mut dyn ResultSet;

    /// Discards the visible result.
    fn cancel(&mut self) -> Result<()>;

    /// Discards every outstanding result.
    fn cancel_all(&mut self) -> Result<()>;

    fn param_count(&self) -> usize;
    fn bind_value(&mut self, index: usize, value: Value) -> Result<()>;
    fn set_null(&mut self, index: usize) -> Result<()>;

    /// Return status of the last procedure call.
    fn proc_retval(&mut self) -> Result<i32>;
}

pub trait Connection {
    fn connect(&mut self) -> Result<bool>;
    fn disconnect(&mut self) -> Result<()>;

    /// Checks that the native session still answers.
    fn alive(&mut self) -> bool;
    fn connected(&self) -> bool;

    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;
    fn set_autocommit(&mut self, on: bool) -> Result<()>;
    fn autocommit(&self) -> bool;

    fn statement(&self) -> Result<Box<dyn Statement + '_>>;
}
