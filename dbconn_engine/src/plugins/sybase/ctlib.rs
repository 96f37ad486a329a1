//! The CT-Library command surface the Sybase engine drives.
//!
//! One [`CtCommand`] multiplexes a stream of results that is pumped with
//! [`CtCommand::results`] until [`CtResultType::EndResults`]. Implementations
//! translate native return codes into `DbError::Native` carrying the server
//! messages.

use crate::config::ConnectionConfig;
use crate::engine::Orientation;
use crate::error::{DbError, Result};
use crate::protocol::{AggregateOp, ColumnDescriptor, ColumnSet, ParamDescriptor, ParamSlot, ValueBuffer};

/// `ct_results` result types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtResultType {
    Row,
    Cursor,
    Param,
    Status,
    Compute,
    CmdSucceed,
    CmdDone,
    CmdFail,
    EndResults,
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelKind {
    /// `CS_CANCEL_CURRENT`: discard the current result set.
    Current,
    /// `CS_CANCEL_ALL`: discard everything outstanding on the command.
    All,
}

pub trait CtCommand {
    /// `ct_command(CS_LANG_CMD)`
    fn language(&mut self, sql: &str) -> Result<()>;

    /// `ct_dynamic(CS_PREPARE)`; the caller sends and drains it.
    fn dynamic_prepare(&mut self, id: &str, sql: &str) -> Result<()>;

    /// `ct_dynamic(CS_DESCRIBE_INPUT)` round trip.
    fn dynamic_describe_input(&mut self, id: &str) -> Result<Vec<ParamDescriptor>>;

    /// `ct_dynamic(CS_EXECUTE)`; parameters follow through [`CtCommand::param`].
    fn dynamic_execute(&mut self, id: &str) -> Result<()>;

    /// `ct_dynamic(CS_DEALLOC)`; the caller sends and drains it.
    fn dynamic_deallocate(&mut self, id: &str) -> Result<()>;

    /// `ct_command(CS_RPC_CMD)`
    fn rpc(&mut self, procedure: &str) -> Result<()>;

    /// `ct_cursor(CS_CURSOR_DECLARE)` followed by `CS_CURSOR_OPEN`.
    fn cursor_declare(&mut self, name: &str, sql: &str, scrollable: bool, read_only: bool) -> Result<()>;

    fn param(&mut self, slot: &ParamSlot) -> Result<()>;

    fn send(&mut self) -> Result<()>;

    fn results(&mut self) -> Result<CtResultType>;

    /// `ct_res_info(CS_ROW_COUNT)`
    fn row_count(&mut self) -> Result<u64>;

    /// `ct_res_info(CS_NUMDATA)` plus `ct_describe` per column.
    fn describe(&mut self) -> Result<Vec<ColumnDescriptor>>;

    /// `ct_compute_info(CS_COMP_OP)` and the name of the aggregated column.
    fn compute_info(&mut self, column: usize) -> Result<(AggregateOp, String)>;

    /// `ct_bind` of every column of the current result.
    fn bind(&mut self, columns: &ColumnSet) -> Result<()>;

    /// `ct_fetch` / `ct_scroll_fetch`; returns the number of rows read.
    fn fetch(&mut self, orientation: Orientation, buffers: &mut [ValueBuffer]) -> Result<usize>;

    fn cancel(&mut self, kind: CancelKind) -> Result<()>;

    /// Server and client messages collected since the last call.
    fn take_messages(&mut self) -> Vec<String>;
}

/// An open `CS_CONTEXT`/`CS_CONNECTION` pair.
pub trait CtContext {
    fn command(&self) -> Result<Box<dyn CtCommand + '_>>;

    /// Major version of the server, e.g. 16 for ASE 16.0.
    fn server_version(&self) -> Result<u32>;

    fn alive(&mut self) -> bool;

    fn close(&mut self) -> Result<()>;
}

/// Opens native sessions for a driver.
pub trait CtContextFactory: Send + Sync {
    fn name(&self) -> &str;

    fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn CtContext>>;
}

/// Sends the command already set on `cmd` and consumes every result.
///
/// Row results are cancelled. A `CMD_FAIL` becomes a `Native` error with
/// the server messages once the stream has ended.
pub fn send_and_drain(cmd: &mut dyn CtCommand) -> Result<u64> {
    cmd.send()?;
    let mut affected = 0;
    let mut failures = Vec::new();
    loop {
        match cmd.results()? {
            CtResultType::CmdDone => affected += cmd.row_count()?,
            CtResultType::CmdFail => failures.extend(failure_messages(cmd)),
            CtResultType::Row
            | CtResultType::Cursor
            | CtResultType::Param
            | CtResultType::Status
            | CtResultType::Compute => cmd.cancel(CancelKind::Current)?,
            CtResultType::CmdSucceed => {}
            CtResultType::EndResults | CtResultType::Canceled => break,
        }
    }
    if failures.is_empty() {
        Ok(affected)
    } else {
        Err(DbError::native(-1, failures.join("; ")))
    }
}

/// Messages explaining a `CMD_FAIL`, or a generic text when the server sent none.
pub fn failure_messages(cmd: &mut dyn CtCommand) -> Vec<String> {
    let messages = cmd.take_messages();
    if messages.is_empty() {
        vec!["Failed to execute command".to_string()]
    } else {
        messages
    }
}
