use super::catalog;
use super::ctlib::{send_and_drain, CtCommand};
use super::result_set::SybaseResults;
use crate::engine::{CursorMode, ParamBinder, ResultSet, Statement};
use crate::error::{DbError, Result};
use crate::observability::{SharedMetrics, StructuredLogger};
use crate::protocol::Value;
use log::Level;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

const ENGINE: &str = "sybase";

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id(prefix: &str) -> String {
    format!("{}{}", prefix, NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

/// The command a later `execute` resends.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ActiveCommand {
    Language(String),
    Dynamic {
        id: String,
        sql: String,
    },
    Rpc(String),
    Cursor {
        name: String,
        sql: String,
        scrollable: bool,
        read_only: bool,
    },
}

impl ActiveCommand {
    fn text(&self) -> &str {
        match self {
            ActiveCommand::Language(sql) => sql,
            ActiveCommand::Dynamic { sql, .. } => sql,
            ActiveCommand::Rpc(name) => name,
            ActiveCommand::Cursor { sql, .. } => sql,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ActiveCommand::Language(_) => "language",
            ActiveCommand::Dynamic { .. } => "dynamic",
            ActiveCommand::Rpc(_) => "rpc",
            ActiveCommand::Cursor { .. } => "cursor",
        }
    }
}

/// A Sybase statement owning one CT-Lib command of its connection.
///
/// The whole batch is sent at once and results are pulled lazily; whether
/// statements after a failing one still run is up to the server.
pub struct SybaseStatement<'c> {
    results: SybaseResults<'c>,
    binder: ParamBinder,
    active: Option<ActiveCommand>,
    server_version: u32,
    default_cursor: CursorMode,
    logger: StructuredLogger,
    metrics: SharedMetrics,
}

impl<'c> SybaseStatement<'c> {
    pub(crate) fn new(
        cmd: Box<dyn CtCommand + 'c>,
        server_version: u32,
        default_cursor: CursorMode,
        logger: StructuredLogger,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            results: SybaseResults::new(cmd, metrics.clone()),
            binder: ParamBinder::default(),
            active: None,
            server_version,
            default_cursor,
            logger,
            metrics,
        }
    }

    /// Runs `sql` through a server-side cursor.
    ///
    /// Scrollable cursors allow `prev`, `first` and `last` on their rows.
    pub fn execute_cursor(
        &mut self,
        sql: &str,
        scrollable: bool,
        read_only: bool,
    ) -> Result<&mut dyn ResultSet> {
        check_sql(sql)?;
        self.release()?;
        self.active = Some(ActiveCommand::Cursor {
            name: next_id("cursor"),
            sql: sql.to_string(),
            scrollable,
            read_only,
        });
        self.run()
    }

    /// Read-only cursor in the driver's default mode.
    pub fn open_cursor(&mut self, sql: &str) -> Result<&mut dyn ResultSet> {
        let scrollable = self.default_cursor == CursorMode::Scrollable;
        self.execute_cursor(sql, scrollable, true)
    }

    /// Cancels outstanding results and drops the server-side prepared
    /// statement, if any.
    fn release(&mut self) -> Result<()> {
        self.results.cancel_all()?;
        self.binder.clear();
        if let Some(ActiveCommand::Dynamic { id, .. }) = self.active.take() {
            let cmd = self.results.source.cmd.as_mut();
            cmd.dynamic_deallocate(&id)?;
            send_and_drain(cmd)?;
        }
        Ok(())
    }

    fn send_active(&mut self) -> Result<CursorMode> {
        let active = self
            .active
            .as_ref()
            .ok_or_else(|| DbError::InvalidState("SQL command is not set".to_string()))?;
        let cmd = self.results.source.cmd.as_mut();
        let mode = match active {
            ActiveCommand::Language(sql) => {
                cmd.language(sql)?;
                CursorMode::ForwardOnly
            }
            ActiveCommand::Dynamic { id, .. } => {
                cmd.dynamic_execute(id)?;
                for slot in self.binder.slots() {
                    cmd.param(slot)?;
                }
                CursorMode::ForwardOnly
            }
            ActiveCommand::Rpc(name) => {
                cmd.rpc(name)?;
                for slot in self.binder.slots() {
                    cmd.param(slot)?;
                }
                CursorMode::ForwardOnly
            }
            ActiveCommand::Cursor {
                name,
                sql,
                scrollable,
                read_only,
            } => {
                cmd.cursor_declare(name, sql, *scrollable, *read_only)?;
                if *scrollable {
                    CursorMode::Scrollable
                } else {
                    CursorMode::ForwardOnly
                }
            }
        };
        cmd.send()?;
        Ok(mode)
    }

    fn run(&mut self) -> Result<&mut dyn ResultSet> {
        let started = Instant::now();
        let outcome = self
            .send_active()
            .and_then(|mode| self.results.start(mode));
        let elapsed = started.elapsed();
        self.metrics.record_execution(elapsed);

        let (kind, text) = self
            .active
            .as_ref()
            .map(|a| (a.kind(), a.text().to_string()))
            .unwrap_or(("none", String::new()));
        let mut metadata = BTreeMap::new();
        metadata.insert("command", kind.to_string());
        metadata.insert("params", self.binder.len().to_string());
        metadata.insert("rows_affected", self.results.rows_affected().to_string());
        metadata.insert("elapsed_us", elapsed.as_micros().to_string());
        self.logger.log_statement(Level::Debug, ENGINE, &text, &metadata);

        match outcome {
            Ok(_) => Ok(&mut self.results),
            Err(e) => {
                if let DbError::BatchFailure { failed, message } = &e {
                    self.metrics.record_batch_failure(*failed);
                    self.logger.log_batch_failure(
                        ENGINE,
                        *failed,
                        self.results.rows_affected(),
                        message,
                    );
                }
                Err(e)
            }
        }
    }

    fn bindable(&mut self) -> Result<()> {
        match self.active {
            Some(ActiveCommand::Dynamic { .. }) | Some(ActiveCommand::Rpc(_)) => {
                self.results.cancel_all()
            }
            _ => Err(DbError::InvalidState("Statement is not prepared".to_string())),
        }
    }
}

fn check_sql(sql: &str) -> Result<()> {
    if sql.trim().is_empty() {
        return Err(DbError::InvalidState("SQL command is not set".to_string()));
    }
    Ok(())
}

impl Statement for SybaseStatement<'_> {
    fn prepare(&mut self, sql: &str) -> Result<()> {
        check_sql(sql)?;
        self.release()?;

        let id = next_id("dyn");
        let cmd = self.results.source.cmd.as_mut();
        cmd.dynamic_prepare(&id, sql)?;
        send_and_drain(cmd)?;
        let params = cmd.dynamic_describe_input(&id)?;
        log::debug!("Prepared {} with {} parameter(s)", id, params.len());

        self.binder = ParamBinder::new(params);
        self.active = Some(ActiveCommand::Dynamic {
            id,
            sql: sql.to_string(),
        });
        Ok(())
    }

    fn call(&mut self, procedure: &str) -> Result<()> {
        check_sql(procedure)?;
        self.release()?;

        let params = catalog::procedure_params(
            self.results.source.cmd.as_mut(),
            procedure,
            self.server_version,
        )?;
        log::debug!("Procedure {} takes {} parameter(s)", procedure, params.len());

        self.binder = ParamBinder::new(params);
        self.active = Some(ActiveCommand::Rpc(procedure.to_string()));
        Ok(())
    }

    fn execute_sql(&mut self, sql: &str) -> Result<&mut dyn ResultSet> {
        check_sql(sql)?;
        self.release()?;
        self.active = Some(ActiveCommand::Language(sql.to_string()));
        self.run()
    }

    fn execute(&mut self) -> Result<&mut dyn ResultSet> {
        if self.active.is_none() {
            return Err(DbError::InvalidState("SQL command is not set".to_string()));
        }
        self.results.cancel_all()?;
        self.run()
    }

    fn results(&mut self) -> &mut dyn ResultSet {
        &mut self.results
    }

    fn cancel(&mut self) -> Result<()> {
        log::debug!("Cancelling current Sybase result");
        self.results.cancel_current()
    }

    fn cancel_all(&mut self) -> Result<()> {
        log::debug!("Cancelling all Sybase results");
        self.results.cancel_all()
    }

    fn param_count(&self) -> usize {
        self.binder.len()
    }

    fn bind_value(&mut self, index: usize, value: Value) -> Result<()> {
        self.bindable()?;
        self.binder.bind(index, &value)
    }

    fn set_null(&mut self, index: usize) -> Result<()> {
        self.bindable()?;
        self.binder.set_null(index)
    }

    fn proc_retval(&mut self) -> Result<i32> {
        if !matches!(self.active, Some(ActiveCommand::Rpc(_))) {
            return Err(DbError::InvalidState(
                "proc_retval(): no procedure was called".to_string(),
            ));
        }
        self.results.return_status()
    }
}

impl Drop for SybaseStatement<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!("Releasing Sybase command failed: {}", e);
        }
    }
}
