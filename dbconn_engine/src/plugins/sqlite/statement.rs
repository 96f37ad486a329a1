use super::ffi::RawDb;
use super::marshal;
use super::result_set::SqliteResults;
use crate::engine::{ResultSet, Statement};
use crate::error::{DbError, Result};
use crate::observability::{SharedMetrics, StructuredLogger};
use crate::protocol::Value;
use log::Level;
use std::collections::BTreeMap;
use std::time::Instant;

const ENGINE: &str = "sqlite";

/// A SQLite statement borrowing its connection.
///
/// `execute_sql` compiles every `;`-separated statement up front and runs
/// them in order; a failing statement does not stop the ones after it.
pub struct SqliteStatement<'c> {
    db: RawDb<'c>,
    results: SqliteResults<'c>,
    prepared: bool,
    logger: StructuredLogger,
    metrics: SharedMetrics,
}

impl<'c> SqliteStatement<'c> {
    pub(crate) fn new(db: RawDb<'c>, logger: StructuredLogger, metrics: SharedMetrics) -> Self {
        Self {
            db,
            results: SqliteResults::new(metrics.clone()),
            prepared: false,
            logger,
            metrics,
        }
    }

    /// Asks SQLite to abort whatever runs on this connection.
    pub fn interrupt(&self) {
        log::debug!("Interrupting SQLite connection");
        self.db.interrupt();
    }

    /// Number of compiled sub-statements of the active command.
    pub fn command_count(&self) -> usize {
        self.results.handles().len()
    }

    fn compile(&mut self, sql: &str) -> Result<()> {
        if sql.trim().is_empty() {
            return Err(DbError::InvalidState("SQL command is not set".to_string()));
        }
        self.results.cancel_all();
        self.results.load(Vec::new());
        self.prepared = false;

        let handles = self.db.prepare_all(sql)?;
        if handles.is_empty() {
            return Err(DbError::InvalidState("SQL command is not set".to_string()));
        }
        log::debug!("Compiled {} SQLite statement(s)", handles.len());
        self.results.load(handles);
        Ok(())
    }

    fn run(&mut self) -> Result<&mut dyn ResultSet> {
        let started = Instant::now();
        let outcome = self.results.start();
        let elapsed = started.elapsed();
        self.metrics.record_execution(elapsed);

        let mut metadata = BTreeMap::new();
        metadata.insert("commands", self.results.handles().len().to_string());
        metadata.insert("rows_affected", self.results.rows_affected().to_string());
        metadata.insert("elapsed_us", elapsed.as_micros().to_string());
        let sql = self
            .results
            .handles()
            .iter()
            .map(|h| h.sql())
            .collect::<Vec<_>>()
            .join("; ");
        self.logger.log_statement(Level::Debug, ENGINE, &sql, &metadata);

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

    fn prepared_handle(&mut self, index: usize) -> Result<&super::ffi::RawStmt<'c>> {
        if !self.prepared {
            return Err(DbError::InvalidState("Statement is not prepared".to_string()));
        }
        // bindings are only accepted on a reset handle
        self.results.cancel_all();
        let handle = self
            .results
            .handles()
            .first()
            .ok_or_else(|| DbError::InvalidState("Statement is not prepared".to_string()))?;
        let count = handle.bind_parameter_count();
        if index >= count {
            return Err(DbError::InvalidState(format!(
                "Parameter index {} out of range ({} parameter(s))",
                index, count
            )));
        }
        Ok(handle)
    }
}

impl Statement for SqliteStatement<'_> {
    fn prepare(&mut self, sql: &str) -> Result<()> {
        self.compile(sql)?;
        let count = self.results.handles().len();
        if count != 1 {
            self.results.load(Vec::new());
            return Err(DbError::Validation(format!(
                "prepare expects a single statement, got {}",
                count
            )));
        }
        self.prepared = true;
        Ok(())
    }

    fn call(&mut self, _procedure: &str) -> Result<()> {
        Err(DbError::Unsupported(
            "call(): Stored procedures are not supported by database".to_string(),
        ))
    }

    fn execute_sql(&mut self, sql: &str) -> Result<&mut dyn ResultSet> {
        self.compile(sql)?;
        self.run()
    }

    fn execute(&mut self) -> Result<&mut dyn ResultSet> {
        if self.results.handles().is_empty() {
            return Err(DbError::InvalidState("SQL command is not set".to_string()));
        }
        self.results.cancel_all();
        self.run()
    }

    fn results(&mut self) -> &mut dyn ResultSet {
        &mut self.results
    }

    fn cancel(&mut self) -> Result<()> {
        log::debug!("Cancelling current SQLite result");
        self.results.cancel_current();
        Ok(())
    }

    fn cancel_all(&mut self) -> Result<()> {
        log::debug!("Cancelling all SQLite results");
        self.results.cancel_all();
        Ok(())
    }

    fn param_count(&self) -> usize {
        if !self.prepared {
            return 0;
        }
        self.results
            .handles()
            .first()
            .map(|h| h.bind_parameter_count())
            .unwrap_or(0)
    }

    fn bind_value(&mut self, index: usize, value: Value) -> Result<()> {
        let handle = self.prepared_handle(index)?;
        marshal::bind(handle, index, &value)
    }

    fn set_null(&mut self, index: usize) -> Result<()> {
        self.prepared_handle(index)?.bind_null(index)
    }

    fn proc_retval(&mut self) -> Result<i32> {
        Err(DbError::Unsupported(
            "proc_retval(): Stored procedures are not supported by database".to_string(),
        ))
    }
}

impl Drop for SqliteStatement<'_> {
    fn drop(&mut self) {
        self.results.cancel_all();
    }
}
