use super::ffi::{RawStmt, StepResult, StorageClass};
use super::marshal;
use crate::engine::{EventSource, ResultEvent, ResultSet, Sequencer, VisibleKind};
use crate::error::{DbError, Result};
use crate::observability::SharedMetrics;
use crate::protocol::{ColumnDescriptor, LogicalType, NativeType, Value};

/// The compiled sub-statements of one execution, stepped in order.
pub(crate) struct SqliteEvents<'c> {
    pub(crate) handles: Vec<RawStmt<'c>>,
    /// Next handle to run.
    next: usize,
    /// Handle owning the visible result.
    current: Option<usize>,
    /// The visible result's handle returned SQLITE_DONE.
    done: bool,
}

impl<'c> SqliteEvents<'c> {
    fn new() -> Self {
        Self {
            handles: Vec::new(),
            next: 0,
            current: None,
            done: false,
        }
    }

    fn rewind(&mut self) {
        for handle in &self.handles {
            handle.reset();
        }
        self.next = 0;
        self.current = None;
        self.done = false;
    }

    fn current_handle(&self) -> Result<&RawStmt<'c>> {
        self.current
            .and_then(|i| self.handles.get(i))
            .ok_or_else(|| DbError::InvalidState("Invalid result set state".to_string()))
    }

    /// Steps the visible result's handle; returns the number of rows read.
    fn step_current(&mut self) -> Result<usize> {
        if self.done {
            return Ok(0);
        }
        let handle = self.current_handle()?;
        match handle.step() {
            Ok(StepResult::Row) => Ok(1),
            Ok(StepResult::Done) => {
                handle.reset();
                self.done = true;
                Ok(0)
            }
            Err(e) => {
                handle.reset();
                self.done = true;
                Err(e)
            }
        }
    }
}

impl EventSource for SqliteEvents<'_> {
    fn next_event(&mut self) -> Result<ResultEvent> {
        // A partly read result keeps its read lock until reset.
        if let Some(handle) = self.current.take().and_then(|i| self.handles.get(i)) {
            handle.reset();
        }
        let Some(handle) = self.handles.get(self.next) else {
            return Ok(ResultEvent::End);
        };
        let index = self.next;
        self.next += 1;

        let before = handle.db().total_changes();
        let step = handle.step();
        if handle.column_count() > 0 {
            return Ok(match step {
                Ok(StepResult::Row) => {
                    self.current = Some(index);
                    self.done = false;
                    ResultEvent::Rows { primed: true }
                }
                Ok(StepResult::Done) => {
                    handle.reset();
                    self.current = Some(index);
                    self.done = true;
                    ResultEvent::Rows { primed: false }
                }
                Err(e) => {
                    handle.reset();
                    ResultEvent::Failure { message: e.message() }
                }
            });
        }

        let event = match step {
            Ok(_) => ResultEvent::Completion {
                rows: if handle.db().total_changes() != before {
                    handle.db().changes()
                } else {
                    0
                },
            },
            Err(e) => ResultEvent::Failure { message: e.message() },
        };
        handle.reset();
        Ok(event)
    }

    fn describe(&mut self, _kind: VisibleKind) -> Result<Vec<ColumnDescriptor>> {
        let handle = self.current_handle()?;
        Ok((0..handle.column_count())
            .map(|i| {
                let decltype = handle.column_decltype(i);
                ColumnDescriptor::new(
                    handle.column_name(i),
                    NativeType::from_sqlite_decltype(decltype.as_deref()),
                    0,
                )
            })
            .collect())
    }
}

/// Result stream of a [`super::SqliteStatement`].
///
/// Only forward-only iteration is available.
pub struct SqliteResults<'c> {
    pub(crate) source: SqliteEvents<'c>,
    pub(crate) sequencer: Sequencer,
    metrics: SharedMetrics,
}

impl<'c> SqliteResults<'c> {
    pub(crate) fn new(metrics: SharedMetrics) -> Self {
        Self {
            source: SqliteEvents::new(),
            sequencer: Sequencer::new(),
            metrics,
        }
    }

    /// Replaces the compiled handles; the previous ones are finalized.
    pub(crate) fn load(&mut self, handles: Vec<RawStmt<'c>>) {
        self.sequencer = Sequencer::new();
        self.source = SqliteEvents::new();
        self.source.handles = handles;
    }

    pub(crate) fn handles(&self) -> &[RawStmt<'c>] {
        &self.source.handles
    }

    /// Resets every handle and lands on the first visible result.
    pub(crate) fn start(&mut self) -> Result<bool> {
        self.source.rewind();
        self.sequencer.start(&mut self.source)
    }

    pub(crate) fn cancel_current(&mut self) {
        if let Some(index) = self.source.current.take() {
            if let Some(handle) = self.source.handles.get(index) {
                handle.reset();
            }
        }
        self.source.done = true;
        self.sequencer.clear_current();
    }

    pub(crate) fn cancel_all(&mut self) {
        for handle in &self.source.handles {
            handle.reset();
        }
        self.source.next = self.source.handles.len();
        self.source.current = None;
        self.source.done = true;
        self.sequencer.finish();
    }

    fn row_handle(&self, index: usize) -> Result<&RawStmt<'c>> {
        let current = self
            .sequencer
            .current()
            .ok_or_else(|| DbError::InvalidState("No visible result".to_string()))?;
        if !current.cursor.on_row() {
            return Err(DbError::InvalidState("Cursor is not positioned on a row".to_string()));
        }
        if index >= current.columns.len() {
            return Err(DbError::InvalidState(format!(
                "Column index {} out of range ({} column(s))",
                index,
                current.columns.len()
            )));
        }
        self.source.current_handle()
    }

    fn no_cursor(op: &str) -> DbError {
        DbError::Unsupported(format!("{}(): Cursors are not supported by database", op))
    }
}

impl ResultSet for SqliteResults<'_> {
    fn has_data(&self) -> bool {
        self.sequencer.has_data()
    }

    fn more_results(&mut self) -> Result<bool> {
        self.sequencer.more_results(&mut self.source)
    }

    fn row_count(&self) -> usize {
        self.sequencer
            .current()
            .map(|r| r.cursor.row_count())
            .unwrap_or(0)
    }

    fn rows_affected(&self) -> u64 {
        self.sequencer.rows_affected()
    }

    fn column_count(&self) -> usize {
        self.sequencer.current().map(|r| r.columns.len()).unwrap_or(0)
    }

    fn column_name(&self, index: usize) -> Result<&str> {
        self.column(index).map(|c| c.name.as_str())
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.sequencer.current()?.columns.index_of(name)
    }

    fn column(&self, index: usize) -> Result<&ColumnDescriptor> {
        self.sequencer
            .current()
            .and_then(|r| r.columns.get(index))
            .ok_or_else(|| DbError::InvalidState(format!("Column index {} out of range", index)))
    }

    fn next(&mut self) -> Result<bool> {
        let Some(current) = self.sequencer.current_mut() else {
            return Ok(false);
        };
        let source = &mut self.source;
        let moved = current.cursor.next(|_| source.step_current())?;
        if moved {
            self.metrics.record_rows(1);
        }
        Ok(moved)
    }

    fn prev(&mut self) -> Result<bool> {
        Err(Self::no_cursor("prev"))
    }

    fn first(&mut self) -> Result<bool> {
        Err(Self::no_cursor("first"))
    }

    fn last(&mut self) -> Result<bool> {
        Err(Self::no_cursor("last"))
    }

    fn is_null(&self, index: usize) -> Result<bool> {
        Ok(self.row_handle(index)?.column_type(index) == StorageClass::Null)
    }

    fn value(&self, index: usize, kind: LogicalType) -> Result<Value> {
        marshal::read(self.row_handle(index)?, index, kind)
    }
}
