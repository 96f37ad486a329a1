use super::ctlib::{failure_messages, CancelKind, CtCommand, CtResultType};
use crate::engine::{
    CursorMode, EventSource, LandedResult, ResultEvent, ResultSet, RowCursor, Sequencer,
    VisibleKind,
};
use crate::error::{DbError, Result};
use crate::observability::SharedMetrics;
use crate::protocol::marshal;
use crate::protocol::{ColumnDescriptor, ColumnSet, LogicalType, Value, ValueBuffer};

/// Translates `ct_results` into sequencer events.
pub(crate) struct SybaseEvents<'c> {
    pub(crate) cmd: Box<dyn CtCommand + 'c>,
    /// Descriptors fetched when a result was announced.
    described: Option<Vec<ColumnDescriptor>>,
    /// The previous result carried rows, so the next CMD_DONE closes it.
    after_data: bool,
    last_was_cursor: bool,
    pub(crate) cursor_mode: CursorMode,
    /// A send happened and END_RESULTS has not been seen yet.
    pub(crate) outstanding: bool,
    /// CANCEL_CURRENT is allowed once per landed result.
    pub(crate) armed: bool,
}

impl<'c> SybaseEvents<'c> {
    fn new(cmd: Box<dyn CtCommand + 'c>) -> Self {
        Self {
            cmd,
            described: None,
            after_data: false,
            last_was_cursor: false,
            cursor_mode: CursorMode::ForwardOnly,
            outstanding: false,
            armed: false,
        }
    }

    fn announce(&mut self, compute: bool) -> Result<usize> {
        let mut columns = self.cmd.describe()?;
        if compute {
            for (i, column) in columns.iter_mut().enumerate() {
                let (op, base) = self.cmd.compute_info(i)?;
                column.name = op.synthesize_name(&base);
            }
        }
        let count = columns.len();
        self.described = Some(columns);
        self.after_data = true;
        self.armed = true;
        Ok(count)
    }
}

impl EventSource for SybaseEvents<'_> {
    fn next_event(&mut self) -> Result<ResultEvent> {
        let result = self.cmd.results()?;
        self.last_was_cursor = result == CtResultType::Cursor;
        Ok(match result {
            CtResultType::Row | CtResultType::Cursor => {
                self.announce(false)?;
                ResultEvent::Rows { primed: false }
            }
            CtResultType::Compute => {
                self.announce(true)?;
                ResultEvent::Compute
            }
            CtResultType::Param => ResultEvent::ParamStatus {
                columns: self.announce(false)?,
                status: false,
            },
            CtResultType::Status => ResultEvent::ParamStatus {
                columns: self.announce(false)?,
                status: true,
            },
            CtResultType::CmdSucceed => {
                self.after_data = false;
                ResultEvent::Completion { rows: 0 }
            }
            CtResultType::CmdDone => {
                if std::mem::take(&mut self.after_data) {
                    ResultEvent::Completion { rows: 0 }
                } else {
                    ResultEvent::Completion {
                        rows: self.cmd.row_count()?,
                    }
                }
            }
            CtResultType::CmdFail => {
                self.after_data = false;
                ResultEvent::Failure {
                    message: failure_messages(self.cmd.as_mut()).join(" "),
                }
            }
            CtResultType::EndResults | CtResultType::Canceled => {
                self.outstanding = false;
                self.armed = false;
                ResultEvent::End
            }
        })
    }

    fn describe(&mut self, _kind: VisibleKind) -> Result<Vec<ColumnDescriptor>> {
        self.described
            .take()
            .ok_or_else(|| DbError::Internal("result announced without descriptors".to_string()))
    }

    fn bind(&mut self, columns: &ColumnSet) -> Result<()> {
        self.cmd.bind(columns)
    }

    fn cursor_mode(&self) -> CursorMode {
        if self.last_was_cursor {
            self.cursor_mode
        } else {
            CursorMode::ForwardOnly
        }
    }
}

/// Result stream of a [`super::SybaseStatement`].
pub struct SybaseResults<'c> {
    pub(crate) source: SybaseEvents<'c>,
    pub(crate) sequencer: Sequencer,
    retval: Option<i32>,
    metrics: SharedMetrics,
}

impl<'c> SybaseResults<'c> {
    pub(crate) fn new(cmd: Box<dyn CtCommand + 'c>, metrics: SharedMetrics) -> Self {
        Self {
            source: SybaseEvents::new(cmd),
            sequencer: Sequencer::new(),
            retval: None,
            metrics,
        }
    }

    /// Lands on the first visible result of a command just sent.
    pub(crate) fn start(&mut self, cursor_mode: CursorMode) -> Result<bool> {
        self.retval = None;
        self.source.cursor_mode = cursor_mode;
        self.source.outstanding = true;
        self.source.armed = true;
        self.sequencer.start(&mut self.source)
    }

    pub(crate) fn cancel_current(&mut self) -> Result<()> {
        let armed = std::mem::take(&mut self.source.armed);
        self.sequencer.clear_current();
        if armed && self.source.outstanding {
            self.source.cmd.cancel(CancelKind::Current)?;
        }
        Ok(())
    }

    pub(crate) fn cancel_all(&mut self) -> Result<()> {
        self.source.armed = false;
        self.sequencer.finish();
        if std::mem::take(&mut self.source.outstanding) {
            self.source.cmd.cancel(CancelKind::All)?;
        }
        Ok(())
    }

    /// Return status of the procedure call, draining results until it shows up.
    pub(crate) fn return_status(&mut self) -> Result<i32> {
        loop {
            if let Some(status) = self.retval {
                return Ok(status);
            }
            let on_status = self
                .sequencer
                .current()
                .is_some_and(|r| r.kind == VisibleKind::Status);
            if on_status && self.next()? {
                continue;
            }
            if !self.more_results()? {
                return self.retval.ok_or_else(|| {
                    DbError::InvalidState("No return status in results".to_string())
                });
            }
        }
    }

    fn landed(&self) -> Result<&LandedResult> {
        self.sequencer
            .current()
            .ok_or_else(|| DbError::InvalidState("No visible result".to_string()))
    }

    fn cell(&self, index: usize) -> Result<(&ColumnDescriptor, &ValueBuffer)> {
        let landed = self.landed()?;
        if !landed.cursor.on_row() {
            return Err(DbError::InvalidState("Cursor is not positioned on a row".to_string()));
        }
        match (landed.columns.get(index), landed.buffers.get(index)) {
            (Some(column), Some(buffer)) => Ok((column, buffer)),
            _ => Err(DbError::InvalidState(format!(
                "Column index {} out of range ({} column(s))",
                index,
                landed.columns.len()
            ))),
        }
    }

    fn scroll<F>(&mut self, op: F) -> Result<bool>
    where
        F: FnOnce(&mut RowCursor, &mut dyn CtCommand, &mut [ValueBuffer]) -> Result<bool>,
    {
        let Some(current) = self.sequencer.current_mut() else {
            return Ok(false);
        };
        let kind = current.kind;
        let moved = op(&mut current.cursor, self.source.cmd.as_mut(), &mut current.buffers)?;
        if !moved && current.cursor.mode() == CursorMode::ForwardOnly {
            // Drained: nothing of this result is left to cancel.
            self.source.armed = false;
        }
        if moved {
            self.metrics.record_rows(1);
            if kind == VisibleKind::Status {
                if let (Some(column), Some(buffer)) = (current.columns.get(0), current.buffers.first()) {
                    if let Value::Int(status) = marshal::decode(column, buffer, LogicalType::Int, 0)? {
                        self.retval = Some(status);
                    }
                }
            }
        }
        Ok(moved)
    }
}

impl ResultSet for SybaseResults<'_> {
    fn has_data(&self) -> bool {
        self.sequencer.has_data()
    }

    fn more_results(&mut self) -> Result<bool> {
        let landed = self.sequencer.more_results(&mut self.source)?;
        if landed {
            self.source.armed = true;
        }
        Ok(landed)
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
        self.landed()?
            .columns
            .get(index)
            .ok_or_else(|| DbError::InvalidState(format!("Column index {} out of range", index)))
    }

    fn next(&mut self) -> Result<bool> {
        self.scroll(|cursor, cmd, buffers| cursor.next(|o| cmd.fetch(o, buffers)))
    }

    fn prev(&mut self) -> Result<bool> {
        self.scroll(|cursor, cmd, buffers| cursor.prev(|o| cmd.fetch(o, buffers)))
    }

    fn first(&mut self) -> Result<bool> {
        self.scroll(|cursor, cmd, buffers| cursor.first(|o| cmd.fetch(o, buffers)))
    }

    fn last(&mut self) -> Result<bool> {
        self.scroll(|cursor, cmd, buffers| cursor.last(|o| cmd.fetch(o, buffers)))
    }

    fn is_null(&self, index: usize) -> Result<bool> {
        Ok(self.cell(index)?.1.is_null())
    }

    fn value(&self, index: usize, kind: LogicalType) -> Result<Value> {
        let (column, buffer) = self.cell(index)?;
        marshal::decode(column, buffer, kind, index)
    }
}
