//! Walks the native result stream of one execution.
//!
//! Each engine reports its stream as [`ResultEvent`]s. The sequencer folds
//! non-data events into the affected-row accumulator, records failures and
//! stops on the next result that carries columns.

use super::cursor::{CursorMode, RowCursor};
use crate::error::{DbError, Result};
use crate::protocol::{ColumnDescriptor, ColumnSet, ValueBuffer};

/// Kind of a result that becomes visible to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibleKind {
    Rows,
    /// Output parameters of a procedure call.
    Params,
    /// The return status of a procedure call.
    Status,
    /// An aggregate (compute) row.
    Compute,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResultEvent {
    /// A row result. `primed` is set when the native layer already holds
    /// the first row.
    Rows { primed: bool },
    /// A command finished; `rows` affected.
    Completion { rows: u64 },
    /// Output parameters (`status == false`) or a return status.
    ParamStatus { columns: usize, status: bool },
    Compute,
    Failure { message: String },
    /// No further results.
    End,
}

pub trait EventSource {
    fn next_event(&mut self) -> Result<ResultEvent>;

    /// Column descriptors of the result just announced.
    fn describe(&mut self, kind: VisibleKind) -> Result<Vec<ColumnDescriptor>>;

    /// Registers the landed result's buffers with the native command.
    fn bind(&mut self, _columns: &ColumnSet) -> Result<()> {
        Ok(())
    }

    fn cursor_mode(&self) -> CursorMode {
        CursorMode::ForwardOnly
    }
}

/// The result the sequencer stopped on.
#[derive(Debug)]
pub struct LandedResult {
    pub kind: VisibleKind,
    pub columns: ColumnSet,
    pub buffers: Vec<ValueBuffer>,
    pub cursor: RowCursor,
}

impl LandedResult {
    fn new(kind: VisibleKind, columns: ColumnSet, cursor: RowCursor) -> Self {
        let buffers = columns.iter().map(ValueBuffer::for_column).collect();
        Self {
            kind,
            columns,
            buffers,
            cursor,
        }
    }
}

#[derive(Debug, Default)]
pub struct Sequencer {
    current: Option<LandedResult>,
    rows_affected: u64,
    pending: bool,
    exhausted: bool,
    executed: bool,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets everything from a previous execution.
    pub fn reset(&mut self) {
        self.current = None;
        self.rows_affected = 0;
        self.pending = false;
        self.exhausted = false;
        self.executed = true;
    }

    /// Drops the visible result; the rest of the stream is untouched.
    pub fn clear_current(&mut self) {
        self.current = None;
        self.pending = false;
    }

    /// Marks the stream as fully consumed.
    pub fn finish(&mut self) {
        self.clear_current();
        self.exhausted = true;
    }

    pub fn current(&self) -> Option<&LandedResult> {
        self.current.as_ref()
    }

    pub fn current_mut(&mut self) -> Option<&mut LandedResult> {
        self.current.as_mut()
    }

    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn executed(&self) -> bool {
        self.executed
    }

    pub fn has_data(&self) -> bool {
        self.current.as_ref().is_some_and(|r| r.cursor.has_data())
    }

    /// First drain after an execution: lands on the first visible result
    /// and leaves it for the next [`Sequencer::more_results`] to acknowledge.
    pub fn start<S: EventSource + ?Sized>(&mut self, source: &mut S) -> Result<bool> {
        self.reset();
        let outcome = self.advance(source);
        self.pending = self.current.is_some();
        outcome
    }

    /// `more_results()` semantics: a landed but unacknowledged result is
    /// acknowledged without draining, otherwise the stream advances.
    pub fn more_results<S: EventSource + ?Sized>(&mut self, source: &mut S) -> Result<bool> {
        if !self.executed {
            return Err(DbError::InvalidState("statement has not been executed".to_string()));
        }
        if self.pending {
            self.pending = false;
            return Ok(true);
        }
        self.advance(source)
    }

    /// Drains events until a result with columns is visible or the stream ends.
    ///
    /// Failures do not stop the drain; once it stops they are raised as one
    /// batch failure while the landed result and the accumulator stay readable.
    pub fn advance<S: EventSource + ?Sized>(&mut self, source: &mut S) -> Result<bool> {
        self.current = None;
        self.pending = false;
        if self.exhausted {
            return Ok(false);
        }

        let mut failures: Vec<String> = Vec::new();
        loop {
            let landed = match source.next_event()? {
                ResultEvent::Rows { primed } => Some((VisibleKind::Rows, primed)),
                ResultEvent::Compute => Some((VisibleKind::Compute, false)),
                ResultEvent::ParamStatus { columns, status } if columns > 0 => {
                    let kind = if status {
                        VisibleKind::Status
                    } else {
                        VisibleKind::Params
                    };
                    Some((kind, false))
                }
                ResultEvent::ParamStatus { .. } => None,
                ResultEvent::Completion { rows } => {
                    self.rows_affected += rows;
                    None
                }
                ResultEvent::Failure { message } => {
                    log::debug!("Statement in batch failed: {}", message);
                    failures.push(message);
                    None
                }
                ResultEvent::End => {
                    self.exhausted = true;
                    break;
                }
            };

            if let Some((kind, primed)) = landed {
                let columns = ColumnSet::new(source.describe(kind)?);
                source.bind(&columns)?;
                let mode = match kind {
                    VisibleKind::Rows => source.cursor_mode(),
                    _ => CursorMode::ForwardOnly,
                };
                let cursor = if primed {
                    RowCursor::primed(mode)
                } else {
                    RowCursor::new(mode)
                };
                self.current = Some(LandedResult::new(kind, columns, cursor));
                break;
            }
        }

        if !failures.is_empty() {
            self.pending = self.current.is_some();
            log::warn!(
                "{} statement(s) failed, {} row(s) affected so far",
                failures.len(),
                self.rows_affected
            );
            return Err(DbError::BatchFailure {
                failed: failures.len(),
                message: failures.join("; "),
            });
        }
        Ok(self.current.is_some())
    }
}
