//! Row positioning for a visible result.
//!
//! The cursor never touches native handles itself: each move asks the
//! engine to fetch in a given [`Orientation`] and records where that left
//! the result.

use crate::error::{DbError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorMode {
    #[default]
    ForwardOnly,
    Scrollable,
}

/// Direction handed to the native fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Next,
    Prior,
    First,
    Last,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    BeforeFirst,
    /// 1-based ordinal counted from the first row.
    FromStart(usize),
    /// 1-based distance from the last row.
    FromEnd(usize),
    AfterLast,
}

#[derive(Debug, Clone)]
pub struct RowCursor {
    mode: CursorMode,
    position: Position,
    total: Option<usize>,
    rows_seen: usize,
    primed: bool,
}

impl RowCursor {
    pub fn new(mode: CursorMode) -> Self {
        Self {
            mode,
            position: Position::BeforeFirst,
            total: None,
            rows_seen: 0,
            primed: false,
        }
    }

    /// A cursor whose first row was already produced by the native layer.
    pub fn primed(mode: CursorMode) -> Self {
        Self {
            primed: true,
            ..Self::new(mode)
        }
    }

    pub fn mode(&self) -> CursorMode {
        self.mode
    }

    pub fn is_primed(&self) -> bool {
        self.primed
    }

    /// True once any row has been produced or one is waiting to be consumed.
    pub fn has_data(&self) -> bool {
        self.primed || self.rows_seen > 0
    }

    /// True when a row is current.
    pub fn on_row(&self) -> bool {
        matches!(self.position, Position::FromStart(_) | Position::FromEnd(_))
    }

    /// 1-based ordinal of the current row, or rows read once past the end.
    pub fn row_count(&self) -> usize {
        match self.position {
            Position::BeforeFirst => 0,
            Position::FromStart(n) => n,
            Position::FromEnd(k) => match self.total {
                Some(total) => total + 1 - k,
                None => k,
            },
            Position::AfterLast => self.total.unwrap_or(self.rows_seen),
        }
    }

    pub fn next<F>(&mut self, fetch: F) -> Result<bool>
    where
        F: FnOnce(Orientation) -> Result<usize>,
    {
        if self.primed {
            self.primed = false;
            self.rows_seen += 1;
            self.position = Position::FromStart(1);
            return Ok(true);
        }
        if self.position == Position::AfterLast {
            return Ok(false);
        }
        let read = fetch(Orientation::Next)?;
        self.position = match (self.position, read) {
            (Position::BeforeFirst, 0) => {
                self.total = Some(0);
                Position::AfterLast
            }
            (Position::BeforeFirst, n) => Position::FromStart(n),
            (Position::FromStart(at), 0) => {
                self.total = Some(at);
                Position::AfterLast
            }
            (Position::FromStart(at), n) => Position::FromStart(at + n),
            (Position::FromEnd(_), 0) => Position::AfterLast,
            (Position::FromEnd(k), n) if k > n => Position::FromEnd(k - n),
            (Position::FromEnd(_), _) => Position::AfterLast,
            (Position::AfterLast, _) => Position::AfterLast,
        };
        self.rows_seen += read;
        self.normalize();
        Ok(self.on_row())
    }

    pub fn prev<F>(&mut self, fetch: F) -> Result<bool>
    where
        F: FnOnce(Orientation) -> Result<usize>,
    {
        self.require_scrollable("prev")?;
        if self.position == Position::BeforeFirst {
            return Ok(false);
        }
        let read = fetch(Orientation::Prior)?;
        self.position = match (self.position, read) {
            (Position::FromStart(1), _) | (_, 0) => {
                if let Position::FromEnd(k) = self.position {
                    self.total = Some(k);
                }
                Position::BeforeFirst
            }
            (Position::FromStart(at), _) => Position::FromStart(at - 1),
            (Position::FromEnd(k), _) => Position::FromEnd(k + 1),
            (Position::AfterLast, _) => Position::FromEnd(1),
            (Position::BeforeFirst, _) => Position::BeforeFirst,
        };
        if read > 0 {
            self.rows_seen = self.rows_seen.max(1);
        }
        self.normalize();
        Ok(self.on_row())
    }

    pub fn first<F>(&mut self, fetch: F) -> Result<bool>
    where
        F: FnOnce(Orientation) -> Result<usize>,
    {
        self.require_scrollable("first")?;
        self.primed = false;
        if fetch(Orientation::First)? == 0 {
            self.total = Some(0);
            self.position = Position::BeforeFirst;
            return Ok(false);
        }
        self.rows_seen = self.rows_seen.max(1);
        self.position = Position::FromStart(1);
        Ok(true)
    }

    /// Moves to the last row. The first call on a result of unknown size
    /// counts the rows back to the first one, then fetches the last again.
    pub fn last<F>(&mut self, mut fetch: F) -> Result<bool>
    where
        F: FnMut(Orientation) -> Result<usize>,
    {
        self.require_scrollable("last")?;
        self.primed = false;
        if fetch(Orientation::Last)? == 0 {
            self.total = Some(0);
            self.position = Position::AfterLast;
            return Ok(false);
        }
        if self.total.is_none() {
            let mut total = 1;
            while fetch(Orientation::Prior)? > 0 {
                total += 1;
            }
            if fetch(Orientation::Last)? == 0 {
                return Err(DbError::InvalidState(
                    "Cursor lost its last row while counting".to_string(),
                ));
            }
            self.total = Some(total);
        }
        self.rows_seen = self.rows_seen.max(1);
        self.position = Position::FromEnd(1);
        self.normalize();
        Ok(true)
    }

    fn require_scrollable(&self, op: &str) -> Result<()> {
        match self.mode {
            CursorMode::Scrollable => Ok(()),
            CursorMode::ForwardOnly => Err(DbError::Unsupported(format!(
                "{}() on a forward-only cursor",
                op
            ))),
        }
    }

    fn normalize(&mut self) {
        if let (Position::FromEnd(k), Some(total)) = (self.position, self.total) {
            self.position = if k > total {
                Position::BeforeFirst
            } else {
                Position::FromStart(total + 1 - k)
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scroll fetch over `rows` rows, tracking the native position.
    struct Native {
        rows: usize,
        at: isize,
    }

    impl Native {
        fn new(rows: usize) -> Self {
            Self { rows, at: 0 }
        }

        fn fetch(&mut self, orientation: Orientation) -> Result<usize> {
            let last = self.rows as isize;
            self.at = match orientation {
                Orientation::Next => (self.at + 1).min(last + 1),
                Orientation::Prior => (self.at - 1).max(0),
                Orientation::First => 1,
                Orientation::Last => last,
            };
            Ok(usize::from(self.at >= 1 && self.at <= last))
        }
    }

    #[test]
    fn test_forward_only_rejects_scrolling() {
        let mut cursor = RowCursor::new(CursorMode::ForwardOnly);
        let mut native = Native::new(3);
        assert!(cursor.prev(|o| native.fetch(o)).unwrap_err().is_unsupported());
        assert!(cursor.first(|o| native.fetch(o)).unwrap_err().is_unsupported());
        assert!(cursor.last(|o| native.fetch(o)).unwrap_err().is_unsupported());
    }

    #[test]
    fn test_forward_walk_counts_rows() {
        let mut cursor = RowCursor::new(CursorMode::ForwardOnly);
        let mut native = Native::new(2);
        assert!(!cursor.has_data());
        assert!(cursor.next(|o| native.fetch(o)).unwrap());
        assert_eq!(cursor.row_count(), 1);
        assert!(cursor.next(|o| native.fetch(o)).unwrap());
        assert!(!cursor.next(|o| native.fetch(o)).unwrap());
        assert_eq!(cursor.row_count(), 2);
        assert!(!cursor.next(|_| panic!("no fetch past the end")).unwrap());
        assert!(cursor.has_data());
    }

    #[test]
    fn test_primed_cursor_consumes_first_row_without_fetch() {
        let mut cursor = RowCursor::primed(CursorMode::ForwardOnly);
        assert!(cursor.has_data());
        assert!(cursor.next(|_| panic!("primed row needs no fetch")).unwrap());
        assert_eq!(cursor.row_count(), 1);
    }

    #[test]
    fn test_scrollable_symmetry() {
        let mut cursor = RowCursor::new(CursorMode::Scrollable);
        let mut native = Native::new(4);
        for expected in 1..=4 {
            assert!(cursor.next(|o| native.fetch(o)).unwrap());
            assert_eq!(cursor.row_count(), expected);
        }
        assert!(!cursor.next(|o| native.fetch(o)).unwrap());
        for expected in (1..=4).rev() {
            assert!(cursor.prev(|o| native.fetch(o)).unwrap());
            assert_eq!(cursor.row_count(), expected);
        }
        assert!(!cursor.prev(|o| native.fetch(o)).unwrap());
        assert_eq!(cursor.row_count(), 0);
    }

    #[test]
    fn test_first_and_last_with_known_total() {
        let mut cursor = RowCursor::new(CursorMode::Scrollable);
        let mut native = Native::new(3);
        while cursor.next(|o| native.fetch(o)).unwrap() {}
        assert!(cursor.first(|o| native.fetch(o)).unwrap());
        assert_eq!(cursor.row_count(), 1);
        assert!(cursor.last(|o| native.fetch(o)).unwrap());
        assert_eq!(cursor.row_count(), 3);
        assert!(cursor.prev(|o| native.fetch(o)).unwrap());
        assert_eq!(cursor.row_count(), 2);
    }

    /// Counts every native fetch.
    struct Counting {
        native: Native,
        fetches: usize,
    }

    impl Counting {
        fn fetch(&mut self, orientation: Orientation) -> Result<usize> {
            self.fetches += 1;
            self.native.fetch(orientation)
        }
    }

    #[test]
    fn test_last_resolves_forward_ordinals() {
        let mut cursor = RowCursor::new(CursorMode::Scrollable);
        let mut native = Native::new(5);
        assert!(cursor.last(|o| native.fetch(o)).unwrap());
        assert_eq!(cursor.row_count(), 5);
        assert!(cursor.prev(|o| native.fetch(o)).unwrap());
        assert_eq!(cursor.row_count(), 4);
        assert!(cursor.next(|o| native.fetch(o)).unwrap());
        assert_eq!(cursor.row_count(), 5);
        assert!(!cursor.next(|o| native.fetch(o)).unwrap());
    }

    #[test]
    fn test_last_counts_rows_only_once() {
        let mut cursor = RowCursor::new(CursorMode::Scrollable);
        let mut native = Counting {
            native: Native::new(3),
            fetches: 0,
        };
        assert!(cursor.last(|o| native.fetch(o)).unwrap());
        assert_eq!(native.fetches, 5);
        assert!(cursor.first(|o| native.fetch(o)).unwrap());
        native.fetches = 0;
        assert!(cursor.last(|o| native.fetch(o)).unwrap());
        assert_eq!(native.fetches, 1);
        assert_eq!(cursor.row_count(), 3);
    }

    #[test]
    fn test_single_row_last() {
        let mut cursor = RowCursor::new(CursorMode::Scrollable);
        let mut native = Native::new(1);
        assert!(cursor.last(|o| native.fetch(o)).unwrap());
        assert_eq!(cursor.row_count(), 1);
        assert!(!cursor.prev(|o| native.fetch(o)).unwrap());
        assert_eq!(cursor.row_count(), 0);
    }

    #[test]
    fn test_walking_back_from_end_learns_total() {
        let mut cursor = RowCursor::new(CursorMode::Scrollable);
        let mut native = Native::new(2);
        assert!(cursor.last(|o| native.fetch(o)).unwrap());
        assert!(cursor.prev(|o| native.fetch(o)).unwrap());
        assert!(!cursor.prev(|o| native.fetch(o)).unwrap());
        assert!(cursor.last(|o| native.fetch(o)).unwrap());
        assert_eq!(cursor.row_count(), 2);
    }

    #[test]
    fn test_empty_result() {
        let mut cursor = RowCursor::new(CursorMode::Scrollable);
        let mut native = Native::new(0);
        assert!(!cursor.first(|o| native.fetch(o)).unwrap());
        assert!(!cursor.last(|o| native.fetch(o)).unwrap());
        assert!(!cursor.has_data());
        assert_eq!(cursor.row_count(), 0);
    }
}
