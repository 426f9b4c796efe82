//! Cursor positions and the wrapping moves applied to them.
//!
//! A cursor is plain data: the editor owns every cursor in a vec aligned
//! index-for-index with its selections, so the cursor at index `i` and the
//! selection at index `i` are one pair and are created and removed together.
//! Movement functions are pure; they take the bounding range and return the
//! new position without touching the editor.

use serde::{Deserialize, Serialize};

use tabula_core::{Point, Range};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    id: u64,
    position: Point,
}

impl Cursor {
    pub fn new(id: u64, position: Point) -> Self {
        Self { id, position }
    }

    /// Shared with the selection at the same index.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Screen position.
    pub fn position(&self) -> Point {
        self.position
    }

    pub(crate) fn set_position(&mut self, position: Point) -> Option<Point> {
        if position == self.position {
            return None;
        }
        Some(std::mem::replace(&mut self.position, position))
    }

    /// The single-cell range under the cursor, clipped to a table of
    /// `rows` x `columns`.
    pub fn range(&self, rows: usize, columns: usize) -> Range {
        Range {
            start: self.position,
            end: Point::new(
                rows.min(self.position.row + 1).max(self.position.row),
                columns.min(self.position.column + 1).max(self.position.column),
            ),
        }
    }

    // =========================================================================
    // Moves within a range
    // =========================================================================

    /// Up by `delta`; past the first row wraps to the last.
    pub fn up_in(&self, delta: usize, range: Range) -> Point {
        let row = match self.position.row.checked_sub(delta) {
            Some(row) if row >= range.start.row => row,
            _ => last(range.end.row, range.start.row),
        };
        Point::new(row, self.position.column)
    }

    /// Down by `delta`; past the last row wraps to the first.
    pub fn down_in(&self, delta: usize, range: Range) -> Point {
        let mut row = self.position.row + delta;
        if row >= range.end.row {
            row = range.start.row;
        }
        Point::new(row, self.position.column)
    }

    /// Left by `delta`; past the first column wraps to the last column of
    /// the previous row, and past the first row to the last row.
    pub fn left_in(&self, delta: usize, range: Range) -> Point {
        match self.position.column.checked_sub(delta) {
            Some(column) if column >= range.start.column => Point::new(self.position.row, column),
            _ => {
                let row = match self.position.row.checked_sub(1) {
                    Some(row) if row >= range.start.row => row,
                    _ => last(range.end.row, range.start.row),
                };
                Point::new(row, last(range.end.column, range.start.column))
            }
        }
    }

    /// Right by `delta`; past the last column wraps to the first column of
    /// the next row, and past the last row to the first row.
    pub fn right_in(&self, delta: usize, range: Range) -> Point {
        let column = self.position.column + delta;
        if column < range.end.column {
            return Point::new(self.position.row, column);
        }
        let mut row = self.position.row + 1;
        if row >= range.end.row {
            row = range.start.row;
        }
        Point::new(row, range.start.column)
    }

    // =========================================================================
    // Absolute moves within a table
    // =========================================================================

    pub fn to_top(&self) -> Point {
        Point::new(0, self.position.column)
    }

    pub fn to_bottom(&self, rows: usize) -> Point {
        Point::new(rows.saturating_sub(1), self.position.column)
    }

    pub fn to_left(&self) -> Point {
        Point::new(self.position.row, 0)
    }

    pub fn to_right(&self, columns: usize) -> Point {
        Point::new(self.position.row, columns.saturating_sub(1))
    }

    /// Page moves clamp instead of wrapping.
    pub fn page_up(&self, amount: usize) -> Point {
        Point::new(self.position.row.saturating_sub(amount), self.position.column)
    }

    pub fn page_down(&self, amount: usize, rows: usize) -> Point {
        Point::new(
            (self.position.row + amount).min(rows.saturating_sub(1)),
            self.position.column,
        )
    }

    pub fn page_left(&self, amount: usize) -> Point {
        Point::new(self.position.row, self.position.column.saturating_sub(amount))
    }

    pub fn page_right(&self, amount: usize, columns: usize) -> Point {
        Point::new(
            self.position.row,
            (self.position.column + amount).min(columns.saturating_sub(1)),
        )
    }
}

/// Last index of `[start, end)`, or `start` when the span is empty.
fn last(end: usize, start: usize) -> usize {
    end.saturating_sub(1).max(start)
}
