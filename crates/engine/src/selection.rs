//! Rectangular selections and anchor-aware expansion.
//!
//! A selection is bound to the cursor at the same index in the editor. The
//! cursor marks the active end: expanding toward the cursor's side grows the
//! range, expanding away from it shrinks the range from that side first.

use serde::{Deserialize, Serialize};

use tabula_core::{Point, Range};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    id: u64,
    range: Range,
}

impl Selection {
    pub fn new(id: u64, range: Range) -> Self {
        Self { id, range }
    }

    /// Shared with the cursor at the same index.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn range(&self) -> Range {
        self.range
    }

    pub(crate) fn set_range(&mut self, range: Range) -> Option<Range> {
        if range == self.range {
            return None;
        }
        Some(std::mem::replace(&mut self.range, range))
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    pub fn spans_more_than_one_cell(&self) -> bool {
        self.range.span_more_than_one_cell()
    }

    pub fn first_selected_row(&self) -> usize {
        self.range.start.row
    }

    pub fn last_selected_row(&self) -> usize {
        self.range.end.row.saturating_sub(1)
    }

    pub fn first_selected_column(&self) -> usize {
        self.range.start.column
    }

    pub fn last_selected_column(&self) -> usize {
        self.range.end.column.saturating_sub(1)
    }

    // -------------------------------------------------------------------------
    // Anchor side
    // -------------------------------------------------------------------------

    /// The cursor sits on the last row of a multi-row selection.
    pub fn expanded_up(&self, cursor: Point) -> bool {
        cursor.row == self.last_selected_row() && cursor.row != self.first_selected_row()
    }

    /// The cursor sits on the first row of a multi-row selection.
    pub fn expanded_down(&self, cursor: Point) -> bool {
        cursor.row == self.first_selected_row() && cursor.row != self.last_selected_row()
    }

    pub fn expanded_left(&self, cursor: Point) -> bool {
        cursor.column == self.last_selected_column() && cursor.column != self.first_selected_column()
    }

    pub fn expanded_right(&self, cursor: Point) -> bool {
        cursor.column == self.first_selected_column() && cursor.column != self.last_selected_column()
    }

    // -------------------------------------------------------------------------
    // Expansion, each returning the new range
    // -------------------------------------------------------------------------

    pub fn expand_up(&self, delta: usize, cursor: Point) -> Range {
        let mut range = self.range;
        if self.expanded_down(cursor) {
            let first = self.first_selected_row();
            match range.end.row.checked_sub(delta) {
                Some(row) if row > first => range.end.row = row,
                row => {
                    range.end.row = first + 1;
                    range.start.row = row.unwrap_or(0);
                }
            }
        } else {
            range.start.row = range.start.row.saturating_sub(delta);
        }
        range
    }

    pub fn expand_down(&self, delta: usize, cursor: Point, row_count: usize) -> Range {
        let mut range = self.range;
        if self.expanded_up(cursor) {
            let row = range.start.row + delta;
            if row >= range.end.row {
                range.start.row = self.last_selected_row();
                range.end.row = row_count.min(row).max(range.end.row);
            } else {
                range.start.row = row;
            }
        } else {
            range.end.row = row_count.min(range.end.row + delta).max(range.end.row);
        }
        range
    }

    pub fn expand_left(&self, delta: usize, cursor: Point) -> Range {
        let mut range = self.range;
        if self.expanded_right(cursor) {
            let first = self.first_selected_column();
            match range.end.column.checked_sub(delta) {
                Some(column) if column > first => range.end.column = column,
                column => {
                    range.end.column = first + 1;
                    range.start.column = column.unwrap_or(0);
                }
            }
        } else {
            range.start.column = range.start.column.saturating_sub(delta);
        }
        range
    }

    pub fn expand_right(&self, delta: usize, cursor: Point, column_count: usize) -> Range {
        let mut range = self.range;
        if self.expanded_left(cursor) {
            let column = range.start.column + delta;
            if column >= range.end.column {
                range.start.column = self.last_selected_column();
                range.end.column = column_count.min(column).max(range.end.column);
            } else {
                range.start.column = column;
            }
        } else {
            range.end.column = column_count.min(range.end.column + delta).max(range.end.column);
        }
        range
    }

    pub fn expand_to_top(&self, cursor: Point) -> Range {
        let mut range = self.range;
        if self.expanded_down(cursor) {
            range.end.row = range.start.row + 1;
        }
        range.start.row = 0;
        range
    }

    pub fn expand_to_bottom(&self, cursor: Point, row_count: usize) -> Range {
        let mut range = self.range;
        if self.expanded_up(cursor) {
            range.start.row = self.last_selected_row();
        }
        range.end.row = row_count.max(range.start.row);
        range
    }

    pub fn expand_to_left(&self, cursor: Point) -> Range {
        let mut range = self.range;
        if self.expanded_right(cursor) {
            range.end.column = range.start.column + 1;
        }
        range.start.column = 0;
        range
    }

    pub fn expand_to_right(&self, cursor: Point, column_count: usize) -> Range {
        let mut range = self.range;
        if self.expanded_left(cursor) {
            range.start.column = self.last_selected_column();
        }
        range.end.column = column_count.max(range.start.column);
        range
    }

    /// The range grown, never shrunk, to fit a pasted block of
    /// `rows` x `columns` anchored at the selection start.
    pub fn fitted_to(&self, rows: usize, columns: usize) -> Range {
        let mut range = self.range;
        if rows > range.row_count() {
            range.end.row = range.start.row + rows;
        }
        if columns > range.column_count() {
            range.end.column = range.start.column + columns;
        }
        range
    }
}
