//! Points and half-open rectangular ranges.
//!
//! A [`Range`] always has `start <= end` on both axes and excludes its end
//! row and end column. Every selection, dirty region and viewport window in
//! the engine is expressed with it.

use std::cmp::Ordering;
use std::ops;

use serde::{Deserialize, Serialize};

/// A (row, column) coordinate. Ordered row first, then column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Point {
    pub row: usize,
    pub column: usize,
}

impl Point {
    pub const ZERO: Point = Point { row: 0, column: 0 };

    pub const fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }

    /// The point one row down and one column right: the exclusive end of
    /// the single-cell range starting here.
    pub const fn next_cell(self) -> Self {
        Self { row: self.row + 1, column: self.column + 1 }
    }
}

impl From<(usize, usize)> for Point {
    fn from((row, column): (usize, usize)) -> Self {
        Self { row, column }
    }
}

/// Whether touching edges count as an intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Ranges sharing only an edge do not intersect.
    Exclusive,
    /// Ranges sharing an edge intersect.
    Inclusive,
}

/// A normalized, half-open rectangle of cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Range {
    pub start: Point,
    pub end: Point,
}

impl Range {
    /// Build a range from any two corners, normalizing so start <= end.
    pub fn new(a: impl Into<Point>, b: impl Into<Point>) -> Self {
        let (a, b) = (a.into(), b.into());
        Self {
            start: Point::new(a.row.min(b.row), a.column.min(b.column)),
            end: Point::new(a.row.max(b.row), a.column.max(b.column)),
        }
    }

    /// The range covering exactly one cell.
    pub fn cell(point: impl Into<Point>) -> Self {
        let point = point.into();
        Self { start: point, end: point.next_cell() }
    }

    /// Rows `rows` across columns `columns`.
    pub fn from_spans(rows: ops::Range<usize>, columns: ops::Range<usize>) -> Self {
        Self::new((rows.start, columns.start), (rows.end, columns.end))
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// True when the range has no area on at least one axis.
    pub fn is_degenerate(&self) -> bool {
        self.row_count() == 0 || self.column_count() == 0
    }

    pub fn span_more_than_one_cell(&self) -> bool {
        self.row_count() > 1 || self.column_count() > 1
    }

    pub fn row_count(&self) -> usize {
        self.end.row - self.start.row
    }

    pub fn column_count(&self) -> usize {
        self.end.column - self.start.column
    }

    pub fn cell_count(&self) -> usize {
        self.row_count() * self.column_count()
    }

    pub fn rows(&self) -> ops::Range<usize> {
        self.start.row..self.end.row
    }

    pub fn columns(&self) -> ops::Range<usize> {
        self.start.column..self.end.column
    }

    pub fn contains_row(&self, row: usize) -> bool {
        self.start.row <= row && row < self.end.row
    }

    pub fn contains_column(&self, column: usize) -> bool {
        self.start.column <= column && column < self.end.column
    }

    pub fn contains_point(&self, point: impl Into<Point>) -> bool {
        let point = point.into();
        self.contains_row(point.row) && self.contains_column(point.column)
    }

    /// Both the first cell and the last cell of `other` lie inside `self`.
    ///
    /// An `other` with no area has no last cell and is never contained.
    pub fn contains_range(&self, other: &Range) -> bool {
        let last = match (other.end.row.checked_sub(1), other.end.column.checked_sub(1)) {
            (Some(row), Some(column)) => Point::new(row, column),
            _ => return false,
        };
        self.contains_point(other.start) && self.contains_point(last)
    }

    pub fn intersects_with(&self, other: &Range, boundary: Boundary) -> bool {
        match boundary {
            Boundary::Exclusive => !(self.start.row >= other.end.row
                || self.start.column >= other.end.column
                || self.end.row <= other.start.row
                || self.end.column <= other.start.column),
            Boundary::Inclusive => !(self.start.row > other.end.row
                || self.start.column > other.end.column
                || self.end.row < other.start.row
                || self.end.column < other.start.column),
        }
    }

    /// The overlapping part of both ranges, if they share any cell.
    pub fn intersection(&self, other: &Range) -> Option<Range> {
        if !self.intersects_with(other, Boundary::Exclusive) {
            return None;
        }
        Some(Range {
            start: Point::new(
                self.start.row.max(other.start.row),
                self.start.column.max(other.start.column),
            ),
            end: Point::new(
                self.end.row.min(other.end.row),
                self.end.column.min(other.end.column),
            ),
        })
    }

    /// Smallest range covering both.
    pub fn union(&self, other: &Range) -> Range {
        Range {
            start: Point::new(
                self.start.row.min(other.start.row),
                self.start.column.min(other.start.column),
            ),
            end: Point::new(
                self.end.row.max(other.end.row),
                self.end.column.max(other.end.column),
            ),
        }
    }

    /// Iterate every cell, row-major (outer loop rows, inner loop columns).
    pub fn cells(&self) -> impl Iterator<Item = Point> {
        let columns = self.columns();
        self.rows()
            .flat_map(move |row| columns.clone().map(move |column| Point::new(row, column)))
    }

    /// Collect `f(point)` for every cell as one vector per row.
    pub fn map<T>(&self, mut f: impl FnMut(Point) -> T) -> Vec<Vec<T>> {
        self.rows()
            .map(|row| self.columns().map(|column| f(Point::new(row, column))).collect())
            .collect()
    }
}

impl Ord for Range {
    /// Earlier start first; for equal starts, the larger range first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.start.cmp(&other.start).then_with(|| other.end.cmp(&self.end))
    }
}

impl PartialOrd for Range {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
