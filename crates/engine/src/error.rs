use std::fmt;

use tabula_core::Point;

/// Contract violations reported by the table, display and editor layers.
///
/// None of these are recoverable internally: the operation that returned the
/// error did not happen, and the caller is expected to validate its input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    /// The table (or the display wrapping it) was destroyed.
    Destroyed,
    /// Column index outside `[0, count)`.
    ColumnIndexOutOfRange { index: usize, count: usize },
    /// Row index outside `[0, count)`.
    RowIndexOutOfRange { index: usize, count: usize },
    /// No column carries this name.
    UnknownColumn(String),
    /// Rows cannot be inserted before any column exists.
    NoColumns,
    /// A row has more values than the table has columns.
    RowTooWide { len: usize, columns: usize },
    /// A cell position outside the table.
    PositionOutOfBounds(Point),
    /// A value block with no rows or no columns.
    EmptyValues,
    /// A multi-range operation received no range.
    EmptyRangeList,
    /// A go-to target that is not `row` or `row:column`.
    InvalidTarget(String),
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Destroyed => write!(f, "table is destroyed"),
            Self::ColumnIndexOutOfRange { index, count } => {
                write!(f, "column index {index} out of range (0..{count})")
            }
            Self::RowIndexOutOfRange { index, count } => {
                write!(f, "row index {index} out of range (0..{count})")
            }
            Self::UnknownColumn(name) => write!(f, "no column named '{name}'"),
            Self::NoColumns => write!(f, "can't add rows to a table without columns"),
            Self::RowTooWide { len, columns } => {
                write!(f, "row has {len} values but the table has {columns} columns")
            }
            Self::PositionOutOfBounds(p) => {
                write!(f, "position ({}, {}) is outside the table", p.row, p.column)
            }
            Self::EmptyValues => write!(f, "value block is empty"),
            Self::EmptyRangeList => write!(f, "at least one range is required"),
            Self::InvalidTarget(target) => write!(f, "'{target}' is not a row or row:column"),
        }
    }
}

impl std::error::Error for TableError {}
