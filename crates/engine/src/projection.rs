//! Sorted row order for a display.
//!
//! A [`RowProjection`] is the permutation a stable sort produced: row `i` on
//! screen shows model row `screen_to_model(i)`, and `model_to_screen` walks
//! it back. With no [`SortOrder`] set it is the identity. The display drops
//! it whenever rows change and rebuilds it lazily on the next lookup.

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::value::{collate, Row, Value};

// =============================================================================
// RowProjection
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowProjection {
    /// screen row -> model row
    screen_to_model: Vec<usize>,

    /// model row -> screen row, rebuilt whenever `screen_to_model` changes
    model_to_screen: Vec<usize>,
}

impl Default for RowProjection {
    fn default() -> Self {
        Self::new(0)
    }
}

impl RowProjection {
    /// Identity mapping for N rows
    pub fn new(row_count: usize) -> Self {
        Self {
            screen_to_model: (0..row_count).collect(),
            model_to_screen: (0..row_count).collect(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.screen_to_model.len()
    }

    pub fn screen_to_model(&self, screen_row: usize) -> Option<usize> {
        self.screen_to_model.get(screen_row).copied()
    }

    pub fn model_to_screen(&self, model_row: usize) -> Option<usize> {
        self.model_to_screen.get(model_row).copied()
    }

    /// Is the order anything other than identity?
    pub fn is_sorted(&self) -> bool {
        self.screen_to_model.iter().enumerate().any(|(i, &m)| i != m)
    }

    pub fn screen_order(&self) -> &[usize] {
        &self.screen_to_model
    }

    fn rebuild_inverse_map(&mut self) {
        if self.model_to_screen.len() != self.screen_to_model.len() {
            self.model_to_screen.resize(self.screen_to_model.len(), 0);
        }
        for (screen_row, &model_row) in self.screen_to_model.iter().enumerate() {
            if model_row < self.model_to_screen.len() {
                self.model_to_screen[model_row] = screen_row;
            }
        }
    }

    /// Apply a permutation mapping new screen row -> model row.
    pub fn apply_sort(&mut self, permutation: Vec<usize>) {
        self.screen_to_model = permutation;
        self.rebuild_inverse_map();
    }

    pub fn clear_sort(&mut self) {
        self.screen_to_model = (0..self.screen_to_model.len()).collect();
        self.rebuild_inverse_map();
    }

    /// Resize to a new row count. New rows land at the end of the screen order.
    pub fn resize(&mut self, row_count: usize) {
        let old_count = self.screen_to_model.len();
        if row_count > old_count {
            self.screen_to_model.extend(old_count..row_count);
        } else if row_count < old_count {
            self.screen_to_model.retain(|&m| m < row_count);
        }
        self.model_to_screen.resize(row_count, 0);
        self.rebuild_inverse_map();
    }
}

// =============================================================================
// Sort order
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    /// `1` or `-1`, the multiplier applied to the collation result.
    pub fn sign(self) -> i8 {
        match self {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        }
    }

    pub fn from_sign(sign: i8) -> Self {
        if sign < 0 {
            SortDirection::Descending
        } else {
            SortDirection::Ascending
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }

    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

pub type RowComparator = Rc<dyn Fn(&Row, &Row) -> Ordering>;

/// What the display orders rows by.
#[derive(Clone)]
pub enum SortOrder {
    /// A model column, compared with [`collate`] and scaled by the direction.
    Column(usize),
    /// An arbitrary row comparator; the direction does not apply.
    Comparator(RowComparator),
}

impl SortOrder {
    pub fn comparator(compare: impl Fn(&Row, &Row) -> Ordering + 'static) -> Self {
        SortOrder::Comparator(Rc::new(compare))
    }

    pub fn column(&self) -> Option<usize> {
        match self {
            SortOrder::Column(index) => Some(*index),
            SortOrder::Comparator(_) => None,
        }
    }

    /// Compare two rows under this order.
    pub fn compare(&self, a: &Row, b: &Row, direction: SortDirection) -> Ordering {
        static EMPTY: Value = Value::Empty;
        match self {
            SortOrder::Column(index) => {
                let x = a.get(*index).unwrap_or(&EMPTY);
                let y = b.get(*index).unwrap_or(&EMPTY);
                direction.apply(collate(x, y))
            }
            SortOrder::Comparator(compare) => compare(a, b),
        }
    }

    /// The stable screen order of `rows`: `result[screen] == model`.
    pub fn permutation(&self, rows: &[Row], direction: SortDirection) -> Vec<usize> {
        let mut order: Vec<usize> = (0..rows.len()).collect();
        order.sort_by(|&a, &b| self.compare(&rows[a], &rows[b], direction));
        order
    }
}

impl fmt::Debug for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Column(index) => f.debug_tuple("Column").field(index).finish(),
            SortOrder::Comparator(_) => f.write_str("Comparator(..)"),
        }
    }
}

impl PartialEq for SortOrder {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SortOrder::Column(a), SortOrder::Column(b)) => a == b,
            (SortOrder::Comparator(a), SortOrder::Comparator(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<usize> for SortOrder {
    fn from(column: usize) -> Self {
        SortOrder::Column(column)
    }
}
