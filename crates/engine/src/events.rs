//! Event types for table change notifications.
//!
//! A [`Table`](crate::table::Table) queues one copy of every event per
//! subscriber; each subscriber drains its own queue when it syncs. Higher
//! layers translate these into their own event types instead of forwarding
//! them unchanged.

use std::ops;

use tabula_core::Point;

use crate::history::Amendment;
use crate::value::Value;

/// Direction in which a recorded command is being replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Undo,
    Redo,
}

/// Which rows a structural or ordering change touched, in model space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowChange {
    /// The rows in `old` were replaced by the rows in `new` (both start at the same index).
    Spans { old: ops::Range<usize>, new: ops::Range<usize> },
    /// Scattered rows, in ascending order.
    Indices(Vec<usize>),
}

/// Cells whose values changed, in model space.
#[derive(Debug, Clone, PartialEq)]
pub struct CellsChangedEvent {
    pub positions: Vec<Point>,
    pub old_values: Vec<Value>,
    pub new_values: Vec<Value>,
}

/// Events emitted by a table.
#[derive(Debug, Clone, PartialEq)]
pub enum TableEvent {
    ColumnAdded { index: usize, name: Option<String> },
    ColumnRemoved { index: usize, name: Option<String> },
    ColumnRenamed { index: usize, old_name: Option<String>, new_name: Option<String> },
    ColumnsSwapped { a: usize, b: usize },

    /// One row inserted at `index`. Emitted for every row, batched or not.
    RowAdded { index: usize },
    /// One row removed from `index`.
    RowRemoved { index: usize },
    RowsSwapped { a: usize, b: usize },
    /// Rows physically reordered: new row `i` is old row `order[i]`.
    RowsPermuted { order: Vec<usize> },

    /// Row content or order changed; sent once per operation.
    Changed(RowChange),
    CellsChanged(CellsChangedEvent),

    ModifiedStatusChanged(bool),
    WillSave,
    Saved,
    Destroyed,

    /// A command amended by a higher layer was undone or redone; the layer
    /// that owns the amendment re-applies its side effect.
    Replay { amendment: Amendment, step: Step },
}

impl TableEvent {
    /// True for events that change the shape or order of rows or columns.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            TableEvent::ColumnAdded { .. }
                | TableEvent::ColumnRemoved { .. }
                | TableEvent::ColumnsSwapped { .. }
                | TableEvent::RowAdded { .. }
                | TableEvent::RowRemoved { .. }
                | TableEvent::RowsSwapped { .. }
                | TableEvent::RowsPermuted { .. }
                | TableEvent::Changed(_)
        )
    }
}

/// Handle returned by [`Table::subscribe`](crate::table::Table::subscribe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub(crate) u64);

/// Accumulates drained events so tests can assert on them.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct EventCollector<E> {
    events: Vec<E>,
}

#[cfg(test)]
impl<E> EventCollector<E> {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = E>) {
        self.events.extend(events);
    }

    pub fn events(&self) -> &[E] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events matching a predicate, in emission order.
    pub fn matching(&self, predicate: impl Fn(&E) -> bool) -> Vec<&E> {
        self.events.iter().filter(|e| predicate(e)).collect()
    }
}

#[cfg(test)]
impl EventCollector<TableEvent> {
    pub fn modified_changes(&self) -> Vec<bool> {
        self.events
            .iter()
            .filter_map(|e| match e {
                TableEvent::ModifiedStatusChanged(m) => Some(*m),
                _ => None,
            })
            .collect()
    }

    pub fn cells_changed(&self) -> Vec<&CellsChangedEvent> {
        self.events
            .iter()
            .filter_map(|e| match e {
                TableEvent::CellsChanged(c) => Some(c),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_collector_filtering() {
        let mut collector = EventCollector::new();
        collector.extend([
            TableEvent::RowAdded { index: 0 },
            TableEvent::ModifiedStatusChanged(true),
            TableEvent::CellsChanged(CellsChangedEvent {
                positions: vec![Point::new(0, 0)],
                old_values: vec![Value::Empty],
                new_values: vec![Value::from("a")],
            }),
            TableEvent::ModifiedStatusChanged(false),
        ]);

        assert_eq!(collector.len(), 4);
        assert_eq!(collector.modified_changes(), vec![true, false]);
        assert_eq!(collector.cells_changed().len(), 1);
        assert_eq!(collector.matching(TableEvent::is_structural).len(), 1);

        collector.clear();
        assert!(collector.is_empty());
    }
}
