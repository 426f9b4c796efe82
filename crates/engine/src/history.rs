//! Undo/redo history for table mutations.
//!
//! Every recorded mutation is a [`Command`]: a tagged variant that knows how
//! to apply itself to a [`Table`] and how to invert itself. Layers above the
//! table (display, editor) attach their own side effects to the last recorded
//! command through an opaque [`Amendment`]; the table replays amendments as
//! events and never looks inside them.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use tabula_core::Point;

use crate::error::TableError;
use crate::events::{Step, TableEvent};
use crate::table::Table;
use crate::value::{Row, Value};

// =============================================================================
// Amendment
// =============================================================================

/// Side effect owned by a layer above the table, identified by the owner's id.
#[derive(Clone)]
pub struct Amendment {
    owner: u64,
    payload: Rc<dyn Any>,
}

impl Amendment {
    pub fn new<T: Any>(owner: u64, payload: T) -> Self {
        Self { owner, payload: Rc::new(payload) }
    }

    pub fn owner(&self) -> u64 {
        self.owner
    }

    /// The payload, when it belongs to `owner` and has type `T`.
    pub fn payload_for<T: Any>(&self, owner: u64) -> Option<&T> {
        if self.owner != owner {
            return None;
        }
        self.payload.downcast_ref::<T>()
    }
}

impl fmt::Debug for Amendment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Amendment").field("owner", &self.owner).finish_non_exhaustive()
    }
}

impl PartialEq for Amendment {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner
            && std::ptr::eq(
                Rc::as_ptr(&self.payload) as *const (),
                Rc::as_ptr(&other.payload) as *const (),
            )
    }
}

// =============================================================================
// Command
// =============================================================================

/// One recorded mutation, with enough captured state to run in both directions.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Insert a column (optionally pre-filled); inverse removes it.
    InsertColumn { index: usize, name: Option<String>, values: Option<Vec<Value>> },
    /// Remove a column; inverse re-inserts it with its former name and values.
    RemoveColumn { index: usize, name: Option<String>, values: Vec<Value> },
    RenameColumn { index: usize, old: Option<String>, new: Option<String> },
    SwapColumns { a: usize, b: usize },
    /// Insert contiguous rows at `index`.
    InsertRows { index: usize, rows: Vec<Row> },
    /// Remove the contiguous rows starting at `index`; `rows` are their former values.
    RemoveRows { index: usize, rows: Vec<Row> },
    /// Remove scattered rows; `indices` ascending, `rows` aligned with them.
    RemoveRowsAt { indices: Vec<usize>, rows: Vec<Row> },
    SwapRows { a: usize, b: usize },
    /// Reorder rows so that new row `i` is old row `order[i]`.
    PermuteRows { order: Vec<usize> },
    SetCells { positions: Vec<Point>, old: Vec<Value>, new: Vec<Value> },
    /// Several commands recorded as one step: applied in order, inverted in reverse.
    Batch(Vec<Command>),
    /// A command plus a side effect owned by a higher layer.
    Amended { command: Box<Command>, amendment: Amendment },
}

impl Command {
    /// Run the command forward (initial redo direction).
    pub fn apply(&self, table: &mut Table) -> Result<(), TableError> {
        match self {
            Command::InsertColumn { index, name, values } => {
                table.raw_insert_column(*index, name.clone(), values.clone())
            }
            Command::RemoveColumn { index, .. } => table.raw_remove_column(*index).map(drop),
            Command::RenameColumn { index, new, .. } => {
                table.raw_rename_column(*index, new.clone()).map(drop)
            }
            Command::SwapColumns { a, b } => table.raw_swap_columns(*a, *b),
            Command::InsertRows { index, rows } => table.raw_insert_rows(*index, rows.clone()),
            Command::RemoveRows { index, rows } => {
                table.raw_remove_rows(*index, rows.len()).map(drop)
            }
            Command::RemoveRowsAt { indices, .. } => {
                table.raw_remove_rows_at_indices(indices).map(drop)
            }
            Command::SwapRows { a, b } => table.raw_swap_rows(*a, *b),
            Command::PermuteRows { order } => table.raw_permute_rows(order),
            Command::SetCells { positions, new, .. } => {
                table.raw_set_cells(positions, new).map(drop)
            }
            Command::Batch(commands) => {
                for command in commands {
                    command.apply(table)?;
                }
                Ok(())
            }
            Command::Amended { command, amendment } => {
                command.apply(table)?;
                table.emit(TableEvent::Replay { amendment: amendment.clone(), step: Step::Redo });
                Ok(())
            }
        }
    }

    /// Undo the command.
    pub fn invert(&self, table: &mut Table) -> Result<(), TableError> {
        match self {
            Command::InsertColumn { index, .. } => table.raw_remove_column(*index).map(drop),
            Command::RemoveColumn { index, name, values } => {
                table.raw_insert_column(*index, name.clone(), Some(values.clone()))
            }
            Command::RenameColumn { index, old, .. } => {
                table.raw_rename_column(*index, old.clone()).map(drop)
            }
            Command::SwapColumns { a, b } => table.raw_swap_columns(*a, *b),
            Command::InsertRows { index, rows } => {
                table.raw_remove_rows(*index, rows.len()).map(drop)
            }
            Command::RemoveRows { index, rows } => table.raw_insert_rows(*index, rows.clone()),
            Command::RemoveRowsAt { indices, rows } => {
                table.raw_insert_rows_at_indices(indices, rows.clone())
            }
            Command::SwapRows { a, b } => table.raw_swap_rows(*a, *b),
            Command::PermuteRows { order } => table.raw_permute_rows(&inverse_permutation(order)),
            Command::SetCells { positions, old, .. } => {
                // Reverse order so a position written twice ends on its first old value.
                let positions: Vec<Point> = positions.iter().rev().copied().collect();
                let old: Vec<Value> = old.iter().rev().cloned().collect();
                table.raw_set_cells(&positions, &old).map(drop)
            }
            Command::Batch(commands) => {
                for command in commands.iter().rev() {
                    command.invert(table)?;
                }
                Ok(())
            }
            Command::Amended { command, amendment } => {
                command.invert(table)?;
                table.emit(TableEvent::Replay { amendment: amendment.clone(), step: Step::Undo });
                Ok(())
            }
        }
    }

    /// Short name for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Command::InsertColumn { .. } => "insert column",
            Command::RemoveColumn { .. } => "remove column",
            Command::RenameColumn { .. } => "rename column",
            Command::SwapColumns { .. } => "swap columns",
            Command::InsertRows { .. } => "insert rows",
            Command::RemoveRows { .. } => "remove rows",
            Command::RemoveRowsAt { .. } => "remove rows at indices",
            Command::SwapRows { .. } => "swap rows",
            Command::PermuteRows { .. } => "reorder rows",
            Command::SetCells { .. } => "set cells",
            Command::Batch(_) => "batch",
            Command::Amended { command, .. } => command.label(),
        }
    }
}

/// `result[order[i]] == i`.
pub fn inverse_permutation(order: &[usize]) -> Vec<usize> {
    let mut inverse = vec![0; order.len()];
    for (i, &source) in order.iter().enumerate() {
        inverse[source] = i;
    }
    inverse
}

// =============================================================================
// History
// =============================================================================

pub struct History {
    undo_stack: Vec<Command>,
    redo_stack: Vec<Command>,
    max_entries: usize,
    /// Innermost open batch last. Nested batches fold into their parent.
    open_batches: Vec<Vec<Command>>,
    /// Recording is skipped while non-zero.
    suspended: usize,
    /// Bumped for every recorded command, batched or not.
    revision: u64,
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl History {
    pub const DEFAULT_MAX_ENTRIES: usize = 100;

    pub fn new() -> Self {
        Self::with_max_entries(Self::DEFAULT_MAX_ENTRIES)
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_entries: max_entries.max(1),
            open_batches: Vec::new(),
            suspended: 0,
            revision: 0,
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn set_max_entries(&mut self, max_entries: usize) {
        self.max_entries = max_entries.max(1);
        self.trim();
    }

    /// Record a command as a new forward step.
    pub fn record(&mut self, command: Command) {
        if self.suspended > 0 {
            return;
        }
        self.revision += 1;
        match self.open_batches.last_mut() {
            Some(batch) => batch.push(command),
            None => self.push_entry(command),
        }
    }

    fn push_entry(&mut self, command: Command) {
        self.undo_stack.push(command);
        self.redo_stack.clear();
        self.trim();
    }

    fn trim(&mut self) {
        // Limit history size, oldest first
        while self.undo_stack.len() > self.max_entries {
            self.undo_stack.remove(0);
        }
    }

    pub fn start_batch(&mut self) {
        self.open_batches.push(Vec::new());
    }

    /// Close the innermost batch. Returns true when a step was pushed onto the undo stack.
    pub fn end_batch(&mut self) -> bool {
        let Some(commands) = self.open_batches.pop() else {
            return false;
        };
        if commands.is_empty() {
            return false;
        }
        match self.open_batches.last_mut() {
            Some(parent) => {
                parent.extend(commands);
                false
            }
            None => {
                self.push_entry(Command::Batch(commands));
                true
            }
        }
    }

    pub fn in_batch(&self) -> bool {
        !self.open_batches.is_empty()
    }

    /// Wrap the most recently recorded command (inside the open batch, if any)
    /// with an amendment. Returns false when there is nothing to amend.
    pub fn amend_last(&mut self, amendment: Amendment) -> bool {
        if self.suspended > 0 {
            return false;
        }
        let slot = match self.open_batches.last_mut() {
            Some(batch) => batch.last_mut(),
            None => self.undo_stack.last_mut(),
        };
        let Some(slot) = slot else {
            return false;
        };
        let command = std::mem::replace(slot, Command::Batch(Vec::new()));
        *slot = Command::Amended { command: Box::new(command), amendment };
        true
    }

    pub fn suspend(&mut self) {
        self.suspended += 1;
    }

    pub fn resume(&mut self) {
        self.suspended = self.suspended.saturating_sub(1);
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended > 0
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn pop_undo(&mut self) -> Option<Command> {
        self.undo_stack.pop()
    }

    pub(crate) fn pop_redo(&mut self) -> Option<Command> {
        self.redo_stack.pop()
    }

    pub(crate) fn push_redo(&mut self, command: Command) {
        self.redo_stack.push(command);
    }

    /// Put a redone command back without clearing the remaining redo steps.
    pub(crate) fn push_undo_after_redo(&mut self, command: Command) {
        self.undo_stack.push(command);
        self.trim();
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn last(&self) -> Option<&Command> {
        self.undo_stack.last()
    }

    pub fn clear_undo(&mut self) {
        self.undo_stack.clear();
    }

    pub fn clear_redo(&mut self) {
        self.redo_stack.clear();
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.open_batches.clear();
    }
}
