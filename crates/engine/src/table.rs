//! The canonical column/row store.
//!
//! Every public mutation validates its input, mutates synchronously, updates
//! the modified flag, queues events for every subscriber and records a
//! [`Command`] in the undo history. The `raw_*` operations underneath do the
//! actual work and are shared with command replay.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::mem;
use std::ops;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use tabula_core::{IdAllocator, Point, Range};

use crate::error::TableError;
use crate::events::{CellsChangedEvent, RowChange, SubscriberId, TableEvent};
use crate::history::{Amendment, Command, History};
use crate::value::{Row, Value};

/// A table shared by every editor attached to it.
pub type SharedTable = Rc<RefCell<Table>>;

/// Serialized form of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSnapshot {
    pub id: u64,
    pub columns: Vec<Option<String>>,
    pub rows: Vec<Row>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_contents: Option<String>,
}

pub struct Table {
    id: u64,
    columns: Vec<Option<String>>,
    rows: Vec<Row>,
    history: History,

    /// Number of editors attached.
    ref_count: usize,
    destroyed: bool,

    /// Serialized content at the last save / setup.
    cached_contents: Option<String>,
    modified_lock: bool,
    last_modified: bool,

    subscribers: Vec<(SubscriberId, Vec<TableEvent>)>,
    next_subscriber: u64,
}

impl Table {
    pub fn new(ids: &IdAllocator) -> Self {
        Self::with_id(ids.allocate())
    }

    pub fn with_id(id: u64) -> Self {
        Self {
            id,
            columns: Vec::new(),
            rows: Vec::new(),
            history: History::new(),
            ref_count: 0,
            destroyed: false,
            cached_contents: None,
            modified_lock: false,
            last_modified: false,
            subscribers: Vec::new(),
            next_subscriber: 1,
        }
    }

    /// A table pre-populated with columns and rows, clean and with an empty history.
    pub fn with_data(
        ids: &IdAllocator,
        columns: Vec<Option<String>>,
        rows: Vec<Row>,
    ) -> Result<Self, TableError> {
        let mut table = Self::new(ids);
        table.columns = columns;
        table.rows = rows
            .into_iter()
            .map(|row| table.normalize_row(row))
            .collect::<Result<_, _>>()?;
        table.initialize_after_setup();
        Ok(table)
    }

    pub fn from_snapshot(snapshot: TableSnapshot, ids: &IdAllocator) -> Result<Self, TableError> {
        ids.reserve(snapshot.id);
        let mut table = Self::with_id(snapshot.id);
        table.columns = snapshot.columns;
        table.rows = snapshot
            .rows
            .into_iter()
            .map(|row| table.normalize_row(row))
            .collect::<Result<_, _>>()?;
        if snapshot.modified == Some(true) {
            table.cached_contents = Some(snapshot.cached_contents.unwrap_or_default());
        }
        table.initialize_after_setup();
        Ok(table)
    }

    pub fn snapshot(&self) -> TableSnapshot {
        let modified = self.last_modified;
        TableSnapshot {
            id: self.id,
            columns: self.columns.clone(),
            rows: self.rows.clone(),
            modified: modified.then_some(true),
            cached_contents: if modified { self.cached_contents.clone() } else { None },
        }
    }

    pub fn into_shared(self) -> SharedTable {
        Rc::new(RefCell::new(self))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub fn retain(&mut self) {
        self.ref_count += 1;
    }

    /// Drop one reference; destroys the table when none remain.
    /// Returns true when this call destroyed it.
    pub fn release(&mut self) -> bool {
        self.ref_count = self.ref_count.saturating_sub(1);
        if !self.is_retained() && !self.destroyed {
            self.destroy();
            return true;
        }
        false
    }

    pub fn is_retained(&self) -> bool {
        self.ref_count > 0
    }

    pub fn ref_count(&self) -> usize {
        self.ref_count
    }

    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        log::debug!("table {}: destroyed", self.id);
        self.emit(TableEvent::Destroyed);
        self.columns.clear();
        self.rows.clear();
        self.history.clear();
        self.destroyed = true;
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    fn ensure_alive(&self) -> Result<(), TableError> {
        if self.destroyed {
            Err(TableError::Destroyed)
        } else {
            Ok(())
        }
    }

    // =========================================================================
    // Events
    // =========================================================================

    pub fn subscribe(&mut self) -> SubscriberId {
        let id = SubscriberId(self.next_subscriber);
        self.next_subscriber += 1;
        self.subscribers.push((id, Vec::new()));
        id
    }

    pub fn unsubscribe(&mut self, subscriber: SubscriberId) {
        self.subscribers.retain(|(id, _)| *id != subscriber);
    }

    /// Take every event queued for `subscriber` since its last drain.
    pub fn drain_events(&mut self, subscriber: SubscriberId) -> Vec<TableEvent> {
        self.subscribers
            .iter_mut()
            .find(|(id, _)| *id == subscriber)
            .map(|(_, queue)| mem::take(queue))
            .unwrap_or_default()
    }

    pub(crate) fn emit(&mut self, event: TableEvent) {
        if let Some(((_, last), rest)) = self.subscribers.split_last_mut() {
            for (_, queue) in rest {
                queue.push(event.clone());
            }
            last.push(event);
        }
    }

    // =========================================================================
    // Modified status
    // =========================================================================

    fn cache_content(&self) -> String {
        serde_json::to_string(&(&self.columns, &self.rows)).unwrap_or_default()
    }

    pub fn is_modified(&self) -> bool {
        self.cached_contents.as_deref() != Some(self.cache_content().as_str())
    }

    pub fn update_cached_contents(&mut self) {
        self.cached_contents = Some(self.cache_content());
    }

    /// Suppress modified-status notifications (bulk programmatic loads).
    pub fn lock_modified_status(&mut self) {
        self.modified_lock = true;
    }

    pub fn unlock_modified_status(&mut self) {
        self.modified_lock = false;
        self.emit_modified_status_change();
    }

    pub fn is_modified_status_locked(&self) -> bool {
        self.modified_lock
    }

    /// Emit `ModifiedStatusChanged` if the status flipped since the last notification.
    pub fn emit_modified_status_change(&mut self) {
        if self.modified_lock {
            return;
        }
        let modified = self.is_modified();
        if modified == self.last_modified {
            return;
        }
        self.last_modified = modified;
        self.emit(TableEvent::ModifiedStatusChanged(modified));
    }

    /// Clear history and prime the clean snapshot once setup is complete.
    pub fn initialize_after_setup(&mut self) {
        self.history.clear();
        if self.cached_contents.is_none() {
            self.update_cached_contents();
        }
        self.last_modified = self.is_modified();
    }

    /// Save without a persistence collaborator. Returns false when there was nothing to save.
    pub fn save(&mut self) -> bool {
        matches!(self.save_with(|_| Ok::<(), std::convert::Infallible>(())), Ok(true))
    }

    /// Save through `handler`. A failing handler leaves the table modified.
    pub fn save_with<E>(
        &mut self,
        handler: impl FnOnce(&Table) -> Result<(), E>,
    ) -> Result<bool, E> {
        if !self.last_modified {
            return Ok(false);
        }
        self.emit(TableEvent::WillSave);
        handler(self)?;
        self.update_cached_contents();
        self.emit(TableEvent::Saved);
        self.emit_modified_status_change();
        Ok(true)
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    fn record(&mut self, command: Command) {
        log::trace!("table {}: record {}", self.id, command.label());
        self.history.record(command);
    }

    /// Run `f` so that everything it records becomes a single undo step.
    pub fn batch_transaction<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.start_batch_transaction();
        let result = f(self);
        self.end_batch_transaction();
        result
    }

    pub fn start_batch_transaction(&mut self) {
        self.history.start_batch();
    }

    pub fn end_batch_transaction(&mut self) -> bool {
        let pushed = self.history.end_batch();
        if pushed {
            log::debug!("table {}: batch committed", self.id);
        }
        pushed
    }

    /// Attach a higher layer's side effect to the last recorded command.
    pub fn amend_last_transaction(&mut self, amendment: Amendment) -> bool {
        self.history.amend_last(amendment)
    }

    /// Run `f` without recording anything in the history.
    pub fn untracked<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.history.suspend();
        let result = f(self);
        self.history.resume();
        result
    }

    pub fn is_recording(&self) -> bool {
        !self.history.is_suspended()
    }

    pub fn undo(&mut self) -> Result<bool, TableError> {
        self.ensure_alive()?;
        let Some(command) = self.history.pop_undo() else {
            return Ok(false);
        };
        log::debug!("table {}: undo {}", self.id, command.label());
        command.invert(self)?;
        self.history.push_redo(command);
        self.emit_modified_status_change();
        Ok(true)
    }

    pub fn redo(&mut self) -> Result<bool, TableError> {
        self.ensure_alive()?;
        let Some(command) = self.history.pop_redo() else {
            return Ok(false);
        };
        log::debug!("table {}: redo {}", self.id, command.label());
        command.apply(self)?;
        self.history.push_undo_after_redo(command);
        self.emit_modified_status_change();
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo_depth(&self) -> usize {
        self.history.undo_len()
    }

    pub fn redo_depth(&self) -> usize {
        self.history.redo_len()
    }

    pub fn last_command(&self) -> Option<&Command> {
        self.history.last()
    }

    pub fn clear_undo_stack(&mut self) {
        self.history.clear_undo();
    }

    pub fn clear_redo_stack(&mut self) {
        self.history.clear_redo();
    }

    /// Counter bumped by every recorded command.
    pub fn revision(&self) -> u64 {
        self.history.revision()
    }

    pub fn history_capacity(&self) -> usize {
        self.history.max_entries()
    }

    pub fn set_history_capacity(&mut self, capacity: usize) {
        self.history.set_max_entries(capacity);
    }

    // =========================================================================
    // Columns
    // =========================================================================

    pub fn columns(&self) -> &[Option<String>] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_name(&self, index: usize) -> Option<&str> {
        self.columns.get(index).and_then(|c| c.as_deref())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.as_deref() == Some(name))
    }

    pub fn column_values(&self, index: usize) -> Result<Vec<Value>, TableError> {
        self.check_column(index)?;
        Ok(self.rows.iter().map(|row| row[index].clone()).collect())
    }

    fn check_column(&self, index: usize) -> Result<(), TableError> {
        if index < self.columns.len() {
            Ok(())
        } else {
            Err(TableError::ColumnIndexOutOfRange { index, count: self.columns.len() })
        }
    }

    pub fn add_column(&mut self, name: Option<&str>) -> Result<usize, TableError> {
        self.add_column_at(self.columns.len(), name)
    }

    /// Insert a column; an index past the end appends. Returns the actual index.
    pub fn add_column_at(&mut self, index: usize, name: Option<&str>) -> Result<usize, TableError> {
        self.ensure_alive()?;
        let index = index.min(self.columns.len());
        let name = name.map(str::to_string);
        self.raw_insert_column(index, name.clone(), None)?;
        self.emit_modified_status_change();
        self.record(Command::InsertColumn { index, name, values: None });
        Ok(index)
    }

    pub fn remove_column(&mut self, name: &str) -> Result<(), TableError> {
        let index = self
            .column_index(name)
            .ok_or_else(|| TableError::UnknownColumn(name.to_string()))?;
        self.remove_column_at(index)
    }

    pub fn remove_column_at(&mut self, index: usize) -> Result<(), TableError> {
        self.ensure_alive()?;
        self.check_column(index)?;
        let (name, values) = self.raw_remove_column(index)?;
        self.emit_modified_status_change();
        self.record(Command::RemoveColumn { index, name, values });
        Ok(())
    }

    pub fn change_column_name(&mut self, old: &str, new: Option<&str>) -> Result<(), TableError> {
        let index = self
            .column_index(old)
            .ok_or_else(|| TableError::UnknownColumn(old.to_string()))?;
        self.change_column_name_at(index, new)
    }

    pub fn change_column_name_at(&mut self, index: usize, name: Option<&str>) -> Result<(), TableError> {
        self.ensure_alive()?;
        self.check_column(index)?;
        let new = name.map(str::to_string);
        let old = self.raw_rename_column(index, new.clone())?;
        self.emit_modified_status_change();
        self.record(Command::RenameColumn { index, old, new });
        Ok(())
    }

    pub fn swap_columns(&mut self, a: usize, b: usize) -> Result<(), TableError> {
        self.ensure_alive()?;
        self.check_column(a)?;
        self.check_column(b)?;
        self.raw_swap_columns(a, b)?;
        self.emit_modified_status_change();
        self.record(Command::SwapColumns { a, b });
        Ok(())
    }

    // =========================================================================
    // Rows
    // =========================================================================

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Rows within `span`, clamped to the table.
    pub fn rows_in_range(&self, span: ops::Range<usize>) -> &[Row] {
        let span = self.clamp_span(span);
        &self.rows[span]
    }

    pub fn cell_count(&self) -> usize {
        self.rows.len() * self.columns.len()
    }

    /// The full-table range.
    pub fn range(&self) -> Range {
        Range::new(Point::ZERO, (self.rows.len(), self.columns.len()))
    }

    fn check_row(&self, index: usize) -> Result<(), TableError> {
        if index < self.rows.len() {
            Ok(())
        } else {
            Err(TableError::RowIndexOutOfRange { index, count: self.rows.len() })
        }
    }

    fn clamp_span(&self, span: ops::Range<usize>) -> ops::Range<usize> {
        let end = span.end.min(self.rows.len());
        span.start.min(end)..end
    }

    /// Pad a row to the column count; longer rows are rejected.
    fn normalize_row(&self, mut row: Row) -> Result<Row, TableError> {
        let columns = self.columns.len();
        if row.len() > columns {
            return Err(TableError::RowTooWide { len: row.len(), columns });
        }
        row.resize(columns, Value::Empty);
        Ok(row)
    }

    fn check_row_insertion(&self) -> Result<(), TableError> {
        self.ensure_alive()?;
        if self.columns.is_empty() {
            return Err(TableError::NoColumns);
        }
        Ok(())
    }

    pub fn add_row(&mut self, values: Row) -> Result<usize, TableError> {
        self.add_row_at(self.rows.len(), values)
    }

    /// Insert one row; an index past the end appends. Returns the actual index.
    pub fn add_row_at(&mut self, index: usize, values: Row) -> Result<usize, TableError> {
        self.check_row_insertion()?;
        let index = index.min(self.rows.len());
        let row = self.normalize_row(values)?;
        self.raw_insert_rows(index, vec![row.clone()])?;
        self.emit_modified_status_change();
        self.record(Command::InsertRows { index, rows: vec![row] });
        Ok(index)
    }

    /// Append a row in batch mode: only `RowAdded` is emitted, nothing is
    /// recorded, and the caller finishes with [`Table::commit_batched_rows`].
    pub fn add_row_batched(&mut self, values: Row) -> Result<usize, TableError> {
        self.add_row_at_batched(self.rows.len(), values)
    }

    pub fn add_row_at_batched(&mut self, index: usize, values: Row) -> Result<usize, TableError> {
        self.check_row_insertion()?;
        let index = index.min(self.rows.len());
        let row = self.normalize_row(values)?;
        self.rows.insert(index, row);
        self.emit(TableEvent::RowAdded { index });
        Ok(index)
    }

    /// The single finishing event for rows added in batch mode.
    pub fn commit_batched_rows(&mut self, span: ops::Range<usize>) {
        self.emit_modified_status_change();
        self.emit(TableEvent::Changed(RowChange::Spans {
            old: span.start..span.start,
            new: span,
        }));
    }

    pub fn add_rows(&mut self, rows: Vec<Row>) -> Result<ops::Range<usize>, TableError> {
        self.add_rows_at(self.rows.len(), rows)
    }

    /// Insert several rows with one change event and one undo step.
    pub fn add_rows_at(
        &mut self,
        index: usize,
        rows: Vec<Row>,
    ) -> Result<ops::Range<usize>, TableError> {
        self.check_row_insertion()?;
        let index = index.min(self.rows.len());
        let rows: Vec<Row> = rows
            .into_iter()
            .map(|row| self.normalize_row(row))
            .collect::<Result<_, _>>()?;
        let span = index..index + rows.len();
        if rows.is_empty() {
            return Ok(span);
        }
        self.raw_insert_rows(index, rows.clone())?;
        self.emit_modified_status_change();
        self.record(Command::InsertRows { index, rows });
        Ok(span)
    }

    pub fn remove_row_at(&mut self, index: usize) -> Result<Row, TableError> {
        self.ensure_alive()?;
        self.check_row(index)?;
        let rows = self.raw_remove_rows(index, 1)?;
        self.emit_modified_status_change();
        self.record(Command::RemoveRows { index, rows: rows.clone() });
        Ok(rows.into_iter().next().unwrap_or_default())
    }

    /// Remove the rows in `span`, clamped to the table.
    pub fn remove_rows_in_range(&mut self, span: ops::Range<usize>) -> Result<Vec<Row>, TableError> {
        self.ensure_alive()?;
        let span = self.clamp_span(span);
        if span.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self.raw_remove_rows(span.start, span.len())?;
        self.emit_modified_status_change();
        self.record(Command::RemoveRows { index: span.start, rows: rows.clone() });
        Ok(rows)
    }

    /// Remove scattered rows. Returns them in ascending index order.
    pub fn remove_rows_at_indices(&mut self, indices: &[usize]) -> Result<Vec<Row>, TableError> {
        self.ensure_alive()?;
        let mut indices = indices.to_vec();
        indices.sort_unstable();
        indices.dedup();
        if let Some(&last) = indices.last() {
            self.check_row(last)?;
        } else {
            return Ok(Vec::new());
        }
        let rows = self.raw_remove_rows_at_indices(&indices)?;
        self.emit_modified_status_change();
        self.record(Command::RemoveRowsAt { indices, rows: rows.clone() });
        Ok(rows)
    }

    pub fn swap_rows(&mut self, a: usize, b: usize) -> Result<(), TableError> {
        self.ensure_alive()?;
        self.check_row(a)?;
        self.check_row(b)?;
        self.raw_swap_rows(a, b)?;
        self.emit_modified_status_change();
        self.record(Command::SwapRows { a, b });
        Ok(())
    }

    /// Physically reorder the rows with a stable sort.
    pub fn sort_rows(&mut self, mut compare: impl FnMut(&Row, &Row) -> Ordering) -> Result<(), TableError> {
        self.ensure_alive()?;
        let mut order: Vec<usize> = (0..self.rows.len()).collect();
        order.sort_by(|&a, &b| compare(&self.rows[a], &self.rows[b]));
        self.raw_permute_rows(&order)?;
        self.emit_modified_status_change();
        self.record(Command::PermuteRows { order });
        Ok(())
    }

    // =========================================================================
    // Cells
    // =========================================================================

    fn check_position(&self, position: Point) -> Result<(), TableError> {
        if position.row < self.rows.len() && position.column < self.columns.len() {
            Ok(())
        } else {
            Err(TableError::PositionOutOfBounds(position))
        }
    }

    pub fn value_at_position(&self, position: Point) -> Result<&Value, TableError> {
        self.check_position(position)?;
        Ok(&self.rows[position.row][position.column])
    }

    pub fn set_value_at_position(&mut self, position: Point, value: Value) -> Result<(), TableError> {
        self.ensure_alive()?;
        self.check_position(position)?;
        let positions = vec![position];
        let new = vec![value];
        let old = self.raw_set_cells(&positions, &new)?;
        self.emit_modified_status_change();
        self.record(Command::SetCells { positions, old, new });
        Ok(())
    }

    /// Assign `values[i % values.len()]` to `positions[i]`.
    pub fn set_values_at_positions(
        &mut self,
        positions: &[Point],
        values: &[Value],
    ) -> Result<(), TableError> {
        self.ensure_alive()?;
        if positions.is_empty() {
            return Ok(());
        }
        if values.is_empty() {
            return Err(TableError::EmptyValues);
        }
        for &position in positions {
            self.check_position(position)?;
        }
        let new: Vec<Value> = (0..positions.len())
            .map(|i| values[i % values.len()].clone())
            .collect();
        let old = self.raw_set_cells(positions, &new)?;
        self.emit_modified_status_change();
        self.record(Command::SetCells { positions: positions.to_vec(), old, new });
        Ok(())
    }

    /// Fill `range` by tiling the `values` block over it.
    pub fn set_values_in_range(&mut self, range: Range, values: &[Vec<Value>]) -> Result<(), TableError> {
        self.ensure_alive()?;
        if values.is_empty() || values.iter().any(|row| row.is_empty()) {
            return Err(TableError::EmptyValues);
        }
        if range.is_degenerate() {
            return Ok(());
        }
        self.check_position(Point::new(range.end.row - 1, range.end.column - 1))?;

        let positions: Vec<Point> = range.cells().collect();
        let new: Vec<Value> = positions
            .iter()
            .map(|p| {
                let block_row = &values[(p.row - range.start.row) % values.len()];
                block_row[(p.column - range.start.column) % block_row.len()].clone()
            })
            .collect();
        let old = self.raw_set_cells(&positions, &new)?;
        self.emit_modified_status_change();
        self.record(Command::SetCells { positions, old, new });
        Ok(())
    }

    // =========================================================================
    // Raw operations (no validation of liveness, no history, no status)
    // =========================================================================

    pub(crate) fn raw_insert_column(
        &mut self,
        index: usize,
        name: Option<String>,
        values: Option<Vec<Value>>,
    ) -> Result<(), TableError> {
        if index > self.columns.len() {
            return Err(TableError::ColumnIndexOutOfRange { index, count: self.columns.len() });
        }
        self.columns.insert(index, name.clone());
        let mut values = values.unwrap_or_default().into_iter();
        for row in &mut self.rows {
            row.insert(index, values.next().unwrap_or_default());
        }
        self.emit(TableEvent::ColumnAdded { index, name });
        Ok(())
    }

    pub(crate) fn raw_remove_column(
        &mut self,
        index: usize,
    ) -> Result<(Option<String>, Vec<Value>), TableError> {
        self.check_column(index)?;
        let name = self.columns.remove(index);
        let values = self.rows.iter_mut().map(|row| row.remove(index)).collect();
        self.emit(TableEvent::ColumnRemoved { index, name: name.clone() });
        Ok((name, values))
    }

    pub(crate) fn raw_rename_column(
        &mut self,
        index: usize,
        name: Option<String>,
    ) -> Result<Option<String>, TableError> {
        self.check_column(index)?;
        let old = mem::replace(&mut self.columns[index], name.clone());
        self.emit(TableEvent::ColumnRenamed { index, old_name: old.clone(), new_name: name });
        Ok(old)
    }

    pub(crate) fn raw_swap_columns(&mut self, a: usize, b: usize) -> Result<(), TableError> {
        self.check_column(a)?;
        self.check_column(b)?;
        self.columns.swap(a, b);
        for row in &mut self.rows {
            row.swap(a, b);
        }
        let all = 0..self.rows.len();
        self.emit(TableEvent::ColumnsSwapped { a, b });
        self.emit(TableEvent::Changed(RowChange::Spans { old: all.clone(), new: all }));
        Ok(())
    }

    pub(crate) fn raw_insert_rows(&mut self, index: usize, rows: Vec<Row>) -> Result<(), TableError> {
        if index > self.rows.len() {
            return Err(TableError::RowIndexOutOfRange { index, count: self.rows.len() });
        }
        let count = rows.len();
        self.rows.splice(index..index, rows);
        for i in index..index + count {
            self.emit(TableEvent::RowAdded { index: i });
        }
        self.emit(TableEvent::Changed(RowChange::Spans {
            old: index..index,
            new: index..index + count,
        }));
        Ok(())
    }

    pub(crate) fn raw_remove_rows(&mut self, index: usize, count: usize) -> Result<Vec<Row>, TableError> {
        if index + count > self.rows.len() {
            return Err(TableError::RowIndexOutOfRange {
                index: index + count,
                count: self.rows.len(),
            });
        }
        let removed: Vec<Row> = self.rows.drain(index..index + count).collect();
        for _ in 0..count {
            self.emit(TableEvent::RowRemoved { index });
        }
        self.emit(TableEvent::Changed(RowChange::Spans {
            old: index..index + count,
            new: index..index,
        }));
        Ok(removed)
    }

    /// Re-insert rows at ascending `indices` (the inverse of a scattered removal).
    pub(crate) fn raw_insert_rows_at_indices(
        &mut self,
        indices: &[usize],
        rows: Vec<Row>,
    ) -> Result<(), TableError> {
        for (&index, row) in indices.iter().zip(rows) {
            if index > self.rows.len() {
                return Err(TableError::RowIndexOutOfRange { index, count: self.rows.len() });
            }
            self.rows.insert(index, row);
            self.emit(TableEvent::RowAdded { index });
        }
        self.emit(TableEvent::Changed(RowChange::Indices(indices.to_vec())));
        Ok(())
    }

    pub(crate) fn raw_remove_rows_at_indices(&mut self, indices: &[usize]) -> Result<Vec<Row>, TableError> {
        if let Some(&index) = indices.iter().find(|&&i| i >= self.rows.len()) {
            return Err(TableError::RowIndexOutOfRange { index, count: self.rows.len() });
        }
        let mut removed = Vec::with_capacity(indices.len());
        for &index in indices.iter().rev() {
            removed.push(self.rows.remove(index));
            self.emit(TableEvent::RowRemoved { index });
        }
        removed.reverse();
        self.emit(TableEvent::Changed(RowChange::Indices(indices.to_vec())));
        Ok(removed)
    }

    pub(crate) fn raw_swap_rows(&mut self, a: usize, b: usize) -> Result<(), TableError> {
        self.check_row(a)?;
        self.check_row(b)?;
        self.rows.swap(a, b);
        self.emit(TableEvent::RowsSwapped { a, b });
        self.emit(TableEvent::Changed(RowChange::Indices(vec![a.min(b), a.max(b)])));
        Ok(())
    }

    pub(crate) fn raw_permute_rows(&mut self, order: &[usize]) -> Result<(), TableError> {
        let count = self.rows.len();
        if order.len() != count {
            return Err(TableError::RowIndexOutOfRange { index: order.len(), count });
        }
        if let Some(&index) = order.iter().find(|&&i| i >= count) {
            return Err(TableError::RowIndexOutOfRange { index, count });
        }
        let mut old: Vec<Option<Row>> = mem::take(&mut self.rows).into_iter().map(Some).collect();
        self.rows = order.iter().map(|&i| old[i].take().unwrap_or_default()).collect();
        self.emit(TableEvent::RowsPermuted { order: order.to_vec() });
        self.emit(TableEvent::Changed(RowChange::Spans { old: 0..count, new: 0..count }));
        Ok(())
    }

    pub(crate) fn raw_set_cells(&mut self, positions: &[Point], values: &[Value]) -> Result<Vec<Value>, TableError> {
        for &position in positions {
            self.check_position(position)?;
        }
        let old_values: Vec<Value> = positions
            .iter()
            .zip(values)
            .map(|(p, value)| mem::replace(&mut self.rows[p.row][p.column], value.clone()))
            .collect();
        self.emit(TableEvent::CellsChanged(CellsChangedEvent {
            positions: positions.to_vec(),
            old_values: old_values.clone(),
            new_values: values.to_vec(),
        }));
        Ok(old_values)
    }
}
