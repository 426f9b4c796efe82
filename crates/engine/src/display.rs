//! Screen-space view over a shared [`Table`].
//!
//! The display owns the row projection (identity or sorted), per-row heights,
//! per-column options and the pixel offsets derived from them. It subscribes
//! to the table and translates every table event into a [`DisplayEvent`]
//! when [`DisplayTable::sync`] runs; the table never calls back into it.
//!
//! Structural edits made through the display amend the recorded table
//! command so that undo and redo also restore the layout that went with it.

use std::cell::OnceCell;
use std::mem;
use std::ops;

use serde::{Deserialize, Serialize};

use tabula_config::{ColumnLayout, Settings, TableLayout};
use tabula_core::{Align, IdAllocator, Point, Range};

use crate::error::TableError;
use crate::events::{CellsChangedEvent, RowChange, Step, SubscriberId, TableEvent};
use crate::history::Amendment;
use crate::projection::{RowProjection, SortDirection, SortOrder};
use crate::table::{SharedTable, Table, TableSnapshot};
use crate::value::{Row, Value};

pub const DEFAULT_GRAMMAR_SCOPE: &str = "text.plain.null-grammar";

// =============================================================================
// DisplayColumn
// =============================================================================

/// A table column as presented on screen.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DisplayColumn {
    name: Option<String>,
    options: ColumnLayout,
}

impl DisplayColumn {
    pub fn new(name: Option<String>) -> Self {
        Self { name, options: ColumnLayout::default() }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn options(&self) -> &ColumnLayout {
        &self.options
    }

    /// Explicit width, if one was set.
    pub fn width(&self) -> Option<f32> {
        self.options.width
    }

    pub fn align(&self) -> Align {
        self.options.align.unwrap_or_default()
    }

    pub fn cell_render(&self) -> Option<&str> {
        self.options.cell_render.as_deref()
    }

    pub fn grammar_scope(&self) -> &str {
        self.options.grammar_scope.as_deref().unwrap_or(DEFAULT_GRAMMAR_SCOPE)
    }

    /// Overwrite every option present in `options`. Returns true if anything changed.
    fn merge_options(&mut self, options: &ColumnLayout) -> bool {
        let before = self.options.clone();
        if options.width.is_some() {
            self.options.width = options.width;
        }
        if options.align.is_some() {
            self.options.align = options.align;
        }
        if options.cell_render.is_some() {
            self.options.cell_render = options.cell_render.clone();
        }
        if options.grammar_scope.is_some() {
            self.options.grammar_scope = options.grammar_scope.clone();
        }
        before != self.options
    }
}

// =============================================================================
// Events
// =============================================================================

/// Cell changes with both model and screen coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayCellsChanged {
    pub positions: Vec<Point>,
    pub screen_positions: Vec<Point>,
    pub old_values: Vec<Value>,
    pub new_values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DisplayEvent {
    ColumnAdded { index: usize, name: Option<String> },
    ColumnRemoved { index: usize, name: Option<String> },
    ColumnRenamed { index: usize, old_name: Option<String>, new_name: Option<String> },
    ColumnsSwapped { a: usize, b: usize },
    ColumnOptionChanged { index: usize, options: ColumnLayout },
    /// Model row index.
    RowAdded { index: usize },
    RowRemoved { index: usize },
    RowHeightChanged { row: usize, height: Option<f32> },
    /// Rows changed content or screen order.
    Changed(RowChange),
    CellsChanged(DisplayCellsChanged),
    /// Offsets changed without a structural change.
    LayoutChanged,
    ModifiedStatusChanged(bool),
    WillSave,
    Saved,
    Destroyed,
    /// An amendment owned by a layer above the display was replayed.
    Replay { amendment: Amendment, step: Step },
}

/// Layout side effects attached to table commands.
#[derive(Debug, Clone)]
enum LayoutChange {
    ColumnInserted { index: usize, options: ColumnLayout },
    ColumnRemoved { index: usize, options: ColumnLayout },
    RowsInserted { index: usize, heights: Vec<Option<f32>> },
    RowsRemoved { indices: Vec<usize>, heights: Vec<Option<f32>> },
    Sorted { order: SortOrder, direction: SortDirection },
}

/// Pixel rectangle of one cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellRect {
    pub top: f32,
    pub left: f32,
    pub width: f32,
    pub height: f32,
}

/// Serialized form of a display table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayTableSnapshot {
    pub row_heights: Vec<Option<f32>>,
    pub table: TableSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<i8>,
}

// =============================================================================
// DisplayTable
// =============================================================================

pub struct DisplayTable {
    id: u64,
    table: SharedTable,
    subscription: SubscriberId,
    settings: Settings,

    columns: Vec<DisplayColumn>,
    /// Indexed by model row.
    row_heights: Vec<Option<f32>>,
    default_row_height: Option<f32>,
    default_column_width: Option<f32>,

    order: Option<SortOrder>,
    direction: SortDirection,

    // Derived, rebuilt lazily after invalidation
    projection: OnceCell<RowProjection>,
    row_offsets: OnceCell<Vec<f32>>,
    column_offsets: OnceCell<Vec<f32>>,

    events: Vec<DisplayEvent>,
    destroyed: bool,
}

impl DisplayTable {
    pub fn new(table: SharedTable, settings: &Settings, ids: &IdAllocator) -> Self {
        let (subscription, columns, row_count) = {
            let mut t = table.borrow_mut();
            let columns = t.columns().iter().cloned().map(DisplayColumn::new).collect();
            (t.subscribe(), columns, t.row_count())
        };
        Self {
            id: ids.allocate(),
            table,
            subscription,
            settings: settings.clone(),
            columns,
            row_heights: vec![None; row_count],
            default_row_height: None,
            default_column_width: None,
            order: None,
            direction: SortDirection::Ascending,
            projection: OnceCell::new(),
            row_offsets: OnceCell::new(),
            column_offsets: OnceCell::new(),
            events: Vec::new(),
            destroyed: false,
        }
    }

    pub fn from_snapshot(
        snapshot: DisplayTableSnapshot,
        settings: &Settings,
        ids: &IdAllocator,
    ) -> Result<Self, TableError> {
        let table = Table::from_snapshot(snapshot.table, ids)?.into_shared();
        let mut display = Self::new(table, settings, ids);
        display.set_row_heights(snapshot.row_heights);
        if let Some(column) = snapshot.order {
            let direction = SortDirection::from_sign(snapshot.direction.unwrap_or(1));
            display.sort_by(column, direction)?;
        }
        display.events.clear();
        Ok(display)
    }

    /// Comparator orders are not serializable and are dropped.
    pub fn snapshot(&self) -> DisplayTableSnapshot {
        let order = self.order.as_ref().and_then(SortOrder::column);
        DisplayTableSnapshot {
            row_heights: self.row_heights.clone(),
            table: self.table.borrow().snapshot(),
            order,
            direction: order.map(|_| self.direction.sign()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn table(&self) -> &SharedTable {
        &self.table
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn apply_settings(&mut self, settings: &Settings) {
        self.settings = settings.clone();
        self.invalidate_rows();
        self.column_offsets.take();
        self.events.push(DisplayEvent::LayoutChanged);
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        if let Ok(mut table) = self.table.try_borrow_mut() {
            table.unsubscribe(self.subscription);
        }
        self.columns.clear();
        self.row_heights.clear();
        self.order = None;
        self.projection = OnceCell::from(RowProjection::default());
        self.row_offsets = OnceCell::from(vec![0.0]);
        self.column_offsets = OnceCell::from(vec![0.0]);
        self.destroyed = true;
        self.events.push(DisplayEvent::Destroyed);
    }

    /// Catch up with changes other holders of the table made, then check
    /// that the display is still usable.
    fn prepare(&mut self) -> Result<(), TableError> {
        self.sync();
        self.ensure_alive()
    }

    fn ensure_alive(&self) -> Result<(), TableError> {
        if self.destroyed {
            Err(TableError::Destroyed)
        } else {
            Ok(())
        }
    }

    /// Take every display event produced since the last drain.
    pub fn drain_events(&mut self) -> Vec<DisplayEvent> {
        mem::take(&mut self.events)
    }

    fn revision(&self) -> u64 {
        self.table.borrow().revision()
    }

    /// Attach `change` to the last table command, if one was recorded since `revision`.
    fn amend(&self, revision: u64, change: LayoutChange) {
        let mut table = self.table.borrow_mut();
        if table.revision() != revision {
            table.amend_last_transaction(Amendment::new(self.id, change));
        }
    }

    fn invalidate_rows(&mut self) {
        self.projection.take();
        self.row_offsets.take();
    }

    // =========================================================================
    // Table event translation
    // =========================================================================

    /// Drain the table's queued events and bring the projection up to date.
    pub fn sync(&mut self) {
        if self.destroyed {
            return;
        }
        let events = self.table.borrow_mut().drain_events(self.subscription);
        if events.is_empty() {
            return;
        }
        let first = self.events.len();

        for event in events {
            match event {
                TableEvent::ColumnAdded { index, name } => {
                    let index = index.min(self.columns.len());
                    self.columns.insert(index, DisplayColumn::new(name.clone()));
                    self.column_offsets.take();
                    self.shift_order_column(|c| if c >= index { Some(c + 1) } else { Some(c) });
                    self.events.push(DisplayEvent::ColumnAdded { index, name });
                }
                TableEvent::ColumnRemoved { index, name } => {
                    if index < self.columns.len() {
                        self.columns.remove(index);
                    }
                    self.column_offsets.take();
                    self.shift_order_column(|c| match c.cmp(&index) {
                        std::cmp::Ordering::Less => Some(c),
                        std::cmp::Ordering::Equal => None,
                        std::cmp::Ordering::Greater => Some(c - 1),
                    });
                    self.events.push(DisplayEvent::ColumnRemoved { index, name });
                }
                TableEvent::ColumnRenamed { index, old_name, new_name } => {
                    if let Some(column) = self.columns.get_mut(index) {
                        column.name = new_name.clone();
                    }
                    self.events.push(DisplayEvent::ColumnRenamed { index, old_name, new_name });
                }
                TableEvent::ColumnsSwapped { a, b } => {
                    if a < self.columns.len() && b < self.columns.len() {
                        self.columns.swap(a, b);
                    }
                    self.column_offsets.take();
                    self.shift_order_column(|c| {
                        Some(if c == a { b } else if c == b { a } else { c })
                    });
                    self.events.push(DisplayEvent::ColumnsSwapped { a, b });
                }
                TableEvent::RowAdded { index } => {
                    let at = index.min(self.row_heights.len());
                    self.row_heights.insert(at, None);
                    self.invalidate_rows();
                    self.events.push(DisplayEvent::RowAdded { index });
                }
                TableEvent::RowRemoved { index } => {
                    if index < self.row_heights.len() {
                        self.row_heights.remove(index);
                    }
                    self.invalidate_rows();
                    self.events.push(DisplayEvent::RowRemoved { index });
                }
                TableEvent::RowsSwapped { a, b } => {
                    if a < self.row_heights.len() && b < self.row_heights.len() {
                        self.row_heights.swap(a, b);
                    }
                    self.invalidate_rows();
                }
                TableEvent::RowsPermuted { order } => {
                    if order.len() == self.row_heights.len() {
                        let old = mem::take(&mut self.row_heights);
                        self.row_heights = order.iter().map(|&i| old.get(i).copied().flatten()).collect();
                    }
                    self.invalidate_rows();
                }
                TableEvent::Changed(change) => {
                    self.invalidate_rows();
                    self.events.push(DisplayEvent::Changed(change));
                }
                TableEvent::CellsChanged(CellsChangedEvent { positions, old_values, new_values }) => {
                    self.events.push(DisplayEvent::CellsChanged(DisplayCellsChanged {
                        positions,
                        screen_positions: Vec::new(),
                        old_values,
                        new_values,
                    }));
                }
                TableEvent::ModifiedStatusChanged(modified) => {
                    self.events.push(DisplayEvent::ModifiedStatusChanged(modified));
                }
                TableEvent::WillSave => self.events.push(DisplayEvent::WillSave),
                TableEvent::Saved => self.events.push(DisplayEvent::Saved),
                TableEvent::Destroyed => {
                    self.destroy();
                    return;
                }
                TableEvent::Replay { amendment, step } => {
                    if let Some(change) = amendment.payload_for::<LayoutChange>(self.id).cloned() {
                        self.replay(change, step);
                    } else {
                        self.events.push(DisplayEvent::Replay { amendment, step });
                    }
                }
            }
        }

        // Row counts can drift while batched rows are pending; keep heights aligned
        let row_count = self.table.borrow().row_count();
        self.row_heights.resize(row_count, None);

        self.map_cell_events(first);
    }

    fn map_cell_events(&mut self, first: usize) {
        let mapped: Vec<(usize, Vec<Point>)> = self.events[first..]
            .iter()
            .enumerate()
            .filter_map(|(i, event)| match event {
                DisplayEvent::CellsChanged(change) => Some((
                    first + i,
                    change.positions.iter().map(|&p| self.screen_position(p)).collect(),
                )),
                _ => None,
            })
            .collect();
        for (i, screen_positions) in mapped {
            if let DisplayEvent::CellsChanged(change) = &mut self.events[i] {
                change.screen_positions = screen_positions;
            }
        }
    }

    fn shift_order_column(&mut self, shift: impl Fn(usize) -> Option<usize>) {
        if let Some(SortOrder::Column(column)) = self.order {
            self.order = shift(column).map(SortOrder::Column);
        }
    }

    fn replay(&mut self, change: LayoutChange, step: Step) {
        match (change, step) {
            (LayoutChange::ColumnInserted { index, options }, Step::Redo)
            | (LayoutChange::ColumnRemoved { index, options }, Step::Undo) => {
                self.set_screen_column_options(index, options);
            }
            (LayoutChange::RowsInserted { index, heights }, Step::Redo) => {
                for (i, height) in heights.into_iter().enumerate() {
                    if let Some(height) = height {
                        self.set_row_height_at(index + i, height);
                    }
                }
            }
            (LayoutChange::RowsRemoved { indices, heights }, Step::Undo) => {
                for (index, height) in indices.into_iter().zip(heights) {
                    self.store_row_height(index, height);
                }
            }
            (LayoutChange::Sorted { order, direction }, Step::Undo) => {
                self.order = Some(order);
                self.direction = direction;
                self.order_changed();
            }
            (LayoutChange::Sorted { .. }, Step::Redo) => {
                self.order = None;
                self.order_changed();
            }
            _ => {}
        }
    }

    // =========================================================================
    // Columns
    // =========================================================================

    pub fn screen_columns(&self) -> &[DisplayColumn] {
        &self.columns
    }

    pub fn screen_column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn screen_column(&self, index: usize) -> Option<&DisplayColumn> {
        self.columns.get(index)
    }

    pub fn last_column_index(&self) -> Option<usize> {
        self.columns.len().checked_sub(1)
    }

    pub fn default_column_width(&self) -> f32 {
        self.default_column_width.unwrap_or(self.settings.column_width)
    }

    /// Override the configured default width for columns without one.
    pub fn set_default_column_width(&mut self, width: Option<f32>) {
        self.default_column_width = width;
        self.column_offsets.take();
        self.events.push(DisplayEvent::LayoutChanged);
    }

    pub fn minimum_column_width(&self) -> f32 {
        self.settings.minimum_column_width
    }

    pub fn screen_column_width_at(&self, index: usize) -> f32 {
        self.columns
            .get(index)
            .and_then(DisplayColumn::width)
            .unwrap_or_else(|| self.default_column_width())
            .max(self.minimum_column_width())
    }

    pub fn set_screen_column_width_at(&mut self, index: usize, width: f32) {
        let width = width.max(self.minimum_column_width());
        self.set_screen_column_options(index, ColumnLayout { width: Some(width), ..Default::default() });
        self.events.push(DisplayEvent::LayoutChanged);
    }

    pub fn screen_column_align_at(&self, index: usize) -> Align {
        self.columns.get(index).map(DisplayColumn::align).unwrap_or_default()
    }

    pub fn set_screen_column_align_at(&mut self, index: usize, align: Align) {
        self.set_screen_column_options(index, ColumnLayout { align: Some(align), ..Default::default() });
        self.events.push(DisplayEvent::LayoutChanged);
    }

    /// Set every option present in `options` on one column.
    pub fn set_screen_column_options(&mut self, index: usize, options: ColumnLayout) {
        let Some(column) = self.columns.get_mut(index) else {
            return;
        };
        let width_before = column.options.width;
        if !column.merge_options(&options) {
            return;
        }
        if column.options.width != width_before {
            self.column_offsets.take();
        }
        let options = column.options.clone();
        self.events.push(DisplayEvent::ColumnOptionChanged { index, options });
    }

    pub fn screen_column_offset_at(&self, index: usize) -> f32 {
        offset_at(self.column_offsets(), index)
    }

    pub fn screen_column_index_at_pixel(&self, x: f32) -> Option<usize> {
        index_at_pixel(self.column_offsets(), x)
    }

    pub fn columns_width(&self) -> f32 {
        self.column_offsets().last().copied().unwrap_or(0.0)
    }

    fn column_offsets(&self) -> &[f32] {
        self.column_offsets.get_or_init(|| {
            prefix_sums((0..self.columns.len()).map(|i| self.screen_column_width_at(i)))
        })
    }

    pub fn add_column(&mut self, name: Option<&str>, options: ColumnLayout) -> Result<usize, TableError> {
        self.sync();
        self.add_column_at(self.columns.len(), name, options)
    }

    pub fn add_column_at(
        &mut self,
        index: usize,
        name: Option<&str>,
        options: ColumnLayout,
    ) -> Result<usize, TableError> {
        self.prepare()?;
        let revision = self.revision();
        let index = self.table.borrow_mut().add_column_at(index, name)?;
        self.sync();
        self.set_screen_column_options(index, options.clone());
        self.amend(revision, LayoutChange::ColumnInserted { index, options });
        Ok(index)
    }

    pub fn remove_column(&mut self, name: &str) -> Result<(), TableError> {
        self.sync();
        let index = self
            .table
            .borrow()
            .column_index(name)
            .ok_or_else(|| TableError::UnknownColumn(name.to_string()))?;
        self.remove_column_at(index)
    }

    pub fn remove_column_at(&mut self, index: usize) -> Result<(), TableError> {
        self.prepare()?;
        let options = self.columns.get(index).map(|c| c.options.clone()).unwrap_or_default();
        let revision = self.revision();
        self.table.borrow_mut().remove_column_at(index)?;
        self.sync();
        self.amend(revision, LayoutChange::ColumnRemoved { index, options });
        Ok(())
    }

    /// Remove a span of columns as one undo step.
    pub fn remove_screen_columns_in_range(&mut self, span: ops::Range<usize>) -> Result<(), TableError> {
        self.prepare()?;
        let end = span.end.min(self.columns.len());
        let span = span.start.min(end)..end;
        self.table.borrow_mut().start_batch_transaction();
        let result = span.rev().try_for_each(|index| self.remove_column_at(index));
        self.table.borrow_mut().end_batch_transaction();
        result
    }

    pub fn change_column_name_at(&mut self, index: usize, name: Option<&str>) -> Result<(), TableError> {
        self.prepare()?;
        self.table.borrow_mut().change_column_name_at(index, name)?;
        self.sync();
        Ok(())
    }

    pub fn swap_columns(&mut self, a: usize, b: usize) -> Result<(), TableError> {
        self.prepare()?;
        self.table.borrow_mut().swap_columns(a, b)?;
        self.sync();
        Ok(())
    }

    // =========================================================================
    // Rows
    // =========================================================================

    fn projection(&self) -> &RowProjection {
        self.projection.get_or_init(|| {
            let table = self.table.borrow();
            let mut projection = RowProjection::new(table.row_count());
            if let Some(order) = &self.order {
                projection.apply_sort(order.permutation(table.rows(), self.direction));
            }
            projection
        })
    }

    /// Model row shown at `row`. Rows past the end map to themselves.
    pub fn screen_row_to_model_row(&self, row: usize) -> usize {
        self.projection().screen_to_model(row).unwrap_or(row)
    }

    pub fn model_row_to_screen_row(&self, row: usize) -> usize {
        self.projection().model_to_screen(row).unwrap_or(row)
    }

    pub fn screen_row_count(&self) -> usize {
        self.projection().row_count()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn last_row_index(&self) -> Option<usize> {
        self.screen_row_count().checked_sub(1)
    }

    pub fn screen_row(&self, row: usize) -> Option<Row> {
        let model = self.projection().screen_to_model(row)?;
        self.table.borrow().row(model).cloned()
    }

    /// Rows in screen order.
    pub fn screen_rows(&self) -> Vec<Row> {
        let table = self.table.borrow();
        self.projection()
            .screen_order()
            .iter()
            .filter_map(|&model| table.row(model).cloned())
            .collect()
    }

    pub fn default_row_height(&self) -> f32 {
        self.default_row_height.unwrap_or(self.settings.row_height)
    }

    /// Override the configured default height for rows without one.
    pub fn set_default_row_height(&mut self, height: Option<f32>) {
        self.default_row_height = height;
        self.row_offsets.take();
        self.events.push(DisplayEvent::LayoutChanged);
    }

    pub fn minimum_row_height(&self) -> f32 {
        self.settings.minimum_row_height
    }

    pub fn row_heights(&self) -> &[Option<f32>] {
        &self.row_heights
    }

    /// Replace every row height at once, e.g. from remembered layout.
    pub fn set_row_heights(&mut self, mut heights: Vec<Option<f32>>) {
        heights.resize(self.row_heights.len(), None);
        self.row_heights = heights;
        self.row_offsets.take();
        self.events.push(DisplayEvent::LayoutChanged);
    }

    pub fn row_height_at(&self, row: usize) -> f32 {
        self.row_heights
            .get(row)
            .copied()
            .flatten()
            .unwrap_or_else(|| self.default_row_height())
            .max(self.minimum_row_height())
    }

    pub fn set_row_height_at(&mut self, row: usize, height: f32) {
        let height = height.max(self.minimum_row_height());
        self.store_row_height(row, Some(height));
    }

    fn store_row_height(&mut self, row: usize, height: Option<f32>) {
        let Some(slot) = self.row_heights.get_mut(row) else {
            return;
        };
        *slot = height;
        self.row_offsets.take();
        self.events.push(DisplayEvent::RowHeightChanged { row, height });
        self.events.push(DisplayEvent::LayoutChanged);
    }

    pub fn screen_row_height_at(&self, row: usize) -> f32 {
        self.row_height_at(self.screen_row_to_model_row(row))
    }

    pub fn set_screen_row_height_at(&mut self, row: usize, height: f32) {
        self.set_row_height_at(self.screen_row_to_model_row(row), height);
    }

    pub fn screen_row_offset_at(&self, row: usize) -> f32 {
        offset_at(self.row_offsets(), row)
    }

    pub fn row_offset_at(&self, row: usize) -> f32 {
        self.screen_row_offset_at(self.model_row_to_screen_row(row))
    }

    pub fn rows_height(&self) -> f32 {
        self.row_offsets().last().copied().unwrap_or(0.0)
    }

    pub fn screen_row_index_at_pixel(&self, y: f32) -> Option<usize> {
        index_at_pixel(self.row_offsets(), y)
    }

    pub fn row_index_at_pixel(&self, y: f32) -> Option<usize> {
        self.screen_row_index_at_pixel(y).map(|row| self.screen_row_to_model_row(row))
    }

    fn row_offsets(&self) -> &[f32] {
        self.row_offsets.get_or_init(|| {
            prefix_sums((0..self.screen_row_count()).map(|row| self.screen_row_height_at(row)))
        })
    }

    pub fn add_row(&mut self, values: Row, height: Option<f32>) -> Result<usize, TableError> {
        self.sync();
        let index = self.table.borrow().row_count();
        self.add_row_at(index, values, height)
    }

    /// Insert a row at a model index, optionally with an explicit height.
    pub fn add_row_at(&mut self, index: usize, values: Row, height: Option<f32>) -> Result<usize, TableError> {
        self.prepare()?;
        let revision = self.revision();
        let index = self.table.borrow_mut().add_row_at(index, values)?;
        self.sync();
        if let Some(height) = height {
            self.set_row_height_at(index, height);
        }
        self.amend(revision, LayoutChange::RowsInserted { index, heights: vec![height] });
        Ok(index)
    }

    pub fn add_rows(&mut self, rows: Vec<Row>, heights: Vec<Option<f32>>) -> Result<ops::Range<usize>, TableError> {
        self.sync();
        let index = self.table.borrow().row_count();
        self.add_rows_at(index, rows, heights)
    }

    /// Insert rows with one undo step; `heights[i]` applies to the i-th new row.
    pub fn add_rows_at(
        &mut self,
        index: usize,
        rows: Vec<Row>,
        heights: Vec<Option<f32>>,
    ) -> Result<ops::Range<usize>, TableError> {
        self.prepare()?;
        let revision = self.revision();
        let span = self.table.borrow_mut().add_rows_at(index, rows)?;
        self.sync();
        for (row, height) in span.clone().zip(&heights) {
            if let Some(height) = *height {
                self.set_row_height_at(row, height);
            }
        }
        self.amend(revision, LayoutChange::RowsInserted { index: span.start, heights });
        Ok(span)
    }

    pub fn remove_row_at(&mut self, index: usize) -> Result<Row, TableError> {
        self.prepare()?;
        let height = self.row_heights.get(index).copied().flatten();
        let revision = self.revision();
        let row = self.table.borrow_mut().remove_row_at(index)?;
        self.sync();
        self.amend(revision, LayoutChange::RowsRemoved { indices: vec![index], heights: vec![height] });
        Ok(row)
    }

    pub fn remove_screen_row_at(&mut self, row: usize) -> Result<Row, TableError> {
        self.sync();
        let index = self.screen_row_to_model_row(row);
        self.remove_row_at(index)
    }

    /// Remove a span of model rows, clamped to the table.
    pub fn remove_rows_in_range(&mut self, span: ops::Range<usize>) -> Result<Vec<Row>, TableError> {
        self.prepare()?;
        let end = span.end.min(self.row_heights.len());
        let span = span.start.min(end)..end;
        let heights = self.row_heights[span.clone()].to_vec();
        let revision = self.revision();
        let rows = self.table.borrow_mut().remove_rows_in_range(span.clone())?;
        self.sync();
        self.amend(revision, LayoutChange::RowsRemoved { indices: span.collect(), heights });
        Ok(rows)
    }

    /// Remove scattered model rows.
    pub fn remove_rows_at_indices(&mut self, indices: &[usize]) -> Result<Vec<Row>, TableError> {
        self.prepare()?;
        let mut indices = indices.to_vec();
        indices.sort_unstable();
        indices.dedup();
        let heights = indices.iter().map(|&i| self.row_heights.get(i).copied().flatten()).collect();
        let revision = self.revision();
        let rows = self.table.borrow_mut().remove_rows_at_indices(&indices)?;
        self.sync();
        self.amend(revision, LayoutChange::RowsRemoved { indices, heights });
        Ok(rows)
    }

    /// Remove the rows currently shown in `span`.
    pub fn remove_rows_in_screen_range(&mut self, span: ops::Range<usize>) -> Result<Vec<Row>, TableError> {
        self.sync();
        if self.order.is_none() {
            return self.remove_rows_in_range(span);
        }
        let end = span.end.min(self.screen_row_count());
        let indices: Vec<usize> = (span.start.min(end)..end)
            .map(|row| self.screen_row_to_model_row(row))
            .collect();
        self.remove_rows_at_indices(&indices)
    }

    /// Remove the rows shown at the given screen rows, as one undo step.
    pub fn remove_rows_at_screen_indices(&mut self, rows: &[usize]) -> Result<Vec<Row>, TableError> {
        self.sync();
        let indices: Vec<usize> = rows.iter().map(|&row| self.screen_row_to_model_row(row)).collect();
        self.remove_rows_at_indices(&indices)
    }

    pub fn swap_rows(&mut self, a: usize, b: usize) -> Result<(), TableError> {
        self.prepare()?;
        self.table.borrow_mut().swap_rows(a, b)?;
        self.sync();
        Ok(())
    }

    // =========================================================================
    // Cells
    // =========================================================================

    pub fn screen_position(&self, position: Point) -> Point {
        Point::new(self.model_row_to_screen_row(position.row), position.column)
    }

    pub fn model_position(&self, position: Point) -> Point {
        Point::new(self.screen_row_to_model_row(position.row), position.column)
    }

    /// Screen range of the whole table.
    pub fn screen_range(&self) -> Range {
        Range::new(Point::ZERO, (self.screen_row_count(), self.columns.len()))
    }

    pub fn value_at_screen_position(&self, position: Point) -> Result<Value, TableError> {
        self.table.borrow().value_at_position(self.model_position(position)).cloned()
    }

    /// Like [`DisplayTable::value_at_screen_position`] but `Empty` outside the table.
    pub fn value_or_empty(&self, position: Point) -> Value {
        self.value_at_screen_position(position).unwrap_or_default()
    }

    pub fn set_value_at_screen_position(&mut self, position: Point, value: Value) -> Result<(), TableError> {
        self.prepare()?;
        let position = self.model_position(position);
        self.table.borrow_mut().set_value_at_position(position, value)?;
        self.sync();
        Ok(())
    }

    pub fn set_values_at_screen_positions(&mut self, positions: &[Point], values: &[Value]) -> Result<(), TableError> {
        self.prepare()?;
        let positions: Vec<Point> = positions.iter().map(|&p| self.model_position(p)).collect();
        self.table.borrow_mut().set_values_at_positions(&positions, values)?;
        self.sync();
        Ok(())
    }

    /// Tile `values` over a screen range clipped to the table.
    pub fn set_values_in_screen_range(&mut self, range: Range, values: &[Vec<Value>]) -> Result<(), TableError> {
        self.prepare()?;
        if values.is_empty() || values.iter().any(Vec::is_empty) {
            return Err(TableError::EmptyValues);
        }
        let Some(range) = range.intersection(&self.screen_range()) else {
            return Ok(());
        };

        if self.order.is_none() {
            self.table.borrow_mut().set_values_in_range(range, values)?;
        } else {
            let mut positions = Vec::with_capacity(range.cell_count());
            let mut flattened = Vec::with_capacity(range.cell_count());
            for point in range.cells() {
                let block_row = &values[(point.row - range.start.row) % values.len()];
                flattened.push(block_row[(point.column - range.start.column) % block_row.len()].clone());
                positions.push(self.model_position(point));
            }
            self.table.borrow_mut().set_values_at_positions(&positions, &flattened)?;
        }
        self.sync();
        Ok(())
    }

    pub fn screen_cell_rect(&self, position: Point) -> CellRect {
        CellRect {
            top: self.screen_row_offset_at(position.row),
            left: self.screen_column_offset_at(position.column),
            width: self.screen_column_width_at(position.column),
            height: self.screen_row_height_at(position.row),
        }
    }

    pub fn screen_cell_position_at_pixel(&self, x: f32, y: f32) -> Option<Point> {
        let row = self.screen_row_index_at_pixel(y)?;
        let column = self.screen_column_index_at_pixel(x)?;
        Some(Point::new(row, column))
    }

    pub fn position_at_pixel(&self, x: f32, y: f32) -> Option<Point> {
        self.screen_cell_position_at_pixel(x, y).map(|p| self.model_position(p))
    }

    // =========================================================================
    // Sorting
    // =========================================================================

    pub fn order(&self) -> Option<&SortOrder> {
        self.order.as_ref()
    }

    pub fn direction(&self) -> SortDirection {
        self.direction
    }

    fn order_changed(&mut self) {
        self.invalidate_rows();
        let all = 0..self.screen_row_count();
        self.events.push(DisplayEvent::Changed(RowChange::Spans { old: all.clone(), new: all }));
    }

    pub fn sort_by(&mut self, order: impl Into<SortOrder>, direction: SortDirection) -> Result<(), TableError> {
        self.prepare()?;
        let order = order.into();
        if let Some(column) = order.column() {
            if column >= self.columns.len() {
                return Err(TableError::ColumnIndexOutOfRange { index: column, count: self.columns.len() });
            }
        }
        log::debug!("display {}: sort by {:?} {:?}", self.id, order, direction);
        self.order = Some(order);
        self.direction = direction;
        self.order_changed();
        Ok(())
    }

    pub fn sort_by_column_name(&mut self, name: &str, direction: SortDirection) -> Result<(), TableError> {
        self.sync();
        let index = self
            .table
            .borrow()
            .column_index(name)
            .ok_or_else(|| TableError::UnknownColumn(name.to_string()))?;
        self.sort_by(index, direction)
    }

    pub fn toggle_sort_direction(&mut self) {
        self.sync();
        self.direction = self.direction.toggled();
        if self.order.is_some() {
            self.order_changed();
        }
    }

    pub fn reset_sort(&mut self) {
        self.sync();
        self.order = None;
        self.order_changed();
    }

    /// Physically reorder the table by the current order, then reset to
    /// identity. Undo restores both the row order and the order criterion.
    /// Returns false when no order is set.
    pub fn apply_sort(&mut self) -> Result<bool, TableError> {
        self.prepare()?;
        let Some(order) = self.order.clone() else {
            return Ok(false);
        };
        let direction = self.direction;
        log::debug!("display {}: apply sort {:?}", self.id, order);

        let revision = self.revision();
        self.table
            .borrow_mut()
            .sort_rows(|a, b| order.compare(a, b, direction))?;
        self.order = None;
        self.sync();
        self.amend(revision, LayoutChange::Sorted { order, direction });
        self.order_changed();
        Ok(true)
    }

    // =========================================================================
    // Layout memory and history pass-through
    // =========================================================================

    /// Column options and row heights, as remembered per file.
    pub fn layout(&self) -> TableLayout {
        TableLayout {
            columns: self.columns.iter().map(|c| c.options.clone()).collect(),
            row_heights: self.row_heights.clone(),
        }
    }

    pub fn restore_layout(&mut self, layout: &TableLayout) {
        for (index, options) in layout.columns.iter().enumerate() {
            self.set_screen_column_options(index, options.clone());
        }
        self.set_row_heights(layout.row_heights.clone());
    }

    pub fn undo(&mut self) -> Result<bool, TableError> {
        self.prepare()?;
        let result = self.table.borrow_mut().undo();
        self.sync();
        result
    }

    pub fn redo(&mut self) -> Result<bool, TableError> {
        self.prepare()?;
        let result = self.table.borrow_mut().redo();
        self.sync();
        result
    }
}

impl Drop for DisplayTable {
    fn drop(&mut self) {
        if let Ok(mut table) = self.table.try_borrow_mut() {
            table.unsubscribe(self.subscription);
        }
    }
}

// -----------------------------------------------------------------------------
// Offset helpers
// -----------------------------------------------------------------------------

/// `[0, s0, s0+s1, ...]`: one more entry than `sizes`, the last being the total.
fn prefix_sums(sizes: impl Iterator<Item = f32>) -> Vec<f32> {
    let mut offsets = vec![0.0];
    let mut total = 0.0;
    for size in sizes {
        total += size;
        offsets.push(total);
    }
    offsets
}

fn offset_at(offsets: &[f32], index: usize) -> f32 {
    offsets
        .get(index)
        .or_else(|| offsets.last())
        .copied()
        .unwrap_or(0.0)
}

/// Index of the entry containing `position`, clamped to the first and last entries.
fn index_at_pixel(offsets: &[f32], position: f32) -> Option<usize> {
    let count = offsets.len().saturating_sub(1);
    if count == 0 {
        return None;
    }
    let index = offsets[..count].partition_point(|&o| o <= position).saturating_sub(1);
    Some(index.min(count - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(x: f64) -> Value {
        Value::Number(x)
    }

    fn display_with(rows: &[&[f64]]) -> DisplayTable {
        let ids = IdAllocator::new();
        let columns = (0..rows.first().map_or(0, |r| r.len()))
            .map(|i| Some(format!("c{i}")))
            .collect();
        let rows = rows.iter().map(|r| r.iter().map(|&x| n(x)).collect()).collect();
        let table = Table::with_data(&ids, columns, rows).unwrap().into_shared();
        DisplayTable::new(table, &Settings::default(), &ids)
    }

    fn assert_inverse(display: &DisplayTable) {
        for m in 0..display.screen_row_count() {
            assert_eq!(display.screen_row_to_model_row(display.model_row_to_screen_row(m)), m);
            assert_eq!(display.model_row_to_screen_row(display.screen_row_to_model_row(m)), m);
        }
    }

    #[test]
    fn test_sort_by_column_maps_rows() {
        let mut display = display_with(&[&[3.0], &[1.0], &[2.0]]);
        display.sort_by(0, SortDirection::Ascending).unwrap();
        assert_eq!(display.screen_row_to_model_row(0), 1);
        assert_eq!(display.screen_row_to_model_row(2), 0);
        assert_inverse(&display);

        display.toggle_sort_direction();
        assert_eq!(display.screen_row_to_model_row(0), 0);
        display.toggle_sort_direction();
        assert_eq!(display.direction(), SortDirection::Ascending);
        assert_eq!(display.screen_row_to_model_row(0), 1);

        display.reset_sort();
        assert_eq!(display.screen_row_to_model_row(0), 0);
    }

    #[test]
    fn test_sort_by_unknown_column() {
        let mut display = display_with(&[&[1.0]]);
        assert!(display.sort_by(3, SortDirection::Ascending).is_err());
        assert!(display.sort_by_column_name("missing", SortDirection::Ascending).is_err());
        assert!(display.order().is_none());
    }

    #[test]
    fn test_apply_sort_single_undo_step() {
        let mut display = display_with(&[&[3.0], &[1.0], &[2.0]]);
        display.sort_by(0, SortDirection::Descending).unwrap();
        assert!(display.apply_sort().unwrap());

        assert!(display.order().is_none());
        let table = display.table().clone();
        assert_eq!(table.borrow().rows()[0], vec![n(3.0)]);
        assert_eq!(table.borrow().rows()[2], vec![n(1.0)]);
        assert_eq!(table.borrow().undo_depth(), 1);

        display.undo().unwrap();
        assert_eq!(table.borrow().rows()[1], vec![n(1.0)]);
        assert_eq!(display.order(), Some(&SortOrder::Column(0)));
        assert_eq!(display.direction(), SortDirection::Descending);
        assert_eq!(display.screen_row(0), Some(vec![n(3.0)]));

        display.redo().unwrap();
        assert!(display.order().is_none());
        assert_eq!(table.borrow().rows()[0], vec![n(3.0)]);
    }

    #[test]
    fn test_apply_sort_without_order() {
        let mut display = display_with(&[&[1.0]]);
        assert!(!display.apply_sort().unwrap());
    }

    #[test]
    fn test_remove_column_undo_restores_options() {
        let mut display = display_with(&[&[1.0, 2.0, 3.0]]);
        display.set_screen_column_width_at(1, 200.0);
        display.set_screen_column_align_at(1, Align::Right);
        display.remove_column_at(1).unwrap();
        assert_eq!(display.screen_column_count(), 2);
        assert_eq!(display.screen_column_width_at(1), 120.0);

        display.undo().unwrap();
        assert_eq!(display.screen_column_count(), 3);
        assert_eq!(display.screen_column_width_at(1), 200.0);
        assert_eq!(display.screen_column_align_at(1), Align::Right);
        assert_eq!(display.screen_column(1).and_then(DisplayColumn::name), Some("c1"));
    }

    #[test]
    fn test_add_column_redo_restores_options() {
        let mut display = display_with(&[&[1.0]]);
        let options = ColumnLayout { width: Some(90.0), ..Default::default() };
        let index = display.add_column(Some("extra"), options).unwrap();
        assert_eq!(display.screen_column_width_at(index), 90.0);
        display.undo().unwrap();
        assert_eq!(display.screen_column_count(), 1);
        display.redo().unwrap();
        assert_eq!(display.screen_column_width_at(index), 90.0);
    }

    #[test]
    fn test_remove_row_undo_restores_height() {
        let mut display = display_with(&[&[1.0], &[2.0], &[3.0]]);
        display.set_row_height_at(1, 60.0);
        display.remove_row_at(1).unwrap();
        assert_eq!(display.row_heights(), &[None, None]);

        display.undo().unwrap();
        assert_eq!(display.row_height_at(1), 60.0);
        assert_eq!(display.rows_height(), 24.0 + 60.0 + 24.0);
    }

    #[test]
    fn test_row_heights_clamp_to_minimum() {
        let mut display = display_with(&[&[1.0]]);
        display.set_row_height_at(0, 2.0);
        assert_eq!(display.row_height_at(0), 16.0);
        display.set_screen_column_width_at(0, 1.0);
        assert_eq!(display.screen_column_width_at(0), 40.0);
    }

    #[test]
    fn test_offsets_and_pixel_lookup() {
        let mut display = display_with(&[&[1.0, 2.0], &[3.0, 4.0], &[5.0, 6.0]]);
        display.set_row_height_at(1, 40.0);
        assert_eq!(display.screen_row_offset_at(0), 0.0);
        assert_eq!(display.screen_row_offset_at(2), 64.0);
        assert_eq!(display.rows_height(), 88.0);

        assert_eq!(display.screen_row_index_at_pixel(-5.0), Some(0));
        assert_eq!(display.screen_row_index_at_pixel(30.0), Some(1));
        assert_eq!(display.screen_row_index_at_pixel(64.0), Some(2));
        assert_eq!(display.screen_row_index_at_pixel(1000.0), Some(2));
        assert_eq!(display.screen_column_index_at_pixel(130.0), Some(1));

        assert_eq!(display.screen_cell_position_at_pixel(10.0, 70.0), Some(Point::new(2, 0)));
        let rect = display.screen_cell_rect(Point::new(1, 1));
        assert_eq!(rect, CellRect { top: 24.0, left: 120.0, width: 120.0, height: 40.0 });
    }

    #[test]
    fn test_heights_follow_sorted_rows() {
        let mut display = display_with(&[&[3.0], &[1.0], &[2.0]]);
        display.set_row_height_at(0, 50.0);
        display.sort_by(0, SortDirection::Ascending).unwrap();
        assert_eq!(display.screen_row_height_at(2), 50.0);
        display.apply_sort().unwrap();
        assert_eq!(display.row_height_at(2), 50.0);
        assert_eq!(display.screen_row_offset_at(2), 48.0);
    }

    #[test]
    fn test_set_values_in_screen_range_when_sorted() {
        let mut display = display_with(&[&[3.0, 0.0], &[1.0, 0.0], &[2.0, 0.0]]);
        display.sort_by(0, SortDirection::Ascending).unwrap();
        display
            .set_values_in_screen_range(Range::new((0, 1), (2, 5)), &[vec![n(9.0)]])
            .unwrap();
        let table = display.table().clone();
        let rows = table.borrow().rows().to_vec();
        // Screen rows 0 and 1 are model rows 1 and 2
        assert_eq!(rows[0][1], n(0.0));
        assert_eq!(rows[1][1], n(9.0));
        assert_eq!(rows[2][1], n(9.0));
    }

    #[test]
    fn test_cell_events_carry_screen_positions() {
        let mut display = display_with(&[&[3.0], &[1.0], &[2.0]]);
        display.sort_by(0, SortDirection::Ascending).unwrap();
        display.drain_events();
        display.set_value_at_screen_position(Point::new(0, 0), n(1.5)).unwrap();

        let events = display.drain_events();
        let change = events
            .iter()
            .find_map(|e| match e {
                DisplayEvent::CellsChanged(c) => Some(c),
                _ => None,
            })
            .unwrap();
        assert_eq!(change.positions, vec![Point::new(1, 0)]);
        assert_eq!(change.screen_positions, vec![Point::new(0, 0)]);
    }

    #[test]
    fn test_remove_rows_in_screen_range_sorted() {
        let mut display = display_with(&[&[3.0], &[1.0], &[2.0]]);
        display.sort_by(0, SortDirection::Ascending).unwrap();
        display.remove_rows_in_screen_range(0..2).unwrap();
        assert_eq!(display.table().borrow().rows(), &[vec![n(3.0)]]);
        display.undo().unwrap();
        assert_eq!(display.screen_row_count(), 3);
    }

    #[test]
    fn test_sort_column_follows_structure() {
        let mut display = display_with(&[&[1.0, 2.0]]);
        display.sort_by(1, SortDirection::Ascending).unwrap();
        display.add_column_at(0, Some("new"), ColumnLayout::default()).unwrap();
        assert_eq!(display.order(), Some(&SortOrder::Column(2)));
        display.remove_column_at(2).unwrap();
        assert!(display.order().is_none());
    }

    #[test]
    fn test_table_destroy_cascades() {
        let mut display = display_with(&[&[1.0]]);
        display.table().borrow_mut().destroy();
        display.sync();
        assert!(display.is_destroyed());
        assert_eq!(display.drain_events(), vec![DisplayEvent::Destroyed]);
        assert_eq!(display.add_row(vec![], None), Err(TableError::Destroyed));
        assert_eq!(display.screen_row_count(), 0);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut display = display_with(&[&[2.0], &[1.0]]);
        display.set_row_height_at(0, 30.0);
        display.sort_by(0, SortDirection::Descending).unwrap();

        let json = serde_json::to_string(&display.snapshot()).unwrap();
        assert!(json.contains("\"rowHeights\""));
        let snapshot: DisplayTableSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot.direction, Some(-1));

        let restored = DisplayTable::from_snapshot(snapshot, &Settings::default(), &IdAllocator::new()).unwrap();
        assert_eq!(restored.row_heights(), &[Some(30.0), None]);
        assert_eq!(restored.direction(), SortDirection::Descending);
        assert_eq!(restored.screen_rows(), display.screen_rows());
    }

    #[test]
    fn test_layout_roundtrip() {
        let mut display = display_with(&[&[1.0, 2.0], &[3.0, 4.0]]);
        display.set_screen_column_width_at(0, 80.0);
        display.set_row_height_at(1, 32.0);
        let layout = display.layout();

        let mut other = display_with(&[&[1.0, 2.0], &[3.0, 4.0]]);
        other.restore_layout(&layout);
        assert_eq!(other.screen_column_width_at(0), 80.0);
        assert_eq!(other.row_height_at(1), 32.0);
        assert_eq!(other.columns_width(), 200.0);
    }
}
