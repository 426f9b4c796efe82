//! Multi-cursor editing on top of a [`DisplayTable`].
//!
//! The editor owns two index-aligned vecs: `cursors[i]` and `selections[i]`
//! form one pair, share one id, and are always created and removed together.
//! After every move or selection change two invariants are restored:
//!
//! - no two cursors share a screen position (the later one is removed)
//! - no selection lies inside another selection (the contained one is removed)
//!
//! Structural edits run inside one table batch and amend the recorded step
//! with the cursor positions before and after, so undo and redo put the
//! cursors back where they were.

use std::cell::RefMut;
use std::mem;
use std::ops;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use tabula_config::{ColumnLayout, Distribution, Settings};
use tabula_core::{IdAllocator, Point, Range};

use crate::clipboard::{copy_block, Clipboard, ClipboardMetadata, CopyOptions};
use crate::cursor::Cursor;
use crate::display::{DisplayEvent, DisplayTable, DisplayTableSnapshot};
use crate::error::TableError;
use crate::events::Step;
use crate::history::Amendment;
use crate::projection::{SortDirection, SortOrder};
use crate::selection::Selection;
use crate::table::{SharedTable, Table};
use crate::value::Value;

const LINE_MOVE_WITH_ORDER: &str =
    "Moving lines isn't possible while an order is defined, rows would move without you noticing.";

// =============================================================================
// Events
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    CursorAdded { id: u64, position: Point },
    CursorRemoved { id: u64 },
    /// Screen positions.
    CursorMoved { id: u64, old: Point, new: Point },
    SelectionAdded { id: u64, range: Range },
    SelectionRemoved { id: u64 },
    SelectionChanged { id: u64, old: Range, new: Range },
    ModifiedStatusChanged(bool),
    /// Any other change of the underlying display.
    Display(DisplayEvent),
    /// An operation was refused; the message is meant for the user.
    Warning(String),
    Destroyed,
}

/// Cursor positions around a structural edit.
#[derive(Debug, Clone)]
struct CursorChange {
    before: Vec<Point>,
    after: Vec<Point>,
}

/// Serialized form of an editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorSnapshot {
    pub display_table: DisplayTableSnapshot,
    #[serde(default)]
    pub cursors: Vec<Point>,
    #[serde(default)]
    pub selections: Vec<Range>,
}

// =============================================================================
// TableEditor
// =============================================================================

pub struct TableEditor {
    id: u64,
    ids: IdAllocator,
    display: DisplayTable,
    cursors: Vec<Cursor>,
    selections: Vec<Selection>,
    events: Vec<EditorEvent>,
    destroyed: bool,
}

impl TableEditor {
    /// Edit `table` through a new display. The editor holds a reference on the table.
    pub fn new(table: SharedTable, settings: &Settings, ids: &IdAllocator) -> Self {
        let display = DisplayTable::new(table, settings, ids);
        Self::with_display(display, ids)
    }

    /// Edit a new, empty table.
    pub fn with_new_table(settings: &Settings, ids: &IdAllocator) -> Self {
        Self::new(Table::new(ids).into_shared(), settings, ids)
    }

    pub fn with_display(display: DisplayTable, ids: &IdAllocator) -> Self {
        Self::with_cursors(display, ids, &[], &[])
    }

    fn with_cursors(display: DisplayTable, ids: &IdAllocator, cursors: &[Point], selections: &[Range]) -> Self {
        {
            let mut table = display.table().borrow_mut();
            table.retain();
            table.set_history_capacity(display.settings().undo_history_size);
        }
        let mut editor = Self {
            id: ids.allocate(),
            ids: ids.clone(),
            display,
            cursors: Vec::new(),
            selections: Vec::new(),
            events: Vec::new(),
            destroyed: false,
        };
        if selections.is_empty() {
            editor.add_cursor_at_screen_position(Point::ZERO);
        } else {
            for (i, range) in selections.iter().enumerate() {
                let position = cursors.get(i).copied().unwrap_or(range.start);
                editor.create_cursor_and_selection(position, Some(*range));
            }
        }
        editor
    }

    pub fn from_snapshot(snapshot: EditorSnapshot, settings: &Settings, ids: &IdAllocator) -> Result<Self, TableError> {
        let display = DisplayTable::from_snapshot(snapshot.display_table, settings, ids)?;
        let mut editor = Self::with_cursors(display, ids, &snapshot.cursors, &snapshot.selections);
        editor.events.clear();
        Ok(editor)
    }

    pub fn snapshot(&self) -> EditorSnapshot {
        EditorSnapshot {
            display_table: self.display.snapshot(),
            cursors: self.cursor_screen_positions(),
            selections: self.selected_ranges(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn display(&self) -> &DisplayTable {
        &self.display
    }

    /// Run `f` against the display, then bring the editor up to date.
    pub fn edit_display<R>(&mut self, f: impl FnOnce(&mut DisplayTable) -> R) -> R {
        self.sync();
        let result = f(&mut self.display);
        self.sync();
        result
    }

    pub fn table(&self) -> &SharedTable {
        self.display.table()
    }

    fn table_mut(&self) -> RefMut<'_, Table> {
        self.display.table().borrow_mut()
    }

    pub fn settings(&self) -> &Settings {
        self.display.settings()
    }

    pub fn apply_settings(&mut self, settings: &Settings) {
        self.display.apply_settings(settings);
        self.table_mut().set_history_capacity(settings.undo_history_size);
        self.sync();
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Drop every cursor, detach from the display and release the table.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.was_destroyed();
        self.display.destroy();
        self.table_mut().release();
    }

    fn was_destroyed(&mut self) {
        self.cursors.clear();
        self.selections.clear();
        self.destroyed = true;
        self.events.push(EditorEvent::Destroyed);
    }

    /// Catch up with edits made through other holders of the table.
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

    pub fn drain_events(&mut self) -> Vec<EditorEvent> {
        mem::take(&mut self.events)
    }

    fn warn(&mut self, message: &str) {
        log::warn!("editor {}: {}", self.id, message);
        self.events.push(EditorEvent::Warning(message.to_string()));
    }

    // =========================================================================
    // Display event translation
    // =========================================================================

    /// Pull pending display events, keep cursors inside the table and
    /// replay cursor positions attached to undone or redone steps.
    pub fn sync(&mut self) {
        if self.destroyed {
            return;
        }
        self.display.sync();
        let events = self.display.drain_events();
        if events.is_empty() {
            return;
        }

        let mut replays = Vec::new();
        let mut destroyed = false;
        for event in events {
            match event {
                DisplayEvent::Replay { amendment, step } => {
                    if let Some(change) = amendment.payload_for::<CursorChange>(self.id) {
                        replays.push((change.clone(), step));
                    }
                }
                DisplayEvent::Destroyed => destroyed = true,
                DisplayEvent::ModifiedStatusChanged(modified) => {
                    self.events.push(EditorEvent::ModifiedStatusChanged(modified));
                }
                event => self.events.push(EditorEvent::Display(event)),
            }
        }

        if destroyed {
            self.was_destroyed();
            return;
        }

        self.ensure_valid_cursors();
        for (change, step) in replays {
            let positions = match step {
                Step::Undo => change.before,
                Step::Redo => change.after,
            };
            for (index, position) in positions.into_iter().enumerate().take(self.cursors.len()) {
                self.set_cursor_position(index, position, true);
            }
        }
        self.merge_cursors();
        self.merge_selections();
    }

    /// Clamp every cursor and selection into the table.
    fn ensure_valid_cursors(&mut self) {
        let table = self.table_range();
        let last = Point::new(
            table.end.row.saturating_sub(1),
            table.end.column.saturating_sub(1),
        );
        for index in 0..self.cursors.len() {
            let position = self.cursors[index].position();
            let clamped = Point::new(position.row.min(last.row), position.column.min(last.column));
            self.set_cursor_position(index, clamped, false);

            let range = self.selections[index].range();
            match range.intersection(&table) {
                Some(clipped) if clipped.contains_point(clamped) => self.set_selection_range(index, clipped),
                _ => self.reset_selection(index),
            }
        }
    }

    // =========================================================================
    // Ranges
    // =========================================================================

    pub fn screen_row_count(&self) -> usize {
        self.display.screen_row_count()
    }

    pub fn screen_column_count(&self) -> usize {
        self.display.screen_column_count()
    }

    pub fn table_range(&self) -> Range {
        self.display.screen_range()
    }

    pub fn row_range(&self, row: usize) -> Range {
        Range::from_spans(row..row + 1, 0..self.screen_column_count())
    }

    pub fn rows_range(&self, rows: ops::Range<usize>) -> Range {
        Range::from_spans(rows, 0..self.screen_column_count())
    }

    pub fn column_range(&self, column: usize) -> Range {
        Range::from_spans(0..self.screen_row_count(), column..column + 1)
    }

    // =========================================================================
    // Cursor/selection pairs
    // =========================================================================

    fn create_cursor_and_selection(&mut self, position: Point, range: Option<Range>) -> usize {
        let id = self.ids.allocate();
        let cursor = Cursor::new(id, position);
        let range = range.unwrap_or_else(|| cursor.range(self.screen_row_count(), self.screen_column_count()));
        self.cursors.push(cursor);
        self.selections.push(Selection::new(id, range));
        self.events.push(EditorEvent::SelectionAdded { id, range });
        self.events.push(EditorEvent::CursorAdded { id, position });
        self.cursors.len() - 1
    }

    fn remove_pair(&mut self, index: usize) {
        let cursor = self.cursors.remove(index);
        self.selections.remove(index);
        self.events.push(EditorEvent::SelectionRemoved { id: cursor.id() });
        self.events.push(EditorEvent::CursorRemoved { id: cursor.id() });
    }

    /// Remove one cursor and its selection. The last remaining pair is kept.
    pub fn remove_cursor(&mut self, index: usize) -> bool {
        self.sync();
        if self.cursors.len() <= 1 || index >= self.cursors.len() {
            return false;
        }
        self.remove_pair(index);
        true
    }

    fn set_cursor_position(&mut self, index: usize, position: Point, reset_selection: bool) {
        let Some(cursor) = self.cursors.get_mut(index) else {
            return;
        };
        let id = cursor.id();
        if let Some(old) = cursor.set_position(position) {
            self.events.push(EditorEvent::CursorMoved { id, old, new: position });
            if reset_selection {
                self.reset_selection(index);
            }
        }
    }

    fn reset_selection(&mut self, index: usize) {
        let range = self.cursors[index].range(self.screen_row_count(), self.screen_column_count());
        self.set_selection_range(index, range);
    }

    fn set_selection_range(&mut self, index: usize, range: Range) {
        let Some(selection) = self.selections.get_mut(index) else {
            return;
        };
        let id = selection.id();
        if let Some(old) = selection.set_range(range) {
            self.events.push(EditorEvent::SelectionChanged { id, old, new: range });
        }
    }

    /// Set a selection range, moving its cursor to the range start when the
    /// cursor would fall outside.
    fn select_range(&mut self, index: usize, range: Range) {
        self.set_selection_range(index, range);
        if !range.contains_point(self.cursors[index].position()) {
            self.set_cursor_position(index, range.start, false);
        }
    }

    fn merge_cursors(&mut self) {
        let mut seen = FxHashSet::default();
        let mut index = 0;
        while index < self.cursors.len() {
            if seen.insert(self.cursors[index].position()) {
                index += 1;
            } else {
                self.remove_pair(index);
            }
        }
    }

    fn merge_selections(&mut self) {
        let mut index = 0;
        while index < self.selections.len() {
            let range = self.selections[index].range();
            let contained = self
                .selections
                .iter()
                .enumerate()
                .any(|(other, selection)| other != index && selection.range().contains_range(&range));
            if contained {
                self.remove_pair(index);
            } else {
                index += 1;
            }
        }
    }

    // =========================================================================
    // Cursor queries
    // =========================================================================

    pub fn cursors(&self) -> &[Cursor] {
        &self.cursors
    }

    pub fn cursor_count(&self) -> usize {
        self.cursors.len()
    }

    pub fn has_multiple_cursors(&self) -> bool {
        self.cursors.len() > 1
    }

    pub fn last_cursor(&self) -> Option<&Cursor> {
        self.cursors.last()
    }

    pub fn cursors_in_row_order(&self) -> Vec<&Cursor> {
        let mut cursors: Vec<&Cursor> = self.cursors.iter().collect();
        cursors.sort_by_key(|c| c.position().row);
        cursors
    }

    pub fn cursors_in_column_order(&self) -> Vec<&Cursor> {
        let mut cursors: Vec<&Cursor> = self.cursors.iter().collect();
        cursors.sort_by_key(|c| c.position().column);
        cursors
    }

    fn indices_by_key(&self, key: impl Fn(Point) -> usize) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.cursors.len()).collect();
        indices.sort_by_key(|&i| key(self.cursors[i].position()));
        indices
    }

    pub fn cursor_screen_position(&self) -> Point {
        self.last_cursor().map(Cursor::position).unwrap_or_default()
    }

    pub fn cursor_screen_positions(&self) -> Vec<Point> {
        self.cursors.iter().map(Cursor::position).collect()
    }

    /// Model position under the last cursor.
    pub fn cursor_position(&self) -> Point {
        self.display.model_position(self.cursor_screen_position())
    }

    pub fn cursor_positions(&self) -> Vec<Point> {
        self.cursors.iter().map(|c| self.display.model_position(c.position())).collect()
    }

    pub fn cursor_value(&self) -> Value {
        self.display.value_or_empty(self.cursor_screen_position())
    }

    pub fn cursor_values(&self) -> Vec<Value> {
        self.cursors.iter().map(|c| self.display.value_or_empty(c.position())).collect()
    }

    // =========================================================================
    // Adding and placing cursors
    // =========================================================================

    /// Does nothing when a cursor already sits at `position`.
    pub fn add_cursor_at_screen_position(&mut self, position: Point) {
        self.sync();
        if self.destroyed || self.cursors.iter().any(|c| c.position() == position) {
            return;
        }
        self.create_cursor_and_selection(position, None);
    }

    pub fn add_cursor_at_position(&mut self, position: Point) {
        self.sync();
        let position = self.display.screen_position(position);
        self.add_cursor_at_screen_position(position);
    }

    pub fn add_cursor_below_last_selection(&mut self) {
        self.sync();
        let range = self.selected_range();
        let position = self.cursor_screen_position();
        if range.end.row < self.screen_row_count() {
            self.add_cursor_at_screen_position(Point::new(range.end.row, position.column));
        }
    }

    pub fn add_cursor_above_last_selection(&mut self) {
        self.sync();
        let range = self.selected_range();
        let position = self.cursor_screen_position();
        if let Some(row) = range.start.row.checked_sub(1) {
            self.add_cursor_at_screen_position(Point::new(row, position.column));
        }
    }

    pub fn add_cursor_left_of_last_selection(&mut self) {
        self.sync();
        let range = self.selected_range();
        let position = self.cursor_screen_position();
        if let Some(column) = range.start.column.checked_sub(1) {
            self.add_cursor_at_screen_position(Point::new(position.row, column));
        }
    }

    pub fn add_cursor_right_of_last_selection(&mut self) {
        self.sync();
        let range = self.selected_range();
        let position = self.cursor_screen_position();
        if range.end.column < self.screen_column_count() {
            self.add_cursor_at_screen_position(Point::new(position.row, range.end.column));
        }
    }

    /// Move every cursor to `position`; they merge into one.
    pub fn set_cursor_at_screen_position(&mut self, position: Point) {
        self.move_cursors(|_, _, _| (position, true));
    }

    pub fn set_cursor_at_position(&mut self, position: Point) {
        self.sync();
        let position = self.display.screen_position(position);
        self.set_cursor_at_screen_position(position);
    }

    /// Put the cursor on a one-based `row` or `row:column` target, where the
    /// column is a number or a column name. The target is clamped into the
    /// table; the new cursor position is returned.
    pub fn go_to_line(&mut self, target: &str) -> Result<Point, TableError> {
        self.prepare()?;
        let invalid = || TableError::InvalidTarget(target.to_string());
        let (row, column) = match target.split_once(':') {
            Some((row, column)) => (row.trim(), column.trim()),
            None => (target.trim(), ""),
        };
        let row: usize = row.parse().map_err(|_| invalid())?;
        let column = if column.is_empty() {
            0
        } else if let Ok(column) = column.parse::<usize>() {
            column.saturating_sub(1)
        } else {
            self.table()
                .borrow()
                .column_index(column)
                .ok_or_else(|| TableError::UnknownColumn(column.to_string()))?
        };

        let position = Point::new(
            row.saturating_sub(1).min(self.screen_row_count().saturating_sub(1)),
            column.min(self.screen_column_count().saturating_sub(1)),
        );
        self.set_cursor_at_screen_position(position);
        Ok(self.cursor_screen_position())
    }

    // =========================================================================
    // Cursor movement
    // =========================================================================

    /// Compute each cursor's new position with `movement`, which also says
    /// whether the selection resets to the cursor, then merge.
    fn move_cursors(&mut self, movement: impl Fn(&Cursor, &Selection, Range) -> (Point, bool)) {
        self.sync();
        let table = self.table_range();
        for index in 0..self.cursors.len() {
            let (position, reset) = movement(&self.cursors[index], &self.selections[index], table);
            self.set_cursor_position(index, position, reset);
        }
        self.merge_cursors();
    }

    pub fn move_up(&mut self, delta: usize) {
        self.move_cursors(|c, _, table| (c.up_in(delta, table), true));
    }

    pub fn move_down(&mut self, delta: usize) {
        self.move_cursors(|c, _, table| (c.down_in(delta, table), true));
    }

    pub fn move_left(&mut self, delta: usize) {
        self.move_cursors(|c, _, table| (c.left_in(delta, table), true));
    }

    pub fn move_right(&mut self, delta: usize) {
        self.move_cursors(|c, _, table| (c.right_in(delta, table), true));
    }

    pub fn move_up_in_selection(&mut self, delta: usize) {
        self.move_cursors(|c, s, table| {
            if s.spans_more_than_one_cell() {
                (c.up_in(delta, s.range()), false)
            } else {
                (c.up_in(delta, table), true)
            }
        });
    }

    pub fn move_down_in_selection(&mut self, delta: usize) {
        self.move_cursors(|c, s, table| {
            if s.spans_more_than_one_cell() {
                (c.down_in(delta, s.range()), false)
            } else {
                (c.down_in(delta, table), true)
            }
        });
    }

    pub fn move_left_in_selection(&mut self, delta: usize) {
        self.move_cursors(|c, s, table| {
            if s.spans_more_than_one_cell() {
                (c.left_in(delta, s.range()), false)
            } else {
                (c.left_in(delta, table), true)
            }
        });
    }

    pub fn move_right_in_selection(&mut self, delta: usize) {
        self.move_cursors(|c, s, table| {
            if s.spans_more_than_one_cell() {
                (c.right_in(delta, s.range()), false)
            } else {
                (c.right_in(delta, table), true)
            }
        });
    }

    pub fn move_to_top(&mut self) {
        self.move_cursors(|c, _, _| (c.to_top(), true));
    }

    pub fn move_to_bottom(&mut self) {
        self.move_cursors(|c, _, table| (c.to_bottom(table.end.row), true));
    }

    pub fn move_to_left(&mut self) {
        self.move_cursors(|c, _, _| (c.to_left(), true));
    }

    pub fn move_to_right(&mut self) {
        self.move_cursors(|c, _, table| (c.to_right(table.end.column), true));
    }

    pub fn page_up(&mut self) {
        let amount = self.settings().page_move_rows;
        self.move_cursors(|c, _, _| (c.page_up(amount), true));
    }

    pub fn page_down(&mut self) {
        let amount = self.settings().page_move_rows;
        self.move_cursors(|c, _, table| (c.page_down(amount, table.end.row), true));
    }

    pub fn page_left(&mut self) {
        let amount = self.settings().page_move_columns;
        self.move_cursors(|c, _, _| (c.page_left(amount), true));
    }

    pub fn page_right(&mut self) {
        let amount = self.settings().page_move_columns;
        self.move_cursors(|c, _, table| (c.page_right(amount, table.end.column), true));
    }

    // =========================================================================
    // Selections
    // =========================================================================

    pub fn selections(&self) -> &[Selection] {
        &self.selections
    }

    pub fn has_multiple_selections(&self) -> bool {
        self.selections.len() > 1
    }

    pub fn last_selection(&self) -> Option<&Selection> {
        self.selections.last()
    }

    pub fn selected_range(&self) -> Range {
        self.last_selection().map(Selection::range).unwrap_or_default()
    }

    pub fn selected_ranges(&self) -> Vec<Range> {
        self.selections.iter().map(Selection::range).collect()
    }

    /// Values under a selection, one vec per row.
    pub fn selection_values(&self, index: usize) -> Vec<Vec<Value>> {
        match self.selections.get(index) {
            Some(selection) if !selection.is_empty() => {
                selection.range().map(|p| self.display.value_or_empty(p))
            }
            _ => Vec::new(),
        }
    }

    fn modify_selections(&mut self, modify: impl Fn(&Selection, Point, Range) -> Range) {
        self.sync();
        let table = self.table_range();
        for index in 0..self.selections.len() {
            let range = modify(&self.selections[index], self.cursors[index].position(), table);
            self.set_selection_range(index, range);
        }
        self.merge_selections();
    }

    /// Every selection takes `range`; they merge into one.
    pub fn set_selected_range(&mut self, range: Range) {
        self.sync();
        for index in 0..self.selections.len() {
            self.select_range(index, range);
        }
        self.merge_selections();
    }

    pub fn set_selected_row(&mut self, row: usize) {
        self.sync();
        self.set_selected_range(self.row_range(row));
    }

    pub fn set_selected_row_range(&mut self, rows: ops::Range<usize>) {
        self.sync();
        self.set_selected_range(self.rows_range(rows));
    }

    /// Replace all selections with one per range, reusing existing pairs in order.
    pub fn set_selected_ranges(&mut self, ranges: &[Range]) -> Result<(), TableError> {
        self.prepare()?;
        if ranges.is_empty() {
            return Err(TableError::EmptyRangeList);
        }
        let reused = self.selections.len().min(ranges.len());
        for (index, range) in ranges.iter().enumerate() {
            if index < reused {
                self.select_range(index, *range);
            } else {
                self.create_cursor_and_selection(range.start, Some(*range));
            }
        }
        while self.selections.len() > ranges.len() {
            self.remove_pair(ranges.len());
        }
        self.merge_selections();
        Ok(())
    }

    pub fn add_selection_at_screen_range(&mut self, range: Range) {
        self.sync();
        if self.destroyed {
            return;
        }
        self.create_cursor_and_selection(range.start, Some(range));
        self.merge_selections();
    }

    pub fn expand_up(&mut self, delta: usize) {
        self.modify_selections(|s, cursor, _| s.expand_up(delta, cursor));
    }

    pub fn expand_down(&mut self, delta: usize) {
        self.modify_selections(|s, cursor, table| s.expand_down(delta, cursor, table.end.row));
    }

    pub fn expand_left(&mut self, delta: usize) {
        self.modify_selections(|s, cursor, _| s.expand_left(delta, cursor));
    }

    pub fn expand_right(&mut self, delta: usize) {
        self.modify_selections(|s, cursor, table| s.expand_right(delta, cursor, table.end.column));
    }

    pub fn expand_to_top(&mut self) {
        self.modify_selections(|s, cursor, _| s.expand_to_top(cursor));
    }

    pub fn expand_to_bottom(&mut self) {
        self.modify_selections(|s, cursor, table| s.expand_to_bottom(cursor, table.end.row));
    }

    pub fn expand_to_left(&mut self) {
        self.modify_selections(|s, cursor, _| s.expand_to_left(cursor));
    }

    pub fn expand_to_right(&mut self) {
        self.modify_selections(|s, cursor, table| s.expand_to_right(cursor, table.end.column));
    }

    pub fn select_all(&mut self) {
        self.sync();
        self.set_selected_range(self.table_range());
    }

    /// Collapse every selection onto its cursor.
    pub fn select_none(&mut self) {
        self.sync();
        for index in 0..self.selections.len() {
            self.reset_selection(index);
        }
        self.merge_selections();
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Run `f` as one undo step.
    fn batch(&mut self, f: impl FnOnce(&mut Self) -> Result<(), TableError>) -> Result<(), TableError> {
        self.prepare()?;
        self.table_mut().start_batch_transaction();
        let result = f(self);
        self.table_mut().end_batch_transaction();
        self.sync();
        result
    }

    /// Run `f` as one undo step that also restores cursor positions.
    fn manipulate_cursors(&mut self, f: impl FnOnce(&mut Self) -> Result<(), TableError>) -> Result<(), TableError> {
        self.prepare()?;
        let before = self.cursor_screen_positions();
        let revision = self.table().borrow().revision();
        let result = self.batch(f);
        let after = self.cursor_screen_positions();
        let mut table = self.table_mut();
        if table.revision() != revision {
            table.amend_last_transaction(Amendment::new(self.id, CursorChange { before, after }));
        }
        result
    }

    pub fn undo(&mut self) -> Result<bool, TableError> {
        self.prepare()?;
        let result = self.display.undo();
        self.sync();
        result
    }

    pub fn redo(&mut self) -> Result<bool, TableError> {
        self.prepare()?;
        let result = self.display.redo();
        self.sync();
        result
    }

    // =========================================================================
    // Structural edits
    // =========================================================================

    pub fn insert_row_before(&mut self) -> Result<(), TableError> {
        self.sync();
        let Point { row, column } = self.cursor_screen_position();
        let index = if row < self.screen_row_count() {
            self.display.screen_row_to_model_row(row)
        } else {
            self.display.table().borrow().row_count()
        };
        self.insert_row_at(index, column)
    }

    pub fn insert_row_after(&mut self) -> Result<(), TableError> {
        self.sync();
        let Point { row, column } = self.cursor_screen_position();
        let index = if row < self.screen_row_count() {
            self.display.screen_row_to_model_row(row) + 1
        } else {
            self.display.table().borrow().row_count()
        };
        self.insert_row_at(index, column)
    }

    fn insert_row_at(&mut self, index: usize, column: usize) -> Result<(), TableError> {
        self.manipulate_cursors(|editor| {
            let index = editor.display.add_row_at(index, Vec::new(), None)?;
            editor.sync();
            let row = editor.display.model_row_to_screen_row(index);
            editor.set_cursor_at_screen_position(Point::new(row, column));
            Ok(())
        })
    }

    pub fn delete_row_at_cursor(&mut self) -> Result<(), TableError> {
        self.sync();
        let row = self.cursor_screen_position().row;
        self.manipulate_cursors(|editor| editor.display.remove_screen_row_at(row).map(drop))
    }

    /// Remove every row touched by a selection, as one undo step.
    pub fn delete_selected_rows(&mut self) -> Result<(), TableError> {
        self.sync();
        let count = self.screen_row_count();
        let mut rows: Vec<usize> = self
            .selections
            .iter()
            .flat_map(|s| s.range().rows())
            .filter(|&row| row < count)
            .collect();
        rows.sort_unstable();
        rows.dedup();
        if rows.is_empty() {
            return Ok(());
        }
        self.manipulate_cursors(|editor| editor.display.remove_rows_at_screen_indices(&rows).map(drop))
    }

    pub fn insert_column_before(&mut self) -> Result<(), TableError> {
        self.sync();
        let column = self.cursor_screen_position().column;
        self.manipulate_cursors(|editor| {
            editor.display.add_column_at(column, None, ColumnLayout::default()).map(drop)
        })
    }

    pub fn insert_column_after(&mut self) -> Result<(), TableError> {
        self.sync();
        let column = (self.cursor_screen_position().column + 1).min(self.screen_column_count());
        self.manipulate_cursors(|editor| {
            editor.display.add_column_at(column, None, ColumnLayout::default()).map(drop)
        })
    }

    pub fn delete_column_at_cursor(&mut self) -> Result<(), TableError> {
        self.sync();
        let column = self.cursor_screen_position().column;
        self.manipulate_cursors(|editor| editor.display.remove_column_at(column))
    }

    /// Remove every column touched by a selection, as one undo step.
    pub fn delete_selected_columns(&mut self) -> Result<(), TableError> {
        self.sync();
        let count = self.screen_column_count();
        let mut columns: Vec<usize> = self
            .selections
            .iter()
            .flat_map(|s| s.range().columns())
            .filter(|&column| column < count)
            .collect();
        columns.sort_unstable();
        columns.dedup();
        if columns.is_empty() {
            return Ok(());
        }
        self.manipulate_cursors(|editor| {
            for &column in columns.iter().rev() {
                editor.display.remove_column_at(column)?;
            }
            Ok(())
        })
    }

    /// Swap each cursor's row with the one above. Refused while an order is set.
    pub fn move_line_up(&mut self) -> Result<(), TableError> {
        self.sync();
        if self.display.order().is_some() {
            self.warn(LINE_MOVE_WITH_ORDER);
            return Ok(());
        }
        let order = self.indices_by_key(|p| p.row);
        self.manipulate_cursors(|editor| {
            for index in order {
                let position = editor.cursors[index].position();
                if position.row == 0 || position.row >= editor.screen_row_count() {
                    continue;
                }
                editor.display.swap_rows(position.row, position.row - 1)?;
                editor.set_cursor_position(index, Point::new(position.row - 1, position.column), true);
            }
            Ok(())
        })
    }

    pub fn move_line_down(&mut self) -> Result<(), TableError> {
        self.sync();
        if self.display.order().is_some() {
            self.warn(LINE_MOVE_WITH_ORDER);
            return Ok(());
        }
        let order = self.indices_by_key(|p| p.row);
        self.manipulate_cursors(|editor| {
            for index in order.into_iter().rev() {
                let position = editor.cursors[index].position();
                if position.row + 1 >= editor.screen_row_count() {
                    continue;
                }
                editor.display.swap_rows(position.row, position.row + 1)?;
                editor.set_cursor_position(index, Point::new(position.row + 1, position.column), true);
            }
            Ok(())
        })
    }

    pub fn move_column_left(&mut self) -> Result<(), TableError> {
        self.sync();
        let order = self.indices_by_key(|p| p.column);
        self.manipulate_cursors(|editor| {
            for index in order {
                let position = editor.cursors[index].position();
                if position.column == 0 || position.column >= editor.screen_column_count() {
                    continue;
                }
                editor.display.swap_columns(position.column - 1, position.column)?;
                editor.set_cursor_position(index, Point::new(position.row, position.column - 1), true);
            }
            Ok(())
        })
    }

    pub fn move_column_right(&mut self) -> Result<(), TableError> {
        self.sync();
        let order = self.indices_by_key(|p| p.column);
        self.manipulate_cursors(|editor| {
            for index in order.into_iter().rev() {
                let position = editor.cursors[index].position();
                if position.column + 1 >= editor.screen_column_count() {
                    continue;
                }
                editor.display.swap_columns(position.column, position.column + 1)?;
                editor.set_cursor_position(index, Point::new(position.row, position.column + 1), true);
            }
            Ok(())
        })
    }

    // =========================================================================
    // Values and clipboard
    // =========================================================================

    /// Clear every selected cell.
    pub fn delete(&mut self) -> Result<(), TableError> {
        self.batch(|editor| {
            for range in editor.selected_ranges() {
                editor.display.set_values_in_screen_range(range, &[vec![Value::Empty]])?;
            }
            Ok(())
        })
    }

    /// Copy each selection as one block; the second and later blocks are
    /// appended to the first.
    pub fn copy_selected_cells(&self, clipboard: &mut dyn Clipboard) {
        let cells_as_selections = self.settings().copy_cells_as_selections;
        let mut maintain = false;
        for index in 0..self.selections.len() {
            let values = self.selection_values(index);
            if values.is_empty() {
                continue;
            }
            let options = CopyOptions { maintain, cells_as_selections, full_line: false };
            copy_block(clipboard, values, options);
            maintain = true;
        }
    }

    pub fn cut_selected_cells(&mut self, clipboard: &mut dyn Clipboard) -> Result<(), TableError> {
        self.sync();
        self.copy_selected_cells(clipboard);
        self.delete()
    }

    /// Paste into every selection, as one undo step.
    ///
    /// Value blocks from a table copy go one per selection, cycling. Text
    /// selections from a multi-cursor host go one per single-cell selection
    /// when the counts match, otherwise they are flattened or distributed
    /// as configured. Anything else is pasted as plain text.
    pub fn paste_clipboard(&mut self, clipboard: &dyn Clipboard) -> Result<(), TableError> {
        self.sync();
        let (text, metadata) = clipboard.read_with_metadata();
        let settings = self.settings().clone();

        self.batch(|editor| {
            let count = editor.selections.len();
            match metadata {
                Some(ClipboardMetadata { values: Some(blocks), .. }) if !blocks.is_empty() => {
                    for index in 0..count {
                        editor.fill_values(index, &blocks[index % blocks.len()])?;
                    }
                }
                Some(ClipboardMetadata { selections: Some(texts), .. }) if !texts.is_empty() => {
                    let single_cells = editor.selections.iter().all(|s| !s.spans_more_than_one_cell());
                    if settings.flatten_multi_selection_paste {
                        for index in 0..count {
                            editor.fill_text(index, &text)?;
                        }
                    } else if single_cells && count == texts.len() {
                        for (index, selection) in texts.iter().enumerate() {
                            editor.fill_text(index, &selection.text)?;
                        }
                    } else {
                        let block: Vec<Vec<Value>> = match settings.distribute_multi_selection_paste {
                            Distribution::Vertically => {
                                texts.iter().map(|s| vec![Value::from(s.text.as_str())]).collect()
                            }
                            Distribution::Horizontally => {
                                vec![texts.iter().map(|s| Value::from(s.text.as_str())).collect()]
                            }
                        };
                        for index in 0..count {
                            editor.fill_values(index, &block)?;
                        }
                    }
                }
                _ => {
                    for index in 0..count {
                        editor.fill_text(index, &text)?;
                    }
                }
            }
            Ok(())
        })
    }

    fn fill_text(&mut self, index: usize, text: &str) -> Result<(), TableError> {
        let range = self.selections[index].range();
        self.display.set_values_in_screen_range(range, &[vec![Value::from(text)]])
    }

    /// Grow the selection to fit `values`, then write them.
    fn fill_values(&mut self, index: usize, values: &[Vec<Value>]) -> Result<(), TableError> {
        let columns = values.first().map_or(0, Vec::len);
        if columns == 0 {
            return Ok(());
        }
        let range = self.selections[index].fitted_to(values.len(), columns);
        self.set_selection_range(index, range);
        self.display.set_values_in_screen_range(range, values)
    }

    // =========================================================================
    // Sorting and saving
    // =========================================================================

    pub fn sort_by(&mut self, order: impl Into<SortOrder>, direction: SortDirection) -> Result<(), TableError> {
        self.prepare()?;
        let result = self.display.sort_by(order, direction);
        self.sync();
        result
    }

    pub fn sort_by_column_name(&mut self, name: &str, direction: SortDirection) -> Result<(), TableError> {
        self.prepare()?;
        let result = self.display.sort_by_column_name(name, direction);
        self.sync();
        result
    }

    pub fn toggle_sort_direction(&mut self) {
        self.sync();
        self.display.toggle_sort_direction();
        self.sync();
    }

    pub fn reset_sort(&mut self) {
        self.sync();
        self.display.reset_sort();
        self.sync();
    }

    pub fn apply_sort(&mut self) -> Result<bool, TableError> {
        self.prepare()?;
        let result = self.display.apply_sort();
        self.sync();
        result
    }

    pub fn is_modified(&self) -> bool {
        self.table().borrow().is_modified()
    }

    pub fn save(&mut self) -> bool {
        let saved = self.table_mut().save();
        self.sync();
        saved
    }
}

impl Drop for TableEditor {
    fn drop(&mut self) {
        if self.destroyed {
            return;
        }
        if let Ok(mut table) = self.display.table().try_borrow_mut() {
            table.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::{ClipboardSelection, MemoryClipboard};

    fn n(x: f64) -> Value {
        Value::Number(x)
    }

    fn editor_with(rows: &[&[f64]]) -> TableEditor {
        let ids = IdAllocator::new();
        let columns = (0..rows.first().map_or(0, |r| r.len()))
            .map(|i| Some(format!("c{i}")))
            .collect();
        let rows = rows.iter().map(|r| r.iter().map(|&x| n(x)).collect()).collect();
        let table = Table::with_data(&ids, columns, rows).unwrap().into_shared();
        TableEditor::new(table, &Settings::default(), &ids)
    }

    fn grid(rows: usize, columns: usize) -> TableEditor {
        let data: Vec<Vec<f64>> = (0..rows)
            .map(|r| (0..columns).map(|c| (r * columns + c) as f64).collect())
            .collect();
        let slices: Vec<&[f64]> = data.iter().map(Vec::as_slice).collect();
        editor_with(&slices)
    }

    fn rows_of(editor: &TableEditor) -> Vec<Vec<Value>> {
        editor.table().borrow().rows().to_vec()
    }

    #[test]
    fn test_starts_with_one_cursor() {
        let editor = grid(3, 3);
        assert_eq!(editor.cursor_count(), 1);
        assert_eq!(editor.cursor_screen_position(), Point::ZERO);
        assert_eq!(editor.selected_range(), Range::cell((0, 0)));
        assert_eq!(editor.cursors()[0].id(), editor.selections()[0].id());
        assert_eq!(editor.table().borrow().ref_count(), 1);
    }

    #[test]
    fn test_move_right_wraps_rows() {
        let mut editor = grid(2, 2);
        editor.move_right(1);
        assert_eq!(editor.cursor_screen_position(), Point::new(0, 1));
        editor.move_right(1);
        assert_eq!(editor.cursor_screen_position(), Point::new(1, 0));
        editor.set_cursor_at_screen_position(Point::new(1, 1));
        editor.move_right(1);
        assert_eq!(editor.cursor_screen_position(), Point::new(0, 0));
    }

    #[test]
    fn test_move_resets_selection() {
        let mut editor = grid(4, 4);
        editor.expand_down(2);
        assert_eq!(editor.selected_range(), Range::new((0, 0), (3, 1)));
        editor.move_right(1);
        assert_eq!(editor.selected_range(), Range::cell((0, 1)));
    }

    #[test]
    fn test_move_in_selection_keeps_selection() {
        let mut editor = grid(4, 4);
        editor.set_selected_range(Range::new((1, 1), (3, 3)));
        assert_eq!(editor.cursor_screen_position(), Point::new(1, 1));

        editor.move_right_in_selection(1);
        editor.move_right_in_selection(1);
        assert_eq!(editor.cursor_screen_position(), Point::new(2, 1));
        assert_eq!(editor.selected_range(), Range::new((1, 1), (3, 3)));

        // Single-cell selection falls back to a plain move
        editor.select_none();
        editor.move_down_in_selection(1);
        assert_eq!(editor.cursor_screen_position(), Point::new(3, 1));
        assert_eq!(editor.selected_range(), Range::cell((3, 1)));
    }

    #[test]
    fn test_page_moves_use_settings() {
        let mut editor = grid(50, 3);
        editor.page_down();
        assert_eq!(editor.cursor_screen_position(), Point::new(20, 0));
        editor.page_down();
        editor.page_down();
        assert_eq!(editor.cursor_screen_position(), Point::new(49, 0));
        editor.page_right();
        assert_eq!(editor.cursor_screen_position(), Point::new(49, 2));
        editor.page_up();
        assert_eq!(editor.cursor_screen_position(), Point::new(29, 2));
    }

    #[test]
    fn test_cursors_merge_on_same_position() {
        let mut editor = grid(3, 3);
        editor.add_cursor_at_screen_position(Point::new(1, 0));
        editor.add_cursor_at_screen_position(Point::new(1, 0));
        assert_eq!(editor.cursor_count(), 2);
        let first = editor.cursors()[0].id();

        editor.move_to_top();
        assert_eq!(editor.cursor_count(), 1);
        assert_eq!(editor.cursors()[0].id(), first);
        assert_eq!(editor.selections().len(), 1);
    }

    #[test]
    fn test_contained_selection_is_merged() {
        let mut editor = grid(3, 3);
        editor
            .set_selected_ranges(&[Range::new((0, 0), (1, 1)), Range::new((0, 0), (2, 2))])
            .unwrap();
        assert_eq!(editor.selected_ranges(), vec![Range::new((0, 0), (2, 2))]);
        assert_eq!(editor.cursor_count(), 1);
    }

    #[test]
    fn test_identical_selections_keep_the_later() {
        let mut editor = grid(3, 3);
        editor.add_selection_at_screen_range(Range::new((1, 1), (2, 3)));
        let later = editor.selections()[1].id();
        editor.set_selected_range(Range::new((0, 0), (2, 2)));
        assert_eq!(editor.selections().len(), 1);
        assert_eq!(editor.selections()[0].id(), later);
    }

    #[test]
    fn test_set_selected_ranges_rejects_empty() {
        let mut editor = grid(2, 2);
        assert_eq!(editor.set_selected_ranges(&[]), Err(TableError::EmptyRangeList));
    }

    #[test]
    fn test_set_selected_ranges_reuses_and_drops_pairs() {
        let mut editor = grid(5, 5);
        editor
            .set_selected_ranges(&[Range::cell((0, 0)), Range::cell((1, 1)), Range::cell((2, 2))])
            .unwrap();
        assert_eq!(editor.cursor_count(), 3);
        assert_eq!(editor.cursor_screen_positions()[2], Point::new(2, 2));

        editor.set_selected_ranges(&[Range::new((3, 3), (5, 5))]).unwrap();
        assert_eq!(editor.cursor_count(), 1);
        assert_eq!(editor.cursor_screen_position(), Point::new(3, 3));
    }

    #[test]
    fn test_add_cursor_relative_to_selection() {
        let mut editor = grid(4, 4);
        editor.set_selected_range(Range::new((1, 1), (3, 2)));
        editor.add_cursor_below_last_selection();
        assert_eq!(editor.cursor_screen_position(), Point::new(3, 1));
        editor.add_cursor_above_last_selection();
        assert_eq!(editor.cursor_screen_position(), Point::new(2, 1));
        editor.add_cursor_right_of_last_selection();
        assert_eq!(editor.cursor_screen_position(), Point::new(2, 2));
        assert_eq!(editor.cursor_count(), 4);
    }

    #[test]
    fn test_insert_row_before_and_undo_restores_cursor() {
        let mut editor = grid(3, 2);
        editor.set_cursor_at_screen_position(Point::new(1, 1));
        editor.insert_row_before().unwrap();

        assert_eq!(editor.screen_row_count(), 4);
        assert_eq!(rows_of(&editor)[1], vec![Value::Empty, Value::Empty]);
        assert_eq!(editor.cursor_screen_position(), Point::new(1, 1));

        editor.move_down(1);
        assert_eq!(editor.cursor_screen_position(), Point::new(2, 1));
        editor.undo().unwrap();
        assert_eq!(editor.screen_row_count(), 3);
        assert_eq!(editor.cursor_screen_position(), Point::new(1, 1));

        editor.redo().unwrap();
        assert_eq!(editor.screen_row_count(), 4);
        assert_eq!(editor.cursor_screen_position(), Point::new(1, 1));
    }

    #[test]
    fn test_insert_row_after() {
        let mut editor = grid(2, 1);
        editor.insert_row_after().unwrap();
        assert_eq!(rows_of(&editor), vec![vec![n(0.0)], vec![Value::Empty], vec![n(1.0)]]);
        assert_eq!(editor.cursor_screen_position(), Point::new(1, 0));
    }

    #[test]
    fn test_delete_selected_rows_single_step() {
        let mut editor = grid(6, 1);
        editor
            .set_selected_ranges(&[Range::new((0, 0), (2, 1)), Range::new((1, 0), (4, 1))])
            .unwrap();
        editor.add_selection_at_screen_range(Range::cell((5, 0)));
        editor.delete_selected_rows().unwrap();

        assert_eq!(rows_of(&editor), vec![vec![n(4.0)]]);
        assert_eq!(editor.table().borrow().undo_depth(), 1);
        // Cursors clamp into what is left
        assert!(editor.cursor_screen_positions().iter().all(|p| p.row == 0));
        assert_eq!(editor.cursor_count(), 1);

        editor.undo().unwrap();
        assert_eq!(editor.screen_row_count(), 6);
        assert_eq!(rows_of(&editor)[5], vec![n(5.0)]);
    }

    #[test]
    fn test_delete_row_at_cursor_clamps_cursor() {
        let mut editor = grid(2, 2);
        editor.set_cursor_at_screen_position(Point::new(1, 1));
        editor.delete_row_at_cursor().unwrap();
        assert_eq!(editor.screen_row_count(), 1);
        assert_eq!(editor.cursor_screen_position(), Point::new(0, 1));
        assert_eq!(editor.selected_range(), Range::cell((0, 1)));
    }

    #[test]
    fn test_column_insert_and_delete() {
        let mut editor = grid(2, 2);
        editor.set_cursor_at_screen_position(Point::new(0, 1));
        editor.insert_column_after().unwrap();
        assert_eq!(editor.screen_column_count(), 3);
        assert_eq!(rows_of(&editor)[0], vec![n(0.0), n(1.0), Value::Empty]);

        editor.insert_column_before().unwrap();
        assert_eq!(rows_of(&editor)[0], vec![n(0.0), Value::Empty, n(1.0), Value::Empty]);

        editor.set_selected_range(Range::new((0, 1), (2, 4)));
        editor.delete_selected_columns().unwrap();
        assert_eq!(editor.screen_column_count(), 1);
        assert_eq!(editor.cursor_screen_position(), Point::new(0, 0));

        editor.undo().unwrap();
        assert_eq!(editor.screen_column_count(), 4);
    }

    #[test]
    fn test_move_line_down_and_undo() {
        let mut editor = grid(3, 1);
        editor.move_line_down().unwrap();
        assert_eq!(rows_of(&editor), vec![vec![n(1.0)], vec![n(0.0)], vec![n(2.0)]]);
        assert_eq!(editor.cursor_screen_position(), Point::new(1, 0));

        editor.undo().unwrap();
        assert_eq!(rows_of(&editor)[0], vec![n(0.0)]);
        assert_eq!(editor.cursor_screen_position(), Point::new(0, 0));
    }

    #[test]
    fn test_move_line_refused_with_order() {
        let mut editor = grid(3, 1);
        editor.sort_by(0, SortDirection::Descending).unwrap();
        editor.drain_events();
        editor.move_line_up().unwrap();

        let events = editor.drain_events();
        assert!(matches!(events.as_slice(), [EditorEvent::Warning(_)]));
        assert_eq!(editor.table().borrow().undo_depth(), 0);
    }

    #[test]
    fn test_move_column_right_at_edge_is_skipped() {
        let mut editor = grid(1, 2);
        editor.move_column_right().unwrap();
        assert_eq!(rows_of(&editor)[0], vec![n(1.0), n(0.0)]);
        editor.move_column_right().unwrap();
        assert_eq!(rows_of(&editor)[0], vec![n(1.0), n(0.0)]);
        assert_eq!(editor.table().borrow().undo_depth(), 1);
    }

    #[test]
    fn test_delete_clears_selections() {
        let mut editor = grid(3, 3);
        editor.set_selected_range(Range::new((0, 0), (2, 2)));
        editor.add_selection_at_screen_range(Range::cell((2, 2)));
        editor.delete().unwrap();

        let rows = rows_of(&editor);
        assert_eq!(rows[0], vec![Value::Empty, Value::Empty, n(2.0)]);
        assert_eq!(rows[2][2], Value::Empty);
        assert_eq!(editor.table().borrow().undo_depth(), 1);
    }

    #[test]
    fn test_copy_and_paste_block() {
        let mut editor = grid(4, 4);
        let mut clipboard = MemoryClipboard::new();
        editor.set_selected_range(Range::new((0, 0), (2, 2)));
        editor.copy_selected_cells(&mut clipboard);
        assert_eq!(clipboard.text(), "0\t1\n4\t5");

        editor.set_selected_range(Range::cell((2, 2)));
        editor.paste_clipboard(&clipboard).unwrap();
        let rows = rows_of(&editor);
        assert_eq!(rows[2][2..], [n(0.0), n(1.0)]);
        assert_eq!(rows[3][2..], [n(4.0), n(5.0)]);
        // The selection grew to the pasted block
        assert_eq!(editor.selected_range(), Range::new((2, 2), (4, 4)));
    }

    #[test]
    fn test_paste_plain_text_fills_selection() {
        let mut editor = grid(2, 2);
        let mut clipboard = MemoryClipboard::new();
        clipboard.write("x".into(), None);
        editor.select_all();
        editor.paste_clipboard(&clipboard).unwrap();
        assert!(rows_of(&editor).iter().flatten().all(|v| *v == Value::from("x")));
    }

    #[test]
    fn test_paste_text_selections_positionally() {
        let mut editor = grid(3, 1);
        editor.add_cursor_at_screen_position(Point::new(2, 0));
        let mut clipboard = MemoryClipboard::new();
        let metadata = ClipboardMetadata {
            selections: Some(vec![ClipboardSelection::new("a", false), ClipboardSelection::new("b", false)]),
            ..Default::default()
        };
        clipboard.write("a\nb".into(), Some(metadata));
        editor.paste_clipboard(&clipboard).unwrap();

        let rows = rows_of(&editor);
        assert_eq!(rows[0][0], Value::from("a"));
        assert_eq!(rows[2][0], Value::from("b"));
    }

    #[test]
    fn test_paste_text_selections_distributed_horizontally() {
        let ids = IdAllocator::new();
        let settings = Settings {
            distribute_multi_selection_paste: Distribution::Horizontally,
            ..Settings::default()
        };
        let table = Table::with_data(&ids, vec![None, None, None], vec![vec![]; 2]).unwrap().into_shared();
        let mut editor = TableEditor::new(table, &settings, &ids);

        let mut clipboard = MemoryClipboard::new();
        let metadata = ClipboardMetadata {
            selections: Some(vec![
                ClipboardSelection::new("a", false),
                ClipboardSelection::new("b", false),
                ClipboardSelection::new("c", false),
            ]),
            ..Default::default()
        };
        clipboard.write("a\nb\nc".into(), Some(metadata));
        editor.paste_clipboard(&clipboard).unwrap();

        assert_eq!(rows_of(&editor)[0], vec![Value::from("a"), Value::from("b"), Value::from("c")]);
        assert_eq!(editor.selected_range(), Range::new((0, 0), (1, 3)));
    }

    #[test]
    fn test_cut_copies_then_clears() {
        let mut editor = grid(1, 2);
        let mut clipboard = MemoryClipboard::new();
        editor.cut_selected_cells(&mut clipboard).unwrap();
        assert_eq!(clipboard.text(), "0");
        assert_eq!(rows_of(&editor)[0][0], Value::Empty);
    }

    #[test]
    fn test_structural_change_clamps_every_cursor() {
        let mut editor = grid(3, 3);
        editor.add_cursor_at_screen_position(Point::new(2, 2));
        editor.edit_display(|display| display.remove_rows_in_range(1..3)).unwrap();
        assert_eq!(editor.cursor_screen_positions(), vec![Point::new(0, 0), Point::new(0, 2)]);
    }

    #[test]
    fn test_events_describe_cursor_changes() {
        let mut editor = grid(2, 2);
        editor.drain_events();
        editor.move_down(1);
        let id = editor.cursors()[0].id();
        let events = editor.drain_events();
        assert!(events.contains(&EditorEvent::CursorMoved { id, old: Point::new(0, 0), new: Point::new(1, 0) }));
        assert!(events.contains(&EditorEvent::SelectionChanged {
            id,
            old: Range::cell((0, 0)),
            new: Range::cell((1, 0)),
        }));
    }

    #[test]
    fn test_destroy_releases_table() {
        let mut editor = grid(1, 1);
        let table = editor.table().clone();
        editor.destroy();
        assert!(editor.is_destroyed());
        assert_eq!(editor.cursor_count(), 0);
        assert!(table.borrow().is_destroyed());
        assert_eq!(editor.insert_row_after(), Err(TableError::Destroyed));
    }

    #[test]
    fn test_shared_table_survives_one_editor() {
        let ids = IdAllocator::new();
        let table = Table::with_data(&ids, vec![Some("a".into())], vec![vec![n(1.0)]]).unwrap().into_shared();
        let mut first = TableEditor::new(table.clone(), &Settings::default(), &ids);
        let mut second = TableEditor::new(table.clone(), &Settings::default(), &ids);
        assert_eq!(table.borrow().ref_count(), 2);

        first.destroy();
        assert!(!table.borrow().is_destroyed());
        second.insert_row_after().unwrap();
        assert_eq!(table.borrow().row_count(), 2);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut editor = grid(3, 3);
        editor.add_selection_at_screen_range(Range::new((1, 1), (3, 3)));
        let snapshot = editor.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: EditorSnapshot = serde_json::from_str(&json).unwrap();

        let editor = TableEditor::from_snapshot(restored, &Settings::default(), &IdAllocator::new()).unwrap();
        assert_eq!(editor.selected_ranges(), vec![Range::cell((0, 0)), Range::new((1, 1), (3, 3))]);
        assert_eq!(editor.cursor_screen_positions(), vec![Point::new(0, 0), Point::new(1, 1)]);
    }

    #[test]
    fn test_go_to_line_targets() {
        let mut editor = grid(30, 4);
        assert_eq!(editor.go_to_line("12"), Ok(Point::new(11, 0)));
        assert_eq!(editor.go_to_line("5:3"), Ok(Point::new(4, 2)));
        assert_eq!(editor.go_to_line(" 7 : c1 "), Ok(Point::new(6, 1)));
        assert_eq!(editor.go_to_line("999:9"), Ok(Point::new(29, 3)));
        assert_eq!(editor.cursor_count(), 1);

        assert_eq!(editor.go_to_line("x"), Err(TableError::InvalidTarget("x".to_string())));
        assert_eq!(editor.go_to_line("2:nope"), Err(TableError::UnknownColumn("nope".to_string())));
        assert_eq!(editor.cursor_screen_position(), Point::new(29, 3));
    }
}
