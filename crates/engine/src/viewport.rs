//! Virtualized rendering of a [`TableEditor`] into pooled widgets.
//!
//! Only the window of rows and columns intersecting the viewport, widened by
//! the overdraw margins, holds widgets. Each update compares the new window
//! with the one rendered last and does the least work that brings the widgets
//! in line: nothing, a full populate, a rebuild for a disjoint jump, or
//! per-edge release/create while scrolling. Widgets that stay in the window
//! are refreshed in place when the editor marked them dirty.
//!
//! The renderer never pulls events itself. The host feeds it every
//! [`EditorEvent`] through [`TableRenderer::handle_event`] and calls
//! [`TableRenderer::frame`] once per display refresh; any number of dirty
//! marks between two frames collapse into one update.

use std::ops;

use rustc_hash::{FxHashMap, FxHashSet};

use tabula_core::{column_name, Align, Point, Range};

use crate::display::{CellRect, DisplayEvent, DisplayTable};
use crate::editor::{EditorEvent, TableEditor};
use crate::pool::{Pool, PoolKey};
use crate::projection::SortDirection;
use crate::value::Value;

// =============================================================================
// Widgets
// =============================================================================

/// Scroll position and size of the visible area, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub scroll_top: f32,
    pub scroll_left: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self { scroll_top: 0.0, scroll_left: 0.0, width, height }
    }

    pub fn scrolled_to(self, scroll_top: f32, scroll_left: f32) -> Self {
        Self { scroll_top, scroll_left, ..self }
    }

    /// Scroll the least amount that shows the whole screen cell at `position`.
    /// Returns whether the viewport moved.
    pub fn reveal_cell(&mut self, display: &DisplayTable, position: Point) -> bool {
        let rect = display.screen_cell_rect(position);
        let top = reveal_span(self.scroll_top, self.height, rect.top, rect.height);
        let left = reveal_span(self.scroll_left, self.width, rect.left, rect.width);
        self.move_to(top, left)
    }

    /// One auto-scroll step while a drag hovers the screen cell at `position`.
    ///
    /// Hovering the last visible entries scrolls forward and hovering the
    /// first ones scrolls back, by `scroll.dragSpeed` of the viewport extent.
    pub fn scroll_during_drag(&mut self, display: &DisplayTable, position: Point) -> bool {
        let speed = display.settings().drag_scroll_speed;
        let rows = DragAxis {
            scroll: self.scroll_top,
            extent: self.height,
            total: display.rows_height(),
            first: display.screen_row_index_at_pixel(self.scroll_top).unwrap_or(0),
            last: display.screen_row_index_at_pixel(self.scroll_top + self.height).unwrap_or(0),
            offset: display.screen_row_offset_at(position.row),
            size: display.screen_row_height_at(position.row),
        };
        let columns = DragAxis {
            scroll: self.scroll_left,
            extent: self.width,
            total: display.columns_width(),
            first: display.screen_column_index_at_pixel(self.scroll_left).unwrap_or(0),
            last: display.screen_column_index_at_pixel(self.scroll_left + self.width).unwrap_or(0),
            offset: display.screen_column_offset_at(position.column),
            size: display.screen_column_width_at(position.column),
        };
        let top = rows.step(position.row, speed);
        let left = columns.step(position.column, speed);
        self.move_to(top, left)
    }

    fn move_to(&mut self, top: f32, left: f32) -> bool {
        let moved = top != self.scroll_top || left != self.scroll_left;
        self.scroll_top = top;
        self.scroll_left = left;
        moved
    }
}

/// New scroll offset along one axis so `[offset, offset + size)` is in view.
fn reveal_span(scroll: f32, extent: f32, offset: f32, size: f32) -> f32 {
    if offset >= scroll && offset + size <= scroll + extent {
        scroll
    } else if offset > scroll {
        (offset - (extent - size)).max(0.0)
    } else {
        offset
    }
}

/// One scroll axis as seen by a drag.
struct DragAxis {
    scroll: f32,
    extent: f32,
    total: f32,
    first: usize,
    last: usize,
    /// Offset and size of the hovered entry.
    offset: f32,
    size: f32,
}

impl DragAxis {
    fn step(&self, index: usize, speed: f32) -> f32 {
        let step = self.extent * speed;
        let near_far_edge = self.offset + self.size >= self.scroll + self.extent - self.extent / 5.0;
        if index + 1 >= self.last && near_far_edge {
            let max = (self.total - self.extent).max(self.scroll);
            (self.scroll + step).min(max)
        } else if index <= self.first + 1 {
            (self.scroll - step).max(0.0)
        } else {
            self.scroll
        }
    }
}

/// One body cell, in screen coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct CellWidget {
    pub position: Point,
    pub value: Value,
    pub rect: CellRect,
    pub align: Align,
    pub selected: bool,
    pub cursor: bool,
}

impl Default for CellWidget {
    fn default() -> Self {
        Self {
            position: Point::ZERO,
            value: Value::Empty,
            rect: CellRect { top: 0.0, left: 0.0, width: 0.0, height: 0.0 },
            align: Align::Left,
            selected: false,
            cursor: false,
        }
    }
}

/// Column header.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HeaderWidget {
    pub column: usize,
    pub name: String,
    pub left: f32,
    pub width: f32,
    pub align: Align,
    pub selected: bool,
    /// Set on the column the rows are sorted by.
    pub sort: Option<SortDirection>,
}

/// Row number in the left gutter.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GutterWidget {
    pub row: usize,
    pub top: f32,
    pub height: f32,
    pub selected: bool,
}

// =============================================================================
// Reports
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderKind {
    /// Same window, nothing dirty.
    Skipped,
    /// Nothing was rendered before.
    Initial,
    /// The new window shares no cell with the old one.
    Rebuild,
    /// Edge deltas against an overlapping window.
    Scroll,
    /// Same window, dirty widgets refreshed.
    Refresh,
    /// The editor is gone; every widget went back to its pool.
    Cleared,
}

/// What one update did.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderReport {
    pub kind: RenderKind,
    pub window: Range,
    pub rows_created: Vec<usize>,
    pub rows_released: Vec<usize>,
    pub columns_created: Vec<usize>,
    pub columns_released: Vec<usize>,
    pub cells_created: usize,
    pub cells_released: usize,
    pub cells_refreshed: usize,
}

impl RenderReport {
    fn new(kind: RenderKind, window: Range) -> Self {
        Self {
            kind,
            window,
            rows_created: Vec::new(),
            rows_released: Vec::new(),
            columns_created: Vec::new(),
            columns_released: Vec::new(),
            cells_created: 0,
            cells_released: 0,
            cells_refreshed: 0,
        }
    }
}

// =============================================================================
// Dirty tracking
// =============================================================================

#[derive(Debug, Default)]
struct DirtySet {
    cells: FxHashSet<Point>,
    rows: FxHashSet<usize>,
    columns: FxHashSet<usize>,
    whole: bool,
}

impl DirtySet {
    fn is_empty(&self) -> bool {
        !self.whole && self.cells.is_empty() && self.rows.is_empty() && self.columns.is_empty()
    }

    fn clear(&mut self) {
        self.cells.clear();
        self.rows.clear();
        self.columns.clear();
        self.whole = false;
    }
}

/// Editor state captured once per update.
struct FrameState<'a> {
    display: &'a DisplayTable,
    cursors: FxHashSet<Point>,
    selections: Vec<Range>,
}

impl<'a> FrameState<'a> {
    fn new(editor: &'a TableEditor) -> Self {
        Self {
            display: editor.display(),
            cursors: editor.cursors().iter().map(|c| c.position()).collect(),
            selections: editor.selections().iter().map(|s| s.range()).collect(),
        }
    }

    fn fill_cell(&self, widget: &mut CellWidget, position: Point) {
        widget.position = position;
        widget.value = self.display.value_or_empty(position);
        widget.rect = self.display.screen_cell_rect(position);
        widget.align = self.display.screen_column_align_at(position.column);
        widget.selected = self.selections.iter().any(|r| r.contains_point(position));
        widget.cursor = self.cursors.contains(&position);
    }

    fn fill_header(&self, widget: &mut HeaderWidget, column: usize) {
        let display = self.display;
        widget.column = column;
        widget.name = display
            .screen_column(column)
            .and_then(|c| c.name())
            .map(str::to_owned)
            .unwrap_or_else(|| column_name(column, display.settings().column_naming));
        widget.left = display.screen_column_offset_at(column);
        widget.width = display.screen_column_width_at(column);
        widget.align = display.screen_column_align_at(column);
        widget.selected = self.selections.iter().any(|r| r.contains_column(column));
        widget.sort = display
            .order()
            .and_then(|order| order.column())
            .filter(|&sorted| sorted == column)
            .map(|_| display.direction());
    }

    fn fill_gutter(&self, widget: &mut GutterWidget, row: usize) {
        widget.row = row;
        widget.top = self.display.screen_row_offset_at(row);
        widget.height = self.display.screen_row_height_at(row);
        widget.selected = self.selections.iter().any(|r| r.contains_row(row));
    }
}

// =============================================================================
// TableRenderer
// =============================================================================

#[derive(Debug, Default)]
pub struct TableRenderer {
    cells: Pool<CellWidget>,
    headers: Pool<HeaderWidget>,
    gutters: Pool<GutterWidget>,
    cell_keys: FxHashMap<Point, PoolKey>,
    header_keys: FxHashMap<usize, PoolKey>,
    gutter_keys: FxHashMap<usize, PoolKey>,
    window: Option<Range>,
    dirty: DirtySet,
    /// Last known cursor and selection per id, to repaint what they leave.
    cursor_marks: FxHashMap<u64, Point>,
    selection_marks: FxHashMap<u64, Range>,
    row_overdraw: Option<usize>,
    column_overdraw: Option<usize>,
    update_requested: bool,
}

impl TableRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the configured overdraw margins.
    pub fn with_overdraw(mut self, rows: usize, columns: usize) -> Self {
        self.row_overdraw = Some(rows);
        self.column_overdraw = Some(columns);
        self
    }

    pub fn set_row_overdraw(&mut self, rows: Option<usize>) {
        self.row_overdraw = rows;
        self.request_update();
    }

    pub fn set_column_overdraw(&mut self, columns: Option<usize>) {
        self.column_overdraw = columns;
        self.request_update();
    }

    /// The window rendered by the last update.
    pub fn window(&self) -> Option<Range> {
        self.window
    }

    pub fn cell_at(&self, position: Point) -> Option<&CellWidget> {
        self.cell_keys.get(&position).and_then(|&key| self.cells.get(key))
    }

    pub fn header_at(&self, column: usize) -> Option<&HeaderWidget> {
        self.header_keys.get(&column).and_then(|&key| self.headers.get(key))
    }

    pub fn gutter_at(&self, row: usize) -> Option<&GutterWidget> {
        self.gutter_keys.get(&row).and_then(|&key| self.gutters.get(key))
    }

    pub fn cells(&self) -> impl Iterator<Item = &CellWidget> {
        self.cells.iter()
    }

    pub fn cell_pool(&self) -> &Pool<CellWidget> {
        &self.cells
    }

    pub fn header_pool(&self) -> &Pool<HeaderWidget> {
        &self.headers
    }

    pub fn gutter_pool(&self) -> &Pool<GutterWidget> {
        &self.gutters
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    /// Ask for an update on the next frame. Repeated requests coalesce.
    pub fn request_update(&mut self) {
        self.update_requested = true;
    }

    pub fn update_requested(&self) -> bool {
        self.update_requested
    }

    /// Run the pending update, if any. Called once per display refresh.
    pub fn frame(&mut self, editor: &TableEditor, viewport: &Viewport) -> Option<RenderReport> {
        if !std::mem::take(&mut self.update_requested) {
            return None;
        }
        Some(self.update(editor, viewport))
    }

    // =========================================================================
    // Dirty marking
    // =========================================================================

    pub fn handle_events<'e>(&mut self, events: impl IntoIterator<Item = &'e EditorEvent>) {
        for event in events {
            self.handle_event(event);
        }
    }

    pub fn handle_event(&mut self, event: &EditorEvent) {
        match event {
            EditorEvent::CursorAdded { id, position } => {
                self.cursor_marks.insert(*id, *position);
                self.mark_cell(*position);
            }
            EditorEvent::CursorMoved { id, old, new } => {
                self.cursor_marks.insert(*id, *new);
                self.mark_cell(*old);
                self.mark_cell(*new);
            }
            EditorEvent::CursorRemoved { id } => match self.cursor_marks.remove(id) {
                Some(position) => self.mark_cell(position),
                None => self.mark_whole(),
            },
            EditorEvent::SelectionAdded { id, range } => {
                self.selection_marks.insert(*id, *range);
                self.mark_range(*range);
            }
            EditorEvent::SelectionChanged { id, old, new } => {
                self.selection_marks.insert(*id, *new);
                self.mark_range(*old);
                self.mark_range(*new);
            }
            EditorEvent::SelectionRemoved { id } => match self.selection_marks.remove(id) {
                Some(range) => self.mark_range(range),
                None => self.mark_whole(),
            },
            EditorEvent::Display(event) => self.handle_display_event(event),
            EditorEvent::Destroyed => self.mark_whole(),
            EditorEvent::ModifiedStatusChanged(_) | EditorEvent::Warning(_) => {}
        }
    }

    fn handle_display_event(&mut self, event: &DisplayEvent) {
        match event {
            DisplayEvent::CellsChanged(change) => {
                for &position in &change.screen_positions {
                    self.mark_cell(position);
                }
            }
            DisplayEvent::ColumnRenamed { index, .. } => {
                self.dirty.columns.insert(*index);
                self.request_update();
            }
            DisplayEvent::ColumnAdded { .. }
            | DisplayEvent::ColumnRemoved { .. }
            | DisplayEvent::ColumnsSwapped { .. }
            | DisplayEvent::ColumnOptionChanged { .. }
            | DisplayEvent::RowAdded { .. }
            | DisplayEvent::RowRemoved { .. }
            | DisplayEvent::RowHeightChanged { .. }
            | DisplayEvent::Changed(_)
            | DisplayEvent::LayoutChanged
            | DisplayEvent::Destroyed => self.mark_whole(),
            DisplayEvent::ModifiedStatusChanged(_)
            | DisplayEvent::WillSave
            | DisplayEvent::Saved
            | DisplayEvent::Replay { .. } => {}
        }
    }

    /// Repaint everything on the next update.
    pub fn mark_whole(&mut self) {
        log::trace!("renderer: whole table dirty");
        self.dirty.whole = true;
        self.request_update();
    }

    pub fn mark_cell(&mut self, position: Point) {
        if self.window.is_some_and(|window| window.contains_point(position)) {
            log::trace!("renderer: dirty cell {:?}", position);
            self.dirty.cells.insert(position);
        }
        self.request_update();
    }

    /// Mark the part of `range` inside the rendered window, with its
    /// headers and gutters.
    pub fn mark_range(&mut self, range: Range) {
        if let Some(visible) = self.window.and_then(|window| window.intersection(&range)) {
            log::trace!("renderer: dirty range {:?}", visible);
            self.dirty.cells.extend(visible.cells());
            self.dirty.rows.extend(visible.rows());
            self.dirty.columns.extend(visible.columns());
        }
        self.request_update();
    }

    // =========================================================================
    // Update
    // =========================================================================

    /// Bring the widgets in line with the editor at `viewport`.
    pub fn update(&mut self, editor: &TableEditor, viewport: &Viewport) -> RenderReport {
        self.update_requested = false;
        if editor.is_destroyed() {
            self.release_all();
            self.window = None;
            self.dirty.clear();
            log::debug!("renderer: editor destroyed, released every widget");
            return RenderReport::new(RenderKind::Cleared, Range::default());
        }

        let frame = FrameState::new(editor);
        let window = self.visible_window(frame.display, viewport);
        self.track_marks(editor);

        let previous = self.window;
        let report = match previous {
            Some(old) if old == window && self.dirty.is_empty() => {
                log::debug!("renderer: window {:?} unchanged, skipping", window);
                RenderReport::new(RenderKind::Skipped, window)
            }
            None => {
                log::debug!("renderer: initial render of {:?}", window);
                let mut report = RenderReport::new(RenderKind::Initial, window);
                self.populate(&frame, window, &mut report);
                report
            }
            Some(old) if old.is_degenerate() || window.is_degenerate() || old.intersection(&window).is_none() => {
                log::debug!("renderer: rebuild {:?} -> {:?}", old, window);
                let mut report = RenderReport::new(RenderKind::Rebuild, window);
                self.release_window(old, &mut report);
                self.populate(&frame, window, &mut report);
                report
            }
            Some(old) if old == window => {
                let mut report = RenderReport::new(RenderKind::Refresh, window);
                self.refresh(&frame, window, &mut report);
                report
            }
            Some(old) => {
                let mut report = RenderReport::new(RenderKind::Scroll, window);
                self.scroll(&frame, old, window, &mut report);
                if let Some(kept) = old.intersection(&window) {
                    self.refresh(&frame, kept, &mut report);
                }
                report
            }
        };

        if report.kind != RenderKind::Skipped {
            self.dirty.clear();
        }
        self.window = Some(window);
        report
    }

    fn visible_window(&self, display: &DisplayTable, viewport: &Viewport) -> Range {
        let settings = display.settings();
        let rows = visible_span(
            display.screen_row_count(),
            self.row_overdraw.unwrap_or(settings.row_overdraw),
            viewport.scroll_top,
            viewport.height,
            |y| display.screen_row_index_at_pixel(y),
            |row| display.screen_row_offset_at(row),
        );
        let columns = visible_span(
            display.screen_column_count(),
            self.column_overdraw.unwrap_or(settings.column_overdraw),
            viewport.scroll_left,
            viewport.width,
            |x| display.screen_column_index_at_pixel(x),
            |column| display.screen_column_offset_at(column),
        );
        Range::from_spans(rows, columns)
    }

    fn track_marks(&mut self, editor: &TableEditor) {
        self.cursor_marks = editor.cursors().iter().map(|c| (c.id(), c.position())).collect();
        self.selection_marks = editor.selections().iter().map(|s| (s.id(), s.range())).collect();
    }

    // -------------------------------------------------------------------------
    // Window operations
    // -------------------------------------------------------------------------

    fn populate(&mut self, frame: &FrameState<'_>, window: Range, report: &mut RenderReport) {
        for column in window.columns() {
            if self.append_header(frame, column) {
                report.columns_created.push(column);
            }
        }
        for row in window.rows() {
            self.append_row(frame, row, window.columns(), report);
        }
    }

    fn release_window(&mut self, window: Range, report: &mut RenderReport) {
        for row in window.rows() {
            self.dispose_row(row, window.columns(), report);
        }
        for column in window.columns() {
            self.dispose_column(column, window.rows(), report);
        }
    }

    fn release_all(&mut self) {
        self.cells.release_all();
        self.headers.release_all();
        self.gutters.release_all();
        self.cell_keys.clear();
        self.header_keys.clear();
        self.gutter_keys.clear();
    }

    /// Release what left the window and create what entered it, one edge at
    /// a time.
    fn scroll(&mut self, frame: &FrameState<'_>, old: Range, new: Range, report: &mut RenderReport) {
        let (rows_above, rows_below) = leaving(old.rows(), new.rows());
        let (columns_left, columns_right) = leaving(old.columns(), new.columns());
        log::debug!(
            "renderer: scroll {:?} -> {:?}, releasing rows {:?} {:?} columns {:?} {:?}",
            old,
            new,
            rows_above,
            rows_below,
            columns_left,
            columns_right
        );
        for row in rows_above.chain(rows_below) {
            self.dispose_row(row, old.columns(), report);
        }
        for column in columns_left.chain(columns_right) {
            self.dispose_column(column, old.rows(), report);
        }

        let (rows_above, rows_below) = leaving(new.rows(), old.rows());
        let (columns_left, columns_right) = leaving(new.columns(), old.columns());
        log::debug!(
            "renderer: scroll creating rows {:?} {:?} columns {:?} {:?}",
            rows_above,
            rows_below,
            columns_left,
            columns_right
        );
        for row in rows_above.chain(rows_below) {
            self.append_row(frame, row, new.columns(), report);
        }
        for column in columns_left.chain(columns_right) {
            self.append_column(frame, column, new.rows(), report);
        }
    }

    /// Rebind the dirty widgets inside `region`.
    fn refresh(&mut self, frame: &FrameState<'_>, region: Range, report: &mut RenderReport) {
        if self.dirty.whole {
            log::debug!("renderer: refreshing all of {:?}", region);
            for position in region.cells() {
                if self.refresh_cell(frame, position) {
                    report.cells_refreshed += 1;
                }
            }
            for column in region.columns() {
                self.refresh_header(frame, column);
            }
            for row in region.rows() {
                self.refresh_gutter(frame, row);
            }
            return;
        }

        let cells: Vec<Point> = self.dirty.cells.iter().copied().filter(|&p| region.contains_point(p)).collect();
        for position in cells {
            if self.refresh_cell(frame, position) {
                report.cells_refreshed += 1;
            }
        }
        let columns: Vec<usize> = self.dirty.columns.iter().copied().filter(|&c| region.contains_column(c)).collect();
        for column in columns {
            self.refresh_header(frame, column);
        }
        let rows: Vec<usize> = self.dirty.rows.iter().copied().filter(|&r| region.contains_row(r)).collect();
        for row in rows {
            self.refresh_gutter(frame, row);
        }
    }

    // -------------------------------------------------------------------------
    // Rows and columns
    // -------------------------------------------------------------------------

    fn append_row(&mut self, frame: &FrameState<'_>, row: usize, columns: ops::Range<usize>, report: &mut RenderReport) {
        if !self.gutter_keys.contains_key(&row) {
            let key = self.gutters.acquire(GutterWidget::default, |w| frame.fill_gutter(w, row));
            self.gutter_keys.insert(row, key);
            report.rows_created.push(row);
        }
        for column in columns {
            if self.append_cell(frame, Point::new(row, column)) {
                report.cells_created += 1;
            }
        }
    }

    fn dispose_row(&mut self, row: usize, columns: ops::Range<usize>, report: &mut RenderReport) {
        if let Some(key) = self.gutter_keys.remove(&row) {
            self.gutters.release(key);
            report.rows_released.push(row);
        }
        for column in columns {
            if self.dispose_cell(Point::new(row, column)) {
                report.cells_released += 1;
            }
        }
    }

    fn append_column(&mut self, frame: &FrameState<'_>, column: usize, rows: ops::Range<usize>, report: &mut RenderReport) {
        if self.append_header(frame, column) {
            report.columns_created.push(column);
        }
        for row in rows {
            if self.append_cell(frame, Point::new(row, column)) {
                report.cells_created += 1;
            }
        }
    }

    fn dispose_column(&mut self, column: usize, rows: ops::Range<usize>, report: &mut RenderReport) {
        if let Some(key) = self.header_keys.remove(&column) {
            self.headers.release(key);
            report.columns_released.push(column);
        }
        for row in rows {
            if self.dispose_cell(Point::new(row, column)) {
                report.cells_released += 1;
            }
        }
    }

    // -------------------------------------------------------------------------
    // Single widgets
    // -------------------------------------------------------------------------

    fn append_header(&mut self, frame: &FrameState<'_>, column: usize) -> bool {
        if self.header_keys.contains_key(&column) {
            return false;
        }
        let key = self.headers.acquire(HeaderWidget::default, |w| frame.fill_header(w, column));
        self.header_keys.insert(column, key);
        true
    }

    fn append_cell(&mut self, frame: &FrameState<'_>, position: Point) -> bool {
        if self.cell_keys.contains_key(&position) {
            return false;
        }
        let key = self.cells.acquire(CellWidget::default, |w| frame.fill_cell(w, position));
        self.cell_keys.insert(position, key);
        true
    }

    fn dispose_cell(&mut self, position: Point) -> bool {
        match self.cell_keys.remove(&position) {
            Some(key) => self.cells.release(key),
            None => false,
        }
    }

    fn refresh_cell(&mut self, frame: &FrameState<'_>, position: Point) -> bool {
        let Some(&key) = self.cell_keys.get(&position) else {
            return false;
        };
        match self.cells.get_mut(key) {
            Some(widget) => {
                frame.fill_cell(widget, position);
                true
            }
            None => false,
        }
    }

    fn refresh_header(&mut self, frame: &FrameState<'_>, column: usize) {
        if let Some(widget) = self.header_keys.get(&column).and_then(|&key| self.headers.get_mut(key)) {
            frame.fill_header(widget, column);
        }
    }

    fn refresh_gutter(&mut self, frame: &FrameState<'_>, row: usize) {
        if let Some(widget) = self.gutter_keys.get(&row).and_then(|&key| self.gutters.get_mut(key)) {
            frame.fill_gutter(widget, row);
        }
    }
}

/// Entries intersecting `[start, start + extent)`, widened by `overdraw` on
/// both sides and clamped to `0..count`.
fn visible_span(
    count: usize,
    overdraw: usize,
    start: f32,
    extent: f32,
    index_at: impl Fn(f32) -> Option<usize>,
    offset_at: impl Fn(usize) -> f32,
) -> ops::Range<usize> {
    let end_pixel = start + extent;
    let (Some(first), Some(last)) = (index_at(start), index_at(end_pixel)) else {
        return 0..0;
    };
    // The entry under the far edge is visible only if it starts before it
    let end = if offset_at(last) < end_pixel { last + 1 } else { last };
    first.saturating_sub(overdraw)..(end.max(first) + overdraw).min(count)
}

/// The parts of `from` before and after `to`.
fn leaving(from: ops::Range<usize>, to: ops::Range<usize>) -> (ops::Range<usize>, ops::Range<usize>) {
    let before = from.start..to.start.clamp(from.start, from.end);
    let after = to.end.clamp(from.start, from.end)..from.end;
    (before, after)
}
