// End-to-end scenarios across table, display, editor and renderer.

use tabula_config::{ColumnLayout, Settings};
use tabula_core::{Align, IdAllocator, Point, Range};
use tabula_engine::viewport::RenderKind;
use tabula_engine::{
    DisplayTable, EditorEvent, MemoryClipboard, SortDirection, Table, TableEditor, TableRenderer, Value, Viewport,
};

fn n(x: f64) -> Value {
    Value::Number(x)
}

fn editor_with(columns: &[&str], rows: &[&[f64]]) -> (TableEditor, IdAllocator) {
    let ids = IdAllocator::new();
    let names = columns.iter().map(|c| Some(c.to_string())).collect();
    let rows = rows.iter().map(|r| r.iter().map(|&x| n(x)).collect()).collect();
    let table = Table::with_data(&ids, names, rows).unwrap().into_shared();
    let editor = TableEditor::new(table, &Settings::default(), &ids);
    (editor, ids)
}

fn three_by_three() -> TableEditor {
    editor_with(&["a", "b", "c"], &[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0], &[7.0, 8.0, 9.0]]).0
}

fn rows_of(editor: &TableEditor) -> Vec<Vec<Value>> {
    editor.table().borrow().rows().to_vec()
}

#[test]
fn test_remove_column_and_undo() {
    let mut editor = three_by_three();
    let wide = ColumnLayout { width: Some(300.0), align: Some(Align::Right), ..ColumnLayout::default() };
    editor.edit_display(|display| display.set_screen_column_options(1, wide));

    editor.edit_display(|display| display.remove_column_at(1)).unwrap();
    assert_eq!(rows_of(&editor), vec![vec![n(1.0), n(3.0)], vec![n(4.0), n(6.0)], vec![n(7.0), n(9.0)]]);
    assert_eq!(editor.table().borrow().column_count(), 2);

    assert!(editor.undo().unwrap());
    let table = editor.table().borrow();
    assert_eq!(table.columns(), &[Some("a".to_string()), Some("b".to_string()), Some("c".to_string())]);
    assert_eq!(table.rows()[1], vec![n(4.0), n(5.0), n(6.0)]);
    drop(table);
    assert_eq!(editor.display().screen_column_width_at(1), 300.0);
    assert_eq!(editor.display().screen_column_align_at(1), Align::Right);
}

#[test]
fn test_contained_selections_merge() {
    let mut editor = three_by_three();
    editor
        .set_selected_ranges(&[Range::new((0, 0), (1, 1)), Range::new((0, 0), (2, 2))])
        .unwrap();
    assert_eq!(editor.selected_ranges(), vec![Range::new((0, 0), (2, 2))]);
}

#[test]
fn test_move_right_wraps_to_table_start() {
    let mut editor = three_by_three();
    editor.set_cursor_at_screen_position(Point::new(2, 2));
    editor.move_right(1);
    assert_eq!(editor.cursor_screen_position(), Point::ZERO);
}

#[test]
fn test_sorted_edit_lands_on_model_row() {
    let (mut editor, _) = editor_with(&["k"], &[&[3.0], &[1.0], &[2.0]]);
    editor.sort_by(0, SortDirection::Ascending).unwrap();

    editor.set_cursor_at_screen_position(Point::new(0, 0));
    editor.delete().unwrap();
    assert_eq!(rows_of(&editor), vec![vec![n(3.0)], vec![Value::Empty], vec![n(2.0)]]);

    assert!(editor.undo().unwrap());
    assert_eq!(rows_of(&editor)[1], vec![n(1.0)]);
}

#[test]
fn test_insert_row_undo_restores_cursor() {
    let mut editor = three_by_three();
    editor.set_cursor_at_screen_position(Point::new(1, 2));
    editor.insert_row_after().unwrap();
    assert_eq!(editor.table().borrow().row_count(), 4);
    assert_eq!(editor.cursor_screen_position().row, 2);

    editor.undo().unwrap();
    assert_eq!(editor.table().borrow().row_count(), 3);
    assert_eq!(editor.cursor_screen_position(), Point::new(1, 2));
}

#[test]
fn test_copy_then_paste_into_second_selection() {
    let mut editor = three_by_three();
    let mut clipboard = MemoryClipboard::new();
    editor.set_selected_range(Range::new((0, 0), (1, 2)));
    editor.copy_selected_cells(&mut clipboard);
    assert_eq!(clipboard.text(), "1\t2");

    editor.set_selected_range(Range::new((2, 1), (3, 3)));
    editor.paste_clipboard(&clipboard).unwrap();
    assert_eq!(rows_of(&editor)[2], vec![n(7.0), n(1.0), n(2.0)]);
}

#[test]
fn test_two_editors_share_a_table() {
    let ids = IdAllocator::new();
    let table = Table::with_data(&ids, vec![None], vec![vec![n(1.0)], vec![n(2.0)]]).unwrap().into_shared();
    let mut first = TableEditor::new(table.clone(), &Settings::default(), &ids);
    let mut second = TableEditor::new(table.clone(), &Settings::default(), &ids);
    assert_eq!(table.borrow().ref_count(), 2);

    second.set_cursor_at_screen_position(Point::new(1, 0));
    first.edit_display(|display| display.remove_row_at(1)).unwrap();
    second.sync();
    assert_eq!(second.cursor_screen_position(), Point::ZERO);

    first.destroy();
    assert!(!table.borrow().is_destroyed());
    drop(second);
    assert!(table.borrow().is_destroyed());
}

#[test]
fn test_shared_table_edits_map_through_current_order() {
    let ids = IdAllocator::new();
    let table = Table::with_data(&ids, vec![None], vec![vec![n(1.0)], vec![n(2.0)], vec![n(3.0)]])
        .unwrap()
        .into_shared();
    let mut first = DisplayTable::new(table.clone(), &Settings::default(), &ids);
    let mut second = DisplayTable::new(table.clone(), &Settings::default(), &ids);
    second.sort_by(0, SortDirection::Descending).unwrap();
    assert_eq!(second.value_at_screen_position(Point::ZERO), Ok(n(3.0)));

    first.remove_row_at(0).unwrap();
    second.set_value_at_screen_position(Point::ZERO, n(99.0)).unwrap();
    assert_eq!(table.borrow().rows(), &[vec![n(2.0)], vec![n(99.0)]][..]);
    assert_eq!(second.screen_row_count(), 2);
}

#[test]
fn test_second_editor_catches_up_before_editing() {
    let ids = IdAllocator::new();
    let table = Table::with_data(&ids, vec![None], vec![vec![n(1.0)], vec![n(2.0)], vec![n(3.0)]])
        .unwrap()
        .into_shared();
    let mut first = TableEditor::new(table.clone(), &Settings::default(), &ids);
    let mut second = TableEditor::new(table.clone(), &Settings::default(), &ids);
    second.sort_by(0, SortDirection::Descending).unwrap();
    second.set_cursor_at_screen_position(Point::new(2, 0));

    first.edit_display(|display| display.remove_row_at(2)).unwrap();
    second.delete().unwrap();
    assert_eq!(second.cursor_screen_position(), Point::new(1, 0));
    assert_eq!(table.borrow().rows(), &[vec![Value::Empty], vec![n(2.0)]][..]);
}

#[test]
fn test_renderer_follows_editor_events() {
    let rows: Vec<Vec<f64>> = (0..100).map(|r| (0..5).map(|c| (r * 5 + c) as f64).collect()).collect();
    let slices: Vec<&[f64]> = rows.iter().map(Vec::as_slice).collect();
    let (mut editor, _) = editor_with(&["a", "b", "c", "d", "e"], &slices);
    let mut renderer = TableRenderer::new().with_overdraw(0, 0);
    let viewport = Viewport::new(600.0, 240.0);

    renderer.request_update();
    let report = renderer.frame(&editor, &viewport).unwrap();
    assert_eq!(report.window, Range::new((0, 0), (10, 5)));

    let report = renderer.update(&editor, &viewport.scrolled_to(120.0, 0.0));
    assert_eq!(report.rows_released, (0..5).collect::<Vec<_>>());
    assert_eq!(report.rows_created, (10..15).collect::<Vec<_>>());
    assert!(report.columns_created.is_empty() && report.columns_released.is_empty());

    editor.drain_events();
    editor.edit_display(|display| display.remove_row_at(7)).unwrap();
    let events = editor.drain_events();
    assert!(events.iter().any(|e| matches!(e, EditorEvent::Display(_))));
    renderer.handle_events(&events);

    let report = renderer.frame(&editor, &viewport.scrolled_to(120.0, 0.0)).unwrap();
    assert_eq!(report.kind, RenderKind::Refresh);
    assert_eq!(report.cells_refreshed, 50);
    assert_eq!(renderer.cell_at(Point::new(7, 0)).unwrap().value, n(40.0));
}
