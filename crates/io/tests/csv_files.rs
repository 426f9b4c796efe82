// CSV files through a table fill and back to disk.

use std::fs;

use tabula_config::Settings;
use tabula_core::{IdAllocator, Point};
use tabula_engine::fill::{FillState, RecordSource, TableFill};
use tabula_engine::{Table, TableEditor, Value};
use tabula_io::{save_table, CsvOptions, CsvSource};
use tempfile::tempdir;

fn settings(batch: usize) -> Settings {
    Settings { ingest_batch_size: batch, ..Settings::default() }
}

#[test]
fn test_load_semicolon_file_with_header() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("people.csv");
    fs::write(&path, "name;age;city\nAlice;30;Paris\nBob;25;London\nCarol;41;Oslo\n").unwrap();

    let options = CsvOptions { has_header: true, ..CsvOptions::default() };
    let source = CsvSource::from_path(&path, &options).unwrap();
    assert_eq!(source.delimiter(), b';');

    let ids = IdAllocator::new();
    let table = Table::new(&ids).into_shared();
    let mut fill = TableFill::new(source, table.clone(), &settings(2), options.has_header);

    let first = fill.step().unwrap();
    assert_eq!((first.length, first.total), (2, 3));
    let last = fill.run().unwrap();
    assert_eq!(last.length, 3);
    assert_eq!(fill.state(), FillState::Done);
    assert!(fill.read_progress().bytes_read > 0);

    let table = table.borrow();
    assert_eq!(table.column_name(2), Some("city"));
    assert_eq!(table.row_count(), 3);
    assert_eq!(table.row(1).unwrap()[0], Value::from("Bob"));
    assert!(!table.is_modified());
}

#[test]
fn test_edit_and_save_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.csv");
    fs::write(&path, "a,b\n1,2\n3,4\n").unwrap();

    let options = CsvOptions { has_header: true, ..CsvOptions::default() };
    let ids = IdAllocator::new();
    let table = Table::new(&ids).into_shared();
    let source = CsvSource::from_path(&path, &options).unwrap();
    TableFill::new(source, table.clone(), &settings(100), true).run().unwrap();

    let mut editor = TableEditor::new(table.clone(), &Settings::default(), &ids);
    editor
        .edit_display(|display| display.set_value_at_screen_position(Point::new(1, 1), Value::from("x,y")))
        .unwrap();
    assert!(editor.is_modified());

    let saved = table.borrow_mut().save_with(|t| save_table(t, &path, &options)).unwrap();
    assert!(saved);
    assert!(!editor.is_modified());
    assert_eq!(fs::read_to_string(&path).unwrap(), "a,b\n1,2\n3,\"x,y\"\n");
}

#[test]
fn test_failed_save_keeps_table_modified() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("no-such-dir").join("out.csv");

    let ids = IdAllocator::new();
    let table = Table::with_data(&ids, vec![None], vec![vec![Value::from("v")]]).unwrap();
    let table = table.into_shared();
    table.borrow_mut().set_value_at_position(Point::ZERO, Value::from("w")).unwrap();

    let result = table.borrow_mut().save_with(|t| save_table(t, &missing, &CsvOptions::default()));
    assert!(result.is_err());
    assert!(table.borrow().is_modified());
}

#[test]
fn test_legacy_encoded_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("legacy.csv");
    fs::write(&path, b"caf\xe9\tprix\n1\t2\n").unwrap();

    let mut source = CsvSource::from_path(&path, &CsvOptions::default()).unwrap();
    assert_eq!(source.delimiter(), b'\t');
    assert_eq!(source.encoding(), encoding_rs::WINDOWS_1252);
    assert_eq!(source.read().unwrap(), Some(vec!["café".to_string(), "prix".to_string()]));
}
