// Property-based tests for the table store, its history and the row projection.
// CI: 256 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use proptest::prelude::*;

use tabula_config::Settings;
use tabula_core::{IdAllocator, Point};
use tabula_engine::{DisplayTable, SortDirection, Table, Value};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn config_256() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Empty),
        any::<bool>().prop_map(Value::Bool),
        (-50i32..50).prop_map(|n| Value::Number(n as f64)),
        "[a-zA-Z0-9]{0,6}".prop_map(Value::from),
    ]
}

/// Rows of a table with 1..5 columns.
fn arb_rows() -> impl Strategy<Value = (usize, Vec<Vec<Value>>)> {
    (1usize..5).prop_flat_map(|columns| {
        let row = prop::collection::vec(arb_value(), columns);
        (Just(columns), prop::collection::vec(row, 0..30))
    })
}

fn arb_direction() -> impl Strategy<Value = SortDirection> {
    prop_oneof![Just(SortDirection::Ascending), Just(SortDirection::Descending)]
}

fn table_with(ids: &IdAllocator, columns: usize, rows: Vec<Vec<Value>>) -> Table {
    let names = (0..columns).map(|i| Some(format!("c{i}"))).collect();
    Table::with_data(ids, names, rows).unwrap()
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_256())]

    /// Screen and model indices are inverse permutations after any sort.
    #[test]
    fn prop_projection_is_inverse((columns, rows) in arb_rows(), column in 0usize..5, direction in arb_direction()) {
        let ids = IdAllocator::new();
        let count = rows.len();
        let table = table_with(&ids, columns, rows).into_shared();
        let mut display = DisplayTable::new(table, &Settings::default(), &ids);
        display.sort_by(column % columns, direction).unwrap();

        prop_assert_eq!(display.screen_row_count(), count);
        for model in 0..count {
            let screen = display.model_row_to_screen_row(model);
            prop_assert!(screen < count);
            prop_assert_eq!(display.screen_row_to_model_row(screen), model);
        }
        for screen in 0..count {
            prop_assert_eq!(display.model_row_to_screen_row(display.screen_row_to_model_row(screen)), screen);
        }
    }

    /// Toggling twice returns to the original direction and order.
    #[test]
    fn prop_toggle_twice_restores_order((columns, rows) in arb_rows(), direction in arb_direction()) {
        let ids = IdAllocator::new();
        let table = table_with(&ids, columns, rows).into_shared();
        let mut display = DisplayTable::new(table, &Settings::default(), &ids);
        display.sort_by(0, direction).unwrap();
        let before = display.screen_rows();

        display.toggle_sort_direction();
        display.toggle_sort_direction();
        prop_assert_eq!(display.direction(), direction);
        prop_assert_eq!(display.screen_rows(), before);
    }

    /// The undo stack never grows past its capacity and drops the oldest steps.
    #[test]
    fn prop_undo_stack_is_capped(capacity in 1usize..10, edits in 0usize..30) {
        let ids = IdAllocator::new();
        let mut table = table_with(&ids, 1, vec![vec![Value::Empty]]);
        table.set_history_capacity(capacity);

        for i in 0..edits {
            table.set_value_at_position(Point::ZERO, Value::Number(i as f64)).unwrap();
            prop_assert!(table.undo_depth() <= capacity);
        }
        prop_assert_eq!(table.undo_depth(), edits.min(capacity));

        while table.undo().unwrap() {}
        let oldest_kept = edits.saturating_sub(capacity);
        let expected = if oldest_kept == 0 { Value::Empty } else { Value::Number((oldest_kept - 1) as f64) };
        prop_assert_eq!(table.value_at_position(Point::ZERO).unwrap(), &expected);
    }

    /// Removing a row and undoing restores the exact rows; redo removes it again.
    #[test]
    fn prop_remove_row_undo_restores((columns, rows) in arb_rows(), pick in any::<prop::sample::Index>()) {
        prop_assume!(!rows.is_empty());
        let ids = IdAllocator::new();
        let mut table = table_with(&ids, columns, rows);
        let before = table.rows().to_vec();
        let index = pick.index(before.len());

        let removed = table.remove_row_at(index).unwrap();
        prop_assert_eq!(&removed, &before[index]);
        let after = table.rows().to_vec();

        prop_assert!(table.undo().unwrap());
        prop_assert_eq!(table.rows(), before.as_slice());
        prop_assert!(table.redo().unwrap());
        prop_assert_eq!(table.rows(), after.as_slice());
    }

    /// Scattered removals are one undo step.
    #[test]
    fn prop_remove_indices_undo_restores((columns, rows) in arb_rows(), picks in prop::collection::vec(any::<prop::sample::Index>(), 1..6)) {
        prop_assume!(!rows.is_empty());
        let ids = IdAllocator::new();
        let mut table = table_with(&ids, columns, rows);
        let before = table.rows().to_vec();
        let indices: Vec<usize> = picks.iter().map(|p| p.index(before.len())).collect();

        table.remove_rows_at_indices(&indices).unwrap();
        prop_assert_eq!(table.undo_depth(), 1);
        prop_assert!(table.undo().unwrap());
        prop_assert_eq!(table.rows(), before.as_slice());
    }

    /// Everything recorded inside a batch undoes as one step.
    #[test]
    fn prop_batch_is_one_step(values in prop::collection::vec(-100i32..100, 1..10)) {
        let ids = IdAllocator::new();
        let mut table = table_with(&ids, 2, vec![vec![Value::Empty, Value::Empty]]);
        table.batch_transaction(|table| {
            for (i, &v) in values.iter().enumerate() {
                table.set_value_at_position(Point::new(0, i % 2), Value::Number(v as f64)).unwrap();
            }
        });

        prop_assert_eq!(table.undo_depth(), 1);
        prop_assert!(table.undo().unwrap());
        prop_assert_eq!(table.rows(), &[vec![Value::Empty, Value::Empty]][..]);
        prop_assert!(!table.is_modified());
    }
}
