//! Fuzz test for shape normalization and table assembly
//!
//! Any JSON document must normalize without panicking, and the assembled
//! table must hold exactly one cell per distinct column key in every row.
//!
//! Run with: cargo +nightly fuzz run shape_fuzz -- -max_total_time=60

#![no_main]

use avsync_core::{build_columns, build_table, build_views, extract, Extraction, ShapeTest, Strategy};
use libfuzzer_sys::fuzz_target;
use std::collections::HashSet;

fuzz_target!(|data: &[u8]| {
    let Ok(response) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };

    for test in [ShapeTest::COLUMNS, ShapeTest::ROWS, ShapeTest::VIEWS] {
        if let Extraction::Found { strategy: Strategy::DeepSearch, items } = extract(&response, &test) {
            assert!(!items.is_empty());
            assert!(items.iter().all(|item| test.matches(item)));
        }
    }

    let columns = build_columns(&response);
    let column_count = columns
        .iter()
        .map(|c| c.key_id.as_str())
        .collect::<HashSet<_>>()
        .len();
    let table = build_table(&response, columns);

    let mut seen = HashSet::new();
    for row in &table.rows {
        assert!(seen.insert(row.item_id.clone()), "Row ids must be unique");
        assert_eq!(row.cells.len(), column_count, "One cell per column");
    }

    let _ = build_views(&response);
});
