//! Fuzz test for value projection and construction
//!
//! Run with: cargo +nightly fuzz run projection_fuzz -- -max_total_time=60

#![no_main]

use avsync_core::{
    build_value, display_text, extract_identifier, project_date, project_number, project_text,
    ColumnType,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };

    let text = project_text(&value);
    assert_eq!(project_text(&serde_json::Value::from(text.as_str())), text);
    assert_eq!(display_text(&value).is_none(), text.is_empty());

    if let Some(date) = project_date(&value) {
        assert!(!date.is_empty());
    }
    if let Some(n) = project_number(&value) {
        assert!(n.is_finite());
    }
    let _ = extract_identifier(&value);

    for column_type in ColumnType::KNOWN.iter() {
        let wire = build_value(column_type, &value, true);
        let obj = wire.as_object().expect("wire value is an object");
        assert_eq!(obj.len(), 1);
        assert!(obj.contains_key(column_type.value_key()));
    }
});
