//! Table assembly from raw column and row responses

use crate::enums::ColumnType;
use crate::model::{Cell, Column, Row, Table, ViewInfo};
use crate::projection::{display_text, project_text};
use crate::shape::{extract_array, field, first_field, id_string, path, ShapeTest};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

// ============================================================================
// COLUMNS
// ============================================================================

/// Build column definitions from a keys response.
///
/// Elements without an `id` are dropped.
pub fn build_columns(keys_response: &Value) -> Vec<Column> {
    extract_array(keys_response, &ShapeTest::COLUMNS)
        .into_iter()
        .filter_map(build_column)
        .collect()
}

fn build_column(item: &Value) -> Option<Column> {
    let obj = item.as_object()?;
    let key_id = obj.get("id").and_then(id_string)?;
    let name = ["name", "label"]
        .iter()
        .filter_map(|k| obj.get(*k).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| key_id.clone());
    let column_type = obj
        .get("type")
        .and_then(Value::as_str)
        .map(ColumnType::from_wire)
        .unwrap_or_default();
    let options = obj
        .get("options")
        .and_then(Value::as_array)
        .map(|opts| opts.iter().filter_map(option_label).collect())
        .unwrap_or_default();

    Some(Column {
        key_id,
        name,
        column_type,
        options,
    })
}

fn option_label(option: &Value) -> Option<String> {
    let label = match option {
        Value::Object(obj) => first_field(obj, &["name", "content"])
            .map(project_text)
            .unwrap_or_default(),
        other => project_text(other),
    };
    if label.is_empty() {
        None
    } else {
        Some(label)
    }
}

// ============================================================================
// CELL LOCATION
// ============================================================================

/// Finds the raw cell for a key inside a row envelope.
pub type CellLocator = for<'a> fn(&'a Map<String, Value>, &str) -> Option<&'a Value>;

const CELL_KEY_PATHS: &[&[&str]] = &[
    &["keyID"],
    &["keyId"],
    &["key", "id"],
    &["key", "ID"],
    &["value", "keyID"],
    &["value", "keyId"],
    &["value", "key", "id"],
    &["value", "key", "ID"],
];

fn cells_array<'a>(row: &'a Map<String, Value>, key_id: &str) -> Option<&'a Value> {
    row.get("cells")?.as_array()?.iter().find(|cell| {
        CELL_KEY_PATHS
            .iter()
            .any(|p| path(cell, p).and_then(Value::as_str) == Some(key_id))
    })
}

fn cells_map<'a>(row: &'a Map<String, Value>, key_id: &str) -> Option<&'a Value> {
    row.get("cells")?
        .as_object()?
        .get(key_id)
        .filter(|v| !v.is_null())
}

fn key_values<'a>(row: &'a Map<String, Value>, key_id: &str) -> Option<&'a Value> {
    row.get("keyValues")?.as_array()?.iter().find(|kv| {
        path(kv, &["key", "id"]).and_then(Value::as_str) == Some(key_id)
            || path(kv, &["keyID"]).and_then(Value::as_str) == Some(key_id)
    })
}

fn cell_values<'a>(row: &'a Map<String, Value>, key_id: &str) -> Option<&'a Value> {
    row.get("cellValues")?
        .as_array()?
        .iter()
        .find(|cv| path(cv, &["keyID"]).and_then(Value::as_str) == Some(key_id))
}

/// Cell layouts, tried in order; the first hit wins.
pub const CELL_LOCATORS: &[(&str, CellLocator)] = &[
    ("cells[]", cells_array),
    ("cells{}", cells_map),
    ("keyValues", key_values),
    ("cellValues", cell_values),
];

/// Locate the raw cell for `key_id` in a row envelope.
pub fn find_cell<'a>(row: &'a Value, key_id: &str) -> Option<&'a Value> {
    let obj = row.as_object()?;
    if key_id.is_empty() {
        return None;
    }
    CELL_LOCATORS
        .iter()
        .find_map(|(_, locate)| locate(obj, key_id))
}

/// Split a raw cell into its cell id and typed value.
///
/// A `values` wrapper yields its first element; a cell without an explicit
/// `value` is itself the value.
pub fn extract_cell_id_and_value(cell: &Value) -> (Option<String>, Option<Value>) {
    let source = match field(cell, "values").and_then(Value::as_array) {
        Some(values) if !values.is_empty() => &values[0],
        _ => cell,
    };
    let Some(obj) = source.as_object() else {
        return (None, Some(source.clone()).filter(|v| !v.is_null()));
    };
    let cell_id = first_field(obj, &["id", "cellID"]).and_then(id_string);
    let value = obj
        .get("value")
        .filter(|v| !v.is_null())
        .unwrap_or(source)
        .clone();
    (cell_id, Some(value))
}

// ============================================================================
// ROWS
// ============================================================================

const ROW_ID_FIELDS: &[&str] = &["id", "rowID", "rowId", "blockID", "blockId"];

const ROW_LABEL_PATHS: &[&[&str]] = &[
    &["title"],
    &["name"],
    &["block", "content"],
    &["content"],
    &["blockContent"],
];

fn row_item_id(obj: &Map<String, Value>) -> Option<String> {
    ROW_ID_FIELDS
        .iter()
        .filter_map(|k| obj.get(*k))
        .find_map(id_string)
}

fn row_label(row: &Value) -> Option<String> {
    ROW_LABEL_PATHS
        .iter()
        .filter_map(|p| path(row, p))
        .map(project_text)
        .find(|s| !s.is_empty())
}

fn block_reference(value: &Value) -> Option<String> {
    let from_block = field(value, "block")
        .and_then(Value::as_object)
        .and_then(|block| {
            ["id", "blockID", "blockId"]
                .iter()
                .filter_map(|k| block.get(*k))
                .find_map(id_string)
        });
    from_block.or_else(|| field(value, "blockID").and_then(id_string))
}

/// Assemble the canonical table from a rows response and the column set.
///
/// Rows without an identifier, and repeated identifiers, are skipped.
pub fn build_table(rows_response: &Value, columns: Vec<Column>) -> Table {
    let mut seen = HashSet::new();
    let rows = extract_array(rows_response, &ShapeTest::ROWS)
        .into_iter()
        .filter_map(|raw| {
            let row = build_row(raw, &columns)?;
            seen.insert(row.item_id.clone()).then_some(row)
        })
        .collect();
    Table::new(columns, rows)
}

fn build_row(raw: &Value, columns: &[Column]) -> Option<Row> {
    let item_id = row_item_id(raw.as_object()?)?;
    let mut primary_block_id = None;
    let mut cells = HashMap::with_capacity(columns.len());

    for column in columns {
        let cell = match find_cell(raw, &column.key_id) {
            Some(found) => {
                let (cell_id, value) = extract_cell_id_and_value(found);
                let display_text = value.as_ref().and_then(display_text);
                Cell {
                    cell_id,
                    value,
                    display_text,
                }
            }
            None => Cell::empty(),
        };
        if column.column_type == ColumnType::Block && primary_block_id.is_none() {
            primary_block_id = cell.value.as_ref().and_then(block_reference);
        }
        cells.insert(column.key_id.clone(), cell);
    }

    Some(Row {
        item_id,
        primary_block_id,
        label: row_label(raw),
        cells,
    })
}

// ============================================================================
// VIEWS
// ============================================================================

/// Build the list of views from a source descriptor response.
pub fn build_views(response: &Value) -> Vec<ViewInfo> {
    extract_array(response, &ShapeTest::VIEWS)
        .into_iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            let view_id = obj.get("id").and_then(id_string)?;
            let name = obj
                .get("name")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| view_id.clone());
            let layout = first_field(obj, &["type", "layoutType"])
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Some(ViewInfo {
                view_id,
                name,
                layout,
            })
        })
        .collect()
}
