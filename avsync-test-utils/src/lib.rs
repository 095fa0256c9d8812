//! avsync Test Utilities
//!
//! Shared test infrastructure for the avsync workspace:
//! - A scripted mock transport with a call log
//! - JSON fixtures for every known response envelope
//! - Proptest generators for JSON values and column types

pub use avsync_core::{
    AttachSource, ColumnType, ContentUnit, DetachedField, FieldRoles, FieldWrite, NewColumn,
    RowQuery, Transport, TransportError, WriteResponse,
};

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

// ============================================================================
// MOCK TRANSPORT
// ============================================================================

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    FetchColumns { source_id: String },
    FetchRows { source_id: String, query: RowQuery },
    FetchViews { source_id: String },
    WriteFields { source_id: String, writes: Vec<FieldWrite> },
    AttachRows { source_id: String, sources: Vec<AttachSource> },
    AppendDetachedRows { source_id: String, rows: Vec<Vec<DetachedField>> },
    RemoveRows { source_id: String, item_ids: Vec<String> },
    AddColumn { source_id: String, column: NewColumn },
    CreateContentUnit { body: String, parent_id: String },
    FetchContentUnit { id: String },
}

/// Scripted in-memory transport.
///
/// Row responses are served in order; the last one repeats. Write and
/// add-column responses are served in order; once exhausted every call
/// succeeds.
#[derive(Debug, Default)]
pub struct MockTransport {
    calls: Mutex<Vec<Call>>,
    columns: Mutex<Value>,
    rows: Mutex<VecDeque<Value>>,
    views: Mutex<Value>,
    write_responses: Mutex<VecDeque<WriteResponse>>,
    column_responses: Mutex<VecDeque<Result<WriteResponse, TransportError>>>,
    created_unit: Mutex<Value>,
    content_units: Mutex<HashMap<String, ContentUnit>>,
    load_failure: Mutex<Option<TransportError>>,
    remove_failure: Mutex<Option<TransportError>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport serving `columns` and a single `rows` response.
    pub fn with_table(columns: Value, rows: Value) -> Self {
        let mock = Self::new();
        mock.set_columns(columns);
        mock.push_rows(rows);
        mock
    }

    pub fn set_columns(&self, columns: Value) {
        *self.columns.lock().unwrap() = columns;
    }

    pub fn push_rows(&self, rows: Value) {
        self.rows.lock().unwrap().push_back(rows);
    }

    pub fn set_views(&self, views: Value) {
        *self.views.lock().unwrap() = views;
    }

    pub fn push_write_response(&self, response: WriteResponse) {
        self.write_responses.lock().unwrap().push_back(response);
    }

    pub fn push_column_response(&self, response: Result<WriteResponse, TransportError>) {
        self.column_responses.lock().unwrap().push_back(response);
    }

    pub fn set_created_unit(&self, response: Value) {
        *self.created_unit.lock().unwrap() = response;
    }

    pub fn add_content_unit(&self, unit: ContentUnit) {
        self.content_units
            .lock()
            .unwrap()
            .insert(unit.id.clone(), unit);
    }

    /// Make `fetch_columns` fail until cleared.
    pub fn fail_loads(&self, err: TransportError) {
        *self.load_failure.lock().unwrap() = Some(err);
    }

    pub fn clear_load_failure(&self) {
        *self.load_failure.lock().unwrap() = None;
    }

    pub fn fail_removals(&self, err: TransportError) {
        *self.remove_failure.lock().unwrap() = Some(err);
    }

    // === Inspection ===

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Every batch sent to `write_fields`, in order.
    pub fn writes(&self) -> Vec<Vec<FieldWrite>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::WriteFields { writes, .. } => Some(writes),
                _ => None,
            })
            .collect()
    }

    pub fn row_fetches(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::FetchRows { .. }))
            .count()
    }

    /// Calls other than reads.
    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| {
                !matches!(
                    call,
                    Call::FetchColumns { .. }
                        | Call::FetchRows { .. }
                        | Call::FetchViews { .. }
                        | Call::FetchContentUnit { .. }
                )
            })
            .collect()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch_columns(&self, source_id: &str) -> Result<Value, TransportError> {
        self.record(Call::FetchColumns {
            source_id: source_id.to_string(),
        });
        if let Some(err) = self.load_failure.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self.columns.lock().unwrap().clone())
    }

    async fn fetch_rows(&self, source_id: &str, query: &RowQuery) -> Result<Value, TransportError> {
        self.record(Call::FetchRows {
            source_id: source_id.to_string(),
            query: query.clone(),
        });
        let mut rows = self.rows.lock().unwrap();
        let response = if rows.len() > 1 {
            rows.pop_front()
        } else {
            rows.front().cloned()
        };
        Ok(response.unwrap_or(Value::Null))
    }

    async fn fetch_views(&self, source_id: &str) -> Result<Value, TransportError> {
        self.record(Call::FetchViews {
            source_id: source_id.to_string(),
        });
        Ok(self.views.lock().unwrap().clone())
    }

    async fn write_fields(
        &self,
        source_id: &str,
        writes: &[FieldWrite],
    ) -> Result<WriteResponse, TransportError> {
        self.record(Call::WriteFields {
            source_id: source_id.to_string(),
            writes: writes.to_vec(),
        });
        Ok(self
            .write_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(WriteResponse::ok))
    }

    async fn attach_rows(
        &self,
        source_id: &str,
        sources: &[AttachSource],
    ) -> Result<(), TransportError> {
        self.record(Call::AttachRows {
            source_id: source_id.to_string(),
            sources: sources.to_vec(),
        });
        Ok(())
    }

    async fn append_detached_rows(
        &self,
        source_id: &str,
        rows: &[Vec<DetachedField>],
    ) -> Result<(), TransportError> {
        self.record(Call::AppendDetachedRows {
            source_id: source_id.to_string(),
            rows: rows.to_vec(),
        });
        Ok(())
    }

    async fn remove_rows(&self, source_id: &str, item_ids: &[String]) -> Result<(), TransportError> {
        self.record(Call::RemoveRows {
            source_id: source_id.to_string(),
            item_ids: item_ids.to_vec(),
        });
        match self.remove_failure.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn add_column(
        &self,
        source_id: &str,
        column: &NewColumn,
    ) -> Result<WriteResponse, TransportError> {
        self.record(Call::AddColumn {
            source_id: source_id.to_string(),
            column: column.clone(),
        });
        self.column_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(WriteResponse::ok()))
    }

    async fn create_content_unit(&self, body: &str, parent_id: &str) -> Result<Value, TransportError> {
        self.record(Call::CreateContentUnit {
            body: body.to_string(),
            parent_id: parent_id.to_string(),
        });
        Ok(self.created_unit.lock().unwrap().clone())
    }

    async fn fetch_content_unit(&self, id: &str) -> Result<Option<ContentUnit>, TransportError> {
        self.record(Call::FetchContentUnit { id: id.to_string() });
        Ok(self.content_units.lock().unwrap().get(id).cloned())
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Response envelopes in every shape the service has been seen to use.

    use super::*;
    use serde_json::{json, Map};

    pub const SOURCE_ID: &str = "20240101000000-avsrc01";

    /// Gantt roles matching [`columns`].
    pub fn roles() -> FieldRoles {
        FieldRoles {
            start: Some("k-start".to_string()),
            end: Some("k-end".to_string()),
            status: Some("k-status".to_string()),
            parent: Some("k-parent".to_string()),
            progress: Some("k-progress".to_string()),
            ..Default::default()
        }
    }

    /// Column definitions as a bare array.
    pub fn columns() -> Value {
        json!([
            {"id": "k-name", "name": "Name", "type": "block"},
            {"id": "k-start", "name": "Start", "type": "date"},
            {"id": "k-end", "name": "End", "type": "date"},
            {"id": "k-status", "name": "Status", "type": "select",
             "options": [{"name": "Todo"}, {"name": "Doing"}, {"name": "Done"}]},
            {"id": "k-parent", "name": "Parent", "type": "relation"},
            {"id": "k-progress", "name": "Progress", "type": "number"},
        ])
    }

    /// `{keys: [...]}`
    pub fn keys_array() -> Value {
        json!({ "keys": columns() })
    }

    /// `{data: {keys: [...]}}`
    pub fn keys_in_data() -> Value {
        json!({ "data": { "keys": columns() } })
    }

    /// Columns keyed by id.
    pub fn keys_map() -> Value {
        let mut map = Map::new();
        if let Value::Array(items) = columns() {
            for item in items {
                let id = item["id"].as_str().unwrap_or_default().to_string();
                map.insert(id, item);
            }
        }
        Value::Object(map)
    }

    /// Columns buried three levels deep under unrelated fields.
    pub fn keys_nested() -> Value {
        json!({ "result": { "payload": { "schema": columns(), "count": 6 } } })
    }

    /// A row in the `cells` array layout.
    pub fn task_row(
        item_id: &str,
        block_id: &str,
        title: &str,
        start: &str,
        end: &str,
        status: &str,
        parent: Option<&str>,
    ) -> Value {
        let mut cells = vec![
            json!({"keyID": "k-name", "value": {"block": {"id": block_id, "content": title}}}),
            json!({"keyID": "k-start", "value": {"date": {"content": start}}}),
            json!({"keyID": "k-end", "value": {"date": {"content": end}}}),
            json!({"keyID": "k-status", "value": {"mSelect": [{"content": status}]}}),
        ];
        if let Some(parent) = parent {
            cells.push(json!({
                "keyID": "k-parent",
                "value": {"relation": [{"content": format!("(({} \"parent\"))", parent)}]},
            }));
        }
        json!({ "id": item_id, "cells": cells })
    }

    /// Two tasks, the second a child of the first.
    pub fn task_rows() -> Vec<Value> {
        vec![
            task_row("item-1", "blk-1", "Design", "2024-03-01", "2024-03-05", "Doing", None),
            task_row("item-2", "blk-2", "Build", "2024-03-06", "2024-03-12", "Todo", Some("blk-1")),
        ]
    }

    /// `{view: {rows: [...]}}`
    pub fn rows_view(rows: Vec<Value>) -> Value {
        json!({ "view": { "rows": rows } })
    }

    /// `{data: {view: {rows: [...]}}}`
    pub fn rows_data_view(rows: Vec<Value>) -> Value {
        json!({ "data": { "view": { "rows": rows } } })
    }

    /// A row whose cells are a map keyed by key id.
    pub fn row_cells_map(item_id: &str, title: &str, status: &str) -> Value {
        json!({
            "id": item_id,
            "cells": {
                "k-name": {"value": {"block": {"content": title}}},
                "k-status": {"value": {"mSelect": [{"content": status}]}},
            }
        })
    }

    /// A row in the `keyValues` layout.
    pub fn row_key_values(item_id: &str, title: &str, status: &str) -> Value {
        json!({
            "id": item_id,
            "keyValues": [
                {"key": {"id": "k-name"}, "values": [{"id": "c-1", "block": {"content": title}}]},
                {"key": {"id": "k-status"}, "values": [{"id": "c-2", "mSelect": [{"content": status}]}]},
            ]
        })
    }

    /// A row in the `cellValues` layout.
    pub fn row_cell_values(item_id: &str, title: &str, status: &str) -> Value {
        json!({
            "id": item_id,
            "cellValues": [
                {"keyID": "k-name", "value": {"block": {"content": title}}},
                {"keyID": "k-status", "value": {"mSelect": [{"content": status}]}},
            ]
        })
    }

    /// `{views: [...]}`
    pub fn views() -> Value {
        json!({
            "views": [
                {"id": "v-table", "name": "Table", "type": "table"},
                {"id": "v-gantt", "name": "Gantt", "layoutType": "gantt"},
            ]
        })
    }

    /// `create_content_unit` answer in operation-list form.
    pub fn created_unit(block_id: &str) -> Value {
        json!([{ "doOperations": [{ "action": "append", "id": block_id }] }])
    }

    pub fn write_ok() -> WriteResponse {
        WriteResponse::ok()
    }

    pub fn write_rejected() -> WriteResponse {
        WriteResponse::rejected(-1, "invalid attribute value")
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for arbitrary responses and inputs.

    use super::*;
    use proptest::prelude::*;
    use serde_json::Map;

    /// Object keys biased toward the names the normalizers look for.
    pub fn arb_key() -> impl Strategy<Value = String> {
        prop_oneof![
            prop::sample::select(vec![
                "keys", "data", "view", "rows", "cells", "id", "type", "value", "content",
                "keyID", "block", "date", "number", "relation", "mSelect",
            ])
            .prop_map(String::from),
            "[a-zA-Z]{1,8}",
        ]
    }

    /// Arbitrary JSON up to four levels deep.
    pub fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            (-1.0e12f64..1.0e12).prop_map(Value::from),
            "[a-zA-Z0-9 ,:()\\[\\]\"-]{0,16}".prop_map(Value::String),
        ];
        leaf.prop_recursive(4, 64, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::vec((arb_key(), inner), 0..6)
                    .prop_map(|entries| Value::Object(entries.into_iter().collect::<Map<_, _>>())),
            ]
        })
    }

    /// Known column types plus unrecognized wire names.
    pub fn arb_column_type() -> impl Strategy<Value = ColumnType> {
        prop_oneof![
            prop::sample::select(ColumnType::KNOWN.to_vec()),
            "[a-z]{3,10}".prop_map(|s| ColumnType::from_wire(&s)),
        ]
    }

    /// Identifier in the `YYYYMMDDhhmmss-xxxxxxx` form.
    pub fn arb_ident() -> impl Strategy<Value = String> {
        "[0-9]{14}-[a-z0-9]{7}"
    }
}
