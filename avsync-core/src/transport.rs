//! Boundary trait for the remote attribute view service
//!
//! Implementations perform the actual remote calls. Read operations return
//! the raw response; interpretation belongs to [`crate::shape`] and
//! [`crate::assembly`].

use crate::enums::ColumnType;
use crate::error::TransportError;
use crate::shape::{field, id_string};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// WIRE TYPES
// ============================================================================

/// Row fetch parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowQuery {
    #[serde(rename = "viewID", skip_serializing_if = "Option::is_none")]
    pub view_id: Option<String>,
    pub page: i64,
    /// `-1` requests every row in one page.
    pub page_size: i64,
}

impl RowQuery {
    pub const ALL_ROWS: i64 = -1;

    /// First page with every row.
    pub fn all(view_id: Option<String>) -> Self {
        Self {
            view_id,
            page: 1,
            page_size: Self::ALL_ROWS,
        }
    }
}

/// One entry of a batched field write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldWrite {
    #[serde(rename = "keyID")]
    pub key_id: String,
    #[serde(rename = "itemID")]
    pub item_id: String,
    pub value: Value,
}

/// Raw `{code, msg, data}` envelope of a batched write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteResponse {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl WriteResponse {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn rejected(code: i64, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
            data: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}

/// A content unit to attach as a new row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachSource {
    pub id: String,
    pub is_detached: bool,
    #[serde(rename = "itemID", skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
}

/// One field of a detached row: `{keyID, <wrapper>: ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetachedField {
    #[serde(rename = "keyID")]
    pub key_id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl DetachedField {
    /// Spread a constructed wire value next to its key id.
    pub fn new(key_id: impl Into<String>, value: Value) -> Self {
        let fields = match value {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        Self {
            key_id: key_id.into(),
            fields,
        }
    }
}

/// A column to add to a source. The caller picks the key id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewColumn {
    pub key_id: String,
    pub name: String,
    pub column_type: ColumnType,
    /// Choice labels, only for select-like types.
    pub options: Vec<String>,
}

/// Location of a native content unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentUnit {
    pub id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
}

/// Id of the unit created by a `create_content_unit` call.
///
/// Accepts both the operation-list form and the bare `[{id}]` form.
pub fn created_unit_id(response: &Value) -> Option<String> {
    let first = response.as_array()?.first()?;
    field(first, "doOperations")
        .and_then(Value::as_array)
        .and_then(|ops| ops.first())
        .and_then(|op| field(op, "id"))
        .or_else(|| field(first, "id"))
        .and_then(id_string)
}

// ============================================================================
// TRANSPORT TRAIT
// ============================================================================

/// Remote calls the synchronization layer depends on.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Column definitions of a source, in any known envelope.
    async fn fetch_columns(&self, source_id: &str) -> Result<Value, TransportError>;

    /// Rows of a source.
    async fn fetch_rows(&self, source_id: &str, query: &RowQuery) -> Result<Value, TransportError>;

    /// Source descriptor listing its views.
    async fn fetch_views(&self, source_id: &str) -> Result<Value, TransportError>;

    /// Batched write. A non-zero `code` is a rejection, not an `Err`.
    async fn write_fields(
        &self,
        source_id: &str,
        writes: &[FieldWrite],
    ) -> Result<WriteResponse, TransportError>;

    /// Attach existing content units as rows.
    async fn attach_rows(
        &self,
        source_id: &str,
        sources: &[AttachSource],
    ) -> Result<(), TransportError>;

    /// Append rows not backed by content units.
    async fn append_detached_rows(
        &self,
        source_id: &str,
        rows: &[Vec<DetachedField>],
    ) -> Result<(), TransportError>;

    async fn remove_rows(&self, source_id: &str, item_ids: &[String]) -> Result<(), TransportError>;

    /// Add a column. Answers the raw envelope like [`Transport::write_fields`].
    async fn add_column(
        &self,
        source_id: &str,
        column: &NewColumn,
    ) -> Result<WriteResponse, TransportError>;

    /// Create a markdown content unit under `parent_id`. Returns the raw
    /// operation list.
    async fn create_content_unit(&self, body: &str, parent_id: &str) -> Result<Value, TransportError>;

    /// Look up a content unit, `None` when it does not exist.
    async fn fetch_content_unit(&self, id: &str) -> Result<Option<ContentUnit>, TransportError>;
}
