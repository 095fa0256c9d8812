//! Canonical table model
//!
//! Immutable once assembled. A reload produces a whole new [`Table`].

use crate::enums::ColumnType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Schema of one field of the source table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    #[serde(rename = "keyID")]
    pub key_id: String,
    /// Display label. Not unique.
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Choice labels, in declaration order.
    #[serde(default)]
    pub options: Vec<String>,
}

impl Column {
    pub fn new(key_id: impl Into<String>, name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            key_id: key_id.into(),
            name: name.into(),
            column_type,
            options: Vec::new(),
        }
    }
}

/// The value of one column within one row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    #[serde(rename = "cellID", skip_serializing_if = "Option::is_none")]
    pub cell_id: Option<String>,
    /// The typed value exactly as received.
    pub value: Option<Value>,
    /// Projection of `value`, computed at assembly time.
    pub display_text: Option<String>,
}

impl Cell {
    /// Placeholder for a cell the response omitted.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }
}

/// One record of the source table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    #[serde(rename = "itemID")]
    pub item_id: String,
    /// Id of the content unit backing this row, when there is one.
    #[serde(rename = "primaryBlockID")]
    pub primary_block_id: Option<String>,
    /// Row-level title carried by the envelope, if any.
    pub label: Option<String>,
    /// One entry per column of the owning table.
    pub cells: HashMap<String, Cell>,
}

impl Row {
    pub fn cell(&self, key_id: &str) -> Option<&Cell> {
        self.cells.get(key_id)
    }

    /// Display text of a cell, `None` when absent or empty.
    pub fn text(&self, key_id: &str) -> Option<&str> {
        self.cell(key_id).and_then(|c| c.display_text.as_deref())
    }

    /// Content unit id if backed by one, else the item id.
    pub fn anchor_id(&self) -> &str {
        self.primary_block_id.as_deref().unwrap_or(&self.item_id)
    }
}

/// The canonical in-memory table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(columns: Vec<Column>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, key_id: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.key_id == key_id)
    }

    pub fn column_type(&self, key_id: &str) -> Option<&ColumnType> {
        self.column(key_id).map(|c| &c.column_type)
    }

    /// The first column of type `block` (the primary title column).
    pub fn block_column(&self) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.column_type == ColumnType::Block)
    }

    pub fn row(&self, item_id: &str) -> Option<&Row> {
        self.rows.iter().find(|r| r.item_id == item_id)
    }

    /// Find a row by its anchor id (content unit id, else item id).
    pub fn row_by_anchor(&self, reference: &str) -> Option<&Row> {
        self.rows.iter().find(|r| r.anchor_id() == reference)
    }

    /// Whether a row created as `item_id` on top of `block_id` is visible.
    pub fn contains_created(&self, item_id: &str, block_id: &str) -> bool {
        self.rows.iter().any(|r| {
            r.item_id == item_id
                || r.item_id == block_id
                || r.primary_block_id.as_deref() == Some(block_id)
        })
    }
}

/// A named view of the source table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewInfo {
    #[serde(rename = "viewID")]
    pub view_id: String,
    pub name: String,
    /// Layout kind reported by the service (`table`, `gallery`, ...). May be empty.
    pub layout: String,
}

/// A user-level edit to one field of one row.
///
/// `column_type` overrides the type known from the table, if given.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldUpdate {
    pub key_id: String,
    pub value: Value,
    pub column_type: Option<ColumnType>,
}

impl FieldUpdate {
    pub fn new(key_id: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key_id: key_id.into(),
            value: value.into(),
            column_type: None,
        }
    }

    pub fn with_type(mut self, column_type: ColumnType) -> Self {
        self.column_type = Some(column_type);
        self
    }
}
