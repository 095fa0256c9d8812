//! Enum types for attribute view columns

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// COLUMN TYPE
// ============================================================================

/// Declared type of a column ("key") in an attribute view.
///
/// The same enumeration drives both value projection and value
/// construction. Unknown wire names are preserved in `Other` and treated
/// as text everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ColumnType {
    #[default]
    Text,
    Number,
    Date,
    Select,
    MultiSelect,
    Relation,
    Rollup,
    Block,
    Url,
    Email,
    Phone,
    MultiAsset,
    Template,
    Created,
    Updated,
    Checkbox,
    LineNumber,
    /// A type this crate does not know about.
    Other(String),
}

impl ColumnType {
    /// Every known column type, in wire-enumeration order.
    pub const KNOWN: [ColumnType; 17] = [
        ColumnType::Text,
        ColumnType::Number,
        ColumnType::Date,
        ColumnType::Select,
        ColumnType::MultiSelect,
        ColumnType::Relation,
        ColumnType::Rollup,
        ColumnType::Block,
        ColumnType::Url,
        ColumnType::Email,
        ColumnType::Phone,
        ColumnType::MultiAsset,
        ColumnType::Template,
        ColumnType::Created,
        ColumnType::Updated,
        ColumnType::Checkbox,
        ColumnType::LineNumber,
    ];

    /// Wire name as used by the remote service.
    pub fn as_wire_str(&self) -> &str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Number => "number",
            ColumnType::Date => "date",
            ColumnType::Select => "select",
            ColumnType::MultiSelect => "mSelect",
            ColumnType::Relation => "relation",
            ColumnType::Rollup => "rollup",
            ColumnType::Block => "block",
            ColumnType::Url => "url",
            ColumnType::Email => "email",
            ColumnType::Phone => "phone",
            ColumnType::MultiAsset => "mAsset",
            ColumnType::Template => "template",
            ColumnType::Created => "created",
            ColumnType::Updated => "updated",
            ColumnType::Checkbox => "checkbox",
            ColumnType::LineNumber => "lineNumber",
            ColumnType::Other(raw) => raw.as_str(),
        }
    }

    /// Parse a wire name. Total: unknown names become `Other`.
    pub fn from_wire(s: &str) -> Self {
        match s.trim() {
            "" | "text" => ColumnType::Text,
            "number" => ColumnType::Number,
            "date" => ColumnType::Date,
            "select" => ColumnType::Select,
            "mSelect" | "multi-select" => ColumnType::MultiSelect,
            "relation" => ColumnType::Relation,
            "rollup" => ColumnType::Rollup,
            "block" => ColumnType::Block,
            "url" => ColumnType::Url,
            "email" => ColumnType::Email,
            "phone" => ColumnType::Phone,
            "mAsset" | "multi-asset" => ColumnType::MultiAsset,
            "template" => ColumnType::Template,
            "created" => ColumnType::Created,
            "updated" => ColumnType::Updated,
            "checkbox" => ColumnType::Checkbox,
            "lineNumber" | "line-number" => ColumnType::LineNumber,
            other => ColumnType::Other(other.to_string()),
        }
    }

    /// Wrapper key of the wire value written for this type.
    ///
    /// Must agree with `construction::build_value`.
    pub fn value_key(&self) -> &'static str {
        match self {
            ColumnType::Block => "block",
            ColumnType::Number => "number",
            ColumnType::Select | ColumnType::MultiSelect => "mSelect",
            ColumnType::Date => "date",
            ColumnType::Relation => "relation",
            _ => "text",
        }
    }

    /// Whether this column carries a choice list.
    pub fn has_options(&self) -> bool {
        matches!(self, ColumnType::Select | ColumnType::MultiSelect)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_wire_str())
    }
}

impl FromStr for ColumnType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_wire(s))
    }
}

impl From<String> for ColumnType {
    fn from(s: String) -> Self {
        Self::from_wire(&s)
    }
}

impl From<&str> for ColumnType {
    fn from(s: &str) -> Self {
        Self::from_wire(s)
    }
}

impl From<ColumnType> for String {
    fn from(t: ColumnType) -> Self {
        t.as_wire_str().to_string()
    }
}
