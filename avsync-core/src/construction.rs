//! Value construction: user scalars to typed wire values
//!
//! The inverse of [`crate::projection`]. The remote service validates the
//! shape of every written value, so each rule here is exact. Construction
//! never fails; unknown types are written as text.

use crate::enums::ColumnType;
use crate::projection::{parse_date_str, project_number, project_text};
use chrono::{Local, NaiveDate, NaiveDateTime, TimeZone};
use serde_json::{json, Value};
use std::fmt;

/// Build the wire value for writing `input` into a column of `column_type`.
///
/// `date_has_no_time` only affects date columns: date-only fields pass
/// `true`, fields that keep hour and minute pass `false`.
pub fn build_value(column_type: &ColumnType, input: &Value, date_has_no_time: bool) -> Value {
    match column_type {
        ColumnType::Block => json!({ "block": { "content": scalar_string(input) } }),
        ColumnType::Number => build_number(input),
        ColumnType::Select => {
            let entries = if is_truthy(input) {
                vec![choice(scalar_string(input))]
            } else {
                Vec::new()
            };
            json!({ "mSelect": entries })
        }
        ColumnType::MultiSelect => json!({ "mSelect": multi_select_entries(input) }),
        ColumnType::Date => build_date(input, date_has_no_time),
        ColumnType::Relation => RelationEncoding::Content.encode(&scalar_string(input)),
        _ => json!({ "text": { "content": scalar_string(input) } }),
    }
}

fn choice(content: String) -> Value {
    json!({ "content": content })
}

fn multi_select_entries(input: &Value) -> Vec<Value> {
    match input {
        Value::Array(items) => items.iter().map(|v| choice(scalar_string(v))).collect(),
        Value::String(s) if s.contains(',') => {
            s.split(',').map(|part| choice(part.trim().to_string())).collect()
        }
        v if is_truthy(v) => vec![choice(scalar_string(v))],
        _ => Vec::new(),
    }
}

fn build_number(input: &Value) -> Value {
    let n = match input {
        Value::Bool(b) => f64::from(u8::from(*b)),
        other => project_number(other).unwrap_or(0.0),
    };
    let content = number_value(n);
    json!({
        "number": {
            "content": content,
            "isNotEmpty": is_present(input),
            "format": "",
            "formattedContent": project_text(&content),
        }
    })
}

/// Integral values are emitted as JSON integers.
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or_else(|| Value::from(0))
    }
}

fn build_date(input: &Value, date_has_no_time: bool) -> Value {
    let content = date_millis(input).unwrap_or(0);
    json!({
        "date": {
            "content": content,
            "isNotEmpty": is_present(input),
            "hasEndDate": false,
            "isNotTime": date_has_no_time,
            "content2": 0,
            "isNotEmpty2": false,
            "formattedContent": "",
        }
    })
}

const DATE_TIME_INPUT_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

/// Epoch milliseconds for a date input. Date-only strings resolve to local
/// midnight; numbers are taken as epoch milliseconds already.
fn date_millis(input: &Value) -> Option<i64> {
    match input {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if has_time_component(s) {
                if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
                    return Some(dt.timestamp_millis());
                }
                if let Some(naive) = DATE_TIME_INPUT_FORMATS
                    .iter()
                    .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                {
                    return local_millis(naive);
                }
            }
            parse_date_str(s).and_then(local_midnight_millis)
        }
        _ => None,
    }
}

fn has_time_component(s: &str) -> bool {
    s.contains('T') || s.contains(':')
}

fn local_millis(naive: NaiveDateTime) -> Option<i64> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp_millis())
}

/// Epoch milliseconds of local midnight on `date`.
///
/// Zones that skip midnight fall back to the first valid instant that day.
pub fn local_midnight_millis(date: NaiveDate) -> Option<i64> {
    let midnight = date.and_hms_opt(0, 0, 0)?;
    local_millis(midnight).or_else(|| local_millis(date.and_hms_opt(1, 0, 0)?))
}

// ============================================================================
// SCALAR HELPERS
// ============================================================================

/// String form of a user scalar. Null and absent become empty.
pub fn scalar_string(input: &Value) -> String {
    match input {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .map(scalar_string)
            .collect::<Vec<_>>()
            .join(","),
        other => project_text(other),
    }
}

/// A value the user actually entered: not null and not the empty string.
pub fn is_present(input: &Value) -> bool {
    !matches!(input, Value::Null) && input.as_str() != Some("")
}

pub fn is_truthy(input: &Value) -> bool {
    match input {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

// ============================================================================
// RELATION ENCODINGS
// ============================================================================

/// Accepted shapes for a relation write.
///
/// The service has accepted different shapes across versions; writes that
/// are rejected are retried with each encoding in [`RelationEncoding::RETRY_ORDER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationEncoding {
    /// `{ relation: [{ content }] }`
    Content,
    /// `{ relation: [{ id }] }`
    Id,
    /// `{ relation: { blockIDs: [..] } }`
    BlockIds,
}

impl RelationEncoding {
    pub const RETRY_ORDER: [RelationEncoding; 3] = [
        RelationEncoding::Content,
        RelationEncoding::Id,
        RelationEncoding::BlockIds,
    ];

    pub fn encode(&self, target: &str) -> Value {
        match self {
            RelationEncoding::Content => json!({ "relation": [{ "content": target }] }),
            RelationEncoding::Id => json!({ "relation": [{ "id": target }] }),
            RelationEncoding::BlockIds => json!({ "relation": { "blockIDs": [target] } }),
        }
    }
}

impl fmt::Display for RelationEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelationEncoding::Content => "content",
            RelationEncoding::Id => "id",
            RelationEncoding::BlockIds => "blockIDs",
        };
        write!(f, "{}", name)
    }
}
