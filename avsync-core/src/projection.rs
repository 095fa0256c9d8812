//! Value projection: typed cell values to display scalars
//!
//! All functions here are pure and total. Unparsable input yields an empty
//! string or `None`, never an error.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

// ============================================================================
// TEXT PRECEDENCE TABLE
// ============================================================================

/// Picks one wrapper field out of a typed value object.
pub type Extractor = for<'a> fn(&'a Map<String, Value>) -> Option<&'a Value>;

fn nested<'a>(obj: &'a Map<String, Value>, outer: &str, inner: &str) -> Option<&'a Value> {
    obj.get(outer)?.as_object()?.get(inner)
}

fn text_content(obj: &Map<String, Value>) -> Option<&Value> {
    nested(obj, "text", "content")
}

fn block_content(obj: &Map<String, Value>) -> Option<&Value> {
    nested(obj, "block", "content")
}

fn number_content(obj: &Map<String, Value>) -> Option<&Value> {
    nested(obj, "number", "content")
}

fn date_content(obj: &Map<String, Value>) -> Option<&Value> {
    nested(obj, "date", "content")
}

fn content(obj: &Map<String, Value>) -> Option<&Value> {
    obj.get("content")
}

fn relation(obj: &Map<String, Value>) -> Option<&Value> {
    obj.get("relation")
}

fn multi_select(obj: &Map<String, Value>) -> Option<&Value> {
    obj.get("mSelect")
}

fn select(obj: &Map<String, Value>) -> Option<&Value> {
    obj.get("select")
}

fn id(obj: &Map<String, Value>) -> Option<&Value> {
    obj.get("id")
}

fn block_id(obj: &Map<String, Value>) -> Option<&Value> {
    obj.get("blockID").or_else(|| obj.get("blockId"))
}

/// Precedence chain for [`project_text`]. Order is significant: it mirrors
/// which field types nest which wrapper first.
pub const TEXT_EXTRACTORS: &[(&str, Extractor)] = &[
    ("text.content", text_content),
    ("block.content", block_content),
    ("number.content", number_content),
    ("date.content", date_content),
    ("content", content),
    ("relation", relation),
    ("mSelect", multi_select),
    ("select", select),
    ("id", id),
    ("blockID", block_id),
];

// ============================================================================
// TEXT
// ============================================================================

/// Project any cell value to display text.
pub fn project_text(value: &Value) -> String {
    match value {
        Value::Null | Value::Bool(_) => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(_) => number_text(value),
        Value::Array(items) => match items.first() {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Object(obj)) => crate::shape::first_field(obj, &["content", "name"])
                .map(project_text)
                .unwrap_or_default(),
            _ => String::new(),
        },
        Value::Object(obj) => TEXT_EXTRACTORS
            .iter()
            .find_map(|(_, extract)| extract(obj))
            .map(project_text)
            .unwrap_or_default(),
    }
}

/// Display text, or `None` when the projection is empty.
pub fn display_text(value: &Value) -> Option<String> {
    let text = project_text(value);
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn number_text(value: &Value) -> String {
    let Value::Number(n) = value else {
        return String::new();
    };
    if n.is_i64() || n.is_u64() {
        return n.to_string();
    }
    match n.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 => format!("{:.0}", f),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

// ============================================================================
// DATE
// ============================================================================

static YMD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("static regex"));

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"];

/// Project a value to a `YYYY-MM-DD` date.
///
/// `None` means "unscheduled", not failure.
pub fn project_date(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if s.is_empty() => None,
        Value::String(s) if YMD.is_match(s) => Some(s.clone()),
        Value::String(s) => parse_date_str(s).map(format_ymd),
        Value::Number(n) => {
            let ms = n.as_f64().filter(|f| f.is_finite() && *f != 0.0)?;
            epoch_ms_to_local_date(ms as i64).map(format_ymd)
        }
        Value::Object(obj) => {
            let inner = [date_content(obj), obj.get("content"), number_content(obj)]
                .into_iter()
                .flatten()
                .find(|v| !v.is_null())?;
            project_date(inner)
        }
        _ => None,
    }
}

/// Parse a free-form date or date-time string to a calendar date.
///
/// Offset-carrying timestamps are converted to UTC first; naive date-times
/// keep their own calendar date.
pub fn parse_date_str(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }
    for fmt in DATE_TIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Local calendar date of an epoch-millisecond timestamp.
pub fn epoch_ms_to_local_date(ms: i64) -> Option<NaiveDate> {
    Local
        .timestamp_millis_opt(ms)
        .single()
        .map(|dt| dt.date_naive())
}

/// Zero-padded `YYYY-MM-DD`.
pub fn format_ymd(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

// ============================================================================
// NUMBER
// ============================================================================

/// Project a value to a finite number.
pub fn project_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            s.parse::<f64>().ok().filter(|f| f.is_finite())
        }
        Value::Object(obj) => {
            let inner = [number_content(obj), obj.get("content")]
                .into_iter()
                .flatten()
                .find(|v| !v.is_null())?;
            project_number(inner)
        }
        _ => None,
    }
}

// ============================================================================
// IDENTIFIER
// ============================================================================

static BLOCK_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\(\(([a-zA-Z0-9-]+)(?:\s+"[^"]*")?\)\)$"#).expect("static regex")
});

static WIKI_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[\[([a-zA-Z0-9-]+)\]\]$").expect("static regex"));

/// Project to text and strip a `((id "label"))` or `[[id]]` reference wrapper.
///
/// Text that is not a reference is returned trimmed; it may already be a
/// bare identifier.
pub fn extract_identifier(value: &Value) -> String {
    let text = project_text(value);
    let text = text.trim();
    if text.is_empty() {
        return String::new();
    }
    BLOCK_REF
        .captures(text)
        .or_else(|| WIKI_REF.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_primitives() {
        assert_eq!(project_text(&json!(null)), "");
        assert_eq!(project_text(&json!("abc")), "abc");
        assert_eq!(project_text(&json!(42)), "42");
        assert_eq!(project_text(&json!(1.5)), "1.5");
        assert_eq!(project_text(&json!(true)), "");
    }

    #[test]
    fn test_arrays_take_first_element() {
        assert_eq!(project_text(&json!(["a", "b"])), "a");
        assert_eq!(project_text(&json!([{"content": "x"}, {"content": "y"}])), "x");
        assert_eq!(project_text(&json!([{"name": "n"}])), "n");
        assert_eq!(project_text(&json!([1, 2])), "");
        assert_eq!(project_text(&json!([])), "");
    }

    #[test]
    fn test_wrappers() {
        assert_eq!(project_text(&json!({"text": {"content": "hello"}})), "hello");
        assert_eq!(project_text(&json!({"block": {"content": "Task A", "id": "b1"}})), "Task A");
        assert_eq!(project_text(&json!({"number": {"content": 3}})), "3");
        assert_eq!(project_text(&json!({"mSelect": [{"content": "Doing"}]})), "Doing");
        assert_eq!(project_text(&json!({"relation": [{"content": "p1"}]})), "p1");
        assert_eq!(project_text(&json!({"blockID": "20240101-abc"})), "20240101-abc");
        assert_eq!(project_text(&json!({"foo": "bar"})), "");
    }

    #[test]
    fn test_precedence_text_before_id() {
        let v = json!({"id": "cell-1", "text": {"content": "shown"}});
        assert_eq!(project_text(&v), "shown");
        let v = json!({"id": "cell-1", "mSelect": [{"content": "Done"}]});
        assert_eq!(project_text(&v), "Done");
    }

    #[test]
    fn test_explicit_null_wrapper_stops_chain() {
        let v = json!({"content": null, "id": "x"});
        assert_eq!(project_text(&v), "");
    }

    #[test]
    fn test_display_text_empty_is_none() {
        assert_eq!(display_text(&json!({"text": {"content": ""}})), None);
        assert_eq!(display_text(&json!("a")), Some("a".to_string()));
    }

    #[test]
    fn test_project_date_strings() {
        assert_eq!(project_date(&json!("2024-03-05")), Some("2024-03-05".to_string()));
        assert_eq!(project_date(&json!("2024-3-5")), Some("2024-03-05".to_string()));
        assert_eq!(project_date(&json!("2024/03/05 10:30")), Some("2024-03-05".to_string()));
        assert_eq!(project_date(&json!("2024-03-05T23:30:00Z")), Some("2024-03-05".to_string()));
        assert_eq!(project_date(&json!("not a date")), None);
        assert_eq!(project_date(&json!("")), None);
    }

    #[test]
    fn test_project_date_epoch_ms_is_local() {
        let ms = Local
            .from_local_datetime(&NaiveDate::from_ymd_opt(2024, 1, 9).unwrap().and_hms_opt(0, 0, 0).unwrap())
            .earliest()
            .unwrap()
            .timestamp_millis();
        assert_eq!(project_date(&json!(ms)), Some("2024-01-09".to_string()));
        assert_eq!(project_date(&json!({"date": {"content": ms}})), Some("2024-01-09".to_string()));
        assert_eq!(project_date(&json!(0)), None);
    }

    #[test]
    fn test_project_date_objects() {
        assert_eq!(project_date(&json!({"content": "2024-12-31"})), Some("2024-12-31".to_string()));
        assert_eq!(project_date(&json!({"date": {"content": null}, "content": "2024-01-01"})), Some("2024-01-01".to_string()));
        assert_eq!(project_date(&json!({"date": {}})), None);
        assert_eq!(project_date(&json!([1, 2])), None);
    }

    #[test]
    fn test_project_number() {
        assert_eq!(project_number(&json!(3.5)), Some(3.5));
        assert_eq!(project_number(&json!(" 12 ")), Some(12.0));
        assert_eq!(project_number(&json!("abc")), None);
        assert_eq!(project_number(&json!("")), None);
        assert_eq!(project_number(&json!("inf")), None);
        assert_eq!(project_number(&json!({"number": {"content": 40}})), Some(40.0));
        assert_eq!(project_number(&json!({"content": "7"})), Some(7.0));
        assert_eq!(project_number(&json!(false)), None);
    }

    #[test]
    fn test_extract_identifier_forms() {
        assert_eq!(
            extract_identifier(&json!("((20240101120000-abc123 \"Title\"))")),
            "20240101120000-abc123"
        );
        assert_eq!(extract_identifier(&json!("((20240101120000-abc123))")), "20240101120000-abc123");
        assert_eq!(extract_identifier(&json!("[[xyz789]]")), "xyz789");
        assert_eq!(extract_identifier(&json!("plain-id")), "plain-id");
        assert_eq!(extract_identifier(&json!("  spaced  ")), "spaced");
        assert_eq!(extract_identifier(&json!(null)), "");
    }

    #[test]
    fn test_extract_identifier_from_relation_cell() {
        let v = json!({"relation": [{"content": "[[20231231-parent1]]"}]});
        assert_eq!(extract_identifier(&v), "20231231-parent1");
    }
}
