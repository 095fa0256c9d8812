//! Shape normalization for drifting response envelopes
//!
//! The remote service has shipped several incompatible envelopes for "a list
//! of columns", "a list of rows" and "a list of views". Every envelope is
//! tried through an ordered set of named strategies: a handful of direct
//! access paths, then a breadth-first structural search over the whole
//! response. Nothing here fails; an unknown shape yields an empty list.

use serde_json::{Map, Value};
use std::collections::{HashSet, VecDeque};
use std::fmt;

// ============================================================================
// SHAPE TESTS
// ============================================================================

/// Structural description of one kind of record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeTest {
    /// Name used in logs.
    pub name: &'static str,
    /// Direct access paths, tried in order. The empty path is the response itself.
    pub paths: &'static [&'static [&'static str]],
    /// Fields every matching object must carry.
    pub required: &'static [&'static str],
    /// At least one of these must be present. Ignored when empty.
    pub any_of: &'static [&'static str],
    /// An empty array at a direct path is a definitive empty result.
    pub empty_is_final: bool,
}

impl ShapeTest {
    /// Column ("key") definitions: objects with `id` and `type`.
    pub const COLUMNS: ShapeTest = ShapeTest {
        name: "columns",
        paths: &[&["keys"], &["data", "keys"], &["data"], &[]],
        required: &["id", "type"],
        any_of: &[],
        empty_is_final: false,
    };

    /// View descriptors: objects with `id` and a `name`, `type` or `layoutType`.
    pub const VIEWS: ShapeTest = ShapeTest {
        name: "views",
        paths: &[&["views"], &["data", "views"], &["data"], &[]],
        required: &["id"],
        any_of: &["name", "type", "layoutType"],
        empty_is_final: false,
    };

    /// Rows: objects with `id` carrying cells in one of the known layouts.
    pub const ROWS: ShapeTest = ShapeTest {
        name: "rows",
        paths: &[
            &["view", "rows"],
            &["data", "view", "rows"],
            &["view", "data", "rows"],
            &["rows"],
            &["data", "rows"],
        ],
        required: &["id"],
        any_of: &["cells", "keyValues", "cellValues"],
        empty_is_final: true,
    };

    /// Check whether a single value looks like a record of this shape.
    pub fn matches(&self, value: &Value) -> bool {
        let Some(obj) = value.as_object() else {
            return false;
        };
        self.required.iter().all(|field| obj.contains_key(*field))
            && (self.any_of.is_empty() || self.any_of.iter().any(|field| obj.contains_key(*field)))
    }

    /// Strategies for this shape, in the order they are tried.
    pub fn strategies(&self) -> impl Iterator<Item = Strategy> + '_ {
        self.paths
            .iter()
            .copied()
            .map(Strategy::Path)
            .chain(std::iter::once(Strategy::DeepSearch))
    }
}

// ============================================================================
// STRATEGIES
// ============================================================================

/// One way of locating the record list inside a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Follow a fixed sequence of object fields.
    Path(&'static [&'static str]),
    /// Breadth-first search for the first array whose elements all match.
    DeepSearch,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Path([]) => write!(f, "<root>"),
            Strategy::Path(path) => write!(f, "{}", path.join(".")),
            Strategy::DeepSearch => write!(f, "<deep-search>"),
        }
    }
}

/// Tagged result of one strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction<'a> {
    Found {
        strategy: Strategy,
        items: Vec<&'a Value>,
    },
    NotFound,
}

impl<'a> Extraction<'a> {
    pub fn is_found(&self) -> bool {
        matches!(self, Extraction::Found { .. })
    }

    pub fn into_items(self) -> Vec<&'a Value> {
        match self {
            Extraction::Found { items, .. } => items,
            Extraction::NotFound => Vec::new(),
        }
    }
}

impl Strategy {
    /// Apply this strategy to a response.
    pub fn apply<'a>(&self, response: &'a Value, test: &ShapeTest) -> Extraction<'a> {
        let items = match self {
            Strategy::Path(path) => {
                follow_path(response, path).and_then(|v| direct_items(v, path, test))
            }
            Strategy::DeepSearch => deep_search(response, test),
        };
        match items {
            Some(items) => Extraction::Found {
                strategy: *self,
                items,
            },
            None => Extraction::NotFound,
        }
    }
}

fn follow_path<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| {
        current.as_object().and_then(|obj| obj.get(*key))
    })
}

/// A direct hit is a non-empty array, or a non-empty map of objects keyed
/// by id. At the `data` and root paths every map value must also match the
/// shape, otherwise unrelated envelopes would shadow the deep search.
fn direct_items<'a>(value: &'a Value, path: &[&str], test: &ShapeTest) -> Option<Vec<&'a Value>> {
    match value {
        Value::Array(items) if !items.is_empty() => Some(items.iter().collect()),
        Value::Array(_) if test.empty_is_final => Some(Vec::new()),
        Value::Object(map) if !map.is_empty() => {
            let accepted = if is_container_path(path) {
                map.values().all(|v| test.matches(v))
            } else {
                map.values().all(Value::is_object)
            };
            accepted.then(|| map.values().collect())
        }
        _ => None,
    }
}

fn is_container_path(path: &[&str]) -> bool {
    matches!(path, [] | ["data"])
}

fn deep_search<'a>(response: &'a Value, test: &ShapeTest) -> Option<Vec<&'a Value>> {
    let mut seen: HashSet<*const Value> = HashSet::new();
    let mut queue: VecDeque<&'a Value> = VecDeque::new();
    queue.push_back(response);

    while let Some(current) = queue.pop_front() {
        if !seen.insert(current as *const Value) {
            continue;
        }
        match current {
            Value::Array(items) => {
                if !items.is_empty() && items.iter().all(|item| test.matches(item)) {
                    return Some(items.iter().collect());
                }
                queue.extend(items.iter());
            }
            Value::Object(map) => queue.extend(map.values()),
            _ => {}
        }
    }
    None
}

// ============================================================================
// ENTRY POINTS
// ============================================================================

/// Locate the record array for `test` inside `response`.
///
/// Returns an empty list when no strategy matches.
pub fn extract_array<'a>(response: &'a Value, test: &ShapeTest) -> Vec<&'a Value> {
    extract(response, test).into_items()
}

/// Like [`extract_array`] but reports which strategy matched.
pub fn extract<'a>(response: &'a Value, test: &ShapeTest) -> Extraction<'a> {
    for strategy in test.strategies() {
        let extraction = strategy.apply(response, test);
        if extraction.is_found() {
            return extraction;
        }
    }
    Extraction::NotFound
}

/// Field lookup that tolerates non-object values.
pub fn field<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value.as_object().and_then(|obj| obj.get(key))
}

/// Nested field lookup, skipping explicit nulls at the leaf.
pub(crate) fn path<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    follow_path(value, keys).filter(|v| !v.is_null())
}

/// Render an identifier-like value (string or number) as a string.
pub fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First present, non-null field among `keys`.
pub(crate) fn first_field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| obj.get(*key))
        .find(|v| !v.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_field_wins() {
        let res = json!({"keys": [{"id": "k1", "type": "text"}]});
        let extraction = extract(&res, &ShapeTest::COLUMNS);
        assert!(matches!(
            extraction,
            Extraction::Found { strategy: Strategy::Path(["keys"]), .. }
        ));
        assert_eq!(extraction.into_items().len(), 1);
    }

    #[test]
    fn test_data_keys_envelope() {
        let res = json!({"code": 0, "data": {"keys": [{"id": "k1", "type": "date"}, {"id": "k2", "type": "block"}]}});
        let items = extract_array(&res, &ShapeTest::COLUMNS);
        assert_eq!(items.len(), 2);
        assert_eq!(items[1]["id"], "k2");
    }

    #[test]
    fn test_bare_array_response() {
        let res = json!([{"id": "k1", "type": "text"}]);
        assert_eq!(extract_array(&res, &ShapeTest::COLUMNS).len(), 1);
    }

    #[test]
    fn test_key_map_preserves_insertion_order() {
        let res = json!({"keys": {"zz": {"id": "zz", "type": "text"}, "aa": {"id": "aa", "type": "number"}}});
        let items = extract_array(&res, &ShapeTest::COLUMNS);
        let ids: Vec<&str> = items.iter().filter_map(|v| v["id"].as_str()).collect();
        assert_eq!(ids, vec!["zz", "aa"]);
    }

    #[test]
    fn test_named_key_map_keeps_untyped_entries() {
        let res = json!({"keys": {
            "k1": {"id": "k1", "name": "A"},
            "k2": {"id": "k2", "type": "number"}
        }});
        let items = extract_array(&res, &ShapeTest::COLUMNS);
        let ids: Vec<&str> = items.iter().filter_map(|v| v["id"].as_str()).collect();
        assert_eq!(ids, vec!["k1", "k2"]);
    }

    #[test]
    fn test_root_map_requires_matching_values() {
        let res = json!({
            "code": {"id": "x"},
            "payload": {"list": [{"id": "k1", "type": "text"}]}
        });
        let extraction = extract(&res, &ShapeTest::COLUMNS);
        assert!(matches!(
            extraction,
            Extraction::Found { strategy: Strategy::DeepSearch, .. }
        ));
    }

    #[test]
    fn test_empty_rows_array_is_final() {
        let res = json!({"view": {
            "rows": [],
            "groups": [{"rows": [{"id": "g1", "cells": []}]}]
        }});
        let extraction = extract(&res, &ShapeTest::ROWS);
        assert!(matches!(
            extraction,
            Extraction::Found { strategy: Strategy::Path(["view", "rows"]), .. }
        ));
        assert!(extraction.into_items().is_empty());
    }

    #[test]
    fn test_deep_search_finds_nested_array() {
        let res = json!({
            "result": {"payload": {"inner": [
                {"id": "k1", "type": "text"},
                {"id": "k2", "type": "number"}
            ]}}
        });
        let extraction = extract(&res, &ShapeTest::COLUMNS);
        assert!(matches!(
            extraction,
            Extraction::Found { strategy: Strategy::DeepSearch, .. }
        ));
        let items = extraction.into_items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], &json!({"id": "k1", "type": "text"}));
    }

    #[test]
    fn test_deep_search_skips_partial_matches() {
        let res = json!({
            "a": [{"id": "x"}, {"id": "y", "type": "text"}],
            "b": {"c": [{"id": "k1", "type": "text"}]}
        });
        let items = extract_array(&res, &ShapeTest::COLUMNS);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["id"], "k1");
    }

    #[test]
    fn test_unknown_shape_is_empty() {
        assert!(extract_array(&json!({"nothing": 1}), &ShapeTest::COLUMNS).is_empty());
        assert!(extract_array(&json!(null), &ShapeTest::COLUMNS).is_empty());
        assert!(extract_array(&json!("keys"), &ShapeTest::ROWS).is_empty());
        assert_eq!(extract(&json!({}), &ShapeTest::VIEWS), Extraction::NotFound);
    }

    #[test]
    fn test_empty_keys_array_falls_through() {
        let res = json!({"keys": [], "data": {"keys": [{"id": "k1", "type": "text"}]}});
        assert_eq!(extract_array(&res, &ShapeTest::COLUMNS).len(), 1);
    }

    #[test]
    fn test_rows_from_render_envelopes() {
        let a = json!({"view": {"rows": [{"id": "r1", "cells": []}]}});
        let b = json!({"data": {"view": {"rows": [{"id": "r1", "cells": []}]}}});
        let c = json!({"view": {"data": {"rows": [{"id": "r1", "cells": []}]}}});
        for res in [&a, &b, &c] {
            assert_eq!(extract_array(res, &ShapeTest::ROWS).len(), 1);
        }
    }

    #[test]
    fn test_views_shape_accepts_layout_type() {
        let res = json!({"av": {"views": [{"id": "v1", "layoutType": "table"}]}});
        let items = extract_array(&res, &ShapeTest::VIEWS);
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_strategy_display() {
        assert_eq!(Strategy::Path(&["data", "keys"]).to_string(), "data.keys");
        assert_eq!(Strategy::Path(&[]).to_string(), "<root>");
        assert_eq!(Strategy::DeepSearch.to_string(), "<deep-search>");
    }
}
