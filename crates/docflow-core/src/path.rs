//! Dotted field paths (`p.arm`, `ct_attachments.storage_uri`, `ct_attachments.0`).
//!
//! Resolution rules, applied one segment at a time:
//! - on a Document: look the key up; absent means Missing (`None`);
//! - on an Array with a numeric segment: positional index, Missing if out of range;
//! - on an Array otherwise: broadcast the remaining path over every element and
//!   collect the present results into a new Array;
//! - on a scalar: Missing.
//!
//! `set` and `remove` build new documents; inputs are never mutated. `set`
//! through an array updates every element (or the indexed one).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::value::{Document, Value};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::Path("empty field path".into()));
        }
        let segments: Vec<String> = s.split('.').map(str::to_string).collect();
        if segments.iter().any(|seg| seg.is_empty()) {
            return Err(Error::Path(format!("empty segment in field path '{s}'")));
        }
        if segments[0].starts_with('$') {
            return Err(Error::Path(format!(
                "field path '{s}' must not start with '$'"
            )));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// First segment, i.e. the top-level field this path lives under.
    pub fn head(&self) -> &str {
        &self.segments[0]
    }

    pub fn is_top_level(&self) -> bool {
        self.segments.len() == 1
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl FromStr for FieldPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        FieldPath::parse(s)
    }
}

impl TryFrom<String> for FieldPath {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        FieldPath::parse(&s)
    }
}

impl From<FieldPath> for String {
    fn from(p: FieldPath) -> String {
        p.to_string()
    }
}

/// Resolve `path` against `doc`. `None` is the Missing marker (distinct from Null).
pub fn resolve(doc: &Document, path: &FieldPath) -> Option<Value> {
    let (first, rest) = path.segments.split_first()?;
    resolve_segments(doc.get(first)?, rest)
}

/// Resolve the remaining `segments` starting from an arbitrary value.
pub fn resolve_segments(value: &Value, segments: &[String]) -> Option<Value> {
    resolve_from(value, segments, true)
}

/// Like [`resolve`], but a broadcast that collected nothing is Missing
/// rather than an empty array. Query conditions use this form so that
/// `a.b` is absent when no element of `a` has `b`.
pub fn resolve_present(doc: &Document, path: &FieldPath) -> Option<Value> {
    let (first, rest) = path.segments.split_first()?;
    resolve_from(doc.get(first)?, rest, false)
}

/// Resolve through nested documents only: an array before the last segment
/// makes the path Missing.
pub fn resolve_direct(doc: &Document, path: &FieldPath) -> Option<Value> {
    let (last, parents) = path.segments.split_last()?;
    let mut current = doc;
    for seg in parents {
        current = current.get(seg)?.as_document()?;
    }
    current.get(last).cloned()
}

fn resolve_from(value: &Value, segments: &[String], keep_empty: bool) -> Option<Value> {
    let Some((seg, rest)) = segments.split_first() else {
        return Some(value.clone());
    };
    match value {
        Value::Document(d) => resolve_from(d.get(seg)?, rest, keep_empty),
        Value::Array(items) => match array_index(seg) {
            Some(idx) => resolve_from(items.get(idx)?, rest, keep_empty),
            None => {
                let found: Vec<Value> = items
                    .iter()
                    .filter_map(|item| match item {
                        Value::Document(d) => {
                            d.get(seg).and_then(|v| resolve_from(v, rest, keep_empty))
                        }
                        _ => None,
                    })
                    .collect();
                if found.is_empty() && !keep_empty {
                    None
                } else {
                    Some(Value::Array(found))
                }
            }
        },
        _ => None,
    }
}

fn array_index(seg: &str) -> Option<usize> {
    if seg.bytes().all(|b| b.is_ascii_digit()) {
        seg.parse().ok()
    } else {
        None
    }
}

/// Return a copy of `doc` with `path` set to `value`, creating intermediate
/// documents as needed (a scalar in the way is replaced by a document).
pub fn set(doc: &Document, path: &FieldPath, value: Value) -> Document {
    doc.clone().with_path(path, value)
}

/// Return a copy of `doc` without `path`. Missing paths are a no-op.
pub fn remove(doc: &Document, path: &FieldPath) -> Document {
    doc.clone().without_path(path)
}

impl Document {
    /// Consuming form of [`set`]: the caller gives up `self`, so no copy is made.
    pub fn with_path(mut self, path: &FieldPath, value: Value) -> Document {
        set_in(&mut self, &path.segments, value);
        self
    }

    /// Consuming form of [`remove`].
    pub fn without_path(mut self, path: &FieldPath) -> Document {
        remove_in(&mut self, &path.segments);
        self
    }

    pub fn resolve(&self, path: &FieldPath) -> Option<Value> {
        resolve(self, path)
    }
}

fn set_in(doc: &mut Document, segments: &[String], value: Value) {
    match segments {
        [] => {}
        [last] => {
            doc.0.insert(last.clone(), value);
        }
        [head, rest @ ..] => {
            let slot = doc
                .0
                .entry(head.clone())
                .or_insert_with(|| Value::Document(Document::new()));
            set_value(slot, rest, value);
        }
    }
}

/// Set `segments` below `slot`. Arrays take the value element-wise, or at
/// the position a numeric segment names; scalars are replaced by documents.
fn set_value(slot: &mut Value, segments: &[String], value: Value) {
    match slot {
        Value::Document(child) => set_in(child, segments, value),
        Value::Array(items) => {
            let positional = segments.split_first().and_then(|(seg, rest)| {
                array_index(seg)
                    .filter(|&i| i < items.len())
                    .map(|i| (i, rest))
            });
            match positional {
                Some((idx, [])) => items[idx] = value,
                Some((idx, rest)) => set_value(&mut items[idx], rest, value),
                None => {
                    for item in items.iter_mut() {
                        set_value(item, segments, value.clone());
                    }
                }
            }
        }
        other => {
            let mut child = Document::new();
            set_in(&mut child, segments, value);
            *other = Value::Document(child);
        }
    }
}

fn remove_in(doc: &mut Document, segments: &[String]) {
    match segments {
        [] => {}
        [last] => {
            doc.0.shift_remove(last);
        }
        [head, rest @ ..] => {
            if let Some(Value::Document(child)) = doc.0.get_mut(head) {
                remove_in(child, rest);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn doc(json: serde_json::Value) -> Document {
        Document::try_from(json).unwrap()
    }

    fn p(s: &str) -> FieldPath {
        FieldPath::parse(s).unwrap()
    }

    #[test]
    fn resolves_nested_fields() {
        let d = doc(json!({"p": {"arm": "drug_a", "age": 52}}));
        assert_eq!(resolve(&d, &p("p.arm")), Some(Value::from("drug_a")));
        assert_eq!(resolve(&d, &p("p.site")), None);
        assert_eq!(resolve(&d, &p("p.arm.x")), None);
    }

    #[test]
    fn missing_is_distinct_from_null() {
        let d = doc(json!({"a": null}));
        assert_eq!(resolve(&d, &p("a")), Some(Value::Null));
        assert_eq!(resolve(&d, &p("b")), None);
    }

    #[test]
    fn broadcasts_over_arrays_of_documents() {
        let d = doc(json!({
            "ct": [
                {"storage_uri": "s3://a", "modality": "CT"},
                {"modality": "CT"},
                {"storage_uri": "s3://b"},
                7
            ]
        }));
        assert_eq!(
            resolve(&d, &p("ct.storage_uri")),
            Some(Value::Array(vec!["s3://a".into(), "s3://b".into()]))
        );
    }

    #[test]
    fn numeric_segment_indexes_arrays() {
        let d = doc(json!({"xs": [{"v": 1}, {"v": 2}], "empty": []}));
        assert_eq!(resolve(&d, &p("xs.1.v")), Some(Value::from(2)));
        assert_eq!(resolve(&d, &p("xs.5")), None);
        assert_eq!(resolve(&d, &p("empty.0")), None);
    }

    #[test]
    fn set_creates_intermediates_without_mutating_input() {
        let d = doc(json!({"a": 1, "b": 5}));
        let out = set(&d, &p("b.c.d"), Value::from("x"));
        assert_eq!(d, doc(json!({"a": 1, "b": 5})));
        assert_eq!(out, doc(json!({"a": 1, "b": {"c": {"d": "x"}}})));
    }

    #[test]
    fn set_keeps_field_position() {
        let d = doc(json!({"a": 1, "b": 2, "c": 3}));
        let out = set(&d, &p("b"), Value::from(9));
        assert_eq!(out.keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn set_through_array_updates_each_element() {
        let d = doc(json!({"attachments": [{"modality": "CT"}, {"modality": "MRI"}, 3]}));
        let out = set(&d, &p("attachments.reviewed"), Value::from(true));
        assert_eq!(
            out,
            doc(json!({"attachments": [
                {"modality": "CT", "reviewed": true},
                {"modality": "MRI", "reviewed": true},
                {"reviewed": true}
            ]}))
        );
    }

    #[test]
    fn set_with_positional_segment() {
        let d = doc(json!({"xs": [{"v": 1}, {"v": 2}]}));
        let out = set(&d, &p("xs.1.v"), Value::from(9));
        assert_eq!(out, doc(json!({"xs": [{"v": 1}, {"v": 9}]})));
    }

    #[test]
    fn present_resolution_treats_empty_broadcast_as_missing() {
        let d = doc(json!({"attachments": [{"modality": "CT"}], "tags": []}));
        assert_eq!(resolve(&d, &p("attachments.storage_uri")), Some(Value::Array(vec![])));
        assert_eq!(resolve_present(&d, &p("attachments.storage_uri")), None);
        assert_eq!(resolve_present(&d, &p("tags")), Some(Value::Array(vec![])));
    }

    #[test]
    fn direct_resolution_stops_at_arrays() {
        let d = doc(json!({"a": [{"tags": [1]}], "b": {"tags": [2]}}));
        assert_eq!(resolve_direct(&d, &p("a.tags")), None);
        assert_eq!(resolve_direct(&d, &p("b.tags")), Some(Value::Array(vec![2.into()])));
        assert_eq!(resolve_direct(&d, &p("a")), resolve(&d, &p("a")));
    }

    #[test]
    fn remove_nested_path() {
        let d = doc(json!({"a": {"b": 1, "c": 2}, "d": 3}));
        assert_eq!(remove(&d, &p("a.b")), doc(json!({"a": {"c": 2}, "d": 3})));
        assert_eq!(remove(&d, &p("zz.y")), d);
    }

    #[test]
    fn rejects_malformed_paths() {
        assert!(FieldPath::parse("").is_err());
        assert!(FieldPath::parse("a..b").is_err());
        assert!(FieldPath::parse("$a").is_err());
    }

    proptest! {
        #[test]
        fn set_then_resolve_round_trips(
            segments in prop::collection::vec("[a-z_]{1,6}", 1..4),
            n in -1.0e6f64..1.0e6,
        ) {
            let path = FieldPath::parse(&segments.join(".")).unwrap();
            let out = set(&Document::new(), &path, Value::from(n));
            prop_assert_eq!(resolve(&out, &path), Some(Value::from(n)));
        }
    }
}
