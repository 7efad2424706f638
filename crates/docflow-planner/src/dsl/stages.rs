//! Stage documents → `StageSpec`.
//!
//! Each stage is a single-key document naming the stage, e.g.
//! `{"$unwind": "$p"}` or `{"$sort": {"arm": 1, "visit_no": -1}}`. Only the
//! stage shape is checked here; expressions inside are compiled later.

use docflow_core::dag::{GroupSpec, LookupSpec, SortDirection, SortKey, StageSpec, UnwindSpec};
use docflow_core::path::FieldPath;
use docflow_core::value::{Document, Value};

use crate::error::{PlanError, Result};

pub fn parse_pipeline(stages: &[Value]) -> Result<Vec<StageSpec>> {
    stages
        .iter()
        .enumerate()
        .map(|(i, stage)| {
            parse_stage(stage).map_err(|e| match e {
                PlanError::Invalid(msg) => PlanError::Invalid(format!("stage {i}: {msg}")),
                other => other,
            })
        })
        .collect()
}

pub fn parse_stage(stage: &Value) -> Result<StageSpec> {
    let doc = stage
        .as_document()
        .ok_or_else(|| invalid(format!("stage must be a document, found {}", stage.type_name())))?;
    let mut entries = doc.iter();
    let (name, body) = match (entries.next(), entries.next()) {
        (Some(entry), None) => entry,
        _ => return Err(invalid("stage document must have exactly one key")),
    };

    Ok(match name {
        "$match" => StageSpec::Match(document(name, body)?.clone()),
        "$project" => StageSpec::Project(document(name, body)?.clone()),
        "$addFields" | "$set" => StageSpec::AddFields(document(name, body)?.clone()),
        "$group" => StageSpec::Group(group(document(name, body)?)?),
        "$sort" => StageSpec::Sort(sort(document(name, body)?)?),
        "$limit" => StageSpec::Limit(count(name, body)?),
        "$skip" => StageSpec::Skip(count(name, body)?),
        "$lookup" => StageSpec::Lookup(lookup(document(name, body)?)?),
        "$unwind" => StageSpec::Unwind(unwind(body)?),
        "$count" => match body {
            Value::String(field) => StageSpec::Count(field.clone()),
            other => return Err(invalid(format!("$count expects a string, found {}", other.type_name()))),
        },
        other => return Err(invalid(format!("unknown stage '{other}'"))),
    })
}

fn invalid(msg: impl Into<String>) -> PlanError {
    PlanError::Invalid(msg.into())
}

fn document<'v>(stage: &str, body: &'v Value) -> Result<&'v Document> {
    body.as_document()
        .ok_or_else(|| invalid(format!("{stage} expects a document, found {}", body.type_name())))
}

fn count(stage: &str, body: &Value) -> Result<u64> {
    match body {
        Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 && *n <= u64::MAX as f64 => Ok(*n as u64),
        other => Err(invalid(format!("{stage} expects a non-negative integer, found {other}"))),
    }
}

fn path(s: &str) -> Result<FieldPath> {
    Ok(FieldPath::parse(s)?)
}

/// A `"$a.b"` field reference as a path.
fn field_ref(stage: &str, value: &Value) -> Result<FieldPath> {
    match value.as_str().and_then(|s| s.strip_prefix('$')) {
        Some(p) if !p.starts_with('$') => path(p),
        _ => Err(invalid(format!("{stage} expects a field path starting with '$', found {value}"))),
    }
}

fn string_field<'v>(stage: &str, doc: &'v Document, key: &str) -> Result<&'v str> {
    match doc.get(key) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(invalid(format!("{stage}.{key} must be a string, found {}", other.type_name()))),
        None => Err(invalid(format!("{stage} requires '{key}'"))),
    }
}

fn group(body: &Document) -> Result<GroupSpec> {
    let id = body
        .get("_id")
        .cloned()
        .ok_or_else(|| invalid("$group requires an _id"))?;
    let accumulators = body
        .iter()
        .filter(|(k, _)| *k != "_id")
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    Ok(GroupSpec { id, accumulators })
}

fn sort(body: &Document) -> Result<Vec<SortKey>> {
    if body.is_empty() {
        return Err(invalid("$sort requires at least one key"));
    }
    body.iter()
        .map(|(field, dir)| {
            let direction = match dir {
                Value::Number(n) if *n == 1.0 => SortDirection::Ascending,
                Value::Number(n) if *n == -1.0 => SortDirection::Descending,
                Value::Document(d)
                    if d.len() == 1 && d.get("$meta").and_then(Value::as_str) == Some("textScore") =>
                {
                    SortDirection::TextScore
                }
                other => {
                    return Err(invalid(format!(
                        "$sort direction for '{field}' must be 1, -1 or {{$meta: \"textScore\"}}, found {other}"
                    )))
                }
            };
            Ok(SortKey {
                path: path(field)?,
                direction,
            })
        })
        .collect()
}

fn lookup(body: &Document) -> Result<LookupSpec> {
    Ok(LookupSpec {
        from: string_field("$lookup", body, "from")?.to_string(),
        local_field: path(string_field("$lookup", body, "localField")?)?,
        foreign_field: path(string_field("$lookup", body, "foreignField")?)?,
        as_field: path(string_field("$lookup", body, "as")?)?,
    })
}

fn unwind(body: &Value) -> Result<UnwindSpec> {
    match body {
        Value::String(_) => Ok(UnwindSpec {
            path: field_ref("$unwind", body)?,
            include_array_index: None,
            preserve_null_and_empty_arrays: false,
        }),
        Value::Document(doc) => {
            let target = doc
                .get("path")
                .ok_or_else(|| invalid("$unwind requires 'path'"))?;
            let include_array_index = match doc.get("includeArrayIndex") {
                None => None,
                Some(Value::String(s)) if !s.starts_with('$') => Some(path(s)?),
                Some(other) => {
                    return Err(invalid(format!(
                        "$unwind.includeArrayIndex must be a field name, found {other}"
                    )))
                }
            };
            let preserve_null_and_empty_arrays = match doc.get("preserveNullAndEmptyArrays") {
                None => false,
                Some(Value::Bool(b)) => *b,
                Some(other) => {
                    return Err(invalid(format!(
                        "$unwind.preserveNullAndEmptyArrays must be a boolean, found {}",
                        other.type_name()
                    )))
                }
            };
            Ok(UnwindSpec {
                path: field_ref("$unwind", target)?,
                include_array_index,
                preserve_null_and_empty_arrays,
            })
        }
        other => Err(invalid(format!(
            "$unwind expects a path string or a document, found {}",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stage(v: serde_json::Value) -> Result<StageSpec> {
        parse_stage(&Value::from(v))
    }

    #[test]
    fn completion_rate_pipeline() {
        let stages: Vec<Value> = vec![
            json!({"$group": {
                "_id": "$arm",
                "total": {"$sum": 1},
                "completed": {"$sum": {"$cond": [{"$eq": ["$status", "completed"]}, 1, 0]}}
            }}),
            json!({"$project": {"_id": 0, "arm": "$_id"}}),
            json!({"$sort": {"arm": 1}}),
        ]
        .into_iter()
        .map(Value::from)
        .collect();
        let parsed = parse_pipeline(&stages).unwrap();
        let StageSpec::Group(group) = &parsed[0] else {
            panic!("expected $group");
        };
        assert_eq!(group.id, Value::from("$arm"));
        let names: Vec<&str> = group.accumulators.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["total", "completed"]);
        assert_eq!(parsed[2].name(), "$sort");
    }

    #[test]
    fn unwind_forms() {
        let StageSpec::Unwind(short) = stage(json!({"$unwind": "$p"})).unwrap() else {
            panic!("expected $unwind");
        };
        assert_eq!(short.path.to_string(), "p");
        assert!(!short.preserve_null_and_empty_arrays);

        let StageSpec::Unwind(long) = stage(json!({"$unwind": {
            "path": "$tags", "includeArrayIndex": "i", "preserveNullAndEmptyArrays": true
        }}))
        .unwrap() else {
            panic!("expected $unwind");
        };
        assert_eq!(long.include_array_index.unwrap().to_string(), "i");
        assert!(long.preserve_null_and_empty_arrays);

        assert!(stage(json!({"$unwind": "p"})).is_err());
    }

    #[test]
    fn sort_directions() {
        let StageSpec::Sort(keys) =
            stage(json!({"$sort": {"score": {"$meta": "textScore"}, "visit_id": -1}})).unwrap()
        else {
            panic!("expected $sort");
        };
        assert_eq!(keys[0].direction, SortDirection::TextScore);
        assert_eq!(keys[1].direction, SortDirection::Descending);
        assert!(stage(json!({"$sort": {"a": 2}})).is_err());
    }

    #[test]
    fn lookup_requires_every_field() {
        assert!(stage(json!({"$lookup": {"from": "participants", "localField": "a", "as": "p"}})).is_err());
        let StageSpec::Lookup(l) = stage(json!({"$lookup": {
            "from": "participants", "localField": "participant_id",
            "foreignField": "participant_id", "as": "p"
        }}))
        .unwrap() else {
            panic!("expected $lookup");
        };
        assert_eq!(l.from, "participants");
    }

    #[test]
    fn rejects_malformed_stages() {
        assert!(stage(json!({"$limit": -1})).is_err());
        assert!(stage(json!({"$limit": 1.5})).is_err());
        assert!(stage(json!({"$bucket": {}})).is_err());
        assert!(stage(json!({"$match": {}, "$limit": 1})).is_err());
        assert!(stage(json!({"$group": {"n": {"$sum": 1}}})).is_err());
        assert!(stage(json!([1])).is_err());
    }

    #[test]
    fn errors_name_the_stage_index() {
        let stages = vec![Value::from(json!({"$limit": 1})), Value::from(json!({"$nope": 1}))];
        let err = parse_pipeline(&stages).unwrap_err();
        assert!(err.to_string().contains("stage 1"));
    }
}
