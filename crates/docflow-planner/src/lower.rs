//! Lowering: `LogicalPipeline` → `PhysicalPipeline`.
//!
//! The only access-path decision is the source. A first `$match` carrying
//! `$text` becomes a text-index source (the rest of that filter rides along
//! as a residual); everything else scans the collection in order.
//!
//! Checks performed here:
//! - `$text` appears nowhere but the first stage;
//! - text-score metadata (`$meta` expressions, `{$meta: "textScore"}` sorts)
//!   is only requested when the source is a text search.

use docflow_core::dag::{LogicalPipeline, SortDirection, Source, StageSpec, TextSearchSpec};
use docflow_core::value::{Document, Value};

use crate::error::{PlanError, Result};
use crate::physical::PhysicalPipeline;

pub fn lower_to_physical(logical: &LogicalPipeline) -> Result<PhysicalPipeline> {
    if let Some(index) = logical
        .stages
        .iter()
        .skip(1)
        .position(|s| s.text_search().is_some())
    {
        return Err(PlanError::TextNotFirst { index: index + 1 });
    }

    let collection = logical.collection.clone();
    let (source, rest) = match logical.stages.split_first() {
        Some((StageSpec::Match(filter), rest)) if filter.contains_key("$text") => {
            let (search, residual) = split_text(filter)?;
            let source = Source::TextSearch {
                collection,
                search,
                residual,
            };
            (source, rest)
        }
        _ => (Source::Scan { collection }, logical.stages.as_slice()),
    };

    if matches!(source, Source::Scan { .. }) {
        if let Some(stage) = rest.iter().find(|s| uses_text_score(s)) {
            return Err(PlanError::Invalid(format!(
                "{} requests textScore metadata, but the pipeline does not start with a $text $match",
                stage.name()
            )));
        }
    }

    Ok(PhysicalPipeline::new(source, rest.to_vec()))
}

fn split_text(filter: &Document) -> Result<(TextSearchSpec, Option<Document>)> {
    let mut residual = Document::with_capacity(filter.len());
    let mut search = None;
    for (key, value) in filter.iter() {
        if key == "$text" {
            search = Some(text_spec(value)?);
        } else {
            residual.insert(key, value.clone());
        }
    }
    let search = search.ok_or_else(|| PlanError::Invalid("$match has no $text clause".into()))?;
    Ok((search, (!residual.is_empty()).then_some(residual)))
}

fn text_spec(value: &Value) -> Result<TextSearchSpec> {
    let doc = value
        .as_document()
        .ok_or_else(|| PlanError::Invalid("$text expects a document".into()))?;
    let mut search = None;
    for (key, v) in doc.iter() {
        match (key, v) {
            ("$search", Value::String(s)) => search = Some(s.clone()),
            ("$language", Value::String(_)) => {}
            ("$caseSensitive" | "$diacriticSensitive", Value::Bool(false)) => {}
            (other, v) => {
                return Err(PlanError::Invalid(format!(
                    "$text: unsupported option {other}: {v}"
                )))
            }
        }
    }
    let search = search.ok_or_else(|| PlanError::Invalid("$text requires a $search string".into()))?;
    Ok(TextSearchSpec { search })
}

fn uses_text_score(stage: &StageSpec) -> bool {
    match stage {
        StageSpec::Sort(keys) => keys.iter().any(|k| k.direction == SortDirection::TextScore),
        StageSpec::Match(doc) | StageSpec::Project(doc) | StageSpec::AddFields(doc) => {
            doc.iter().any(|(_, v)| mentions_meta(v))
        }
        StageSpec::Group(spec) => {
            mentions_meta(&spec.id) || spec.accumulators.iter().any(|(_, v)| mentions_meta(v))
        }
        _ => false,
    }
}

fn mentions_meta(value: &Value) -> bool {
    match value {
        Value::Document(d) => d.iter().any(|(k, v)| k == "$meta" || mentions_meta(v)),
        Value::Array(items) => items.iter().any(mentions_meta),
        _ => false,
    }
}
