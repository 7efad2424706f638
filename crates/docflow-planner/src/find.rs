//! `find()` lowering.
//!
//! `find(filter, projection).sort(s).skip(k).limit(n)` becomes
//! `[$match, $sort, $skip, $limit, $project]`. Sorting runs before the
//! projection so sort keys the projection drops still order the output.
//! Empty parts are omitted.

use docflow_core::config::EngineConfig;
use docflow_core::dag::{SortDirection, StageSpec};
use docflow_core::value::{Document, Value};
use serde::{Deserialize, Serialize};

use crate::dsl::stages::parse_stage;
use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FindQuery {
    pub filter: Document,
    pub projection: Option<Document>,
    pub sort: Option<Document>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

impl FindQuery {
    pub fn lower(&self, config: &EngineConfig) -> Result<Vec<StageSpec>> {
        let mut stages = Vec::new();
        if !self.filter.is_empty() {
            stages.push(StageSpec::Match(self.filter.clone()));
        }

        let mut score_sort = false;
        if let Some(sort) = self.sort.as_ref().filter(|s| !s.is_empty()) {
            let stage = parse_stage(&single("$sort", Value::Document(sort.clone())))?;
            if let StageSpec::Sort(keys) = &stage {
                score_sort = keys.iter().any(|k| k.direction == SortDirection::TextScore);
            }
            stages.push(stage);
        }

        if let Some(n) = self.skip.filter(|n| *n > 0) {
            stages.push(StageSpec::Skip(n));
        }
        if let Some(n) = self.limit {
            stages.push(StageSpec::Limit(n));
        }

        match self.projection.as_ref().filter(|p| !p.is_empty()) {
            Some(projection) => stages.push(StageSpec::Project(projection.clone())),
            // A relevance-ordered find without a projection still exposes the score.
            None if score_sort => {
                let mut fields = Document::new();
                fields.insert(config.text_score_field.clone(), text_score_meta());
                stages.push(StageSpec::AddFields(fields));
            }
            None => {}
        }
        Ok(stages)
    }
}

fn single(key: &str, value: Value) -> Value {
    let mut doc = Document::with_capacity(1);
    doc.insert(key, value);
    Value::Document(doc)
}

fn text_score_meta() -> Value {
    single("$meta", Value::from("textScore"))
}
