//! Pipeline files.
//!
//! ```yaml
//! collection: participants
//! config: { text_phrases_required: true }
//! pipeline:
//!   - $group: { _id: $arm, total: { $sum: 1 } }
//!   - $sort: { _id: 1 }
//! ```
//!
//! Instead of `pipeline`, a file may carry a `find` block
//! (`{filter, projection, sort, skip, limit}`), lowered by [`crate::find`].

pub mod json;
pub mod stages;
pub mod yaml;

use docflow_core::config::EngineConfig;
use docflow_core::dag::LogicalPipeline;
use docflow_core::value::Value;
use serde::{Deserialize, Serialize};

use crate::error::{PlanError, Result};
use crate::find::FindQuery;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineFile {
    pub collection: String,
    #[serde(default)]
    pub pipeline: Option<Vec<Value>>,
    #[serde(default)]
    pub find: Option<FindQuery>,
    #[serde(default)]
    pub config: Option<PipelineConfig>,
}

/// Per-pipeline overrides of `EngineConfig`. Unset fields keep the value the
/// caller already resolved (env or defaults).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub text_min_token_len: Option<usize>,
    pub text_stop_words: Option<bool>,
    pub text_phrases_required: Option<bool>,
    pub text_score_field: Option<String>,
    pub max_stage_docs: Option<usize>,
}

impl PipelineConfig {
    pub fn apply(&self, cfg: &mut EngineConfig) {
        if let Some(v) = self.text_min_token_len {
            cfg.text_min_token_len = v;
        }
        if let Some(v) = self.text_stop_words {
            cfg.text_stop_words = v;
        }
        if let Some(v) = self.text_phrases_required {
            cfg.text_phrases_required = v;
        }
        if let Some(v) = &self.text_score_field {
            cfg.text_score_field = v.clone();
        }
        if let Some(v) = self.max_stage_docs {
            cfg.max_stage_docs = Some(v);
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParsedPipeline {
    pub pipeline: LogicalPipeline,
    pub config: PipelineConfig,
}

impl PipelineFile {
    /// Resolve the stage list. `find` lowering needs the score field name, so
    /// the effective config is resolved from `base` plus the file's overrides.
    pub fn into_parsed(self, base: &EngineConfig) -> Result<ParsedPipeline> {
        let config = self.config.unwrap_or_default();
        let stages = match (self.pipeline, self.find) {
            (Some(stages), None) => stages::parse_pipeline(&stages)?,
            (None, Some(find)) => {
                let mut effective = base.clone();
                config.apply(&mut effective);
                find.lower(&effective)?
            }
            (Some(_), Some(_)) => {
                return Err(PlanError::Invalid(
                    "a pipeline file takes either 'pipeline' or 'find', not both".into(),
                ))
            }
            (None, None) => {
                return Err(PlanError::Invalid(
                    "a pipeline file needs a 'pipeline' or a 'find' block".into(),
                ))
            }
        };
        if self.collection.is_empty() {
            return Err(PlanError::Invalid("'collection' must not be empty".into()));
        }
        Ok(ParsedPipeline {
            pipeline: LogicalPipeline::new(self.collection, stages),
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_only_set_fields() {
        let mut cfg = EngineConfig::default();
        PipelineConfig {
            text_phrases_required: Some(true),
            ..Default::default()
        }
        .apply(&mut cfg);
        assert!(cfg.text_phrases_required);
        assert_eq!(cfg.text_score_field, "score");
    }
}
