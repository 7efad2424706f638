//! YAML pipeline files (same shape as JSON).

use docflow_core::config::EngineConfig;

use super::{ParsedPipeline, PipelineFile};
use crate::error::Result;

pub fn parse_yaml_pipeline(src: &str, base: &EngineConfig) -> Result<ParsedPipeline> {
    let file: PipelineFile = serde_yaml::from_str(src)?;
    file.into_parsed(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_core::dag::StageSpec;

    #[test]
    fn ct_attachment_pipeline() {
        let src = r#"
collection: visits
config:
  max_stage_docs: 1000
pipeline:
  - $addFields:
      ct_attachments:
        $filter:
          input: $attachments
          as: attachment
          cond: { $eq: [ $$attachment.modality, CT ] }
  - $match: { ct_attachments.0: { $exists: true } }
  - $sort: { visit_id: 1 }
  - $limit: 10
"#;
        let parsed = parse_yaml_pipeline(src, &EngineConfig::default()).unwrap();
        assert_eq!(parsed.config.max_stage_docs, Some(1000));
        assert_eq!(parsed.pipeline.stages.len(), 4);
        assert_eq!(parsed.pipeline.stages[3], StageSpec::Limit(10));
    }

    #[test]
    fn find_block() {
        let src = r#"
collection: participants
find:
  filter: { arm: drug_a, age: { $gte: 40, $lte: 65 } }
  projection: { _id: 0, participant_id: 1, age: 1 }
  sort: { age: 1 }
"#;
        let parsed = parse_yaml_pipeline(src, &EngineConfig::default()).unwrap();
        let names: Vec<&str> = parsed.pipeline.stages.iter().map(StageSpec::name).collect();
        assert_eq!(names, vec!["$match", "$sort", "$project"]);
    }
}
