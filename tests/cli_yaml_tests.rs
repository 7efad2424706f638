//! Pipeline file parsing (JSON and YAML) and the bundled demo pipelines.

use docflow_core::config::EngineConfig;
use docflow_core::dag::StageSpec;
use docflow_core::value::Document;
use docflow_exec::Engine;
use docflow_planner::{parse_json_pipeline, parse_yaml_pipeline, ParsedPipeline, PlanError};
use std::fs;
use std::path::Path;

fn demo_dir() -> &'static Path {
    Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/demos"))
}

fn parse_file(path: &Path) -> ParsedPipeline {
    let src = fs::read_to_string(path).unwrap();
    let base = EngineConfig::default();
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => parse_yaml_pipeline(&src, &base),
        _ => parse_json_pipeline(&src, &base),
    }
    .unwrap_or_else(|e| panic!("{}: {e}", path.display()))
}

fn load_jsonl(path: &Path) -> Vec<Document> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

fn demo_engine() -> Engine {
    let engine = Engine::new(EngineConfig::default());
    for name in ["participants", "visits", "clinical_notes"] {
        let docs = load_jsonl(&demo_dir().join("data").join(format!("{name}.jsonl")));
        engine.insert_collection(name, docs);
    }
    engine
        .create_text_index("clinical_notes", &["note_text"])
        .unwrap();
    engine
}

#[test]
fn test_demo_pipelines_run() {
    let engine = demo_engine();
    let mut paths: Vec<_> = fs::read_dir(demo_dir().join("pipelines"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    paths.sort();
    assert_eq!(paths.len(), 6);

    for path in paths {
        let parsed = parse_file(&path);
        let out = engine
            .run(&parsed.pipeline)
            .unwrap_or_else(|e| panic!("{}: {e}", path.display()));
        assert!(!out.documents.is_empty(), "{} produced nothing", path.display());
    }
}

#[test]
fn test_yaml_stage_shapes() {
    let yaml = r#"
collection: visits
pipeline:
  - $unwind: { path: $attachments, includeArrayIndex: idx, preserveNullAndEmptyArrays: true }
  - $skip: 2
  - $limit: 5
  - $count: n
"#;
    let parsed = parse_yaml_pipeline(yaml, &EngineConfig::default()).unwrap();
    let names: Vec<_> = parsed.pipeline.stages.iter().map(StageSpec::name).collect();
    assert_eq!(names, vec!["$unwind", "$skip", "$limit", "$count"]);
}

#[test]
fn test_yaml_config_block() {
    let yaml = r#"
collection: clinical_notes
config:
  text_phrases_required: true
  max_stage_docs: 1000
pipeline:
  - $match: { $text: { $search: '"chest discomfort"' } }
"#;
    let parsed = parse_yaml_pipeline(yaml, &EngineConfig::default()).unwrap();
    let mut cfg = EngineConfig::default();
    parsed.config.apply(&mut cfg);
    assert!(cfg.text_phrases_required);
    assert_eq!(cfg.max_stage_docs, Some(1000));
}

#[test]
fn test_unknown_stage_is_rejected() {
    let yaml = r#"
collection: visits
pipeline:
  - $bucket: { groupBy: $visit_no }
"#;
    let err = parse_yaml_pipeline(yaml, &EngineConfig::default()).unwrap_err();
    assert!(matches!(err, PlanError::Invalid(msg) if msg.contains("$bucket")));
}

#[test]
fn test_pipeline_and_find_are_exclusive() {
    let json = r#"{"collection": "visits", "pipeline": [], "find": {}}"#;
    assert!(parse_json_pipeline(json, &EngineConfig::default()).is_err());
}
