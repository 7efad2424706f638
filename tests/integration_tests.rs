//! End-to-end integration tests over the clinical-trial fixtures.


use docflow_core::config::EngineConfig;
use docflow_exec::{Engine, ExecError};
use docflow_operators::OpError;
use docflow_planner::PlanError;
use serde_json::json;
use test_data::{as_json, pipeline, trial_engine};

#[test]
fn test_structured_filter_participants() {
    let engine = trial_engine();
    let q1 = pipeline(json!({
        "collection": "participants",
        "find": {
            "filter": {"arm": "drug_a", "site_id": "SITE-03", "age": {"$gte": 40, "$lte": 65}},
            "projection": {"_id": 0, "participant_id": 1, "age": 1, "arm": 1, "site_id": 1},
            "sort": {"age": 1}
        }
    }));

    let out = engine.run(&q1).unwrap();
    assert_eq!(
        as_json(&out.documents),
        vec![
            json!({"participant_id": "P004", "age": 40, "arm": "drug_a", "site_id": "SITE-03"}),
            json!({"participant_id": "P001", "age": 45, "arm": "drug_a", "site_id": "SITE-03"}),
        ]
    );
    let keys: Vec<&str> = out.documents[0].keys().collect();
    assert_eq!(keys, vec!["participant_id", "age", "arm", "site_id"]);
}

#[test]
fn test_completion_rate_by_arm() {
    let engine = trial_engine();
    let q2 = pipeline(json!({
        "collection": "participants",
        "pipeline": [
            {"$group": {
                "_id": "$arm",
                "total": {"$sum": 1},
                "completed": {"$sum": {"$cond": [{"$eq": ["$status", "completed"]}, 1, 0]}}
            }},
            {"$project": {
                "_id": 0,
                "arm": "$_id",
                "total": 1,
                "completed": 1,
                "completion_rate": {"$round": [{"$divide": ["$completed", "$total"]}, 3]}
            }},
            {"$sort": {"arm": 1}}
        ]
    }));

    let out = engine.run(&q2).unwrap();
    assert_eq!(
        as_json(&out.documents),
        vec![
            json!({"arm": "drug_a", "total": 4, "completed": 3, "completion_rate": 0.75}),
            json!({"arm": "drug_b", "total": 1, "completed": 1, "completion_rate": 1}),
            json!({"arm": "placebo", "total": 2, "completed": 1, "completion_rate": 0.5}),
        ]
    );
}

#[test]
fn test_symptom_trend_by_arm() {
    let engine = trial_engine();
    let q3 = pipeline(json!({
        "collection": "visits",
        "pipeline": [
            {"$lookup": {"from": "participants", "localField": "participant_id",
                         "foreignField": "participant_id", "as": "p"}},
            {"$unwind": "$p"},
            {"$group": {
                "_id": {"arm": "$p.arm", "visit_no": "$visit_no"},
                "avg_symptom_score": {"$avg": "$symptom_score"},
                "n": {"$sum": 1}
            }},
            {"$project": {
                "_id": 0,
                "arm": "$_id.arm",
                "visit_no": "$_id.visit_no",
                "avg_symptom_score": {"$round": ["$avg_symptom_score", 2]},
                "n": 1
            }},
            {"$sort": {"arm": 1, "visit_no": 1}}
        ]
    }));

    let out = engine.run(&q3).unwrap();
    // V006 references an unknown participant and is dropped by $unwind.
    assert_eq!(
        as_json(&out.documents),
        vec![
            json!({"arm": "drug_a", "visit_no": 1, "avg_symptom_score": 4.33, "n": 3}),
            json!({"arm": "drug_a", "visit_no": 2, "avg_symptom_score": 3, "n": 1}),
            json!({"arm": "placebo", "visit_no": 1, "avg_symptom_score": 5, "n": 1}),
            json!({"arm": "placebo", "visit_no": 2, "avg_symptom_score": 2, "n": 1}),
        ]
    );
    let inputs: Vec<&str> = out
        .manifest
        .inputs
        .iter()
        .map(|i| i.collection.as_str())
        .collect();
    assert_eq!(inputs, vec!["visits", "participants"]);
}

#[test]
fn test_text_search_notes() {
    let engine = trial_engine();
    let q4 = pipeline(json!({
        "collection": "clinical_notes",
        "find": {
            "filter": {"$text": {"$search": "fatigue nausea"}},
            "projection": {"_id": 0, "participant_id": 1, "visit_id": 1, "note_text": 1,
                           "score": {"$meta": "textScore"}},
            "sort": {"score": {"$meta": "textScore"}},
            "limit": 10
        }
    }));

    let out = engine.run(&q4).unwrap();
    let ids: Vec<_> = out
        .documents
        .iter()
        .map(|d| d.get("participant_id").and_then(|v| v.as_str()).unwrap().to_string())
        .collect();
    // Both terms first, then the rarer term, then ties in collection order.
    assert_eq!(ids, vec!["P001", "P005", "P003", "P002", "P004", "P003"]);

    let scores: Vec<f64> = out
        .documents
        .iter()
        .map(|d| d.get("score").and_then(|v| v.as_f64()).unwrap())
        .collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    let fatigue = (1.0f64 + 8.0 / 5.0).ln();
    let nausea = (1.0f64 + 8.0 / 2.0).ln();
    assert!((scores[0] - (fatigue + nausea)).abs() < 1e-9);
    assert!((scores[1] - nausea).abs() < 1e-9);
    assert!((scores[2] - fatigue).abs() < 1e-9);
}

#[test]
fn test_hybrid_text_structured_filter() {
    let engine = trial_engine();
    let q5 = pipeline(json!({
        "collection": "clinical_notes",
        "pipeline": [
            {"$match": {"$text": {"$search": "\"chest discomfort\" fatigue"}}},
            {"$lookup": {"from": "participants", "localField": "participant_id",
                         "foreignField": "participant_id", "as": "p"}},
            {"$unwind": "$p"},
            {"$match": {"p.arm": "drug_a", "p.age": {"$gte": 50}}},
            {"$group": {
                "_id": "$p.site_id",
                "note_hits": {"$sum": 1},
                "participants": {"$addToSet": "$participant_id"}
            }},
            {"$project": {
                "_id": 0,
                "site_id": "$_id",
                "note_hits": 1,
                "unique_participants": {"$size": "$participants"}
            }},
            {"$sort": {"note_hits": -1}}
        ]
    }));

    let out = engine.run(&q5).unwrap();
    assert_eq!(
        as_json(&out.documents),
        vec![
            json!({"site_id": "SITE-01", "note_hits": 2, "unique_participants": 1}),
            json!({"site_id": "SITE-03", "note_hits": 1, "unique_participants": 1}),
        ]
    );
}

#[test]
fn test_visits_with_ct_attachments() {
    let engine = trial_engine();
    let q6 = pipeline(json!({
        "collection": "visits",
        "pipeline": [
            {"$addFields": {"ct_attachments": {"$filter": {
                "input": "$attachments",
                "as": "attachment",
                "cond": {"$eq": ["$$attachment.modality", "CT"]}
            }}}},
            {"$match": {"ct_attachments.0": {"$exists": true}}},
            {"$project": {
                "_id": 0,
                "visit_id": 1,
                "participant_id": 1,
                "site_id": 1,
                "ct_count": {"$size": "$ct_attachments"},
                "ct_uris": "$ct_attachments.storage_uri"
            }},
            {"$sort": {"visit_id": 1}},
            {"$limit": 10}
        ]
    }));

    let out = engine.run(&q6).unwrap();
    assert_eq!(
        as_json(&out.documents),
        vec![
            json!({"visit_id": "V001", "participant_id": "P001", "site_id": "SITE-03",
                   "ct_count": 1, "ct_uris": ["s3://imaging/v001-ct"]}),
            json!({"visit_id": "V003", "participant_id": "P003", "site_id": "SITE-01",
                   "ct_count": 2, "ct_uris": ["s3://imaging/v003-ct-a", "s3://imaging/v003-ct-b"]}),
            json!({"visit_id": "V006", "participant_id": "P999", "site_id": "SITE-02",
                   "ct_count": 1, "ct_uris": ["s3://imaging/v006-ct"]}),
        ]
    );
}

#[test]
fn test_lookup_alone_keeps_unmatched_documents() {
    let engine = trial_engine();
    let p = pipeline(json!({
        "collection": "visits",
        "pipeline": [
            {"$lookup": {"from": "participants", "localField": "participant_id",
                         "foreignField": "participant_id", "as": "p"}},
            {"$match": {"visit_id": "V006"}}
        ]
    }));
    let out = engine.run(&p).unwrap();
    assert_eq!(out.documents.len(), 1);
    assert_eq!(as_json(&out.documents)[0]["p"], json!([]));
}

#[test]
fn test_lookup_unwind_equals_field_merge() {
    let engine = trial_engine();
    let p = pipeline(json!({
        "collection": "visits",
        "pipeline": [
            {"$lookup": {"from": "participants", "localField": "participant_id",
                         "foreignField": "participant_id", "as": "p"}},
            {"$unwind": "$p"},
            {"$project": {"_id": 0, "visit_id": 1, "arm": "$p.arm"}}
        ]
    }));
    let out = as_json(&engine.run(&p).unwrap().documents);

    let arms: std::collections::HashMap<String, String> = test_data::participants()
        .iter()
        .map(|d| {
            (
                d.get("participant_id").and_then(|v| v.as_str()).unwrap().to_string(),
                d.get("arm").and_then(|v| v.as_str()).unwrap().to_string(),
            )
        })
        .collect();
    let merged: Vec<_> = test_data::visits()
        .iter()
        .filter_map(|v| {
            let pid = v.get("participant_id")?.as_str()?;
            let arm = arms.get(pid)?;
            Some(json!({"visit_id": v.get("visit_id")?.as_str()?, "arm": arm}))
        })
        .collect();
    assert_eq!(out, merged);
}

#[test]
fn test_count_and_skip() {
    let engine = trial_engine();
    let p = pipeline(json!({
        "collection": "participants",
        "pipeline": [
            {"$sort": {"age": -1}},
            {"$skip": 2},
            {"$count": "remaining"}
        ]
    }));
    let out = engine.run(&p).unwrap();
    assert_eq!(as_json(&out.documents), vec![json!({"remaining": 5})]);
}

#[test]
fn test_phrases_required_narrows_text_matches() {
    let engine = trial_engine();
    let p = pipeline(json!({
        "collection": "clinical_notes",
        "pipeline": [
            {"$match": {"$text": {"$search": "\"chest discomfort\" fatigue"}}},
            {"$project": {"_id": 1}}
        ]
    }));

    let ids = |cfg: &EngineConfig| -> Vec<serde_json::Value> {
        as_json(&engine.run_with(&p, cfg).unwrap().documents)
            .into_iter()
            .map(|d| d["_id"].clone())
            .collect()
    };

    assert_eq!(
        ids(&EngineConfig::default()),
        vec![json!("n1"), json!("n2"), json!("n6"), json!("n7"), json!("n8")]
    );
    let strict = EngineConfig {
        text_phrases_required: true,
        ..Default::default()
    };
    assert_eq!(ids(&strict), vec![json!("n2"), json!("n6"), json!("n8")]);
}

#[test]
fn test_division_by_zero_reports_stage() {
    let engine = trial_engine();
    let p = pipeline(json!({
        "collection": "participants",
        "pipeline": [
            {"$limit": 3},
            {"$project": {"ratio": {"$divide": ["$age", 0]}}}
        ]
    }));
    let err = engine.run(&p).unwrap_err();
    assert_eq!(err.stage_index(), Some(1));
    assert!(matches!(err.op_error(), Some(OpError::DivisionByZero { .. })));
}

#[test]
fn test_size_of_scalar_is_a_type_mismatch() {
    let engine = trial_engine();
    let p = pipeline(json!({
        "collection": "participants",
        "pipeline": [
            {"$limit": 100},
            {"$addFields": {"n": {"$size": "$age"}}}
        ]
    }));
    let err = engine.run(&p).unwrap_err();
    assert_eq!(err.stage_index(), Some(1));
    assert!(matches!(err.op_error(), Some(OpError::TypeMismatch { .. })));
}

#[test]
fn test_unknown_lookup_collection() {
    let engine = trial_engine();
    let p = pipeline(json!({
        "collection": "visits",
        "pipeline": [
            {"$match": {"visit_no": 1}},
            {"$lookup": {"from": "sites", "localField": "site_id",
                         "foreignField": "site_id", "as": "site"}}
        ]
    }));
    let err = engine.run(&p).unwrap_err();
    assert_eq!(err.stage_index(), Some(1));
    assert!(matches!(err.op_error(), Some(OpError::UnknownCollection(name)) if name == "sites"));
}

#[test]
fn test_unknown_source_collection() {
    let engine = trial_engine();
    let p = pipeline(json!({"collection": "adverse_events", "pipeline": [{"$limit": 1}]}));
    assert!(matches!(
        engine.run(&p).unwrap_err(),
        ExecError::UnknownCollection(name) if name == "adverse_events"
    ));
}

#[test]
fn test_unknown_operator_fails_before_running() {
    let engine = trial_engine();
    let p = pipeline(json!({
        "collection": "participants",
        "pipeline": [
            {"$sort": {"age": 1}},
            {"$project": {"x": {"$median": "$age"}}}
        ]
    }));
    let err = engine.validate(&p).unwrap_err();
    assert_eq!(err.stage_index(), Some(1));
    assert!(matches!(err.op_error(), Some(OpError::UnknownOperator(op)) if op == "$median"));
}

#[test]
fn test_text_score_without_text_search() {
    let engine = trial_engine();
    let p = pipeline(json!({
        "collection": "clinical_notes",
        "pipeline": [{"$sort": {"s": {"$meta": "textScore"}}}]
    }));
    assert!(matches!(
        engine.run(&p).unwrap_err(),
        ExecError::Plan(PlanError::Invalid(_))
    ));
}

#[test]
fn test_text_search_requires_an_index() {
    let engine = Engine::new(EngineConfig::default());
    engine.insert_collection("clinical_notes", test_data::clinical_notes());
    let p = pipeline(json!({
        "collection": "clinical_notes",
        "pipeline": [{"$match": {"$text": {"$search": "fatigue"}}}]
    }));
    let err = engine.run(&p).unwrap_err();
    assert_eq!(err.stage_index(), Some(0));
    assert!(matches!(err.op_error(), Some(OpError::TextIndexMissing(_))));
}

#[test]
fn test_concurrent_pipelines_share_the_catalog() {
    let engine = trial_engine();
    let p = pipeline(json!({
        "collection": "clinical_notes",
        "pipeline": [
            {"$match": {"$text": {"$search": "fatigue"}}},
            {"$count": "hits"}
        ]
    }));
    let expected = as_json(&engine.run(&p).unwrap().documents);

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| s.spawn(|| as_json(&engine.run(&p).unwrap().documents)))
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), expected);
        }
    });
}

#[test]
fn test_pipeline_hash_is_stable() {
    let engine = trial_engine();
    let p = pipeline(json!({
        "collection": "participants",
        "pipeline": [{"$match": {"arm": "placebo"}}, {"$sort": {"age": 1}}]
    }));
    let a = engine.run(&p).unwrap().manifest;
    let b = engine.run(&p).unwrap().manifest;
    assert_eq!(a.pipeline_hash, b.pipeline_hash);
    assert_ne!(a.id, b.id);
    assert_eq!(a.output_documents, 2);
    assert_eq!(engine.explain(&p).unwrap().pipeline_hash, a.pipeline_hash);
}
