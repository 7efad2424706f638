//! Pipeline sources: where the first stage's input comes from.
//!
//! A scan yields every document of the collection in order. A text source
//! asks the collection's text index for matches, attaches each hit's score as
//! record metadata, then applies the residual (non-`$text`) part of the
//! originating `$match`.

use docflow_core::dag::Source;
use docflow_core::record::Record;
use docflow_text::TextQuery;

use crate::filter::Filter;
use crate::plan::OpPlan;
use crate::traits::{ExecContext, OpError, RecordStream};

#[derive(Debug)]
pub enum SourceOp {
    Scan {
        collection: String,
    },
    Text {
        collection: String,
        search: String,
        residual: Option<Filter>,
    },
}

impl SourceOp {
    pub fn compile(source: &Source) -> Result<Self, OpError> {
        Ok(match source {
            Source::Scan { collection } => SourceOp::Scan {
                collection: collection.clone(),
            },
            Source::TextSearch {
                collection,
                search,
                residual,
            } => SourceOp::Text {
                collection: collection.clone(),
                search: search.search.clone(),
                residual: residual
                    .as_ref()
                    .filter(|doc| !doc.is_empty())
                    .map(Filter::compile)
                    .transpose()?,
            },
        })
    }

    pub fn collection(&self) -> &str {
        match self {
            SourceOp::Scan { collection } | SourceOp::Text { collection, .. } => collection,
        }
    }

    pub fn plan(&self) -> OpPlan {
        match self {
            SourceOp::Scan { collection } => OpPlan::new("scan", false)
                .with_reads(vec![collection.clone()]),
            SourceOp::Text {
                collection,
                search,
                residual,
            } => {
                let mut detail = format!("$search {search:?}");
                if residual.is_some() {
                    detail.push_str(" + residual filter");
                }
                OpPlan::new("text_search", false)
                    .with_reads(vec![collection.clone()])
                    .with_detail(detail)
            }
        }
    }

    /// Open the source against the snapshot in `ctx`.
    pub fn open<'a>(&'a self, ctx: ExecContext<'a>) -> Result<RecordStream<'a>, OpError> {
        match self {
            SourceOp::Scan { collection } => {
                let collection = ctx.collection(collection)?;
                let docs = collection.docs().to_vec();
                Ok(Box::new(docs.into_iter().map(|doc| Ok(Record::new(doc)))))
            }
            SourceOp::Text {
                collection,
                search,
                residual,
            } => {
                let docs = ctx.collection(collection)?;
                let index = ctx.text_index(collection)?;
                let query = TextQuery::parse(search, index.tokenizer());
                let hits = index.search(&query, ctx.config.text_phrases_required);

                let mut records = Vec::with_capacity(hits.len());
                for hit in hits {
                    let Some(doc) = docs.get(hit.doc) else {
                        return Err(OpError::Exec(format!(
                            "text index for '{collection}' references document {} outside the collection",
                            hit.doc
                        )));
                    };
                    records.push(Record::new(doc.clone()).with_text_score(hit.score));
                }

                let residual = residual.as_ref();
                Ok(Box::new(records.into_iter().filter_map(move |record| {
                    match residual.map(|f| f.matches(&record)) {
                        None | Some(Ok(true)) => Some(Ok(record)),
                        Some(Ok(false)) => None,
                        Some(Err(e)) => Some(Err(e)),
                    }
                })))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use crate::testing::{doc, docs};
    use crate::traits::CollectionProvider;
    use docflow_core::collection::Collection;
    use docflow_core::config::EngineConfig;
    use docflow_core::dag::TextSearchSpec;
    use docflow_core::path::FieldPath;
    use docflow_core::value::Value;
    use docflow_text::{TextIndex, Tokenizer};
    use serde_json::json;

    struct Notes {
        collection: Arc<Collection>,
        index: Arc<TextIndex>,
    }

    impl CollectionProvider for Notes {
        fn collection(&self, name: &str) -> Option<Arc<Collection>> {
            (name == "notes").then(|| self.collection.clone())
        }

        fn text_index(&self, name: &str) -> Option<Arc<TextIndex>> {
            (name == "notes").then(|| self.index.clone())
        }
    }

    fn notes() -> Notes {
        let collection = Arc::new(Collection::new(
            "notes",
            docs(vec![
                json!({"n": 0, "site": "S1", "text": "reports fatigue and nausea"}),
                json!({"n": 1, "site": "S2", "text": "mild chest discomfort"}),
                json!({"n": 2, "site": "S1", "text": "fatigue"}),
            ]),
        ));
        let index = TextIndex::build(
            &collection,
            vec![FieldPath::parse("text").unwrap()],
            Tokenizer::default(),
        );
        Notes {
            collection,
            index: Arc::new(index),
        }
    }

    fn open(source: Source, provider: &dyn CollectionProvider) -> Result<Vec<Record>, OpError> {
        let config = EngineConfig::default();
        let op = SourceOp::compile(&source)?;
        let stream = op.open(ExecContext::new(provider, &config))?;
        stream.collect()
    }

    fn text(search: &str, residual: Option<serde_json::Value>) -> Source {
        Source::TextSearch {
            collection: "notes".into(),
            search: TextSearchSpec {
                search: search.into(),
            },
            residual: residual.map(doc),
        }
    }

    #[test]
    fn scan_yields_collection_order() {
        let provider = notes();
        let out = open(
            Source::Scan {
                collection: "notes".into(),
            },
            &provider,
        )
        .unwrap();
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|r| r.meta.text_score.is_none()));
    }

    #[test]
    fn text_hits_carry_scores() {
        let provider = notes();
        let out = open(text("fatigue nausea", None), &provider).unwrap();
        let ns: Vec<_> = out.iter().map(|r| r.doc.get("n").cloned().unwrap()).collect();
        assert_eq!(ns, vec![Value::from(0), Value::from(2)]);
        let s0 = out[0].meta.text_score.unwrap();
        let s2 = out[1].meta.text_score.unwrap();
        assert!(s0 > s2);
    }

    #[test]
    fn residual_filter_applies() {
        let provider = notes();
        let out = open(text("fatigue", Some(json!({"n": {"$gt": 0}}))), &provider).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].doc.get("n"), Some(&Value::from(2)));
    }

    #[test]
    fn missing_text_index() {
        let plain: HashMap<String, Arc<Collection>> =
            HashMap::from([("notes".to_string(), notes().collection)]);
        let err = open(text("fatigue", None), &plain).unwrap_err();
        assert!(matches!(err, OpError::TextIndexMissing(c) if c == "notes"));
    }

    #[test]
    fn unknown_source_collection() {
        let provider = notes();
        let err = open(
            Source::Scan {
                collection: "nope".into(),
            },
            &provider,
        )
        .unwrap_err();
        assert!(matches!(err, OpError::UnknownCollection(_)));
    }
}
