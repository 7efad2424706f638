//! Helpers shared by operator unit tests.

use std::collections::HashMap;
use std::sync::Arc;

use docflow_core::collection::Collection;
use docflow_core::config::EngineConfig;
use docflow_core::record::Record;
use docflow_core::value::Document;

use crate::traits::{CollectionProvider, ExecContext, OpError, Operator, RecordStream};

pub(crate) fn doc(v: serde_json::Value) -> Document {
    Document::try_from(v).unwrap()
}

pub(crate) fn docs(items: Vec<serde_json::Value>) -> Vec<Document> {
    items.into_iter().map(doc).collect()
}

pub(crate) fn catalog(collections: Vec<(&str, Vec<serde_json::Value>)>) -> HashMap<String, Arc<Collection>> {
    collections
        .into_iter()
        .map(|(name, items)| (name.to_string(), Arc::new(Collection::new(name, docs(items)))))
        .collect()
}

pub(crate) fn run_records(
    op: &dyn Operator,
    input: Vec<Record>,
    collections: &dyn CollectionProvider,
    config: &EngineConfig,
) -> Result<Vec<Record>, OpError> {
    let input: RecordStream<'_> = Box::new(input.into_iter().map(Ok));
    op.execute(input, ExecContext::new(collections, config))?
        .collect()
}

pub(crate) fn run(op: &dyn Operator, input: Vec<serde_json::Value>) -> Result<Vec<Document>, OpError> {
    let collections = catalog(vec![]);
    let config = EngineConfig::default();
    let input = docs(input).into_iter().map(Record::new).collect();
    Ok(run_records(op, input, &collections, &config)?
        .into_iter()
        .map(Record::into_document)
        .collect())
}
