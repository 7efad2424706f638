//! `$lookup` as a hash join.
//!
//! The foreign collection is indexed once per execution, keyed by the
//! fingerprint of its `foreignField` value; every local record then costs one
//! probe per key. A foreign array value is indexed under the whole array and
//! under each element, and a local array probes with itself and with each
//! element, so either side may hold a list of keys.
//!
//! The operator never drops a local record: with no match the `as` field is
//! an empty array. Matches are attached in foreign collection order, each
//! foreign document at most once.

use std::collections::HashMap;
use std::sync::Arc;

use docflow_core::collection::Collection;
use docflow_core::dag::LookupSpec;
use docflow_core::hash::Hash256;
use docflow_core::record::Record;
use docflow_core::value::Value;

use crate::plan::OpPlan;
use crate::traits::{ExecContext, OpError, Operator, RecordStream};

#[derive(Debug)]
pub struct LookupOp {
    spec: LookupSpec,
}

/// Positions of foreign documents, by key fingerprint.
struct ForeignIndex {
    collection: Arc<Collection>,
    by_key: HashMap<Hash256, Vec<usize>>,
}

impl ForeignIndex {
    fn build(collection: Arc<Collection>, spec: &LookupSpec) -> Self {
        let mut by_key: HashMap<Hash256, Vec<usize>> = HashMap::new();
        for (pos, doc) in collection.docs().iter().enumerate() {
            let Some(value) = doc.resolve(&spec.foreign_field) else {
                continue;
            };
            for key in keys(&value) {
                let slot = by_key.entry(key).or_default();
                if slot.last() != Some(&pos) {
                    slot.push(pos);
                }
            }
        }
        Self { collection, by_key }
    }

    fn probe(&self, local: &Value) -> Value {
        let mut hits: Vec<usize> = keys(local)
            .into_iter()
            .filter_map(|k| self.by_key.get(&k))
            .flatten()
            .copied()
            .collect();
        hits.sort_unstable();
        hits.dedup();
        let docs = self.collection.docs();
        Value::Array(hits.into_iter().map(|i| Value::Document(docs[i].clone())).collect())
    }
}

fn keys(value: &Value) -> Vec<Hash256> {
    let mut out = vec![value.fingerprint()];
    if let Value::Array(items) = value {
        out.extend(items.iter().map(Value::fingerprint));
    }
    out
}

impl LookupOp {
    pub fn new(spec: LookupSpec) -> Result<Self, OpError> {
        if spec.from.is_empty() {
            return Err(OpError::Plan("$lookup requires a 'from' collection".into()));
        }
        Ok(Self { spec })
    }
}

impl Operator for LookupOp {
    fn name(&self) -> &'static str {
        "$lookup"
    }

    fn plan(&self) -> OpPlan {
        OpPlan::new(self.name(), false)
            .with_reads(vec![self.spec.from.clone()])
            .with_detail(format!(
                "{} = {}.{} as {}",
                self.spec.local_field, self.spec.from, self.spec.foreign_field, self.spec.as_field
            ))
    }

    fn execute<'a>(
        &'a self,
        input: RecordStream<'a>,
        ctx: ExecContext<'a>,
    ) -> Result<RecordStream<'a>, OpError> {
        let index = ForeignIndex::build(ctx.collection(&self.spec.from)?, &self.spec);
        Ok(Box::new(input.map(move |item| {
            let record = item?;
            let matched = match record.doc.resolve(&self.spec.local_field) {
                Some(local) => index.probe(&local),
                None => Value::Array(vec![]),
            };
            let Record { doc, meta } = record;
            Ok(Record {
                doc: doc.with_path(&self.spec.as_field, matched),
                meta,
            })
        })))
    }
}
