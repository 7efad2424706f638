//! `$sort`: materialize the stream, then stable-sort it.
//!
//! Keys compare with the cross-type total order (Missing sorts as Null).
//! Equal keys keep their input order. A `{$meta: "textScore"}` key orders by
//! relevance, highest first; records without a score sort last.

use std::cmp::Ordering;

use docflow_core::dag::{SortDirection, SortKey};
use docflow_core::record::Record;
use docflow_core::value::Value;

use crate::plan::OpPlan;
use crate::traits::{drain, ExecContext, OpError, Operator, RecordStream};

#[derive(Debug)]
pub struct SortOp {
    keys: Vec<SortKey>,
}

impl SortOp {
    pub fn new(keys: Vec<SortKey>) -> Result<Self, OpError> {
        if keys.is_empty() {
            return Err(OpError::Plan("$sort requires at least one key".into()));
        }
        Ok(Self { keys })
    }

    fn compare(&self, a: &Record, b: &Record) -> Ordering {
        for key in &self.keys {
            let ord = match key.direction {
                SortDirection::Ascending => field(a, key).total_cmp(&field(b, key)),
                SortDirection::Descending => field(b, key).total_cmp(&field(a, key)),
                SortDirection::TextScore => score_desc(a.meta.text_score, b.meta.text_score),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    pub fn sort(&self, records: &mut [Record]) {
        records.sort_by(|a, b| self.compare(a, b));
    }
}

fn field(record: &Record, key: &SortKey) -> Value {
    record.doc.resolve(&key.path).unwrap_or(Value::Null)
}

fn score_desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl Operator for SortOp {
    fn name(&self) -> &'static str {
        "$sort"
    }

    fn is_blocking(&self) -> bool {
        true
    }

    fn plan(&self) -> OpPlan {
        let keys: Vec<String> = self
            .keys
            .iter()
            .map(|k| match k.direction {
                SortDirection::Ascending => format!("{} asc", k.path),
                SortDirection::Descending => format!("{} desc", k.path),
                SortDirection::TextScore => format!("{} textScore", k.path),
            })
            .collect();
        OpPlan::new(self.name(), true).with_detail(keys.join(", "))
    }

    fn execute<'a>(
        &'a self,
        input: RecordStream<'a>,
        ctx: ExecContext<'a>,
    ) -> Result<RecordStream<'a>, OpError> {
        let mut records = drain(input, "$sort", ctx.config.max_stage_docs)?;
        self.sort(&mut records);
        Ok(Box::new(records.into_iter().map(Ok)))
    }
}
