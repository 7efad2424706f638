//! `$unwind`: one output record per element of an array field.
//!
//! Empty arrays, null and missing values produce nothing unless
//! `preserveNullAndEmptyArrays` is set, in which case the record passes
//! through once (an empty array field is removed). A present non-array value
//! behaves like a one-element array.
//!
//! The path is followed through nested documents only. A path that crosses
//! an array (`a.tags` with `a` an array) is treated as missing.

use docflow_core::dag::UnwindSpec;
use docflow_core::path::resolve_direct;
use docflow_core::record::Record;
use docflow_core::value::{Document, Value};

use crate::plan::OpPlan;
use crate::traits::{ExecContext, OpError, Operator, RecordStream};

#[derive(Debug)]
pub struct UnwindOp {
    spec: UnwindSpec,
}

impl UnwindOp {
    pub fn new(spec: UnwindSpec) -> Self {
        Self { spec }
    }

    fn unwind(&self, record: Record) -> Vec<Record> {
        let Record { doc, meta } = record;
        let index_field = self.spec.include_array_index.as_ref();
        let with_index = |doc: Document, index: Value| match index_field {
            Some(field) => doc.with_path(field, index),
            None => doc,
        };

        match resolve_direct(&doc, &self.spec.path) {
            Some(Value::Array(items)) if !items.is_empty() => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| Record {
                    doc: with_index(doc.clone().with_path(&self.spec.path, item), Value::from(i)),
                    meta,
                })
                .collect(),
            Some(Value::Array(_)) if self.spec.preserve_null_and_empty_arrays => vec![Record {
                doc: with_index(doc.without_path(&self.spec.path), Value::Null),
                meta,
            }],
            Some(Value::Array(_)) => vec![],
            Some(Value::Null) | None if !self.spec.preserve_null_and_empty_arrays => vec![],
            Some(Value::Null) | None => vec![Record {
                doc: with_index(doc, Value::Null),
                meta,
            }],
            Some(_) => vec![Record {
                doc: with_index(doc, Value::Null),
                meta,
            }],
        }
    }
}

impl Operator for UnwindOp {
    fn name(&self) -> &'static str {
        "$unwind"
    }

    fn plan(&self) -> OpPlan {
        let mut detail = self.spec.path.to_string();
        if self.spec.preserve_null_and_empty_arrays {
            detail.push_str(" (preserve null and empty)");
        }
        OpPlan::new(self.name(), false).with_detail(detail)
    }

    fn execute<'a>(
        &'a self,
        input: RecordStream<'a>,
        _ctx: ExecContext<'a>,
    ) -> Result<RecordStream<'a>, OpError> {
        Ok(Box::new(input.flat_map(move |item| match item {
            Ok(record) => self.unwind(record).into_iter().map(Ok).collect(),
            Err(e) => vec![Err(e)],
        })))
    }
}
