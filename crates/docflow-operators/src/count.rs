//! `$count`: a single `{field: n}` document, or nothing for an empty stream.

use docflow_core::record::Record;
use docflow_core::value::{Document, Value};

use crate::plan::OpPlan;
use crate::traits::{ExecContext, OpError, Operator, RecordStream};

#[derive(Debug)]
pub struct CountOp {
    field: String,
}

impl CountOp {
    pub fn new(field: impl Into<String>) -> Result<Self, OpError> {
        let field = field.into();
        if field.is_empty() || field.starts_with('$') || field.contains('.') {
            return Err(OpError::Plan(format!(
                "$count field '{field}' must be a non-empty name without '$' or '.'"
            )));
        }
        Ok(Self { field })
    }
}

impl Operator for CountOp {
    fn name(&self) -> &'static str {
        "$count"
    }

    fn is_blocking(&self) -> bool {
        true
    }

    fn plan(&self) -> OpPlan {
        OpPlan::new(self.name(), true).with_detail(self.field.clone())
    }

    fn execute<'a>(
        &'a self,
        input: RecordStream<'a>,
        _ctx: ExecContext<'a>,
    ) -> Result<RecordStream<'a>, OpError> {
        let mut n = 0usize;
        for item in input {
            item?;
            n += 1;
        }
        if n == 0 {
            return Ok(Box::new(std::iter::empty()));
        }
        let mut doc = Document::with_capacity(1);
        doc.insert(self.field.clone(), Value::from(n));
        Ok(Box::new(std::iter::once(Ok(Record::new(doc)))))
    }
}
