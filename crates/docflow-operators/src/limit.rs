//! `$limit` and `$skip`.
//!
//! Both are lazy: `$limit` stops pulling from upstream once it has emitted N
//! records, so it never causes upstream work beyond what it returns.

use crate::plan::OpPlan;
use crate::traits::{ExecContext, OpError, Operator, RecordStream};

#[derive(Debug)]
pub struct LimitOp {
    n: u64,
}

impl LimitOp {
    pub fn new(n: u64) -> Self {
        Self { n }
    }
}

impl Operator for LimitOp {
    fn name(&self) -> &'static str {
        "$limit"
    }

    fn plan(&self) -> OpPlan {
        OpPlan::new(self.name(), false).with_detail(self.n.to_string())
    }

    fn execute<'a>(
        &'a self,
        input: RecordStream<'a>,
        _ctx: ExecContext<'a>,
    ) -> Result<RecordStream<'a>, OpError> {
        let n = usize::try_from(self.n).unwrap_or(usize::MAX);
        Ok(Box::new(input.take(n)))
    }
}

#[derive(Debug)]
pub struct SkipOp {
    n: u64,
}

impl SkipOp {
    pub fn new(n: u64) -> Self {
        Self { n }
    }
}

impl Operator for SkipOp {
    fn name(&self) -> &'static str {
        "$skip"
    }

    fn plan(&self) -> OpPlan {
        OpPlan::new(self.name(), false).with_detail(self.n.to_string())
    }

    fn execute<'a>(
        &'a self,
        input: RecordStream<'a>,
        _ctx: ExecContext<'a>,
    ) -> Result<RecordStream<'a>, OpError> {
        // Errors are never skipped.
        let mut remaining = self.n;
        Ok(Box::new(input.filter(move |item| {
            if item.is_ok() && remaining > 0 {
                remaining -= 1;
                false
            } else {
                true
            }
        })))
    }
}
