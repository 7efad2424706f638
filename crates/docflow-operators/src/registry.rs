//! Stage descriptor → operator.

use docflow_core::dag::StageSpec;

use crate::add_fields::AddFieldsOp;
use crate::count::CountOp;
use crate::filter::MatchOp;
use crate::group::GroupOp;
use crate::join::LookupOp;
use crate::limit::{LimitOp, SkipOp};
use crate::project::ProjectOp;
use crate::sort::SortOp;
use crate::traits::{OpError, Operator};
use crate::unwind::UnwindOp;

/// Compile one stage descriptor. Expressions, filters and accumulators are
/// compiled here, so an unknown operator fails before any document is read.
pub fn compile_stage(stage: &StageSpec) -> Result<Box<dyn Operator>, OpError> {
    Ok(match stage {
        StageSpec::Match(filter) => Box::new(MatchOp::new(filter)?),
        StageSpec::Project(spec) => Box::new(ProjectOp::new(spec)?),
        StageSpec::AddFields(spec) => Box::new(AddFieldsOp::new(spec)?),
        StageSpec::Group(spec) => Box::new(GroupOp::new(spec)?),
        StageSpec::Sort(keys) => Box::new(SortOp::new(keys.clone())?),
        StageSpec::Limit(n) => Box::new(LimitOp::new(*n)),
        StageSpec::Skip(n) => Box::new(SkipOp::new(*n)),
        StageSpec::Lookup(spec) => Box::new(LookupOp::new(spec.clone())?),
        StageSpec::Unwind(spec) => Box::new(UnwindOp::new(spec.clone())),
        StageSpec::Count(field) => Box::new(CountOp::new(field.as_str())?),
    })
}
