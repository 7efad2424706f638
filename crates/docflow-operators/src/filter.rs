//! `$match` operator and the query-filter language it evaluates.
//!
//! Supports `{path: literal}` equality, `{path: {$op: v, ...}}` with
//! `$eq $ne $gt $gte $lt $lte $in $nin $exists`, top-level
//! `$and`/`$or`/`$nor`, and `$expr` for aggregation expressions.
//!
//! When a path resolves to an array, equality, range and `$in` conditions
//! match if the array itself or any element matches. Missing never satisfies
//! equality or range conditions. A path broadcast over an array that finds
//! no value in any element is Missing.

use docflow_core::path::{resolve_present, FieldPath};
use docflow_core::record::Record;
use docflow_core::value::{Document, Value};

use crate::expr::eval::compare;
use crate::expr::{CmpOp, Expr, Scope};
use crate::traits::{ExecContext, OpError, Operator, RecordStream};

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Implicit AND of a filter document's entries (also `$and`).
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
    Field { path: FieldPath, cond: Cond },
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cond {
    Compare(CmpOp, Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
    All(Vec<Cond>),
}

impl Filter {
    pub fn compile(doc: &Document) -> Result<Filter, OpError> {
        let mut parts = Vec::with_capacity(doc.len());
        for (key, value) in doc.iter() {
            parts.push(match key {
                "$and" => Filter::And(sub_filters(key, value)?),
                "$or" => Filter::Or(sub_filters(key, value)?),
                "$nor" => Filter::Nor(sub_filters(key, value)?),
                "$expr" => Filter::Expr(Expr::compile(value)?),
                "$text" => {
                    return Err(OpError::Plan(
                        "$text is only allowed in the first $match stage".into(),
                    ))
                }
                op if op.starts_with('$') => return Err(OpError::UnknownOperator(op.to_string())),
                path => Filter::Field {
                    path: FieldPath::parse(path)
                        .map_err(|e| OpError::Plan(format!("$match: {e}")))?,
                    cond: Cond::compile(value)?,
                },
            });
        }
        Ok(match parts.len() {
            1 => parts.pop().unwrap_or(Filter::And(vec![])),
            _ => Filter::And(parts),
        })
    }

    pub fn matches(&self, record: &Record) -> Result<bool, OpError> {
        match self {
            Filter::And(parts) => {
                for part in parts {
                    if !part.matches(record)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Filter::Or(parts) => {
                for part in parts {
                    if part.matches(record)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Filter::Nor(parts) => {
                for part in parts {
                    if part.matches(record)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Filter::Field { path, cond } => {
                Ok(cond.test(resolve_present(&record.doc, path).as_ref()))
            }
            Filter::Expr(expr) => expr.eval_truthy(&mut Scope::new(&record.doc, record.meta)),
        }
    }
}

fn sub_filters(op: &str, value: &Value) -> Result<Vec<Filter>, OpError> {
    let items = value
        .as_array()
        .filter(|items| !items.is_empty())
        .ok_or_else(|| OpError::Plan(format!("{op} expects a non-empty array of filters")))?;
    items
        .iter()
        .map(|item| {
            item.as_document()
                .ok_or_else(|| OpError::Plan(format!("{op} entries must be documents")))
                .and_then(Filter::compile)
        })
        .collect()
}

impl Cond {
    fn compile(value: &Value) -> Result<Cond, OpError> {
        let ops = match value {
            Value::Document(doc) if doc.keys().next().is_some_and(|k| k.starts_with('$')) => doc,
            literal => return Ok(Cond::Compare(CmpOp::Eq, literal.clone())),
        };
        let mut conds = Vec::with_capacity(ops.len());
        for (op, arg) in ops.iter() {
            conds.push(match op {
                "$in" => Cond::In(list(op, arg)?),
                "$nin" => Cond::Nin(list(op, arg)?),
                "$exists" => Cond::Exists(arg.is_truthy()),
                other => match CmpOp::from_name(other) {
                    Some(cmp) => Cond::Compare(cmp, arg.clone()),
                    None => return Err(OpError::UnknownOperator(other.to_string())),
                },
            });
        }
        Ok(match conds.len() {
            1 => conds.pop().unwrap_or(Cond::All(vec![])),
            _ => Cond::All(conds),
        })
    }

    fn test(&self, value: Option<&Value>) -> bool {
        match self {
            Cond::Compare(CmpOp::Ne, v) => !any_element(value, |x| x == v),
            Cond::Compare(op, v) => any_element(value, |x| compare(*op, Some(x), Some(v))),
            Cond::In(values) => any_element(value, |x| values.contains(x)),
            Cond::Nin(values) => !any_element(value, |x| values.contains(x)),
            Cond::Exists(want) => value.is_some() == *want,
            Cond::All(conds) => conds.iter().all(|c| c.test(value)),
        }
    }
}

fn list(op: &str, arg: &Value) -> Result<Vec<Value>, OpError> {
    arg.as_array()
        .map(<[Value]>::to_vec)
        .ok_or_else(|| OpError::Plan(format!("{op} expects an array")))
}

/// Test the value itself, then (for arrays) each element.
fn any_element(value: Option<&Value>, pred: impl Fn(&Value) -> bool) -> bool {
    match value {
        None => false,
        Some(v) if pred(v) => true,
        Some(Value::Array(items)) => items.iter().any(|x| pred(x)),
        Some(_) => false,
    }
}

/// Streaming `$match`.
#[derive(Debug)]
pub struct MatchOp {
    filter: Filter,
}

impl MatchOp {
    pub fn new(spec: &Document) -> Result<Self, OpError> {
        Ok(Self {
            filter: Filter::compile(spec)?,
        })
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }
}

impl Operator for MatchOp {
    fn name(&self) -> &'static str {
        "$match"
    }

    fn execute<'a>(
        &'a self,
        input: RecordStream<'a>,
        _ctx: ExecContext<'a>,
    ) -> Result<RecordStream<'a>, OpError> {
        Ok(Box::new(input.filter_map(move |item| match item {
            Ok(record) => match self.filter.matches(&record) {
                Ok(true) => Some(Ok(record)),
                Ok(false) => None,
                Err(e) => Some(Err(e)),
            },
            Err(e) => Some(Err(e)),
        })))
    }
}
