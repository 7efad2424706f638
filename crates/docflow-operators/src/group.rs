//! `$group`: hash aggregation with per-group accumulator state.
//!
//! Groups live in a table indexed by the fingerprint of their key. Output
//! order is the order in which each key was first seen. Every output document
//! is `{_id: key, <field>: <accumulated>, ...}`; record metadata such as the
//! text score does not survive grouping.

use std::collections::{HashMap, HashSet};

use docflow_core::dag::GroupSpec;
use docflow_core::hash::Hash256;
use docflow_core::record::Record;
use docflow_core::value::{Document, Value};

use crate::expr::{Expr, Scope};
use crate::plan::OpPlan;
use crate::traits::{check_cap, ExecContext, OpError, Operator, RecordStream};

#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    Sum(Expr),
    Avg(Expr),
    Min(Expr),
    Max(Expr),
    First(Expr),
    Last(Expr),
    Push(Expr),
    AddToSet(Expr),
    Count,
}

impl Accumulator {
    pub fn compile(spec: &Value) -> Result<Accumulator, OpError> {
        let doc = spec
            .as_document()
            .filter(|d| d.len() == 1)
            .ok_or_else(|| {
                OpError::Plan(format!("accumulator must be {{$op: expr}}, got {spec}"))
            })?;
        let Some((op, arg)) = doc.iter().next() else {
            return Err(OpError::Plan("empty accumulator".into()));
        };
        let expr = || Expr::compile(arg);
        Ok(match op {
            "$sum" => Accumulator::Sum(expr()?),
            "$avg" => Accumulator::Avg(expr()?),
            "$min" => Accumulator::Min(expr()?),
            "$max" => Accumulator::Max(expr()?),
            "$first" => Accumulator::First(expr()?),
            "$last" => Accumulator::Last(expr()?),
            "$push" => Accumulator::Push(expr()?),
            "$addToSet" => Accumulator::AddToSet(expr()?),
            "$count" => match arg {
                Value::Document(d) if d.is_empty() => Accumulator::Count,
                _ => return Err(OpError::Plan("$count accumulator takes {}".into())),
            },
            other => return Err(OpError::UnknownOperator(other.to_string())),
        })
    }

    fn input(&self) -> Option<&Expr> {
        match self {
            Accumulator::Sum(e)
            | Accumulator::Avg(e)
            | Accumulator::Min(e)
            | Accumulator::Max(e)
            | Accumulator::First(e)
            | Accumulator::Last(e)
            | Accumulator::Push(e)
            | Accumulator::AddToSet(e) => Some(e),
            Accumulator::Count => None,
        }
    }

    fn init(&self) -> AccState {
        match self {
            Accumulator::Sum(_) => AccState::Sum(0.0),
            Accumulator::Avg(_) => AccState::Avg { sum: 0.0, count: 0 },
            Accumulator::Min(_) | Accumulator::Max(_) => AccState::Extremum(None),
            Accumulator::First(_) => AccState::First(None),
            Accumulator::Last(_) => AccState::Last(None),
            Accumulator::Push(_) => AccState::Push(Vec::new()),
            Accumulator::AddToSet(_) => AccState::Set {
                seen: HashSet::new(),
                items: Vec::new(),
            },
            Accumulator::Count => AccState::Count(0),
        }
    }
}

/// Running state of one accumulator for one group.
#[derive(Debug)]
enum AccState {
    Sum(f64),
    /// Only present numeric inputs count toward the denominator.
    Avg { sum: f64, count: u64 },
    Extremum(Option<Value>),
    First(Option<Value>),
    Last(Option<Value>),
    Push(Vec<Value>),
    Set { seen: HashSet<Hash256>, items: Vec<Value> },
    Count(u64),
}

impl AccState {
    fn fold(&mut self, acc: &Accumulator, input: Option<Value>) {
        match (self, acc) {
            (AccState::Sum(total), _) => {
                if let Some(Value::Number(n)) = input {
                    *total += n;
                }
            }
            (AccState::Avg { sum, count }, _) => {
                if let Some(Value::Number(n)) = input {
                    *sum += n;
                    *count += 1;
                }
            }
            (AccState::Extremum(current), acc) => {
                let Some(v) = input.filter(|v| !v.is_null()) else {
                    return;
                };
                let replace = match current {
                    None => true,
                    Some(cur) => match acc {
                        Accumulator::Min(_) => v.total_cmp(cur).is_lt(),
                        _ => v.total_cmp(cur).is_gt(),
                    },
                };
                if replace {
                    *current = Some(v);
                }
            }
            (AccState::First(current), _) => {
                if current.is_none() {
                    *current = Some(input.unwrap_or(Value::Null));
                }
            }
            (AccState::Last(current), _) => *current = Some(input.unwrap_or(Value::Null)),
            (AccState::Push(items), _) => items.extend(input),
            (AccState::Set { seen, items }, _) => {
                if let Some(v) = input {
                    if seen.insert(v.fingerprint()) {
                        items.push(v);
                    }
                }
            }
            (AccState::Count(n), _) => *n += 1,
        }
    }

    fn finish(self) -> Value {
        match self {
            AccState::Sum(total) => Value::Number(total),
            AccState::Avg { count: 0, .. } => Value::Null,
            AccState::Avg { sum, count } => Value::Number(sum / count as f64),
            AccState::Extremum(v) | AccState::First(v) | AccState::Last(v) => {
                v.unwrap_or(Value::Null)
            }
            AccState::Push(items) | AccState::Set { items, .. } => Value::Array(items),
            AccState::Count(n) => Value::from(n as usize),
        }
    }
}

#[derive(Debug)]
pub struct GroupOp {
    key: Expr,
    accumulators: Vec<(String, Accumulator)>,
}

impl GroupOp {
    pub fn new(spec: &GroupSpec) -> Result<Self, OpError> {
        let key = Expr::compile(&spec.id)?;
        let mut accumulators = Vec::with_capacity(spec.accumulators.len());
        for (name, acc) in &spec.accumulators {
            if name == "_id" || name.is_empty() || name.contains('.') || name.starts_with('$') {
                return Err(OpError::Plan(format!("$group: invalid output field '{name}'")));
            }
            accumulators.push((name.clone(), Accumulator::compile(acc)?));
        }
        Ok(Self { key, accumulators })
    }

    fn aggregate(
        &self,
        input: RecordStream<'_>,
        cap: Option<usize>,
    ) -> Result<Vec<Record>, OpError> {
        let mut index: HashMap<Hash256, usize> = HashMap::new();
        let mut groups: Vec<(Value, Vec<AccState>)> = Vec::new();

        for item in input {
            let record = item?;
            let mut scope = Scope::new(&record.doc, record.meta);
            let key = self.key.eval(&mut scope)?.unwrap_or(Value::Null);

            let fingerprint = key.fingerprint();
            let slot = match index.get(&fingerprint) {
                Some(&slot) => slot,
                None => {
                    index.insert(fingerprint, groups.len());
                    let states = self.accumulators.iter().map(|(_, a)| a.init()).collect();
                    groups.push((key, states));
                    check_cap("$group", groups.len(), cap)?;
                    groups.len() - 1
                }
            };

            let states = &mut groups[slot].1;
            for ((_, acc), state) in self.accumulators.iter().zip(states.iter_mut()) {
                let input = match acc.input() {
                    Some(expr) => expr.eval(&mut scope)?,
                    None => None,
                };
                state.fold(acc, input);
            }
        }

        Ok(groups
            .into_iter()
            .map(|(key, states)| {
                let mut doc = Document::with_capacity(states.len() + 1);
                doc.insert("_id", key);
                for ((name, _), state) in self.accumulators.iter().zip(states) {
                    doc.insert(name.clone(), state.finish());
                }
                Record::new(doc)
            })
            .collect())
    }
}

impl Operator for GroupOp {
    fn name(&self) -> &'static str {
        "$group"
    }

    fn is_blocking(&self) -> bool {
        true
    }

    fn plan(&self) -> OpPlan {
        let names: Vec<&str> = self.accumulators.iter().map(|(n, _)| n.as_str()).collect();
        OpPlan::new(self.name(), true)
            .with_detail(format!("accumulators: {}", names.join(", ")))
    }

    fn execute<'a>(
        &'a self,
        input: RecordStream<'a>,
        ctx: ExecContext<'a>,
    ) -> Result<RecordStream<'a>, OpError> {
        let groups = self.aggregate(input, ctx.config.max_stage_docs)?;
        Ok(Box::new(groups.into_iter().map(Ok)))
    }
}
