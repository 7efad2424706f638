//! `$project`: reshape each document.
//!
//! Inclusion mode (`field: 1` and/or computed fields): the output holds `_id`
//! (unless `_id: 0`), then every listed field in the order given. A dotted
//! include that crosses an array keeps the array and projects each document
//! element; scalar elements are dropped. Exclusion mode
//! (only `field: 0` entries): the listed paths are removed and everything
//! else is kept.

use docflow_core::path::FieldPath;
use docflow_core::record::Record;
use docflow_core::value::{Document, Value};

use crate::expr::{Expr, Scope};
use crate::plan::OpPlan;
use crate::traits::{ExecContext, OpError, Operator, RecordStream};

const ID: &str = "_id";

#[derive(Debug, Clone, PartialEq)]
enum Projection {
    Include,
    Exclude,
    Compute(Expr),
}

#[derive(Debug)]
pub struct ProjectOp {
    fields: Vec<(FieldPath, Projection)>,
    exclusion: bool,
    keep_id: bool,
}

impl ProjectOp {
    pub fn new(spec: &Document) -> Result<Self, OpError> {
        if spec.is_empty() {
            return Err(OpError::Plan("$project requires at least one field".into()));
        }
        let mut fields = Vec::with_capacity(spec.len());
        for (key, value) in spec.iter() {
            let path =
                FieldPath::parse(key).map_err(|e| OpError::Plan(format!("$project: {e}")))?;
            let projection = match value {
                Value::Bool(b) => flag(*b),
                Value::Number(n) => flag(*n != 0.0),
                other => Projection::Compute(Expr::compile(other)?),
            };
            fields.push((path, projection));
        }

        let includes = fields
            .iter()
            .any(|(p, pr)| !matches!(pr, Projection::Exclude) && !is_id(p));
        let excludes = fields
            .iter()
            .any(|(p, pr)| matches!(pr, Projection::Exclude) && !is_id(p));
        if includes && excludes {
            return Err(OpError::Plan(
                "$project cannot mix inclusion and exclusion (except for _id)".into(),
            ));
        }
        let id_excluded = fields
            .iter()
            .any(|(p, pr)| is_id(p) && matches!(pr, Projection::Exclude));
        let exclusion = fields
            .iter()
            .all(|(_, pr)| matches!(pr, Projection::Exclude));

        Ok(Self {
            fields,
            exclusion,
            keep_id: !id_excluded,
        })
    }

    fn project(&self, record: &Record) -> Result<Document, OpError> {
        if self.exclusion {
            let mut out = record.doc.clone();
            for (path, projection) in &self.fields {
                if matches!(projection, Projection::Exclude) {
                    out = out.without_path(path);
                }
            }
            return Ok(out);
        }

        let mut out = Document::new();
        if self.keep_id && !self.fields.iter().any(|(p, _)| is_id(p)) {
            if let Some(id) = record.doc.get(ID) {
                out.insert(ID, id.clone());
            }
        }
        let mut scope = Scope::new(&record.doc, record.meta);
        for (path, projection) in &self.fields {
            match projection {
                Projection::Exclude => {}
                Projection::Include => include_into(&mut out, &record.doc, path.segments()),
                Projection::Compute(expr) => {
                    if let Some(v) = expr.eval(&mut scope)? {
                        out = out.with_path(path, v);
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Copy the value at `segments` from `src` into `out`, merging with what
/// earlier includes already put there.
fn include_into(out: &mut Document, src: &Document, segments: &[String]) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    let Some(value) = src.get(head) else {
        return;
    };
    if rest.is_empty() {
        out.insert(head.as_str(), value.clone());
        return;
    }
    let prev = out.get(head).cloned();
    if let Some(v) = include_nested(value, rest, prev) {
        out.insert(head.as_str(), v);
    }
}

fn include_nested(value: &Value, rest: &[String], prev: Option<Value>) -> Option<Value> {
    match value {
        Value::Document(src) => {
            let mut child = match prev {
                Some(Value::Document(d)) => d,
                _ => Document::new(),
            };
            include_into(&mut child, src, rest);
            Some(Value::Document(child))
        }
        Value::Array(items) => {
            // Every include over the same array keeps the same elements, so
            // earlier results line up by output position.
            let mut prev_items = match prev {
                Some(Value::Array(p)) => p.into_iter(),
                _ => Vec::new().into_iter(),
            };
            let projected = items
                .iter()
                .filter(|item| matches!(item, Value::Document(_) | Value::Array(_)))
                .filter_map(|item| include_nested(item, rest, prev_items.next()))
                .collect();
            Some(Value::Array(projected))
        }
        _ => None,
    }
}

fn is_id(path: &FieldPath) -> bool {
    path.is_top_level() && path.head() == ID
}

fn flag(include: bool) -> Projection {
    if include {
        Projection::Include
    } else {
        Projection::Exclude
    }
}

impl Operator for ProjectOp {
    fn name(&self) -> &'static str {
        "$project"
    }

    fn plan(&self) -> OpPlan {
        let mode = if self.exclusion { "exclude" } else { "include" };
        OpPlan::new(self.name(), false)
            .with_detail(format!("{mode} {} field(s)", self.fields.len()))
    }

    fn execute<'a>(
        &'a self,
        input: RecordStream<'a>,
        _ctx: ExecContext<'a>,
    ) -> Result<RecordStream<'a>, OpError> {
        Ok(Box::new(input.map(move |item| {
            let record = item?;
            let doc = self.project(&record)?;
            Ok(record.map_doc(doc))
        })))
    }
}
