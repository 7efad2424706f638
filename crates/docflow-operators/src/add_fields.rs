//! `$addFields`: add or overwrite fields, keeping everything else.
//!
//! Every expression is evaluated against the incoming document, so a field
//! added earlier in the same stage is not visible to later ones. A dotted
//! path that crosses an array sets the field on every element.

use docflow_core::path::FieldPath;
use docflow_core::record::Record;
use docflow_core::value::Document;

use crate::expr::{Expr, Scope};
use crate::plan::OpPlan;
use crate::traits::{ExecContext, OpError, Operator, RecordStream};

#[derive(Debug)]
pub struct AddFieldsOp {
    fields: Vec<(FieldPath, Expr)>,
}

impl AddFieldsOp {
    pub fn new(spec: &Document) -> Result<Self, OpError> {
        if spec.is_empty() {
            return Err(OpError::Plan("$addFields requires at least one field".into()));
        }
        let fields = spec
            .iter()
            .map(|(key, value)| {
                let path =
                    FieldPath::parse(key).map_err(|e| OpError::Plan(format!("$addFields: {e}")))?;
                Ok((path, Expr::compile(value)?))
            })
            .collect::<Result<_, OpError>>()?;
        Ok(Self { fields })
    }
}

impl Operator for AddFieldsOp {
    fn name(&self) -> &'static str {
        "$addFields"
    }

    fn plan(&self) -> OpPlan {
        let names: Vec<String> = self.fields.iter().map(|(p, _)| p.to_string()).collect();
        OpPlan::new(self.name(), false).with_detail(names.join(", "))
    }

    fn execute<'a>(
        &'a self,
        input: RecordStream<'a>,
        _ctx: ExecContext<'a>,
    ) -> Result<RecordStream<'a>, OpError> {
        Ok(Box::new(input.map(move |item| {
            let record = item?;
            let mut computed = Vec::with_capacity(self.fields.len());
            {
                let mut scope = Scope::new(&record.doc, record.meta);
                for (path, expr) in &self.fields {
                    if let Some(v) = expr.eval(&mut scope)? {
                        computed.push((path, v));
                    }
                }
            }
            let Record { mut doc, meta } = record;
            for (path, value) in computed {
                doc = doc.with_path(path, value);
            }
            Ok(Record { doc, meta })
        })))
    }
}
