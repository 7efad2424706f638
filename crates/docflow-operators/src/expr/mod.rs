//! Aggregation expressions.
//!
//! A stage's raw `Value` parameters are compiled once into an `Expr` tree;
//! evaluation (see `eval`) then walks the tree per record. Compilation is
//! where unknown operators, malformed arguments and unbound `$$variables` are
//! reported, so a pipeline fails before it reads a single document.
//!
//! Encoding rules:
//! - `"$a.b"` is a field reference, `"$$name.path"` a variable reference;
//! - a document whose single key starts with `$` is an operator call;
//! - any other document is a template whose values are expressions;
//! - arrays compile element-wise; everything else is a literal.

pub(crate) mod eval;

pub use eval::Scope;

use docflow_core::path::FieldPath;
use docflow_core::value::{Document, Value};

use crate::traits::OpError;

/// Variable bound to the record being evaluated.
pub const ROOT: &str = "ROOT";
/// Alias of `ROOT`; the current document never changes within a stage.
pub const CURRENT: &str = "CURRENT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CmpOp {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "$eq" => CmpOp::Eq,
            "$ne" => CmpOp::Ne,
            "$gt" => CmpOp::Gt,
            "$gte" => CmpOp::Gte,
            "$lt" => CmpOp::Lt,
            "$lte" => CmpOp::Lte,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            CmpOp::Eq => "$eq",
            CmpOp::Ne => "$ne",
            CmpOp::Gt => "$gt",
            CmpOp::Gte => "$gte",
            CmpOp::Lt => "$lt",
            CmpOp::Lte => "$lte",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Mod,
}

impl ArithOp {
    pub fn name(self) -> &'static str {
        match self {
            ArithOp::Add => "$add",
            ArithOp::Subtract => "$subtract",
            ArithOp::Multiply => "$multiply",
            ArithOp::Divide => "$divide",
            ArithOp::Mod => "$mod",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrOp {
    ToLower,
    ToUpper,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Field(FieldPath),
    Variable {
        name: String,
        path: Vec<String>,
    },
    /// Document template; entries evaluating to Missing are omitted.
    Document(Vec<(String, Expr)>),
    Array(Vec<Expr>),

    Compare(CmpOp, Box<Expr>, Box<Expr>),
    Cmp(Box<Expr>, Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),

    Arith(ArithOp, Vec<Expr>),
    Abs(Box<Expr>),
    Round {
        value: Box<Expr>,
        places: Option<Box<Expr>>,
    },

    Cond {
        predicate: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    IfNull(Vec<Expr>),

    Filter {
        input: Box<Expr>,
        var: String,
        cond: Box<Expr>,
    },
    Size(Box<Expr>),
    In(Box<Expr>, Box<Expr>),
    ArrayElemAt(Box<Expr>, Box<Expr>),

    Case(StrOp, Box<Expr>),
    Concat(Vec<Expr>),

    TextScore,
}

impl Expr {
    /// Compile a raw expression value.
    pub fn compile(value: &Value) -> Result<Expr, OpError> {
        Compiler::default().compile(value)
    }

    /// Compile a document template (the body of `$addFields`, a `$group`
    /// key, ...).
    pub fn compile_template(doc: &Document) -> Result<Expr, OpError> {
        Compiler::default().template(doc)
    }

    /// True if the expression is a plain literal (no references at all).
    pub fn is_constant(&self) -> bool {
        match self {
            Expr::Literal(_) => true,
            Expr::Array(items) => items.iter().all(Expr::is_constant),
            Expr::Document(fields) => fields.iter().all(|(_, e)| e.is_constant()),
            _ => false,
        }
    }
}

/// Tracks variables bound by enclosing `$filter`s so that unbound references
/// are rejected at compile time.
#[derive(Default)]
struct Compiler {
    bound: Vec<String>,
}

impl Compiler {
    fn compile(&mut self, value: &Value) -> Result<Expr, OpError> {
        match value {
            Value::String(s) if s.starts_with("$$") => self.variable(&s[2..]),
            Value::String(s) if s.starts_with('$') => {
                let path = FieldPath::parse(&s[1..])
                    .map_err(|e| OpError::Plan(format!("field reference '{s}': {e}")))?;
                Ok(Expr::Field(path))
            }
            Value::Array(items) => Ok(Expr::Array(
                items
                    .iter()
                    .map(|v| self.compile(v))
                    .collect::<Result<_, _>>()?,
            )),
            Value::Document(doc) => match doc.iter().next() {
                Some((key, arg)) if key.starts_with('$') => {
                    if doc.len() != 1 {
                        return Err(OpError::Plan(format!(
                            "an expression object must have exactly one operator key, found {}",
                            doc.len()
                        )));
                    }
                    self.operator(key, arg)
                }
                _ => self.template(doc),
            },
            other => Ok(Expr::Literal(other.clone())),
        }
    }

    fn template(&mut self, doc: &Document) -> Result<Expr, OpError> {
        let mut fields = Vec::with_capacity(doc.len());
        for (key, value) in doc.iter() {
            if key.starts_with('$') {
                return Err(OpError::UnknownOperator(key.to_string()));
            }
            fields.push((key.to_string(), self.compile(value)?));
        }
        Ok(Expr::Document(fields))
    }

    fn variable(&self, reference: &str) -> Result<Expr, OpError> {
        let mut parts = reference.split('.');
        let name = parts.next().unwrap_or_default();
        let path: Vec<String> = parts.map(String::from).collect();
        if name.is_empty() || path.iter().any(|p| p.is_empty()) {
            return Err(OpError::Plan(format!("invalid variable reference '$${reference}'")));
        }
        if name != ROOT && name != CURRENT && !self.bound.iter().any(|b| b == name) {
            return Err(OpError::Plan(format!("undefined variable '$${name}'")));
        }
        Ok(Expr::Variable {
            name: name.to_string(),
            path,
        })
    }

    fn operator(&mut self, op: &str, arg: &Value) -> Result<Expr, OpError> {
        if let Some(cmp) = CmpOp::from_name(op) {
            let [a, b] = self.fixed::<2>(op, arg)?;
            return Ok(Expr::Compare(cmp, Box::new(a), Box::new(b)));
        }
        match op {
            "$literal" => Ok(Expr::Literal(arg.clone())),
            "$cmp" => {
                let [a, b] = self.fixed::<2>(op, arg)?;
                Ok(Expr::Cmp(Box::new(a), Box::new(b)))
            }
            "$and" => Ok(Expr::And(self.list(arg)?)),
            "$or" => Ok(Expr::Or(self.list(arg)?)),
            "$not" => {
                let [a] = self.fixed::<1>(op, arg)?;
                Ok(Expr::Not(Box::new(a)))
            }
            "$add" => Ok(Expr::Arith(ArithOp::Add, self.list(arg)?)),
            "$multiply" => Ok(Expr::Arith(ArithOp::Multiply, self.list(arg)?)),
            "$subtract" => Ok(Expr::Arith(ArithOp::Subtract, self.fixed::<2>(op, arg)?.into())),
            "$divide" => Ok(Expr::Arith(ArithOp::Divide, self.fixed::<2>(op, arg)?.into())),
            "$mod" => Ok(Expr::Arith(ArithOp::Mod, self.fixed::<2>(op, arg)?.into())),
            "$abs" => {
                let [a] = self.fixed::<1>(op, arg)?;
                Ok(Expr::Abs(Box::new(a)))
            }
            "$round" => {
                let mut args = self.list(arg)?.into_iter();
                let value = args
                    .next()
                    .ok_or_else(|| OpError::Plan("$round needs a value".into()))?;
                let places = args.next();
                if args.next().is_some() {
                    return Err(OpError::Plan("$round takes at most 2 arguments".into()));
                }
                Ok(Expr::Round {
                    value: Box::new(value),
                    places: places.map(Box::new),
                })
            }
            "$cond" => self.cond(arg),
            "$ifNull" => {
                let args = self.list(arg)?;
                if args.len() < 2 {
                    return Err(OpError::Plan("$ifNull needs at least 2 arguments".into()));
                }
                Ok(Expr::IfNull(args))
            }
            "$filter" => self.filter(arg),
            "$size" => {
                let [a] = self.fixed::<1>(op, arg)?;
                Ok(Expr::Size(Box::new(a)))
            }
            "$in" => {
                let [a, b] = self.fixed::<2>(op, arg)?;
                Ok(Expr::In(Box::new(a), Box::new(b)))
            }
            "$arrayElemAt" => {
                let [a, b] = self.fixed::<2>(op, arg)?;
                Ok(Expr::ArrayElemAt(Box::new(a), Box::new(b)))
            }
            "$toLower" | "$toUpper" => {
                let [a] = self.fixed::<1>(op, arg)?;
                let which = if op == "$toLower" {
                    StrOp::ToLower
                } else {
                    StrOp::ToUpper
                };
                Ok(Expr::Case(which, Box::new(a)))
            }
            "$concat" => Ok(Expr::Concat(self.list(arg)?)),
            "$meta" => match arg.as_str() {
                Some("textScore") => Ok(Expr::TextScore),
                _ => Err(OpError::Plan(format!("unsupported $meta argument {arg}"))),
            },
            other => Err(OpError::UnknownOperator(other.to_string())),
        }
    }

    /// Operator arguments as a list; a non-array argument is a single operand.
    fn list(&mut self, arg: &Value) -> Result<Vec<Expr>, OpError> {
        match arg {
            Value::Array(items) => items.iter().map(|v| self.compile(v)).collect(),
            single => Ok(vec![self.compile(single)?]),
        }
    }

    fn fixed<const N: usize>(&mut self, op: &str, arg: &Value) -> Result<[Expr; N], OpError> {
        let args = self.list(arg)?;
        let found = args.len();
        args.try_into().map_err(|_| {
            OpError::Plan(format!("{op} takes exactly {N} argument(s), found {found}"))
        })
    }

    fn cond(&mut self, arg: &Value) -> Result<Expr, OpError> {
        let [predicate, then, otherwise] = match arg {
            Value::Document(doc) => {
                for key in doc.keys() {
                    if !matches!(key, "if" | "then" | "else") {
                        return Err(OpError::Plan(format!("$cond: unknown field '{key}'")));
                    }
                }
                let part = |name: &str| {
                    doc.get(name)
                        .ok_or_else(|| OpError::Plan(format!("$cond is missing '{name}'")))
                };
                [
                    self.compile(part("if")?)?,
                    self.compile(part("then")?)?,
                    self.compile(part("else")?)?,
                ]
            }
            other => self.fixed::<3>("$cond", other)?,
        };
        Ok(Expr::Cond {
            predicate: Box::new(predicate),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn filter(&mut self, arg: &Value) -> Result<Expr, OpError> {
        let spec = arg
            .as_document()
            .ok_or_else(|| OpError::Plan("$filter expects {input, as, cond}".into()))?;
        for key in spec.keys() {
            if !matches!(key, "input" | "as" | "cond") {
                return Err(OpError::Plan(format!("$filter: unknown field '{key}'")));
            }
        }
        let input = spec
            .get("input")
            .ok_or_else(|| OpError::Plan("$filter is missing 'input'".into()))?;
        let var = match spec.get("as") {
            None => "this".to_string(),
            Some(Value::String(name)) if !name.is_empty() && !name.starts_with('$') => name.clone(),
            Some(other) => {
                return Err(OpError::Plan(format!("$filter: invalid 'as' {other}")));
            }
        };
        let cond = spec
            .get("cond")
            .ok_or_else(|| OpError::Plan("$filter is missing 'cond'".into()))?;

        let input = self.compile(input)?;
        self.bound.push(var.clone());
        let cond = self.compile(cond);
        self.bound.pop();

        Ok(Expr::Filter {
            input: Box::new(input),
            var,
            cond: Box::new(cond?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile(v: serde_json::Value) -> Result<Expr, OpError> {
        Expr::compile(&Value::from(v))
    }

    #[test]
    fn field_and_literal() {
        assert_eq!(
            compile(json!("$p.arm")).unwrap(),
            Expr::Field(FieldPath::parse("p.arm").unwrap())
        );
        assert_eq!(compile(json!(3)).unwrap(), Expr::Literal(Value::Number(3.0)));
    }

    #[test]
    fn unknown_operator_is_reported() {
        let err = compile(json!({"$frobnicate": [1, 2]})).unwrap_err();
        assert!(matches!(err, OpError::UnknownOperator(ref op) if op == "$frobnicate"));
    }

    #[test]
    fn arity_is_checked() {
        assert!(matches!(
            compile(json!({"$divide": [1]})).unwrap_err(),
            OpError::Plan(_)
        ));
    }

    #[test]
    fn cond_accepts_both_forms() {
        let a = compile(json!({"$cond": [true, 1, 0]})).unwrap();
        let b = compile(json!({"$cond": {"if": true, "then": 1, "else": 0}})).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn filter_binds_its_variable() {
        compile(json!({"$filter": {
            "input": "$attachments",
            "as": "attachment",
            "cond": {"$eq": ["$$attachment.modality", "CT"]}
        }}))
        .unwrap();

        let err = compile(json!({"$eq": ["$$attachment.modality", "CT"]})).unwrap_err();
        assert!(matches!(err, OpError::Plan(_)));
    }

    #[test]
    fn templates_nest() {
        let e = compile(json!({"arm": "$p.arm", "visit_no": "$visit_no"})).unwrap();
        assert!(matches!(e, Expr::Document(ref f) if f.len() == 2));
        assert!(!e.is_constant());
        assert!(compile(json!({"a": [1, 2]})).unwrap().is_constant());
    }
}
