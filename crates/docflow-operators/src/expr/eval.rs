//! Expression evaluation.
//!
//! `Ok(None)` is the Missing outcome: a reference that resolved to nothing.
//! It is not an error and is distinct from `Value::Null`.

use std::cmp::Ordering;

use docflow_core::path::resolve_segments;
use docflow_core::record::Meta;
use docflow_core::value::{Document, Value};

use super::{ArithOp, CmpOp, Expr, StrOp, CURRENT, ROOT};
use crate::traits::OpError;

/// Evaluation context: the current document, its metadata and the variables
/// bound by enclosing `$filter`s (innermost last).
pub struct Scope<'a> {
    doc: &'a Document,
    meta: Meta,
    vars: Vec<(&'a str, Value)>,
}

impl<'a> Scope<'a> {
    pub fn new(doc: &'a Document, meta: Meta) -> Self {
        Self {
            doc,
            meta,
            vars: Vec::new(),
        }
    }

    fn var(&self, name: &str) -> Option<Value> {
        if name == ROOT || name == CURRENT {
            return Some(Value::Document(self.doc.clone()));
        }
        self.vars
            .iter()
            .rev()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.clone())
    }
}

impl Expr {
    pub fn eval<'a>(&'a self, scope: &mut Scope<'a>) -> Result<Option<Value>, OpError> {
        match self {
            Expr::Literal(v) => Ok(Some(v.clone())),
            Expr::Field(path) => Ok(scope.doc.resolve(path)),
            Expr::Variable { name, path } => {
                Ok(scope.var(name).and_then(|v| resolve_segments(&v, path)))
            }
            Expr::Document(fields) => {
                let mut out = Document::with_capacity(fields.len());
                for (key, expr) in fields {
                    if let Some(v) = expr.eval(scope)? {
                        out.insert(key.clone(), v);
                    }
                }
                Ok(Some(Value::Document(out)))
            }
            Expr::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(item.eval(scope)?.unwrap_or(Value::Null));
                }
                Ok(Some(Value::Array(out)))
            }

            Expr::Compare(op, a, b) => {
                let a = a.eval(scope)?;
                let b = b.eval(scope)?;
                Ok(Some(Value::Bool(compare(*op, a.as_ref(), b.as_ref()))))
            }
            Expr::Cmp(a, b) => {
                let a = a.eval(scope)?.unwrap_or(Value::Null);
                let b = b.eval(scope)?.unwrap_or(Value::Null);
                let n = match a.total_cmp(&b) {
                    Ordering::Less => -1,
                    Ordering::Equal => 0,
                    Ordering::Greater => 1,
                };
                Ok(Some(Value::from(n)))
            }
            Expr::And(items) => {
                for item in items {
                    if !truthy(&item.eval(scope)?) {
                        return Ok(Some(Value::Bool(false)));
                    }
                }
                Ok(Some(Value::Bool(true)))
            }
            Expr::Or(items) => {
                for item in items {
                    if truthy(&item.eval(scope)?) {
                        return Ok(Some(Value::Bool(true)));
                    }
                }
                Ok(Some(Value::Bool(false)))
            }
            Expr::Not(a) => Ok(Some(Value::Bool(!truthy(&a.eval(scope)?)))),

            Expr::Arith(op, args) => arith(*op, args, scope),
            Expr::Abs(a) => {
                let v = a.eval(scope)?;
                Ok(Some(match number("$abs", v.as_ref())? {
                    Some(n) => Value::Number(n.abs()),
                    None => Value::Null,
                }))
            }
            Expr::Round { value, places } => {
                let v = value.eval(scope)?;
                let x = number("$round", v.as_ref())?;
                let places = match places {
                    Some(p) => {
                        let p = p.eval(scope)?;
                        match number("$round", p.as_ref())? {
                            Some(n) if n.fract() == 0.0 && (-20.0..=100.0).contains(&n) => n as i32,
                            Some(_) => {
                                return Err(OpError::Plan(
                                    "$round: places must be an integer in [-20, 100]".into(),
                                ))
                            }
                            None => return Ok(Some(Value::Null)),
                        }
                    }
                    None => 0,
                };
                Ok(Some(match x {
                    Some(x) => Value::Number(round_half_even(x, places)),
                    None => Value::Null,
                }))
            }

            Expr::Cond {
                predicate,
                then,
                otherwise,
            } => {
                if truthy(&predicate.eval(scope)?) {
                    then.eval(scope)
                } else {
                    otherwise.eval(scope)
                }
            }
            Expr::IfNull(args) => {
                let Some((fallback, candidates)) = args.split_last() else {
                    return Ok(None);
                };
                for candidate in candidates {
                    match candidate.eval(scope)? {
                        Some(v) if !v.is_null() => return Ok(Some(v)),
                        _ => {}
                    }
                }
                fallback.eval(scope)
            }

            Expr::Filter { input, var, cond } => {
                let items = match input.eval(scope)? {
                    None | Some(Value::Null) => return Ok(Some(Value::Null)),
                    Some(Value::Array(items)) => items,
                    Some(other) => {
                        return Err(OpError::type_mismatch("$filter", "array", Some(&other)))
                    }
                };
                let mut kept = Vec::new();
                for item in items {
                    scope.vars.push((var.as_str(), item));
                    let keep = cond.eval(scope);
                    let (_, item) = scope
                        .vars
                        .pop()
                        .ok_or_else(|| OpError::Exec("$filter variable scope underflow".into()))?;
                    if truthy(&keep?) {
                        kept.push(item);
                    }
                }
                Ok(Some(Value::Array(kept)))
            }
            Expr::Size(a) => match a.eval(scope)? {
                Some(Value::Array(items)) => Ok(Some(Value::from(items.len()))),
                other => Err(OpError::type_mismatch("$size", "array", other.as_ref())),
            },
            Expr::In(needle, haystack) => {
                let needle = needle.eval(scope)?;
                match haystack.eval(scope)? {
                    Some(Value::Array(items)) => Ok(Some(Value::Bool(
                        needle.is_some_and(|n| items.iter().any(|i| *i == n)),
                    ))),
                    other => Err(OpError::type_mismatch("$in", "array", other.as_ref())),
                }
            }
            Expr::ArrayElemAt(array, index) => {
                let items = match array.eval(scope)? {
                    None | Some(Value::Null) => return Ok(Some(Value::Null)),
                    Some(Value::Array(items)) => items,
                    Some(other) => {
                        return Err(OpError::type_mismatch("$arrayElemAt", "array", Some(&other)))
                    }
                };
                let idx = index.eval(scope)?;
                let idx = match number("$arrayElemAt", idx.as_ref())? {
                    Some(n) if n.fract() == 0.0 => n as i64,
                    Some(_) => {
                        return Err(OpError::type_mismatch(
                            "$arrayElemAt",
                            "integral index",
                            idx.as_ref(),
                        ))
                    }
                    None => return Ok(Some(Value::Null)),
                };
                let len = items.len() as i64;
                let pos = if idx < 0 { len + idx } else { idx };
                if (0..len).contains(&pos) {
                    Ok(items.into_iter().nth(pos as usize))
                } else {
                    Ok(None)
                }
            }

            Expr::Case(op, a) => {
                let name = match op {
                    StrOp::ToLower => "$toLower",
                    StrOp::ToUpper => "$toUpper",
                };
                let s = match a.eval(scope)? {
                    None | Some(Value::Null) => String::new(),
                    Some(Value::String(s)) => s,
                    Some(Value::Number(n)) => Value::Number(n).to_string(),
                    Some(other) => return Err(OpError::type_mismatch(name, "string", Some(&other))),
                };
                Ok(Some(Value::String(match op {
                    StrOp::ToLower => s.to_lowercase(),
                    StrOp::ToUpper => s.to_uppercase(),
                })))
            }
            Expr::Concat(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part.eval(scope)? {
                        None | Some(Value::Null) => return Ok(Some(Value::Null)),
                        Some(Value::String(s)) => out.push_str(&s),
                        Some(other) => {
                            return Err(OpError::type_mismatch("$concat", "string", Some(&other)))
                        }
                    }
                }
                Ok(Some(Value::String(out)))
            }

            Expr::TextScore => Ok(scope.meta.text_score.map(Value::Number)),
        }
    }

    /// Evaluate for truthiness (`$expr`, `$cond` predicates).
    pub fn eval_truthy<'a>(&'a self, scope: &mut Scope<'a>) -> Result<bool, OpError> {
        Ok(truthy(&self.eval(scope)?))
    }
}

fn truthy(v: &Option<Value>) -> bool {
    v.as_ref().is_some_and(Value::is_truthy)
}

/// Type-strict comparison. Missing on either side never compares equal or
/// ordered; `$ne` is its negation.
pub(crate) fn compare(op: CmpOp, a: Option<&Value>, b: Option<&Value>) -> bool {
    let ord = match (a, b) {
        (Some(a), Some(b)) => a.compare_strict(b),
        _ => None,
    };
    match op {
        CmpOp::Eq => ord == Some(Ordering::Equal),
        CmpOp::Ne => ord != Some(Ordering::Equal),
        CmpOp::Gt => ord == Some(Ordering::Greater),
        CmpOp::Gte => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
        CmpOp::Lt => ord == Some(Ordering::Less),
        CmpOp::Lte => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
    }
}

/// Numeric operand: `None` for Null/Missing, `TypeMismatch` for anything
/// else that is not a number.
fn number(op: &'static str, v: Option<&Value>) -> Result<Option<f64>, OpError> {
    match v {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(Some(*n)),
        Some(other) => Err(OpError::type_mismatch(op, "number", Some(other))),
    }
}

fn arith<'a>(
    op: ArithOp,
    args: &'a [Expr],
    scope: &mut Scope<'a>,
) -> Result<Option<Value>, OpError> {
    let mut operands = Vec::with_capacity(args.len());
    let mut null = false;
    for arg in args {
        let v = arg.eval(scope)?;
        match number(op.name(), v.as_ref())? {
            Some(n) => operands.push(n),
            None => null = true,
        }
    }
    if null {
        return Ok(Some(Value::Null));
    }

    let result = match op {
        ArithOp::Add => operands.iter().sum(),
        ArithOp::Multiply => operands.iter().product(),
        ArithOp::Subtract | ArithOp::Divide | ArithOp::Mod => {
            let (a, b) = match operands[..] {
                [a, b] => (a, b),
                _ => {
                    return Err(OpError::Plan(format!("{} takes exactly 2 arguments", op.name())))
                }
            };
            match op {
                ArithOp::Subtract => a - b,
                _ if b == 0.0 => {
                    return Err(OpError::DivisionByZero {
                        expr: format!(
                            "{{{}: [{}, {}]}}",
                            op.name(),
                            Value::Number(a),
                            Value::Number(b)
                        ),
                    })
                }
                ArithOp::Divide => a / b,
                _ => a % b,
            }
        }
    };
    Ok(Some(Value::Number(result)))
}

/// Round half to even at `places` decimal digits (negative places round to
/// tens, hundreds, ...).
fn round_half_even(x: f64, places: i32) -> f64 {
    if !x.is_finite() {
        return x;
    }
    if places >= 0 {
        let factor = 10f64.powi(places);
        let scaled = x * factor;
        if !scaled.is_finite() {
            return x;
        }
        scaled.round_ties_even() / factor
    } else {
        let factor = 10f64.powi(-places);
        (x / factor).round_ties_even() * factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: serde_json::Value) -> Document {
        Document::try_from(v).unwrap()
    }

    fn eval_on(expr: serde_json::Value, d: &Document) -> Result<Option<Value>, OpError> {
        let e = Expr::compile(&Value::from(expr)).unwrap();
        let mut scope = Scope::new(d, Meta::default());
        e.eval(&mut scope)
    }

    fn eval(expr: serde_json::Value) -> Result<Option<Value>, OpError> {
        eval_on(expr, &doc(json!({"a": 3, "b": 0, "s": "Hi", "xs": [1, 2, 3], "n": null})))
    }

    #[test]
    fn comparisons_are_type_strict() {
        assert_eq!(eval(json!({"$eq": ["$a", 3]})).unwrap(), Some(Value::Bool(true)));
        assert_eq!(eval(json!({"$eq": ["$a", "3"]})).unwrap(), Some(Value::Bool(false)));
        assert_eq!(eval(json!({"$gt": ["$a", "1"]})).unwrap(), Some(Value::Bool(false)));
        assert_eq!(eval(json!({"$ne": ["$missing", 1]})).unwrap(), Some(Value::Bool(true)));
        assert_eq!(eval(json!({"$lte": ["$missing", 1]})).unwrap(), Some(Value::Bool(false)));
    }

    #[test]
    fn divide_by_zero_is_an_error() {
        let err = eval(json!({"$divide": ["$a", "$b"]})).unwrap_err();
        assert!(matches!(err, OpError::DivisionByZero { ref expr } if expr.contains("$divide")));
        assert!(matches!(
            eval(json!({"$mod": [4, 0]})).unwrap_err(),
            OpError::DivisionByZero { .. }
        ));
    }

    #[test]
    fn arithmetic_with_null_or_missing_is_null() {
        assert_eq!(eval(json!({"$add": ["$a", "$missing"]})).unwrap(), Some(Value::Null));
        assert_eq!(eval(json!({"$divide": ["$n", 2]})).unwrap(), Some(Value::Null));
    }

    #[test]
    fn arithmetic_on_strings_is_a_type_mismatch() {
        let err = eval(json!({"$multiply": ["$s", 2]})).unwrap_err();
        assert!(matches!(err, OpError::TypeMismatch { op: "$multiply", found: "string", .. }));
    }

    #[test]
    fn round_is_half_to_even() {
        assert_eq!(eval(json!({"$round": [2.5, 0]})).unwrap(), Some(Value::Number(2.0)));
        assert_eq!(eval(json!({"$round": [3.5]})).unwrap(), Some(Value::Number(4.0)));
        assert_eq!(eval(json!({"$round": [0.125, 2]})).unwrap(), Some(Value::Number(0.12)));
        assert_eq!(eval(json!({"$round": [1250, -2]})).unwrap(), Some(Value::Number(1200.0)));
        assert_eq!(
            eval(json!({"$round": [{"$divide": [3, 4]}, 3]})).unwrap(),
            Some(Value::Number(0.75))
        );
    }

    #[test]
    fn cond_does_not_evaluate_the_untaken_branch() {
        let v = eval(json!({"$cond": [{"$eq": ["$b", 0]}, 0, {"$divide": ["$a", "$b"]}]})).unwrap();
        assert_eq!(v, Some(Value::Number(0.0)));
        let v = eval(json!({"$cond": {"if": "$missing", "then": {"$size": "$a"}, "else": "no"}}))
            .unwrap();
        assert_eq!(v, Some(Value::from("no")));
    }

    #[test]
    fn size_requires_an_array() {
        assert_eq!(eval(json!({"$size": "$xs"})).unwrap(), Some(Value::from(3)));
        let err = eval(json!({"$size": "$a"})).unwrap_err();
        assert!(matches!(err, OpError::TypeMismatch { op: "$size", found: "number", .. }));
        let err = eval(json!({"$size": "$missing"})).unwrap_err();
        assert!(matches!(err, OpError::TypeMismatch { found: "missing", .. }));
    }

    #[test]
    fn filter_binds_each_element_in_order() {
        let d = doc(json!({"attachments": [
            {"modality": "CT", "storage_uri": "u1"},
            {"modality": "MRI", "storage_uri": "u2"},
            {"modality": "CT", "storage_uri": "u3"}
        ]}));
        let v = eval_on(
            json!({"$filter": {
                "input": "$attachments",
                "as": "attachment",
                "cond": {"$eq": ["$$attachment.modality", "CT"]}
            }}),
            &d,
        )
        .unwrap()
        .unwrap();
        let uris: Vec<_> = v
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a.as_document().unwrap().get("storage_uri").cloned().unwrap())
            .collect();
        assert_eq!(uris, vec![Value::from("u1"), Value::from("u3")]);
    }

    #[test]
    fn filter_over_missing_input_is_null() {
        let v = eval(json!({"$filter": {"input": "$attachments", "cond": true}})).unwrap();
        assert_eq!(v, Some(Value::Null));
    }

    #[test]
    fn templates_omit_missing_fields() {
        let v = eval(json!({"x": "$a", "y": "$missing"})).unwrap().unwrap();
        let d = v.as_document().unwrap();
        assert_eq!(d.len(), 1);
        assert_eq!(d.get("x"), Some(&Value::from(3)));
    }

    #[test]
    fn strings_and_arrays() {
        assert_eq!(eval(json!({"$toUpper": "$s"})).unwrap(), Some(Value::from("HI")));
        assert_eq!(eval(json!({"$concat": ["$s", "!"]})).unwrap(), Some(Value::from("Hi!")));
        assert_eq!(eval(json!({"$concat": ["$s", "$missing"]})).unwrap(), Some(Value::Null));
        assert_eq!(eval(json!({"$in": [2, "$xs"]})).unwrap(), Some(Value::Bool(true)));
        assert_eq!(eval(json!({"$arrayElemAt": ["$xs", -1]})).unwrap(), Some(Value::from(3)));
        assert_eq!(eval(json!({"$arrayElemAt": ["$xs", 9]})).unwrap(), None);
        assert_eq!(
            eval(json!({"$ifNull": ["$missing", "$n", "fallback"]})).unwrap(),
            Some(Value::from("fallback"))
        );
    }

    #[test]
    fn root_variable_and_text_score() {
        let d = doc(json!({"a": 1}));
        let e = Expr::compile(&Value::from(json!("$$ROOT.a"))).unwrap();
        assert_eq!(e.eval(&mut Scope::new(&d, Meta::default())).unwrap(), Some(Value::from(1)));

        let e = Expr::compile(&Value::from(json!({"$meta": "textScore"}))).unwrap();
        let meta = Meta {
            text_score: Some(1.5),
        };
        assert_eq!(e.eval(&mut Scope::new(&d, meta)).unwrap(), Some(Value::Number(1.5)));
        assert_eq!(e.eval(&mut Scope::new(&d, Meta::default())).unwrap(), None);
    }
}
