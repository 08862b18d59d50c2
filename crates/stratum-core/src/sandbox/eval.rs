//! Tree-walking evaluator.
//!
//! `result` (a `serde_json::Value`, typically a JSON object) is the only
//! bound name. Because JSON objects already map field names to values,
//! attribute access (`result.field`) and key lookup (`result["field"]`)
//! are the same operation here: no separate wrapper type, every JSON object
//! already behaves like a namespace under `.field` access.

use std::path::Path;

use serde_json::Value;

use super::ast::{BinOp, Expr, Literal};

pub fn eval(expr: &Expr, result: &Value) -> Result<Value, String> {
    match expr {
        Expr::Literal(lit) => Ok(literal_value(lit)),
        Expr::Result => Ok(result.clone()),
        Expr::Attr(base, field) => {
            let base_val = eval(base, result)?;
            match &base_val {
                Value::Object(map) => map
                    .get(field)
                    .cloned()
                    .ok_or_else(|| format!("object has no field '{field}'")),
                other => Err(format!(
                    "cannot access field '{field}' on non-object value {other}"
                )),
            }
        }
        Expr::Index(base, index) => {
            let base_val = eval(base, result)?;
            let index_val = eval(index, result)?;
            index_into(&base_val, &index_val)
        }
        Expr::Call(name, args) => {
            let mut values = Vec::with_capacity(args.len());
            for a in args {
                values.push(eval(a, result)?);
            }
            call_whitelisted(name, &values)
        }
        Expr::Not(inner) => Ok(Value::Bool(!truthy(&eval(inner, result)?))),
        Expr::Neg(inner) => negate(&eval(inner, result)?),
        Expr::BinOp(op, left, right) => eval_binop(*op, left, right, result),
    }
}

fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Int(n) => Value::Number((*n).into()),
        Literal::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Literal::Str(s) => Value::String(s.clone()),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Null => Value::Null,
    }
}

fn index_into(base: &Value, index: &Value) -> Result<Value, String> {
    match (base, index) {
        (Value::Array(items), Value::Number(n)) => {
            let i = n
                .as_i64()
                .ok_or_else(|| "array index must be an integer".to_string())?;
            let i = usize::try_from(i).map_err(|_| "array index out of range".to_string())?;
            items
                .get(i)
                .cloned()
                .ok_or_else(|| format!("array index {i} out of range"))
        }
        (Value::Object(map), Value::String(key)) => map
            .get(key)
            .cloned()
            .ok_or_else(|| format!("object has no key '{key}'")),
        _ => Err("unsupported indexing operation".to_string()),
    }
}

fn negate(v: &Value) -> Result<Value, String> {
    match v {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Number((-i).into()))
            } else if let Some(f) = n.as_f64() {
                Ok(serde_json::Number::from_f64(-f)
                    .map(Value::Number)
                    .unwrap_or(Value::Null))
            } else {
                Err("cannot negate this number".to_string())
            }
        }
        other => Err(format!("cannot negate non-numeric value {other}")),
    }
}

fn eval_binop(op: BinOp, left: &Expr, right: &Expr, result: &Value) -> Result<Value, String> {
    // and/or short-circuit and return the original value like Python does,
    // but the caller always coerces the final result to bool, so returning
    // a bool is equivalent and simpler.
    if op == BinOp::And {
        let l = eval(left, result)?;
        if !truthy(&l) {
            return Ok(Value::Bool(false));
        }
        return Ok(Value::Bool(truthy(&eval(right, result)?)));
    }
    if op == BinOp::Or {
        let l = eval(left, result)?;
        if truthy(&l) {
            return Ok(Value::Bool(true));
        }
        return Ok(Value::Bool(truthy(&eval(right, result)?)));
    }

    let l = eval(left, result)?;
    let r = eval(right, result)?;

    match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => arithmetic(op, &l, &r),
        BinOp::Eq => Ok(Value::Bool(values_equal(&l, &r))),
        BinOp::Ne => Ok(Value::Bool(!values_equal(&l, &r))),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => compare(op, &l, &r),
        BinOp::In => Ok(Value::Bool(membership(&l, &r)?)),
        BinOp::NotIn => Ok(Value::Bool(!membership(&l, &r)?)),
        BinOp::And | BinOp::Or => unreachable!("handled above"),
    }
}

fn as_f64(v: &Value) -> Result<f64, String> {
    v.as_f64()
        .ok_or_else(|| format!("expected a number, found {v}"))
}

fn arithmetic(op: BinOp, l: &Value, r: &Value) -> Result<Value, String> {
    let (a, b) = (as_f64(l)?, as_f64(r)?);
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err("division by zero".to_string());
            }
            a / b
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err("modulo by zero".to_string());
            }
            a % b
        }
        _ => unreachable!(),
    };
    if l.is_i64() && r.is_i64() && matches!(op, BinOp::Add | BinOp::Sub | BinOp::Mul) {
        Ok(Value::Number((result as i64).into()))
    } else {
        Ok(serde_json::Number::from_f64(result)
            .map(Value::Number)
            .unwrap_or(Value::Null))
    }
}

fn compare(op: BinOp, l: &Value, r: &Value) -> Result<Value, String> {
    let ordering = match (l, r) {
        (Value::Number(_), Value::Number(_)) => as_f64(l)?.partial_cmp(&as_f64(r)?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => return Err(format!("cannot compare {l} and {r}")),
    };
    let Some(ordering) = ordering else {
        return Err(format!("cannot compare {l} and {r}"));
    };
    let b = match op {
        BinOp::Lt => ordering.is_lt(),
        BinOp::Le => ordering.is_le(),
        BinOp::Gt => ordering.is_gt(),
        BinOp::Ge => ordering.is_ge(),
        _ => unreachable!(),
    };
    Ok(Value::Bool(b))
}

fn values_equal(l: &Value, r: &Value) -> bool {
    l == r
}

fn membership(needle: &Value, haystack: &Value) -> Result<bool, String> {
    match haystack {
        Value::Array(items) => Ok(items.iter().any(|v| values_equal(v, needle))),
        Value::String(s) => match needle {
            Value::String(sub) => Ok(s.contains(sub.as_str())),
            _ => Err("string membership requires a string needle".to_string()),
        },
        Value::Object(map) => match needle {
            Value::String(key) => Ok(map.contains_key(key)),
            _ => Err("object membership requires a string key".to_string()),
        },
        _ => Err(format!("'in' unsupported on {haystack}")),
    }
}

/// Standard truthiness: null is false, booleans are themselves, numbers are
/// false only at zero, strings/arrays/objects are false only when empty.
pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(m) => !m.is_empty(),
    }
}

fn call_whitelisted(name: &str, args: &[Value]) -> Result<Value, String> {
    match name {
        "file_exists" => {
            let path = expect_string_arg(args, 0, "file_exists")?;
            Ok(Value::Bool(Path::new(&path).exists()))
        }
        "file_contains" => {
            let path = expect_string_arg(args, 0, "file_contains")?;
            let needle = expect_string_arg(args, 1, "file_contains")?;
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| format!("file_contains: cannot read '{path}': {e}"))?;
            Ok(Value::Bool(contents.contains(&needle)))
        }
        "len" => {
            let value = args
                .first()
                .ok_or_else(|| "len() requires one argument".to_string())?;
            let length = match value {
                Value::String(s) => s.chars().count(),
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                other => return Err(format!("len() unsupported on {other}")),
            };
            Ok(Value::Number((length as i64).into()))
        }
        "int" => {
            let value = args
                .first()
                .ok_or_else(|| "int() requires one argument".to_string())?;
            match value {
                Value::Number(n) if n.is_i64() => Ok(value.clone()),
                Value::Number(n) => Ok(Value::Number(((n.as_f64().unwrap()) as i64).into())),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(|n| Value::Number(n.into()))
                    .map_err(|_| format!("int(): cannot parse '{s}' as an integer")),
                Value::Bool(b) => Ok(Value::Number((*b as i64).into())),
                other => Err(format!("int() unsupported on {other}")),
            }
        }
        other => Err(format!("'{other}' is not a whitelisted function")),
    }
}

fn expect_string_arg(args: &[Value], index: usize, fn_name: &str) -> Result<String, String> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(format!("{fn_name}() argument {index} must be a string, found {other}")),
        None => Err(format!("{fn_name}() requires argument {index}")),
    }
}
