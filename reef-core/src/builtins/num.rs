//! Arithmetic builtins.
//!
//! Arithmetic stays in integers as long as it can; an operation that would
//! overflow `i64` falls back to floats, as does any float operand.

use crate::error::{ArityMismatch, BadValue, Error};
use crate::native_fn::{NativeCall, NativeError, NativeFn, ParamSpec, Signature};
use crate::ns::Ns;
use crate::value::Value;

pub(super) fn register(ns: &Ns) {
    ns.add_fn(
        "+",
        NativeFn::new("+", Signature::new().variadic(ParamSpec::Any), |call| {
            Box::pin(fold(call, add, Num::Int(0)))
        }),
    );
    ns.add_fn(
        "*",
        NativeFn::new("*", Signature::new().variadic(ParamSpec::Any), |call| {
            Box::pin(fold(call, mul, Num::Int(1)))
        }),
    );
    ns.add_fn(
        "-",
        NativeFn::new("-", Signature::new().variadic(ParamSpec::Any), |call| {
            Box::pin(subtract(call))
        }),
    );
}

#[derive(Clone, Copy, Debug)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn to_value(self) -> Value {
        match self {
            Self::Int(n) => Value::Int(n),
            Self::Float(n) => Value::Float(n),
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Self::Int(n) => n as f64,
            Self::Float(n) => n,
        }
    }
}

fn to_num(v: &Value, i: usize) -> Result<Num, Error> {
    let what = || format!("argument {}", i + 1);
    match v {
        Value::Int(n) => Ok(Num::Int(*n)),
        Value::Float(n) => Ok(Num::Float(*n)),
        Value::Str(s) => {
            let s = s.trim();
            if let Ok(n) = s.parse::<i64>() {
                Ok(Num::Int(n))
            } else if let Ok(n) = s.parse::<f64>() {
                Ok(Num::Float(n))
            } else {
                Err(BadValue::new(what(), "number", format!("string {s:?}")).into())
            }
        }
        other => Err(BadValue::new(what(), "number", other.kind()).into()),
    }
}

fn add(a: Num, b: Num) -> Num {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => match x.checked_add(y) {
            Some(n) => Num::Int(n),
            None => Num::Float(x as f64 + y as f64),
        },
        _ => Num::Float(a.as_f64() + b.as_f64()),
    }
}

fn sub(a: Num, b: Num) -> Num {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => match x.checked_sub(y) {
            Some(n) => Num::Int(n),
            None => Num::Float(x as f64 - y as f64),
        },
        _ => Num::Float(a.as_f64() - b.as_f64()),
    }
}

fn mul(a: Num, b: Num) -> Num {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => match x.checked_mul(y) {
            Some(n) => Num::Int(n),
            None => Num::Float(x as f64 * y as f64),
        },
        _ => Num::Float(a.as_f64() * b.as_f64()),
    }
}

async fn fold(
    call: NativeCall<'_>,
    op: fn(Num, Num) -> Num,
    unit: Num,
) -> Result<Vec<Value>, NativeError> {
    let mut acc = unit;
    for i in 0..call.args.len() {
        acc = op(acc, to_num(&call.value_arg(i), i)?);
    }
    Ok(vec![acc.to_value()])
}

/// With one argument, negates it; with more, subtracts the rest from the
/// first.
async fn subtract(call: NativeCall<'_>) -> Result<Vec<Value>, NativeError> {
    if call.args.is_empty() {
        return Err(ArityMismatch::at_least("arguments", 1, 0).into());
    }
    let first = to_num(&call.value_arg(0), 0)?;
    if call.args.len() == 1 {
        return Ok(vec![sub(Num::Int(0), first).to_value()]);
    }
    let mut acc = first;
    for i in 1..call.args.len() {
        acc = sub(acc, to_num(&call.value_arg(i), i)?);
    }
    Ok(vec![acc.to_value()])
}
