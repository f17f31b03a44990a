//! Builtins over lists and input streams.

use crate::error::{ArityMismatch, BadValue};
use crate::native_fn::{NativeCall, NativeError, NativeFn, ParamSpec, Signature};
use crate::ns::Ns;
use crate::value::Value;

pub(super) fn register(ns: &Ns) {
    // Forwards every input to the value band unchanged. Useful for turning
    // a list (or the byte band) into a value stream.
    ns.add_fn(
        "all",
        NativeFn::new("all", Signature::new().inputs(), |call| Box::pin(all(call))),
    );

    ns.add_fn(
        "range",
        NativeFn::new("range", Signature::new().variadic(ParamSpec::Int), |call| {
            Box::pin(range(call))
        }),
    );

    ns.add_fn(
        "count",
        NativeFn::new("count", Signature::new().inputs(), |call| {
            Box::pin(count(call))
        }),
    );

    ns.add_fn(
        "conj",
        NativeFn::new(
            "conj",
            Signature::new().param(ParamSpec::Any).variadic(ParamSpec::Any),
            |call| Box::pin(conj(call)),
        ),
    );
}

async fn all(mut call: NativeCall<'_>) -> Result<Vec<Value>, NativeError> {
    let mut inputs = call.input_source()?;
    while let Some(v) = inputs.next().await? {
        call.frame.put(v).await?;
    }
    Ok(vec![])
}

/// Streams `low` (inclusive) to `high` (exclusive); with one argument,
/// counts from zero.
async fn range(call: NativeCall<'_>) -> Result<Vec<Value>, NativeError> {
    let (low, high) = match call.args.len() {
        1 => (0, call.int_arg(0)),
        2 => (call.int_arg(0), call.int_arg(1)),
        n => return Err(ArityMismatch::range("arguments", 1, 2, n).into()),
    };
    for i in low..high {
        call.frame.put(Value::Int(i)).await?;
    }
    Ok(vec![])
}

async fn count(mut call: NativeCall<'_>) -> Result<Vec<Value>, NativeError> {
    let mut inputs = call.input_source()?;
    let mut n: i64 = 0;
    while inputs.next().await?.is_some() {
        n += 1;
    }
    Ok(vec![Value::Int(n)])
}

/// Returns a new list with the given values appended; the original is
/// unchanged.
async fn conj(mut call: NativeCall<'_>) -> Result<Vec<Value>, NativeError> {
    let mut args = call.take_args().into_iter();
    let mut list = match args.next() {
        Some(Value::List(l)) => l,
        Some(other) => return Err(BadValue::new("argument 1", "list", other.kind()).into()),
        None => unreachable!("the signature requires the list argument"),
    };
    for v in args {
        list = list.push_back(v);
    }
    Ok(vec![Value::List(list)])
}
