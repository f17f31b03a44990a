//! Odds and ends.

use std::time::Duration;

use crate::error::{BadValue, Error};
use crate::native_fn::{NativeFn, ParamSpec, Signature};
use crate::ns::Ns;
use crate::value::Value;

pub(super) fn register(ns: &Ns) {
    // Pauses for the given number of seconds, waking early on interrupt.
    ns.add_fn(
        "sleep",
        NativeFn::new("sleep", Signature::new().param(ParamSpec::Float), |call| {
            Box::pin(async move {
                let secs = call.float_arg(0);
                if !secs.is_finite() || secs < 0.0 {
                    return Err(BadValue::new(
                        "duration",
                        "non-negative number",
                        secs.to_string(),
                    )
                    .into());
                }
                let interrupts = call.frame.interrupts().clone();
                tokio::select! {
                    () = tokio::time::sleep(Duration::from_secs_f64(secs)) => Ok(vec![]),
                    () = interrupts.raised() => Err(Error::Interrupted.into()),
                }
            })
        }),
    );

    // Accepts anything, does nothing.
    ns.add_fn(
        "nop",
        NativeFn::new(
            "nop",
            Signature::new().variadic(ParamSpec::Any).raw_opts(),
            |_call| Box::pin(async move { Ok(vec![]) }),
        ),
    );

    ns.add_fn(
        "kind-of",
        NativeFn::new(
            "kind-of",
            Signature::new().variadic(ParamSpec::Any),
            |mut call| {
                Box::pin(async move {
                    Ok(call
                        .take_args()
                        .iter()
                        .map(|v| Value::Str(v.kind().to_string()))
                        .collect())
                })
            },
        ),
    );

    ns.add_fn(
        "repr",
        NativeFn::new("repr", Signature::new().variadic(ParamSpec::Any), |mut call| {
            Box::pin(async move {
                let text = call
                    .take_args()
                    .iter()
                    .map(Value::repr)
                    .collect::<Vec<_>>()
                    .join(" ");
                use std::io::Write as _;
                let mut out = call.frame.byte_output()?;
                tokio::task::spawn_blocking(move || writeln!(out, "{text}"))
                    .await
                    .map_err(Error::from)??;
                Ok(vec![])
            })
        }),
    );
}
