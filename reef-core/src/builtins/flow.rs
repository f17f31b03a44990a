//! Flow-control builtins.

use crate::commands::OptMap;
use crate::error::{BadValue, Error, Flow};
use crate::native_fn::{NativeCall, NativeError, NativeFn, ParamSpec, Signature};
use crate::ns::Ns;
use crate::value::Value;

pub(super) fn register(ns: &Ns) {
    ns.add_fn(
        "each",
        NativeFn::new(
            "each",
            Signature::new().param(ParamSpec::Any).inputs(),
            |call| Box::pin(each(call)),
        ),
    );

    ns.add_fn(
        "fail",
        NativeFn::new("fail", Signature::new().param(ParamSpec::Any), |call| {
            Box::pin(async move {
                let reason = call.value_arg(0);
                Err(Error::Failed(reason.to_display()).into())
            })
        }),
    );

    for (name, flow) in [
        ("return", Flow::Return),
        ("break", Flow::Break),
        ("continue", Flow::Continue),
    ] {
        ns.add_fn(
            name,
            NativeFn::new(name, Signature::new(), move |_call| {
                Box::pin(async move { Err(Error::Flow(flow).into()) })
            }),
        );
    }
}

/// Calls a function once per input. `break` and `continue` raised by the
/// body apply to this loop.
async fn each(mut call: NativeCall<'_>) -> Result<Vec<Value>, NativeError> {
    let fv = call.value_arg(0);
    let Some(f) = fv.as_callable() else {
        return Err(BadValue::new("argument 1", "fn", fv.kind()).into());
    };
    let mut inputs = call.input_source()?;
    while let Some(v) = inputs.next().await? {
        match f.call(call.frame, vec![v], OptMap::new()).await {
            Ok(()) => {}
            Err(exc) if exc.is_flow(Flow::Break) => break,
            Err(exc) if exc.is_flow(Flow::Continue) => {}
            Err(exc) => return Err(exc.into()),
        }
    }
    Ok(vec![])
}
