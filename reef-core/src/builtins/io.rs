//! Builtins that move data through the ports.

use std::io::{Read as _, Write as _};

use itertools::Itertools as _;

use crate::commands::OptMap;
use crate::error::{BadValue, Error};
use crate::native_fn::{NativeCall, NativeError, NativeFn, ParamSpec, Signature};
use crate::ns::Ns;
use crate::value::Value;

pub(super) fn register(ns: &Ns) {
    // Writes its arguments to the value band, one each.
    ns.add_fn(
        "put",
        NativeFn::new("put", Signature::new().variadic(ParamSpec::Any), |mut call| {
            Box::pin(async move { Ok(call.take_args()) })
        }),
    );

    ns.add_fn(
        "print",
        NativeFn::new(
            "print",
            Signature::new().variadic(ParamSpec::Any).raw_opts(),
            |call| Box::pin(print(call, false)),
        ),
    );

    // `print` plus a trailing newline.
    ns.add_fn(
        "echo",
        NativeFn::new(
            "echo",
            Signature::new().variadic(ParamSpec::Any).raw_opts(),
            |call| Box::pin(print(call, true)),
        ),
    );

    // Reads the byte band to end-of-stream and yields it as one string.
    ns.add_fn(
        "slurp",
        NativeFn::new("slurp", Signature::new(), |call| {
            Box::pin(async move {
                let mut input = call.frame.byte_input()?;
                let text = tokio::task::spawn_blocking(move || {
                    let mut buf = String::new();
                    input.read_to_string(&mut buf)?;
                    Ok::<_, std::io::Error>(buf)
                })
                .await
                .map_err(Error::from)??;
                Ok(vec![Value::Str(text)])
            })
        }),
    );

    #[cfg(unix)]
    ns.add_fn(
        "pipe",
        NativeFn::new("pipe", Signature::new(), |_call| {
            Box::pin(async move {
                let (r, w) = os_pipe::pipe()?;
                let pipe = crate::value::PipeValue {
                    reader: std::fs::File::from(std::os::fd::OwnedFd::from(r)),
                    writer: std::fs::File::from(std::os::fd::OwnedFd::from(w)),
                };
                Ok(vec![Value::Pipe(std::sync::Arc::new(pipe))])
            })
        }),
    );
}

async fn print(mut call: NativeCall<'_>, newline: bool) -> Result<Vec<Value>, NativeError> {
    let sep = sep_opt(&call.opts)?;
    let mut text = call
        .take_args()
        .iter()
        .map(Value::to_display)
        .join(&sep);
    if newline {
        text.push('\n');
    }
    let mut out = call.frame.byte_output()?;
    // The write can block on pipe backpressure; off the runtime thread, a
    // downstream stage keeps running and drains it.
    tokio::task::spawn_blocking(move || {
        out.write_all(text.as_bytes())?;
        out.flush()
    })
    .await
    .map_err(Error::from)??;
    Ok(vec![])
}

fn sep_opt(opts: &OptMap) -> Result<String, NativeError> {
    let mut sep = " ".to_string();
    for (name, value) in opts {
        if name != "sep" {
            return Err(Error::UnsupportedOption(name.clone()).into());
        }
        sep = value
            .to_text()
            .ok_or_else(|| BadValue::new("&sep", "string", value.kind()))?;
    }
    Ok(sep)
}
