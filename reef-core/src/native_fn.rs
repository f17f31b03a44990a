//! Native functions: Rust implementations callable as commands.
//!
//! A native function declares a [`Signature`] up front; the adaptor checks
//! arity, converts arguments to the declared types, resolves the input
//! source, and routes returned values to the frame's output port. Builtin
//! bodies then work with typed arguments instead of raw values.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::commands::{Callable, OptMap};
use crate::error::{ArityMismatch, BadValue, Error};
use crate::exception::Exception;
use crate::frame::Frame;
use crate::port::InputStream;
use crate::value::{List, Value};

/// The declared type of one parameter.
#[derive(Clone, Copy, Debug)]
pub enum ParamSpec {
    /// A string; numbers convert.
    Str,
    /// An integer; integral floats and numeric strings convert.
    Int,
    /// A float; integers and numeric strings convert.
    Float,
    /// Any value, unconverted.
    Any,
}

/// What follows the fixed parameters.
#[derive(Clone, Copy, Debug, Default)]
pub enum TailSpec {
    /// Nothing; the argument count is exact.
    #[default]
    None,
    /// Any number of further arguments of one type.
    Variadic(ParamSpec),
    /// An input stream: one optional trailing list argument, falling back
    /// to the frame's input port.
    Inputs,
}

/// Whether the function takes options.
#[derive(Clone, Copy, Debug, Default)]
pub enum OptsSpec {
    /// No options; any given option is an error.
    #[default]
    None,
    /// Options are passed through unchecked.
    Raw,
}

/// The declared shape of a native function's arguments.
#[derive(Clone, Debug, Default)]
pub struct Signature {
    opts: OptsSpec,
    params: Vec<ParamSpec>,
    tail: TailSpec,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a fixed parameter.
    #[must_use]
    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    /// Accepts any number of trailing arguments of one type.
    #[must_use]
    pub fn variadic(mut self, spec: ParamSpec) -> Self {
        self.tail = TailSpec::Variadic(spec);
        self
    }

    /// Accepts an input stream: an optional trailing list, else the frame's
    /// input port.
    #[must_use]
    pub fn inputs(mut self) -> Self {
        self.tail = TailSpec::Inputs;
        self
    }

    /// Passes options through to the body unchecked.
    #[must_use]
    pub fn raw_opts(mut self) -> Self {
        self.opts = OptsSpec::Raw;
        self
    }

    fn bind(&self, args: Vec<Value>) -> Result<(Vec<NativeArg>, InputsKind), Error> {
        let fixed = self.params.len();
        match self.tail {
            TailSpec::None if args.len() != fixed => {
                return Err(ArityMismatch::exact("arguments", fixed, args.len()).into());
            }
            TailSpec::Variadic(_) if args.len() < fixed => {
                return Err(ArityMismatch::at_least("arguments", fixed, args.len()).into());
            }
            TailSpec::Inputs if args.len() != fixed && args.len() != fixed + 1 => {
                return Err(ArityMismatch::range("arguments", fixed, fixed + 1, args.len()).into());
            }
            _ => {}
        }

        let mut out = Vec::with_capacity(args.len());
        let mut inputs = InputsKind::NotDeclared;
        for (i, arg) in args.into_iter().enumerate() {
            if i < fixed {
                out.push(convert(self.params[i], arg, i)?);
                continue;
            }
            match self.tail {
                TailSpec::Variadic(spec) => out.push(convert(spec, arg, i)?),
                TailSpec::Inputs => match arg {
                    Value::List(l) => inputs = InputsKind::List(l),
                    other => {
                        return Err(BadValue::new(
                            format!("argument {}", i + 1),
                            "list",
                            other.kind(),
                        )
                        .into());
                    }
                },
                TailSpec::None => unreachable!("excess arguments rejected above"),
            }
        }
        if matches!(self.tail, TailSpec::Inputs) && matches!(inputs, InputsKind::NotDeclared) {
            inputs = InputsKind::Frame;
        }
        Ok((out, inputs))
    }
}

fn convert(spec: ParamSpec, arg: Value, i: usize) -> Result<NativeArg, Error> {
    let what = format!("argument {}", i + 1);
    match spec {
        ParamSpec::Str => match arg.to_text() {
            Some(s) => Ok(NativeArg::Str(s)),
            None => Err(BadValue::new(what, "string or number", arg.kind()).into()),
        },
        ParamSpec::Int => Ok(NativeArg::Int(arg.to_int(&what)?)),
        ParamSpec::Float => Ok(NativeArg::Float(arg.to_float(&what)?)),
        ParamSpec::Any => Ok(NativeArg::Any(arg)),
    }
}

/// An argument after conversion to its declared type.
#[derive(Clone, Debug)]
pub enum NativeArg {
    Str(String),
    Int(i64),
    Float(f64),
    Any(Value),
}

impl NativeArg {
    pub fn into_value(self) -> Value {
        match self {
            Self::Str(s) => Value::Str(s),
            Self::Int(n) => Value::Int(n),
            Self::Float(n) => Value::Float(n),
            Self::Any(v) => v,
        }
    }
}

enum InputsKind {
    NotDeclared,
    Frame,
    List(List),
}

/// Everything a native function body gets to work with.
pub struct NativeCall<'a> {
    /// The calling frame, for port access.
    pub frame: &'a mut Frame,
    /// Converted arguments, in order.
    pub args: Vec<NativeArg>,
    /// The options as given, when the signature passes them through.
    pub opts: OptMap,
    inputs: InputsKind,
}

impl NativeCall<'_> {
    /// The string argument at `i`. The signature guarantees the type.
    pub fn str_arg(&self, i: usize) -> &str {
        match &self.args[i] {
            NativeArg::Str(s) => s,
            _ => unreachable!("signature declares argument {i} as a string"),
        }
    }

    /// The integer argument at `i`.
    pub fn int_arg(&self, i: usize) -> i64 {
        match &self.args[i] {
            NativeArg::Int(n) => *n,
            _ => unreachable!("signature declares argument {i} as an integer"),
        }
    }

    /// The float argument at `i`.
    pub fn float_arg(&self, i: usize) -> f64 {
        match &self.args[i] {
            NativeArg::Float(n) => *n,
            _ => unreachable!("signature declares argument {i} as a float"),
        }
    }

    /// The unconverted argument at `i`.
    pub fn value_arg(&self, i: usize) -> Value {
        match &self.args[i] {
            NativeArg::Any(v) => v.clone(),
            other => other.clone().into_value(),
        }
    }

    /// Takes all arguments as values.
    pub fn take_args(&mut self) -> Vec<Value> {
        std::mem::take(&mut self.args)
            .into_iter()
            .map(NativeArg::into_value)
            .collect()
    }

    /// The declared input source: the trailing list argument if one was
    /// given, else the frame's input port.
    pub fn input_source(&mut self) -> Result<InputStream, Error> {
        match std::mem::replace(&mut self.inputs, InputsKind::NotDeclared) {
            InputsKind::List(l) => Ok(InputStream::from_values(l.iter().cloned())),
            _ => self.frame.input_stream(),
        }
    }
}

/// What a native body can fail with: a raw error, wrapped with the call
/// site's traceback by the adaptor, or a ready-made exception passed through
/// untouched (e.g. a failure from a function the body called).
#[derive(Debug)]
pub enum NativeError {
    Error(Error),
    Exception(Exception),
}

impl From<Error> for NativeError {
    fn from(e: Error) -> Self {
        Self::Error(e)
    }
}

impl From<Exception> for NativeError {
    fn from(e: Exception) -> Self {
        Self::Exception(e)
    }
}

impl From<BadValue> for NativeError {
    fn from(e: BadValue) -> Self {
        Self::Error(e.into())
    }
}

impl From<ArityMismatch> for NativeError {
    fn from(e: ArityMismatch) -> Self {
        Self::Error(e.into())
    }
}

impl From<std::io::Error> for NativeError {
    fn from(e: std::io::Error) -> Self {
        Self::Error(e.into())
    }
}

type NativeBody = Box<
    dyn for<'a> Fn(NativeCall<'a>) -> BoxFuture<'a, Result<Vec<Value>, NativeError>> + Send + Sync,
>;

/// A Rust function exposed as a command.
pub struct NativeFn {
    name: String,
    sig: Signature,
    body: NativeBody,
}

impl NativeFn {
    pub fn new(
        name: impl Into<String>,
        sig: Signature,
        body: impl for<'a> Fn(NativeCall<'a>) -> BoxFuture<'a, Result<Vec<Value>, NativeError>>
            + Send
            + Sync
            + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            sig,
            body: Box::new(body),
        })
    }
}

#[async_trait]
impl Callable for NativeFn {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(
        &self,
        fm: &mut Frame,
        args: Vec<Value>,
        opts: OptMap,
    ) -> Result<(), Exception> {
        let tb = fm.traceback.clone();
        let wrap = move |err: Error| Exception::new(err, tb.clone());

        if matches!(self.sig.opts, OptsSpec::None) {
            if let Some((name, _)) = opts.first() {
                return Err(wrap(Error::UnsupportedOption(name.clone())));
            }
        }
        let (args, inputs) = self.sig.bind(args).map_err(&wrap)?;

        let call = NativeCall {
            frame: fm,
            args,
            opts,
            inputs,
        };
        let values = (self.body)(call).await.map_err(|err| match err {
            NativeError::Error(err) => wrap(err),
            NativeError::Exception(exc) => exc,
        })?;
        for value in values {
            fm.put(value).await.map_err(&wrap)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn bind_checks_exact_arity() {
        let sig = Signature::new().param(ParamSpec::Str);
        assert!(sig.bind(vec![]).is_err());
        assert!(sig.bind(vec!["a".into(), "b".into()]).is_err());
        let (args, _) = sig.bind(vec![Value::Int(5)]).unwrap();
        assert!(matches!(&args[0], NativeArg::Str(s) if s == "5"));
    }

    #[test]
    fn bind_converts_variadic_tail() {
        let sig = Signature::new().variadic(ParamSpec::Float);
        let (args, _) = sig
            .bind(vec![Value::Int(1), Value::Str("2.5".into())])
            .unwrap();
        assert_eq!(args.len(), 2);
        assert!(matches!(args[1], NativeArg::Float(n) if n == 2.5));
    }

    #[test]
    fn bind_takes_optional_input_list() {
        let sig = Signature::new().inputs();
        let list: Value = [Value::Int(1)].into_iter().collect();
        let (_, inputs) = sig.bind(vec![list]).unwrap();
        assert!(matches!(inputs, InputsKind::List(_)));
        let (_, inputs) = sig.bind(vec![]).unwrap();
        assert!(matches!(inputs, InputsKind::Frame));
        assert!(sig.bind(vec![Value::Int(1)]).is_err());
    }
}
