//! Execution frames: the context a compiled operation runs in.

use std::sync::Arc;

use reef_syntax::{Source, Span};

use crate::error::Error;
use crate::exception::{Exception, SourceContext, Traceback};
use crate::external_cmd::ExternalCmd;
use crate::interp::Interp;
use crate::interrupts::Interrupts;
use crate::ns::{Ns, FN_SUFFIX};
use crate::port::{InputStream, OpenFile, Port};
use crate::value::Value;
use crate::vars::Variable;

/// The context a compiled operation executes in: the interpreter, the local
/// and upvalue namespaces, the ports, and the traceback accumulated so far.
///
/// Each pipeline stage and each closure call owns its frame. Forking a frame
/// duplicates its ports; namespaces are shared by handle.
pub struct Frame {
    pub(crate) interp: Arc<Interp>,
    pub(crate) src: Arc<Source>,
    pub(crate) local: Ns,
    pub(crate) up: Ns,
    pub(crate) ports: Vec<Port>,
    pub(crate) traceback: Option<Arc<Traceback>>,
    pub(crate) interrupts: Interrupts,
    pub(crate) background: bool,
}

impl Frame {
    pub(crate) fn new(
        interp: Arc<Interp>,
        src: Arc<Source>,
        local: Ns,
        ports: Vec<Port>,
        interrupts: Interrupts,
    ) -> Self {
        Self {
            interp,
            src,
            local,
            up: Ns::new(),
            ports,
            traceback: None,
            interrupts,
            background: false,
        }
    }

    pub fn interp(&self) -> &Arc<Interp> {
        &self.interp
    }

    pub fn source(&self) -> &Arc<Source> {
        &self.src
    }

    /// The local namespace: variables declared at the current level.
    pub fn local(&self) -> &Ns {
        &self.local
    }

    /// The upvalue namespace: variables captured from enclosing scopes.
    pub fn up(&self) -> &Ns {
        &self.up
    }

    /// Whether this frame belongs to a background pipeline.
    pub fn is_background(&self) -> bool {
        self.background
    }

    pub fn interrupts(&self) -> &Interrupts {
        &self.interrupts
    }

    /// Whether execution should wind down due to a pending interrupt.
    pub fn canceled(&self) -> bool {
        self.interrupts.is_raised()
    }

    /// Duplicates the frame for an independently scheduled body: ports are
    /// duplicated, namespaces and traceback are shared.
    pub fn fork(&self) -> Result<Self, Error> {
        let mut ports = Vec::with_capacity(self.ports.len());
        for port in &self.ports {
            ports.push(port.try_clone()?);
        }
        Ok(Self {
            interp: self.interp.clone(),
            src: self.src.clone(),
            local: self.local.clone(),
            up: self.up.clone(),
            ports,
            traceback: self.traceback.clone(),
            interrupts: self.interrupts.clone(),
            background: self.background,
        })
    }

    pub fn port(&self, index: usize) -> Option<&Port> {
        self.ports.get(index)
    }

    /// The input port (descriptor 0).
    pub fn input(&self) -> &Port {
        &self.ports[0]
    }

    /// The output port (descriptor 1).
    pub fn output(&self) -> &Port {
        &self.ports[1]
    }

    /// The error port (descriptor 2).
    pub fn error(&self) -> &Port {
        &self.ports[2]
    }

    /// Writes a value to the output port's value band.
    pub async fn put(&self, value: Value) -> Result<(), Error> {
        self.output().send_value(value).await
    }

    /// A duplicated byte-band writer for the output port.
    pub fn byte_output(&self) -> Result<OpenFile, Error> {
        match &self.output().file {
            Some(f) => f.try_dup(),
            None => Ok(OpenFile::Null),
        }
    }

    /// A duplicated byte-band reader for the input port.
    pub fn byte_input(&self) -> Result<OpenFile, Error> {
        match &self.input().file {
            Some(f) => f.try_dup(),
            None => Ok(OpenFile::Null),
        }
    }

    /// A stream over the input port's two bands. The stream holds its own
    /// handles, so the frame stays usable while iterating.
    pub fn input_stream(&self) -> Result<InputStream, Error> {
        InputStream::from_port(self.input())
    }

    /// Resolves a (possibly qualified) variable name against this frame:
    /// local, then upvalues, then the interpreter's builtin namespace.
    pub fn resolve(&self, name: &str) -> Option<Variable> {
        if let Some(rest) = name.strip_prefix("local:") {
            return self.local.get(rest);
        }
        if let Some(rest) = name.strip_prefix("up:") {
            return self.up.get(rest);
        }
        if let Some(rest) = name.strip_prefix("builtin:") {
            return self.interp.builtin().get(rest);
        }
        if let Some(rest) = name.strip_prefix("E:") {
            return Some(Variable::env(rest));
        }
        if let Some(rest) = name.strip_prefix("e:") {
            // $e:cat~ names the external command unconditionally.
            let base = rest.strip_suffix(FN_SUFFIX)?;
            return Some(Variable::read_only(Value::Fn(Arc::new(ExternalCmd::new(
                base,
            )))));
        }
        if let Some((seg, rest)) = name.split_once(':') {
            if !rest.is_empty() {
                let ns_var = self.resolve(&format!("{seg}:"))?;
                if let Ok(Value::Ns(ns)) = ns_var.get() {
                    return resolve_in_ns(&ns, rest);
                }
                return None;
            }
        }
        self.local
            .get(name)
            .or_else(|| self.up.get(name))
            .or_else(|| self.interp.builtin().get(name))
    }

    pub(crate) fn context(&self, span: Span) -> SourceContext {
        SourceContext {
            src: self.src.clone(),
            span,
        }
    }

    /// Pushes a context level onto the frame's traceback. Form operations do
    /// this before dispatching a call, so failures inside the callee report
    /// the call site.
    pub(crate) fn push_traceback(&mut self, span: Span) {
        self.traceback = Some(Arc::new(Traceback {
            head: self.context(span),
            next: self.traceback.take(),
        }));
    }

    /// Wraps an error with the frame's current traceback.
    pub fn except(&self, err: Error) -> Exception {
        Exception::new(err, self.traceback.clone())
    }

    /// Wraps an error with the frame's traceback extended by `span`. This is
    /// the single boundary where raw errors become exceptions.
    pub fn except_at(&self, span: Span, err: Error) -> Exception {
        let tb = Traceback {
            head: self.context(span),
            next: self.traceback.clone(),
        };
        Exception::new(err, Some(Arc::new(tb)))
    }
}

fn resolve_in_ns(ns: &Ns, name: &str) -> Option<Variable> {
    if let Some((seg, rest)) = name.split_once(':') {
        if !rest.is_empty() {
            let inner = ns.get(&format!("{seg}:"))?;
            if let Ok(Value::Ns(inner)) = inner.get() {
                return resolve_in_ns(&inner, rest);
            }
            return None;
        }
    }
    ns.get(name)
}
