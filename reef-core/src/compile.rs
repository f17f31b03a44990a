//! Compilation from syntax trees to executable operations, and the pipeline
//! execution engine.
//!
//! Compilation walks the tree once, resolving special forms, recording which
//! variables each lambda captures, and producing a tree of `Arc`-shared
//! operations. Operations are cheap to clone, which is what lets pipeline
//! stages run them on independently scheduled tasks.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexSet;
use reef_syntax::ast::{Chunk, Form, Pipeline, Redir, RedirMode};
use reef_syntax::{Source, Span};

use crate::commands::{to_callable, OptMap};
use crate::error::{ArityMismatch, BadValue, Error};
use crate::exception::{Exception, PipelineError, PipelineOutcome};
use crate::external_cmd::ExternalCmd;
use crate::frame::Frame;
use crate::interrupts::Interrupts;
use crate::ns::{Ns, FN_SUFFIX};
use crate::port::{OpenFile, Port};
use crate::special;
use crate::value::Value;
use crate::vars::Variable;

/// A static error found while compiling.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
#[error("compile error: {message} ({src_name}:{span})")]
pub struct CompileError {
    pub message: String,
    pub src_name: String,
    pub span: Span,
}

/// An operation executed for its effects on the frame's ports and
/// namespaces.
#[derive(Clone)]
pub struct EffectOp {
    span: Span,
    body: Arc<dyn EffectOpBody>,
}

#[async_trait]
pub(crate) trait EffectOpBody: Send + Sync {
    async fn exec(&self, fm: &mut Frame) -> Result<(), Exception>;
}

impl EffectOp {
    pub(crate) fn new(span: Span, body: impl EffectOpBody + 'static) -> Self {
        Self {
            span,
            body: Arc::new(body),
        }
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub(crate) async fn exec(&self, fm: &mut Frame) -> Result<(), Exception> {
        self.body.exec(fm).await
    }
}

/// An operation that evaluates to zero or more values.
#[derive(Clone)]
pub(crate) struct ValuesOp {
    pub(crate) span: Span,
    body: Arc<dyn ValuesOpBody>,
}

#[async_trait]
pub(crate) trait ValuesOpBody: Send + Sync {
    async fn exec(&self, fm: &mut Frame) -> Result<Vec<Value>, Exception>;
}

impl ValuesOp {
    pub(crate) fn new(span: Span, body: impl ValuesOpBody + 'static) -> Self {
        Self {
            span,
            body: Arc::new(body),
        }
    }

    pub(crate) async fn exec(&self, fm: &mut Frame) -> Result<Vec<Value>, Exception> {
        self.body.exec(fm).await
    }

    /// Evaluates and requires exactly one value.
    pub(crate) async fn exec_one(&self, fm: &mut Frame) -> Result<Value, Exception> {
        let mut values = self.exec(fm).await?;
        if values.len() == 1 {
            Ok(values.pop().unwrap_or_default())
        } else {
            Err(fm.except_at(
                self.span,
                ArityMismatch::exact("the expression here", 1, values.len()).into(),
            ))
        }
    }
}

/// An operation that evaluates to an assignable variable.
#[derive(Clone)]
pub(crate) struct LValueOp {
    pub(crate) span: Span,
    body: Arc<dyn LValueOpBody>,
}

#[async_trait]
pub(crate) trait LValueOpBody: Send + Sync {
    async fn exec(&self, fm: &mut Frame) -> Result<Variable, Exception>;
}

impl LValueOp {
    pub(crate) fn new(span: Span, body: impl LValueOpBody + 'static) -> Self {
        Self {
            span,
            body: Arc::new(body),
        }
    }

    pub(crate) async fn exec(&self, fm: &mut Frame) -> Result<Variable, Exception> {
        self.body.exec(fm).await
    }
}

/// Compiles a chunk against the given global namespace.
pub(crate) fn compile(
    global: &Ns,
    chunk: &Chunk,
    src: Arc<Source>,
) -> Result<EffectOp, CompileError> {
    let mut cp = Compiler::new(global, src);
    cp.compile_chunk(chunk)
}

struct Scope {
    names: HashSet<String>,
    /// Whether this scope is a lambda body. Resolving a name across a
    /// boundary records it in the lambda's capture set.
    boundary: bool,
}

pub(crate) struct Compiler {
    pub(crate) src: Arc<Source>,
    scopes: Vec<Scope>,
    /// One capture set per boundary scope currently open, outermost first.
    captures: Vec<IndexSet<String>>,
}

impl Compiler {
    fn new(global: &Ns, src: Arc<Source>) -> Self {
        Self {
            src,
            scopes: vec![Scope {
                names: global.names().into_iter().collect(),
                boundary: false,
            }],
            captures: vec![],
        }
    }

    pub(crate) fn error(&self, span: Span, message: impl Into<String>) -> CompileError {
        CompileError {
            message: message.into(),
            src_name: self.src.name.clone(),
            span,
        }
    }

    /// Declares a name in the innermost scope.
    pub(crate) fn declare(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.names.insert(name.to_string());
        }
    }

    /// Removes a name from the innermost scope that has it.
    pub(crate) fn undeclare(&mut self, name: &str) {
        for scope in self.scopes.iter_mut().rev() {
            if scope.names.remove(name) {
                return;
            }
        }
    }

    pub(crate) fn is_declared(&self, name: &str) -> bool {
        self.scopes.iter().any(|s| s.names.contains(name))
    }

    pub(crate) fn push_boundary(&mut self) {
        self.scopes.push(Scope {
            names: HashSet::new(),
            boundary: true,
        });
        self.captures.push(IndexSet::new());
    }

    pub(crate) fn pop_boundary(&mut self) -> Vec<String> {
        self.scopes.pop();
        self.captures
            .pop()
            .map(|set| set.into_iter().collect())
            .unwrap_or_default()
    }

    /// Records that the current position references `name`. When the name
    /// resolves across one or more lambda boundaries, each crossed lambda
    /// must capture it so the innermost one can reach the defining cell at
    /// runtime.
    pub(crate) fn note_var_ref(&mut self, name: &str) {
        let Some(base) = capture_base(name) else {
            return;
        };
        let mut crossed = 0;
        for scope in self.scopes.iter().rev() {
            if scope.names.contains(&base) {
                if crossed > 0 {
                    let total = self.captures.len();
                    for set in &mut self.captures[total - crossed..] {
                        set.insert(base.clone());
                    }
                }
                return;
            }
            if scope.boundary {
                crossed += 1;
            }
        }
        // Not statically known: a builtin, or resolved (or not) at runtime.
    }

    pub(crate) fn compile_chunk(&mut self, chunk: &Chunk) -> Result<EffectOp, CompileError> {
        let mut pipelines = Vec::with_capacity(chunk.pipelines.len());
        for pipeline in &chunk.pipelines {
            pipelines.push(self.compile_pipeline(pipeline)?);
        }
        Ok(EffectOp::new(
            chunk.span,
            ChunkOp {
                span: chunk.span,
                pipelines,
            },
        ))
    }

    fn compile_pipeline(&mut self, pipeline: &Pipeline) -> Result<EffectOp, CompileError> {
        let mut forms = Vec::with_capacity(pipeline.forms.len());
        for form in &pipeline.forms {
            forms.push(self.compile_form(form)?);
        }
        let source = if self.src.code.is_empty() {
            pipeline.to_string()
        } else {
            self.src.text(pipeline.span).to_string()
        };
        Ok(EffectOp::new(
            pipeline.span,
            PipelineOp {
                span: pipeline.span,
                background: pipeline.background,
                source,
                forms,
            },
        ))
    }

    fn compile_form(&mut self, form: &Form) -> Result<EffectOp, CompileError> {
        let body = match form.head.literal_text() {
            Some(head) if special::is_special_form(head) => {
                FormBody::Special(special::compile_special(self, form, head)?)
            }
            Some(head) => {
                // A literal head resolves through the function variable
                // `head~` at call time; record it for capture now.
                self.note_var_ref(&format!("{head}{FN_SUFFIX}"));
                FormBody::Ordinary {
                    head: ValuesOp::new(
                        form.head.span,
                        HeadOp {
                            span: form.head.span,
                            name: head.to_string(),
                        },
                    ),
                    args: self.compile_compounds(&form.args)?,
                    opts: self.compile_opts(form)?,
                }
            }
            None => FormBody::Ordinary {
                head: self.compile_compound(&form.head)?,
                args: self.compile_compounds(&form.args)?,
                opts: self.compile_opts(form)?,
            },
        };
        let mut redirs = Vec::with_capacity(form.redirs.len());
        for redir in &form.redirs {
            redirs.push(self.compile_redir(redir)?);
        }
        Ok(EffectOp::new(
            form.span,
            FormOp {
                span: form.span,
                redirs,
                body,
            },
        ))
    }

    pub(crate) fn compile_compounds(
        &mut self,
        compounds: &[reef_syntax::ast::Compound],
    ) -> Result<Vec<ValuesOp>, CompileError> {
        compounds.iter().map(|c| self.compile_compound(c)).collect()
    }

    fn compile_opts(&mut self, form: &Form) -> Result<Vec<(String, ValuesOp)>, CompileError> {
        form.opts
            .iter()
            .map(|opt| Ok((opt.name.clone(), self.compile_compound(&opt.value)?)))
            .collect()
    }

    fn compile_redir(&mut self, redir: &Redir) -> Result<RedirOp, CompileError> {
        Ok(RedirOp {
            span: redir.span,
            dest: redir
                .dest
                .as_ref()
                .map(|d| self.compile_compound(d))
                .transpose()?,
            mode: redir.mode,
            source: self.compile_compound(&redir.source)?,
            source_is_fd: redir.source_is_fd,
        })
    }
}

fn capture_base(name: &str) -> Option<String> {
    if name.starts_with("E:") || name.starts_with("e:") || name.starts_with("builtin:") {
        return None;
    }
    let name = name
        .strip_prefix("local:")
        .or_else(|| name.strip_prefix("up:"))
        .unwrap_or(name);
    match name.split_once(':') {
        Some((seg, rest)) if !rest.is_empty() => Some(format!("{seg}:")),
        _ => Some(name.to_string()),
    }
}

struct ChunkOp {
    span: Span,
    pipelines: Vec<EffectOp>,
}

#[async_trait]
impl EffectOpBody for ChunkOp {
    async fn exec(&self, fm: &mut Frame) -> Result<(), Exception> {
        for pipeline in &self.pipelines {
            pipeline.exec(fm).await?;
        }
        // Interrupts raised during the last pipeline surface here rather
        // than silently succeeding.
        if fm.canceled() {
            return Err(fm.except_at(self.span, Error::Interrupted));
        }
        Ok(())
    }
}

struct PipelineOp {
    span: Span,
    background: bool,
    /// The pipeline's source text, used to describe background jobs.
    source: String,
    forms: Vec<EffectOp>,
}

#[async_trait]
impl EffectOpBody for PipelineOp {
    async fn exec(&self, fm: &mut Frame) -> Result<(), Exception> {
        if fm.canceled() {
            return Err(fm.except_at(self.span, Error::Interrupted));
        }

        // Background pipelines detach from the foreground interrupt at fork
        // time; an interrupt aimed at the foreground never reaches them.
        let bg_base = if self.background {
            let mut base = fm.fork().map_err(|e| fm.except_at(self.span, e))?;
            base.interrupts = Interrupts::detached();
            base.background = true;
            Some(base)
        } else {
            None
        };

        let n = self.forms.len();
        let mut handles = Vec::with_capacity(n);
        let mut next_input: Option<Port> = None;
        for (i, form) in self.forms.iter().enumerate() {
            let mut stage_fm = match &bg_base {
                Some(base) => base.fork(),
                None => fm.fork(),
            }
            .map_err(|e| fm.except_at(self.span, e))?;

            let reads_pipe = next_input.is_some();
            if let Some(input) = next_input.take() {
                stage_fm.ports[0] = input;
            }
            let writes_pipe = i + 1 < n;
            if writes_pipe {
                let (write, read) = Port::pipe().map_err(|e| fm.except_at(self.span, e))?;
                stage_fm.ports[1] = write;
                next_input = Some(read);
            }

            let op = form.clone();
            handles.push(tokio::spawn(async move {
                let mut result = op.exec(&mut stage_fm).await;
                if writes_pipe {
                    // A downstream stage that exited without reading its
                    // input is not this stage's failure.
                    if matches!(&result, Err(exc) if exc.is_reader_gone()) {
                        result = Ok(());
                    }
                }
                if reads_pipe {
                    // Unblock any upstream producer still waiting on us.
                    stage_fm.ports[0].close_input().await;
                }
                drop(stage_fm);
                result
            }));
        }
        drop(bg_base);

        if self.background {
            let interp = fm.interp.clone();
            let description = self.source.clone();
            let id = interp.jobs().add_background(description.clone());
            tracing::debug!(job = id, desc = %description, "background pipeline started");
            tokio::spawn(async move {
                let mut stages = Vec::with_capacity(handles.len());
                for handle in handles {
                    stages.push(join_to_stage(handle.await));
                }
                let result = match PipelineError::compose(stages) {
                    PipelineOutcome::Ok => Ok(()),
                    PipelineOutcome::Single(exc) => Err(exc),
                    PipelineOutcome::Aggregate(pe) => Err(Exception::new(pe.into(), None)),
                };
                interp.finish_background(id, description, result);
            });
            return Ok(());
        }

        let grace = fm.interp.options().interrupt_grace;
        let interrupts = fm.interrupts.clone();
        let mut stages: Vec<Option<Exception>> = Vec::with_capacity(n);
        let mut deadline: Option<tokio::time::Instant> = None;
        for mut handle in handles {
            let outcome = match deadline {
                Some(at) => match tokio::time::timeout_at(at, &mut handle).await {
                    Ok(join) => join_to_stage(join),
                    // Past the grace deadline: give up on the stage but let
                    // its task wind down on its own.
                    Err(_) => Some(fm.except_at(self.span, Error::StillRunning)),
                },
                None => {
                    tokio::select! {
                        join = &mut handle => join_to_stage(join),
                        _ = interrupts.raised() => {
                            let at = tokio::time::Instant::now() + grace;
                            deadline = Some(at);
                            match tokio::time::timeout_at(at, &mut handle).await {
                                Ok(join) => join_to_stage(join),
                                Err(_) => Some(fm.except_at(self.span, Error::StillRunning)),
                            }
                        }
                    }
                }
            };
            stages.push(outcome);
        }

        match PipelineError::compose(stages) {
            PipelineOutcome::Ok => Ok(()),
            PipelineOutcome::Single(exc) => Err(exc),
            PipelineOutcome::Aggregate(pe) => Err(fm.except_at(self.span, pe.into())),
        }
    }
}

fn join_to_stage(
    join: Result<Result<(), Exception>, tokio::task::JoinError>,
) -> Option<Exception> {
    match join {
        Ok(Ok(())) => None,
        Ok(Err(exc)) => Some(exc),
        Err(err) => Some(Exception::new(Error::TaskJoin(err), None)),
    }
}

pub(crate) enum FormBody {
    /// A special form; evaluation was resolved at compile time.
    Special(EffectOp),
    /// An ordinary call: evaluate head, arguments and options, then
    /// dispatch.
    Ordinary {
        head: ValuesOp,
        args: Vec<ValuesOp>,
        opts: Vec<(String, ValuesOp)>,
    },
}

struct FormOp {
    span: Span,
    redirs: Vec<RedirOp>,
    body: FormBody,
}

#[async_trait]
impl EffectOpBody for FormOp {
    async fn exec(&self, fm: &mut Frame) -> Result<(), Exception> {
        if self.redirs.is_empty() {
            return self.exec_body(fm).await;
        }
        // Redirections apply to a forked frame so the surrounding ports are
        // untouched; replacing a port slot drops (closes) the previous
        // duplicate exactly once.
        let mut redirected = fm.fork().map_err(|e| fm.except_at(self.span, e))?;
        for redir in &self.redirs {
            redir.apply(&mut redirected).await?;
        }
        self.exec_body(&mut redirected).await
    }
}

impl FormOp {
    async fn exec_body(&self, fm: &mut Frame) -> Result<(), Exception> {
        match &self.body {
            FormBody::Special(op) => op.exec(fm).await,
            FormBody::Ordinary { head, args, opts } => {
                let head_value = head.exec_one(fm).await?;
                let callable = to_callable(&head_value)
                    .map_err(|e| fm.except_at(self.span, e.into()))?;
                let mut arg_values = Vec::new();
                for arg in args {
                    arg_values.extend(arg.exec(fm).await?);
                }
                let mut opt_map = OptMap::new();
                for (name, op) in opts {
                    opt_map.insert(name.clone(), op.exec_one(fm).await?);
                }
                fm.push_traceback(self.span);
                tracing::trace!(cmd = callable.name(), "dispatching call");
                callable.call(fm, arg_values, opt_map).await
            }
        }
    }
}

/// The head of a form with a literal name: resolves the function variable
/// `name~`, falling back to an external command.
struct HeadOp {
    span: Span,
    name: String,
}

#[async_trait]
impl ValuesOpBody for HeadOp {
    async fn exec(&self, fm: &mut Frame) -> Result<Vec<Value>, Exception> {
        if let Some(var) = fm.resolve(&format!("{}{}", self.name, FN_SUFFIX)) {
            let value = var.get().map_err(|e| fm.except_at(self.span, e))?;
            return Ok(vec![value]);
        }
        Ok(vec![Value::Fn(Arc::new(ExternalCmd::new(self.name.clone())))])
    }
}

/// The highest descriptor a redirection may target. The port table grows to
/// the destination index, so unbounded destinations would let a typo
/// allocate an enormous table.
const MAX_REDIR_FD: usize = 1023;

struct RedirOp {
    span: Span,
    dest: Option<ValuesOp>,
    mode: RedirMode,
    source: ValuesOp,
    source_is_fd: bool,
}

impl RedirOp {
    async fn apply(&self, fm: &mut Frame) -> Result<(), Exception> {
        let dst = match &self.dest {
            None => match self.mode {
                RedirMode::Read => 0,
                RedirMode::Write | RedirMode::Append | RedirMode::ReadWrite => 1,
            },
            Some(op) => {
                let value = op.exec_one(fm).await?;
                parse_fd(&value).map_err(|e| fm.except_at(self.span, e))?
            }
        };
        if dst > MAX_REDIR_FD {
            return Err(fm.except_at(self.span, Error::InvalidFd(dst.to_string())));
        }
        while fm.ports.len() <= dst {
            fm.ports.push(Port::default());
        }

        let source = self.source.exec_one(fm).await?;
        let port = if self.source_is_fd {
            match source.to_text().as_deref() {
                Some("-") => Port::default(),
                _ => {
                    let src_fd = parse_fd(&source).map_err(|e| fm.except_at(self.span, e))?;
                    match fm.port(src_fd) {
                        Some(p) => p.try_clone().map_err(|e| fm.except_at(self.span, e))?,
                        None => {
                            return Err(fm.except_at(
                                self.span,
                                Error::InvalidFd(src_fd.to_string()),
                            ));
                        }
                    }
                }
            }
        } else {
            self.open_source(&source)
                .map_err(|e| fm.except_at(self.span, e))?
        };
        fm.ports[dst] = port;
        Ok(())
    }

    fn open_source(&self, source: &Value) -> Result<Port, Error> {
        let reading = matches!(self.mode, RedirMode::Read);
        let file = match source {
            Value::Str(path) => match self.mode {
                RedirMode::Read => std::fs::File::open(path)?,
                RedirMode::Write => std::fs::File::create(path)?,
                RedirMode::Append => std::fs::File::options()
                    .append(true)
                    .create(true)
                    .open(path)?,
                RedirMode::ReadWrite => std::fs::File::options()
                    .read(true)
                    .write(true)
                    .create(true)
                    .open(path)?,
            },
            Value::File(f) => f.try_clone()?,
            Value::Pipe(p) => {
                if reading {
                    p.reader.try_clone()?
                } else {
                    p.writer.try_clone()?
                }
            }
            other => {
                return Err(BadValue::new(
                    "redirection source",
                    "string, file or pipe",
                    other.kind(),
                )
                .into());
            }
        };
        Ok(if reading {
            Port::file_input(OpenFile::File(file))
        } else {
            Port::file_output(OpenFile::File(file))
        })
    }
}

fn parse_fd(value: &Value) -> Result<usize, Error> {
    match value {
        Value::Int(n) if *n >= 0 => Ok(*n as usize),
        Value::Str(s) => match s.as_str() {
            "stdin" => Ok(0),
            "stdout" => Ok(1),
            "stderr" => Ok(2),
            _ => s
                .parse::<usize>()
                .map_err(|_| Error::InvalidFd(s.clone())),
        },
        other => Err(Error::InvalidFd(other.repr())),
    }
}
