//! Special forms: heads resolved at compile time rather than dispatched as
//! calls. Their arguments are syntax, not values; each form walks them with
//! an [`ArgWalker`] and produces a dedicated operation.

use async_trait::async_trait;
use reef_syntax::ast::{Compound, Form, Lambda, PrimaryKind};
use reef_syntax::Span;

use crate::commands::OptMap;
use crate::compile::{
    CompileError, Compiler, EffectOp, EffectOpBody, LValueOp, ValuesOp,
};
use crate::compile_lvalue::LValueMode;
use crate::error::{ArityMismatch, BadValue, Error, Flow};
use crate::exception::Exception;
use crate::frame::Frame;
use crate::ns::FN_SUFFIX;
use crate::value::Value;
use crate::vars::Variable;

pub(crate) fn is_special_form(name: &str) -> bool {
    matches!(
        name,
        "var" | "set" | "del" | "fn" | "if" | "while" | "for" | "and" | "or"
    )
}

pub(crate) fn compile_special(
    cp: &mut Compiler,
    form: &Form,
    head: &str,
) -> Result<EffectOp, CompileError> {
    match head {
        "var" => compile_var(cp, form),
        "set" => compile_set(cp, form),
        "del" => compile_del(cp, form),
        "fn" => compile_fn(cp, form),
        "if" => compile_if(cp, form),
        "while" => compile_while(cp, form),
        "for" => compile_for(cp, form),
        "and" => compile_and_or(cp, form, true),
        "or" => compile_and_or(cp, form, false),
        _ => Err(cp.error(form.span, format!("not a special form: {head}"))),
    }
}

/// A cursor over a form's positional arguments.
struct ArgWalker<'a> {
    form: &'a Form,
    idx: usize,
}

impl<'a> ArgWalker<'a> {
    fn new(form: &'a Form) -> Self {
        Self { form, idx: 0 }
    }

    fn peek(&self) -> Option<&'a Compound> {
        self.form.args.get(self.idx)
    }

    fn next(&mut self, cp: &Compiler, what: &str) -> Result<&'a Compound, CompileError> {
        match self.form.args.get(self.idx) {
            Some(arg) => {
                self.idx += 1;
                Ok(arg)
            }
            None => Err(cp.error(self.form.span, format!("missing {what}"))),
        }
    }

    fn next_literal(&mut self, cp: &Compiler, what: &str) -> Result<(&'a str, Span), CompileError> {
        let arg = self.next(cp, what)?;
        match arg.literal_text() {
            Some(text) => Ok((text, arg.span)),
            None => Err(cp.error(arg.span, format!("{what} must be a literal word"))),
        }
    }

    fn next_lambda(&mut self, cp: &Compiler, what: &str) -> Result<&'a Lambda, CompileError> {
        let arg = self.next(cp, what)?;
        as_lambda(arg).ok_or_else(|| cp.error(arg.span, format!("{what} must be a lambda")))
    }

    /// Consumes the next argument if it is the given keyword.
    fn accept_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().and_then(Compound::literal_text) == Some(keyword) {
            self.idx += 1;
            true
        } else {
            false
        }
    }

    fn finish(&self, cp: &Compiler) -> Result<(), CompileError> {
        match self.peek() {
            Some(extra) => Err(cp.error(extra.span, "unexpected argument")),
            None => Ok(()),
        }
    }
}

fn as_lambda(compound: &Compound) -> Option<&Lambda> {
    match compound.parts.as_slice() {
        [part] if part.indices.is_empty() => match &part.head.kind {
            PrimaryKind::Lambda(lambda) => Some(lambda),
            _ => None,
        },
        _ => None,
    }
}

fn compile_var(cp: &mut Compiler, form: &Form) -> Result<EffectOp, CompileError> {
    compile_assignment(cp, form, LValueMode::Declare, false)
}

fn compile_set(cp: &mut Compiler, form: &Form) -> Result<EffectOp, CompileError> {
    compile_assignment(cp, form, LValueMode::Mutate, true)
}

/// Shared by `var` and `set`: targets, an optional `=`, then value
/// expressions. The right-hand side compiles before the targets declare, so
/// `var x = $x` still refers to the outer `x`.
fn compile_assignment(
    cp: &mut Compiler,
    form: &Form,
    mode: LValueMode,
    require_rhs: bool,
) -> Result<EffectOp, CompileError> {
    let mut targets: Vec<&Compound> = vec![];
    let mut rhs_args: Vec<&Compound> = vec![];
    let mut seen_eq = false;
    for arg in &form.args {
        if !seen_eq && arg.literal_text() == Some("=") {
            seen_eq = true;
            continue;
        }
        if seen_eq {
            rhs_args.push(arg);
        } else {
            targets.push(arg);
        }
    }
    if require_rhs && !seen_eq {
        return Err(cp.error(form.span, "missing = in assignment"));
    }
    if targets.is_empty() {
        return Err(cp.error(form.span, "missing assignment target"));
    }

    let mut rhs = Vec::with_capacity(rhs_args.len());
    for arg in rhs_args {
        rhs.push(cp.compile_compound(arg)?);
    }
    let mut lvalues = Vec::with_capacity(targets.len());
    for target in targets {
        lvalues.push(cp.compile_lvalue(target, mode)?);
    }
    Ok(EffectOp::new(
        form.span,
        AssignOp {
            span: form.span,
            lvalues,
            rhs,
            has_rhs: seen_eq,
        },
    ))
}

struct AssignOp {
    span: Span,
    lvalues: Vec<LValueOp>,
    rhs: Vec<ValuesOp>,
    has_rhs: bool,
}

#[async_trait]
impl EffectOpBody for AssignOp {
    async fn exec(&self, fm: &mut Frame) -> Result<(), Exception> {
        if !self.has_rhs {
            // Bare `var x`: create the cells, initialized to nil.
            for lvalue in &self.lvalues {
                lvalue.exec(fm).await?;
            }
            return Ok(());
        }
        let mut values = Vec::with_capacity(self.rhs.len());
        for op in &self.rhs {
            values.extend(op.exec(fm).await?);
        }
        if values.len() != self.lvalues.len() {
            return Err(fm.except_at(
                self.span,
                ArityMismatch::exact("assigned values", self.lvalues.len(), values.len()).into(),
            ));
        }
        for (lvalue, value) in self.lvalues.iter().zip(values) {
            let var = lvalue.exec(fm).await?;
            var.set(value).map_err(|e| fm.except_at(lvalue.span, e))?;
        }
        Ok(())
    }
}

fn compile_del(cp: &mut Compiler, form: &Form) -> Result<EffectOp, CompileError> {
    let mut names = Vec::with_capacity(form.args.len());
    for arg in &form.args {
        let Some(name) = arg.literal_text() else {
            return Err(cp.error(arg.span, "del takes literal variable names"));
        };
        if name.contains(':') {
            return Err(cp.error(arg.span, "del only works on local variables"));
        }
        if !cp.is_declared(name) {
            return Err(cp.error(arg.span, format!("no variable ${name}")));
        }
        cp.undeclare(name);
        names.push(name.to_string());
    }
    if names.is_empty() {
        return Err(cp.error(form.span, "missing variable name"));
    }
    Ok(EffectOp::new(form.span, DelOp { names }))
}

struct DelOp {
    names: Vec<String>,
}

#[async_trait]
impl EffectOpBody for DelOp {
    async fn exec(&self, fm: &mut Frame) -> Result<(), Exception> {
        for name in &self.names {
            // Existing handles to the variable keep working; only the
            // binding goes away.
            fm.local.del(name);
        }
        Ok(())
    }
}

fn compile_fn(cp: &mut Compiler, form: &Form) -> Result<EffectOp, CompileError> {
    let mut args = ArgWalker::new(form);
    let (name, _) = args.next_literal(cp, "function name")?;
    let lambda = args.next_lambda(cp, "function body")?;
    args.finish(cp)?;

    let var_name = format!("{name}{FN_SUFFIX}");
    // Declare before compiling the body so the function can call itself;
    // the closure captures the cell created just before it is built.
    cp.declare(&var_name);
    let lambda_op = cp.compile_lambda(lambda, Some(name.to_string()), true)?;
    Ok(EffectOp::new(
        form.span,
        FnOp {
            var_name,
            lambda: lambda_op,
        },
    ))
}

struct FnOp {
    var_name: String,
    lambda: ValuesOp,
}

#[async_trait]
impl EffectOpBody for FnOp {
    async fn exec(&self, fm: &mut Frame) -> Result<(), Exception> {
        let var = Variable::new(Value::Nil);
        fm.local.assign(self.var_name.clone(), var.clone());
        let value = self.lambda.exec_one(fm).await?;
        var.set(value)
            .map_err(|e| fm.except_at(self.lambda.span, e))?;
        Ok(())
    }
}

fn compile_if(cp: &mut Compiler, form: &Form) -> Result<EffectOp, CompileError> {
    let mut args = ArgWalker::new(form);
    let mut branches = vec![];
    loop {
        let cond = cp.compile_compound(args.next(cp, "condition")?)?;
        let body = cp.compile_lambda(args.next_lambda(cp, "branch body")?, None, false)?;
        branches.push((cond, body));
        if !args.accept_keyword("elif") {
            break;
        }
    }
    let else_body = if args.accept_keyword("else") {
        Some(cp.compile_lambda(args.next_lambda(cp, "else body")?, None, false)?)
    } else {
        None
    };
    args.finish(cp)?;
    Ok(EffectOp::new(
        form.span,
        IfOp {
            span: form.span,
            branches,
            else_body,
        },
    ))
}

struct IfOp {
    span: Span,
    branches: Vec<(ValuesOp, ValuesOp)>,
    else_body: Option<ValuesOp>,
}

#[async_trait]
impl EffectOpBody for IfOp {
    async fn exec(&self, fm: &mut Frame) -> Result<(), Exception> {
        for (cond, body) in &self.branches {
            if cond.exec_one(fm).await?.truthy() {
                return call_body(fm, body, self.span).await;
            }
        }
        match &self.else_body {
            Some(body) => call_body(fm, body, self.span).await,
            None => Ok(()),
        }
    }
}

fn compile_while(cp: &mut Compiler, form: &Form) -> Result<EffectOp, CompileError> {
    let mut args = ArgWalker::new(form);
    let cond = cp.compile_compound(args.next(cp, "condition")?)?;
    let body = cp.compile_lambda(args.next_lambda(cp, "loop body")?, None, false)?;
    args.finish(cp)?;
    Ok(EffectOp::new(
        form.span,
        WhileOp {
            span: form.span,
            cond,
            body,
        },
    ))
}

struct WhileOp {
    span: Span,
    cond: ValuesOp,
    body: ValuesOp,
}

#[async_trait]
impl EffectOpBody for WhileOp {
    async fn exec(&self, fm: &mut Frame) -> Result<(), Exception> {
        loop {
            if fm.canceled() {
                return Err(fm.except_at(self.span, Error::Interrupted));
            }
            if !self.cond.exec_one(fm).await?.truthy() {
                return Ok(());
            }
            match call_body(fm, &self.body, self.span).await {
                Ok(()) => {}
                Err(exc) if exc.is_flow(Flow::Break) => return Ok(()),
                Err(exc) if exc.is_flow(Flow::Continue) => {}
                Err(exc) => return Err(exc),
            }
        }
    }
}

fn compile_for(cp: &mut Compiler, form: &Form) -> Result<EffectOp, CompileError> {
    let mut args = ArgWalker::new(form);
    let lvalue = cp.compile_lvalue(args.next(cp, "loop variable")?, LValueMode::Declare)?;
    let iterable = cp.compile_compound(args.next(cp, "iterable")?)?;
    let body = cp.compile_lambda(args.next_lambda(cp, "loop body")?, None, false)?;
    args.finish(cp)?;
    Ok(EffectOp::new(
        form.span,
        ForOp {
            span: form.span,
            lvalue,
            iterable,
            body,
        },
    ))
}

struct ForOp {
    span: Span,
    lvalue: LValueOp,
    iterable: ValuesOp,
    body: ValuesOp,
}

#[async_trait]
impl EffectOpBody for ForOp {
    async fn exec(&self, fm: &mut Frame) -> Result<(), Exception> {
        let var = self.lvalue.exec(fm).await?;
        let iterable = self.iterable.exec_one(fm).await?;
        let items: Vec<Value> = match &iterable {
            Value::List(items) => items.iter().cloned().collect(),
            other => {
                return Err(fm.except_at(
                    self.span,
                    BadValue::new("iterable", "list", other.kind()).into(),
                ));
            }
        };
        for item in items {
            if fm.canceled() {
                return Err(fm.except_at(self.span, Error::Interrupted));
            }
            var.set(item).map_err(|e| fm.except_at(self.span, e))?;
            match call_body(fm, &self.body, self.span).await {
                Ok(()) => {}
                Err(exc) if exc.is_flow(Flow::Break) => return Ok(()),
                Err(exc) if exc.is_flow(Flow::Continue) => {}
                Err(exc) => return Err(exc),
            }
        }
        Ok(())
    }
}

fn compile_and_or(cp: &mut Compiler, form: &Form, is_and: bool) -> Result<EffectOp, CompileError> {
    let mut args = Vec::with_capacity(form.args.len());
    for arg in &form.args {
        args.push(cp.compile_compound(arg)?);
    }
    Ok(EffectOp::new(
        form.span,
        AndOrOp {
            span: form.span,
            is_and,
            args,
        },
    ))
}

/// `and` outputs the first false value or the last value; `or` outputs the
/// first true value or the last value. Evaluation short-circuits.
struct AndOrOp {
    span: Span,
    is_and: bool,
    args: Vec<ValuesOp>,
}

#[async_trait]
impl EffectOpBody for AndOrOp {
    async fn exec(&self, fm: &mut Frame) -> Result<(), Exception> {
        let mut last = Value::Bool(self.is_and);
        for op in &self.args {
            last = op.exec_one(fm).await?;
            if last.truthy() != self.is_and {
                break;
            }
        }
        fm.put(last).await.map_err(|e| fm.except_at(self.span, e))
    }
}

/// Evaluates a compiled body lambda and calls it with no arguments. The
/// lambda value is built fresh for each call, so closures defined inside a
/// loop body capture that iteration's cells.
async fn call_body(fm: &mut Frame, body: &ValuesOp, span: Span) -> Result<(), Exception> {
    let value = body.exec_one(fm).await?;
    let Some(f) = value.as_callable() else {
        return Err(fm.except_at(
            span,
            BadValue::new("body", "fn", value.kind()).into(),
        ));
    };
    f.call(fm, vec![], OptMap::new()).await
}
