//! Compilation of value expressions.

use std::sync::Arc;

use async_trait::async_trait;
use reef_syntax::ast::{Compound, Indexing, Lambda, Primary, PrimaryKind};
use reef_syntax::Span;

use crate::closure::Closure;
use crate::compile::{CompileError, Compiler, EffectOp, ValuesOp, ValuesOpBody};
use crate::error::{BadValue, Error};
use crate::exception::Exception;
use crate::frame::Frame;
use crate::ns::Ns;
use crate::value::Value;

impl Compiler {
    pub(crate) fn compile_compound(&mut self, compound: &Compound) -> Result<ValuesOp, CompileError> {
        if compound.parts.len() == 1 {
            return self.compile_indexing(&compound.parts[0]);
        }
        let mut parts = Vec::with_capacity(compound.parts.len());
        for part in &compound.parts {
            parts.push(self.compile_indexing(part)?);
        }
        Ok(ValuesOp::new(
            compound.span,
            ConcatOp {
                span: compound.span,
                parts,
            },
        ))
    }

    pub(crate) fn compile_indexing(&mut self, ix: &Indexing) -> Result<ValuesOp, CompileError> {
        let head = self.compile_primary(&ix.head)?;
        if ix.indices.is_empty() {
            return Ok(head);
        }
        let indices = self.compile_compounds(&ix.indices)?;
        Ok(ValuesOp::new(
            ix.span,
            IndexingOp {
                span: ix.span,
                head,
                indices,
            },
        ))
    }

    fn compile_primary(&mut self, primary: &Primary) -> Result<ValuesOp, CompileError> {
        match &primary.kind {
            PrimaryKind::Bareword(s) | PrimaryKind::Quoted(s) => Ok(ValuesOp::new(
                primary.span,
                LiteralOp {
                    value: Value::Str(s.clone()),
                },
            )),
            PrimaryKind::Variable(name) => {
                self.note_var_ref(name);
                Ok(ValuesOp::new(
                    primary.span,
                    VariableOp {
                        span: primary.span,
                        name: name.clone(),
                    },
                ))
            }
            PrimaryKind::List(items) => {
                let items = self.compile_compounds(items)?;
                Ok(ValuesOp::new(primary.span, ListOp { items }))
            }
            PrimaryKind::Lambda(lambda) => self.compile_lambda(lambda, None, false),
        }
    }

    /// Compiles a lambda literal. `name` and `catch_return` are set by the
    /// `fn` special form; bare lambdas pass `return` through.
    pub(crate) fn compile_lambda(
        &mut self,
        lambda: &Lambda,
        name: Option<String>,
        catch_return: bool,
    ) -> Result<ValuesOp, CompileError> {
        let rest = lambda
            .rest
            .clone()
            .map(|r| r.unwrap_or_else(|| "args".to_string()));

        self.push_boundary();
        for param in &lambda.params {
            self.declare(param);
        }
        if let Some(rest) = &rest {
            self.declare(rest);
        }
        for (opt, _) in &lambda.opt_params {
            self.declare(opt);
        }
        let body = self.compile_chunk(&lambda.body);
        let capture_names = self.pop_boundary();
        let body = body?;

        // Option defaults evaluate in the defining scope, at the moment the
        // lambda value is created.
        let mut opt_defaults = Vec::with_capacity(lambda.opt_params.len());
        for (_, default) in &lambda.opt_params {
            opt_defaults.push(self.compile_compound(default)?);
        }

        Ok(ValuesOp::new(
            lambda.span,
            LambdaOp {
                span: lambda.span,
                name,
                catch_return,
                params: lambda.params.clone(),
                rest,
                opt_names: lambda.opt_params.iter().map(|(n, _)| n.clone()).collect(),
                opt_defaults,
                capture_names,
                body,
            },
        ))
    }
}

struct LiteralOp {
    value: Value,
}

#[async_trait]
impl ValuesOpBody for LiteralOp {
    async fn exec(&self, _fm: &mut Frame) -> Result<Vec<Value>, Exception> {
        Ok(vec![self.value.clone()])
    }
}

struct VariableOp {
    span: Span,
    name: String,
}

#[async_trait]
impl ValuesOpBody for VariableOp {
    async fn exec(&self, fm: &mut Frame) -> Result<Vec<Value>, Exception> {
        match fm.resolve(&self.name) {
            Some(var) => Ok(vec![var.get().map_err(|e| fm.except_at(self.span, e))?]),
            None => Err(fm.except_at(self.span, Error::VariableNotFound(self.name.clone()))),
        }
    }
}

/// Concatenation of several parts into one string.
struct ConcatOp {
    span: Span,
    parts: Vec<ValuesOp>,
}

#[async_trait]
impl ValuesOpBody for ConcatOp {
    async fn exec(&self, fm: &mut Frame) -> Result<Vec<Value>, Exception> {
        let mut out = String::new();
        for part in &self.parts {
            let value = part.exec_one(fm).await?;
            match value.to_text() {
                Some(s) => out.push_str(&s),
                None => {
                    return Err(fm.except_at(
                        self.span,
                        BadValue::new("concatenated part", "string or number", value.kind())
                            .into(),
                    ));
                }
            }
        }
        Ok(vec![Value::Str(out)])
    }
}

struct ListOp {
    items: Vec<ValuesOp>,
}

#[async_trait]
impl ValuesOpBody for ListOp {
    async fn exec(&self, fm: &mut Frame) -> Result<Vec<Value>, Exception> {
        let mut items = Vec::new();
        for item in &self.items {
            items.extend(item.exec(fm).await?);
        }
        Ok(vec![items.into_iter().collect()])
    }
}

struct IndexingOp {
    span: Span,
    head: ValuesOp,
    indices: Vec<ValuesOp>,
}

#[async_trait]
impl ValuesOpBody for IndexingOp {
    async fn exec(&self, fm: &mut Frame) -> Result<Vec<Value>, Exception> {
        let mut value = self.head.exec_one(fm).await?;
        for index in &self.indices {
            let idx = index.exec_one(fm).await?;
            value = value
                .index(&idx)
                .map_err(|e| fm.except_at(self.span, e))?;
        }
        Ok(vec![value])
    }
}

/// Creates a closure value, capturing the recorded variables by handle from
/// the frame the lambda expression evaluates in.
struct LambdaOp {
    span: Span,
    name: Option<String>,
    catch_return: bool,
    params: Vec<String>,
    rest: Option<String>,
    opt_names: Vec<String>,
    opt_defaults: Vec<ValuesOp>,
    capture_names: Vec<String>,
    body: EffectOp,
}

#[async_trait]
impl ValuesOpBody for LambdaOp {
    async fn exec(&self, fm: &mut Frame) -> Result<Vec<Value>, Exception> {
        let captured = Ns::new();
        for name in &self.capture_names {
            if let Some(var) = fm.resolve(name) {
                // The handle is captured, not the value: the closure and
                // the defining scope share the cell.
                captured.assign(name.clone(), var);
            }
        }
        let mut defaults = Vec::with_capacity(self.opt_defaults.len());
        for op in &self.opt_defaults {
            defaults.push(op.exec_one(fm).await?);
        }
        Ok(vec![Value::Fn(Arc::new(Closure {
            name: self.name.clone(),
            params: self.params.clone(),
            rest: self.rest.clone(),
            opt_names: self.opt_names.clone(),
            opt_defaults: defaults,
            body: self.body.clone(),
            captured,
            src: fm.src.clone(),
            def_span: self.span,
            catch_return: self.catch_return,
        }))])
    }
}
