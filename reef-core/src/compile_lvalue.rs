//! Compilation of assignment targets.

use async_trait::async_trait;
use reef_syntax::ast::{Compound, PrimaryKind};
use reef_syntax::Span;

use crate::compile::{CompileError, Compiler, LValueOp, LValueOpBody, ValuesOp};
use crate::error::Error;
use crate::exception::Exception;
use crate::frame::Frame;
use crate::value::Value;
use crate::vars::Variable;

/// How an assignment target treats its name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LValueMode {
    /// `var`: always creates a fresh cell in the local scope, shadowing any
    /// outer binding of the same name.
    Declare,
    /// `set`: assigns an existing variable; a plain name with no binding in
    /// scope creates one in the local scope instead of failing.
    Mutate,
}

impl Compiler {
    /// Compiles one assignment target: a plain or qualified name, optionally
    /// followed by index expressions.
    pub(crate) fn compile_lvalue(
        &mut self,
        compound: &Compound,
        mode: LValueMode,
    ) -> Result<LValueOp, CompileError> {
        let [part] = compound.parts.as_slice() else {
            return Err(self.error(
                compound.span,
                "assignment target must be a single variable",
            ));
        };
        let name = match &part.head.kind {
            PrimaryKind::Bareword(s) | PrimaryKind::Variable(s) => s.clone(),
            _ => {
                return Err(self.error(
                    compound.span,
                    "assignment target must be a variable name",
                ));
            }
        };

        if !part.indices.is_empty() {
            if mode == LValueMode::Declare {
                return Err(self.error(
                    compound.span,
                    "cannot declare an element; declare the variable first",
                ));
            }
            self.note_var_ref(&name);
            let base = LValueOp::new(
                part.head.span,
                ResolveOp {
                    span: part.head.span,
                    name,
                },
            );
            let indices = self.compile_compounds(&part.indices)?;
            return Ok(LValueOp::new(
                compound.span,
                ElementOp {
                    base,
                    indices,
                },
            ));
        }

        let qualified = name.contains(':');
        match mode {
            LValueMode::Declare => {
                let plain = match name.strip_prefix("local:") {
                    Some(rest) => rest.to_string(),
                    None if qualified => {
                        return Err(self.error(
                            compound.span,
                            "cannot declare a variable outside the local scope",
                        ));
                    }
                    None => name,
                };
                self.declare(&plain);
                Ok(LValueOp::new(compound.span, NewVarOp { name: plain }))
            }
            LValueMode::Mutate if qualified => {
                self.note_var_ref(&name);
                Ok(LValueOp::new(
                    compound.span,
                    ResolveOp {
                        span: compound.span,
                        name,
                    },
                ))
            }
            LValueMode::Mutate => {
                if self.is_declared(&name) {
                    self.note_var_ref(&name);
                } else {
                    self.declare(&name);
                }
                Ok(LValueOp::new(
                    compound.span,
                    ResolveOrCreateOp { name },
                ))
            }
        }
    }
}

/// Creates a fresh cell in the local scope, unconditionally.
struct NewVarOp {
    name: String,
}

#[async_trait]
impl LValueOpBody for NewVarOp {
    async fn exec(&self, fm: &mut Frame) -> Result<Variable, Exception> {
        let var = Variable::new(Value::Nil);
        fm.local.assign(self.name.clone(), var.clone());
        Ok(var)
    }
}

/// Resolves an existing variable, failing if there is none.
struct ResolveOp {
    span: Span,
    name: String,
}

#[async_trait]
impl LValueOpBody for ResolveOp {
    async fn exec(&self, fm: &mut Frame) -> Result<Variable, Exception> {
        fm.resolve(&self.name).ok_or_else(|| {
            fm.except_at(self.span, Error::VariableNotFound(self.name.clone()))
        })
    }
}

/// Resolves an existing variable, creating one in the local scope if the
/// name is unbound.
struct ResolveOrCreateOp {
    name: String,
}

#[async_trait]
impl LValueOpBody for ResolveOrCreateOp {
    async fn exec(&self, fm: &mut Frame) -> Result<Variable, Exception> {
        if let Some(var) = fm.resolve(&self.name) {
            return Ok(var);
        }
        let var = Variable::new(Value::Nil);
        fm.local.assign(self.name.clone(), var.clone());
        Ok(var)
    }
}

/// Addresses one element of a container variable.
struct ElementOp {
    base: LValueOp,
    indices: Vec<ValuesOp>,
}

#[async_trait]
impl LValueOpBody for ElementOp {
    async fn exec(&self, fm: &mut Frame) -> Result<Variable, Exception> {
        let base = self.base.exec(fm).await?;
        let mut indices = Vec::with_capacity(self.indices.len());
        for index in &self.indices {
            indices.push(index.exec_one(fm).await?);
        }
        Ok(Variable::element(base, indices))
    }
}
