//! User-defined functions.

use std::sync::Arc;

use async_trait::async_trait;
use reef_syntax::{Source, Span};

use crate::commands::{Callable, OptMap};
use crate::compile::EffectOp;
use crate::error::{ArityMismatch, Error, Flow};
use crate::exception::Exception;
use crate::frame::Frame;
use crate::ns::Ns;
use crate::value::Value;

/// A compiled lambda bound to the variables it captured.
///
/// The captured namespace holds variable handles, not values: the closure
/// and the defining scope share cells, so writes on either side are visible
/// to the other. Each call gets a fresh local namespace, which is what makes
/// a closure defined inside a loop capture a distinct cell per iteration.
pub struct Closure {
    pub(crate) name: Option<String>,
    pub(crate) params: Vec<String>,
    pub(crate) rest: Option<String>,
    pub(crate) opt_names: Vec<String>,
    pub(crate) opt_defaults: Vec<Value>,
    pub(crate) body: EffectOp,
    pub(crate) captured: Ns,
    pub(crate) src: Arc<Source>,
    pub(crate) def_span: Span,
    /// Set for closures defined with `fn`, which absorb `return` from their
    /// body. Bare lambdas pass it through to the enclosing function.
    pub(crate) catch_return: bool,
}

#[async_trait]
impl Callable for Closure {
    fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("<closure>")
    }

    async fn call(
        &self,
        fm: &mut Frame,
        args: Vec<Value>,
        opts: OptMap,
    ) -> Result<(), Exception> {
        let local = Ns::new();
        self.bind(fm, &local, args, opts)?;

        let mut ports = Vec::with_capacity(fm.ports.len());
        for port in &fm.ports {
            ports.push(port.try_clone().map_err(|e| fm.except(e))?);
        }

        let mut body_fm = Frame {
            interp: fm.interp.clone(),
            src: self.src.clone(),
            local,
            up: self.captured.clone(),
            ports,
            traceback: fm.traceback.clone(),
            interrupts: fm.interrupts.clone(),
            background: fm.background,
        };
        match self.body.exec(&mut body_fm).await {
            Err(exc) if self.catch_return && exc.is_flow(Flow::Return) => Ok(()),
            other => other,
        }
    }
}

impl Closure {
    fn bind(
        &self,
        fm: &Frame,
        local: &Ns,
        args: Vec<Value>,
        opts: OptMap,
    ) -> Result<(), Exception> {
        let fixed = self.params.len();
        let ok = if self.rest.is_some() {
            args.len() >= fixed
        } else {
            args.len() == fixed
        };
        if !ok {
            let err = if self.rest.is_some() {
                ArityMismatch::at_least("arguments", fixed, args.len())
            } else {
                ArityMismatch::exact("arguments", fixed, args.len())
            };
            return Err(fm.except_at(self.def_span, err.into()));
        }

        let mut args = args.into_iter();
        for name in &self.params {
            local.add_var(name.clone(), args.next().unwrap_or_default());
        }
        if let Some(rest) = &self.rest {
            local.add_var(rest.clone(), args.collect());
        }

        for (name, default) in self.opt_names.iter().zip(&self.opt_defaults) {
            local.add_var(name.clone(), default.clone());
        }
        for (name, value) in opts {
            if !self.opt_names.contains(&name) {
                return Err(fm.except(Error::UnsupportedOption(name)));
            }
            local.add_var(name, value);
        }
        Ok(())
    }
}
