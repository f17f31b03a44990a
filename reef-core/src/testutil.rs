//! Helpers shared by the end-to-end tests: terse tree builders and a runner
//! that evaluates with captured output.

use std::sync::Arc;

use reef_syntax::ast::{Chunk, Compound, Form, Lambda, Pipeline};
use reef_syntax::{Source, Span};

use crate::interp::{CapturedEval, Interp};

pub(crate) fn w(text: &str) -> Compound {
    Compound::bareword(text, Span::empty())
}

pub(crate) fn q(text: &str) -> Compound {
    Compound::quoted(text, Span::empty())
}

pub(crate) fn v(name: &str) -> Compound {
    Compound::var(name, Span::empty())
}

pub(crate) fn form(head: &str, args: &[Compound]) -> Form {
    args.iter().cloned().fold(Form::new(w(head)), Form::arg)
}

/// A one-form foreground pipeline.
pub(crate) fn cmd(head: &str, args: &[Compound]) -> Pipeline {
    Pipeline::new(vec![form(head, args)])
}

pub(crate) fn chunk(pipelines: Vec<Pipeline>) -> Chunk {
    Chunk::new(pipelines)
}

pub(crate) fn lambda(params: &[&str], body: Vec<Pipeline>) -> Compound {
    Compound::lambda(Lambda::new(
        params.iter().map(|s| (*s).to_string()).collect(),
        Chunk::new(body),
    ))
}

/// A parameterless lambda, as used for block arguments.
pub(crate) fn block(body: Vec<Pipeline>) -> Compound {
    lambda(&[], body)
}

pub(crate) async fn run(chunk: &Chunk) -> CapturedEval {
    run_on(&Interp::new(), chunk).await
}

pub(crate) async fn run_on(interp: &Arc<Interp>, chunk: &Chunk) -> CapturedEval {
    let src = Source::synthetic(format!("[test: {chunk}]"));
    interp
        .eval_capture(chunk, src)
        .await
        .expect("chunk should compile")
}
