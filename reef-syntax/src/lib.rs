//! Syntax tree for the reef command language. Defines the immutable AST that
//! the runtime in `reef-core` compiles and executes, along with source
//! attribution types. Producing the tree (lexing/parsing) is the job of a
//! separate front end; embedders and tests may also construct trees directly
//! through the constructor helpers on the node types.

pub mod ast;

mod source;

pub use source::{Source, Span, Spanned};
