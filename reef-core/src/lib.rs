//! The embeddable command-language runtime: compilation of parsed source
//! into executable operation trees, and their evaluation over concurrent
//! pipelines.
//!
//! The entry point is [`Interp`]: create one, compile a
//! [`reef_syntax::ast::Chunk`] against it, and evaluate the result on a set
//! of ports.

mod builtins;
pub mod closure;
pub mod commands;
pub mod compile;
mod compile_lvalue;
mod compile_value;
pub mod error;
pub mod exception;
pub mod external_cmd;
pub mod frame;
pub mod interfaces;
pub mod interp;
pub mod interrupts;
pub mod jobs;
pub mod native_fn;
pub mod ns;
pub mod pathsearch;
pub mod port;
mod special;
pub mod value;
pub mod vars;

pub use error::Error;
pub use exception::Exception;
pub use frame::Frame;
pub use interp::{CapturedEval, Interp, InterpOptions};
pub use value::Value;

#[cfg(test)]
mod testutil;

#[cfg(test)]
mod tests;
