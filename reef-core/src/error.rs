//! Error types raised by the runtime.

use crate::exception::{ExternalCmdExit, PipelineError};

/// A non-local transfer requested by a flow command. Flow requests travel
/// like errors until a loop or function-call boundary consumes them; one that
/// reaches the top level is reported like any other failure.
#[derive(thiserror::Error, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Return from the enclosing function.
    #[error("return")]
    Return,
    /// Terminate the enclosing loop.
    #[error("break")]
    Break,
    /// Skip to the next iteration of the enclosing loop.
    #[error("continue")]
    Continue,
}

/// A command or operation received the wrong number of values.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
#[error("arity mismatch: {what} must be {}, but is {}", count_text(*.min, *.max), values_text(*.actual))]
pub struct ArityMismatch {
    /// What was being counted, e.g. `"arguments"`.
    pub what: String,
    /// The smallest acceptable count.
    pub min: usize,
    /// The largest acceptable count, or `usize::MAX` when unbounded.
    pub max: usize,
    /// The count that was actually seen.
    pub actual: usize,
}

impl ArityMismatch {
    /// Returns a mismatch for something that takes an exact count.
    pub fn exact(what: impl Into<String>, want: usize, actual: usize) -> Self {
        Self {
            what: what.into(),
            min: want,
            max: want,
            actual,
        }
    }

    /// Returns a mismatch for something that takes a bounded range.
    pub fn range(what: impl Into<String>, min: usize, max: usize, actual: usize) -> Self {
        Self {
            what: what.into(),
            min,
            max,
            actual,
        }
    }

    /// Returns a mismatch for something that takes `min` or more values.
    pub fn at_least(what: impl Into<String>, min: usize, actual: usize) -> Self {
        Self {
            what: what.into(),
            min,
            max: usize::MAX,
            actual,
        }
    }
}

fn count_text(min: usize, max: usize) -> String {
    if min == max {
        values_text(min)
    } else if max == usize::MAX {
        format!("{} or more values", min)
    } else {
        format!("{} to {} values", min, max)
    }
}

fn values_text(n: usize) -> String {
    if n == 1 {
        "1 value".to_string()
    } else {
        format!("{n} values")
    }
}

/// A value did not satisfy what an operation needs from it.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
#[error("bad value: {what} must be {valid}, but is {actual}")]
pub struct BadValue {
    /// What the value was used as, e.g. `"argument 1"`.
    pub what: String,
    /// A description of acceptable values.
    pub valid: String,
    /// A description of the value actually seen.
    pub actual: String,
}

impl BadValue {
    pub fn new(
        what: impl Into<String>,
        valid: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            what: what.into(),
            valid: valid.into(),
            actual: actual.into(),
        }
    }
}

/// A numeric index fell outside the container it was applied to.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
#[error("out of range: {what} must be from {min} to {max}, but is {actual}")]
pub struct OutOfRange {
    pub what: String,
    pub min: String,
    pub max: String,
    pub actual: String,
}

/// The reasons the runtime can fail with.
///
/// Cheap structured payloads keep failures inspectable by embedders; the
/// trailing `#[from]` variants absorb errors from the crates underneath.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    ArityMismatch(#[from] ArityMismatch),

    #[error(transparent)]
    BadValue(#[from] BadValue),

    #[error(transparent)]
    OutOfRange(#[from] OutOfRange),

    #[error(transparent)]
    Flow(#[from] Flow),

    /// More than one stage of a pipeline failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// An external command terminated unsuccessfully.
    #[error(transparent)]
    ExternalCmd(#[from] ExternalCmdExit),

    /// A command head named nothing callable.
    #[error("command not found: {0}")]
    CommandNotFound(String),

    /// A variable reference resolved to nothing.
    #[error("variable ${0} not found")]
    VariableNotFound(String),

    /// A map was indexed with a key it does not have.
    #[error("no such key: {0}")]
    NoSuchKey(String),

    /// An assignment targeted a read-only variable.
    #[error("cannot modify read-only variable")]
    SetReadOnly,

    /// Execution was cut short by an interrupt.
    #[error("interrupted")]
    Interrupted,

    /// A pipeline stage did not wind down within the grace period after an
    /// interrupt.
    #[error("pipeline stage still running after interrupt")]
    StillRunning,

    /// A value was written to a port that has no value band, such as a plain
    /// file redirection.
    #[error("port does not support value output")]
    NoValueOutput,

    /// The consumer of a value channel went away before the producer was
    /// done.
    #[error("reader of value output is gone")]
    ReaderGone,

    /// A redirection referred to a file descriptor that does not name an
    /// open port.
    #[error("invalid file descriptor: {0}")]
    InvalidFd(String),

    /// A command was given an option it does not take.
    #[error("unsupported option: {0}")]
    UnsupportedOption(String),

    /// An operation needed the storage backend, but none is attached.
    #[error("store not connected")]
    StoreNotConnected,

    /// There is no job with the given id.
    #[error("no such job: {0}")]
    NoSuchJob(usize),

    /// An explicitly raised failure, as produced by `fail`.
    #[error("{0}")]
    Failed(String),

    /// A chunk failed to compile.
    #[error(transparent)]
    Compile(#[from] crate::compile::CompileError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[cfg(unix)]
    #[error("system error: {0}")]
    Sys(#[from] nix::errno::Errno),

    #[error("invalid integer: {0}")]
    IntParse(#[from] std::num::ParseIntError),

    #[error("invalid number: {0}")]
    FloatParse(#[from] std::num::ParseFloatError),
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn arity_mismatch_messages() {
        assert_eq!(
            ArityMismatch::exact("arguments", 2, 3).to_string(),
            "arity mismatch: arguments must be 2 values, but is 3 values"
        );
        assert_eq!(
            ArityMismatch::exact("arguments", 1, 0).to_string(),
            "arity mismatch: arguments must be 1 value, but is 0 values"
        );
        assert_eq!(
            ArityMismatch::at_least("arguments", 1, 0).to_string(),
            "arity mismatch: arguments must be 1 or more values, but is 0 values"
        );
        assert_eq!(
            ArityMismatch::range("arguments", 1, 2, 5).to_string(),
            "arity mismatch: arguments must be 1 to 2 values, but is 5 values"
        );
    }

    #[test]
    fn bad_value_message() {
        assert_eq!(
            BadValue::new("index", "integer", "string").to_string(),
            "bad value: index must be integer, but is string"
        );
    }
}
