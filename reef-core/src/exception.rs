//! Errors annotated with the execution context they were raised in.

use std::sync::Arc;

use itertools::Itertools;
use reef_syntax::{Source, Span};

use crate::error::{Error, Flow};

/// One level of execution context: a span within a named source.
#[derive(Clone, Debug)]
pub struct SourceContext {
    /// The source the span points into.
    pub src: Arc<Source>,
    /// The range covered by this level.
    pub span: Span,
}

impl SourceContext {
    /// Renders the context as `name:from..to` followed by the covered text
    /// when the source retains its code.
    pub fn describe(&self) -> String {
        let text = self.src.text(self.span);
        if text.is_empty() {
            format!("{}:{}", self.src.name, self.span)
        } else {
            format!("{}:{}: {}", self.src.name, self.span, text)
        }
    }
}

/// A stack of source contexts, innermost first.
///
/// Stored as a linked list with shared tails so that pipeline stages running
/// in parallel can each extend a common prefix without copying it.
#[derive(Clone, Debug)]
pub struct Traceback {
    /// The innermost context.
    pub head: SourceContext,
    /// The enclosing levels, if any.
    pub next: Option<Arc<Traceback>>,
}

impl Traceback {
    /// Returns the contexts from innermost to outermost.
    pub fn frames(&self) -> Vec<&SourceContext> {
        let mut out = vec![&self.head];
        let mut cur = self.next.as_deref();
        while let Some(tb) = cur {
            out.push(&tb.head);
            cur = tb.next.as_deref();
        }
        out
    }
}

/// A raised error together with the traceback at the raise site.
///
/// Cloning is cheap; the reason and traceback are shared. Exceptions cross
/// task boundaries when pipeline stages fail, so everything inside is
/// `Send + Sync`.
#[derive(Clone, Debug)]
pub struct Exception {
    reason: Arc<Error>,
    traceback: Option<Arc<Traceback>>,
}

impl Exception {
    pub fn new(reason: Error, traceback: Option<Arc<Traceback>>) -> Self {
        Self {
            reason: Arc::new(reason),
            traceback,
        }
    }

    /// The error that was raised.
    pub fn reason(&self) -> &Error {
        &self.reason
    }

    /// The context stack at the raise site, innermost first.
    pub fn traceback(&self) -> Option<&Arc<Traceback>> {
        self.traceback.as_ref()
    }

    /// Whether this exception carries the given flow request.
    pub fn is_flow(&self, flow: Flow) -> bool {
        matches!(self.reason(), Error::Flow(f) if *f == flow)
    }

    /// Whether the reason is that a downstream value reader went away. The
    /// pipeline engine suppresses this for stages whose output feeds a pipe.
    pub(crate) fn is_reader_gone(&self) -> bool {
        match self.reason() {
            Error::ReaderGone => true,
            Error::Io(err) => err.kind() == std::io::ErrorKind::BrokenPipe,
            _ => false,
        }
    }

    /// Renders a multi-line report with the reason followed by the
    /// traceback, innermost first.
    pub fn show(&self) -> String {
        let mut out = format!("error: {}", self.reason);
        if let Some(tb) = &self.traceback {
            for ctx in tb.frames() {
                out.push_str("\n  at ");
                out.push_str(&ctx.describe());
            }
        }
        out
    }
}

impl std::fmt::Display for Exception {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason)
    }
}

impl std::error::Error for Exception {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.reason.as_ref())
    }
}

/// The aggregated failure of a multi-stage pipeline: one slot per stage, in
/// pipeline order, with `None` for stages that finished cleanly.
#[derive(Clone, Debug)]
pub struct PipelineError {
    pub stages: Vec<Option<Exception>>,
}

/// How a finished pipeline's per-stage results fold together.
pub(crate) enum PipelineOutcome {
    /// Every stage succeeded.
    Ok,
    /// Exactly one stage failed; its exception propagates as-is, keeping
    /// the stage's own traceback.
    Single(Exception),
    /// More than one stage failed.
    Aggregate(PipelineError),
}

impl PipelineError {
    /// Folds per-stage results into a single outcome.
    pub(crate) fn compose(stages: Vec<Option<Exception>>) -> PipelineOutcome {
        match stages.iter().filter(|s| s.is_some()).count() {
            0 => PipelineOutcome::Ok,
            1 => PipelineOutcome::Single(stages.into_iter().flatten().next().unwrap()),
            _ => PipelineOutcome::Aggregate(PipelineError { stages }),
        }
    }

    /// The stages that failed, with their zero-based positions.
    pub fn failures(&self) -> impl Iterator<Item = (usize, &Exception)> {
        self.stages
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|exc| (i, exc)))
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let body = self
            .stages
            .iter()
            .map(|s| match s {
                Some(exc) => exc.to_string(),
                None => "ok".to_string(),
            })
            .join(" | ");
        write!(f, "({body})")
    }
}

impl std::error::Error for PipelineError {}

/// How an external command terminated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExitReason {
    /// Exited on its own with a non-zero code.
    Exited(i32),
    /// Terminated by a signal.
    Signaled { signal: String, core_dumped: bool },
    /// Stopped by a signal; the process still exists and can be resumed.
    Stopped { signal: String },
}

/// An external command that terminated unsuccessfully.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExternalCmdExit {
    /// The command name as invoked.
    pub cmd_name: String,
    /// The process id.
    pub pid: i32,
    /// How it terminated.
    pub reason: ExitReason,
}

impl std::fmt::Display for ExternalCmdExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.reason {
            ExitReason::Exited(code) => write!(f, "{} exited with {}", self.cmd_name, code),
            ExitReason::Signaled {
                signal,
                core_dumped,
            } => {
                write!(f, "{} killed by {}", self.cmd_name, signal)?;
                if *core_dumped {
                    write!(f, " (core dumped)")?;
                }
                Ok(())
            }
            ExitReason::Stopped { signal } => {
                write!(f, "{} stopped by {} (pid {})", self.cmd_name, signal, self.pid)
            }
        }
    }
}

impl std::error::Error for ExternalCmdExit {}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn exc(msg: &str) -> Exception {
        Exception::new(Error::Failed(msg.to_string()), None)
    }

    #[test]
    fn compose_all_ok() {
        assert!(matches!(
            PipelineError::compose(vec![None, None]),
            PipelineOutcome::Ok
        ));
    }

    #[test]
    fn compose_single_failure_propagates_as_itself() {
        let out = PipelineError::compose(vec![None, Some(exc("boom")), None]);
        match out {
            PipelineOutcome::Single(e) => assert_eq!(e.to_string(), "boom"),
            _ => panic!("expected a single failure"),
        }
    }

    #[test]
    fn compose_multiple_failures_aggregate_in_order() {
        let out = PipelineError::compose(vec![Some(exc("a")), None, Some(exc("b"))]);
        match out {
            PipelineOutcome::Aggregate(pe) => {
                assert_eq!(pe.to_string(), "(a | ok | b)");
                let positions: Vec<usize> = pe.failures().map(|(i, _)| i).collect();
                assert_eq!(positions, vec![0, 2]);
            }
            _ => panic!("expected an aggregate failure"),
        }
    }

    #[test]
    fn traceback_frames_are_innermost_first() {
        let src = Source::new("[test]", "put x");
        let outer = Arc::new(Traceback {
            head: SourceContext {
                src: src.clone(),
                span: Span::new(0, 5),
            },
            next: None,
        });
        let inner = Traceback {
            head: SourceContext {
                src: src.clone(),
                span: Span::new(4, 5),
            },
            next: Some(outer),
        };
        let frames = inner.frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].describe(), "[test]:4..5: x");
        assert_eq!(frames[1].describe(), "[test]:0..5: put x");
    }

    #[test]
    fn external_cmd_exit_messages() {
        let exit = ExternalCmdExit {
            cmd_name: "false".to_string(),
            pid: 42,
            reason: ExitReason::Exited(1),
        };
        assert_eq!(exit.to_string(), "false exited with 1");

        let killed = ExternalCmdExit {
            cmd_name: "cat".to_string(),
            pid: 43,
            reason: ExitReason::Signaled {
                signal: "SIGTERM".to_string(),
                core_dumped: false,
            },
        };
        assert_eq!(killed.to_string(), "cat killed by SIGTERM");
    }
}
