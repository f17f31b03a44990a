//! Source attribution.

use std::sync::Arc;

/// A `[from, to)` byte-offset range into a piece of source code.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Span {
    /// Byte offset of the first byte covered by the span.
    pub from: usize,
    /// Byte offset one past the last byte covered by the span.
    pub to: usize,
}

impl Span {
    /// Returns a new span covering the given byte range.
    pub const fn new(from: usize, to: usize) -> Self {
        Self { from, to }
    }

    /// Returns a zero-width span at offset 0, suitable for synthesized nodes.
    pub const fn empty() -> Self {
        Self { from: 0, to: 0 }
    }

    /// Returns the smallest span covering both `self` and `other`.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            from: self.from.min(other.from),
            to: self.to.max(other.to),
        }
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.from, self.to)
    }
}

/// Implemented by every AST node that knows the source range it was built
/// from.
pub trait Spanned {
    /// Returns the source range of the node.
    fn span(&self) -> Span;
}

/// A piece of source code together with a name usable in diagnostics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Source {
    /// The name of the source, e.g. a file path or `[tty]`.
    pub name: String,
    /// The full text of the source.
    pub code: String,
}

impl Source {
    /// Returns a new source descriptor.
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            code: code.into(),
        })
    }

    /// Returns a source descriptor with a name but no retained code, for
    /// trees constructed programmatically rather than parsed.
    pub fn synthetic(name: impl Into<String>) -> Arc<Self> {
        Self::new(name, "")
    }

    /// Returns the text covered by `span`, or an empty string if the span
    /// falls outside the retained code.
    pub fn text(&self, span: Span) -> &str {
        self.code.get(span.from..span.to).unwrap_or("")
    }
}
