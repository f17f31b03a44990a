//! Defines the abstract syntax tree for reef scripts. Includes types and
//! constructor utilities for building trees without a parser.

use std::fmt::Display;

use crate::{Span, Spanned};

/// A whole script or lambda body: a sequence of pipelines.
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
    /// The source range of the chunk.
    pub span: Span,
    /// The pipelines, in execution order.
    pub pipelines: Vec<Pipeline>,
}

impl Chunk {
    /// Returns a chunk made of the given pipelines.
    pub fn new(pipelines: Vec<Pipeline>) -> Self {
        let span = merged_span(&pipelines);
        Self { span, pipelines }
    }
}

impl Spanned for Chunk {
    fn span(&self) -> Span {
        self.span
    }
}

impl Display for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, p) in self.pipelines.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{p}")?;
        }
        Ok(())
    }
}

/// A sequence of forms whose outputs are wired to the next form's input,
/// optionally run in the background.
#[derive(Clone, Debug, PartialEq)]
pub struct Pipeline {
    /// The source range of the pipeline.
    pub span: Span,
    /// The forms, left to right.
    pub forms: Vec<Form>,
    /// Whether the pipeline was marked to run in the background (`&`).
    pub background: bool,
}

impl Pipeline {
    /// Returns a foreground pipeline made of the given forms.
    pub fn new(forms: Vec<Form>) -> Self {
        let span = merged_span(&forms);
        Self {
            span,
            forms,
            background: false,
        }
    }

    /// Marks the pipeline to run in the background.
    #[must_use]
    pub fn into_background(mut self) -> Self {
        self.background = true;
        self
    }
}

impl Spanned for Pipeline {
    fn span(&self) -> Span {
        self.span
    }
}

impl Display for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, form) in self.forms.iter().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{form}")?;
        }
        if self.background {
            write!(f, " &")?;
        }
        Ok(())
    }
}

/// A single command invocation: a head, arguments, options and redirections.
#[derive(Clone, Debug, PartialEq)]
pub struct Form {
    /// The source range of the form.
    pub span: Span,
    /// The command head.
    pub head: Compound,
    /// Positional arguments.
    pub args: Vec<Compound>,
    /// Named options (`&name=value`).
    pub opts: Vec<FormOpt>,
    /// Redirections, applied left to right.
    pub redirs: Vec<Redir>,
}

impl Form {
    /// Returns a form with the given head and no arguments.
    pub fn new(head: Compound) -> Self {
        Self {
            span: head.span,
            head,
            args: vec![],
            opts: vec![],
            redirs: vec![],
        }
    }

    /// Appends a positional argument.
    #[must_use]
    pub fn arg(mut self, arg: Compound) -> Self {
        self.span = self.span.merge(arg.span);
        self.args.push(arg);
        self
    }

    /// Appends a named option.
    #[must_use]
    pub fn opt(mut self, name: impl Into<String>, value: Compound) -> Self {
        self.span = self.span.merge(value.span);
        self.opts.push(FormOpt {
            span: value.span,
            name: name.into(),
            value,
        });
        self
    }

    /// Appends a redirection.
    #[must_use]
    pub fn redir(mut self, redir: Redir) -> Self {
        self.span = self.span.merge(redir.span);
        self.redirs.push(redir);
        self
    }
}

impl Spanned for Form {
    fn span(&self) -> Span {
        self.span
    }
}

impl Display for Form {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.head)?;
        for opt in &self.opts {
            write!(f, " &{}={}", opt.name, opt.value)?;
        }
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        for redir in &self.redirs {
            write!(f, " {redir}")?;
        }
        Ok(())
    }
}

/// A named option attached to a form.
#[derive(Clone, Debug, PartialEq)]
pub struct FormOpt {
    /// The source range of the option.
    pub span: Span,
    /// The option name.
    pub name: String,
    /// The option value.
    pub value: Compound,
}

/// A concatenation of indexing expressions. Most compounds have exactly one
/// part.
#[derive(Clone, Debug, PartialEq)]
pub struct Compound {
    /// The source range of the compound.
    pub span: Span,
    /// The concatenated parts.
    pub parts: Vec<Indexing>,
}

impl Compound {
    /// Returns a compound made of a single indexing expression.
    pub fn from_indexing(indexing: Indexing) -> Self {
        Self {
            span: indexing.span,
            parts: vec![indexing],
        }
    }

    /// Returns a compound holding a bareword literal.
    pub fn bareword(text: impl Into<String>, span: Span) -> Self {
        Self::from_indexing(Indexing::new(Primary {
            span,
            kind: PrimaryKind::Bareword(text.into()),
        }))
    }

    /// Returns a compound holding a quoted string literal.
    pub fn quoted(text: impl Into<String>, span: Span) -> Self {
        Self::from_indexing(Indexing::new(Primary {
            span,
            kind: PrimaryKind::Quoted(text.into()),
        }))
    }

    /// Returns a compound holding a variable reference (`$name`).
    pub fn var(name: impl Into<String>, span: Span) -> Self {
        Self::from_indexing(Indexing::new(Primary {
            span,
            kind: PrimaryKind::Variable(name.into()),
        }))
    }

    /// Returns a compound holding a lambda literal.
    pub fn lambda(lambda: Lambda) -> Self {
        let span = lambda.span;
        Self::from_indexing(Indexing::new(Primary {
            span,
            kind: PrimaryKind::Lambda(Box::new(lambda)),
        }))
    }

    /// Returns a compound holding a list literal (`[a b c]`).
    pub fn list(items: Vec<Compound>, span: Span) -> Self {
        Self::from_indexing(Indexing::new(Primary {
            span,
            kind: PrimaryKind::List(items),
        }))
    }

    /// Returns a compound holding an indexed variable reference
    /// (`$name[i]...`).
    pub fn indexed_var(name: impl Into<String>, indices: Vec<Compound>, span: Span) -> Self {
        Self::from_indexing(Indexing {
            span,
            head: Primary {
                span,
                kind: PrimaryKind::Variable(name.into()),
            },
            indices,
        })
    }

    /// Returns the literal text of the compound, if it is a single bareword
    /// or quoted string with no indices.
    pub fn literal_text(&self) -> Option<&str> {
        match self.parts.as_slice() {
            [part] if part.indices.is_empty() => match &part.head.kind {
                PrimaryKind::Bareword(s) | PrimaryKind::Quoted(s) => Some(s),
                _ => None,
            },
            _ => None,
        }
    }
}

impl Spanned for Compound {
    fn span(&self) -> Span {
        self.span
    }
}

impl Display for Compound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for part in &self.parts {
            write!(f, "{part}")?;
        }
        Ok(())
    }
}

/// A primary expression followed by zero or more index expressions.
#[derive(Clone, Debug, PartialEq)]
pub struct Indexing {
    /// The source range of the indexing expression.
    pub span: Span,
    /// The expression being indexed.
    pub head: Primary,
    /// The index expressions, applied left to right.
    pub indices: Vec<Compound>,
}

impl Indexing {
    /// Returns an indexing expression with no indices.
    pub fn new(head: Primary) -> Self {
        Self {
            span: head.span,
            head,
            indices: vec![],
        }
    }
}

impl Spanned for Indexing {
    fn span(&self) -> Span {
        self.span
    }
}

impl Display for Indexing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.head)?;
        for index in &self.indices {
            write!(f, "[{index}]")?;
        }
        Ok(())
    }
}

/// A leaf expression.
#[derive(Clone, Debug, PartialEq)]
pub struct Primary {
    /// The source range of the primary.
    pub span: Span,
    /// The kind of primary.
    pub kind: PrimaryKind,
}

impl Spanned for Primary {
    fn span(&self) -> Span {
        self.span
    }
}

impl Display for Primary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            PrimaryKind::Bareword(s) => write!(f, "{s}"),
            PrimaryKind::Quoted(s) => write!(f, "'{s}'"),
            PrimaryKind::Variable(name) => write!(f, "${name}"),
            PrimaryKind::Lambda(lambda) => write!(f, "{lambda}"),
            PrimaryKind::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// The kinds of primary expression.
#[derive(Clone, Debug, PartialEq)]
pub enum PrimaryKind {
    /// An unquoted word, e.g. `put` or `233`.
    Bareword(String),
    /// A quoted string.
    Quoted(String),
    /// A variable reference, e.g. `$x` or `$E:HOME`.
    Variable(String),
    /// A lambda literal, e.g. `[x]{ put $x }`.
    Lambda(Box<Lambda>),
    /// A list literal, e.g. `[a b c]`.
    List(Vec<Compound>),
}

/// A lambda literal: a parameter list and a body chunk.
#[derive(Clone, Debug, PartialEq)]
pub struct Lambda {
    /// The source range of the lambda.
    pub span: Span,
    /// Fixed parameter names, in order.
    pub params: Vec<String>,
    /// The rest parameter, if any. `Some(None)` declares an unnamed rest
    /// parameter, bound under the implicit name `args`.
    pub rest: Option<Option<String>>,
    /// Option parameters with their default value expressions.
    pub opt_params: Vec<(String, Compound)>,
    /// The body.
    pub body: Chunk,
}

impl Lambda {
    /// Returns a lambda with the given fixed parameters and body.
    pub fn new(params: Vec<String>, body: Chunk) -> Self {
        let span = body.span;
        Self {
            span,
            params,
            rest: None,
            opt_params: vec![],
            body,
        }
    }

    /// Declares a rest parameter. Pass `None` for an unnamed one.
    #[must_use]
    pub fn with_rest(mut self, rest: Option<String>) -> Self {
        self.rest = Some(rest);
        self
    }

    /// Declares an option parameter with a default value expression.
    #[must_use]
    pub fn with_opt(mut self, name: impl Into<String>, default: Compound) -> Self {
        self.opt_params.push((name.into(), default));
        self
    }
}

impl Spanned for Lambda {
    fn span(&self) -> Span {
        self.span
    }
}

impl Display for Lambda {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.params.is_empty() || self.rest.is_some() || !self.opt_params.is_empty() {
            write!(f, "[")?;
            for (i, p) in self.params.iter().enumerate() {
                if i > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{p}")?;
            }
            if let Some(rest) = &self.rest {
                write!(f, " @{}", rest.as_deref().unwrap_or(""))?;
            }
            for (name, default) in &self.opt_params {
                write!(f, " &{name}={default}")?;
            }
            write!(f, "]")?;
        }
        write!(f, "{{ {} }}", self.body)
    }
}

/// The mode of a redirection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RedirMode {
    /// `<`: open for reading.
    Read,
    /// `>`: open for writing, truncating.
    Write,
    /// `<>`: open for reading and writing.
    ReadWrite,
    /// `>>`: open for appending.
    Append,
}

impl Display for RedirMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Read => "<",
            Self::Write => ">",
            Self::ReadWrite => "<>",
            Self::Append => ">>",
        };
        write!(f, "{s}")
    }
}

/// A redirection attached to a form.
#[derive(Clone, Debug, PartialEq)]
pub struct Redir {
    /// The source range of the redirection.
    pub span: Span,
    /// The destination fd expression, if one was written (e.g. the `2` of
    /// `2>`). When absent, a default derived from the mode is used.
    pub dest: Option<Compound>,
    /// The redirection mode.
    pub mode: RedirMode,
    /// The source expression: a file name, a file/pipe value, or (when
    /// `source_is_fd` is set) an fd name or number.
    pub source: Compound,
    /// Whether the source refers to an fd (`>&`) rather than a file.
    pub source_is_fd: bool,
}

impl Redir {
    /// Returns a redirection with a default destination.
    pub fn new(mode: RedirMode, source: Compound) -> Self {
        Self {
            span: source.span,
            dest: None,
            mode,
            source,
            source_is_fd: false,
        }
    }

    /// Sets the destination fd expression.
    #[must_use]
    pub fn with_dest(mut self, dest: Compound) -> Self {
        self.dest = Some(dest);
        self
    }

    /// Marks the source as an fd reference.
    #[must_use]
    pub fn fd_source(mut self) -> Self {
        self.source_is_fd = true;
        self
    }
}

impl Spanned for Redir {
    fn span(&self) -> Span {
        self.span
    }
}

impl Display for Redir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(dest) = &self.dest {
            write!(f, "{dest}")?;
        }
        write!(f, "{}", self.mode)?;
        if self.source_is_fd {
            write!(f, "&")?;
        }
        write!(f, "{}", self.source)
    }
}

fn merged_span<T: Spanned>(items: &[T]) -> Span {
    items
        .iter()
        .map(Spanned::span)
        .reduce(Span::merge)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn display_round_trips_simple_forms() {
        let form = Form::new(Compound::bareword("put", Span::empty()))
            .arg(Compound::bareword("233", Span::empty()))
            .arg(Compound::var("x", Span::empty()));
        assert_eq!(form.to_string(), "put 233 $x");
    }

    #[test]
    fn display_includes_background_marker() {
        let pipeline = Pipeline::new(vec![
            Form::new(Compound::bareword("range", Span::empty()))
                .arg(Compound::bareword("10", Span::empty())),
            Form::new(Compound::bareword("count", Span::empty())),
        ])
        .into_background();
        assert_eq!(pipeline.to_string(), "range 10 | count &");
    }

    #[test]
    fn literal_text_only_for_plain_words() {
        assert_eq!(
            Compound::bareword("echo", Span::empty()).literal_text(),
            Some("echo")
        );
        assert_eq!(Compound::var("x", Span::empty()).literal_text(), None);
        assert_eq!(
            Compound::indexed_var(
                "xs",
                vec![Compound::bareword("0", Span::empty())],
                Span::empty()
            )
            .literal_text(),
            None
        );
    }
}
