use crate::loader::{LoadError, SourceMap};
use crate::semantic::errors::SemanticError;
use crate::span::{line_of, Span};
use codespan_reporting::diagnostic::{self, Label};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use thiserror::Error;

/// Lex-time error.
#[derive(Debug, Clone, Error)]
#[error("{kind}")]
pub struct LexError {
    pub kind: LexErrorKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexErrorKind {
    #[error("Unexpected character '{0}'.")]
    UnexpectedCharacter(char),
    #[error("Unexpected character '{0}' following '$'.")]
    UnexpectedAfterDollar(char),
    #[error("EOF encountered while reading string literal")]
    UnterminatedString,
    #[error("Incompleted block comment")]
    UnterminatedBlockComment,
    #[error("invalid escape sequence '\\{0}'")]
    InvalidEscape(char),
    #[error("invalid numeric literal '{0}'")]
    InvalidNumber(String),
}

/// Parse-time error.
#[derive(Debug, Clone, Error)]
#[error("{kind}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseErrorKind {
    #[error("expected {expected}, found {got}")]
    UnexpectedToken { expected: String, got: String },
    #[error("expected expression, found {0}")]
    ExpectedExpression(String),
    #[error("expected type, found {0}")]
    ExpectedType(String),
    #[error("invalid assignment target")]
    InvalidAssignmentTarget,
    #[error("compound assignment is not supported")]
    CompoundAssignment,
    #[error("unknown directive '#{0}'")]
    UnknownDirective(String),
    #[error("static array length must be a positive integer literal")]
    BadArrayLength,
    #[error("variadic parameter must be the last parameter")]
    VariadicNotLast,
}

/// Assertion-style failure inside the compiler; never caused by user input
/// that passed the earlier stages.
#[derive(Debug, Clone, Error)]
#[error("<internal>: {context}")]
pub struct InternalError {
    pub context: String,
}

impl InternalError {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
        }
    }
}

/// First error raised by any stage. Compilation stops at the first one.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Semantic(#[from] SemanticError),
    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl CompileError {
    pub fn span(&self) -> Option<Span> {
        match self {
            CompileError::Lex(e) => Some(e.span),
            CompileError::Parse(e) => Some(e.span),
            CompileError::Load(e) => e.span(),
            CompileError::Semantic(e) => Some(e.span),
            CompileError::Internal(_) => None,
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, CompileError::Internal(_))
    }
}

pub type CompileResult<T> = Result<T, CompileError>;

/// Renders compiler diagnostics to stderr.
///
/// Every loaded file is registered in load order, so a `FileId(n)` in a
/// span is the `n`-th file in the codespan database.
pub struct ErrorReporter {
    files: SimpleFiles<String, String>,
    names: Vec<String>,
}

impl ErrorReporter {
    pub fn new(sources: &SourceMap) -> Self {
        let mut files = SimpleFiles::new();
        let mut names = Vec::new();
        for file in sources.files() {
            files.add(file.name.clone(), file.text.clone());
            names.push(file.name.clone());
        }
        Self { files, names }
    }

    /// The `file:line: message` header printed before the snippet.
    pub fn header(&self, err: &CompileError) -> String {
        if err.is_internal() {
            return err.to_string();
        }
        match err.span() {
            Some(span) => {
                let idx = span.file.0 as usize;
                match (self.names.get(idx), self.files.get(idx)) {
                    (Some(name), Ok(file)) => {
                        let line = line_of(file.source(), span.start);
                        format!("{name}:{line}: {err}")
                    }
                    _ => err.to_string(),
                }
            }
            None => err.to_string(),
        }
    }

    pub fn report(&self, err: &CompileError) {
        eprintln!("{}", self.header(err));
        let Some(span) = err.span() else {
            return;
        };
        if self.files.get(span.file.0 as usize).is_err() {
            return;
        }
        let diag = diagnostic::Diagnostic::error()
            .with_message(err.to_string())
            .with_labels(vec![Label::primary(
                span.file.0 as usize,
                span.start..span.end,
            )]);
        self.emit(&diag);
    }

    fn emit(&self, diag: &diagnostic::Diagnostic<usize>) {
        let writer = StandardStream::stderr(ColorChoice::Auto);
        let config = term::Config::default();
        let _ = term::emit(&mut writer.lock(), &config, &self.files, diag);
    }
}
