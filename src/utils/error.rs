//! Error handling for the js2esi compiler

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::utils::{SourceMap, Span};

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Compiler error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // ==================== Lexer Errors ====================

    #[error("unrecognized character '{ch}'")]
    UnexpectedChar { ch: char, span: Span },

    #[error("unterminated string literal")]
    UnterminatedString { span: Span },

    #[error("unterminated block comment")]
    UnterminatedComment { span: Span },

    #[error("invalid number literal '{text}'")]
    InvalidNumber { text: String, span: Span },

    #[error("float literal '{text}' is not supported; ESI arithmetic is integer-only")]
    FloatLiteral { text: String, span: Span },

    // ==================== Parser Errors ====================

    #[error("unexpected token: expected {expected}, got {got}")]
    UnexpectedToken {
        expected: String,
        got: String,
        span: Span,
    },

    #[error("expected expression, got {got}")]
    ExpectedExpr { got: String, span: Span },

    #[error("expected identifier, got {got}")]
    ExpectedIdent { got: String, span: Span },

    /// A construct that is grammatical but not allowed where it appears
    #[error("{message}")]
    Misplaced { message: String, span: Span },

    // ==================== Import Errors ====================

    #[error("could not resolve require('{path}')")]
    UnresolvedImport { path: String, span: Span },

    #[error("forced require('{path}') re-enters a unit that is still being expanded")]
    ImportCycle { path: String, span: Span },

    // ==================== Lowering Errors ====================

    #[error("cannot inline {function}(): {message}")]
    Inline {
        function: String,
        message: String,
        span: Span,
    },

    #[error("loop collection is not statically enumerable: {message}")]
    UnboundedLoop { message: String, span: Span },

    #[error("unsupported construct: {message}")]
    Unsupported { message: String, span: Span },

    #[error("compile limit exceeded: {message}")]
    LimitExceeded { message: String, span: Span },

    #[error("IO error: {0}")]
    Io(String),
}

/// Stable classification of an `Error`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    LexError,
    ParseError,
    UnresolvedImportError,
    ImportCycle,
    InlineError,
    UnboundedLoopError,
    UnsupportedConstruct,
    CompileLimitExceeded,
    Io,
}

impl ErrorKind {
    /// Short diagnostic code, stable across releases
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::LexError => "E0001",
            ErrorKind::ParseError => "E0002",
            ErrorKind::UnresolvedImportError => "E0003",
            ErrorKind::ImportCycle => "E0004",
            ErrorKind::InlineError => "E0005",
            ErrorKind::UnboundedLoopError => "E0006",
            ErrorKind::UnsupportedConstruct => "E0007",
            ErrorKind::CompileLimitExceeded => "E0008",
            ErrorKind::Io => "E0009",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::LexError => "lex error",
            ErrorKind::ParseError => "parse error",
            ErrorKind::UnresolvedImportError => "unresolved import",
            ErrorKind::ImportCycle => "import cycle",
            ErrorKind::InlineError => "inline error",
            ErrorKind::UnboundedLoopError => "unbounded loop",
            ErrorKind::UnsupportedConstruct => "unsupported construct",
            ErrorKind::CompileLimitExceeded => "compile limit exceeded",
            ErrorKind::Io => "io error",
        };
        f.write_str(name)
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnexpectedChar { .. }
            | Self::UnterminatedString { .. }
            | Self::UnterminatedComment { .. }
            | Self::InvalidNumber { .. }
            | Self::FloatLiteral { .. } => ErrorKind::LexError,
            Self::UnexpectedToken { .. }
            | Self::ExpectedExpr { .. }
            | Self::ExpectedIdent { .. }
            | Self::Misplaced { .. } => ErrorKind::ParseError,
            Self::UnresolvedImport { .. } => ErrorKind::UnresolvedImportError,
            Self::ImportCycle { .. } => ErrorKind::ImportCycle,
            Self::Inline { .. } => ErrorKind::InlineError,
            Self::UnboundedLoop { .. } => ErrorKind::UnboundedLoopError,
            Self::Unsupported { .. } => ErrorKind::UnsupportedConstruct,
            Self::LimitExceeded { .. } => ErrorKind::CompileLimitExceeded,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Get the span associated with this error
    pub fn span(&self) -> Option<Span> {
        match self {
            Self::UnexpectedChar { span, .. }
            | Self::UnterminatedString { span }
            | Self::UnterminatedComment { span }
            | Self::InvalidNumber { span, .. }
            | Self::FloatLiteral { span, .. }
            | Self::UnexpectedToken { span, .. }
            | Self::ExpectedExpr { span, .. }
            | Self::ExpectedIdent { span, .. }
            | Self::Misplaced { span, .. }
            | Self::UnresolvedImport { span, .. }
            | Self::ImportCycle { span, .. }
            | Self::Inline { span, .. }
            | Self::UnboundedLoop { span, .. }
            | Self::Unsupported { span, .. }
            | Self::LimitExceeded { span, .. } => Some(*span),
            Self::Io(_) => None,
        }
    }

    pub(crate) fn unsupported(message: impl Into<String>, span: Span) -> Self {
        Self::Unsupported { message: message.into(), span }
    }

    pub(crate) fn inline(function: &str, message: impl Into<String>, span: Span) -> Self {
        Self::Inline {
            function: function.to_string(),
            message: message.into(),
            span,
        }
    }

    /// `file:line:col: kind: message`
    pub fn render(&self, sources: &SourceMap) -> String {
        match self.span() {
            Some(span) => format!("{}: {}: {}", sources.locate(span), self.kind(), self),
            None => format!("{}: {}", self.kind(), self),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}
