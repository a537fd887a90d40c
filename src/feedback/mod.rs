//! Structured Feedback Module
//!
//! Machine-readable compilation reports:
//! - JSON diagnostics with a stable code and kind
//! - Lowering and import statistics

use serde::Serialize;

use crate::frontend::module::ImportStats;
use crate::middle::optimize::PassStats;
use crate::utils::{Error, ErrorKind, Location, SourceMap};

// ==================== Structured Error Report ====================

/// One diagnostic of a compilation unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    /// Error code (e.g., "E0005")
    pub code: &'static str,

    pub kind: ErrorKind,

    /// Human-readable message
    pub message: String,

    /// Where the error was detected, when it has a source position
    pub location: Option<Location>,

    /// How the source could be changed to compile
    pub help: Option<String>,
}

impl ErrorReport {
    /// Create an error report from a compiler error
    pub fn from_error(error: &Error, sources: &SourceMap) -> Self {
        let kind = error.kind();
        Self {
            code: kind.code(),
            kind,
            message: error.to_string(),
            location: error.span().map(|span| sources.locate(span)),
            help: help_for(error).map(str::to_string),
        }
    }
}

fn help_for(error: &Error) -> Option<&'static str> {
    match error {
        Error::Inline { message, .. } if message.contains("recursive") => {
            Some("inline functions are expanded at compile time and cannot recurse")
        }
        Error::Inline { message, .. } if message.contains("single") => {
            Some("reduce the body to one `return <expr>;` statement")
        }
        Error::UnboundedLoop { .. } => {
            Some("iterate over `[a..b]` with literal bounds or an array of literals")
        }
        Error::Unsupported { message, .. } if message.contains("not an inline function") => {
            Some("mark the function with a leading \"inline\"; statement")
        }
        Error::Unsupported { message, .. } if message.contains("break") => {
            Some("make the `break` condition depend only on the loop variable and literals")
        }
        Error::LimitExceeded { .. } => Some("raise `max_loop_iterations` or narrow the collection"),
        Error::UnresolvedImport { .. } => Some("add the directory containing the unit with `-L`"),
        _ => None,
    }
}

// ==================== Compilation Feedback ====================

/// Counters for one compilation unit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompilationStats {
    pub imports: ImportStats,

    #[serde(flatten)]
    pub passes: PassStats,

    /// Size of the generated markup
    pub bytes_emitted: usize,

    /// Total time
    pub total_time_ms: u64,
}

/// Complete compilation feedback for one unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompilationReport {
    /// Compilation status
    pub success: bool,

    /// Source file
    pub source_file: String,

    pub diagnostics: Vec<ErrorReport>,

    pub stats: CompilationStats,
}

impl CompilationReport {
    pub fn success(source_file: String, stats: CompilationStats) -> Self {
        Self {
            success: true,
            source_file,
            diagnostics: vec![],
            stats,
        }
    }

    pub fn failure(source_file: String, errors: Vec<ErrorReport>, stats: CompilationStats) -> Self {
        Self {
            success: false,
            source_file,
            diagnostics: errors,
            stats,
        }
    }

    /// Output as JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Output as compact JSON (one report per line)
    pub fn to_json_compact(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
