//! Source units, spans and line/column resolution

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// A byte range inside one loaded source unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    /// Start byte offset
    pub start: usize,
    /// End byte offset (exclusive)
    pub end: usize,
    /// Index into the `SourceMap`
    pub file_id: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, file_id: usize) -> Self {
        Self { start, end, file_id }
    }

    /// Span for nodes the compiler synthesizes itself
    pub fn dummy() -> Self {
        Self::default()
    }

    /// Smallest span covering both `self` and `other`
    pub fn merge(&self, other: &Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            file_id: self.file_id,
        }
    }
}

/// Human-facing position of a span
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

#[derive(Debug, Clone)]
struct SourceFile {
    name: String,
    path: Option<PathBuf>,
    text: String,
    /// Byte offset of the first character of every line
    line_starts: Vec<usize>,
}

/// Every unit read during one compilation run, indexed by `Span::file_id`
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit and return its file id
    pub fn add(&mut self, name: impl Into<String>, path: Option<&Path>, text: impl Into<String>) -> usize {
        let text = text.into();
        let mut line_starts = vec![0];
        line_starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        self.files.push(SourceFile {
            name: name.into(),
            path: path.map(Path::to_path_buf),
            text,
            line_starts,
        });
        self.files.len() - 1
    }

    pub fn text(&self, file_id: usize) -> &str {
        self.files.get(file_id).map(|f| f.text.as_str()).unwrap_or("")
    }

    pub fn name(&self, file_id: usize) -> &str {
        self.files.get(file_id).map(|f| f.name.as_str()).unwrap_or("<unknown>")
    }

    pub fn path(&self, file_id: usize) -> Option<&Path> {
        self.files.get(file_id).and_then(|f| f.path.as_deref())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Resolve the start of `span` to a 1-based line and column
    pub fn locate(&self, span: Span) -> Location {
        let Some(file) = self.files.get(span.file_id) else {
            return Location { file: "<unknown>".to_string(), line: 0, column: 0 };
        };
        let offset = span.start.min(file.text.len());
        let line_idx = match file.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let line_start = file.line_starts[line_idx];
        let column = file.text[line_start..offset].chars().count() + 1;
        Location {
            file: file.name.clone(),
            line: line_idx + 1,
            column,
        }
    }
}
