//! Utility module

mod error;
mod source;

pub use error::{Error, ErrorKind, Result};
pub use source::{Location, SourceMap, Span};
