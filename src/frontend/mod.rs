//! Frontend module - Lexer, Parser, Import Resolution

pub mod token;
pub mod lexer;
pub mod ast;
pub mod parser;
pub mod module;
