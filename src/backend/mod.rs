//! Backend module - Code generation

pub mod codegen;

// ESI markup backend
pub mod esi;

pub use codegen::CodeGen;
pub use esi::EsiCodeGen;
