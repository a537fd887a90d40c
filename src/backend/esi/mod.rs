//! ESI Backend - Generate Edge Side Includes markup from the lowered AST
//!
//! The target has conditionals, try/except and includes, but no loops and no
//! user-defined functions, so it only accepts programs after inlining and
//! unrolling.

mod captures;
mod esi_codegen;

pub use esi_codegen::{EsiCodeGen, WARNING_BANNER};
