//! Code Generation trait - Backend abstraction

use crate::frontend::ast::Program;
use crate::utils::Result;

/// Code generation backend trait
pub trait CodeGen {
    /// Render a fully lowered program as target text
    fn generate(&mut self, program: &Program) -> Result<String>;

    /// Get the target dialect (e.g., "esi/1.0")
    fn dialect(&self) -> &str;

    /// Get the backend name
    fn name(&self) -> &str;
}
