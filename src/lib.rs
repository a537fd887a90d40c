//! js2esi
//!
//! Compiles a small JavaScript-like language into Edge Side Includes (ESI)
//! markup. Since ESI has neither loops nor user-defined functions, programs
//! are lowered at compile time: `require`d units are spliced in, constants
//! folded, inline functions substituted and loops over known collections
//! unrolled before the markup is generated.

pub mod backend;
pub mod config;
pub mod driver;
pub mod feedback;
pub mod frontend;
pub mod middle;
pub mod utils;

pub use config::CompileOptions;
pub use driver::{Compiler, Unit};
pub use utils::{Error, ErrorKind, Result};
