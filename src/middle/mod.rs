//! Middle-end module - AST lowering passes

pub mod fold;
pub mod inline;
pub mod unroll;
pub mod optimize;
