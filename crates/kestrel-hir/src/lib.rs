//! Resolved tree for kestrel
//!
//! The HIR is the typed, symbol-resolved representation produced by the front
//! end. Closure conversion rewrites it in place; the reference evaluator and
//! downstream code emission consume the result.

pub mod build;
pub mod hierarchy;
pub mod ir;
pub mod visit;

pub use hierarchy::type_bindings;
pub use ir::*;
