//! Reference evaluator for Kestrel
//!
//! Executes a lowered [`CompilationUnit`](kestrel_hir::CompilationUnit)
//! directly over the tree. Closures are ordinary objects of their adapter
//! type: the evaluator has no notion of lambdas and reports
//! [`RuntimeError::UnloweredClosure`] if one survives lowering.

pub mod error;
pub mod interpreter;
pub mod value;

pub use error::{Result, RuntimeError};
pub use interpreter::Interpreter;
pub use value::{Object, ObjectRef, Value};
