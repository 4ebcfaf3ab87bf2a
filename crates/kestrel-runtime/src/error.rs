//! Evaluation faults.

use crate::value::Value;
use thiserror::Error;

/// A fault raised while evaluating a lowered tree
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    #[error("null pointer: {0}")]
    NullPointer(String),

    #[error("class cast: {0}")]
    ClassCast(String),

    #[error("arithmetic: {0}")]
    Arithmetic(String),

    #[error("array index {index} out of bounds for length {length}")]
    IndexOutOfBounds { index: i32, length: usize },

    #[error("negative array size {0}")]
    NegativeArraySize(i32),

    /// A value raised by a `throw` statement and not caught
    #[error("uncaught exception {0}")]
    Thrown(Value),

    #[error("no method `{name}` on {class}")]
    NoSuchMethod { class: String, name: String },

    #[error("lambda or method reference reached evaluation without being lowered")]
    UnloweredClosure,

    #[error("call depth exceeded {0}")]
    StackOverflow(usize),

    /// The tree violates an invariant the front end guarantees
    #[error("invalid program: {0}")]
    Invalid(String),
}

impl RuntimeError {
    pub fn invalid(message: impl Into<String>) -> Self {
        RuntimeError::Invalid(message.into())
    }

    pub fn null(message: impl Into<String>) -> Self {
        RuntimeError::NullPointer(message.into())
    }
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
