//! Closure conversion failures.
//!
//! Every failure is fatal to the compilation unit being lowered.

use kestrel_diagnostics::{Diagnostic, DiagnosticCode, Span};
use thiserror::Error;

/// Category of a closure conversion failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Target type resolves to zero or several abstract methods
    AmbiguousOrMissingSam,
    /// Body reads or writes a binding that cannot be captured
    InvalidCapture,
    /// Method reference does not resolve to exactly one applicable member
    UnresolvableReference,
    /// SAM signature cannot be reconciled with the body or target signature
    IncompatibleArity,
}

impl ErrorKind {
    pub fn code(self) -> DiagnosticCode {
        match self {
            ErrorKind::AmbiguousOrMissingSam => DiagnosticCode::AmbiguousOrMissingSam,
            ErrorKind::InvalidCapture => DiagnosticCode::InvalidCapture,
            ErrorKind::UnresolvableReference => DiagnosticCode::UnresolvableReference,
            ErrorKind::IncompatibleArity => DiagnosticCode::IncompatibleArity,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::AmbiguousOrMissingSam => "ambiguous or missing functional interface method",
            ErrorKind::InvalidCapture => "invalid capture",
            ErrorKind::UnresolvableReference => "unresolvable method reference",
            ErrorKind::IncompatibleArity => "incompatible arity",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A closure conversion failure at one closure site
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ClosureError {
    pub kind: ErrorKind,
    /// Span of the offending lambda or method reference
    pub span: Span,
    pub message: String,
}

impl ClosureError {
    pub fn new(kind: ErrorKind, span: Span, message: impl Into<String>) -> Self {
        Self {
            kind,
            span,
            message: message.into(),
        }
    }

    pub fn missing_sam(span: Span, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AmbiguousOrMissingSam, span, message)
    }

    pub fn invalid_capture(span: Span, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidCapture, span, message)
    }

    pub fn unresolvable(span: Span, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnresolvableReference, span, message)
    }

    pub fn arity(span: Span, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::IncompatibleArity, span, message)
    }

    /// Convert into a diagnostic for the reporting layer.
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::new(self.kind.code(), self.message.clone())
            .with_span(self.span)
            .with_help(match self.kind {
                ErrorKind::AmbiguousOrMissingSam => {
                    "the target type must have exactly one abstract method"
                }
                ErrorKind::InvalidCapture => {
                    "only effectively final locals and reachable enclosing instances can be captured"
                }
                ErrorKind::UnresolvableReference => {
                    "the reference must resolve to exactly one applicable member"
                }
                ErrorKind::IncompatibleArity => {
                    "the functional interface method and the target must agree on parameters and result"
                }
            })
            .build()
    }
}

pub type Result<T> = std::result::Result<T, ClosureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_carries_code_and_span() {
        let span = Span::new(kestrel_diagnostics::FileId(0), 3, 9);
        let err = ClosureError::invalid_capture(span, "local `i` is not effectively final");
        assert_eq!(
            err.to_string(),
            "invalid capture: local `i` is not effectively final"
        );
        let diag = err.to_diagnostic();
        assert_eq!(diag.code.as_str(), "L002");
        assert_eq!(diag.span, span);
    }
}
