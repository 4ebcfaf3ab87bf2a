//! Diagnostic values produced by the lowering pipeline.

use crate::span::Span;
use serde::{Deserialize, Serialize};

/// Stable diagnostic codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    // Closure lowering (L001-L099)
    /// Target type has zero or several abstract methods
    AmbiguousOrMissingSam,
    /// Captured binding is mutable or cannot be resolved
    InvalidCapture,
    /// Method reference does not resolve to exactly one member
    UnresolvableReference,
    /// SAM and target signatures cannot be reconciled
    IncompatibleArity,

    // Input errors (E001-E099)
    /// Compilation unit that does not decode
    InvalidInput,
}

impl DiagnosticCode {
    pub const ALL: [DiagnosticCode; 5] = [
        DiagnosticCode::AmbiguousOrMissingSam,
        DiagnosticCode::InvalidCapture,
        DiagnosticCode::UnresolvableReference,
        DiagnosticCode::IncompatibleArity,
        DiagnosticCode::InvalidInput,
    ];

    /// Get the code string (e.g., "L002").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AmbiguousOrMissingSam => "L001",
            Self::InvalidCapture => "L002",
            Self::UnresolvableReference => "L003",
            Self::IncompatibleArity => "L004",
            Self::InvalidInput => "E001",
        }
    }

    /// Parse a code string, case-insensitively.
    pub fn from_code(code: &str) -> Option<DiagnosticCode> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(code))
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A reported problem with its location and optional help text. Every
/// diagnostic is an error; lowering has no warning tier.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    /// Short single-line message
    pub message: String,
    /// Primary location
    pub span: Span,
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn new(code: DiagnosticCode, message: impl Into<String>) -> DiagnosticBuilder {
        DiagnosticBuilder::new(code, message)
    }
}

/// Builder for constructing diagnostics fluently.
pub struct DiagnosticBuilder {
    inner: Diagnostic,
}

impl DiagnosticBuilder {
    pub fn new(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            inner: Diagnostic {
                code,
                message: message.into(),
                span: Span::DUMMY,
                help: None,
            },
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.inner.span = span;
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.inner.help = Some(help.into());
        self
    }

    pub fn build(self) -> Diagnostic {
        self.inner
    }
}

/// Diagnostics of one run, in report order
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }
}

impl From<Diagnostic> for Diagnostics {
    fn from(diagnostic: Diagnostic) -> Self {
        Self {
            items: vec![diagnostic],
        }
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip_through_strings() {
        for code in DiagnosticCode::ALL {
            assert_eq!(DiagnosticCode::from_code(code.as_str()), Some(code));
        }
        assert_eq!(
            DiagnosticCode::from_code("l003"),
            Some(DiagnosticCode::UnresolvableReference)
        );
        assert_eq!(DiagnosticCode::from_code("e001"), Some(DiagnosticCode::InvalidInput));
        assert_eq!(DiagnosticCode::from_code("X999"), None);
    }

    #[test]
    fn test_builder_sets_fields() {
        let diag = Diagnostic::new(DiagnosticCode::InvalidCapture, "local `i` is reassigned")
            .with_help("copy it into a final local first")
            .build();
        assert_eq!(diag.code.as_str(), "L002");
        assert_eq!(diag.help.as_deref(), Some("copy it into a final local first"));
        assert!(diag.span.is_dummy());
    }
}
