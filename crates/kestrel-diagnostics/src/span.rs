//! Source positions carried by closure sites and declarations.
//!
//! Spans arrive with the resolved tree and are copied onto everything the
//! lowering pass synthesizes from a site, so an adapter and its method point
//! back at the lambda or method reference they came from.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId(pub u32);

impl FileId {
    /// Nodes built without source text, such as test fixtures
    pub const DUMMY: FileId = FileId(u32::MAX);
}

/// Half-open byte range `start..end` in one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub file_id: FileId,
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub const DUMMY: Span = Span {
        file_id: FileId::DUMMY,
        start: 0,
        end: 0,
    };

    pub fn new(file_id: FileId, start: u32, end: u32) -> Self {
        Self { file_id, start, end }
    }

    pub fn is_dummy(&self) -> bool {
        self.file_id == FileId::DUMMY
    }

    /// Width in bytes; inverted ranges count as empty.
    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }
}

impl Default for Span {
    fn default() -> Self {
        Self::DUMMY
    }
}

/// `file:line:column`, 1-indexed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spans_in_tree_json() {
        let span: Span = serde_json::from_str(r#"{"file_id":0,"start":14,"end":27}"#).unwrap();
        assert_eq!(span, Span::new(FileId(0), 14, 27));
        assert_eq!(span.len(), 13);
        assert!(!span.is_dummy());
        assert!(Span::default().is_dummy());
        assert_eq!(Span::new(FileId(0), 9, 3).len(), 0);
    }
}
