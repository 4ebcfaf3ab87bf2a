//! Diagnostic reporting for kestrel.
//!
//! The lowering pass produces [`Diagnostic`] values carrying a stable
//! [`DiagnosticCode`] and the [`Span`] of the offending closure site. It never
//! prints them; callers render them with a [`DiagnosticEmitter`].
//!
//! # Example
//!
//! ```
//! use kestrel_diagnostics::{
//!     Diagnostic, DiagnosticCode, DiagnosticEmitter, SourceCache, Span, TerminalEmitter,
//! };
//!
//! let mut cache = SourceCache::new();
//! let file_id = cache.add_file("Main.java", "Runnable r = () -> i++;".to_string());
//!
//! let diag = Diagnostic::new(DiagnosticCode::InvalidCapture, "local `i` is not effectively final")
//!     .with_span(Span::new(file_id, 19, 22))
//!     .build();
//!
//! let mut out = Vec::new();
//! TerminalEmitter::new(&mut out, false).emit(&diag, &cache).unwrap();
//! ```

pub mod diagnostic;
pub mod emitter;
pub mod source_cache;
pub mod span;

pub use diagnostic::{Diagnostic, DiagnosticBuilder, DiagnosticCode, Diagnostics};
pub use emitter::{DiagnosticEmitter, JsonEmitter, TerminalEmitter};
pub use source_cache::{SourceCache, SourceFile};
pub use span::{FileId, Location, Span};
