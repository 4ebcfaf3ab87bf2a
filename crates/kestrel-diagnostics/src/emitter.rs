//! Renderers for diagnostics: human-readable terminal output and JSON lines.

use crate::diagnostic::{Diagnostic, Diagnostics};
use crate::source_cache::SourceCache;
use std::io::Write;

/// Output sink for diagnostics.
pub trait DiagnosticEmitter {
    fn emit(&mut self, diagnostic: &Diagnostic, cache: &SourceCache) -> std::io::Result<()>;

    fn emit_all(&mut self, diagnostics: &Diagnostics, cache: &SourceCache) -> std::io::Result<()> {
        for diag in diagnostics {
            self.emit(diag, cache)?;
        }
        Ok(())
    }

    fn emit_summary(&mut self, diagnostics: &Diagnostics) -> std::io::Result<()>;
}

/// Terminal output with optional ANSI colors and a source excerpt.
pub struct TerminalEmitter<W: Write> {
    writer: W,
    colored: bool,
}

impl<W: Write> TerminalEmitter<W> {
    pub fn new(writer: W, colored: bool) -> Self {
        Self { writer, colored }
    }

    fn paint(&self, code: &'static str) -> &'static str {
        if self.colored {
            code
        } else {
            ""
        }
    }
}

impl<W: Write> DiagnosticEmitter for TerminalEmitter<W> {
    fn emit(&mut self, diagnostic: &Diagnostic, cache: &SourceCache) -> std::io::Result<()> {
        let color = self.paint("\x1b[31m");
        let reset = self.paint("\x1b[0m");
        let bold = self.paint("\x1b[1m");
        let cyan = self.paint("\x1b[36m");

        // error[L002]: message
        writeln!(
            self.writer,
            "{}{}error[{}]{}: {}",
            bold,
            color,
            diagnostic.code,
            reset,
            diagnostic.message
        )?;

        if let Some(loc) = cache.location(diagnostic.span) {
            writeln!(self.writer, "  {}-->{} {}", cyan, reset, loc)?;

            let excerpt = cache
                .get_file(diagnostic.span.file_id)
                .and_then(|file| file.line_text(loc.line));
            if let Some(line_text) = excerpt {
                let gutter = loc.line.to_string();
                let padding = " ".repeat(gutter.len());
                let indent = " ".repeat(loc.column.saturating_sub(1) as usize);
                let room = line_text.len().saturating_sub(indent.len()).max(1);
                let carets = "^".repeat((diagnostic.span.len().max(1) as usize).min(room));

                writeln!(self.writer, "{} {}|{}", padding, cyan, reset)?;
                writeln!(self.writer, "{}{} |{} {}", cyan, gutter, reset, line_text)?;
                writeln!(
                    self.writer,
                    "{} {}|{} {}{}{}{}",
                    padding, cyan, reset, indent, color, carets, reset
                )?;
            }
        }

        if let Some(help) = &diagnostic.help {
            writeln!(self.writer, "  {}= help:{} {}", cyan, reset, help)?;
        }

        writeln!(self.writer)
    }

    fn emit_summary(&mut self, diagnostics: &Diagnostics) -> std::io::Result<()> {
        let errors = diagnostics.len();
        if errors == 0 {
            return Ok(());
        }
        let color = self.paint("\x1b[31m");
        let reset = self.paint("\x1b[0m");
        writeln!(
            self.writer,
            "{}{} error{} emitted{}",
            color,
            errors,
            if errors == 1 { "" } else { "s" },
            reset
        )
    }
}

/// One JSON object per line, for tooling.
pub struct JsonEmitter<W: Write> {
    writer: W,
}

impl<W: Write> JsonEmitter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write> DiagnosticEmitter for JsonEmitter<W> {
    fn emit(&mut self, diagnostic: &Diagnostic, cache: &SourceCache) -> std::io::Result<()> {
        let json = serde_json::json!({
            "code": diagnostic.code.as_str(),
            "severity": "error",
            "message": diagnostic.message,
            "location": cache.location(diagnostic.span).map(|l| serde_json::json!({
                "file": l.file,
                "line": l.line,
                "column": l.column,
            })),
            "span": if diagnostic.span.is_dummy() {
                serde_json::Value::Null
            } else {
                serde_json::json!({
                    "start": diagnostic.span.start,
                    "end": diagnostic.span.end,
                })
            },
            "help": diagnostic.help,
        });
        serde_json::to_writer(&mut self.writer, &json)?;
        writeln!(self.writer)
    }

    fn emit_summary(&mut self, diagnostics: &Diagnostics) -> std::io::Result<()> {
        let summary = serde_json::json!({
            "type": "summary",
            "errors": diagnostics.len(),
        });
        serde_json::to_writer(&mut self.writer, &summary)?;
        writeln!(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DiagnosticCode, Span};

    #[test]
    fn test_terminal_emitter_plain() {
        let mut cache = SourceCache::new();
        let id = cache.add_file("A.java", "Runnable r = () -> i++;\n".to_string());
        let diag = Diagnostic::new(DiagnosticCode::InvalidCapture, "local `i` is not effectively final")
            .with_span(Span::new(id, 19, 22))
            .build();

        let mut out = Vec::new();
        TerminalEmitter::new(&mut out, false).emit(&diag, &cache).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("error[L002]: local `i` is not effectively final"));
        assert!(text.contains("--> A.java:1:20"));
        assert!(text.contains("^^^"));
    }

    #[test]
    fn test_json_emitter_writes_code() {
        let cache = SourceCache::new();
        let diag = Diagnostic::new(DiagnosticCode::AmbiguousOrMissingSam, "no abstract method").build();
        let mut out = Vec::new();
        JsonEmitter::new(&mut out).emit(&diag, &cache).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["code"], "L001");
        assert!(value["location"].is_null());
    }
}
