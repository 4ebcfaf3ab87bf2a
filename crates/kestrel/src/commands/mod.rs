//! CLI command implementations

pub mod explain;
pub mod lower;
pub mod run;

use crate::OutputFormat;
use anyhow::{anyhow, Context, Result};
use kestrel_diagnostics::{
    Diagnostic, DiagnosticCode, DiagnosticEmitter, Diagnostics, JsonEmitter, SourceCache, Span, TerminalEmitter,
};
use kestrel_hir::CompilationUnit;
use kestrel_transform::ClosureError;
use std::path::Path;

/// Read a resolved compilation unit from its JSON form. A unit that does not
/// decode is reported as E001 at the position the decoder stopped.
pub fn read_unit(path: &Path, format: OutputFormat, use_color: bool) -> Result<CompilationUnit> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let mut cache = SourceCache::new();
    match decode_unit(path, text, &mut cache) {
        Ok(unit) => {
            log::debug!("{}: {} type(s) from {}", unit.name, unit.types.len(), path.display());
            Ok(unit)
        }
        Err(diagnostic) => {
            report(&Diagnostics::from(diagnostic), &cache, format, use_color)?;
            Err(anyhow!("{} is not a valid compilation unit", path.display()))
        }
    }
}

/// On failure the text is registered in `cache` so the diagnostic renders
/// with an excerpt of the offending line.
fn decode_unit(path: &Path, text: String, cache: &mut SourceCache) -> std::result::Result<CompilationUnit, Diagnostic> {
    let err = match serde_json::from_str::<CompilationUnit>(&text) {
        Ok(unit) => return Ok(unit),
        Err(err) => err,
    };
    let file_id = cache.add_file(path, text);
    let span = match cache.get_file(file_id) {
        Some(file) if err.line() > 0 => {
            let start = file.offset(err.line() as u32, err.column() as u32);
            Span::new(file_id, start, start + 1)
        }
        _ => Span::DUMMY,
    };
    let help = match err.classify() {
        serde_json::error::Category::Eof => "the file ends before the unit is complete",
        serde_json::error::Category::Syntax => "the file is not well-formed JSON",
        _ => "the input must be a resolved compilation unit as written by the front end",
    };
    Err(Diagnostic::new(DiagnosticCode::InvalidInput, format!("malformed compilation unit: {}", err))
        .with_span(span)
        .with_help(help)
        .build())
}

/// Source text of the unit, when it names a readable file, so spans render with an excerpt.
fn source_cache(unit: &CompilationUnit) -> SourceCache {
    let mut cache = SourceCache::new();
    if let Some(path) = &unit.source_path {
        if let Err(err) = cache.load(path) {
            log::debug!("no source excerpt for {}: {}", path, err);
        }
    }
    cache
}

/// Report a lowering failure.
pub fn report_failure(err: &ClosureError, unit: &CompilationUnit, format: OutputFormat, use_color: bool) -> Result<()> {
    report(&Diagnostics::from(err.to_diagnostic()), &source_cache(unit), format, use_color)
}

/// Text goes to stderr, JSON lines to stdout.
fn report(diagnostics: &Diagnostics, cache: &SourceCache, format: OutputFormat, use_color: bool) -> Result<()> {
    match format {
        OutputFormat::Text => {
            let mut emitter = TerminalEmitter::new(std::io::stderr().lock(), use_color);
            emitter.emit_all(diagnostics, cache)?;
            emitter.emit_summary(diagnostics)?;
        }
        OutputFormat::Json => {
            let mut emitter = JsonEmitter::new(std::io::stdout().lock());
            emitter.emit_all(diagnostics, cache)?;
            emitter.emit_summary(diagnostics)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_unit_points_at_the_bad_line() {
        let mut cache = SourceCache::new();
        let text = "{\n  \"name\": \"Main\",\n  types: []\n}\n".to_string();
        let diag = decode_unit(Path::new("Main.json"), text, &mut cache).unwrap_err();
        assert_eq!(diag.code, DiagnosticCode::InvalidInput);
        assert_eq!(diag.help.as_deref(), Some("the file is not well-formed JSON"));
        let loc = cache.location(diag.span).unwrap();
        assert_eq!((loc.file.as_str(), loc.line), ("Main.json", 3));

        let mut out = Vec::new();
        TerminalEmitter::new(&mut out, false).emit(&diag, &cache).unwrap();
        let rendered = String::from_utf8(out).unwrap();
        assert!(rendered.starts_with("error[E001]: malformed compilation unit"));
        assert!(rendered.contains("3 |   types: []"));
    }

    #[test]
    fn test_truncated_unit_is_invalid_input() {
        let mut cache = SourceCache::new();
        let diag = decode_unit(Path::new("Cut.json"), "{\"name\": \"Cut\"".to_string(), &mut cache).unwrap_err();
        assert_eq!(diag.code, DiagnosticCode::InvalidInput);
        assert_eq!(diag.help.as_deref(), Some("the file ends before the unit is complete"));
    }
}
