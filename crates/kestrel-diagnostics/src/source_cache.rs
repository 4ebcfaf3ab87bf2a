//! Source text of compilation units, used to render spans as locations and
//! excerpts.

use crate::span::{FileId, Location, Span};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct SourceFile {
    pub id: FileId,
    pub path: PathBuf,
    text: String,
    /// Byte offset at which each line begins
    lines: Vec<u32>,
}

impl SourceFile {
    fn new(id: FileId, path: PathBuf, text: String) -> Self {
        let mut lines = vec![0];
        lines.extend(text.match_indices('\n').map(|(i, _)| i as u32 + 1));
        Self { id, path, text, lines }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// 1-indexed line and column of `offset`, clamped to the end of the text.
    pub fn line_column(&self, offset: u32) -> (u32, u32) {
        let offset = offset.min(self.text.len() as u32);
        let line = self.lines.partition_point(|&start| start <= offset);
        (line as u32, offset - self.lines[line - 1] + 1)
    }

    /// Byte offset of a 1-indexed line and column, clamped to the text.
    /// Decoders such as serde_json report positions this way.
    pub fn offset(&self, line: u32, column: u32) -> u32 {
        let index = (line.max(1) as usize - 1).min(self.lines.len() - 1);
        let end = self.text.len() as u32;
        (self.lines[index] + column.saturating_sub(1)).min(end)
    }

    /// Text of a 1-indexed line, without its terminator
    pub fn line_text(&self, line: u32) -> Option<&str> {
        let index = (line as usize).checked_sub(1)?;
        let start = *self.lines.get(index)? as usize;
        let end = self.lines.get(index + 1).map_or(self.text.len(), |&next| next as usize);
        self.text.get(start..end).map(|l| l.trim_end_matches(['\n', '\r']))
    }
}

/// Files indexed by [`FileId`], in registration order
#[derive(Debug, Default)]
pub struct SourceCache {
    files: Vec<SourceFile>,
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `text` under `path`. A path already present keeps its first id and text.
    pub fn add_file(&mut self, path: impl AsRef<Path>, text: String) -> FileId {
        let path = path.as_ref();
        if let Some(file) = self.files.iter().find(|f| f.path == path) {
            return file.id;
        }
        let id = FileId(self.files.len() as u32);
        self.files.push(SourceFile::new(id, path.to_path_buf(), text));
        id
    }

    /// Read `path` from disk and register it.
    pub fn load(&mut self, path: impl AsRef<Path>) -> std::io::Result<FileId> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Ok(self.add_file(path, text))
    }

    pub fn get_file(&self, id: FileId) -> Option<&SourceFile> {
        self.files.get(id.0 as usize)
    }

    pub fn location(&self, span: Span) -> Option<Location> {
        if span.is_dummy() {
            return None;
        }
        let file = self.get_file(span.file_id)?;
        let (line, column) = file.line_column(span.start);
        Some(Location {
            file: file.path.display().to_string(),
            line,
            column,
        })
    }
}
