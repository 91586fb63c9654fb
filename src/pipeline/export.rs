//! Assembly of polished chunks into an output document.
//!
//! Assembly tolerates gaps: a chunk with no checkpoint result falls back to
//! its original text with a warning, so a partially-polished run still
//! exports a complete document. Writes are atomic (temp file + rename in
//! the target directory) so a crash mid-export never leaves a truncated
//! file behind.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::checkpoint::CheckpointStore;
use crate::document::{Chapter, Chunk};
use crate::error::PolishError;

/// One chapter's polished parts, in reading order.
#[derive(Debug, Clone)]
pub struct PolishedChapter {
    pub index: u32,
    /// Display heading, e.g. `Chapter 3: Dawn` or `Prologue`.
    pub title: String,
    pub parts: Vec<String>,
}

/// Join chunks with their checkpoint results into ordered chapters.
pub fn assemble(
    chapters: &[Chapter],
    chunks: &[Chunk],
    store: &CheckpointStore,
) -> Vec<PolishedChapter> {
    let mut out: Vec<PolishedChapter> = chapters
        .iter()
        .filter(|c| !c.body.is_empty())
        .map(|c| PolishedChapter {
            index: c.index,
            title: c.display_title(),
            parts: Vec::new(),
        })
        .collect();

    // chunks arrive in chapter order, parts 1..=part_count within each
    for chunk in chunks {
        let text = match store.result_for(chunk.key()) {
            Some(result) => result.polished_text.clone(),
            None => {
                warn!(
                    "No polished text for {}; exporting the original chunk",
                    chunk.key()
                );
                chunk.text.clone()
            }
        };
        if let Some(chapter) = out.iter_mut().find(|c| c.index == chunk.chapter_index) {
            chapter.parts.push(text);
        }
    }

    out
}

/// Writes assembled chapters to a file in the output directory.
pub trait Exporter {
    /// Format name for logs and `STATUS` lines.
    fn format_name(&self) -> &str;

    /// Write the document, returning the path of the file produced.
    fn export(
        &self,
        title: &str,
        chapters: &[PolishedChapter],
        outdir: &Path,
    ) -> Result<PathBuf, PolishError>;
}

/// `polished.md`: document title, `##` chapter headings, `###` part
/// headings when a chapter spans multiple parts.
pub struct MarkdownExporter;

impl Exporter for MarkdownExporter {
    fn format_name(&self) -> &str {
        "markdown"
    }

    fn export(
        &self,
        title: &str,
        chapters: &[PolishedChapter],
        outdir: &Path,
    ) -> Result<PathBuf, PolishError> {
        let mut doc = String::new();
        doc.push_str(&format!("# {title}\n"));
        for chapter in chapters {
            doc.push_str(&format!("\n## {}\n", chapter.title));
            let multi = chapter.parts.len() > 1;
            for (i, part) in chapter.parts.iter().enumerate() {
                if multi {
                    doc.push_str(&format!("\n### Part {}/{}\n", i + 1, chapter.parts.len()));
                }
                doc.push('\n');
                doc.push_str(part.trim_end());
                doc.push('\n');
            }
        }
        write_atomic(&outdir.join("polished.md"), doc.as_bytes())
    }
}

/// `polished.txt`: plain text with underlined chapter headings.
pub struct TextExporter;

impl Exporter for TextExporter {
    fn format_name(&self) -> &str {
        "text"
    }

    fn export(
        &self,
        title: &str,
        chapters: &[PolishedChapter],
        outdir: &Path,
    ) -> Result<PathBuf, PolishError> {
        let mut doc = String::new();
        doc.push_str(title);
        doc.push('\n');
        doc.push_str(&"=".repeat(title.chars().count().max(4)));
        doc.push('\n');
        for chapter in chapters {
            doc.push_str(&format!("\n\n{}\n\n", chapter.title));
            for (i, part) in chapter.parts.iter().enumerate() {
                if i > 0 {
                    doc.push('\n');
                }
                doc.push_str(part.trim_end());
                doc.push('\n');
            }
        }
        write_atomic(&outdir.join("polished.txt"), doc.as_bytes())
    }
}

/// Write via a temp file in the same directory, then rename into place.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<PathBuf, PolishError> {
    let failed = |source: std::io::Error| PolishError::ExportFailed {
        path: path.to_path_buf(),
        source,
    };
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(failed)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(failed)?;
    tmp.write_all(bytes).map_err(failed)?;
    tmp.as_file().sync_all().map_err(failed)?;
    tmp.persist(path).map_err(|e| failed(e.error))?;
    info!("Exported {} ({} bytes)", path.display(), bytes.len());
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(index: u32, title: &str, parts: &[&str]) -> PolishedChapter {
        PolishedChapter {
            index,
            title: title.to_string(),
            parts: parts.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn markdown_layout_has_chapter_and_part_headings() {
        let dir = tempfile::tempdir().unwrap();
        let chapters = vec![
            chapter(1, "Chapter 1: Dawn", &["First body."]),
            chapter(2, "Chapter 2", &["Part one.", "Part two."]),
        ];
        let path = MarkdownExporter
            .export("My Novel", &chapters, dir.path())
            .unwrap();
        let doc = fs::read_to_string(&path).unwrap();
        assert!(doc.starts_with("# My Novel\n"));
        assert!(doc.contains("\n## Chapter 1: Dawn\n"));
        assert!(doc.contains("\n## Chapter 2\n"));
        // single-part chapters get no part heading
        assert!(!doc.contains("Part 1/1"));
        assert!(doc.contains("### Part 1/2"));
        assert!(doc.contains("### Part 2/2"));
    }

    #[test]
    fn text_layout_underlines_the_title() {
        let dir = tempfile::tempdir().unwrap();
        let chapters = vec![chapter(1, "Chapter 1", &["Body text."])];
        let path = TextExporter
            .export("My Novel", &chapters, dir.path())
            .unwrap();
        let doc = fs::read_to_string(&path).unwrap();
        assert!(doc.starts_with("My Novel\n========\n"));
        assert!(doc.contains("\nChapter 1\n"));
        assert!(doc.contains("Body text."));
    }

    #[test]
    fn export_creates_missing_outdir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("deep/out");
        let chapters = vec![chapter(1, "Chapter 1", &["Body."])];
        let path = MarkdownExporter.export("T", &chapters, &nested).unwrap();
        assert!(path.exists());
    }
}
