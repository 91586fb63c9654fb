//! Core data model: the document and the units derived from it.
//!
//! The pipeline owns one immutable [`Document`] per run and derives
//! [`Chapter`]s and [`Chunk`]s from it deterministically — re-deriving from
//! the same pages and parameters always yields the identical sequence, which
//! is what makes resuming from a checkpoint safe. [`ChunkResult`]s are the
//! durable counterpart: one per chunk, appended to the checkpoint exactly
//! once on success and never overwritten.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;

/// The raw pages produced by extraction. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct Document {
    pub pages: Vec<String>,
}

impl Document {
    pub fn new(pages: Vec<String>) -> Self {
        Self { pages }
    }

    /// SHA-256 over the page texts, used as the checkpoint's `input_hash`.
    ///
    /// Hashing the extracted text rather than the PDF bytes ties checkpoint
    /// validity to the content actually being processed, so a re-run against
    /// the same pages resumes even if the file was copied or touched.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for page in &self.pages {
            hasher.update(page.as_bytes());
            hasher.update([0x0c]);
        }
        hex_digest(&hasher.finalize())
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// A detected chapter: contiguous, non-overlapping, ordered by `index`.
///
/// `index` is the number parsed from the chapter heading (1-based,
/// monotonically increasing; gaps are permitted when the source skips
/// numbers). Index 0 is reserved for a prologue pseudo-chapter holding
/// substantial text found before the first heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub index: u32,
    pub title: String,
    pub body: String,
}

impl Chapter {
    /// Heading text used in exports and prompts.
    pub fn display_title(&self) -> String {
        if self.index == 0 {
            if self.title.is_empty() {
                "Prologue".to_string()
            } else {
                self.title.clone()
            }
        } else if self.title.is_empty() {
            format!("Chapter {}", self.index)
        } else {
            format!("Chapter {}: {}", self.index, self.title)
        }
    }
}

/// A model-sized slice of a chapter — the atomic unit of checkpointing and
/// retry.
///
/// `text` is carved from the chapter body so that concatenating all chunks
/// of a chapter in `part_index` order reproduces the body byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub chapter_index: u32,
    /// 1-based position within the chapter.
    pub part_index: u32,
    /// Total parts for the chapter, fixed once the chapter is segmented.
    pub part_count: u32,
    pub text: String,
}

impl Chunk {
    pub fn key(&self) -> ChunkKey {
        ChunkKey {
            chapter: self.chapter_index,
            part: self.part_index,
        }
    }
}

/// Identity of a chunk within the run, ordered `(chapter, part)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkKey {
    pub chapter: u32,
    pub part: u32,
}

impl fmt::Display for ChunkKey {
    /// Renders as `chap_0001_part_001`, the id format used in logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chap_{:04}_part_{:03}", self.chapter, self.part)
    }
}

/// The durable record of one successfully rewritten chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkResult {
    pub chapter_index: u32,
    pub part_index: u32,
    pub polished_text: String,
    /// RFC 3339 completion timestamp.
    pub completed_at: String,
}

impl ChunkResult {
    pub fn key(&self) -> ChunkKey {
        ChunkKey {
            chapter: self.chapter_index,
            part: self.part_index,
        }
    }
}

/// Summary statistics for a completed run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub chapters: usize,
    pub total_chunks: usize,
    /// Chunks rewritten by the provider during this invocation.
    pub rewritten_chunks: usize,
    /// Chunks skipped because the checkpoint already held their result.
    pub skipped_chunks: usize,
    pub total_duration_ms: u64,
}

/// How a run ended when it did not fail.
#[derive(Debug)]
pub enum RunOutcome {
    /// All chunks completed and the document was exported.
    Done {
        outdir: PathBuf,
        doc_path: PathBuf,
        stats: RunStats,
    },
    /// The cancellation signal was honoured; the checkpoint remains valid
    /// and a later resume picks up where this run stopped.
    Cancelled { completed: usize, total: usize },
}
