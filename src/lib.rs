//! # novelpolish
//!
//! Turn a PDF novel into a polished document with an LLM editor, one
//! model-sized chunk at a time — resumable, checkpointed, and scriptable.
//!
//! ## Why this crate?
//!
//! Polishing a full novel means hundreds of model calls over many minutes,
//! against providers that rate-limit, time out, and occasionally fall over.
//! A naive loop loses everything on the first failure. This crate treats
//! each chunk as a durable unit of work: every successful rewrite lands in
//! `checkpoint.json` before progress is reported, so a crashed, failed, or
//! cancelled run resumes exactly where it stopped — already-polished chunks
//! are never paid for twice.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Extract     pdf-extract text layer (CPU-bound, spawn_blocking)
//!  ├─ 2. Preprocess  strip page numbers/headers, rejoin wrapped lines
//!  ├─ 3. Split       detect `Chapter N` headings, salvage a prologue
//!  ├─ 4. Chunk       paragraph/sentence-aligned slices under max_chars
//!  ├─ 5. Rewrite     paced + retried LLM calls, checkpointed per chunk
//!  └─ 6. Export      assembled Markdown or plain text
//! ```
//!
//! Progress streams to the reporter as a line protocol (`STATUS`,
//! `PROGRESS`, `LOG`, `DONE`, `ERROR`) so a supervising process — a GUI, a
//! job runner — can follow along by reading stdout line by line.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use novelpolish::{polish_pdf, CancelToken, PolishConfig, ProgressReporter};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / GEMINI_API_KEY / …
//!     let config = PolishConfig::builder().build()?;
//!     let mut reporter = ProgressReporter::stdout();
//!     let outcome = polish_pdf(
//!         Path::new("novel.pdf"),
//!         Path::new("out"),
//!         config,
//!         &mut reporter,
//!         &CancelToken::new(),
//!     )
//!     .await?;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `novelpolish` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! novelpolish = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod checkpoint;
pub mod config;
pub mod document;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod run;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use checkpoint::{CheckpointStore, LoadOutcome, RunIdentity, CHECKPOINT_FILE};
pub use config::{
    ExportFormat, Glossary, PageRange, PolishConfig, PolishConfigBuilder, RewriteMode, StyleConfig,
};
pub use document::{Chapter, Chunk, ChunkKey, ChunkResult, Document, RunOutcome, RunStats};
pub use error::{PolishError, ProviderError, ProviderErrorKind};
pub use pipeline::rewrite::{LlmProvider, RewriteClient, RewriteProvider};
pub use progress::ProgressReporter;
pub use run::{polish_pages, polish_pdf, CancelToken, PipelineStage};
