//! Run orchestration: the stage sequence, the progress protocol, and the
//! checkpoint-driven rewrite loop.
//!
//! [`polish_pdf`] is the whole pipeline; [`polish_pages`] starts from
//! already-extracted page text (useful when the caller owns extraction, and
//! in tests). Both report through a [`ProgressReporter`] and honour a
//! [`CancelToken`], and both guarantee exactly one terminal protocol line:
//! `DONE` on success, `ERROR` on failure, a `CANCELLED` status on a clean
//! stop.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::checkpoint::{CheckpointStore, LoadOutcome, RunIdentity};
use crate::config::{ExportFormat, PolishConfig};
use crate::document::{ChunkResult, Document, RunOutcome, RunStats};
use crate::error::PolishError;
use crate::pipeline::chapters::{split_chapters, validate_chapters};
use crate::pipeline::chunk::{chunk_chapters, ChunkLimits};
use crate::pipeline::export::{assemble, Exporter, MarkdownExporter, TextExporter};
use crate::pipeline::extract::extract_pages;
use crate::pipeline::preprocess::preprocess;
use crate::pipeline::rewrite::{LlmProvider, RewriteClient};
use crate::progress::ProgressReporter;
use crate::prompts::build_user_prompt;

/// Cooperative cancellation flag, polled between chunks.
///
/// Cancellation is honoured at the next chunk boundary: the in-flight
/// provider call finishes and its result is checkpointed, then the run
/// stops cleanly with a resumable checkpoint.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Stage tokens carried by `STATUS` protocol lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Init,
    Preprocessing,
    Splitting,
    Chunking,
    Rewriting,
    Exporting,
    Done,
    Cancelled,
    Failed,
}

impl PipelineStage {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::Init => "INIT",
            PipelineStage::Preprocessing => "PREPROCESSING",
            PipelineStage::Splitting => "SPLITTING",
            PipelineStage::Chunking => "CHUNKING",
            PipelineStage::Rewriting => "REWRITING",
            PipelineStage::Exporting => "EXPORTING",
            PipelineStage::Done => "DONE",
            PipelineStage::Cancelled => "CANCELLED",
            PipelineStage::Failed => "FAILED",
        }
    }
}

/// Polish a PDF end to end: extract, preprocess, split, chunk, rewrite,
/// export.
pub async fn polish_pdf(
    input: &Path,
    outdir: &Path,
    mut config: PolishConfig,
    reporter: &mut ProgressReporter,
    cancel: &CancelToken,
) -> Result<RunOutcome, PolishError> {
    if config.title.is_none() {
        if let Some(stem) = input.file_stem().and_then(|s| s.to_str()) {
            config.title = Some(stem.to_string());
        }
    }

    reporter.status(
        PipelineStage::Init.as_str(),
        &[
            ("input", &input.display().to_string()),
            ("mode", config.mode.as_str()),
            ("model", config.model_name()),
        ],
    );

    let result = run_from_pdf(input, outdir, &config, reporter, cancel).await;
    finish(result, reporter)
}

/// Polish already-extracted page text. Skips the extraction stage;
/// everything else behaves exactly as in [`polish_pdf`].
pub async fn polish_pages(
    pages: Vec<String>,
    outdir: &Path,
    config: PolishConfig,
    reporter: &mut ProgressReporter,
    cancel: &CancelToken,
) -> Result<RunOutcome, PolishError> {
    reporter.status(
        PipelineStage::Init.as_str(),
        &[
            ("mode", config.mode.as_str()),
            ("model", config.model_name()),
        ],
    );

    let result = run_document(Document::new(pages), outdir, &config, reporter, cancel).await;
    finish(result, reporter)
}

/// Report the terminal protocol lines for a finished run.
///
/// Every failure path funnels through here, so callers observe exactly one
/// `ERROR` line per failed run regardless of which stage raised it.
fn finish(
    result: Result<RunOutcome, PolishError>,
    reporter: &mut ProgressReporter,
) -> Result<RunOutcome, PolishError> {
    if let Err(ref e) = result {
        reporter.status(
            PipelineStage::Failed.as_str(),
            &[("code", &e.code().to_string())],
        );
        reporter.error(e.code(), &e.to_string());
    }
    result
}

async fn run_from_pdf(
    input: &Path,
    outdir: &Path,
    config: &PolishConfig,
    reporter: &mut ProgressReporter,
    cancel: &CancelToken,
) -> Result<RunOutcome, PolishError> {
    // pdf-extract is CPU-bound and synchronous; keep it off the runtime.
    let path = input.to_path_buf();
    let range = config.pages;
    let pages = tokio::task::spawn_blocking(move || extract_pages(&path, &range))
        .await
        .map_err(|e| PolishError::Internal(format!("extraction task failed: {e}")))??;
    reporter.log(&format!("Extracted {} pages", pages.len()));

    run_document(Document::new(pages), outdir, config, reporter, cancel).await
}

async fn run_document(
    document: Document,
    outdir: &Path,
    config: &PolishConfig,
    reporter: &mut ProgressReporter,
    cancel: &CancelToken,
) -> Result<RunOutcome, PolishError> {
    let started = Instant::now();

    reporter.status(PipelineStage::Preprocessing.as_str(), &[]);
    let text = preprocess(&document.pages);
    if text.is_empty() {
        return Err(PolishError::Validation {
            message: "no text remains after preprocessing".to_string(),
        });
    }

    let chapters = split_chapters(&text);
    reporter.status(
        PipelineStage::Splitting.as_str(),
        &[("chapters", &chapters.len().to_string())],
    );
    for warning in validate_chapters(&chapters) {
        warn!("{warning}");
        reporter.log(&warning);
    }

    let chunks = chunk_chapters(
        &chapters,
        &ChunkLimits {
            max_chars: config.max_chars,
            min_tail_chars: config.min_tail_chars,
        },
    );
    let total = chunks.len();
    reporter.status(
        PipelineStage::Chunking.as_str(),
        &[("chunks", &total.to_string())],
    );
    if total == 0 {
        return Err(PolishError::Validation {
            message: "document produced no chunks to rewrite".to_string(),
        });
    }

    let provider = LlmProvider::resolve(config)?;
    let identity = RunIdentity {
        input_hash: document.content_hash(),
        mode: config.mode.as_str().to_string(),
        model: config.model_name().to_string(),
        provider: provider.name().to_string(),
        max_chars: config.max_chars,
    };
    let (mut store, load) = CheckpointStore::open(outdir, identity, total, config.overwrite)?;
    if let LoadOutcome::Resumed { done } = load {
        info!("Resuming from checkpoint: {done}/{total} chunks already complete");
        reporter.log(&format!("Resuming: {done}/{total} chunks already complete"));
    }

    reporter.status(
        PipelineStage::Rewriting.as_str(),
        &[("total", &total.to_string())],
    );
    let client = RewriteClient::new(Arc::clone(&provider), config);
    let mut completed = 0usize;
    let mut rewritten = 0usize;
    let mut skipped = 0usize;

    for chunk in &chunks {
        if cancel.is_cancelled() {
            info!(
                "Cancellation requested; stopping after {}/{total} chunks",
                store.completed()
            );
            reporter.status(
                PipelineStage::Cancelled.as_str(),
                &[
                    ("completed", &store.completed().to_string()),
                    ("total", &total.to_string()),
                ],
            );
            return Ok(RunOutcome::Cancelled {
                completed: store.completed(),
                total,
            });
        }

        let key = chunk.key();
        if store.is_complete(key) {
            debug!("{key} already complete, skipping");
            skipped += 1;
            completed += 1;
            reporter.progress(
                completed,
                total,
                chunk.chapter_index,
                chunk.part_index,
                chunk.part_count,
            );
            continue;
        }

        let chapter_title = chapters
            .iter()
            .find(|c| c.index == chunk.chapter_index)
            .map(|c| c.display_title())
            .unwrap_or_default();
        let prompt = build_user_prompt(chunk, &chapter_title, &config.style, &config.glossary);
        let polished_text = client.rewrite(&prompt).await?;

        // Persist before reporting: a progress line must never get ahead of
        // the durable state it describes.
        store.mark_complete(ChunkResult {
            chapter_index: chunk.chapter_index,
            part_index: chunk.part_index,
            polished_text,
            completed_at: Utc::now().to_rfc3339(),
        })?;
        rewritten += 1;
        completed += 1;
        reporter.progress(
            completed,
            total,
            chunk.chapter_index,
            chunk.part_index,
            chunk.part_count,
        );
    }

    reporter.status(
        PipelineStage::Exporting.as_str(),
        &[("format", exporter_for(config.export).format_name())],
    );
    let polished = assemble(&chapters, &chunks, &store);
    let title = config.title.as_deref().unwrap_or("Polished Document");
    let doc_path = exporter_for(config.export).export(title, &polished, outdir)?;

    let stats = RunStats {
        chapters: chapters.len(),
        total_chunks: total,
        rewritten_chunks: rewritten,
        skipped_chunks: skipped,
        total_duration_ms: started.elapsed().as_millis() as u64,
    };
    info!(
        "Run complete: {} chunks ({} rewritten, {} skipped) in {}ms",
        stats.total_chunks, stats.rewritten_chunks, stats.skipped_chunks, stats.total_duration_ms
    );
    reporter.status(
        PipelineStage::Done.as_str(),
        &[
            ("rewritten", &rewritten.to_string()),
            ("skipped", &skipped.to_string()),
        ],
    );
    reporter.done(outdir, &doc_path);

    Ok(RunOutcome::Done {
        outdir: outdir.to_path_buf(),
        doc_path,
        stats,
    })
}

fn exporter_for(format: ExportFormat) -> Box<dyn Exporter> {
    match format {
        ExportFormat::Markdown => Box::new(MarkdownExporter),
        ExportFormat::Text => Box::new(TextExporter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_is_shared_across_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn stage_tokens_are_uppercase() {
        for stage in [
            PipelineStage::Init,
            PipelineStage::Preprocessing,
            PipelineStage::Splitting,
            PipelineStage::Chunking,
            PipelineStage::Rewriting,
            PipelineStage::Exporting,
            PipelineStage::Done,
            PipelineStage::Cancelled,
            PipelineStage::Failed,
        ] {
            let token = stage.as_str();
            assert_eq!(token, token.to_uppercase());
        }
    }
}
