//! Durable per-chunk completion state for crash-safe resume.
//!
//! `checkpoint.json` in the output directory is the single source of truth
//! for what has been completed; its *presence* is also the signal an
//! external caller uses to offer a "resume" action, so it must never exist
//! in a half-written state. Every persist goes through an atomic replace:
//! serialize to a temp file in the same directory, fsync, then rename over
//! the destination. A crash mid-write leaves either the old file or the new
//! one, never a truncated hybrid.
//!
//! On load, three outcomes are possible:
//! * **valid + matching identity** — resume: completed chunks are skipped.
//! * **valid + stale identity** (different input, mode, model, or chunking
//!   parameters) — the chunk sequence may differ, so resuming would corrupt
//!   ordering; start fresh instead, never silently reuse.
//! * **unparsable** — treated as absent with a warning, not a hard failure.
//!
//! The store is the single writer to the file. Running two pipeline
//! instances against the same output directory concurrently is unsupported
//! and caller responsibility.

use crate::document::{ChunkKey, ChunkResult};
use crate::error::PolishError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Name of the checkpoint file inside the output directory.
pub const CHECKPOINT_FILE: &str = "checkpoint.json";

/// The configuration identity a checkpoint must match to be resumable.
///
/// Exactly the fields that shape the derived chunk sequence or its
/// processing: a change to any of them invalidates prior results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIdentity {
    /// SHA-256 of the extracted page text.
    pub input_hash: String,
    pub mode: String,
    pub model: String,
    pub provider: String,
    pub max_chars: usize,
}

/// On-disk representation of the checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CheckpointFile {
    #[serde(flatten)]
    identity: RunIdentity,
    created_at: String,
    updated_at: String,
    total_chunks: usize,
    results: Vec<ChunkResult>,
}

/// What `CheckpointStore::open` found on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A valid matching checkpoint was loaded; `done` chunks are complete.
    Resumed { done: usize },
    /// No usable checkpoint; a fresh one was created.
    Fresh,
}

/// Owner of the durable completion state. Single writer per run.
pub struct CheckpointStore {
    path: PathBuf,
    data: CheckpointFile,
    done: BTreeMap<ChunkKey, usize>,
}

impl CheckpointStore {
    /// Open or create the checkpoint for `outdir`.
    ///
    /// With `overwrite` set, any existing checkpoint is discarded before the
    /// fresh one is created. The fresh checkpoint is persisted immediately so
    /// the file's presence reflects an in-progress run from the first chunk.
    pub fn open(
        outdir: &Path,
        identity: RunIdentity,
        total_chunks: usize,
        overwrite: bool,
    ) -> Result<(Self, LoadOutcome), PolishError> {
        std::fs::create_dir_all(outdir)
            .map_err(|e| PolishError::Internal(format!("cannot create output directory: {e}")))?;
        let path = outdir.join(CHECKPOINT_FILE);

        if overwrite && path.exists() {
            info!("Overwrite requested; discarding existing checkpoint");
            std::fs::remove_file(&path)
                .map_err(|e| PolishError::Internal(format!("cannot clear checkpoint: {e}")))?;
        }

        if let Some(existing) = Self::try_load(&path) {
            if existing.identity == identity && existing.total_chunks == total_chunks {
                let done: BTreeMap<ChunkKey, usize> = existing
                    .results
                    .iter()
                    .enumerate()
                    .map(|(i, r)| (r.key(), i))
                    .collect();
                let count = done.len();
                info!(
                    "Resuming from checkpoint: {}/{} chunks done",
                    count, total_chunks
                );
                return Ok((
                    Self {
                        path,
                        data: existing,
                        done,
                    },
                    LoadOutcome::Resumed { done: count },
                ));
            }
            warn!("Checkpoint exists but run parameters differ; starting fresh");
        }

        let now = chrono::Utc::now().to_rfc3339();
        let store = Self {
            path,
            data: CheckpointFile {
                identity,
                created_at: now.clone(),
                updated_at: now,
                total_chunks,
                results: Vec::new(),
            },
            done: BTreeMap::new(),
        };
        store.persist()?;
        Ok((store, LoadOutcome::Fresh))
    }

    /// Read and parse an existing checkpoint file, treating any failure as
    /// absence (with a warning for unparsable content).
    fn try_load(path: &Path) -> Option<CheckpointFile> {
        if !path.exists() {
            return None;
        }
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Could not read checkpoint '{}': {e}; starting fresh", path.display());
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!(
                    "Checkpoint '{}' is unparsable ({e}); treating as absent",
                    path.display()
                );
                None
            }
        }
    }

    pub fn is_complete(&self, key: ChunkKey) -> bool {
        self.done.contains_key(&key)
    }

    /// Number of chunks recorded as complete.
    pub fn completed(&self) -> usize {
        self.done.len()
    }

    pub fn result_for(&self, key: ChunkKey) -> Option<&ChunkResult> {
        self.done.get(&key).map(|&i| &self.data.results[i])
    }

    /// Append a result and persist durably before returning.
    ///
    /// The on-disk file reflects the new result even if the process dies
    /// immediately after this call returns; the orchestrator relies on that
    /// ordering to report progress only for durably completed units.
    pub fn mark_complete(&mut self, result: ChunkResult) -> Result<(), PolishError> {
        let key = result.key();
        if self.done.contains_key(&key) {
            // Results are never overwritten; a duplicate mark is a no-op.
            debug!("Chunk {key} already checkpointed; ignoring duplicate");
            return Ok(());
        }
        self.data.results.push(result);
        self.done.insert(key, self.data.results.len() - 1);
        self.data.updated_at = chrono::Utc::now().to_rfc3339();
        self.persist()
    }

    /// Path of the checkpoint file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomic replace: temp file in the same directory, fsync, rename.
    fn persist(&self) -> Result<(), PolishError> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| PolishError::Internal("checkpoint path has no parent".into()))?;
        let json = serde_json::to_vec_pretty(&self.data)
            .map_err(|e| PolishError::Internal(format!("checkpoint serialize: {e}")))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| PolishError::Internal(format!("checkpoint temp file: {e}")))?;
        tmp.write_all(&json)
            .map_err(|e| PolishError::Internal(format!("checkpoint write: {e}")))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| PolishError::Internal(format!("checkpoint sync: {e}")))?;
        tmp.persist(&self.path)
            .map_err(|e| PolishError::Internal(format!("checkpoint rename: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn identity() -> RunIdentity {
        RunIdentity {
            input_hash: "abc123".into(),
            mode: "polish".into(),
            model: "gemini-2.5-flash".into(),
            provider: "gemini".into(),
            max_chars: 7000,
        }
    }

    fn result(chapter: u32, part: u32) -> ChunkResult {
        ChunkResult {
            chapter_index: chapter,
            part_index: part,
            polished_text: format!("polished {chapter}/{part}"),
            completed_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    #[test]
    fn fresh_open_creates_file() {
        let dir = TempDir::new().unwrap();
        let (store, outcome) = CheckpointStore::open(dir.path(), identity(), 5, false).unwrap();
        assert_eq!(outcome, LoadOutcome::Fresh);
        assert!(store.path().exists());
        assert_eq!(store.completed(), 0);
    }

    #[test]
    fn mark_then_reopen_resumes() {
        let dir = TempDir::new().unwrap();
        let (mut store, _) = CheckpointStore::open(dir.path(), identity(), 3, false).unwrap();
        store.mark_complete(result(1, 1)).unwrap();
        store.mark_complete(result(1, 2)).unwrap();
        drop(store);

        let (store, outcome) = CheckpointStore::open(dir.path(), identity(), 3, false).unwrap();
        assert_eq!(outcome, LoadOutcome::Resumed { done: 2 });
        assert!(store.is_complete(ChunkKey { chapter: 1, part: 1 }));
        assert!(store.is_complete(ChunkKey { chapter: 1, part: 2 }));
        assert!(!store.is_complete(ChunkKey { chapter: 1, part: 3 }));
        assert_eq!(
            store
                .result_for(ChunkKey { chapter: 1, part: 2 })
                .unwrap()
                .polished_text,
            "polished 1/2"
        );
    }

    #[test]
    fn stale_identity_starts_fresh() {
        let dir = TempDir::new().unwrap();
        let (mut store, _) = CheckpointStore::open(dir.path(), identity(), 3, false).unwrap();
        store.mark_complete(result(1, 1)).unwrap();
        drop(store);

        let mut other = identity();
        other.max_chars = 5000;
        let (store, outcome) = CheckpointStore::open(dir.path(), other, 3, false).unwrap();
        assert_eq!(outcome, LoadOutcome::Fresh);
        assert_eq!(store.completed(), 0);
    }

    #[test]
    fn changed_total_chunks_starts_fresh() {
        let dir = TempDir::new().unwrap();
        let (mut store, _) = CheckpointStore::open(dir.path(), identity(), 3, false).unwrap();
        store.mark_complete(result(1, 1)).unwrap();
        drop(store);

        let (_, outcome) = CheckpointStore::open(dir.path(), identity(), 4, false).unwrap();
        assert_eq!(outcome, LoadOutcome::Fresh);
    }

    #[test]
    fn corrupt_file_is_treated_as_absent() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CHECKPOINT_FILE), "{ not json").unwrap();
        let (store, outcome) = CheckpointStore::open(dir.path(), identity(), 3, false).unwrap();
        assert_eq!(outcome, LoadOutcome::Fresh);
        assert_eq!(store.completed(), 0);
        // The fresh checkpoint replaced the corrupt file with valid JSON.
        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(serde_json::from_str::<serde_json::Value>(&raw).is_ok());
    }

    #[test]
    fn overwrite_discards_existing() {
        let dir = TempDir::new().unwrap();
        let (mut store, _) = CheckpointStore::open(dir.path(), identity(), 3, false).unwrap();
        store.mark_complete(result(1, 1)).unwrap();
        drop(store);

        let (store, outcome) = CheckpointStore::open(dir.path(), identity(), 3, true).unwrap();
        assert_eq!(outcome, LoadOutcome::Fresh);
        assert_eq!(store.completed(), 0);
    }

    #[test]
    fn duplicate_mark_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let (mut store, _) = CheckpointStore::open(dir.path(), identity(), 3, false).unwrap();
        store.mark_complete(result(1, 1)).unwrap();
        store.mark_complete(result(1, 1)).unwrap();
        assert_eq!(store.completed(), 1);
    }

    #[test]
    fn file_on_disk_is_always_parsable_after_mark() {
        let dir = TempDir::new().unwrap();
        let (mut store, _) = CheckpointStore::open(dir.path(), identity(), 2, false).unwrap();
        for part in 1..=2 {
            store.mark_complete(result(1, part)).unwrap();
            let raw = std::fs::read_to_string(store.path()).unwrap();
            let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
            assert_eq!(
                value["results"].as_array().unwrap().len(),
                part as usize
            );
        }
    }
}
