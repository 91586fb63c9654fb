//! Pipeline stages for the polishing run.
//!
//! Each submodule implements exactly one transformation step. Keeping stages
//! separate makes each independently testable and lets us swap
//! implementations (e.g. a different extraction backend) without touching
//! other stages.
//!
//! ## Data Flow
//!
//! ```text
//! extract ──▶ preprocess ──▶ chapters ──▶ chunk ──▶ rewrite ──▶ export
//! (pdf text)  (line joins,   (heading     (budget-  (LLM call,  (markdown/
//!              hdr/ftr)       regex)      bounded)   checkpoint)  text)
//! ```
//!
//! 1. [`extract`]    — pull per-page text out of the PDF
//! 2. [`preprocess`] — join hard-wrapped lines, strip page furniture
//! 3. [`chapters`]   — detect chapter headings, cover the text in order
//! 4. [`chunk`]      — slice chapters into model-sized, reconstructible units
//! 5. [`rewrite`]    — drive the provider call with pacing and retry/backoff;
//!                     the only stage with network I/O
//! 6. [`export`]     — assemble polished chapters into the output document

pub mod chapters;
pub mod chunk;
pub mod export;
pub mod extract;
pub mod preprocess;
pub mod rewrite;
