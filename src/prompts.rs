//! Prompt construction for the rewrite stage.
//!
//! One system prompt per mode, plus a user prompt carrying the chunk's
//! chapter/part context, the optional style guide and glossary, and the
//! text itself. Sections use fenced blocks so the model can tell
//! instructions from payload.

use crate::config::{Glossary, RewriteMode, StyleConfig};
use crate::document::Chunk;

/// System prompt for `polish` mode: improve flow without changing content.
pub const POLISH_SYSTEM_PROMPT: &str = "\
You are a meticulous literary editor polishing a novel chapter by chapter.

Rules:
1. Improve sentence flow, rhythm, and word choice while preserving the author's voice.
2. Fix awkward phrasing, repeated words, and clumsy transitions.
3. Keep every plot point, detail, name, and line of dialogue. Never add, remove, or summarize content.
4. Preserve paragraph breaks and the overall structure of the text.
5. Follow the style guide and glossary exactly when they are provided.
6. Output only the edited text. No preamble, no commentary, no headings of your own.";

/// System prompt for `proofread` mode: mechanical corrections only.
pub const PROOFREAD_SYSTEM_PROMPT: &str = "\
You are a careful proofreader working on a novel chapter by chapter.

Rules:
1. Fix spelling, punctuation, and grammatical errors only.
2. Do not rephrase, restructure, or alter the author's word choice beyond what a correction requires.
3. Keep every plot point, detail, name, and line of dialogue intact.
4. Preserve paragraph breaks and the overall structure of the text.
5. Follow the style guide and glossary exactly when they are provided.
6. Output only the corrected text. No preamble, no commentary, no headings of your own.";

/// The system prompt for a rewrite mode.
pub fn system_prompt(mode: RewriteMode) -> &'static str {
    match mode {
        RewriteMode::Polish => POLISH_SYSTEM_PROMPT,
        RewriteMode::Proofread => PROOFREAD_SYSTEM_PROMPT,
    }
}

/// One-line location context for a chunk, e.g. `Chapter 3: Dawn — Part 2/5`.
pub fn chunk_context(chunk: &Chunk, chapter_title: &str) -> String {
    if chunk.part_count > 1 {
        format!(
            "{chapter_title} — Part {}/{}",
            chunk.part_index, chunk.part_count
        )
    } else {
        chapter_title.to_string()
    }
}

/// Assemble the full user prompt for one chunk.
pub fn build_user_prompt(
    chunk: &Chunk,
    chapter_title: &str,
    style: &StyleConfig,
    glossary: &Glossary,
) -> String {
    let mut prompt = String::with_capacity(chunk.text.len() + 512);

    prompt.push_str("## Context\n\n");
    prompt.push_str(&chunk_context(chunk, chapter_title));
    prompt.push_str("\n\n");

    if !style.is_empty() {
        prompt.push_str("### STYLE GUIDE:\n\n```yaml\n");
        prompt.push_str(style.to_prompt_yaml().trim_end());
        prompt.push_str("\n```\n\n");
    }

    if !glossary.is_empty() {
        prompt.push_str("### GLOSSARY (use these exact renderings):\n\n```json\n");
        prompt.push_str(glossary.to_prompt_json().trim_end());
        prompt.push_str("\n```\n\n");
    }

    prompt.push_str("### TEXT TO EDIT:\n\n");
    prompt.push_str(&chunk.text);
    prompt
}
