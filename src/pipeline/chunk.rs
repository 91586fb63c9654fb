//! Chapter bodies → model-sized chunks.
//!
//! Chunks are contiguous byte ranges of the chapter body: concatenating a
//! chapter's chunk texts in part order reproduces the body byte for byte.
//! That invariant is what lets export fall back to the original text for
//! any chunk the model never touched.
//!
//! Boundary preference is paragraph > sentence > hard character split; a
//! unit only gets subdivided when it alone exceeds the budget. Limits are
//! measured in characters, not bytes, so multibyte prose is budgeted the
//! same as ASCII. `max_chars` is a hard bound: every chunk stays within
//! it. A trailing chunk smaller than `min_tail_chars` is grown by pulling
//! trailing units out of its predecessor where that is possible without
//! pushing either chunk over the budget; when no unit can move, the tiny
//! tail stays as its own chunk rather than break the bound.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::document::{Chapter, Chunk};

static RE_PARAGRAPH_SEP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{2,}").unwrap());

/// Sentence-terminal punctuation, Western and CJK.
const SENTENCE_TERMINALS: &str = ".!?…。！？";

/// Size limits for chunking, in characters.
#[derive(Debug, Clone, Copy)]
pub struct ChunkLimits {
    /// Hard ceiling on chunk size. Never exceeded.
    pub max_chars: usize,
    /// Best-effort lower bound for the trailing chunk: units shift back
    /// from the predecessor to reach it, as long as both chunks stay
    /// within `max_chars`.
    pub min_tail_chars: usize,
}

/// A candidate unit: a byte range of the body plus its character count.
#[derive(Debug, Clone)]
struct Unit {
    range: Range<usize>,
    chars: usize,
}

/// Split every chapter into chunks, numbering parts 1-based within each
/// chapter. Chapters with empty bodies produce no chunks.
pub fn chunk_chapters(chapters: &[Chapter], limits: &ChunkLimits) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for chapter in chapters {
        if chapter.body.is_empty() {
            continue;
        }
        let ranges = chunk_body(&chapter.body, limits);
        let part_count = ranges.len() as u32;
        for (i, range) in ranges.into_iter().enumerate() {
            chunks.push(Chunk {
                chapter_index: chapter.index,
                part_index: i as u32 + 1,
                part_count,
                text: chapter.body[range].to_string(),
            });
        }
    }
    chunks
}

/// Split one body into chunk ranges that tile `0..body.len()`.
fn chunk_body(body: &str, limits: &ChunkLimits) -> Vec<Range<usize>> {
    // Expand any oversized paragraph down to sentence (or hard) units, so
    // every unit entering the packer fits the budget on its own.
    let mut units: Vec<Unit> = Vec::new();
    for para in paragraph_units(body) {
        if para.chars <= limits.max_chars {
            units.push(para);
        } else {
            for sent in sentence_units(body, para.range) {
                if sent.chars <= limits.max_chars {
                    units.push(sent);
                } else {
                    debug!(
                        "Sentence of {} chars exceeds the {}-char budget; hard-splitting",
                        sent.chars, limits.max_chars
                    );
                    units.extend(hard_split(body, sent.range, limits.max_chars));
                }
            }
        }
    }

    // Greedy packing: extend the current chunk while the budget holds.
    let mut groups: Vec<Vec<Unit>> = Vec::new();
    let mut chars: Vec<usize> = Vec::new();
    for unit in units {
        match (groups.last_mut(), chars.last_mut()) {
            (Some(group), Some(count)) if *count + unit.chars <= limits.max_chars => {
                *count += unit.chars;
                group.push(unit);
            }
            _ => {
                chars.push(unit.chars);
                groups.push(vec![unit]);
            }
        }
    }

    // A tiny tail chunk wastes a model call; grow it by shifting trailing
    // units out of its predecessor. Both chunks must stay within the
    // budget, and the predecessor must keep at least one unit, so this is
    // best-effort: a tail that cannot be grown stays as its own chunk.
    if groups.len() >= 2 {
        let last = groups.len() - 1;
        while chars[last] < limits.min_tail_chars && groups[last - 1].len() > 1 {
            let unit_chars = groups[last - 1][groups[last - 1].len() - 1].chars;
            if chars[last] + unit_chars > limits.max_chars {
                break;
            }
            let unit = match groups[last - 1].pop() {
                Some(unit) => unit,
                None => break,
            };
            chars[last - 1] -= unit_chars;
            chars[last] += unit_chars;
            groups[last].insert(0, unit);
        }
    }

    groups
        .iter()
        .map(|g| g[0].range.start..g[g.len() - 1].range.end)
        .collect()
}

/// Paragraph ranges tiling the body; each separator run belongs to the
/// block before it.
fn paragraph_units(body: &str) -> Vec<Unit> {
    let mut units = Vec::new();
    let mut start = 0;
    for sep in RE_PARAGRAPH_SEP.find_iter(body) {
        let range = start..sep.end();
        units.push(Unit {
            chars: body[range.clone()].chars().count(),
            range,
        });
        start = sep.end();
    }
    if start < body.len() {
        let range = start..body.len();
        units.push(Unit {
            chars: body[range.clone()].chars().count(),
            range,
        });
    }
    units
}

/// Sentence ranges tiling `range`; trailing whitespace after a terminal
/// belongs to the sentence before it.
fn sentence_units(body: &str, range: Range<usize>) -> Vec<Unit> {
    let slice = &body[range.clone()];
    let mut units = Vec::new();
    let mut start = 0;
    let mut chars_in_sentence = 0;
    let mut after_terminal = false;

    for (offset, ch) in slice.char_indices() {
        if after_terminal && !ch.is_whitespace() {
            let sub = start..offset;
            units.push(Unit {
                range: range.start + sub.start..range.start + sub.end,
                chars: chars_in_sentence,
            });
            start = offset;
            chars_in_sentence = 0;
            after_terminal = false;
        }
        chars_in_sentence += 1;
        if SENTENCE_TERMINALS.contains(ch) {
            after_terminal = true;
        }
    }
    if start < slice.len() {
        units.push(Unit {
            range: range.start + start..range.end,
            chars: chars_in_sentence,
        });
    }
    units
}

/// Last resort: split at character boundaries every `max_chars` characters.
fn hard_split(body: &str, range: Range<usize>, max_chars: usize) -> Vec<Unit> {
    let slice = &body[range.clone()];
    let mut units = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (offset, _) in slice.char_indices() {
        if count == max_chars {
            units.push(Unit {
                range: range.start + start..range.start + offset,
                chars: count,
            });
            start = offset;
            count = 0;
        }
        count += 1;
    }
    if start < slice.len() {
        units.push(Unit {
            range: range.start + start..range.end,
            chars: count,
        });
    }
    units
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(index: u32, body: &str) -> Chapter {
        Chapter {
            index,
            title: String::new(),
            body: body.to_string(),
        }
    }

    fn limits(max_chars: usize, min_tail_chars: usize) -> ChunkLimits {
        ChunkLimits {
            max_chars,
            min_tail_chars,
        }
    }

    fn reassemble(chunks: &[Chunk], chapter_index: u32) -> String {
        chunks
            .iter()
            .filter(|c| c.chapter_index == chapter_index)
            .map(|c| c.text.as_str())
            .collect()
    }

    #[test]
    fn small_chapter_is_one_chunk() {
        let chapters = vec![chapter(1, "A short chapter body.")];
        let chunks = chunk_chapters(&chapters, &limits(7000, 200));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].part_index, 1);
        assert_eq!(chunks[0].part_count, 1);
        assert_eq!(chunks[0].text, "A short chapter body.");
    }

    #[test]
    fn empty_chapter_yields_no_chunks() {
        let chapters = vec![chapter(1, ""), chapter(2, "Real body.")];
        let chunks = chunk_chapters(&chapters, &limits(7000, 200));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chapter_index, 2);
    }

    #[test]
    fn splits_at_paragraph_boundary() {
        let para = "x".repeat(3000);
        let body = format!("{para}\n\n{para}\n\n{para}");
        let chapters = vec![chapter(1, &body)];
        let chunks = chunk_chapters(&chapters, &limits(7000, 200));
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].text.ends_with("\n\n"));
        assert_eq!(reassemble(&chunks, 1), body);
    }

    #[test]
    fn chunks_reassemble_byte_for_byte() {
        let body = "First paragraph here. With two sentences.\n\n\
                    Second paragraph. More text follows here!\n\n\
                    Third one? Yes.\n\nFourth, the last paragraph.";
        let chapters = vec![chapter(3, body)];
        let chunks = chunk_chapters(&chapters, &limits(60, 10));
        assert!(chunks.len() > 1);
        assert_eq!(reassemble(&chunks, 3), body);
    }

    #[test]
    fn oversized_paragraph_splits_at_sentences() {
        let sentence = format!("{} end.", "word ".repeat(10));
        let body = sentence.repeat(20);
        let chapters = vec![chapter(1, &body)];
        let chunks = chunk_chapters(&chapters, &limits(200, 20));
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.chars().count() <= 200);
        }
        assert_eq!(reassemble(&chunks, 1), body);
    }

    #[test]
    fn unbroken_text_hard_splits_on_char_boundaries() {
        let body = "\u{4e16}".repeat(250);
        let chapters = vec![chapter(1, &body)];
        let chunks = chunk_chapters(&chapters, &limits(100, 10));
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text.chars().count(), 100);
        assert_eq!(reassemble(&chunks, 1), body);
    }

    #[test]
    fn budget_is_never_exceeded_even_for_a_tiny_tail() {
        // A single oversized paragraph plus a tiny tail: nothing can shift
        // back without breaking the budget, so the tail stays its own
        // chunk and every chunk respects max_chars.
        let para = "y".repeat(6900);
        let tail = "t".repeat(150);
        let body = format!("{para}\n\n{tail}");
        let chapters = vec![chapter(1, &body)];
        let chunks = chunk_chapters(&chapters, &limits(7000, 200));
        assert_eq!(chunks.len(), 2);
        for c in &chunks {
            let len = c.text.chars().count();
            assert!(len <= 7000, "chunk {} has {len} chars", c.part_index);
        }
        assert_eq!(reassemble(&chunks, 1), body);
    }

    #[test]
    fn tiny_tail_grows_by_pulling_units_from_its_predecessor() {
        // Paragraphs of 3500 + 3400 + 150 chars: the 150-char tail is under
        // min_tail_chars, so the 3400-char paragraph shifts back to join it.
        let body = format!(
            "{}\n\n{}\n\n{}",
            "a".repeat(3500),
            "b".repeat(3400),
            "c".repeat(150)
        );
        let chapters = vec![chapter(1, &body)];
        let chunks = chunk_chapters(&chapters, &limits(7000, 200));
        assert_eq!(chunks.len(), 2);
        let tail_len = chunks[1].text.chars().count();
        assert!(tail_len >= 200, "tail has only {tail_len} chars");
        for c in &chunks {
            assert!(c.text.chars().count() <= 7000);
        }
        assert_eq!(reassemble(&chunks, 1), body);
    }

    #[test]
    fn substantial_tail_stays_its_own_chunk() {
        let para = "z".repeat(6900);
        let tail = "t".repeat(300);
        let body = format!("{para}\n\n{tail}");
        let chapters = vec![chapter(1, &body)];
        let chunks = chunk_chapters(&chapters, &limits(7000, 200));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].text, tail);
        assert_eq!(reassemble(&chunks, 1), body);
    }

    #[test]
    fn nine_thousand_chars_under_five_thousand_budget_makes_two_parts() {
        let body = format!("{}\n\n{}", "a".repeat(4500), "b".repeat(4498));
        assert_eq!(body.len(), 9000);
        let chapters = vec![chapter(1, &body)];
        let chunks = chunk_chapters(&chapters, &limits(5000, 200));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].part_count, 2);
        // The split lands on the paragraph boundary inside the budget.
        assert!(chunks[0].text.chars().count() <= 5000);
        assert!(chunks[0].text.ends_with("\n\n"));
        assert_eq!(reassemble(&chunks, 1), body);
    }

    #[test]
    fn chunking_is_deterministic() {
        let body = "Alpha beta gamma. Delta epsilon.\n\nZeta eta theta! Iota kappa.";
        let chapters = vec![chapter(1, body)];
        let a = chunk_chapters(&chapters, &limits(40, 10));
        let b = chunk_chapters(&chapters, &limits(40, 10));
        assert_eq!(a, b);
    }
}
