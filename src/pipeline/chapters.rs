//! Chapter heading detection and splitting.
//!
//! Headings match `Chapter N` / `Chương N` at line start, optionally
//! followed by a separator and title. Text before the first heading becomes
//! a prologue chapter when it is substantial; a document with no headings
//! at all falls back to a single synthetic chapter so the rest of the
//! pipeline never sees an empty chapter list.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::document::Chapter;

/// Minimum length of pre-heading text worth keeping as a prologue.
const PROLOGUE_MIN_CHARS: usize = 100;

/// Chapters this short are almost certainly mis-detected headings.
const SHORT_CHAPTER_CHARS: usize = 50;

static HEADING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)^[ \t]*(?:chapter|chương)[ \t]+(\d{1,5})[ \t]*(?:[:：.\-–—][ \t]*(\S[^\n]*?))?[ \t]*$")
        .unwrap()
});

/// Check whether a single line is a chapter heading.
pub(crate) fn is_heading_line(line: &str) -> bool {
    HEADING_RE.is_match(line.trim())
}

/// Split normalized text into chapters at heading lines.
///
/// Chapter indices come from the headings themselves, not from position, so
/// gaps in the source numbering survive into the output. Returns at least
/// one chapter for any non-empty input.
pub fn split_chapters(text: &str) -> Vec<Chapter> {
    let matches: Vec<(usize, usize, u32, String)> = HEADING_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let index: u32 = caps[1].parse().ok()?;
            let title = caps
                .get(2)
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default();
            Some((whole.start(), whole.end(), index, title))
        })
        .collect();

    if matches.is_empty() {
        warn!("No chapter headings detected; treating the whole document as one chapter");
        return vec![Chapter {
            index: 1,
            title: String::new(),
            body: text.trim().to_string(),
        }];
    }

    let mut chapters = Vec::with_capacity(matches.len() + 1);

    // Text before the first heading: keep as a prologue if substantial.
    let preamble = text[..matches[0].0].trim();
    if preamble.chars().count() > PROLOGUE_MIN_CHARS {
        chapters.push(Chapter {
            index: 0,
            title: String::new(),
            body: preamble.to_string(),
        });
    }

    for (i, &(_, heading_end, index, ref title)) in matches.iter().enumerate() {
        let body_end = matches.get(i + 1).map_or(text.len(), |next| next.0);
        chapters.push(Chapter {
            index,
            title: title.clone(),
            body: text[heading_end..body_end].trim().to_string(),
        });
    }

    chapters
}

/// Sanity-check a chapter list, returning human-readable warnings.
///
/// Warnings are advisory — the run continues either way — but they surface
/// mis-detected headings and extraction gaps early enough to act on.
pub fn validate_chapters(chapters: &[Chapter]) -> Vec<String> {
    let mut warnings = Vec::new();

    let mut prev_index: Option<u32> = None;
    for chapter in chapters {
        if chapter.index == 0 {
            continue;
        }
        if let Some(prev) = prev_index {
            if chapter.index <= prev {
                warnings.push(format!(
                    "Chapter numbering is not increasing: chapter {} follows chapter {}",
                    chapter.index, prev
                ));
            } else if chapter.index > prev + 1 {
                warnings.push(format!(
                    "Gap in chapter numbering: chapter {} follows chapter {}",
                    chapter.index, prev
                ));
            }
        }
        prev_index = Some(chapter.index);
    }

    for chapter in chapters {
        let len = chapter.body.chars().count();
        if len == 0 {
            warnings.push(format!("{} has an empty body", chapter.display_title()));
        } else if len < SHORT_CHAPTER_CHARS {
            warnings.push(format!(
                "{} is very short ({len} chars); heading may be mis-detected",
                chapter.display_title()
            ));
        }
    }

    warnings
}
