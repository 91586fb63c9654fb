//! Text normalization for PDF-extracted prose.
//!
//! PDF extraction yields text that is visually faithful and structurally
//! wrong: hard line wraps mid-sentence, page numbers and running headers
//! interleaved with prose, inconsistent heading punctuation. Chapter
//! detection and chunking both assume paragraph-shaped text, so everything
//! here runs before either of them.
//!
//! Passes, in order:
//! 1. Normalise line endings (CRLF/CR → LF)
//! 2. Drop page-number-only lines (`12`, `- 12 -`, `Page 12`)
//! 3. Drop lines repeating across many pages (running headers/footers)
//! 4. Join hard-wrapped lines back into sentences
//! 5. Normalise chapter-heading separators to `Chapter N: Title`
//! 6. Collapse runs of blank lines to a single paragraph break
//!
//! All passes are deterministic — resume safety requires that reprocessing
//! the same pages always yields the identical normalized text, which is why
//! header/footer detection samples large documents deterministically rather
//! than randomly.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use super::chapters::is_heading_line;

/// Punctuation that ends a sentence (or closes a quotation) — a line ending
/// with one of these is not a wrap candidate.
const SENTENCE_ENDINGS: &str = ".!?…:;\"'」』】）)]\u{201d}\u{2019}";

/// Characters that start a block element; the following line must not be
/// merged into the previous one.
const LINE_START_BLOCK: &str = "•·●○◆◇■□▪▫–—-";

static RE_BARE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\d+\s*$").unwrap());
static RE_DASHED_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[-—–]\s*\d+\s*[-—–]\s*$").unwrap());
static RE_PAGE_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(page|trang|p\.?)\s*\d+\s*$").unwrap());

static RE_HEADING_SEPARATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[ \t]*(chapter|chương)[ \t]+(\d{1,5})[ \t]*[:：.\-–—][ \t]*(\S[^\n]*?)[ \t]*$")
        .unwrap()
});

static RE_EXCESS_BLANKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Full preprocessing pipeline: raw extracted pages → normalized text.
pub fn preprocess(pages: &[String]) -> String {
    let text = normalize_newlines(&pages.join("\n\n"));
    let original_len = text.len();

    let repeating = repeated_lines(pages, 0.3);

    let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();
    let mut out: Vec<String> = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let stripped = lines[i].trim().to_string();

        if is_page_number_line(&stripped) || repeating.contains(stripped.as_str()) {
            i += 1;
            continue;
        }

        if stripped.is_empty() {
            // Keep a single blank line as the paragraph separator.
            if out.last().is_some_and(|l| !l.trim().is_empty()) {
                out.push(String::new());
            }
            i += 1;
            continue;
        }

        if i + 1 < lines.len() {
            let next = lines[i + 1].clone();
            if should_join_lines(&stripped, &next) && !is_page_number_line(next.trim()) {
                lines[i + 1] = format!("{} {}", stripped, next.trim());
                i += 1;
                continue;
            }
        }

        out.push(stripped);
        i += 1;
    }

    let joined = out.join("\n");
    let normalized = normalize_heading_separators(&joined);
    let collapsed = RE_EXCESS_BLANKS.replace_all(&normalized, "\n\n");
    let result = collapsed.trim().to_string();

    let reduction = if original_len > 0 {
        100.0 * (1.0 - result.len() as f64 / original_len as f64)
    } else {
        0.0
    };
    info!(
        "Preprocessing complete: {original_len} -> {} chars ({reduction:.1}% reduced)",
        result.len()
    );
    result
}

/// Convert all newline variants to `\n`.
pub fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Check whether a line is page furniture carrying only a page number.
pub fn is_page_number_line(line: &str) -> bool {
    let stripped = line.trim();
    RE_BARE_NUMBER.is_match(stripped)
        || RE_DASHED_NUMBER.is_match(stripped)
        || RE_PAGE_WORD.is_match(stripped)
}

/// Decide whether `next` is the hard-wrapped continuation of `current`.
///
/// Join only when the evidence all points the same way: `current` lacks
/// terminal punctuation, `next` starts lowercase, and neither side is a
/// heading or a block element.
fn should_join_lines(current: &str, next: &str) -> bool {
    let current = current.trim_end();
    let next = next.trim();
    if current.is_empty() || next.is_empty() {
        return false;
    }
    if is_heading_line(current) || is_heading_line(next) {
        return false;
    }
    if current
        .chars()
        .next_back()
        .is_some_and(|c| SENTENCE_ENDINGS.contains(c))
    {
        return false;
    }
    let first = match next.chars().next() {
        Some(c) => c,
        None => return false,
    };
    if LINE_START_BLOCK.contains(first) {
        return false;
    }
    // An uppercase start is likely a new sentence or paragraph.
    if first.is_uppercase() {
        return false;
    }
    true
}

/// Find short lines repeating on at least `threshold` of pages — running
/// headers and footers.
///
/// Large documents are sampled (first 50, last 50, every k-th in between)
/// instead of scanned in full; the sample is deterministic so two runs over
/// the same input agree on what gets stripped.
pub fn repeated_lines(pages: &[String], threshold: f64) -> HashSet<String> {
    let total = pages.len();
    if total < 3 {
        return HashSet::new();
    }

    let sampled: Vec<&String> = if total > 200 {
        let middle = &pages[50..total - 50];
        let step = (middle.len() / 100).max(1);
        pages[..50]
            .iter()
            .chain(middle.iter().step_by(step))
            .chain(pages[total - 50..].iter())
            .collect()
    } else {
        pages.iter().collect()
    };
    let effective = sampled.len();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for page in &sampled {
        let mut seen: HashSet<&str> = HashSet::new();
        for line in page.split('\n') {
            let stripped = line.trim();
            // Headers/footers are short; ignore prose-length lines.
            if (3..=40).contains(&stripped.chars().count()) && seen.insert(stripped) {
                *counts.entry(stripped).or_insert(0) += 1;
            }
        }
    }

    let min_count = ((effective as f64 * threshold) as usize).max(2);
    let repeating: HashSet<String> = counts
        .into_iter()
        .filter(|&(_, count)| count >= min_count)
        .map(|(line, _)| line.to_string())
        .collect();

    if !repeating.is_empty() {
        debug!(
            "Found {} repeating header/footer lines to remove",
            repeating.len()
        );
    }
    repeating
}

/// Normalise heading separators (`：`, `-`, `–`, `.`) to `Chapter N: Title`.
fn normalize_heading_separators(text: &str) -> String {
    RE_HEADING_SEPARATOR
        .replace_all(text, |caps: &regex::Captures<'_>| {
            format!("{} {}: {}", &caps[1], &caps[2], caps[3].trim())
        })
        .into_owned()
}
