//! Configuration types for a polishing run.
//!
//! All run behaviour is controlled through [`PolishConfig`], built via its
//! [`PolishConfigBuilder`]. Keeping every knob in one struct makes it trivial
//! to diff two runs, and — more importantly here — to derive the checkpoint's
//! identity: a checkpoint is only valid for resume when the fields that shape
//! the chunk sequence (`mode`, `model`, `max_chars`) match the current run.
//!
//! # Design choice: builder over constructor
//! A dozen-field constructor is unreadable and breaks on every new field.
//! The builder lets callers set only what they care about and rely on
//! documented defaults for the rest.

use crate::error::PolishError;
use crate::pipeline::rewrite::RewriteProvider;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Default model when neither the config nor the environment names one.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Configuration for a polishing run.
///
/// Built via [`PolishConfig::builder()`] or [`PolishConfig::default()`].
///
/// # Example
/// ```rust
/// use novelpolish::PolishConfig;
///
/// let config = PolishConfig::builder()
///     .max_chars(5000)
///     .sleep_ms(250)
///     .model("gemini-2.5-flash")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PolishConfig {
    /// Rewrite mode selecting the system prompt profile. Default: [`RewriteMode::Polish`].
    pub mode: RewriteMode,

    /// Model identifier, e.g. "gemini-2.5-flash". If `None`, [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// Provider name (e.g. "gemini", "openai"). If `None` along with
    /// `provider`, the provider is auto-detected from API-key environment
    /// variables.
    pub provider_name: Option<String>,

    /// Pre-constructed rewrite provider. Takes precedence over
    /// `provider_name`; the injection point for tests and custom middleware.
    pub provider: Option<Arc<dyn RewriteProvider>>,

    /// Sampling temperature. Default: 0.2.
    ///
    /// Low temperature keeps the model faithful to the source text — exactly
    /// what you want when the task is polishing, not invention.
    pub temperature: f32,

    /// Maximum tokens the model may generate per chunk. Default: 8192.
    pub max_output_tokens: usize,

    /// Hard upper bound on characters per chunk. Default: 7000.
    ///
    /// Sized so a chunk plus prompt scaffolding stays comfortably inside
    /// typical context windows while keeping per-call latency bounded.
    pub max_chars: usize,

    /// Target lower bound for the trailing chunk of a chapter. Default: 200.
    ///
    /// A tiny trailing chunk wastes a model call, so paragraphs or
    /// sentences shift back from the preceding chunk to feed it — but only
    /// while both chunks stay within `max_chars`, which is never exceeded.
    /// Set to 0 to disable.
    pub min_tail_chars: usize,

    /// Pacing delay between consecutive provider calls, in milliseconds.
    /// Default: 250.
    ///
    /// Applied before *every* call — including the first call after a resume
    /// — so a restarted run cannot burst past the provider's rate limit.
    pub sleep_ms: u64,

    /// Maximum attempts per chunk on transient provider failures. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 2000.
    ///
    /// Doubles after each attempt: 2 s → 4 s → 8 s. Rate-limit recovery is
    /// slow on the provider side, so the base is deliberately generous.
    pub retry_backoff_ms: u64,

    /// Page range to extract from the PDF. Default: the whole document.
    pub pages: PageRange,

    /// Export format for the assembled document. Default: Markdown.
    pub export: ExportFormat,

    /// Discard any existing checkpoint and reprocess from scratch.
    pub overwrite: bool,

    /// Style guide passed to the provider with every chunk.
    pub style: StyleConfig,

    /// Term glossary passed to the provider with every chunk.
    pub glossary: Glossary,

    /// Document title used in exports. If `None`, derived from the input
    /// file stem.
    pub title: Option<String>,
}

impl Default for PolishConfig {
    fn default() -> Self {
        Self {
            mode: RewriteMode::default(),
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.2,
            max_output_tokens: 8192,
            max_chars: 7000,
            min_tail_chars: 200,
            sleep_ms: 250,
            max_retries: 3,
            retry_backoff_ms: 2000,
            pages: PageRange::default(),
            export: ExportFormat::default(),
            overwrite: false,
            style: StyleConfig::default(),
            glossary: Glossary::default(),
            title: None,
        }
    }
}

impl fmt::Debug for PolishConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolishConfig")
            .field("mode", &self.mode)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|p| p.name().to_string()))
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("max_chars", &self.max_chars)
            .field("min_tail_chars", &self.min_tail_chars)
            .field("sleep_ms", &self.sleep_ms)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("pages", &self.pages)
            .field("export", &self.export)
            .field("overwrite", &self.overwrite)
            .finish()
    }
}

impl PolishConfig {
    pub fn builder() -> PolishConfigBuilder {
        PolishConfigBuilder {
            config: Self::default(),
        }
    }

    /// Model name with the default applied.
    pub fn model_name(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Builder for [`PolishConfig`].
#[derive(Debug)]
pub struct PolishConfigBuilder {
    config: PolishConfig,
}

impl PolishConfigBuilder {
    pub fn mode(mut self, mode: RewriteMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn RewriteProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_output_tokens(mut self, n: usize) -> Self {
        self.config.max_output_tokens = n;
        self
    }

    pub fn max_chars(mut self, n: usize) -> Self {
        self.config.max_chars = n;
        self
    }

    pub fn min_tail_chars(mut self, n: usize) -> Self {
        self.config.min_tail_chars = n;
        self
    }

    pub fn sleep_ms(mut self, ms: u64) -> Self {
        self.config.sleep_ms = ms;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.max(1);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn pages(mut self, range: PageRange) -> Self {
        self.config.pages = range;
        self
    }

    pub fn export(mut self, format: ExportFormat) -> Self {
        self.config.export = format;
        self
    }

    pub fn overwrite(mut self, v: bool) -> Self {
        self.config.overwrite = v;
        self
    }

    pub fn style(mut self, style: StyleConfig) -> Self {
        self.config.style = style;
        self
    }

    pub fn glossary(mut self, glossary: Glossary) -> Self {
        self.config.glossary = glossary;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.config.title = Some(title.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PolishConfig, PolishError> {
        let c = &self.config;
        if c.max_chars == 0 {
            return Err(PolishError::Validation {
                message: "max_chars must be positive".into(),
            });
        }
        if c.min_tail_chars >= c.max_chars {
            return Err(PolishError::Validation {
                message: format!(
                    "min_tail_chars ({}) must be below max_chars ({})",
                    c.min_tail_chars, c.max_chars
                ),
            });
        }
        if c.pages.first == 0 {
            return Err(PolishError::Validation {
                message: "pages are 1-indexed; first page must be >= 1".into(),
            });
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which system prompt profile drives the rewrite.
///
/// Both modes stay within style polishing; the difference is how much the
/// model is allowed to rephrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RewriteMode {
    /// Full stylistic polish: smooth awkward phrasing, fix repetition,
    /// unify register. (default)
    #[default]
    Polish,
    /// Light touch: grammar, punctuation, and obvious extraction artefacts
    /// only.
    Proofread,
}

impl RewriteMode {
    /// Stable token used in the checkpoint identity and CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            RewriteMode::Polish => "polish",
            RewriteMode::Proofread => "proofread",
        }
    }
}

/// Inclusive 1-based page range; `last == 0` means "to the end".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub first: usize,
    pub last: usize,
}

impl Default for PageRange {
    fn default() -> Self {
        Self { first: 1, last: 0 }
    }
}

impl PageRange {
    pub fn new(first: usize, last: usize) -> Self {
        Self { first, last }
    }

    /// Resolve against the actual page count into 0-based `[start, end)`
    /// bounds. Returns `None` when the range selects nothing.
    pub fn resolve(&self, total_pages: usize) -> Option<(usize, usize)> {
        let first = self.first.max(1);
        let last = if self.last == 0 || self.last > total_pages {
            total_pages
        } else {
            self.last
        };
        if first > last || total_pages == 0 {
            return None;
        }
        Some((first - 1, last))
    }
}

/// Format of the assembled output document.
///
/// DOCX rendering is the caller's concern (see
/// [`crate::pipeline::export::Exporter`] for the seam); the built-in
/// formats cover the common "readable file on disk" cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExportFormat {
    /// `polished.md` with chapter/part headings. (default)
    #[default]
    Markdown,
    /// `polished.txt`, plain concatenation with text headings.
    Text,
}

// ── Style & glossary ─────────────────────────────────────────────────────

/// Style guide handed to the provider with every chunk.
///
/// The recognized fields are enumerated; anything else in the caller's
/// style file is carried through opaquely in `extra` and still reaches the
/// prompt, so callers can extend their style guide without a crate change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StyleConfig {
    /// Overall register, e.g. "light, wry, conversational".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,

    /// Pronoun/honorific substitutions to apply consistently.
    #[serde(
        default,
        rename = "pronoun-mapping",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub pronoun_mapping: BTreeMap<String, String>,

    /// Terms the model must never rephrase.
    #[serde(
        default,
        rename = "preserve-terms",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub preserve_terms: Vec<String>,

    /// Unrecognized fields, passed through to the prompt verbatim.
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl StyleConfig {
    /// Load from a YAML file.
    pub fn load(path: &Path) -> Result<Self, PolishError> {
        let raw = std::fs::read_to_string(path).map_err(|e| PolishError::Validation {
            message: format!("cannot read style file '{}': {e}", path.display()),
        })?;
        serde_yaml::from_str(&raw).map_err(|e| PolishError::Validation {
            message: format!("invalid style file '{}': {e}", path.display()),
        })
    }

    pub fn is_empty(&self) -> bool {
        *self == StyleConfig::default()
    }

    /// Render as YAML for embedding in the user prompt.
    pub fn to_prompt_yaml(&self) -> String {
        serde_yaml::to_string(self).unwrap_or_default()
    }
}

/// Term glossary handed to the provider with every chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Glossary {
    pub terms: BTreeMap<String, String>,
}

impl Glossary {
    /// Load from a JSON file of `{"source term": "canonical rendering"}`.
    pub fn load(path: &Path) -> Result<Self, PolishError> {
        let raw = std::fs::read_to_string(path).map_err(|e| PolishError::Validation {
            message: format!("cannot read glossary file '{}': {e}", path.display()),
        })?;
        serde_json::from_str(&raw).map_err(|e| PolishError::Validation {
            message: format!("invalid glossary file '{}': {e}", path.display()),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Render as JSON for embedding in the user prompt.
    pub fn to_prompt_json(&self) -> String {
        serde_json::to_string_pretty(&self.terms).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_are_valid() {
        let config = PolishConfig::builder().build().unwrap();
        assert_eq!(config.max_chars, 7000);
        assert_eq!(config.sleep_ms, 250);
        assert_eq!(config.mode, RewriteMode::Polish);
        assert_eq!(config.model_name(), DEFAULT_MODEL);
    }

    #[test]
    fn builder_rejects_zero_max_chars() {
        assert!(PolishConfig::builder().max_chars(0).build().is_err());
    }

    #[test]
    fn builder_rejects_tail_above_budget() {
        let res = PolishConfig::builder()
            .max_chars(1000)
            .min_tail_chars(1000)
            .build();
        assert!(res.is_err());
    }

    #[test]
    fn page_range_resolution() {
        assert_eq!(PageRange::default().resolve(10), Some((0, 10)));
        assert_eq!(PageRange::new(3, 5).resolve(10), Some((2, 5)));
        assert_eq!(PageRange::new(3, 0).resolve(10), Some((2, 10)));
        // Last page clamped to the document.
        assert_eq!(PageRange::new(8, 99).resolve(10), Some((7, 10)));
        // Inverted or empty selections resolve to nothing.
        assert_eq!(PageRange::new(7, 3).resolve(10), None);
        assert_eq!(PageRange::default().resolve(0), None);
    }

    #[test]
    fn style_config_parses_recognized_and_extra_fields() {
        let yaml = r#"
tone: "light, wry"
pronoun-mapping:
  "I": "this humble servant"
preserve-terms:
  - "Young Master"
pacing: "brisk"
"#;
        let style: StyleConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(style.tone.as_deref(), Some("light, wry"));
        assert_eq!(
            style.pronoun_mapping.get("I").map(String::as_str),
            Some("this humble servant")
        );
        assert_eq!(style.preserve_terms, vec!["Young Master"]);
        assert!(style.extra.contains_key("pacing"));
        assert!(!style.is_empty());

        let rendered = style.to_prompt_yaml();
        assert!(rendered.contains("tone"));
        assert!(rendered.contains("pacing"));
    }

    #[test]
    fn glossary_round_trips_json() {
        let glossary: Glossary = serde_json::from_str(r#"{"gongzi": "young master"}"#).unwrap();
        assert_eq!(
            glossary.terms.get("gongzi").map(String::as_str),
            Some("young master")
        );
        assert!(glossary.to_prompt_json().contains("young master"));
    }

    #[test]
    fn empty_style_is_empty() {
        assert!(StyleConfig::default().is_empty());
        assert!(Glossary::default().is_empty());
    }
}
