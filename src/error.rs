//! Error types for the novelpolish library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PolishError`] — the run cannot proceed (missing input, unreadable PDF,
//!   provider exhausted). Returned as `Err(PolishError)` from the top-level
//!   `polish_*` functions. Every variant maps to a stable numeric code that
//!   the `ERROR` protocol line carries and that the binary uses as its exit
//!   status, so a supervising caller can branch on failures without parsing
//!   message text.
//!
//! * [`ProviderError`] — a single provider call failed. Carries a
//!   [`ProviderErrorKind`] that decides retry behaviour: `Transient` errors
//!   (rate limit, timeout, 5xx) are retried with exponential backoff inside
//!   [`crate::pipeline::rewrite::RewriteClient`]; `Fatal` errors (bad
//!   credentials, invalid argument, policy rejection) propagate immediately.
//!
//! Checkpoint corruption is deliberately *not* here: an unparsable
//! checkpoint is recovered by starting fresh with a warning, never surfaced
//! as a hard failure. Cancellation is an outcome
//! ([`crate::document::RunOutcome::Cancelled`]), not an error.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the novelpolish library.
#[derive(Debug, Error)]
pub enum PolishError {
    /// Missing input file or unusable configuration, detected before any
    /// processing starts.
    #[error("Validation failed: {message}")]
    Validation { message: String },

    /// The PDF could not be read or yielded no parseable text.
    #[error("PDF extraction failed for '{path}': {detail}")]
    Extraction { path: PathBuf, detail: String },

    /// Most pages have no extractable text — the PDF is image-only.
    #[error(
        "This PDF appears to be scan-based (image-only): {empty_pages}/{total_pages} pages \
         have no extractable text. Run OCR software over the scan first."
    )]
    ScanBasedPdf {
        empty_pages: usize,
        total_pages: usize,
    },

    /// The AI provider failed for a chunk, either fatally or after
    /// exhausting all retry attempts.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Could not write the exported document.
    #[error("Failed to write output file '{path}': {source}")]
    ExportFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unexpected internal error (checkpoint write failure, runtime fault).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PolishError {
    /// Stable numeric code for the `ERROR` protocol line and process exit
    /// status. Codes are part of the external contract; do not renumber.
    pub fn code(&self) -> i32 {
        match self {
            PolishError::Validation { .. } => 1,
            PolishError::Extraction { .. } => 10,
            PolishError::ScanBasedPdf { .. } => 11,
            PolishError::Provider(_) => 20,
            PolishError::ExportFailed { .. } => 30,
            PolishError::Internal(_) => 99,
        }
    }
}

/// Failure of a single provider call.
#[derive(Debug, Clone, Error)]
#[error("{kind} provider error: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

/// Whether a provider failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Rate limit, timeout, or transient server fault — retry with backoff.
    Transient,
    /// Authentication, invalid argument, policy rejection, or retry
    /// exhaustion — never retried.
    Fatal,
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderErrorKind::Transient => f.write_str("transient"),
            ProviderErrorKind::Fatal => f.write_str("fatal"),
        }
    }
}

impl ProviderError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Fatal,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ProviderErrorKind::Transient
    }

    /// Classify a raw provider error message.
    ///
    /// Provider SDKs surface failures as strings rather than a structured
    /// taxonomy, so classification is by message inspection: rate-limit and
    /// server-fault markers are transient, everything else (auth, invalid
    /// argument, content policy) is fatal.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        const TRANSIENT_MARKERS: &[&str] = &[
            "429",
            "rate limit",
            "rate-limit",
            "quota",
            "timeout",
            "timed out",
            "500",
            "502",
            "503",
            "504",
            "overloaded",
            "unavailable",
            "connection reset",
        ];

        if TRANSIENT_MARKERS.iter().any(|m| lower.contains(m)) {
            ProviderError::transient(message)
        } else {
            ProviderError::fatal(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            PolishError::Validation {
                message: "x".into()
            }
            .code(),
            1
        );
        assert_eq!(
            PolishError::Extraction {
                path: "a.pdf".into(),
                detail: "bad".into()
            }
            .code(),
            10
        );
        assert_eq!(
            PolishError::ScanBasedPdf {
                empty_pages: 9,
                total_pages: 10
            }
            .code(),
            11
        );
        assert_eq!(
            PolishError::Provider(ProviderError::fatal("auth")).code(),
            20
        );
        assert_eq!(PolishError::Internal("boom".into()).code(), 99);
    }

    #[test]
    fn classify_rate_limit_is_transient() {
        let e = ProviderError::classify("HTTP 429: Resource exhausted (quota)");
        assert!(e.is_transient());
    }

    #[test]
    fn classify_timeout_and_5xx_are_transient() {
        assert!(ProviderError::classify("request timed out").is_transient());
        assert!(ProviderError::classify("upstream returned 503").is_transient());
        assert!(ProviderError::classify("model overloaded, try later").is_transient());
    }

    #[test]
    fn classify_auth_is_fatal() {
        let e = ProviderError::classify("401 Unauthorized: invalid API key");
        assert!(!e.is_transient());
    }

    #[test]
    fn classify_policy_rejection_is_fatal() {
        assert!(!ProviderError::classify("blocked by content policy").is_transient());
    }

    #[test]
    fn scan_based_display_mentions_ocr() {
        let e = PolishError::ScanBasedPdf {
            empty_pages: 8,
            total_pages: 10,
        };
        let msg = e.to_string();
        assert!(msg.contains("8/10"), "got: {msg}");
        assert!(msg.contains("OCR"));
    }
}
