//! Line-protocol progress reporting.
//!
//! The pipeline is driven by an external caller (GUI, supervisor script)
//! that reads one self-describing record per stdout line:
//!
//! ```text
//! STATUS stage=REWRITING
//! PROGRESS percent=42 chapter=3 part=2/5
//! LOG message="Found 87 chapter headings"
//! DONE outdir="out" docx="out/polished.md"
//! ERROR code=20 message="fatal provider error: 401 Unauthorized"
//! ```
//!
//! Lines that do not start with a recognized tag are opaque diagnostics to
//! the caller, never protocol violations — the protocol is forward-compatible
//! by construction. Diagnostic logging therefore goes to stderr via
//! [`tracing`], keeping stdout clean for the protocol.
//!
//! The reporter owns the percent monotonicity guarantee: within a run the
//! emitted `percent` never decreases, and 100 appears exactly when every
//! unit is complete.

use std::io::Write;

/// Emits protocol lines to an injected sink (stdout in the binary, a capture
/// buffer in tests).
pub struct ProgressReporter {
    sink: Box<dyn Write + Send>,
    last_percent: u8,
}

impl ProgressReporter {
    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        Self {
            sink,
            last_percent: 0,
        }
    }

    /// Reporter writing to the process's standard output.
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Emit a stage-transition line, with optional `key="value"` attributes.
    pub fn status(&mut self, stage: &str, attrs: &[(&str, &str)]) {
        let mut line = format!("STATUS stage={stage}");
        for (key, value) in attrs {
            line.push_str(&format!(" {key}=\"{}\"", escape(value)));
        }
        self.emit(&line);
    }

    /// Emit a progress line for the unit `(chapter, part/part_count)`.
    ///
    /// `percent` is `completed / total * 100`, floored, and clamped so it
    /// never goes backwards within a run.
    pub fn progress(
        &mut self,
        completed: usize,
        total: usize,
        chapter: u32,
        part: u32,
        part_count: u32,
    ) {
        let computed = if total == 0 {
            100
        } else {
            ((completed * 100) / total) as u8
        };
        let percent = computed.max(self.last_percent);
        self.last_percent = percent;
        self.emit(&format!(
            "PROGRESS percent={percent} chapter={chapter} part={part}/{part_count}"
        ));
    }

    /// Emit a human-readable log line for the caller's activity feed.
    pub fn log(&mut self, message: &str) {
        self.emit(&format!("LOG message=\"{}\"", escape(message)));
    }

    /// Emit the terminal success line.
    pub fn done(&mut self, outdir: &std::path::Path, doc: &std::path::Path) {
        self.emit(&format!(
            "DONE outdir=\"{}\" docx=\"{}\"",
            escape(&outdir.display().to_string()),
            escape(&doc.display().to_string())
        ));
    }

    /// Emit the terminal failure line.
    pub fn error(&mut self, code: i32, message: &str) {
        self.emit(&format!("ERROR code={code} message=\"{}\"", escape(message)));
    }

    /// Write one line and flush immediately.
    ///
    /// The caller reads line-by-line from a pipe; buffering would delay
    /// events and a crash could swallow them. Write failures are swallowed:
    /// a broken pipe must not take down a run whose checkpoint is the real
    /// record of progress.
    fn emit(&mut self, line: &str) {
        let _ = writeln!(self.sink, "{line}");
        let _ = self.sink.flush();
    }
}

/// Backslash-escape embedded backslashes and double quotes.
fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
