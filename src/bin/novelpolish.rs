//! CLI binary for novelpolish.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PolishConfig`, streams the progress protocol on stdout, and exits with
//! the error's stable code on failure.

use anyhow::{Context, Result};
use clap::Parser;
use novelpolish::{
    polish_pdf, CancelToken, ExportFormat, Glossary, PageRange, PolishConfig, ProgressReporter,
    RewriteMode, RunOutcome, StyleConfig,
};
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Polish a novel with provider auto-detection
  novelpolish -i novel.pdf -o out

  # Proofread only, with an explicit provider and model
  novelpolish -i novel.pdf --mode proofread --provider gemini --model gemini-2.5-flash

  # Pages 10-250 only, plain-text output
  novelpolish -i novel.pdf --start-page 10 --end-page 250 --export txt

  # Resume an interrupted run (same flags, same outdir)
  novelpolish -i novel.pdf -o out

  # Discard the previous checkpoint and start over
  novelpolish -i novel.pdf -o out --overwrite

PROTOCOL:
  Progress streams on stdout, one event per line, for supervising processes:
    STATUS stage=REWRITING total="42"
    PROGRESS percent=16 chapter=3 part=1/2
    LOG message="Resuming: 7/42 chunks already complete"
    DONE outdir="out" docx="out/polished.md"
    ERROR code=20 message="..."
  Logs go to stderr and never interleave with the protocol.

CHECKPOINTING:
  Every polished chunk is recorded in <outdir>/checkpoint.json before it is
  reported. Re-running with the same input, mode, model, provider, and
  --max-chars resumes; changing any of them starts fresh. Ctrl-C stops
  cleanly at the next chunk boundary and the run stays resumable.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  API keys are read from the environment only; there is no key flag.

STYLE & GLOSSARY:
  --style points at a YAML style guide (tone, pronoun-mapping,
  preserve-terms, free-form keys); --glossary at a JSON term map. When the
  flags are absent, style.yaml / glossary.json next to the input PDF are
  picked up automatically.
"#;

/// Polish or proofread a PDF novel with an LLM, chunk by chunk.
#[derive(Parser, Debug)]
#[command(
    name = "novelpolish",
    version,
    about = "Polish or proofread a PDF novel with an LLM, chunk by chunk",
    long_about = "Extract the text of a PDF novel, split it into chapters and model-sized \
chunks, rewrite each chunk with an LLM, and export the assembled document. Progress is \
checkpointed per chunk, so interrupted runs resume without repeating paid model calls.",
    arg_required_else_help = true,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input PDF file.
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory for the document and checkpoint.
    #[arg(short, long, default_value = "out")]
    outdir: PathBuf,

    /// Rewrite mode: polish (full line edit) or proofread (corrections only).
    #[arg(long, value_enum, default_value = "polish")]
    mode: ModeArg,

    /// LLM provider: openai, anthropic, gemini, ollama. Auto-detected from
    /// API key env vars if not set.
    #[arg(long)]
    provider: Option<String>,

    /// LLM model ID (default: gemini-2.5-flash).
    #[arg(long)]
    model: Option<String>,

    /// First page to process (1-based).
    #[arg(long, default_value_t = 1)]
    start_page: usize,

    /// Last page to process (inclusive; 0 means to the end).
    #[arg(long, default_value_t = 0)]
    end_page: usize,

    /// Maximum characters per chunk.
    #[arg(long, default_value_t = 7000)]
    max_chars: usize,

    /// Pause between model calls, in milliseconds.
    #[arg(long, default_value_t = 250)]
    sleep_ms: u64,

    /// Attempts per chunk on transient provider failure.
    #[arg(long, default_value_t = 3)]
    max_retries: u32,

    /// Base backoff between retries, in milliseconds (doubles per attempt).
    #[arg(long, default_value_t = 2000)]
    retry_backoff_ms: u64,

    /// YAML style guide passed to the model with every chunk.
    #[arg(long)]
    style: Option<PathBuf>,

    /// JSON glossary of terms the model must render consistently.
    #[arg(long)]
    glossary: Option<PathBuf>,

    /// Export format: md or txt.
    #[arg(long, value_enum, default_value = "md")]
    export: ExportArg,

    /// Document title (default: input file name).
    #[arg(long)]
    title: Option<String>,

    /// Discard any existing checkpoint and start fresh.
    #[arg(long)]
    overwrite: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all logs except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Polish,
    Proofread,
}

impl From<ModeArg> for RewriteMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Polish => RewriteMode::Polish,
            ModeArg::Proofread => RewriteMode::Proofread,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ExportArg {
    Md,
    Txt,
}

impl From<ExportArg> for ExportFormat {
    fn from(v: ExportArg) -> Self {
        match v {
            ExportArg::Md => ExportFormat::Markdown,
            ExportArg::Txt => ExportFormat::Text,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs to stderr only; stdout is reserved for the progress protocol.
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli).context("Invalid configuration")?;

    // Ctrl-C flips the token; the run stops at the next chunk boundary with
    // the checkpoint intact.
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Interrupt received; finishing the current chunk...");
                cancel.cancel();
            }
        });
    }

    let mut reporter = ProgressReporter::stdout();
    match polish_pdf(&cli.input, &cli.outdir, config, &mut reporter, &cancel).await {
        Ok(RunOutcome::Done { doc_path, stats, .. }) => {
            if !cli.quiet {
                eprintln!(
                    "Polished {} chunks ({} rewritten, {} skipped) in {}ms -> {}",
                    stats.total_chunks,
                    stats.rewritten_chunks,
                    stats.skipped_chunks,
                    stats.total_duration_ms,
                    doc_path.display()
                );
            }
            Ok(())
        }
        Ok(RunOutcome::Cancelled { completed, total }) => {
            if !cli.quiet {
                eprintln!("Cancelled at {completed}/{total} chunks; re-run to resume.");
            }
            Ok(())
        }
        Err(e) => {
            // The ERROR protocol line is already on stdout; exit with the
            // matching stable code.
            eprintln!("Error: {e}");
            std::process::exit(e.code());
        }
    }
}

/// Map CLI args to `PolishConfig`.
fn build_config(cli: &Cli) -> Result<PolishConfig> {
    let style = match &cli.style {
        Some(path) => StyleConfig::load(path)?,
        None => match find_sibling(&cli.input, "style.yaml") {
            Some(path) => StyleConfig::load(&path)?,
            None => StyleConfig::default(),
        },
    };
    let glossary = match &cli.glossary {
        Some(path) => Glossary::load(path)?,
        None => match find_sibling(&cli.input, "glossary.json") {
            Some(path) => Glossary::load(&path)?,
            None => Glossary::default(),
        },
    };

    let mut builder = PolishConfig::builder()
        .mode(cli.mode.into())
        .max_chars(cli.max_chars)
        .sleep_ms(cli.sleep_ms)
        .max_retries(cli.max_retries)
        .retry_backoff_ms(cli.retry_backoff_ms)
        .pages(PageRange::new(cli.start_page, cli.end_page))
        .export(cli.export.into())
        .overwrite(cli.overwrite)
        .style(style)
        .glossary(glossary);

    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref title) = cli.title {
        builder = builder.title(title.clone());
    }

    Ok(builder.build()?)
}

/// Look for a companion file next to the input PDF.
fn find_sibling(input: &Path, name: &str) -> Option<PathBuf> {
    let candidate = input.parent()?.join(name);
    candidate.is_file().then_some(candidate)
}
