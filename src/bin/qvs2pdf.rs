//! CLI binary for qvs2pdf.
//!
//! A thin shim over the library crate that maps CLI flags to `ReportConfig`,
//! writes the PDF and prints a short summary.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use qvs2pdf::deliver::DEFAULT_REPORT_FILENAME;
use qvs2pdf::{
    convert_with_cancel, deliver_report, OutputName, PageSize, PipelineStage, ProgressCallback, ReportConfig,
    ReportOutput, ReportProgressCallback, ScriptSource,
};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner that shows the running stage and logs one line per finished stage.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("qvs2pdf");
        bar.set_message("Starting…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ReportProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: PipelineStage) {
        self.bar.set_message(format!("{}…", stage.label()));
    }

    fn on_stage_complete(&self, stage: PipelineStage, elapsed: Duration) {
        self.bar.println(format!(
            "  {} {:<22} {}",
            green("✓"),
            stage.label(),
            dim(&format!("{:.1}s", elapsed.as_secs_f64())),
        ));
    }

    fn on_retry(&self, retry: u32, max_retries: u32, delay: Duration, error: &str) {
        self.bar.println(format!(
            "  {} retry {}/{} in {}ms  {}",
            cyan("↻"),
            retry,
            max_retries,
            delay.as_millis(),
            dim(&truncate(error, 80)),
        ));
    }

    fn on_failure(&self, stage: PipelineStage, error: &str) {
        self.bar.println(format!(
            "  {} {:<22} {}",
            red("✗"),
            stage.label(),
            red(&truncate(error, 80)),
        ));
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let cut: String = s.chars().take(max - 1).collect();
        format!("{cut}\u{2026}")
    } else {
        s.to_string()
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Explain a load script; writes sample.pdf in the current directory
  qvs2pdf sample.qvs

  # Choose the output file
  qvs2pdf sample.qvs -o reports/sales.pdf

  # Always deliver as "Dashboard Summary.pdf"
  qvs2pdf sample.qvs --fixed-name --output-dir reports/

  # Script saved by a Windows editor
  qvs2pdf legacy.qvs --encoding windows-1252

  # Keep the intermediate HTML and print the explanation
  qvs2pdf sample.qvs --html sample.html --preview

  # Retry transient failures twice, US Letter paper
  qvs2pdf sample.qvs --max-retries 2 --page-size letter

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY   Google Gemini API key (required; also read from .env)
  QVS2PDF_*        Most flags, e.g. QVS2PDF_MODEL, QVS2PDF_OUTPUT_DIR
  RUST_LOG         Override log filters, e.g. RUST_LOG=qvs2pdf=debug
"#;

/// Explain QlikSense load scripts as PDF reports.
#[derive(Parser, Debug)]
#[command(
    name = "qvs2pdf",
    version,
    about = "Explain QlikSense load scripts (.qvs) as developer-ready PDF reports",
    long_about = "Send a QlikSense load script to a hosted language model with a fixed \
explainer instruction, then render the returned markdown explanation as a paginated PDF.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// QlikSense script file (.qvs).
    input: PathBuf,

    /// Write the PDF to this file (or into this directory).
    #[arg(short, long, env = "QVS2PDF_OUTPUT", conflicts_with = "output_dir")]
    output: Option<PathBuf>,

    /// Directory for the PDF, named after the script (default: current directory).
    #[arg(long, env = "QVS2PDF_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Deliver under a fixed file name instead of the script name.
    #[arg(
        long,
        env = "QVS2PDF_FIXED_NAME",
        num_args = 0..=1,
        default_missing_value = DEFAULT_REPORT_FILENAME,
        value_name = "NAME"
    )]
    fixed_name: Option<String>,

    /// Text encoding of the script (utf-8, utf-16le, windows-1252, …).
    #[arg(long, env = "QVS2PDF_ENCODING", default_value = "utf-8")]
    encoding: String,

    /// Model ID.
    #[arg(long, env = "QVS2PDF_MODEL", default_value = qvs2pdf::config::DEFAULT_MODEL)]
    model: String,

    /// Provider name understood by edgequake-llm.
    #[arg(long, env = "QVS2PDF_PROVIDER", default_value = qvs2pdf::config::DEFAULT_PROVIDER)]
    provider: String,

    /// Environment variable that holds the API key.
    #[arg(long, env = "QVS2PDF_API_KEY_ENV", default_value = qvs2pdf::config::DEFAULT_API_KEY_ENV)]
    api_key_env: String,

    /// File with a replacement instruction template.
    #[arg(long, env = "QVS2PDF_INSTRUCTION")]
    instruction: Option<PathBuf>,

    /// Retries for transient model failures (0 = fail fast).
    #[arg(long, env = "QVS2PDF_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Base backoff between retries, doubled on each retry.
    #[arg(long, env = "QVS2PDF_RETRY_BACKOFF_MS", default_value_t = 500)]
    retry_backoff_ms: u64,

    /// Timeout for the model call, in seconds.
    #[arg(long, env = "QVS2PDF_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Paper size.
    #[arg(long, env = "QVS2PDF_PAGE_SIZE", value_enum, default_value = "a4")]
    page_size: PageSizeArg,

    /// Body text size in points (6–24).
    #[arg(long, env = "QVS2PDF_FONT_SIZE", default_value_t = 11.0)]
    font_size: f32,

    /// Also write the intermediate HTML page here.
    #[arg(long, value_name = "PATH")]
    html: Option<PathBuf>,

    /// Also write the cleaned markdown explanation here.
    #[arg(long, value_name = "PATH")]
    markdown: Option<PathBuf>,

    /// Print the markdown explanation to stdout.
    #[arg(long)]
    preview: bool,

    /// Print run statistics as JSON to stdout.
    #[arg(long, env = "QVS2PDF_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "QVS2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "QVS2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "QVS2PDF_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PageSizeArg {
    A4,
    Letter,
}

impl From<PageSizeArg> for PageSize {
    fn from(v: PageSizeArg) -> Self {
        match v {
            PageSizeArg::A4 => PageSize::A4,
            PageSizeArg::Letter => PageSize::Letter,
        }
    }
}

#[derive(Serialize)]
struct JsonSummary<'a> {
    pdf: &'a Path,
    html: Option<&'a Path>,
    markdown: Option<&'a Path>,
    stats: &'a qvs2pdf::ReportStats,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner provides the feedback that matters; keep library INFO logs
    // out of its way unless asked for.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.preview;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress = if show_progress {
        Some(CliProgressCallback::new())
    } else {
        None
    };
    let config = build_config(
        &cli,
        progress.clone().map(|p| p as ProgressCallback),
    )
    .await?;

    // Fail before reading anything when the key is missing.
    if let Err(e) = config.check_credentials() {
        if let Some(ref p) = progress {
            p.finish();
        }
        return Err(e).context(format!(
            "Set {} in the environment or in a .env file",
            config.api_key_env
        ));
    }

    // ── Cancellation on Ctrl-C ───────────────────────────────────────────
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    // ── Run ──────────────────────────────────────────────────────────────
    let source = script_source(&cli).await?;
    let result = async {
        let output = convert_with_cancel(source, &config, &cancel)
            .await
            .with_context(|| format!("Failed to explain {}", cli.input.display()))?;

        // ── Deliver ──────────────────────────────────────────────────────
        let target = target_path(&cli, &output)?;
        let pdf_path = deliver_report(&output, &target, &config)
            .await
            .with_context(|| format!("Failed to save {}", target.display()))?;
        Ok::<_, anyhow::Error>((output, pdf_path))
    }
    .await;
    if let Some(ref p) = progress {
        p.finish();
    }
    let (output, pdf_path) = result?;

    if let Some(ref path) = cli.html {
        tokio::fs::write(path, &output.html)
            .await
            .with_context(|| format!("Failed to write HTML to {}", path.display()))?;
    }
    if let Some(ref path) = cli.markdown {
        tokio::fs::write(path, &output.explanation.markdown)
            .await
            .with_context(|| format!("Failed to write markdown to {}", path.display()))?;
    }

    if cli.preview {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(output.explanation.markdown.as_bytes())
            .context("Failed to write to stdout")?;
    }

    if cli.json {
        let summary = JsonSummary {
            pdf: &pdf_path,
            html: cli.html.as_deref(),
            markdown: cli.markdown.as_deref(),
            stats: &output.stats,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    }

    if !cli.quiet {
        eprintln!(
            "{}  {}  {} pages  {}ms  →  {}",
            green("✔"),
            bold("Report ready"),
            output.stats.page_count,
            output.stats.total_duration_ms,
            bold(&pdf_path.display().to_string()),
        );
        eprintln!(
            "   {} tokens in  /  {} tokens out",
            dim(&output.stats.input_tokens.to_string()),
            dim(&output.stats.output_tokens.to_string()),
        );
    }

    Ok(())
}

/// Map CLI args to `ReportConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ReportConfig> {
    let mut builder = ReportConfig::builder()
        .provider_name(&cli.provider)
        .model(&cli.model)
        .api_key_env(&cli.api_key_env)
        .max_retries(cli.max_retries)
        .retry_backoff_ms(cli.retry_backoff_ms)
        .api_timeout_secs(cli.api_timeout)
        .page_size(cli.page_size.into())
        .font_size(cli.font_size);

    if let Some(ref path) = cli.instruction {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read instruction from {}", path.display()))?;
        builder = builder.instruction(text);
    }
    if let Some(ref name) = cli.fixed_name {
        builder = builder.output_name(OutputName::Fixed(name.clone()));
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Plain path for UTF-8 scripts; other encodings are decoded like an upload.
async fn script_source(cli: &Cli) -> Result<ScriptSource> {
    let utf8 = matches!(
        cli.encoding.trim().to_ascii_lowercase().as_str(),
        "utf-8" | "utf8"
    );
    if utf8 {
        return Ok(ScriptSource::Path(cli.input.clone()));
    }
    let bytes = tokio::fs::read(&cli.input)
        .await
        .with_context(|| format!("Failed to read {}", cli.input.display()))?;
    let name = cli
        .input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| cli.input.display().to_string());
    Ok(ScriptSource::Upload {
        name,
        bytes,
        encoding: cli.encoding.clone(),
    })
}

fn target_path(cli: &Cli, output: &ReportOutput) -> Result<PathBuf> {
    if let Some(ref path) = cli.output {
        if path.is_dir() {
            return Ok(path.join(&output.report.filename));
        }
        return Ok(path.clone());
    }
    let dir = match cli.output_dir {
        Some(ref dir) => dir.clone(),
        None => std::env::current_dir().context("Failed to resolve the current directory")?,
    };
    Ok(dir.join(&output.report.filename))
}
