//! Report generation entry points.
//!
//! Every entry point runs the same linear pipeline once:
//!
//! ```text
//! acquire ──▶ compose ──▶ explain ──▶ cleanup ──▶ render ──▶ deliver
//! ```
//!
//! Stages run strictly in sequence and nothing is shared between calls, so
//! any number of conversions may run concurrently on one runtime.

use crate::config::ReportConfig;
use crate::deliver::{self, Download};
use crate::error::Qvs2PdfError;
use crate::output::{ExplanationResult, RenderedReport, ReportOutput, ReportStats};
use crate::pipeline::input::{self, ScriptSource};
use crate::pipeline::{llm, postprocess, render};
use crate::progress::PipelineStage;
use crate::prompts::{compose_prompt, INSTRUCTION_TEMPLATE_VERSION};
use crate::provider::resolve_provider;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Turn one QlikSense script into an explained PDF report.
///
/// This is the primary entry point for the library.
///
/// # Errors
/// * Configuration: missing credential, unknown provider (before any I/O)
/// * Io: the script cannot be read or decoded
/// * Authentication / Service / EmptyResponse: the model call failed
/// * MarkdownParse / Render: the explanation could not be laid out
///
/// There is no partial success: either a complete PDF or an error.
///
/// # Example
/// ```rust,no_run
/// use qvs2pdf::{convert, ReportConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ReportConfig::default();
/// let output = convert("sample.qvs", &config).await?;
/// std::fs::write(&output.report.filename, &output.report.bytes)?;
/// # Ok(())
/// # }
/// ```
pub async fn convert(
    source: impl Into<ScriptSource>,
    config: &ReportConfig,
) -> Result<ReportOutput, Qvs2PdfError> {
    convert_with_cancel(source, config, &CancellationToken::new()).await
}

/// [`convert`] with a cancellation token.
///
/// Cancelling the token while the model call is in flight drops the request
/// and fails with [`Qvs2PdfError::Cancelled`].
pub async fn convert_with_cancel(
    source: impl Into<ScriptSource>,
    config: &ReportConfig,
    cancel: &CancellationToken,
) -> Result<ReportOutput, Qvs2PdfError> {
    let total_start = Instant::now();
    let source = source.into();
    info!("Starting report: {}", source.display_name());

    // ── Step 1: Provider (fails on a missing credential, before any I/O) ──
    let provider = resolve_provider(config)?;

    // ── Step 2: Acquire ──────────────────────────────────────────────────
    let document = run_stage(config, PipelineStage::Acquire, input::acquire(source)).await?;
    debug!(
        "Script {}: {} chars",
        document.name,
        document.body.chars().count()
    );

    // ── Step 3: Compose ──────────────────────────────────────────────────
    let payload = run_stage(config, PipelineStage::Compose, async {
        Ok(compose_prompt(&document, config.instruction.as_deref()))
    })
    .await?;

    // ── Step 4: Explain ──────────────────────────────────────────────────
    let mut explanation = run_stage(
        config,
        PipelineStage::Explain,
        llm::explain(provider.as_ref(), &payload, config, cancel),
    )
    .await?;
    explanation.markdown = postprocess::clean_markdown(&explanation.markdown);
    debug!(
        "Explanation: {} in / {} out tokens, {} retries",
        explanation.input_tokens, explanation.output_tokens, explanation.retries
    );

    // ── Step 5: Render ───────────────────────────────────────────────────
    let stats = ReportStats {
        script_name: document.name.clone(),
        script_chars: document.body.chars().count(),
        instruction_version: config
            .instruction
            .is_none()
            .then(|| INSTRUCTION_TEMPLATE_VERSION.to_string()),
        prompt_chars: payload.char_count(),
        explanation_chars: explanation.markdown.chars().count(),
        input_tokens: explanation.input_tokens,
        output_tokens: explanation.output_tokens,
        retries: explanation.retries,
        llm_duration_ms: explanation.duration_ms,
        ..ReportStats::default()
    };
    let output = render_stage(&document.name, explanation, config, stats, total_start).await?;

    info!(
        "Report complete: {} ({} pages, {}ms total)",
        output.report.filename, output.report.page_count, output.stats.total_duration_ms
    );
    Ok(output)
}

/// Generate a report and write it to disk.
///
/// If `output_path` is an existing directory the report is written inside it
/// under its suggested name. Writes are atomic (temp file + rename).
pub async fn convert_to_file(
    source: impl Into<ScriptSource>,
    output_path: impl AsRef<Path>,
    config: &ReportConfig,
) -> Result<ReportStats, Qvs2PdfError> {
    let output = convert(source, config).await?;
    deliver_report(&output, output_path, config).await?;
    Ok(output.stats)
}

/// Write a finished report to disk as the `Deliver` stage.
///
/// Resolves a directory target the same way as [`convert_to_file`] and
/// returns the path actually written. The blocking write runs off the async
/// workers.
pub async fn deliver_report(
    output: &ReportOutput,
    output_path: impl AsRef<Path>,
    config: &ReportConfig,
) -> Result<PathBuf, Qvs2PdfError> {
    let path = output_path.as_ref();
    let target = if tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
    {
        path.join(&output.report.filename)
    } else {
        path.to_path_buf()
    };

    run_stage(
        config,
        PipelineStage::Deliver,
        save_report(output.report.clone(), target),
    )
    .await
}

/// Interactive entry point: an uploaded script in, a download out.
///
/// `encoding` is a WHATWG label such as `utf-8` or `windows-1252`.
pub async fn convert_upload(
    name: impl Into<String>,
    bytes: impl Into<Vec<u8>>,
    encoding: &str,
    config: &ReportConfig,
    include_preview: bool,
) -> Result<Download, Qvs2PdfError> {
    let source = ScriptSource::Upload {
        name: name.into(),
        bytes: bytes.into(),
        encoding: encoding.to_string(),
    };
    let output = convert(source, config).await?;
    run_stage(config, PipelineStage::Deliver, async {
        Ok(Download::from_output(&output, include_preview))
    })
    .await
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally; do not call it from inside
/// an async context.
pub fn convert_sync(
    source: impl Into<ScriptSource>,
    config: &ReportConfig,
) -> Result<ReportOutput, Qvs2PdfError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Qvs2PdfError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(source, config))
}

/// Render markdown the caller already has (a fixture, a stored explanation)
/// into a report, without calling any model.
///
/// The markdown goes through the same cleanup as a model reply.
pub async fn render_explanation(
    markdown: &str,
    document_name: &str,
    config: &ReportConfig,
) -> Result<ReportOutput, Qvs2PdfError> {
    let total_start = Instant::now();
    let explanation = ExplanationResult::from_markdown(postprocess::clean_markdown(markdown));
    let stats = ReportStats {
        script_name: document_name.to_string(),
        explanation_chars: explanation.markdown.chars().count(),
        ..ReportStats::default()
    };
    render_stage(document_name, explanation, config, stats, total_start).await
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Run one stage, reporting start/complete/failure to the progress callback.
async fn run_stage<T, F>(
    config: &ReportConfig,
    stage: PipelineStage,
    fut: F,
) -> Result<T, Qvs2PdfError>
where
    F: Future<Output = Result<T, Qvs2PdfError>>,
{
    let cb = config.progress_callback.as_ref();
    if let Some(cb) = cb {
        cb.on_stage_start(stage);
    }
    let start = Instant::now();
    match fut.await {
        Ok(value) => {
            let elapsed = start.elapsed();
            debug!("{} finished in {}ms", stage, elapsed.as_millis());
            if let Some(cb) = cb {
                cb.on_stage_complete(stage, elapsed);
            }
            Ok(value)
        }
        Err(e) => {
            if let Some(cb) = cb {
                cb.on_failure(stage, &e.to_string());
            }
            Err(e)
        }
    }
}

async fn render_stage(
    document_name: &str,
    explanation: ExplanationResult,
    config: &ReportConfig,
    mut stats: ReportStats,
    total_start: Instant,
) -> Result<ReportOutput, Qvs2PdfError> {
    let filename = deliver::resolve_filename(&config.output_name, document_name);
    let title = config
        .title
        .clone()
        .unwrap_or_else(|| default_title(document_name));

    let render_start = Instant::now();
    let rendered = run_stage(
        config,
        PipelineStage::Render,
        render::render_report(explanation.markdown.clone(), title, config.page),
    )
    .await?;
    stats.render_duration_ms = render_start.elapsed().as_millis() as u64;
    stats.page_count = rendered.page_count;
    stats.pdf_bytes = rendered.pdf.len();
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    Ok(ReportOutput {
        report: RenderedReport {
            filename,
            bytes: rendered.pdf,
            page_count: rendered.page_count,
        },
        explanation,
        html: rendered.html,
        stats,
    })
}

/// Document title derived from the script name: `sample.qvs` → `sample`.
fn default_title(document_name: &str) -> String {
    let filename = deliver::report_filename(document_name);
    filename
        .strip_suffix(".pdf")
        .unwrap_or(&filename)
        .to_string()
}

async fn save_report(report: RenderedReport, path: PathBuf) -> Result<PathBuf, Qvs2PdfError> {
    tokio::task::spawn_blocking(move || deliver::write_report(&report, &path))
        .await
        .map_err(|e| Qvs2PdfError::Internal(format!("Write task panicked: {}", e)))?
}
