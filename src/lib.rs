//! # qvs2pdf
//!
//! Explain QlikSense load scripts (`.qvs`) as developer-ready PDF reports.
//!
//! A script is sent, verbatim, together with a fixed explainer instruction to
//! a hosted language model (Gemini by default, through `edgequake-llm`). The
//! markdown reply is cleaned up, converted to HTML and paginated into a PDF
//! with the standard PDF fonts. The script itself is never parsed or
//! validated; it is opaque text.
//!
//! ## Pipeline Overview
//!
//! ```text
//! .qvs
//!  │
//!  ├─ 1. Acquire   read the file or decode an upload
//!  ├─ 2. Compose   instruction template + script body
//!  ├─ 3. Explain   one model call (timeout, optional retry, cancellable)
//!  ├─ 4. Cleanup   strip wrapper fences, normalise whitespace
//!  ├─ 5. Render    markdown → HTML → PDF (spawn_blocking)
//!  └─ 6. Deliver   file on disk or in-memory download
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use qvs2pdf::{convert_to_file, ReportConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads GEMINI_API_KEY from the environment
//!     let config = ReportConfig::default();
//!     let stats = convert_to_file("sample.qvs", "sample.pdf", &config).await?;
//!     eprintln!("{} pages, {} tokens out", stats.page_count, stats.output_tokens);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `qvs2pdf` binary (clap + anyhow + indicatif + tracing-subscriber + dotenvy) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! qvs2pdf = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod deliver;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod provider;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{OutputName, PageSetup, PageSize, ReportConfig, ReportConfigBuilder, RetryPolicy};
pub use convert::{
    convert, convert_sync, convert_to_file, convert_upload, convert_with_cancel, deliver_report,
    render_explanation,
};
pub use deliver::Download;
pub use error::{ErrorKind, Qvs2PdfError};
pub use output::{ExplanationResult, RenderedReport, ReportOutput, ReportStats};
pub use pipeline::input::{ScriptDocument, ScriptSource};
pub use progress::{NoopProgressCallback, PipelineStage, ProgressCallback, ReportProgressCallback};
pub use prompts::{compose_prompt, PromptPayload};
pub use provider::{ExplanationProvider, Generation, LlmExplanationProvider};
pub use tokio_util::sync::CancellationToken;
