//! Values produced by a pipeline run.

use serde::Serialize;

/// Markdown explanation returned by the provider, after cleanup.
#[derive(Debug, Clone, Serialize)]
pub struct ExplanationResult {
    pub markdown: String,
    pub provider: String,
    pub model: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    /// Retries spent before the successful attempt.
    pub retries: u32,
    pub duration_ms: u64,
}

impl ExplanationResult {
    /// Wrap markdown obtained elsewhere (a fixture, a cache the caller owns).
    pub fn from_markdown(markdown: impl Into<String>) -> Self {
        Self {
            markdown: markdown.into(),
            provider: String::new(),
            model: String::new(),
            input_tokens: 0,
            output_tokens: 0,
            retries: 0,
            duration_ms: 0,
        }
    }
}

/// The finished PDF and the file name it should be delivered under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedReport {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub page_count: usize,
}

/// Per-run statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReportStats {
    pub script_name: String,
    pub script_chars: usize,
    /// Version of the built-in instruction template the prompt used; `None`
    /// when the instruction was overridden or no model was called.
    pub instruction_version: Option<String>,
    pub prompt_chars: usize,
    pub explanation_chars: usize,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub retries: u32,
    pub page_count: usize,
    pub pdf_bytes: usize,
    pub llm_duration_ms: u64,
    pub render_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct ReportOutput {
    pub report: RenderedReport,
    pub explanation: ExplanationResult,
    /// Standalone HTML page of the explanation.
    pub html: String,
    pub stats: ReportStats,
}
