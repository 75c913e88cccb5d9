//! Rendering: explanation markdown → HTML → PDF.
//!
//! Layout and serialisation are CPU-bound, so [`render_report`] runs the
//! whole chain inside `tokio::task::spawn_blocking` and keeps the Tokio
//! worker threads free for I/O.

use super::html::{html_document, markdown_to_html};
use super::layout::html_to_blocks;
use super::pdf::render_pdf;
use crate::config::PageSetup;
use crate::error::Qvs2PdfError;
use tracing::{debug, info};

/// Output of one render.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    /// Standalone HTML page (the intermediate representation).
    pub html: String,
    pub pdf: Vec<u8>,
    pub page_count: usize,
}

/// Render markdown to HTML and PDF on a blocking thread.
pub async fn render_report(
    markdown: String,
    title: String,
    page: PageSetup,
) -> Result<RenderedDocument, Qvs2PdfError> {
    tokio::task::spawn_blocking(move || render_markdown(&markdown, &title, &page))
        .await
        .map_err(|e| Qvs2PdfError::Internal(format!("Render task panicked: {}", e)))?
}

/// Blocking implementation of [`render_report`].
///
/// # Errors
/// * [`Qvs2PdfError::MarkdownParse`] when non-blank markdown yields nothing
///   printable (for example a reply made only of HTML comments)
/// * [`Qvs2PdfError::RenderFailed`] when the PDF cannot be serialised
pub fn render_markdown(
    markdown: &str,
    title: &str,
    page: &PageSetup,
) -> Result<RenderedDocument, Qvs2PdfError> {
    let fragment = markdown_to_html(markdown);
    let blocks = html_to_blocks(&fragment);
    debug!(
        "Markdown {} chars → HTML {} chars → {} blocks",
        markdown.len(),
        fragment.len(),
        blocks.len()
    );

    if blocks.is_empty() && !markdown.trim().is_empty() {
        return Err(Qvs2PdfError::MarkdownParse(
            "explanation contains no printable content".to_string(),
        ));
    }

    let pdf = render_pdf(&blocks, title, page)?;
    info!(
        "Rendered {} pages ({} bytes)",
        pdf.page_count,
        pdf.bytes.len()
    );

    Ok(RenderedDocument {
        html: html_document(&fragment, title),
        pdf: pdf.bytes,
        page_count: pdf.page_count,
    })
}
