//! Delivery: naming the PDF, writing it to disk, and packaging it as a
//! download for an interactive front end.

use crate::config::OutputName;
use crate::error::Qvs2PdfError;
use crate::output::{RenderedReport, ReportOutput};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File name used by [`OutputName::Fixed`] when callers want one stable name.
pub const DEFAULT_REPORT_FILENAME: &str = "Dashboard Summary.pdf";

/// MIME type of every delivered report.
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

const FALLBACK_STEM: &str = "report";

/// Suggested PDF name for a script: its base name with a `.pdf` suffix.
///
/// Both `/` and `\` count as separators, since uploads from Windows browsers
/// may carry a full path.
///
/// ```rust
/// use qvs2pdf::deliver::report_filename;
///
/// assert_eq!(report_filename("sample.qvs"), "sample.pdf");
/// assert_eq!(report_filename(r"C:\scripts\Sales Load.qvs"), "Sales Load.pdf");
/// assert_eq!(report_filename(""), "report.pdf");
/// ```
pub fn report_filename(document_name: &str) -> String {
    let normalized = document_name.replace('\\', "/");
    let base = normalized.rsplit('/').next().unwrap_or_default();
    let stem = Path::new(base)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem: String = stem
        .chars()
        .map(|c| match c {
            ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let stem = stem.trim();
    if stem.is_empty() {
        format!("{FALLBACK_STEM}.pdf")
    } else {
        format!("{stem}.pdf")
    }
}

/// Apply the configured naming rule.
pub fn resolve_filename(rule: &OutputName, document_name: &str) -> String {
    match rule {
        OutputName::FromInput => report_filename(document_name),
        OutputName::Fixed(name) => name.clone(),
    }
}

/// Write a report to `path` atomically.
///
/// The bytes go to a temporary file in the destination directory, which is
/// then renamed over `path`. The temporary file is removed on every failure.
pub fn write_report(report: &RenderedReport, path: &Path) -> Result<PathBuf, Qvs2PdfError> {
    let write_err = |source: std::io::Error| Qvs2PdfError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(write_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(write_err)?;
    tmp.write_all(&report.bytes).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    debug!("Staged {} bytes in {}", report.bytes.len(), tmp.path().display());

    // On failure the PersistError owns the temp file and deletes it on drop.
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    info!("Wrote {} ({} bytes)", path.display(), report.bytes.len());
    Ok(path.to_path_buf())
}

/// Write a report into `dir` under its suggested file name.
pub fn write_report_to_dir(report: &RenderedReport, dir: &Path) -> Result<PathBuf, Qvs2PdfError> {
    write_report(report, &dir.join(&report.filename))
}

/// An in-memory PDF ready to hand to a browser or chat front end.
#[derive(Debug, Clone, Serialize)]
pub struct Download {
    pub filename: String,
    pub content_type: &'static str,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    /// The explanation markdown, for showing inline next to the button.
    pub preview: Option<String>,
}

impl Download {
    pub fn from_output(output: &ReportOutput, include_preview: bool) -> Self {
        Self {
            filename: output.report.filename.clone(),
            content_type: PDF_CONTENT_TYPE,
            bytes: output.report.bytes.clone(),
            preview: include_preview.then(|| output.explanation.markdown.clone()),
        }
    }

    /// `Content-Disposition` value that makes browsers save the file.
    ///
    /// Non-ASCII names get an RFC 6266 `filename*` parameter next to an
    /// ASCII fallback.
    pub fn content_disposition(&self) -> String {
        let ascii: String = self
            .filename
            .chars()
            .map(|c| match c {
                '"' | '\\' => '_',
                c if c.is_ascii() && !c.is_ascii_control() => c,
                _ => '_',
            })
            .collect();
        if self.filename.is_ascii() {
            format!("attachment; filename=\"{ascii}\"")
        } else {
            format!(
                "attachment; filename=\"{ascii}\"; filename*=UTF-8''{}",
                percent_encode(&self.filename)
            )
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len() * 3);
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{ExplanationResult, ReportStats};

    fn report(name: &str) -> RenderedReport {
        RenderedReport {
            filename: name.to_string(),
            bytes: b"%PDF-1.5\n%%EOF\n".to_vec(),
            page_count: 1,
        }
    }

    #[test]
    fn filename_from_script_name() {
        assert_eq!(report_filename("sample.qvs"), "sample.pdf");
        assert_eq!(report_filename("dir/sub/load.script.qvs"), "load.script.pdf");
        assert_eq!(report_filename("noext"), "noext.pdf");
        assert_eq!(report_filename("a:b?.qvs"), "a_b_.pdf");
        assert_eq!(report_filename("   "), "report.pdf");
        assert_eq!(report_filename("dir/"), "report.pdf");
    }

    #[test]
    fn fixed_rule_ignores_input() {
        let rule = OutputName::Fixed(DEFAULT_REPORT_FILENAME.to_string());
        assert_eq!(resolve_filename(&rule, "sample.qvs"), "Dashboard Summary.pdf");
        assert_eq!(resolve_filename(&OutputName::FromInput, "sample.qvs"), "sample.pdf");
    }

    #[test]
    fn write_creates_parent_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out").join("sample.pdf");
        let written = write_report(&report("sample.pdf"), &target).unwrap();
        assert_eq!(written, target);
        assert_eq!(std::fs::read(&target).unwrap(), report("x").bytes);
        let entries: Vec<_> = std::fs::read_dir(dir.path().join("out"))
            .unwrap()
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn write_to_dir_uses_suggested_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_report_to_dir(&report("Dashboard Summary.pdf"), dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "Dashboard Summary.pdf");
        assert!(path.exists());
    }

    #[test]
    fn write_into_a_file_path_fails_as_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        let err = write_report(&report("r.pdf"), &blocker.join("r.pdf")).unwrap_err();
        assert!(matches!(err, Qvs2PdfError::OutputWriteFailed { .. }));
        assert_eq!(err.kind(), crate::error::ErrorKind::Storage);
    }

    #[test]
    fn download_from_output() {
        let output = ReportOutput {
            report: report("sample.pdf"),
            explanation: ExplanationResult::from_markdown("# Summary\n"),
            html: String::new(),
            stats: ReportStats::default(),
        };
        let with = Download::from_output(&output, true);
        assert_eq!(with.content_type, "application/pdf");
        assert_eq!(with.preview.as_deref(), Some("# Summary\n"));
        assert_eq!(with.content_disposition(), "attachment; filename=\"sample.pdf\"");
        assert!(Download::from_output(&output, false).preview.is_none());
    }

    #[test]
    fn non_ascii_disposition() {
        let d = Download {
            filename: "Résumé.pdf".into(),
            content_type: PDF_CONTENT_TYPE,
            bytes: vec![],
            preview: None,
        };
        assert_eq!(
            d.content_disposition(),
            "attachment; filename=\"R_sum_.pdf\"; filename*=UTF-8''R%C3%A9sum%C3%A9.pdf"
        );
    }
}
