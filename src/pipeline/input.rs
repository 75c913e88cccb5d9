//! Input acquisition: turn a local path or an uploaded byte stream into a
//! [`ScriptDocument`].
//!
//! Script content is opaque. Nothing here checks QlikSense syntax; any text
//! that decodes cleanly is accepted, including an empty file.

use crate::error::Qvs2PdfError;
use encoding_rs::Encoding;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Raw script text plus the name it was acquired under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptDocument {
    pub name: String,
    pub body: String,
}

impl ScriptDocument {
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
        }
    }
}

/// Where the script comes from.
#[derive(Debug, Clone)]
pub enum ScriptSource {
    /// A file on the local filesystem, read as UTF-8.
    Path(PathBuf),
    /// Bytes received from an interactive upload.
    Upload {
        name: String,
        bytes: Vec<u8>,
        /// WHATWG encoding label, e.g. `utf-8`, `utf-16le`, `windows-1252`.
        encoding: String,
    },
}

impl ScriptSource {
    /// Upload declared as UTF-8.
    pub fn upload(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        ScriptSource::Upload {
            name: name.into(),
            bytes: bytes.into(),
            encoding: "utf-8".to_string(),
        }
    }

    /// Display name used in logs.
    pub fn display_name(&self) -> String {
        match self {
            ScriptSource::Path(p) => p.display().to_string(),
            ScriptSource::Upload { name, .. } => name.clone(),
        }
    }
}

impl From<PathBuf> for ScriptSource {
    fn from(p: PathBuf) -> Self {
        ScriptSource::Path(p)
    }
}

impl From<&Path> for ScriptSource {
    fn from(p: &Path) -> Self {
        ScriptSource::Path(p.to_path_buf())
    }
}

impl From<&str> for ScriptSource {
    fn from(p: &str) -> Self {
        ScriptSource::Path(PathBuf::from(p))
    }
}

/// Resolve any [`ScriptSource`] to a document.
pub async fn acquire(source: ScriptSource) -> Result<ScriptDocument, Qvs2PdfError> {
    match source {
        ScriptSource::Path(path) => read_script(&path).await,
        ScriptSource::Upload {
            name,
            bytes,
            encoding,
        } => from_upload(name, &bytes, &encoding),
    }
}

/// Read a local script file as UTF-8.
pub async fn read_script(path: &Path) -> Result<ScriptDocument, Qvs2PdfError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Qvs2PdfError::FileNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => Qvs2PdfError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => Qvs2PdfError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        },
    })?;

    if !has_qvs_extension(path) {
        debug!("{} has no .qvs extension; reading it anyway", path.display());
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let body = decode(&name, &bytes, encoding_rs::UTF_8)?;
    debug!("Read script {} ({} bytes)", path.display(), bytes.len());
    Ok(ScriptDocument { name, body })
}

/// Decode an uploaded byte stream with a declared encoding label.
pub fn from_upload(
    name: impl Into<String>,
    bytes: &[u8],
    encoding_label: &str,
) -> Result<ScriptDocument, Qvs2PdfError> {
    let name = name.into();
    let encoding =
        Encoding::for_label(encoding_label.trim().as_bytes()).ok_or_else(|| Qvs2PdfError::Decode {
            name: name.clone(),
            encoding: encoding_label.to_string(),
            detail: "unknown encoding label".to_string(),
        })?;
    let body = decode(&name, bytes, encoding)?;
    debug!(
        "Decoded upload {} ({} bytes, {})",
        name,
        bytes.len(),
        encoding.name()
    );
    Ok(ScriptDocument { name, body })
}

/// Strict decode: malformed sequences are an error, never replaced.
///
/// A byte-order mark matching `encoding` is removed.
fn decode(name: &str, bytes: &[u8], encoding: &'static Encoding) -> Result<String, Qvs2PdfError> {
    encoding
        .decode_without_bom_handling_and_without_replacement(strip_bom(bytes, encoding))
        .map(|text| text.into_owned())
        .ok_or_else(|| Qvs2PdfError::Decode {
            name: name.to_string(),
            encoding: encoding.name().to_string(),
            detail: "malformed byte sequence".to_string(),
        })
}

fn strip_bom<'a>(bytes: &'a [u8], encoding: &'static Encoding) -> &'a [u8] {
    match Encoding::for_bom(bytes) {
        Some((bom_enc, len)) if bom_enc == encoding => &bytes[len..],
        _ => bytes,
    }
}

fn has_qvs_extension(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("qvs"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn reads_local_script() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.qvs");
        std::fs::write(&path, "LOAD * FROM table.qvd;").unwrap();

        let doc = read_script(&path).await.unwrap();
        assert_eq!(doc.name, "sample.qvs");
        assert_eq!(doc.body, "LOAD * FROM table.qvd;");
    }

    #[tokio::test]
    async fn utf8_bom_is_removed() {
        let mut f = tempfile::Builder::new().suffix(".qvs").tempfile().unwrap();
        f.write_all(b"\xEF\xBB\xBFSET x = 1;").unwrap();
        let doc = read_script(f.path()).await.unwrap();
        assert_eq!(doc.body, "SET x = 1;");
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let err = read_script(Path::new("/definitely/not/here.qvs"))
            .await
            .unwrap_err();
        assert!(matches!(err, Qvs2PdfError::FileNotFound { .. }));
        assert_eq!(err.kind(), crate::error::ErrorKind::Io);
    }

    #[tokio::test]
    async fn invalid_utf8_is_rejected() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&[b'L', 0xFF, 0xFE, 0xFD]).unwrap();
        let err = read_script(f.path()).await.unwrap_err();
        assert!(matches!(err, Qvs2PdfError::Decode { .. }));
    }

    #[tokio::test]
    async fn empty_file_is_accepted() {
        let f = tempfile::NamedTempFile::new().unwrap();
        let doc = read_script(f.path()).await.unwrap();
        assert!(doc.body.is_empty());
    }

    #[test]
    fn upload_with_declared_utf16() {
        let bytes: Vec<u8> = "LOAD 1;"
            .encode_utf16()
            .flat_map(|u| u.to_le_bytes())
            .collect();
        let doc = from_upload("upload.qvs", &bytes, "utf-16le").unwrap();
        assert_eq!(doc.body, "LOAD 1;");
    }

    #[test]
    fn upload_with_latin1_label() {
        let doc = from_upload("legacy.qvs", &[b'c', b'a', b'f', 0xE9], "windows-1252").unwrap();
        assert_eq!(doc.body, "caf\u{e9}");
    }

    #[test]
    fn upload_with_unknown_label() {
        let err = from_upload("x.qvs", b"LOAD 1;", "klingon").unwrap_err();
        assert!(err.to_string().contains("klingon"));
    }

    #[tokio::test]
    async fn acquire_dispatches_upload() {
        let doc = acquire(ScriptSource::upload("up.qvs", b"SET a = 1;".to_vec()))
            .await
            .unwrap();
        assert_eq!(doc, ScriptDocument::new("up.qvs", "SET a = 1;"));
    }
}
