//! Error types for the qvs2pdf library.
//!
//! Every failure is fatal for the invocation: the pipeline either produces a
//! complete PDF or returns one [`Qvs2PdfError`]. There is no partial-success
//! mode and nothing is retried unless [`crate::config::RetryPolicy`] says so.
//!
//! [`Qvs2PdfError::kind`] groups the variants into the coarse taxonomy callers
//! usually branch on (configuration, I/O, remote service, rendering, storage).

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the qvs2pdf library.
#[derive(Debug, Error)]
pub enum Qvs2PdfError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Script file was not found at the given path.
    #[error("Script file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists but reading it failed.
    #[error("Failed to read script '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Bytes could not be decoded with the declared text encoding.
    #[error("Cannot decode '{name}' as {encoding}: {detail}")]
    Decode {
        name: String,
        encoding: String,
        detail: String,
    },

    // ── Configuration errors ──────────────────────────────────────────────
    /// The API key environment variable is unset or empty.
    #[error("Missing API credential: environment variable {var} is not set.\nExport it or add it to a .env file.")]
    MissingCredential { var: String },

    /// The configured provider could not be constructed.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Remote service errors ─────────────────────────────────────────────
    /// The provider rejected the credential (401/403, invalid key).
    #[error("Authentication error from provider '{provider}': {detail}")]
    AuthError { provider: String, detail: String },

    /// Remote failure: quota, 5xx, malformed response, network.
    #[error("LLM service error from provider '{provider}': {detail}")]
    ServiceError { provider: String, detail: String },

    /// The call did not finish within the configured timeout.
    #[error("LLM call to '{provider}' timed out after {secs}s")]
    ApiTimeout { provider: String, secs: u64 },

    /// The provider answered, but with no usable text.
    #[error("Provider '{provider}' returned an empty explanation")]
    EmptyResponse { provider: String },

    /// The caller cancelled the request.
    #[error("Request cancelled before the explanation was received")]
    Cancelled,

    // ── Rendering errors ──────────────────────────────────────────────────
    /// Non-blank markdown produced nothing that can be laid out.
    #[error("Markdown produced no renderable content: {0}")]
    MarkdownParse(String),

    /// PDF assembly or serialisation failed.
    #[error("PDF rendering failed: {0}")]
    RenderFailed(String),

    // ── Storage errors ────────────────────────────────────────────────────
    /// Could not create or write the output PDF.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse error category for a [`Qvs2PdfError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Io,
    Authentication,
    Service,
    EmptyResponse,
    MarkdownParse,
    Render,
    Storage,
    Cancelled,
    Internal,
}

impl Qvs2PdfError {
    /// The taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FileNotFound { .. }
            | Self::PermissionDenied { .. }
            | Self::ReadFailed { .. }
            | Self::Decode { .. } => ErrorKind::Io,
            Self::MissingCredential { .. }
            | Self::ProviderNotConfigured { .. }
            | Self::InvalidConfig(_) => ErrorKind::Configuration,
            Self::AuthError { .. } => ErrorKind::Authentication,
            Self::ServiceError { .. } | Self::ApiTimeout { .. } => ErrorKind::Service,
            Self::EmptyResponse { .. } => ErrorKind::EmptyResponse,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::MarkdownParse(_) => ErrorKind::MarkdownParse,
            Self::RenderFailed(_) => ErrorKind::Render,
            Self::OutputWriteFailed { .. } => ErrorKind::Storage,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether a retry policy may re-issue the call that produced this error.
    ///
    /// Only transient remote failures qualify; a bad key or an empty answer
    /// will not improve on a second attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ServiceError { .. } | Self::ApiTimeout { .. })
    }
}
