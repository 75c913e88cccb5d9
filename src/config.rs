//! Configuration types for script-to-report generation.
//!
//! Every knob lives in [`ReportConfig`], built via [`ReportConfigBuilder`].
//! The config is `Clone + Send + Sync`, so concurrent callers can each hold a
//! copy without sharing mutable state.

use crate::error::Qvs2PdfError;
use crate::progress::ProgressCallback;
use crate::provider::ExplanationProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Provider used when none is named.
pub const DEFAULT_PROVIDER: &str = "gemini";

/// Model used when none is named.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-lite";

/// Environment variable holding the provider API key.
pub const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Configuration for one pipeline run.
///
/// # Example
/// ```rust
/// use qvs2pdf::{PageSize, ReportConfig};
///
/// let config = ReportConfig::builder()
///     .model("gemini-2.0-flash")
///     .page_size(PageSize::Letter)
///     .max_retries(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.retry.max_retries, 2);
/// ```
#[derive(Clone)]
pub struct ReportConfig {
    /// LLM provider name understood by `edgequake_llm::ProviderFactory`. Default: `gemini`.
    pub provider_name: String,

    /// Model identifier. If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// Pre-constructed provider. Takes precedence over `provider_name` and
    /// skips the credential check.
    pub provider: Option<Arc<dyn ExplanationProvider>>,

    /// Environment variable checked for the API key before the provider is
    /// built. Default: `GEMINI_API_KEY`.
    ///
    /// `edgequake_llm` itself reads the provider's standard variable, so
    /// change this only together with `provider_name`.
    pub api_key_env: String,

    /// Sampling temperature. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 8192.
    ///
    /// A long load script with many sections easily produces several
    /// thousand tokens of explanation.
    pub max_tokens: usize,

    /// Retry behaviour for transient remote failures. Default: no retries.
    pub retry: RetryPolicy,

    /// Per-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Instruction override. If None, uses [`crate::prompts::DEFAULT_INSTRUCTION`].
    pub instruction: Option<String>,

    /// Page geometry and typography for the PDF.
    pub page: PageSetup,

    /// How the delivered PDF is named.
    pub output_name: OutputName,

    /// PDF document title. If None, derived from the script name.
    pub title: Option<String>,

    /// Optional stage-progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            provider_name: DEFAULT_PROVIDER.to_string(),
            model: None,
            provider: None,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            temperature: 0.2,
            max_tokens: 8192,
            retry: RetryPolicy::default(),
            api_timeout_secs: 60,
            instruction: None,
            page: PageSetup::default(),
            output_name: OutputName::default(),
            title: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ReportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportConfig")
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("provider", &self.provider.as_ref().map(|p| p.name().to_string()))
            .field("api_key_env", &self.api_key_env)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("retry", &self.retry)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("instruction", &self.instruction.as_ref().map(|s| s.len()))
            .field("page", &self.page)
            .field("output_name", &self.output_name)
            .field("title", &self.title)
            .finish()
    }
}

impl ReportConfig {
    /// Create a new builder for `ReportConfig`.
    pub fn builder() -> ReportConfigBuilder {
        ReportConfigBuilder {
            config: Self::default(),
        }
    }

    /// The model that will be requested.
    pub fn model_or_default(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    /// Fail with [`Qvs2PdfError::MissingCredential`] unless the API key
    /// variable is set and non-empty.
    ///
    /// A pre-built provider carries its own credentials and always passes.
    pub fn check_credentials(&self) -> Result<(), Qvs2PdfError> {
        if self.provider.is_some() {
            return Ok(());
        }
        match std::env::var(&self.api_key_env) {
            Ok(v) if !v.trim().is_empty() => Ok(()),
            _ => Err(Qvs2PdfError::MissingCredential {
                var: self.api_key_env.clone(),
            }),
        }
    }
}

/// Builder for [`ReportConfig`].
pub struct ReportConfigBuilder {
    config: ReportConfig,
}

impl fmt::Debug for ReportConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ReportConfigBuilder {
    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = name.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn ExplanationProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn api_key_env(mut self, var: impl Into<String>) -> Self {
        self.config.api_key_env = var.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n.max(1);
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.retry.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry.backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn instruction(mut self, text: impl Into<String>) -> Self {
        self.config.instruction = Some(text.into());
        self
    }

    pub fn page(mut self, page: PageSetup) -> Self {
        self.config.page = page;
        self
    }

    pub fn page_size(mut self, size: PageSize) -> Self {
        self.config.page.size = size;
        self
    }

    pub fn margin_pt(mut self, margin: f32) -> Self {
        self.config.page.margin_pt = margin;
        self
    }

    pub fn font_size(mut self, size: f32) -> Self {
        self.config.page.font_size = size;
        self
    }

    pub fn output_name(mut self, name: OutputName) -> Self {
        self.config.output_name = name;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.config.title = Some(title.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ReportConfig, Qvs2PdfError> {
        let c = &self.config;
        if c.api_timeout_secs == 0 {
            return Err(Qvs2PdfError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if c.api_key_env.trim().is_empty() {
            return Err(Qvs2PdfError::InvalidConfig(
                "API key environment variable name must not be empty".into(),
            ));
        }
        if c.provider_name.trim().is_empty() {
            return Err(Qvs2PdfError::InvalidConfig(
                "Provider name must not be empty".into(),
            ));
        }
        c.page.validate()?;
        if let OutputName::Fixed(ref name) = c.output_name {
            if name.trim().is_empty() || name.contains(['/', '\\']) {
                return Err(Qvs2PdfError::InvalidConfig(format!(
                    "Fixed output name must be a bare file name, got {name:?}"
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Policies & enums ─────────────────────────────────────────────────────

/// Retry behaviour for the remote call.
///
/// The default is fail-fast (`max_retries = 0`). When retries are enabled the
/// delay before attempt `n` is `backoff_ms * 2^(n-1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_ms: 500,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn fail_fast() -> Self {
        Self::default()
    }

    /// Delay before the given attempt (1-based retry number).
    pub fn delay_ms(&self, retry: u32) -> u64 {
        let exp = retry.saturating_sub(1).min(16);
        self.backoff_ms.saturating_mul(1u64 << exp)
    }
}

/// Physical page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageSize {
    /// 210 × 297 mm (default).
    #[default]
    A4,
    /// 8.5 × 11 in.
    Letter,
}

impl PageSize {
    /// Width and height in PDF points.
    pub fn dimensions_pt(self) -> (f32, f32) {
        match self {
            PageSize::A4 => (595.28, 841.89),
            PageSize::Letter => (612.0, 792.0),
        }
    }
}

/// Page geometry and base typography.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSetup {
    pub size: PageSize,
    /// Uniform margin on all four sides, in points. Default: 56 (≈ 20 mm).
    pub margin_pt: f32,
    /// Body text size in points. Default: 11.
    pub font_size: f32,
}

impl Default for PageSetup {
    fn default() -> Self {
        Self {
            size: PageSize::A4,
            margin_pt: 56.0,
            font_size: 11.0,
        }
    }
}

impl PageSetup {
    /// Width available for text, in points.
    pub fn content_width(&self) -> f32 {
        self.size.dimensions_pt().0 - 2.0 * self.margin_pt
    }

    fn validate(&self) -> Result<(), Qvs2PdfError> {
        if !(6.0..=24.0).contains(&self.font_size) {
            return Err(Qvs2PdfError::InvalidConfig(format!(
                "Font size must be 6–24 pt, got {}",
                self.font_size
            )));
        }
        if self.margin_pt < 0.0 || self.content_width() < 144.0 {
            return Err(Qvs2PdfError::InvalidConfig(format!(
                "Margin {} pt leaves less than 2 in of text width",
                self.margin_pt
            )));
        }
        Ok(())
    }
}

/// How the delivered PDF is named.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputName {
    /// Script base name with a `.pdf` suffix (default).
    #[default]
    FromInput,
    /// A fixed file name, e.g. [`crate::deliver::DEFAULT_REPORT_FILENAME`].
    Fixed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_fail_fast_gemini() {
        let c = ReportConfig::default();
        assert_eq!(c.provider_name, "gemini");
        assert_eq!(c.model_or_default(), DEFAULT_MODEL);
        assert_eq!(c.retry.max_retries, 0);
        assert_eq!(c.api_timeout_secs, 60);
        assert_eq!(c.page.size, PageSize::A4);
    }

    #[test]
    fn backoff_doubles() {
        let p = RetryPolicy {
            max_retries: 3,
            backoff_ms: 500,
        };
        assert_eq!(p.delay_ms(1), 500);
        assert_eq!(p.delay_ms(2), 1000);
        assert_eq!(p.delay_ms(3), 2000);
    }

    #[test]
    fn zero_timeout_rejected() {
        let err = ReportConfig::builder().api_timeout_secs(0).build().unwrap_err();
        assert!(matches!(err, Qvs2PdfError::InvalidConfig(_)));
    }

    #[test]
    fn oversized_margin_rejected() {
        let err = ReportConfig::builder().margin_pt(250.0).build().unwrap_err();
        assert!(err.to_string().contains("Margin"));
    }

    #[test]
    fn fixed_name_must_be_bare() {
        let err = ReportConfig::builder()
            .output_name(OutputName::Fixed("out/report.pdf".into()))
            .build()
            .unwrap_err();
        assert!(matches!(err, Qvs2PdfError::InvalidConfig(_)));

        let ok = ReportConfig::builder()
            .output_name(OutputName::Fixed("Dashboard Summary.pdf".into()))
            .build();
        assert!(ok.is_ok());
    }

    #[test]
    fn temperature_is_clamped() {
        let c = ReportConfig::builder().temperature(9.0).build().unwrap();
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn missing_credential_detected() {
        let c = ReportConfig::builder()
            .api_key_env("QVS2PDF_CONFIG_TEST_UNSET_KEY")
            .build()
            .unwrap();
        let err = c.check_credentials().unwrap_err();
        assert!(matches!(err, Qvs2PdfError::MissingCredential { .. }));
    }
}
