//! The explanation capability: `generate(prompt) -> text`.
//!
//! The pipeline only talks to [`ExplanationProvider`], so the hosted model can
//! be replaced by a stub in tests or by another backend without touching the
//! rest of the pipeline. [`LlmExplanationProvider`] is the production
//! implementation over any `edgequake_llm` provider (Gemini by default).

use crate::config::ReportConfig;
use crate::error::Qvs2PdfError;
use crate::prompts::PromptPayload;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use tracing::debug;

/// Text returned by a provider plus optional token usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl Generation {
    /// Generation without usage figures.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// A remote (or stubbed) text-generation capability.
///
/// Implementations perform at most one outbound call per invocation and must
/// not retry internally; retry policy belongs to [`crate::pipeline::llm`].
#[async_trait]
pub trait ExplanationProvider: Send + Sync {
    /// Provider name used in logs and error messages.
    fn name(&self) -> &str;

    /// Model identifier, if the provider has one.
    fn model(&self) -> &str {
        ""
    }

    /// Send the prompt and return the generated markdown.
    async fn generate(&self, prompt: &PromptPayload) -> Result<Generation, Qvs2PdfError>;
}

/// [`ExplanationProvider`] backed by an `edgequake_llm` chat provider.
///
/// The instruction goes out as the system message and the script body as the
/// user message, so the model never confuses the two.
pub struct LlmExplanationProvider {
    inner: Arc<dyn LLMProvider>,
    provider_name: String,
    model: String,
    options: CompletionOptions,
}

impl LlmExplanationProvider {
    /// Wrap an already constructed chat provider.
    pub fn new(
        inner: Arc<dyn LLMProvider>,
        provider_name: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
        max_tokens: usize,
    ) -> Self {
        Self {
            inner,
            provider_name: provider_name.into(),
            model: model.into(),
            options: CompletionOptions {
                temperature: Some(temperature),
                max_tokens: Some(max_tokens),
                ..Default::default()
            },
        }
    }

    /// Construct the configured provider via [`ProviderFactory`].
    ///
    /// Checks the credential variable first so a missing key fails before any
    /// client is built or any request is sent.
    pub fn from_config(config: &ReportConfig) -> Result<Self, Qvs2PdfError> {
        config.check_credentials()?;
        let model = config.model_or_default();
        let inner = ProviderFactory::create_llm_provider(&config.provider_name, model).map_err(
            |e| Qvs2PdfError::ProviderNotConfigured {
                provider: config.provider_name.clone(),
                hint: format!("{e}"),
            },
        )?;
        Ok(Self::new(
            inner,
            config.provider_name.clone(),
            model,
            config.temperature,
            config.max_tokens,
        ))
    }
}

#[async_trait]
impl ExplanationProvider for LlmExplanationProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &PromptPayload) -> Result<Generation, Qvs2PdfError> {
        let messages = vec![
            ChatMessage::system(prompt.instruction.as_str()),
            ChatMessage::user(prompt.body.as_str()),
        ];

        let response = self
            .inner
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| classify_remote_error(&self.provider_name, &e.to_string()))?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            self.provider_name, response.prompt_tokens, response.completion_tokens
        );

        Ok(Generation {
            text: response.content,
            input_tokens: response.prompt_tokens as usize,
            output_tokens: response.completion_tokens as usize,
        })
    }
}

/// Resolve the provider for a run: the pre-built one if configured, else the
/// factory-built one.
pub fn resolve_provider(config: &ReportConfig) -> Result<Arc<dyn ExplanationProvider>, Qvs2PdfError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }
    Ok(Arc::new(LlmExplanationProvider::from_config(config)?))
}

/// Map a remote error message onto the error taxonomy.
///
/// Provider SDKs surface HTTP status and vendor codes inside their messages;
/// credential problems become [`Qvs2PdfError::AuthError`], everything else
/// [`Qvs2PdfError::ServiceError`].
pub fn classify_remote_error(provider: &str, message: &str) -> Qvs2PdfError {
    let lower = message.to_ascii_lowercase();
    let auth_markers = [
        "401",
        "403",
        "unauthorized",
        "unauthenticated",
        "permission_denied",
        "permission denied",
        "api key not valid",
        "invalid api key",
        "api_key_invalid",
        "authentication",
    ];
    if auth_markers.iter().any(|m| lower.contains(m)) {
        Qvs2PdfError::AuthError {
            provider: provider.to_string(),
            detail: message.to_string(),
        }
    } else {
        Qvs2PdfError::ServiceError {
            provider: provider.to_string(),
            detail: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_key_classified_as_auth() {
        let e = classify_remote_error(
            "gemini",
            "API error: 400 API key not valid. Please pass a valid API key.",
        );
        assert!(matches!(e, Qvs2PdfError::AuthError { .. }));
    }

    #[test]
    fn forbidden_classified_as_auth() {
        let e = classify_remote_error("gemini", "HTTP 403 Forbidden");
        assert!(matches!(e, Qvs2PdfError::AuthError { .. }));
    }

    #[test]
    fn quota_classified_as_service() {
        let e = classify_remote_error("gemini", "429 RESOURCE_EXHAUSTED: quota exceeded");
        assert!(matches!(e, Qvs2PdfError::ServiceError { .. }));
        assert!(e.is_retryable());
    }

    #[test]
    fn prebuilt_provider_wins() {
        struct Fixed;

        #[async_trait]
        impl ExplanationProvider for Fixed {
            fn name(&self) -> &str {
                "fixed"
            }

            async fn generate(&self, _prompt: &PromptPayload) -> Result<Generation, Qvs2PdfError> {
                Ok(Generation::text("# ok"))
            }
        }

        let config = ReportConfig::builder()
            .provider(Arc::new(Fixed))
            .api_key_env("QVS2PDF_PROVIDER_TEST_UNSET_KEY")
            .build()
            .unwrap();
        let provider = resolve_provider(&config).unwrap();
        assert_eq!(provider.name(), "fixed");
    }

    #[test]
    fn missing_key_fails_before_factory() {
        let config = ReportConfig::builder()
            .api_key_env("QVS2PDF_PROVIDER_TEST_UNSET_KEY")
            .build()
            .unwrap();
        let err = resolve_provider(&config).err().unwrap();
        assert!(matches!(err, Qvs2PdfError::MissingCredential { .. }));
    }
}
