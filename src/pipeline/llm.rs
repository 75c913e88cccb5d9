//! The explanation call: timeout, optional retry, cancellation.
//!
//! The provider itself is a single outbound request. This stage bounds it
//! with `api_timeout_secs`, re-issues it only when [`RetryPolicy`] allows and
//! the error is transient, and races every wait against a
//! [`CancellationToken`] so a disconnected caller stops the work.
//!
//! [`RetryPolicy`]: crate::config::RetryPolicy

use crate::config::ReportConfig;
use crate::error::Qvs2PdfError;
use crate::output::ExplanationResult;
use crate::prompts::PromptPayload;
use crate::provider::ExplanationProvider;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Obtain the markdown explanation for one prompt.
///
/// # Errors
/// * [`Qvs2PdfError::AuthError`]: rejected credential, never retried
/// * [`Qvs2PdfError::ServiceError`] / [`Qvs2PdfError::ApiTimeout`]: after
///   the retry budget is spent
/// * [`Qvs2PdfError::EmptyResponse`]: the reply had no text
/// * [`Qvs2PdfError::Cancelled`]: `cancel` fired first
pub async fn explain(
    provider: &dyn ExplanationProvider,
    payload: &PromptPayload,
    config: &ReportConfig,
    cancel: &CancellationToken,
) -> Result<ExplanationResult, Qvs2PdfError> {
    let start = Instant::now();
    let policy = config.retry;
    let call_timeout = Duration::from_secs(config.api_timeout_secs);

    info!(
        "Requesting explanation from {} ({} chars)",
        provider.name(),
        payload.char_count()
    );

    let mut attempt: u32 = 0;
    loop {
        if attempt > 0 {
            let delay = Duration::from_millis(policy.delay_ms(attempt));
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Qvs2PdfError::Cancelled),
                _ = sleep(delay) => {}
            }
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Qvs2PdfError::Cancelled),
            r = timeout(call_timeout, provider.generate(payload)) => match r {
                Ok(inner) => inner,
                Err(_) => Err(Qvs2PdfError::ApiTimeout {
                    provider: provider.name().to_string(),
                    secs: config.api_timeout_secs,
                }),
            },
        };

        match outcome {
            Ok(generation) => {
                if generation.text.trim().is_empty() {
                    return Err(Qvs2PdfError::EmptyResponse {
                        provider: provider.name().to_string(),
                    });
                }
                let duration_ms = start.elapsed().as_millis() as u64;
                debug!(
                    "Explanation received: {} chars in {}ms",
                    generation.text.len(),
                    duration_ms
                );
                return Ok(ExplanationResult {
                    markdown: generation.text,
                    provider: provider.name().to_string(),
                    model: provider.model().to_string(),
                    input_tokens: generation.input_tokens,
                    output_tokens: generation.output_tokens,
                    retries: attempt,
                    duration_ms,
                });
            }
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                let delay = Duration::from_millis(policy.delay_ms(attempt));
                warn!(
                    "Attempt {} failed ({}); retry {}/{} after {}ms",
                    attempt,
                    e,
                    attempt,
                    policy.max_retries,
                    delay.as_millis()
                );
                if let Some(ref cb) = config.progress_callback {
                    cb.on_retry(attempt, policy.max_retries, delay, &e.to_string());
                }
            }
            Err(e) => return Err(e),
        }
    }
}
