//! Progress-callback trait for pipeline stage events.
//!
//! Inject an [`Arc<dyn ReportProgressCallback>`] via
//! [`crate::config::ReportConfigBuilder::progress_callback`] to drive a
//! spinner, a status line in a web page, or a log record while a report is
//! being produced.
//!
//! # Example
//!
//! ```rust
//! use qvs2pdf::{PipelineStage, ReportConfig, ReportProgressCallback};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl ReportProgressCallback for Printer {
//!     fn on_stage_start(&self, stage: PipelineStage) {
//!         eprintln!("{}…", stage.label());
//!     }
//! }
//!
//! let config = ReportConfig::builder()
//!     .progress_callback(Arc::new(Printer) as Arc<dyn ReportProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// The five pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Acquire,
    Compose,
    Explain,
    Render,
    Deliver,
}

impl PipelineStage {
    /// Short human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            PipelineStage::Acquire => "Reading script",
            PipelineStage::Compose => "Composing prompt",
            PipelineStage::Explain => "Waiting for explanation",
            PipelineStage::Render => "Rendering PDF",
            PipelineStage::Deliver => "Saving report",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Called by the pipeline as it moves through its stages.
///
/// All methods have no-op defaults so callers only override what they need.
pub trait ReportProgressCallback: Send + Sync {
    /// A stage is about to run.
    fn on_stage_start(&self, stage: PipelineStage) {
        let _ = stage;
    }

    /// A stage finished successfully.
    fn on_stage_complete(&self, stage: PipelineStage, elapsed: Duration) {
        let _ = (stage, elapsed);
    }

    /// The remote call failed transiently and will be re-issued after `delay`.
    ///
    /// # Arguments
    /// * `retry`: 1-based retry number
    /// * `max_retries`: configured ceiling
    /// * `error`: the failure that triggered the retry
    fn on_retry(&self, retry: u32, max_retries: u32, delay: Duration, error: &str) {
        let _ = (retry, max_retries, delay, error);
    }

    /// A stage failed; the pipeline stops after this call.
    fn on_failure(&self, stage: PipelineStage, error: &str) {
        let _ = (stage, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ReportProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ReportConfig`].
pub type ProgressCallback = Arc<dyn ReportProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ReportProgressCallback for Recorder {
        fn on_stage_start(&self, stage: PipelineStage) {
            self.events.lock().unwrap().push(format!("start:{stage:?}"));
        }

        fn on_stage_complete(&self, stage: PipelineStage, _elapsed: Duration) {
            self.events.lock().unwrap().push(format!("done:{stage:?}"));
        }

        fn on_retry(&self, retry: u32, max_retries: u32, _delay: Duration, _error: &str) {
            self.events
                .lock()
                .unwrap()
                .push(format!("retry:{retry}/{max_retries}"));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage_start(PipelineStage::Acquire);
        cb.on_stage_complete(PipelineStage::Acquire, Duration::from_millis(3));
        cb.on_retry(1, 2, Duration::from_millis(500), "503");
        cb.on_failure(PipelineStage::Explain, "boom");
    }

    #[test]
    fn recorder_sees_events_in_order() {
        let rec = Recorder::default();
        rec.on_stage_start(PipelineStage::Explain);
        rec.on_retry(1, 3, Duration::ZERO, "timeout");
        rec.on_stage_complete(PipelineStage::Explain, Duration::ZERO);
        let events = rec.events.lock().unwrap().clone();
        assert_eq!(events, vec!["start:Explain", "retry:1/3", "done:Explain"]);
    }

    #[test]
    fn labels_display() {
        assert_eq!(PipelineStage::Render.to_string(), "Rendering PDF");
    }
}
