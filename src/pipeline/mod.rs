//! Pipeline stages for script-to-report generation.
//!
//! Each submodule implements one transformation step and can be tested on
//! its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ llm ──▶ postprocess ──▶ html ──▶ layout ──▶ pdf
//! (.qvs)   (model)   (cleanup)    (pulldown) (scraper)  (lopdf)
//! ```
//!
//! 1. [`input`]: read a script file or decode an upload
//! 2. [`llm`]: the model call with timeout, optional retry and cancellation;
//!    the only stage with network I/O
//! 3. [`postprocess`]: deterministic cleanup of model markdown
//! 4. [`html`]: markdown to an HTML fragment
//! 5. [`layout`]: HTML to a flow of typed blocks
//! 6. [`pdf`]: word wrap, pagination and serialisation, using the metrics
//!    in [`fonts`]
//!
//! [`render`] chains 4 to 6 on a blocking thread.

pub mod fonts;
pub mod html;
pub mod input;
pub mod layout;
pub mod llm;
pub mod pdf;
pub mod postprocess;
pub mod render;
