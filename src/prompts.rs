//! Instruction template and prompt composition.
//!
//! The instruction is a versioned asset under `templates/` and is embedded at
//! compile time. Callers can replace it at runtime through
//! [`crate::config::ReportConfig::instruction`] without touching the pipeline.

use crate::pipeline::input::ScriptDocument;
use serde::Serialize;

/// Default instruction sent ahead of every script.
pub const DEFAULT_INSTRUCTION: &str = include_str!("../templates/qlik_explainer.md");

/// Bumped whenever `templates/qlik_explainer.md` changes meaningfully.
pub const INSTRUCTION_TEMPLATE_VERSION: &str = "1";

/// The (instruction, script body) pair handed to the explanation provider.
///
/// Both halves are kept verbatim. Providers that take a system/user split use
/// the fields directly; single-string providers use [`PromptPayload::to_text`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptPayload {
    pub instruction: String,
    pub body: String,
}

impl PromptPayload {
    /// Instruction and body as one prompt, instruction first.
    pub fn to_text(&self) -> String {
        let mut text = String::with_capacity(self.instruction.len() + self.body.len() + 2);
        text.push_str(&self.instruction);
        text.push_str("\n\n");
        text.push_str(&self.body);
        text
    }

    /// Total characters sent, used for stats.
    pub fn char_count(&self) -> usize {
        self.instruction.chars().count() + self.body.chars().count()
    }
}

/// Pair the instruction (or the default) with the script body.
pub fn compose_prompt(document: &ScriptDocument, instruction: Option<&str>) -> PromptPayload {
    PromptPayload {
        instruction: instruction.unwrap_or(DEFAULT_INSTRUCTION).to_string(),
        body: document.body.clone(),
    }
}
