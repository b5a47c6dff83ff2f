//! Transformation flow state and the prompt derived from a user's instruction.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use teloxide::dispatching::dialogue::{Dialogue, InMemStorage};

pub const MAX_INSTRUCTION_LENGTH: usize = 1000;

/// Where a user stands in the upload-then-instruct workflow
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransformState {
    #[default]
    Idle,
    /// An upload is stored and the bot waits for a text instruction
    AwaitingInstruction { upload: PathBuf },
    /// A generation for this upload is in flight
    Processing { upload: PathBuf },
}

/// Per-chat handle on the transformation state
pub type TransformDialogue = Dialogue<TransformState, InMemStorage<TransformState>>;

impl TransformState {
    /// The upload waiting for (or undergoing) a transformation
    pub fn pending_upload(&self) -> Option<&Path> {
        match self {
            TransformState::Idle => None,
            TransformState::AwaitingInstruction { upload }
            | TransformState::Processing { upload } => Some(upload),
        }
    }

    pub fn is_awaiting_instruction(&self) -> bool {
        matches!(self, TransformState::AwaitingInstruction { .. })
    }

    pub fn is_processing(&self) -> bool {
        matches!(self, TransformState::Processing { .. })
    }
}

/// Validates a transformation instruction
pub fn validate_instruction(instruction: &str) -> Result<String, &'static str> {
    let trimmed = instruction.trim();

    if trimmed.is_empty() {
        return Err("empty");
    }

    if trimmed.chars().count() > MAX_INSTRUCTION_LENGTH {
        return Err("too_long");
    }

    Ok(trimmed.to_string())
}

/// Build the generation prompt for a transformation instruction.
///
/// Only the instruction reaches the generation API; the uploaded pixels are
/// not sent.
pub fn derive_prompt(instruction: &str) -> String {
    let instruction = instruction.trim().trim_end_matches(['.', '!']);
    format!("An image that {instruction}, preserving the essence of the original")
}
