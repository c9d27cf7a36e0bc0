//! The core models for managing a stateful chat with an LLM.
use crate::gemini::Content;

/// Conversation state forwarded to the model on every turn: the
/// system instruction plus the ordered user/model turns so far.
#[derive(Clone, Debug, Default)]
pub struct Transcript {
    system_instruction: String,
    contents: Vec<Content>,
}

impl Transcript {
    pub fn new(system_instruction: &str) -> Self {
        Self {
            system_instruction: system_instruction.to_string(),
            contents: Vec::new(),
        }
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    pub fn messages(&self) -> Vec<Content> {
        self.contents.clone()
    }

    pub fn push(&mut self, msg: Content) {
        self.contents.push(msg)
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }
}
