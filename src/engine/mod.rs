//! Trait seams for the three slow collaborators: text generation, speech
//! recognition, and speech synthesis.
//!
//! The orchestration layer never sees model internals. Generation is a lazy
//! token iterator over an engine that also owns the conversational context;
//! recognition and synthesis are one-shot calls.

pub mod command;
pub mod openai;
pub mod sse;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Message role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One conversation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Options for one generation call.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    /// New messages appended to the engine's context for this turn.
    pub messages: Vec<ChatMessage>,
    /// Per-call token cap (None = engine default).
    pub max_tokens: Option<usize>,
    /// Per-call temperature override.
    pub temperature: Option<f32>,
}

impl GenerationRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Lazy token stream for one turn.
pub type TokenStream<'a> = Box<dyn Iterator<Item = Result<String>> + 'a>;

/// A text generation engine that owns its conversational context.
///
/// Single-consumer: one generation at a time, driven by the turn thread.
pub trait GenerationEngine: Send {
    /// Appends the request messages to the context and starts streaming the
    /// reply. The stream must be fully consumed or dropped before the next
    /// call.
    fn generate(&mut self, request: GenerationRequest) -> Result<TokenStream<'_>>;

    /// Sentinel token some engines emit when recovering from an internal
    /// hiccup; callers skip exact matches.
    fn recovery_token(&self) -> Option<&str> {
        None
    }

    /// Records the assistant reply for the turn just streamed (including a
    /// partial reply after an interrupt) so the context stays coherent.
    fn record_reply(&mut self, text: &str);

    /// Drops all conversational context.
    fn clear_context(&mut self) -> Result<()>;

    /// Estimated tokens currently held in context.
    fn context_usage(&self) -> usize;

    /// Tokens the context can hold.
    fn context_capacity(&self) -> usize;

    /// Serializes the context for persistence.
    fn save_context(&self) -> Result<Vec<u8>>;

    /// Restores a previously serialized context. Rejecting a corrupt blob
    /// is the expected failure mode; callers rebuild from scratch.
    fn load_context(&mut self, blob: &[u8]) -> Result<()>;
}

/// Speech-to-text over a finished take.
pub trait RecognitionEngine: Send {
    fn transcribe(&self, samples: &[f32], language: &str, timeout: Duration) -> Result<String>;
}

/// Text-to-speech into an audio artifact at `out`.
pub trait SynthesisEngine: Send + Sync {
    fn synthesize(&self, text: &str, out: &Path) -> Result<()>;
}
