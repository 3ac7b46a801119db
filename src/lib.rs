//! Wisp: push-to-talk voice conversations with a streaming language model.
//!
//! This crate turns a token stream into speech with low time-to-first-word:
//! Microphone → STT → LLM → sentence chunker → TTS → Speaker
//!
//! # Architecture
//!
//! Three threads cooperate per session:
//! - **Key loop**: owns the terminal and the recorder, reads push-to-talk
//!   keys, and spawns one turn thread at a time
//! - **Turn thread**: transcribes the take, streams generation, filters
//!   tool-call directives out of the visible text, and enqueues sentence
//!   chunks for speech as they complete
//! - **Speech worker**: synthesizes queued chunks and plays them back,
//!   discarding anything stale by the time it reaches the front
//!
//! Interruption is race-free by construction: every queued chunk carries the
//! epoch of the turn that produced it, and pressing the talk key bumps the
//! epoch so in-flight work is discarded instead of raced.

pub mod audio;
pub mod config;
pub mod context;
pub mod directive;
pub mod engine;
pub mod error;
pub mod interaction;
pub mod pipeline;
pub mod prompt;
pub mod speech;
pub mod tools;

pub use config::WispConfig;
pub use error::{Result, WispError};
pub use pipeline::TurnRunner;
pub use speech::control::SpeechControl;
pub use speech::worker::SpeechQueueWorker;
pub use tools::ToolRegistry;
