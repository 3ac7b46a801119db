//! Microphone capture for push-to-talk recording.

pub mod recorder;

pub use recorder::Recorder;
