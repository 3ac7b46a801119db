//! Incremental speech output: chunking, cleanup, playback control, and the
//! queue worker.

pub mod chunk;
pub mod control;
pub mod playback;
pub mod text;
pub mod worker;
