//! Single-consumer speech queue.
//!
//! One long-lived thread pops sentence chunks, synthesizes them, and plays
//! them through an external player process, one at a time. Interruption
//! bumps the shared epoch, kills live playback, and drains the queue;
//! whatever the worker pops afterwards fails the staleness check and is
//! dropped.

use crate::engine::SynthesisEngine;
use crate::error::{Result, WispError};
use crate::speech::control::SpeechControl;
use crate::speech::playback::PlaybackSink;
use crate::speech::text::clean_for_speech;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

/// How often the worker re-checks a playback process for exit.
const PLAYBACK_POLL: Duration = Duration::from_millis(10);

/// A sentence-sized unit of text tagged with the epoch it was produced in.
#[derive(Debug, Clone)]
pub struct SpeechChunk {
    pub epoch: u64,
    pub text: String,
}

/// Handle to the speech worker thread.
pub struct SpeechQueueWorker {
    tx: Sender<SpeechChunk>,
    rx: Receiver<SpeechChunk>,
    control: Arc<SpeechControl>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SpeechQueueWorker {
    /// Starts the worker thread.
    pub fn spawn(
        synthesis: Arc<dyn SynthesisEngine>,
        player: Arc<dyn PlaybackSink>,
        control: Arc<SpeechControl>,
        poll_interval: Duration,
    ) -> Result<Self> {
        let (tx, rx) = unbounded();
        let running = Arc::new(AtomicBool::new(true));

        let thread_rx = rx.clone();
        let thread_control = control.clone();
        let thread_running = running.clone();
        let handle = std::thread::Builder::new()
            .name("speech-worker".to_owned())
            .spawn(move || {
                worker_loop(
                    &thread_rx,
                    &*synthesis,
                    &*player,
                    &thread_control,
                    &thread_running,
                    poll_interval,
                );
            })
            .map_err(|e| WispError::Channel(format!("failed to spawn speech worker: {e}")))?;

        Ok(Self {
            tx,
            rx,
            control,
            running,
            handle: Some(handle),
        })
    }

    /// Queues a chunk for synthesis under the given epoch.
    pub fn enqueue(&self, epoch: u64, text: impl Into<String>) {
        let chunk = SpeechChunk {
            epoch,
            text: text.into(),
        };
        if self.tx.send(chunk).is_err() {
            debug!("speech queue closed, dropping chunk");
        }
    }

    /// Stops everything currently audible or pending: bumps the epoch,
    /// kills live playback, and drains the queue.
    pub fn interrupt(&self) {
        self.interrupt_handle().interrupt();
    }

    /// Detached handle for the interrupt path, usable from the key loop
    /// while another thread drives the turn.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle {
            control: self.control.clone(),
            rx: self.rx.clone(),
        }
    }

    /// Stops the worker thread. Pending and playing speech is interrupted.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.interrupt();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("speech worker thread panicked");
            }
        }
    }
}

impl Drop for SpeechQueueWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Clonable interrupt path shared with the interaction loop.
#[derive(Clone)]
pub struct InterruptHandle {
    control: Arc<SpeechControl>,
    rx: Receiver<SpeechChunk>,
}

impl InterruptHandle {
    /// Bumps the epoch, kills live playback, and drains queued chunks.
    pub fn interrupt(&self) {
        self.control.interrupt();
        let mut dropped = 0usize;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!(dropped, "drained stale speech chunks");
        }
    }
}

fn worker_loop(
    rx: &Receiver<SpeechChunk>,
    synthesis: &dyn SynthesisEngine,
    player: &dyn PlaybackSink,
    control: &SpeechControl,
    running: &AtomicBool,
    poll_interval: Duration,
) {
    while running.load(Ordering::SeqCst) {
        let chunk = match rx.recv_timeout(poll_interval) {
            Ok(chunk) => chunk,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        if control.is_stale(chunk.epoch) {
            debug!(epoch = chunk.epoch, "discarding stale chunk");
            continue;
        }
        if let Err(e) = speak(synthesis, player, control, &chunk) {
            warn!("speech chunk failed: {e}");
        }
    }
}

/// Synthesizes one chunk and plays it to completion (or until killed).
fn speak(
    synthesis: &dyn SynthesisEngine,
    player: &dyn PlaybackSink,
    control: &SpeechControl,
    chunk: &SpeechChunk,
) -> Result<()> {
    let text = clean_for_speech(&chunk.text);
    if text.is_empty() {
        return Ok(());
    }

    // The artifact lives until playback is done; drop unlinks it.
    let artifact = tempfile::Builder::new()
        .prefix("wisp-tts-")
        .suffix(".wav")
        .tempfile()
        .map_err(|e| WispError::Synthesis(format!("failed to create audio artifact: {e}")))?;

    synthesis.synthesize(&text, artifact.path())?;

    // Final staleness check and spawn happen under the control lock, so an
    // interrupt can never slip between the check and the spawn.
    let started = control.start_playback(chunk.epoch, || player.play(artifact.path()))?;
    if !started {
        debug!(epoch = chunk.epoch, "chunk went stale before playback");
        return Ok(());
    }

    while !control.playback_finished() {
        std::thread::sleep(PLAYBACK_POLL);
    }
    Ok(())
}
