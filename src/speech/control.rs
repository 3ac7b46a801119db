//! The cancellation primitive shared between the interaction loop, the turn
//! runner, and the speech worker.
//!
//! One mutex guards three fields: the generation epoch, the interrupted
//! flag, and the live playback handle. Critical sections only ever mutate
//! those fields; waiting on playback always happens outside the lock.

use crate::error::Result;
use crate::speech::playback::PlaybackHandle;
use std::sync::Mutex;
use tracing::debug;

struct ControlState {
    epoch: u64,
    interrupted: bool,
    playback: Option<Box<dyn PlaybackHandle>>,
}

/// Epoch counter + interrupted flag + current playback handle.
pub struct SpeechControl {
    state: Mutex<ControlState>,
}

impl Default for SpeechControl {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechControl {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ControlState {
                epoch: 0,
                interrupted: false,
                playback: None,
            }),
        }
    }

    /// The current epoch. Chunks are tagged with this at creation.
    pub fn current(&self) -> u64 {
        self.lock().epoch
    }

    /// Bumps the epoch, sets the interrupted flag, and kills any live
    /// playback. Safe to call at any time, including repeatedly; every call
    /// just advances the epoch once more.
    ///
    /// The killed process stays registered until the worker reaps it.
    pub fn interrupt(&self) -> u64 {
        let mut state = self.lock();
        state.epoch += 1;
        state.interrupted = true;
        if let Some(handle) = state.playback.as_mut() {
            if let Err(e) = handle.kill() {
                debug!("kill on playback raced its exit: {e}");
            }
        }
        state.epoch
    }

    /// Clears the interrupted flag. Called at the start of a new turn, once
    /// the stale work the flag was protecting against has been discarded.
    pub fn clear_interrupted(&self) {
        self.lock().interrupted = false;
    }

    /// A chunk is stale when its epoch is no longer current or an interrupt
    /// has not yet been acknowledged by a new turn.
    pub fn is_stale(&self, epoch: u64) -> bool {
        let state = self.lock();
        epoch != state.epoch || state.interrupted
    }

    /// Spawns playback through `start` and registers the handle, unless
    /// `epoch` went stale since the chunk was dequeued. Returns false when
    /// the chunk was dropped instead of played.
    ///
    /// Only the single worker thread calls this, and only after the previous
    /// handle was reaped, so the slot is free by construction.
    pub(crate) fn start_playback<F>(&self, epoch: u64, start: F) -> Result<bool>
    where
        F: FnOnce() -> Result<Box<dyn PlaybackHandle>>,
    {
        let mut state = self.lock();
        if epoch != state.epoch || state.interrupted {
            return Ok(false);
        }
        debug_assert!(state.playback.is_none(), "playback slot already occupied");
        state.playback = Some(start()?);
        Ok(true)
    }

    /// Non-blocking poll of the registered playback. Clears the slot and
    /// returns true once the process is gone (exited, killed, or errored).
    pub(crate) fn playback_finished(&self) -> bool {
        let mut state = self.lock();
        let Some(handle) = state.playback.as_mut() else {
            return true;
        };
        match handle.try_wait() {
            Ok(false) => false,
            Ok(true) => {
                state.playback = None;
                true
            }
            Err(e) => {
                debug!("playback poll failed, treating as exited: {e}");
                state.playback = None;
                true
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ControlState> {
        // A poisoned lock means a panic while holding it; the state is two
        // scalars and an Option, all valid after any partial mutation.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeHandle {
        finished: Arc<AtomicBool>,
        killed: Arc<AtomicBool>,
    }

    impl PlaybackHandle for FakeHandle {
        fn try_wait(&mut self) -> std::io::Result<bool> {
            Ok(self.finished.load(Ordering::SeqCst))
        }

        fn kill(&mut self) -> std::io::Result<()> {
            self.killed.store(true, Ordering::SeqCst);
            self.finished.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn fake_handle() -> (Arc<AtomicBool>, Arc<AtomicBool>, Box<dyn PlaybackHandle>) {
        let finished = Arc::new(AtomicBool::new(false));
        let killed = Arc::new(AtomicBool::new(false));
        let handle = Box::new(FakeHandle {
            finished: finished.clone(),
            killed: killed.clone(),
        });
        (finished, killed, handle)
    }

    #[test]
    fn interrupt_bumps_epoch_and_sets_flag() {
        let control = SpeechControl::new();
        assert_eq!(control.current(), 0);
        assert!(!control.is_stale(0));

        assert_eq!(control.interrupt(), 1);
        assert_eq!(control.current(), 1);
        // Old epoch is stale; the new one too until the flag is cleared.
        assert!(control.is_stale(0));
        assert!(control.is_stale(1));

        control.clear_interrupted();
        assert!(!control.is_stale(1));
        assert!(control.is_stale(0));
    }

    #[test]
    fn interrupt_is_idempotent_and_repeatable() {
        let control = SpeechControl::new();
        assert_eq!(control.interrupt(), 1);
        assert_eq!(control.interrupt(), 2);
        control.clear_interrupted();
        assert_eq!(control.interrupt(), 3);
    }

    #[test]
    fn interrupt_kills_live_playback() {
        let control = SpeechControl::new();
        let (_, killed, handle) = fake_handle();
        let started = control
            .start_playback(0, move || Ok(handle))
            .unwrap_or(false);
        assert!(started);

        control.interrupt();
        assert!(killed.load(Ordering::SeqCst));
        // Worker reaps the killed handle on its next poll.
        assert!(control.playback_finished());
        assert!(control.playback_finished());
    }

    #[test]
    fn stale_epoch_refuses_playback() {
        let control = SpeechControl::new();
        control.interrupt();
        control.clear_interrupted();

        let (_, _, handle) = fake_handle();
        let started = control.start_playback(0, move || Ok(handle)).unwrap_or(true);
        assert!(!started, "epoch 0 is stale after interrupt");

        let (_, _, handle) = fake_handle();
        let started = control.start_playback(1, move || Ok(handle)).unwrap_or(false);
        assert!(started);
    }

    #[test]
    fn playback_finishes_when_handle_exits() {
        let control = SpeechControl::new();
        let (finished, _, handle) = fake_handle();
        assert!(control.start_playback(0, move || Ok(handle)).unwrap_or(false));

        assert!(!control.playback_finished());
        finished.store(true, Ordering::SeqCst);
        assert!(control.playback_finished());
    }

    #[test]
    fn no_playback_counts_as_finished() {
        let control = SpeechControl::new();
        assert!(control.playback_finished());
    }
}
