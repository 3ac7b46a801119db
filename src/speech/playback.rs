//! Audio playback via an external player process.

use crate::config::PlaybackConfig;
use crate::error::{Result, WispError};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use tracing::debug;

/// A live playback process.
///
/// Handles are owned by the speech worker; the interrupt path only ever
/// calls `kill` through the shared control lock.
pub trait PlaybackHandle: Send {
    /// Non-blocking exit check. Returns true once the process has exited
    /// and been reaped.
    fn try_wait(&mut self) -> std::io::Result<bool>;

    /// Kills the process. Failures on an already-dead process are expected.
    fn kill(&mut self) -> std::io::Result<()>;
}

/// Starts playback of a synthesized audio artifact.
pub trait PlaybackSink: Send + Sync {
    fn play(&self, artifact: &Path) -> Result<Box<dyn PlaybackHandle>>;
}

/// Playback through an external player command (`aplay -q` by default).
pub struct ProcessPlayer {
    argv: Vec<String>,
}

impl ProcessPlayer {
    /// Resolves the configured player binary up front so a missing player
    /// surfaces at startup instead of mid-conversation.
    pub fn new(config: &PlaybackConfig) -> Result<Self> {
        let mut argv = config.command.clone();
        let program = argv
            .first()
            .ok_or_else(|| WispError::Config("playback command is empty".to_owned()))?;
        let resolved = which::which(program)
            .map_err(|e| WispError::Playback(format!("player '{program}' not found: {e}")))?;
        argv[0] = resolved.to_string_lossy().into_owned();
        Ok(Self { argv })
    }
}

impl PlaybackSink for ProcessPlayer {
    fn play(&self, artifact: &Path) -> Result<Box<dyn PlaybackHandle>> {
        let child = Command::new(&self.argv[0])
            .args(&self.argv[1..])
            .arg(artifact)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| WispError::Playback(format!("failed to start player: {e}")))?;
        debug!(pid = child.id(), path = %artifact.display(), "playback started");
        Ok(Box::new(ProcessHandle { child }))
    }
}

struct ProcessHandle {
    child: Child,
}

impl PlaybackHandle for ProcessHandle {
    fn try_wait(&mut self) -> std::io::Result<bool> {
        Ok(self.child.try_wait()?.is_some())
    }

    fn kill(&mut self) -> std::io::Result<()> {
        self.child.kill()
    }
}
