//! Conversational context bookkeeping.
//!
//! The generation engine owns the context; this manager decides when to
//! clear it (trim on a usage threshold), persists snapshots so a session
//! can resume without re-priming, and primes a fresh context with the
//! system prompt. Snapshots are written temp-then-rename so a crash can
//! never leave a half-written file behind.

use crate::engine::{ChatMessage, GenerationEngine, GenerationRequest};
use crate::error::{Result, WispError};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Width of the usage bar in log output.
const USAGE_BAR_CELLS: usize = 30;

pub struct ContextWindowManager {
    cache_dir: PathBuf,
}

impl ContextWindowManager {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Current usage as a fraction of capacity.
    pub fn usage_ratio(&self, engine: &dyn GenerationEngine) -> f64 {
        let capacity = engine.context_capacity();
        if capacity == 0 {
            return 0.0;
        }
        engine.context_usage() as f64 / capacity as f64
    }

    /// Clears the context when usage has reached `threshold` of capacity.
    /// Returns true when a clear happened; callers must re-send the system
    /// prompt on their next generation.
    pub fn maybe_trim(&self, engine: &mut dyn GenerationEngine, threshold: f64) -> bool {
        let capacity = engine.context_capacity();
        let usage = engine.context_usage();
        let limit = (capacity as f64 * threshold) as usize;
        if usage < limit {
            return false;
        }
        info!(
            "context at {usage}/{capacity} tokens ({}%), clearing",
            usage * 100 / capacity.max(1)
        );
        match engine.clear_context() {
            Ok(()) => true,
            Err(e) => {
                warn!("context clear failed: {e}");
                false
            }
        }
    }

    /// Snapshot file for a context key.
    pub fn snapshot_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("context_{key}.snapshot"))
    }

    /// Persists the engine context. Soft-fails with a warning; snapshots
    /// are an optimization, never a requirement.
    pub fn save_snapshot(&self, engine: &dyn GenerationEngine, key: &str) -> bool {
        let blob = match engine.save_context() {
            Ok(blob) => blob,
            Err(e) => {
                warn!("context snapshot skipped: {e}");
                return false;
            }
        };
        match write_atomic(&self.snapshot_path(key), &blob) {
            Ok(()) => {
                debug!(key, bytes = blob.len(), "context snapshot saved");
                true
            }
            Err(e) => {
                warn!("context snapshot write failed: {e}");
                false
            }
        }
    }

    /// Restores a snapshot into the engine. Missing, empty, and rejected
    /// snapshots all soft-fail to false; the caller rebuilds from scratch.
    pub fn load_snapshot(&self, engine: &mut dyn GenerationEngine, key: &str) -> bool {
        let path = self.snapshot_path(key);
        if !path.exists() {
            info!("no context snapshot for '{key}'");
            return false;
        }
        let blob = match std::fs::read(&path) {
            Ok(blob) => blob,
            Err(e) => {
                warn!("context snapshot unreadable: {e}");
                return false;
            }
        };
        if blob.is_empty() {
            warn!("context snapshot for '{key}' is empty, ignoring");
            return false;
        }
        match engine.load_context(&blob) {
            Ok(()) => {
                info!(key, "context restored from snapshot");
                true
            }
            Err(e) => {
                warn!("context snapshot rejected by engine: {e}");
                false
            }
        }
    }

    /// Pushes the system prompt into a fresh context by generating a single
    /// throwaway token. Returns true when the context is primed.
    pub fn prime(&self, engine: &mut dyn GenerationEngine, system_text: &str) -> bool {
        let message = ChatMessage::system(format!(
            "{system_text} Respond with only a single space character."
        ));
        let request = GenerationRequest::new(vec![message]).with_max_tokens(1);
        let stream = match engine.generate(request) {
            Ok(stream) => stream,
            Err(e) => {
                warn!("context priming failed: {e}");
                return false;
            }
        };
        for token in stream {
            match token {
                Ok(token) => debug!(token = %token, "priming token"),
                Err(e) => {
                    warn!("context priming stream failed: {e}");
                    return false;
                }
            }
        }
        true
    }

    /// Debug-level usage bar.
    pub fn log_usage(&self, engine: &dyn GenerationEngine) {
        let capacity = engine.context_capacity();
        if capacity == 0 {
            return;
        }
        let usage = engine.context_usage();
        let filled = (usage * USAGE_BAR_CELLS / capacity).min(USAGE_BAR_CELLS);
        let bar: String = "\u{2588}".repeat(filled) + &"\u{2591}".repeat(USAGE_BAR_CELLS - filled);
        debug!(
            "context [{bar}] {usage}/{capacity} tokens ({}%)",
            usage * 100 / capacity
        );
    }
}

/// Writes the blob to a temporary file in the target directory, then
/// renames it over the final path. The rename is the atomicity boundary.
fn write_atomic(path: &Path, blob: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| WispError::Context("snapshot path has no parent".to_owned()))?;
    std::fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(blob)?;
    tmp.persist(path)
        .map_err(|e| WispError::Context(format!("snapshot rename failed: {e}")))?;
    Ok(())
}
