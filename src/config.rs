//! Configuration types for the voice assistant.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WispConfig {
    /// Text generation engine settings.
    pub engine: EngineConfig,
    /// Speech recognition settings.
    pub recognition: RecognitionConfig,
    /// Speech synthesis settings.
    pub synthesis: SynthesisConfig,
    /// Audio playback settings.
    pub playback: PlaybackConfig,
    /// Speech output behaviour (chunking and queue worker).
    pub speech: SpeechConfig,
    /// Conversational context window settings.
    pub context: ContextConfig,
    /// Audio capture settings.
    pub audio: AudioConfig,
}

/// Generation engine configuration (OpenAI-compatible API).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base URL of the API server (llama.cpp, Ollama, vLLM, ...).
    pub base_url: String,
    /// API key. Local servers usually accept requests without one.
    pub api_key: Option<String>,
    /// Model identifier sent with each request.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens to generate per turn.
    pub max_tokens: usize,
    /// Request timeout in seconds (covers the whole stream).
    pub timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_owned(),
            api_key: None,
            model: "qwen2.5-1.5b-instruct".to_owned(),
            temperature: 0.1,
            max_tokens: 200,
            timeout_secs: 120,
        }
    }
}

impl EngineConfig {
    /// Creates a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the model identifier.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// Speech recognition configuration (external transcriber command).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Transcriber argv. `{wav}` is replaced with the capture file path;
    /// the transcript is read from stdout.
    pub command: Vec<String>,
    /// Language hint passed through to the transcriber.
    pub language: String,
    /// Seconds to wait before killing a stuck transcriber.
    pub timeout_secs: u64,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "whisper-cli".to_owned(),
                "-f".to_owned(),
                "{wav}".to_owned(),
                "-l".to_owned(),
                "{lang}".to_owned(),
                "-np".to_owned(),
                "-nt".to_owned(),
            ],
            language: "en".to_owned(),
            timeout_secs: 30,
        }
    }
}

/// Speech synthesis configuration (external synthesizer command).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Synthesizer argv. `{out}` is replaced with the output WAV path;
    /// the chunk text is written to stdin.
    pub command: Vec<String>,
    /// Seconds to wait before killing a stuck synthesizer.
    pub timeout_secs: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "piper".to_owned(),
                "--output_file".to_owned(),
                "{out}".to_owned(),
            ],
            timeout_secs: 30,
        }
    }
}

/// Audio playback configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Player argv. The audio file path is appended as the last argument.
    pub command: Vec<String>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            command: vec!["aplay".to_owned(), "-q".to_owned()],
        }
    }
}

/// Speech output behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Whether spoken output is enabled at all.
    pub enabled: bool,
    /// Queue poll interval in ms. Bounds how long the worker takes to
    /// notice a stop request when the queue is idle.
    pub poll_interval_ms: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 100,
        }
    }
}

/// Context window configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Context capacity in tokens the engine is assumed to hold.
    pub capacity_tokens: usize,
    /// Usage fraction at which the context is cleared (0.0..=1.0).
    pub trim_threshold: f64,
    /// Snapshot directory (None = `~/.cache/wisp`).
    pub cache_dir: Option<PathBuf>,
    /// Snapshot key. One snapshot file is kept per key.
    pub snapshot_key: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            capacity_tokens: 8192,
            trim_threshold: 0.80,
            cache_dir: None,
            snapshot_key: "default".to_owned(),
        }
    }
}

/// Audio capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Target sample rate in Hz for captured audio.
    pub sample_rate: u32,
    /// Input device name (None = system default).
    pub input_device: Option<String>,
    /// Write every take to a timestamped WAV file for inspection.
    pub debug_dump: bool,
    /// Directory for debug WAV dumps (None = current directory).
    pub debug_dir: Option<PathBuf>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            input_device: None,
            debug_dump: false,
            debug_dir: None,
        }
    }
}

impl WispConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::WispError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::WispError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load from the given path, or from the default path if it exists,
    /// or fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error only for an explicitly given path that fails to load;
    /// a missing default-path file is not an error.
    pub fn load_or_default(path: Option<&std::path::Path>) -> crate::error::Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let p = Self::default_config_path();
                if p.exists() {
                    Self::from_file(&p)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Returns the default config file path: `~/.config/wisp/config.toml`.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp/wisp-config"))
            .join("wisp")
            .join("config.toml")
    }

    /// Returns the snapshot cache directory, honouring the config override.
    pub fn cache_dir(&self) -> PathBuf {
        self.context.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("wisp")
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = WispConfig::default();
        assert!(!config.engine.base_url.is_empty());
        assert!(!config.engine.model.is_empty());
        assert!(config.engine.max_tokens > 0);
        assert!(!config.recognition.command.is_empty());
        assert!(!config.synthesis.command.is_empty());
        assert!(!config.playback.command.is_empty());
        assert!(config.context.capacity_tokens > 0);
        assert!(config.context.trim_threshold > 0.0 && config.context.trim_threshold <= 1.0);
        assert!(config.audio.sample_rate > 0);
    }

    #[test]
    fn engine_builder_sets_fields() {
        let engine = EngineConfig::new()
            .with_base_url("http://localhost:11434")
            .with_api_key("sk-test")
            .with_model("llama3.2");
        assert_eq!(engine.base_url, "http://localhost:11434");
        assert_eq!(engine.api_key.as_deref(), Some("sk-test"));
        assert_eq!(engine.model, "llama3.2");
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = match tempfile::tempdir() {
            Ok(d) => d,
            Err(_) => unreachable!("tempdir should be creatable"),
        };
        let path = dir.path().join("config.toml");

        let mut config = WispConfig::default();
        config.engine.temperature = 0.7;
        config.context.trim_threshold = 0.5;
        config.speech.enabled = false;

        assert!(config.save_to_file(&path).is_ok());
        assert!(path.exists());

        let loaded = match WispConfig::from_file(&path) {
            Ok(c) => c,
            Err(_) => unreachable!("load should succeed"),
        };
        assert!((loaded.engine.temperature - 0.7).abs() < f32::EPSILON);
        assert!((loaded.context.trim_threshold - 0.5).abs() < f64::EPSILON);
        assert!(!loaded.speech.enabled);
    }

    #[test]
    fn from_file_nonexistent_returns_error() {
        let result = WispConfig::from_file(std::path::Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn from_file_invalid_toml_returns_error() {
        let dir = match tempfile::tempdir() {
            Ok(d) => d,
            Err(_) => unreachable!("tempdir should be creatable"),
        };
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "this is not valid toml {{{").ok();

        let result = WispConfig::from_file(&path);
        assert!(result.is_err());
    }

    #[test]
    fn partial_toml_uses_defaults_for_missing_sections() {
        let parsed: WispConfig = match toml::from_str("[engine]\nmodel = \"phi-3\"\n") {
            Ok(c) => c,
            Err(_) => unreachable!("partial config should parse"),
        };
        assert_eq!(parsed.engine.model, "phi-3");
        assert_eq!(parsed.context.capacity_tokens, 8192);
        assert!(parsed.speech.enabled);
    }
}
