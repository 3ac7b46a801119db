//! Recognition and synthesis through external commands.
//!
//! Both engines are argv templates filled in per call: the transcriber gets
//! a temporary WAV of the take and must print the transcript to stdout; the
//! synthesizer gets chunk text on stdin and must write a WAV to `{out}`.

use crate::config::{RecognitionConfig, SynthesisConfig};
use crate::engine::{RecognitionEngine, SynthesisEngine};
use crate::error::{Result, WispError};
use std::io::{Read, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Poll cadence while waiting on an external command.
const WAIT_POLL: Duration = Duration::from_millis(25);

/// Resolves `argv[0]` through PATH so a missing binary fails at startup.
fn resolve_argv(command: &[String], what: &str) -> Result<Vec<String>> {
    let mut argv = command.to_vec();
    let program = argv
        .first()
        .ok_or_else(|| WispError::Config(format!("{what} command is empty")))?;
    let resolved = which::which(program)
        .map_err(|e| WispError::Config(format!("{what} command '{program}' not found: {e}")))?;
    argv[0] = resolved.to_string_lossy().into_owned();
    Ok(argv)
}

/// Substitutes `placeholder` everywhere in the template; appends the value
/// as a final argument when the template never mentions it.
fn fill(template: &[String], placeholder: &str, value: &str) -> Vec<String> {
    let mut argv: Vec<String> = template
        .iter()
        .map(|arg| arg.replace(placeholder, value))
        .collect();
    if !template.iter().any(|arg| arg.contains(placeholder)) {
        argv.push(value.to_owned());
    }
    argv
}

/// Waits for exit, killing the process once `timeout` elapses. Timeouts are
/// wrapped with the caller's error variant.
fn wait_with_timeout(
    child: &mut Child,
    timeout: Duration,
    what: &str,
    wrap: fn(String) -> WispError,
) -> Result<std::process::ExitStatus> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if Instant::now() >= deadline {
                    if let Err(e) = child.kill() {
                        debug!("{what} kill raced its exit: {e}");
                    }
                    let _ = child.wait();
                    return Err(wrap(format!(
                        "{what} timed out after {:.1}s",
                        timeout.as_secs_f64()
                    )));
                }
                std::thread::sleep(WAIT_POLL);
            }
            Err(e) => return Err(WispError::Io(e)),
        }
    }
}

fn write_wav_f32_mono(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| WispError::Recognition(format!("failed to create wav writer: {e}")))?;
    for &s in samples {
        let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        writer
            .write_sample(v)
            .map_err(|e| WispError::Recognition(format!("failed to write wav sample: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| WispError::Recognition(format!("failed to finalize wav: {e}")))?;
    Ok(())
}

/// Speech-to-text through an external transcriber.
pub struct CommandRecognition {
    argv: Vec<String>,
    sample_rate: u32,
}

impl CommandRecognition {
    pub fn new(config: &RecognitionConfig, sample_rate: u32) -> Result<Self> {
        Ok(Self {
            argv: resolve_argv(&config.command, "recognition")?,
            sample_rate,
        })
    }
}

impl RecognitionEngine for CommandRecognition {
    fn transcribe(&self, samples: &[f32], language: &str, timeout: Duration) -> Result<String> {
        let wav = tempfile::Builder::new()
            .prefix("wisp-take-")
            .suffix(".wav")
            .tempfile()
            .map_err(|e| WispError::Recognition(format!("failed to create take file: {e}")))?;
        write_wav_f32_mono(wav.path(), samples, self.sample_rate)?;

        let argv: Vec<String> = self
            .argv
            .iter()
            .map(|arg| arg.replace("{lang}", language))
            .collect();
        let argv = fill(&argv, "{wav}", &wav.path().to_string_lossy());

        debug!(command = %argv.join(" "), "running transcriber");
        let mut child = Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| WispError::Recognition(format!("failed to start transcriber: {e}")))?;

        let status = wait_with_timeout(&mut child, timeout, "transcriber", WispError::Recognition)?;
        if !status.success() {
            return Err(WispError::Recognition(format!(
                "transcriber exited with {status}"
            )));
        }

        let mut transcript = String::new();
        if let Some(mut stdout) = child.stdout.take() {
            stdout
                .read_to_string(&mut transcript)
                .map_err(|e| WispError::Recognition(format!("transcript read failed: {e}")))?;
        }
        Ok(transcript.trim().to_owned())
    }
}

/// Text-to-speech through an external synthesizer.
pub struct CommandSynthesis {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandSynthesis {
    pub fn new(config: &SynthesisConfig) -> Result<Self> {
        Ok(Self {
            argv: resolve_argv(&config.command, "synthesis")?,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }
}

impl SynthesisEngine for CommandSynthesis {
    fn synthesize(&self, text: &str, out: &Path) -> Result<()> {
        let argv = fill(&self.argv, "{out}", &out.to_string_lossy());

        debug!(command = %argv.join(" "), "running synthesizer");
        let mut child = Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| WispError::Synthesis(format!("failed to start synthesizer: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(text.as_bytes()) {
                warn!("synthesizer closed stdin early: {e}");
            }
        }

        let status =
            wait_with_timeout(&mut child, self.timeout, "synthesizer", WispError::Synthesis)?;
        if !status.success() {
            return Err(WispError::Synthesis(format!(
                "synthesizer exited with {status}"
            )));
        }

        let produced = std::fs::metadata(out).map(|m| m.len()).unwrap_or(0);
        if produced == 0 {
            return Err(WispError::Synthesis(
                "synthesizer produced no audio".to_owned(),
            ));
        }
        Ok(())
    }
}
