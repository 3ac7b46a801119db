//! Push-to-talk microphone capture using cpal.
//!
//! Records at the device's native sample rate and converts to mono at the
//! configured rate (default 16kHz) for the recognition engine. `start`
//! opens the input stream; `stop` tears it down and returns the whole take.

use crate::config::AudioConfig;
use crate::error::{Result, WispError};
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, unbounded};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

pub struct Recorder {
    device: cpal::Device,
    stream_config: StreamConfig,
    target_sample_rate: u32,
    stream: Option<cpal::Stream>,
    rx: Option<Receiver<Vec<f32>>>,
    debug_dump: bool,
    debug_dir: Option<PathBuf>,
    take_counter: u32,
}

impl Recorder {
    /// Resolve the input device and its native configuration.
    ///
    /// Uses the device's default config for maximum compatibility and
    /// converts to the target rate in software.
    ///
    /// # Errors
    ///
    /// Returns an error if no usable input device is available.
    pub fn new(config: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(ref name) = config.input_device {
            host.input_devices()
                .map_err(|e| WispError::Audio(format!("cannot enumerate devices: {e}")))?
                .find(|d| {
                    d.description()
                        .ok()
                        .map(|desc| desc.name() == name)
                        .unwrap_or(false)
                })
                .ok_or_else(|| WispError::Audio(format!("input device '{name}' not found")))?
        } else {
            host.default_input_device()
                .ok_or_else(|| WispError::Audio("no default input device".to_owned()))?
        };

        let device_name = device
            .description()
            .map(|d| d.name().to_owned())
            .unwrap_or_else(|_| "<unknown>".to_owned());
        info!("using input device: {device_name}");

        let default_config = device
            .default_input_config()
            .map_err(|e| WispError::Audio(format!("no default input config: {e}")))?;

        let stream_config = StreamConfig {
            channels: default_config.channels(),
            sample_rate: default_config.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        debug!(
            "native input config: {}Hz, {} channels",
            stream_config.sample_rate, stream_config.channels
        );

        Ok(Self {
            device,
            stream_config,
            target_sample_rate: config.sample_rate,
            stream: None,
            rx: None,
            debug_dump: config.debug_dump,
            debug_dir: config.debug_dir.clone(),
            take_counter: 0,
        })
    }

    /// Begin capturing. A no-op when a take is already in progress.
    ///
    /// # Errors
    ///
    /// Returns an error if the input stream cannot be built or started.
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let (tx, rx) = unbounded::<Vec<f32>>();
        let native_rate = self.stream_config.sample_rate;
        let native_channels = self.stream_config.channels;
        let target_rate = self.target_sample_rate;

        let stream = self
            .device
            .build_input_stream(
                &self.stream_config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    let mono = if native_channels > 1 {
                        to_mono(data, native_channels)
                    } else {
                        data.to_vec()
                    };
                    let samples = if native_rate != target_rate {
                        resample(&mono, native_rate, target_rate)
                    } else {
                        mono
                    };
                    // Unbounded send never blocks the audio thread.
                    if tx.send(samples).is_err() {
                        debug!("capture channel closed, dropping samples");
                    }
                },
                move |err| {
                    error!("audio input stream error: {err}");
                },
                None,
            )
            .map_err(|e| WispError::Audio(format!("failed to build input stream: {e}")))?;

        stream
            .play()
            .map_err(|e| WispError::Audio(format!("failed to start input stream: {e}")))?;

        self.stream = Some(stream);
        self.rx = Some(rx);
        info!("recording started");
        Ok(())
    }

    /// End the take and return everything captured since `start`.
    /// Returns an empty take when no recording was in progress.
    pub fn stop(&mut self) -> Vec<f32> {
        let Some(stream) = self.stream.take() else {
            return Vec::new();
        };
        drop(stream);

        let mut samples = Vec::new();
        if let Some(rx) = self.rx.take() {
            while let Ok(chunk) = rx.try_recv() {
                samples.extend_from_slice(&chunk);
            }
        }
        info!(
            "recorded {:.1}s of audio",
            samples.len() as f32 / self.target_sample_rate as f32
        );

        if self.debug_dump {
            self.take_counter += 1;
            dump_debug_wav(
                &samples,
                self.target_sample_rate,
                self.debug_dir.as_deref(),
                self.take_counter,
            );
        }
        samples
    }

    pub fn is_recording(&self) -> bool {
        self.stream.is_some()
    }

    pub fn sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    /// List available input devices.
    ///
    /// # Errors
    ///
    /// Returns an error if devices cannot be enumerated.
    pub fn list_input_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| WispError::Audio(format!("cannot enumerate devices: {e}")))?;

        let mut names = Vec::new();
        for device in devices {
            if let Ok(desc) = device.description() {
                names.push(desc.name().to_owned());
            }
        }
        Ok(names)
    }
}

/// Average interleaved frames down to one channel.
fn to_mono(data: &[f32], channels: u16) -> Vec<f32> {
    let ch = channels as usize;
    data.chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Linear-interpolation rate conversion. Speech energy sits below 8kHz,
/// so no anti-alias filter is needed for the 48kHz to 16kHz path.
fn resample(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = src_rate as f64 / dst_rate as f64;
    let out_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;
        let sample = if idx + 1 < samples.len() {
            samples[idx] as f64 * (1.0 - frac) + samples[idx + 1] as f64 * frac
        } else {
            samples[idx.min(samples.len() - 1)] as f64
        };
        output.push(sample as f32);
    }
    output
}

/// Write the take to a timestamped WAV in `dir` (or the working directory).
/// Failures only warn; a missed dump must never break the conversation.
fn dump_debug_wav(samples: &[f32], sample_rate: u32, dir: Option<&Path>, counter: u32) {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let name = format!("debug_audio_{stamp}_{counter:03}.wav");
    let path = dir.map_or_else(|| PathBuf::from(&name), |d| d.join(&name));
    match write_wav(&path, samples, sample_rate) {
        Ok(()) => debug!("debug audio written to {}", path.display()),
        Err(e) => warn!("debug audio dump failed: {e}"),
    }
}

fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| WispError::Audio(format!("cannot create {}: {e}", path.display())))?;
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        writer
            .write_sample(value)
            .map_err(|e| WispError::Audio(format!("wav write failed: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| WispError::Audio(format!("wav finalize failed: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn to_mono_averages_channels() {
        let stereo = [0.2, 0.4, -1.0, 1.0, 0.5, 0.5];
        let mono = to_mono(&stereo, 2);
        assert_eq!(mono.len(), 3);
        assert!((mono[0] - 0.3).abs() < 1e-6);
        assert!(mono[1].abs() < 1e-6);
        assert!((mono[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn resample_halves_length_at_double_rate() {
        let samples: Vec<f32> = (0..480).map(|i| (i as f32 / 480.0).sin()).collect();
        let out = resample(&samples, 48_000, 16_000);
        assert_eq!(out.len(), 160);
    }

    #[test]
    fn resample_is_identity_at_equal_rates() {
        let samples = vec![0.1_f32, 0.2, 0.3];
        assert_eq!(resample(&samples, 16_000, 16_000), samples);
        assert!(resample(&[], 48_000, 16_000).is_empty());
    }

    #[test]
    fn wav_round_trip_preserves_sample_count() {
        let dir = match tempfile::tempdir() {
            Ok(d) => d,
            Err(_) => unreachable!("tempdir should be creatable"),
        };
        let path = dir.path().join("take.wav");
        let samples: Vec<f32> = (0..1600).map(|i| ((i as f32) * 0.01).sin() * 0.5).collect();
        match write_wav(&path, &samples, 16_000) {
            Ok(()) => {}
            Err(e) => panic!("wav write failed: {e}"),
        }

        let reader = match hound::WavReader::open(&path) {
            Ok(r) => r,
            Err(e) => panic!("wav open failed: {e}"),
        };
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().sample_rate, 16_000);
        assert_eq!(reader.len() as usize, samples.len());
    }

    #[test]
    fn debug_dump_writes_timestamped_file() {
        let dir = match tempfile::tempdir() {
            Ok(d) => d,
            Err(_) => unreachable!("tempdir should be creatable"),
        };
        dump_debug_wav(&[0.0; 320], 16_000, Some(dir.path()), 7);

        let entries: Vec<_> = match std::fs::read_dir(dir.path()) {
            Ok(read) => read.filter_map(std::result::Result::ok).collect(),
            Err(e) => panic!("read_dir failed: {e}"),
        };
        assert_eq!(entries.len(), 1);
        let name = entries[0].file_name();
        let name = name.to_string_lossy();
        assert!(name.starts_with("debug_audio_"));
        assert!(name.ends_with("_007.wav"));
    }
}
