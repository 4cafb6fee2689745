//! Application configuration and CLI argument parsing.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::EngineConfig;
use crate::synth::ChirpParameters;

/// File name of the capture inside the downloads directory.
const OUTPUT_FILE_NAME: &str = "recorded_signal.pcm";

/// Chirp probe recorder configuration.
#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(name = "record-signal")]
#[command(author, version, about = "Loop an ultrasonic chirp while recording the microphone to raw PCM", long_about = None)]
pub struct AppConfig {
    /// List audio input and output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    pub print_config: bool,

    /// Sample rate for both playback and the recorded file
    #[arg(long, default_value = "48000")]
    pub sample_rate: u32,

    /// Chirp start frequency in Hz
    #[arg(long, default_value = "17000")]
    pub low_freq: f64,

    /// Chirp end frequency in Hz (at most half the sample rate)
    #[arg(long, default_value = "20000")]
    pub high_freq: f64,

    /// Duration of one chirp sweep in seconds
    #[arg(long, default_value = "0.2")]
    pub chirp_duration: f64,

    /// Chirp peak amplitude (0.0 - 1.0)
    #[arg(long, default_value = "1.0", value_parser = parse_amplitude)]
    pub amplitude: f64,

    /// Linear fade in/out length in samples, smoothing the click at each repetition (0 = off)
    #[arg(long, default_value = "0")]
    pub fade_samples: usize,

    /// Raw PCM output file (signed 16-bit little-endian mono, no header)
    #[arg(long, short = 'o', env = "RECORD_SIGNAL_OUTPUT", default_value_os_t = default_output_path())]
    pub output: PathBuf,

    /// Output device name (default device if not specified)
    #[arg(long)]
    pub output_device: Option<String>,

    /// Input device name (default device if not specified)
    #[arg(long)]
    pub input_device: Option<String>,

    /// Stop automatically after this many seconds
    #[arg(long, value_parser = parse_run_for)]
    pub run_for: Option<f64>,

    /// Enable verbose logging
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl AppConfig {
    /// Parse configuration from command line arguments.
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Build validated chirp parameters from the CLI values.
    pub fn chirp_parameters(&self) -> Result<ChirpParameters> {
        let params = ChirpParameters::new(self.sample_rate, self.low_freq, self.high_freq, self.chirp_duration, self.amplitude)?;
        Ok(params.with_fade(self.fade_samples)?)
    }

    /// Build the engine configuration.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        Ok(EngineConfig { chirp: self.chirp_parameters()?, output_path: self.output.clone() })
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        self.chirp_parameters().context("Invalid chirp settings")?;

        let dir = match self.output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !dir.is_dir() {
            anyhow::bail!("Output directory does not exist: {}", dir.display());
        }

        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        info!("Configuration:");
        info!("  Sample rate: {} Hz", self.sample_rate);
        info!("  Chirp: {} Hz -> {} Hz over {} s", self.low_freq, self.high_freq, self.chirp_duration);
        info!("  Amplitude: {}", self.amplitude);
        if self.fade_samples > 0 {
            info!("  Fade: {} samples", self.fade_samples);
        }
        info!("  Output file: {}", self.output.display());
        info!("  Output device: {}", self.output_device.as_deref().unwrap_or("default"));
        info!("  Input device: {}", self.input_device.as_deref().unwrap_or("default"));
        if let Some(secs) = self.run_for {
            info!("  Run for: {} s", secs);
        }
    }
}

/// Default capture path: `~/Downloads/recorded_signal.pcm`, or the working directory.
fn default_output_path() -> PathBuf {
    dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")).join(OUTPUT_FILE_NAME)
}

/// Parse and validate amplitude (0.0-1.0).
fn parse_amplitude(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|_| format!("'{}' is not a valid float", s))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("amplitude must be between 0.0 and 1.0, got {}", value))
    }
}

/// Parse a positive number of seconds.
fn parse_run_for(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|_| format!("'{}' is not a valid number of seconds", s))?;
    if value.is_finite() && value > 0.0 { Ok(value) } else { Err(format!("run time must be positive, got {}", value)) }
}
