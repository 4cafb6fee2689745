//! Linear chirp synthesizer.

use std::f64::consts::PI;
use std::sync::Arc;

use tracing::debug;

use crate::error::{EngineError, Result};

/// Full-scale value used to map `[-1.0, 1.0]` onto signed 16-bit samples.
const FULL_SCALE: f64 = i16::MAX as f64;

/// Validated parameters for one chirp sweep.
///
/// Fields are private so a constructed value always satisfies
/// `0 <= low <= high <= sample_rate / 2`, `duration > 0` and `amplitude` in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChirpParameters {
    sample_rate_hz: u32,
    low_freq_hz: f64,
    high_freq_hz: f64,
    duration_sec: f64,
    amplitude: f64,
    fade_samples: usize,
}

impl ChirpParameters {
    /// Create chirp parameters, checking every invariant.
    ///
    /// # Arguments
    /// * `sample_rate_hz` - Playback sample rate (48000 for the probe)
    /// * `low_freq_hz` - Start frequency of the sweep
    /// * `high_freq_hz` - End frequency of the sweep, at most Nyquist
    /// * `duration_sec` - Length of one sweep
    /// * `amplitude` - Peak level between 0.0 and 1.0
    ///
    /// # Errors
    /// Returns `EngineError::InvalidParameters` if any invariant is violated.
    pub fn new(sample_rate_hz: u32, low_freq_hz: f64, high_freq_hz: f64, duration_sec: f64, amplitude: f64) -> Result<Self> {
        if sample_rate_hz == 0 {
            return Err(EngineError::invalid("sample rate must be positive"));
        }
        if !low_freq_hz.is_finite() || !high_freq_hz.is_finite() || !duration_sec.is_finite() || !amplitude.is_finite() {
            return Err(EngineError::invalid("parameters must be finite numbers"));
        }
        if low_freq_hz < 0.0 {
            return Err(EngineError::invalid(format!("low frequency {} Hz is negative", low_freq_hz)));
        }
        if low_freq_hz > high_freq_hz {
            return Err(EngineError::invalid(format!("low frequency {} Hz exceeds high frequency {} Hz", low_freq_hz, high_freq_hz)));
        }
        let nyquist = sample_rate_hz as f64 / 2.0;
        if high_freq_hz > nyquist {
            return Err(EngineError::invalid(format!("high frequency {} Hz exceeds Nyquist limit {} Hz", high_freq_hz, nyquist)));
        }
        if duration_sec <= 0.0 {
            return Err(EngineError::invalid("duration must be positive"));
        }
        if !(0.0..=1.0).contains(&amplitude) {
            return Err(EngineError::invalid(format!("amplitude {} is outside 0.0 - 1.0", amplitude)));
        }

        let params = Self { sample_rate_hz, low_freq_hz, high_freq_hz, duration_sec, amplitude, fade_samples: 0 };
        if params.num_samples() == 0 {
            return Err(EngineError::invalid("duration is shorter than one sample"));
        }
        Ok(params)
    }

    /// Apply a linear fade of `samples` length at both ends of the sweep.
    ///
    /// Off by default, so looped playback clicks at every wrap-around.
    pub fn with_fade(mut self, samples: usize) -> Result<Self> {
        if samples.saturating_mul(2) > self.num_samples() {
            return Err(EngineError::invalid(format!("fade of {} samples does not fit a {} sample chirp", samples, self.num_samples())));
        }
        self.fade_samples = samples;
        Ok(self)
    }

    /// Number of samples in one sweep: `round(duration * sample_rate)`.
    pub fn num_samples(&self) -> usize {
        (self.duration_sec * self.sample_rate_hz as f64).round() as usize
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    pub fn low_freq_hz(&self) -> f64 {
        self.low_freq_hz
    }

    pub fn high_freq_hz(&self) -> f64 {
        self.high_freq_hz
    }

    pub fn duration_sec(&self) -> f64 {
        self.duration_sec
    }

    pub fn amplitude(&self) -> f64 {
        self.amplitude
    }

    pub fn fade_samples(&self) -> usize {
        self.fade_samples
    }

    /// Instantaneous phase at time `t` seconds.
    fn phase(&self, t: f64) -> f64 {
        PI * (self.high_freq_hz - self.low_freq_hz) * t * t / self.duration_sec + 2.0 * PI * self.low_freq_hz * t
    }

    /// Linear fade gain for sample `i` of `n`.
    fn fade_gain(&self, i: usize, n: usize) -> f64 {
        let fade = self.fade_samples;
        if fade == 0 {
            return 1.0;
        }
        let from_edge = i.min(n - 1 - i);
        if from_edge < fade { from_edge as f64 / fade as f64 } else { 1.0 }
    }
}

/// One immutable sweep of 16-bit samples, shared by every playback write.
#[derive(Debug, Clone, PartialEq)]
pub struct ChirpBuffer {
    samples: Arc<[i16]>,
    sample_rate_hz: u32,
}

impl ChirpBuffer {
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    /// Playing time of one pass over the buffer in seconds.
    pub fn duration_sec(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate_hz as f64
    }
}

/// Synthesize one chirp sweep.
///
/// Pure and deterministic: the same parameters always produce the same samples.
/// Each sample is `round(amplitude * cos(phase(t)) * 32767)` clamped to the i16 range.
pub fn generate(params: &ChirpParameters) -> ChirpBuffer {
    let n = params.num_samples();
    let rate = params.sample_rate_hz as f64;

    let samples: Arc<[i16]> = (0..n)
        .map(|i| {
            let t = i as f64 / rate;
            let value = params.amplitude * params.fade_gain(i, n) * params.phase(t).cos() * FULL_SCALE;
            value.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
        })
        .collect();

    debug!(
        "Synthesized chirp {}-{} Hz over {}s ({} samples at {} Hz)",
        params.low_freq_hz, params.high_freq_hz, params.duration_sec, n, params.sample_rate_hz
    );

    ChirpBuffer { samples, sample_rate_hz: params.sample_rate_hz }
}
