//! Shared cpal helpers for the input and output backends.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{BufferSize, Device, Host, Sample, SampleFormat, SupportedBufferSize, SupportedStreamConfig, SupportedStreamConfigRange};

use crate::error::DeviceError;

/// Buffer size used when the device does not report a range.
pub const FALLBACK_BUFFER_FRAMES: usize = 1024;

/// Smallest block the loops will work with, whatever the device reports.
pub const MIN_BUFFER_FRAMES: usize = 256;

/// Stream direction, used to pick devices and format messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Input => write!(f, "input"),
            Direction::Output => write!(f, "output"),
        }
    }
}

/// Get a human-readable device name, or "Unknown".
pub fn get_device_name(device: &Device) -> String {
    device.description().ok().map(|desc| desc.name().to_string()).unwrap_or_else(|| "Unknown".to_string())
}

/// Find a device by name, or the host default when `name` is `None`.
pub fn find_device(host: &Host, direction: Direction, name: Option<&str>) -> Result<Device, DeviceError> {
    let Some(name) = name else {
        let device = match direction {
            Direction::Input => host.default_input_device(),
            Direction::Output => host.default_output_device(),
        };
        return device.ok_or_else(|| DeviceError::NotFound(direction.to_string()));
    };

    let devices: Vec<Device> = match direction {
        Direction::Input => host.input_devices().map(|d| d.collect()),
        Direction::Output => host.output_devices().map(|d| d.collect()),
    }
    .map_err(|e| DeviceError::stream(format!("Failed to enumerate {} devices: {}", direction, e)))?;

    devices
        .into_iter()
        .find(|device| get_device_name(device) == name)
        .ok_or_else(|| DeviceError::NotFound(format!("{} \"{}\"", direction, name)))
}

/// Supported configuration ranges of a device in the given direction.
pub fn supported_configs(device: &Device, direction: Direction) -> Result<Vec<SupportedStreamConfigRange>, DeviceError> {
    let configs = match direction {
        Direction::Input => device.supported_input_configs().map(|c| c.collect()),
        Direction::Output => device.supported_output_configs().map(|c| c.collect()),
    };
    configs.map_err(|e| DeviceError::Config(format!("Failed to get supported {} configs: {}", direction, e)))
}

/// Find an F32 configuration (mono or stereo) that runs at exactly `sample_rate`.
///
/// The probe signal is never resampled, so a device that cannot run at the
/// requested rate is an error rather than a fallback.
pub fn find_best_config(configs: impl IntoIterator<Item = SupportedStreamConfigRange>, sample_rate: u32) -> Result<SupportedStreamConfig, DeviceError> {
    let mut f32_configs: Vec<SupportedStreamConfigRange> = configs
        .into_iter()
        .filter(|config| config.channels() <= 2 && config.sample_format() == SampleFormat::F32)
        .collect();

    if f32_configs.is_empty() {
        return Err(DeviceError::Config("no F32 mono or stereo configuration".to_string()));
    }

    // Prefer mono so output frames map one-to-one to chirp samples
    f32_configs.sort_by_key(|config| config.channels());

    f32_configs
        .into_iter()
        .find(|config| sample_rate >= config.min_sample_rate() && sample_rate <= config.max_sample_rate())
        .map(|config| config.with_sample_rate(sample_rate))
        .ok_or_else(|| DeviceError::Config(format!("device cannot run at {} Hz", sample_rate)))
}

/// Minimum buffer size in frames for a supported configuration.
pub fn min_buffer_frames(buffer_size: &SupportedBufferSize) -> usize {
    match buffer_size {
        SupportedBufferSize::Range { min, .. } => (*min as usize).max(MIN_BUFFER_FRAMES),
        SupportedBufferSize::Unknown => FALLBACK_BUFFER_FRAMES,
    }
}

/// Stream buffer size request for `frames`, if the device range allows it.
pub fn stream_buffer_size(supported: &SupportedBufferSize, frames: usize) -> BufferSize {
    match supported {
        SupportedBufferSize::Range { min, max } if (*min as usize..=*max as usize).contains(&frames) => BufferSize::Fixed(frames as u32),
        _ => BufferSize::Default,
    }
}

/// Mix interleaved f32 frames down to mono by averaging channels.
pub fn convert_to_mono_f32_f32(data: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        data.to_vec()
    } else {
        data.chunks(channels).map(|frame| frame.iter().sum::<f32>() / channels as f32).collect()
    }
}

/// Convert PCM16 samples to f32 in `[-1.0, 1.0)`.
pub fn i16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| f32::from_sample(s)).collect()
}

/// Convert f32 samples to PCM16 in place, saturating out-of-range input.
pub fn f32_to_i16(samples: &[f32], out: &mut [i16]) {
    for (dst, &src) in out.iter_mut().zip(samples) {
        *dst = i16::from_sample(src.clamp(-1.0, 1.0));
    }
}

/// Names of every input and output device on the default host.
pub fn list_devices() -> Result<(Vec<String>, Vec<String>), DeviceError> {
    let host = cpal::default_host();
    let inputs = host
        .input_devices()
        .map_err(|e| DeviceError::stream(format!("Failed to enumerate input devices: {}", e)))?
        .map(|d| get_device_name(&d))
        .collect();
    let outputs = host
        .output_devices()
        .map_err(|e| DeviceError::stream(format!("Failed to enumerate output devices: {}", e)))?
        .map(|d| get_device_name(&d))
        .collect();
    Ok((inputs, outputs))
}
