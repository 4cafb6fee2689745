//! Audio input backend using cpal.
//!
//! The cpal input callback mixes each buffer to mono and pushes it into a
//! lock-free ring buffer; `read` drains the ring, blocking while it is empty.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig, SupportedStreamConfig};
use parking_lot::Mutex;
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer, Producer, Split};
use tracing::{debug, info, warn};

use super::device::{CapturePermission, InputDevice, InputSession};
use super::util::{
    Direction, convert_to_mono_f32_f32, f32_to_i16, find_best_config, find_device, get_device_name, min_buffer_frames, stream_buffer_size, supported_configs,
};
use crate::error::DeviceError;

/// Sleep between polls while the ring is empty.
const READ_POLL: Duration = Duration::from_micros(100);

/// Ring capacity as a multiple of the device buffer size.
const RING_PERIODS: usize = 8;

/// Input device backed by the default cpal host.
pub struct CpalInput {
    device_name: Option<String>, // None selects the host default
}

impl CpalInput {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    fn resolve(&self, sample_rate: u32) -> Result<(Device, SupportedStreamConfig), DeviceError> {
        let host = cpal::default_host();
        let device = find_device(&host, Direction::Input, self.device_name.as_deref())?;
        let config = find_best_config(supported_configs(&device, Direction::Input)?, sample_rate)?;
        Ok((device, config))
    }
}

impl InputDevice for CpalInput {
    fn min_buffer_size(&self, sample_rate: u32) -> Result<usize, DeviceError> {
        let (_, config) = self.resolve(sample_rate)?;
        Ok(min_buffer_frames(config.buffer_size()))
    }

    fn open(&self, sample_rate: u32, buffer_frames: usize) -> Result<Box<dyn InputSession>, DeviceError> {
        let (device, config) = self.resolve(sample_rate)?;

        info!("Using input device: {}", get_device_name(&device));
        debug!("Audio capture config: {} Hz, {} channels, {} frame buffer", config.sample_rate(), config.channels(), buffer_frames);

        let channels = config.channels() as usize;
        let mut stream_config: StreamConfig = config.config();
        stream_config.buffer_size = stream_buffer_size(config.buffer_size(), buffer_frames);

        // Keep at least half a second of headroom between callback and reader
        let capacity = (buffer_frames * RING_PERIODS).max(sample_rate as usize / 2);
        let ring = HeapRb::<f32>::new(capacity);
        let (mut producer, consumer) = ring.split();

        let failure: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let failure_clone = failure.clone();
        let dropped = Arc::new(AtomicU64::new(0));
        let dropped_clone = dropped.clone();

        let err_fn = move |err: cpal::StreamError| {
            tracing::error!("Audio capture error: {}", err);
            *failure_clone.lock() = Some(err.to_string());
        };

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let samples = convert_to_mono_f32_f32(data, channels);
                    let written = producer.push_slice(&samples);
                    if written < samples.len() {
                        let count = dropped_clone.fetch_add(1, Ordering::Relaxed);
                        if count.is_multiple_of(100) {
                            warn!("Capture ring full, dropped {} audio chunks", count + 1);
                        }
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| DeviceError::stream(format!("Failed to build input stream: {}", e)))?;

        Ok(Box::new(CpalInputSession {
            stream: Some(stream),
            consumer,
            scratch: vec![0.0; buffer_frames],
            failure,
            dropped,
        }))
    }
}

/// An open cpal input stream drained through a ring buffer.
struct CpalInputSession {
    stream: Option<Stream>,
    consumer: ringbuf::HeapCons<f32>,
    scratch: Vec<f32>,
    failure: Arc<Mutex<Option<String>>>, // Set by the stream error callback
    dropped: Arc<AtomicU64>,             // Chunks lost to a full ring
}

impl CpalInputSession {
    fn check_failure(&self) -> Result<(), DeviceError> {
        match self.failure.lock().as_ref() {
            Some(msg) => Err(DeviceError::stream(msg.clone())),
            None => Ok(()),
        }
    }

    fn stream(&self) -> Result<&Stream, DeviceError> {
        self.stream.as_ref().ok_or_else(|| DeviceError::stream("input stream already released"))
    }
}

impl InputSession for CpalInputSession {
    fn start_recording(&mut self) -> Result<(), DeviceError> {
        self.stream()?.play().map_err(|e| DeviceError::stream(format!("Failed to start capture stream: {}", e)))
    }

    fn read(&mut self, buf: &mut [i16]) -> Result<usize, DeviceError> {
        let want = buf.len().min(self.scratch.len());
        if want == 0 {
            return Ok(0);
        }

        loop {
            self.check_failure()?;
            let read = self.consumer.pop_slice(&mut self.scratch[..want]);
            if read > 0 {
                f32_to_i16(&self.scratch[..read], &mut buf[..read]);
                return Ok(read);
            }
            std::thread::sleep(READ_POLL);
        }
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        self.stream()?.pause().map_err(|e| DeviceError::stream(format!("Failed to stop capture stream: {}", e)))
    }

    fn release(&mut self) {
        if self.stream.take().is_some() {
            let dropped = self.dropped.load(Ordering::Relaxed);
            if dropped > 0 {
                warn!("Capture dropped {} chunks during the session", dropped);
            }
            debug!("Input stream released");
        }
    }
}

/// Grants capture when the input device exists and its configurations can be read.
///
/// On platforms that gate the microphone, enumerating the configurations is
/// what fails when access has been refused.
pub struct InputPermission {
    device_name: Option<String>,
}

impl InputPermission {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }
}

impl CapturePermission for InputPermission {
    fn is_granted(&self) -> bool {
        let host = cpal::default_host();
        let result = find_device(&host, Direction::Input, self.device_name.as_deref()).and_then(|device| supported_configs(&device, Direction::Input));
        match result {
            Ok(configs) if !configs.is_empty() => true,
            Ok(_) => {
                warn!("Input device reports no configurations");
                false
            }
            Err(e) => {
                warn!("Audio capture not available: {}", e);
                false
            }
        }
    }
}
