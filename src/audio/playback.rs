//! Audio output backend using cpal.
//!
//! Blocking writes are bridged to the cpal output callback through a lock-free
//! ring buffer: `write` waits for free space, the callback pops one sample per
//! frame and duplicates it to every channel.

use std::sync::Arc;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig, SupportedStreamConfig};
use parking_lot::Mutex;
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use tracing::{debug, info, warn};

use super::device::{OutputDevice, OutputSession};
use super::util::{Direction, find_best_config, find_device, get_device_name, i16_to_f32, min_buffer_frames, stream_buffer_size, supported_configs};
use crate::error::DeviceError;

/// Ring capacity as a multiple of the device buffer size.
const RING_PERIODS: usize = 4;

/// Sleep between attempts when the ring is full.
const WRITE_POLL: Duration = Duration::from_millis(1);

/// Extra time allowed for queued samples to drain on stop.
const DRAIN_GRACE: Duration = Duration::from_millis(100);

/// Output device backed by the default cpal host.
pub struct CpalOutput {
    device_name: Option<String>, // None selects the host default
}

impl CpalOutput {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    fn resolve(&self, sample_rate: u32) -> Result<(Device, SupportedStreamConfig), DeviceError> {
        let host = cpal::default_host();
        let device = find_device(&host, Direction::Output, self.device_name.as_deref())?;
        let config = find_best_config(supported_configs(&device, Direction::Output)?, sample_rate)?;
        Ok((device, config))
    }
}

impl OutputDevice for CpalOutput {
    fn min_buffer_size(&self, sample_rate: u32) -> Result<usize, DeviceError> {
        let (_, config) = self.resolve(sample_rate)?;
        Ok(min_buffer_frames(config.buffer_size()))
    }

    fn open(&self, sample_rate: u32, buffer_frames: usize) -> Result<Box<dyn OutputSession>, DeviceError> {
        let (device, config) = self.resolve(sample_rate)?;

        info!("Using output device: {}", get_device_name(&device));
        debug!("Audio playback config: {} Hz, {} channels, {} frame buffer", config.sample_rate(), config.channels(), buffer_frames);

        let channels = config.channels() as usize;
        let mut stream_config: StreamConfig = config.config();
        stream_config.buffer_size = stream_buffer_size(config.buffer_size(), buffer_frames);

        let ring = HeapRb::<f32>::new(buffer_frames * RING_PERIODS);
        let (producer, mut consumer) = ring.split();

        let failure: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let failure_clone = failure.clone();

        let err_fn = move |err: cpal::StreamError| {
            tracing::error!("Audio playback error: {}", err);
            *failure_clone.lock() = Some(err.to_string());
        };

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    // Underruns play silence
                    for frame in data.chunks_mut(channels) {
                        frame.fill(consumer.try_pop().unwrap_or(0.0));
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| DeviceError::stream(format!("Failed to build output stream: {}", e)))?;

        let drain_timeout = Duration::from_secs_f64((buffer_frames * RING_PERIODS) as f64 / sample_rate as f64) + DRAIN_GRACE;

        Ok(Box::new(CpalOutputSession { stream: Some(stream), producer, failure, drain_timeout }))
    }
}

/// An open cpal output stream fed through a ring buffer.
struct CpalOutputSession {
    stream: Option<Stream>,
    producer: ringbuf::HeapProd<f32>,
    failure: Arc<Mutex<Option<String>>>, // Set by the stream error callback
    drain_timeout: Duration,
}

impl CpalOutputSession {
    fn check_failure(&self) -> Result<(), DeviceError> {
        match self.failure.lock().as_ref() {
            Some(msg) => Err(DeviceError::stream(msg.clone())),
            None => Ok(()),
        }
    }

    fn stream(&self) -> Result<&Stream, DeviceError> {
        self.stream.as_ref().ok_or_else(|| DeviceError::stream("output stream already released"))
    }
}

impl OutputSession for CpalOutputSession {
    fn play(&mut self) -> Result<(), DeviceError> {
        self.stream()?.play().map_err(|e| DeviceError::stream(format!("Failed to start playback stream: {}", e)))
    }

    fn write(&mut self, samples: &[i16]) -> Result<usize, DeviceError> {
        let pending = i16_to_f32(samples);
        let mut offset = 0;

        while offset < pending.len() {
            self.check_failure()?;
            let pushed = self.producer.push_slice(&pending[offset..]);
            offset += pushed;
            if pushed == 0 {
                std::thread::sleep(WRITE_POLL);
            }
        }

        Ok(samples.len())
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        // Let what is already queued reach the device before pausing
        let deadline = Instant::now() + self.drain_timeout;
        while !self.producer.is_empty() && self.check_failure().is_ok() {
            if Instant::now() > deadline {
                warn!("Playback queue did not drain, dropping {} samples", self.producer.occupied_len());
                break;
            }
            std::thread::sleep(WRITE_POLL);
        }

        self.stream()?.pause().map_err(|e| DeviceError::stream(format!("Failed to stop playback stream: {}", e)))
    }

    fn release(&mut self) {
        if self.stream.take().is_some() {
            debug!("Output stream released");
        }
    }
}
