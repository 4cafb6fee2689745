//! In-memory devices for exercising the engine without hardware.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use super::device::{InputDevice, InputSession, OutputDevice, OutputSession};
use crate::error::DeviceError;

/// Simulated device latency per call.
const CALL_LATENCY: Duration = Duration::from_millis(1);

/// Lifecycle counters shared between a fake device and its sessions.
#[derive(Debug, Default)]
pub struct Counters {
    pub opens: AtomicUsize,
    pub starts: AtomicUsize,
    pub transfers: AtomicUsize,
    pub samples: AtomicUsize,
    pub stops: AtomicUsize,
    pub releases: AtomicUsize,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Output device that accepts writes after a short delay.
pub struct FakeOutput {
    pub counters: Arc<Counters>,
    pub buffer_frames: usize,
    fail_on_write: Option<usize>, // 1-based write that fails
    fail_open: bool,
}

impl FakeOutput {
    pub fn new() -> Self {
        Self { counters: Arc::default(), buffer_frames: 64, fail_on_write: None, fail_open: false }
    }

    pub fn failing_on_write(n: usize) -> Self {
        Self { fail_on_write: Some(n), ..Self::new() }
    }

    pub fn failing_open() -> Self {
        Self { fail_open: true, ..Self::new() }
    }
}

impl OutputDevice for FakeOutput {
    fn min_buffer_size(&self, _sample_rate: u32) -> Result<usize, DeviceError> {
        Ok(self.buffer_frames)
    }

    fn open(&self, _sample_rate: u32, _buffer_frames: usize) -> Result<Box<dyn OutputSession>, DeviceError> {
        if self.fail_open {
            return Err(DeviceError::NotFound("output".to_string()));
        }
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeOutputSession { counters: self.counters.clone(), fail_on_write: self.fail_on_write }))
    }
}

struct FakeOutputSession {
    counters: Arc<Counters>,
    fail_on_write: Option<usize>,
}

impl OutputSession for FakeOutputSession {
    fn play(&mut self) -> Result<(), DeviceError> {
        self.counters.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn write(&mut self, samples: &[i16]) -> Result<usize, DeviceError> {
        std::thread::sleep(CALL_LATENCY);
        let n = self.counters.transfers.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_write == Some(n) {
            return Err(DeviceError::stream("forced write failure"));
        }
        self.counters.samples.fetch_add(samples.len(), Ordering::SeqCst);
        Ok(samples.len())
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        self.counters.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&mut self) {
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Input device producing a counting sequence of samples.
pub struct FakeInput {
    pub counters: Arc<Counters>,
    pub buffer_frames: usize,
    block: usize,                 // Samples returned per non-empty read
    empty_every_other: bool,      // Even-numbered reads return no data
    fail_on_read: Option<usize>,  // 1-based read that fails
    captured: Arc<Mutex<Vec<i16>>>, // Every sample handed out, in order
}

impl FakeInput {
    pub fn new() -> Self {
        Self {
            counters: Arc::default(),
            buffer_frames: 64,
            block: 64,
            empty_every_other: false,
            fail_on_read: None,
            captured: Arc::default(),
        }
    }

    /// Reads return `block` samples, a prefix of the 64-frame buffer.
    pub fn with_block(block: usize) -> Self {
        Self { block, ..Self::new() }
    }

    pub fn with_empty_reads(mut self) -> Self {
        self.empty_every_other = true;
        self
    }

    pub fn failing_on_read(n: usize) -> Self {
        Self { fail_on_read: Some(n), ..Self::new() }
    }

    /// Samples delivered so far.
    pub fn captured(&self) -> Vec<i16> {
        self.captured.lock().clone()
    }
}

impl InputDevice for FakeInput {
    fn min_buffer_size(&self, _sample_rate: u32) -> Result<usize, DeviceError> {
        Ok(self.buffer_frames)
    }

    fn open(&self, _sample_rate: u32, _buffer_frames: usize) -> Result<Box<dyn InputSession>, DeviceError> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeInputSession {
            counters: self.counters.clone(),
            block: self.block,
            empty_every_other: self.empty_every_other,
            fail_on_read: self.fail_on_read,
            captured: self.captured.clone(),
        }))
    }
}

struct FakeInputSession {
    counters: Arc<Counters>,
    block: usize,
    empty_every_other: bool,
    fail_on_read: Option<usize>,
    captured: Arc<Mutex<Vec<i16>>>,
}

impl InputSession for FakeInputSession {
    fn start_recording(&mut self) -> Result<(), DeviceError> {
        self.counters.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read(&mut self, buf: &mut [i16]) -> Result<usize, DeviceError> {
        std::thread::sleep(CALL_LATENCY);
        let n = self.counters.transfers.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_read == Some(n) {
            return Err(DeviceError::stream("forced read failure"));
        }
        if self.empty_every_other && n % 2 == 0 {
            return Ok(0);
        }

        let count = self.block.min(buf.len());
        let mut captured = self.captured.lock();
        for slot in buf[..count].iter_mut() {
            *slot = (captured.len() % 30000) as i16 - 15000;
            captured.push(*slot);
        }
        // Garbage past the valid prefix must never reach the file
        for slot in buf[count..].iter_mut() {
            *slot = i16::MIN;
        }
        self.counters.samples.fetch_add(count, Ordering::SeqCst);
        Ok(count)
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        self.counters.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&mut self) {
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
    }
}
