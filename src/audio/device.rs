//! Device abstractions used by the engine loops.
//!
//! A device is a cheap, thread-safe factory. Sessions are opened on the thread
//! that drives them and are never shared, so they carry no `Send` bound.

use tracing::warn;

use crate::error::DeviceError;

/// Streaming output for mono 16-bit samples.
pub trait OutputDevice: Send + Sync {
    /// Minimum buffer size in frames the device accepts at `sample_rate`.
    fn min_buffer_size(&self, sample_rate: u32) -> Result<usize, DeviceError>;

    /// Open a streaming session sized to `buffer_frames`.
    fn open(&self, sample_rate: u32, buffer_frames: usize) -> Result<Box<dyn OutputSession>, DeviceError>;
}

/// An open output stream.
pub trait OutputSession {
    fn play(&mut self) -> Result<(), DeviceError>;

    /// Queue every sample, blocking until the device has accepted them all.
    fn write(&mut self, samples: &[i16]) -> Result<usize, DeviceError>;

    fn stop(&mut self) -> Result<(), DeviceError>;

    /// Release the underlying stream. Called exactly once, by the owning guard.
    fn release(&mut self);
}

/// Streaming input of mono 16-bit samples.
pub trait InputDevice: Send + Sync {
    /// Minimum buffer size in frames the device delivers at `sample_rate`.
    fn min_buffer_size(&self, sample_rate: u32) -> Result<usize, DeviceError>;

    fn open(&self, sample_rate: u32, buffer_frames: usize) -> Result<Box<dyn InputSession>, DeviceError>;
}

/// An open input stream.
pub trait InputSession {
    fn start_recording(&mut self) -> Result<(), DeviceError>;

    /// Fill a prefix of `buf`, blocking until at least one sample is available.
    /// Returns the number of valid samples.
    fn read(&mut self, buf: &mut [i16]) -> Result<usize, DeviceError>;

    fn stop(&mut self) -> Result<(), DeviceError>;

    fn release(&mut self);
}

/// Authorization check for microphone capture.
pub trait CapturePermission: Send + Sync {
    fn is_granted(&self) -> bool;
}

impl<F> CapturePermission for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_granted(&self) -> bool {
        self()
    }
}

/// Owns an output session and stops and releases it exactly once when dropped.
pub struct OutputGuard {
    session: Box<dyn OutputSession>,
}

impl OutputGuard {
    pub fn new(session: Box<dyn OutputSession>) -> Self {
        Self { session }
    }

    pub fn session(&mut self) -> &mut dyn OutputSession {
        &mut *self.session
    }
}

impl Drop for OutputGuard {
    fn drop(&mut self) {
        if let Err(e) = self.session.stop() {
            warn!("Failed to stop output session: {}", e);
        }
        self.session.release();
    }
}

/// Owns an input session and stops and releases it exactly once when dropped.
pub struct InputGuard {
    session: Box<dyn InputSession>,
}

impl InputGuard {
    pub fn new(session: Box<dyn InputSession>) -> Self {
        Self { session }
    }

    pub fn session(&mut self) -> &mut dyn InputSession {
        &mut *self.session
    }
}

impl Drop for InputGuard {
    fn drop(&mut self) {
        if let Err(e) = self.session.stop() {
            warn!("Failed to stop input session: {}", e);
        }
        self.session.release();
    }
}
