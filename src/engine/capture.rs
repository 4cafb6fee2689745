//! Capture loop: streams input blocks to the sample file while running.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::audio::{InputDevice, InputGuard};
use crate::error::{DeviceError, EngineError, Result};

use super::state::RunState;
use super::writer::SampleFileWriter;

/// What a capture session wrote before it ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSummary {
    pub samples_written: u64,
    pub path: PathBuf,
}

impl CaptureSummary {
    pub fn bytes_written(&self) -> u64 {
        self.samples_written * 2
    }
}

/// Record from `device` into the file at `path` until `state` is stopped.
///
/// Teardown always runs in the same order: stop the session, release it,
/// then close the file. Samples already written are kept on failure.
///
/// # Errors
/// - `EngineError::PathUnwritable` if the file cannot be created
/// - `EngineError::CaptureIo` if the device fails or the file cannot be written
pub fn run(state: &RunState, device: &dyn InputDevice, sample_rate: u32, path: &Path) -> Result<CaptureSummary> {
    let buffer_frames = device.min_buffer_size(sample_rate).map_err(EngineError::CaptureIo)?;
    let mut guard = InputGuard::new(device.open(sample_rate, buffer_frames).map_err(EngineError::CaptureIo)?);
    let mut writer = SampleFileWriter::open(path)?;

    let recorded = record(state, &mut guard, &mut writer, buffer_frames);

    drop(guard);
    let closed = writer.close().map_err(|e| EngineError::CaptureIo(e.into()));

    if let Err(ref e) = recorded {
        warn!("Capture failed after {} samples, partial data kept in {}: {}", writer.samples_written(), path.display(), e);
    }
    recorded?;
    closed?;

    let summary = CaptureSummary { samples_written: writer.samples_written(), path: path.to_path_buf() };
    info!("Capture stopped: {} samples ({} bytes) in {}", summary.samples_written, summary.bytes_written(), path.display());
    Ok(summary)
}

/// Read blocks and forward each valid prefix until stopped.
fn record(state: &RunState, guard: &mut InputGuard, writer: &mut SampleFileWriter, buffer_frames: usize) -> Result<()> {
    guard.session().start_recording().map_err(EngineError::CaptureIo)?;
    info!("🎙️  Recording to {}", writer.path().display());

    let mut block = vec![0i16; buffer_frames];
    while state.is_running() {
        let read = guard.session().read(&mut block).map_err(EngineError::CaptureIo)?;
        if read > 0 {
            writer.write_samples(&block[..read]).map_err(|e| EngineError::CaptureIo(DeviceError::Io(e)))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::audio::testing::{Counters, FakeInput};
    use crate::engine::writer::read_samples;

    fn record_for(device: &FakeInput, path: &Path, millis: u64) -> Result<CaptureSummary> {
        let state = RunState::new();
        state.set_running();
        std::thread::scope(|scope| {
            let handle = scope.spawn(|| run(&state, device, 48000, path));
            std::thread::sleep(Duration::from_millis(millis));
            state.set_stopped();
            handle.join().unwrap()
        })
    }

    #[test]
    fn test_writes_captured_samples_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signal.pcm");
        let device = FakeInput::new();

        let summary = record_for(&device, &path, 30).unwrap();

        let stored = read_samples(&path).unwrap();
        assert!(!stored.is_empty());
        assert_eq!(stored, device.captured());
        assert_eq!(summary.samples_written, stored.len() as u64);
        assert_eq!(Counters::get(&device.counters.stops), 1);
        assert_eq!(Counters::get(&device.counters.releases), 1);
    }

    #[test]
    fn test_only_valid_prefix_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signal.pcm");
        let device = FakeInput::with_block(10).with_empty_reads();

        record_for(&device, &path, 30).unwrap();

        let stored = read_samples(&path).unwrap();
        assert_eq!(stored.len() % 10, 0);
        assert!(!stored.contains(&i16::MIN));
        assert_eq!(stored, device.captured());
    }

    #[test]
    fn test_stopped_state_leaves_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signal.pcm");
        std::fs::write(&path, [1u8, 2, 3, 4]).unwrap();
        let device = FakeInput::new();

        let summary = run(&RunState::new(), &device, 48000, &path).unwrap();

        assert_eq!(summary.samples_written, 0);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
        assert_eq!(Counters::get(&device.counters.releases), 1);
    }

    #[test]
    fn test_read_failure_keeps_partial_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signal.pcm");
        let device = FakeInput::failing_on_read(4);
        let state = RunState::new();
        state.set_running();

        let err = run(&state, &device, 48000, &path).unwrap_err();

        assert!(matches!(err, EngineError::CaptureIo(_)));
        assert_eq!(read_samples(&path).unwrap().len(), 3 * 64);
        assert_eq!(Counters::get(&device.counters.releases), 1);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_write_failure_releases_device() {
        let device = FakeInput::new();
        let state = RunState::new();
        state.set_running();

        // Writes to /dev/full fail with ENOSPC once the buffer flushes
        let err = run(&state, &device, 48000, Path::new("/dev/full")).unwrap_err();

        assert!(matches!(err, EngineError::CaptureIo(DeviceError::Io(_))));
        assert_eq!(Counters::get(&device.counters.stops), 1);
        assert_eq!(Counters::get(&device.counters.releases), 1);
    }

    #[test]
    fn test_unwritable_path_releases_device() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("signal.pcm");
        let device = FakeInput::new();
        let state = RunState::new();
        state.set_running();

        let err = run(&state, &device, 48000, &path).unwrap_err();

        assert!(matches!(err, EngineError::PathUnwritable { .. }));
        assert_eq!(Counters::get(&device.counters.starts), 0);
        assert_eq!(Counters::get(&device.counters.releases), 1);
    }
}
