//! Playback loop: repeats the chirp buffer on the output device while running.

use tracing::{info, warn};

use crate::audio::{OutputDevice, OutputGuard};
use crate::error::{EngineError, Result};
use crate::synth::ChirpBuffer;

use super::state::RunState;

/// What a playback session did before it ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackSummary {
    pub buffers_written: u64,
    pub samples_written: u64,
}

/// Play `buffer` back to back until `state` is stopped.
///
/// The session is opened with the device's minimum buffer size and released
/// exactly once on every exit path, including a failed write.
///
/// # Errors
/// Returns `EngineError::PlaybackIo` if the device cannot be opened, started or written.
pub fn run(buffer: &ChirpBuffer, state: &RunState, device: &dyn OutputDevice) -> Result<PlaybackSummary> {
    let sample_rate = buffer.sample_rate_hz();
    let buffer_frames = device.min_buffer_size(sample_rate).map_err(EngineError::PlaybackIo)?;
    let mut guard = OutputGuard::new(device.open(sample_rate, buffer_frames).map_err(EngineError::PlaybackIo)?);

    guard.session().play().map_err(EngineError::PlaybackIo)?;
    info!("🔊 Looping {} sample chirp ({:.0} ms) at {} Hz", buffer.len(), buffer.duration_sec() * 1000.0, sample_rate);

    let mut summary = PlaybackSummary::default();
    while state.is_running() {
        match guard.session().write(buffer.samples()) {
            Ok(written) => {
                summary.buffers_written += 1;
                summary.samples_written += written as u64;
            }
            Err(e) => {
                warn!("Playback write failed after {} buffers", summary.buffers_written);
                return Err(EngineError::PlaybackIo(e));
            }
        }
    }

    drop(guard);
    info!("Playback stopped after {} buffers", summary.buffers_written);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::audio::testing::{Counters, FakeOutput};
    use crate::synth::{ChirpParameters, generate};

    fn chirp() -> ChirpBuffer {
        generate(&ChirpParameters::new(48000, 17000.0, 20000.0, 0.01, 1.0).unwrap())
    }

    #[test]
    fn test_stopped_state_opens_and_releases_without_writing() {
        let device = FakeOutput::new();
        let summary = run(&chirp(), &RunState::new(), &device).unwrap();

        assert_eq!(summary, PlaybackSummary::default());
        assert_eq!(Counters::get(&device.counters.opens), 1);
        assert_eq!(Counters::get(&device.counters.transfers), 0);
        assert_eq!(Counters::get(&device.counters.releases), 1);
    }

    #[test]
    fn test_writes_whole_buffer_until_stopped() {
        let device = FakeOutput::new();
        let state = RunState::new();
        state.set_running();

        let summary = std::thread::scope(|scope| {
            let handle = scope.spawn(|| run(&chirp(), &state, &device));
            std::thread::sleep(Duration::from_millis(30));
            state.set_stopped();
            handle.join().unwrap()
        })
        .unwrap();

        assert!(summary.buffers_written > 0);
        assert_eq!(summary.samples_written, summary.buffers_written * 480);
        assert_eq!(Counters::get(&device.counters.stops), 1);
        assert_eq!(Counters::get(&device.counters.releases), 1);
    }

    #[test]
    fn test_write_failure_releases_once() {
        let device = FakeOutput::failing_on_write(3);
        let state = RunState::new();
        state.set_running();

        let err = run(&chirp(), &state, &device).unwrap_err();

        assert!(matches!(err, EngineError::PlaybackIo(_)));
        assert_eq!(Counters::get(&device.counters.transfers), 3);
        assert_eq!(Counters::get(&device.counters.releases), 1);
        // The flag belongs to the controller
        assert!(state.is_running());
    }

    #[test]
    fn test_open_failure_is_playback_error() {
        let state = RunState::new();
        state.set_running();
        let err = run(&chirp(), &state, &FakeOutput::failing_open()).unwrap_err();
        assert!(matches!(err, EngineError::PlaybackIo(_)));
    }
}
