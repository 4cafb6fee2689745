//! Duplex audio engine.
//!
//! Two loops run concurrently while the shared run flag is set: playback
//! repeats the chirp on the output device, capture streams the input device
//! to a raw PCM file. The controller starts and stops them together.

mod capture;
mod controller;
mod playback;
mod state;
pub mod writer;

pub use capture::CaptureSummary;
pub use controller::{DuplexController, EngineConfig, EngineEvent, EngineState, SessionReport, Task};
pub use playback::PlaybackSummary;
pub use state::RunState;
pub use writer::SampleFileWriter;
