//! record-signal: loop an acoustic chirp probe while recording the microphone.
//!
//! The duplex engine plays a deterministic linear chirp on the output device
//! and, at the same time, streams raw 16-bit PCM from the input device to a
//! file, until it is stopped.

pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod synth;

pub use error::{DeviceError, EngineError, Result};
