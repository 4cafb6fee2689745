//! Probe signal synthesis.
//!
//! Generates the linear chirp that the playback loop repeats for the whole session.

mod chirp;

pub use chirp::{ChirpBuffer, ChirpParameters, generate};
