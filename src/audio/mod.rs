//! Audio device layer.
//!
//! Defines the blocking device traits the engine loops drive, the scoped
//! guards that release sessions, and cpal implementations for real hardware.

mod capture;
pub mod device;
mod playback;
#[cfg(test)]
pub mod testing;
pub mod util;

pub use capture::{CpalInput, InputPermission};
pub use device::{CapturePermission, InputDevice, InputGuard, InputSession, OutputDevice, OutputGuard, OutputSession};
pub use playback::CpalOutput;
