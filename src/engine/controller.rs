//! Duplex controller: owns the run state and the lifecycle of both loops.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

use crate::audio::{CapturePermission, InputDevice, OutputDevice};
use crate::error::{EngineError, Result};
use crate::synth::{ChirpParameters, generate};

use super::capture::{self, CaptureSummary};
use super::playback::{self, PlaybackSummary};
use super::state::RunState;

/// Settings fixed for the lifetime of a controller.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub chirp: ChirpParameters,
    pub output_path: PathBuf,
}

/// Controller lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Running,
}

/// The two concurrent loops of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Playback,
    Capture,
}

impl Task {
    fn name(self) -> &'static str {
        match self {
            Task::Playback => "playback",
            Task::Capture => "capture",
        }
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Status notifications for whoever drives the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Started,
    Stopped,
    TaskFinished(Task),
    TaskFailed { task: Task, message: String },
}

/// Outcome of both loops of one session.
#[derive(Debug)]
pub struct SessionReport {
    pub playback: Result<PlaybackSummary>,
    pub capture: Result<CaptureSummary>,
}

impl SessionReport {
    /// Log the outcome of each loop.
    pub fn log(&self) {
        match &self.playback {
            Ok(summary) => info!("  Playback: {} chirps ({} samples)", summary.buffers_written, summary.samples_written),
            Err(e) => error!("  Playback: {}", e),
        }
        match &self.capture {
            Ok(summary) => info!("  Capture: {} samples ({} bytes) -> {}", summary.samples_written, summary.bytes_written(), summary.path.display()),
            Err(e) => error!("  Capture: {}", e),
        }
    }
}

/// Join handles of a running (or stopping) session.
struct ActiveSession {
    playback: JoinHandle<Result<PlaybackSummary>>,
    capture: JoinHandle<Result<CaptureSummary>>,
}

impl ActiveSession {
    fn join(self) -> SessionReport {
        SessionReport { playback: join_task(Task::Playback, self.playback), capture: join_task(Task::Capture, self.capture) }
    }
}

/// Starts and stops the playback and capture loops together.
///
/// `start` and `stop` are idempotent. `stop` only clears the run flag and
/// returns; the loops notice it after their current device call. A later
/// `start` (or `join`) waits for the previous session's threads so devices
/// are never opened twice.
pub struct DuplexController {
    config: EngineConfig,
    output: Arc<dyn OutputDevice>,
    input: Arc<dyn InputDevice>,
    permission: Arc<dyn CapturePermission>,
    state: RunState,
    session: Mutex<Option<ActiveSession>>, // Also serializes start/join
    events: Option<UnboundedSender<EngineEvent>>,
}

impl DuplexController {
    /// Create a stopped controller.
    ///
    /// # Arguments
    /// * `config` - Chirp parameters and capture file path
    /// * `output` - Device the chirp is played on
    /// * `input` - Device recorded to the file
    /// * `permission` - Capture authorization, checked on every start
    pub fn new(config: EngineConfig, output: Arc<dyn OutputDevice>, input: Arc<dyn InputDevice>, permission: Arc<dyn CapturePermission>) -> Self {
        Self { config, output, input, permission, state: RunState::new(), session: Mutex::new(None), events: None }
    }

    /// Send status events to `events`.
    pub fn with_events(mut self, events: UnboundedSender<EngineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Start playback and capture.
    ///
    /// No-op when already running.
    ///
    /// # Errors
    /// - `EngineError::PermissionDenied` if capture is not authorized; nothing is started
    /// - `EngineError::TaskSpawn` if a loop thread cannot be created
    pub fn start(&self) -> Result<()> {
        // Checked before locking: `join` holds the lock while a session runs
        if self.state.is_running() {
            debug!("Engine already running, ignoring start");
            return Ok(());
        }

        let mut session = self.session.lock();
        if self.state.is_running() {
            debug!("Engine started concurrently, ignoring start");
            return Ok(());
        }

        if !self.permission.is_granted() {
            warn!("Audio capture permission not granted");
            return Err(EngineError::PermissionDenied);
        }

        if let Some(previous) = session.take() {
            debug!("Waiting for previous session to release its devices");
            previous.join().log();
        }

        let buffer = generate(&self.config.chirp);

        // Announce before raising the flag so a racing stop's event comes last
        self.emit(EngineEvent::Started);
        self.state.set_running();

        let playback = {
            let state = self.state.clone();
            let device = self.output.clone();
            spawn_task(Task::Playback, self.events.clone(), move || playback::run(&buffer, &state, device.as_ref()))
        };
        let playback = match playback {
            Ok(handle) => handle,
            Err(e) => {
                self.stop();
                return Err(EngineError::TaskSpawn(e));
            }
        };

        let capture = {
            let state = self.state.clone();
            let device = self.input.clone();
            let sample_rate = self.config.chirp.sample_rate_hz();
            let path = self.config.output_path.clone();
            spawn_task(Task::Capture, self.events.clone(), move || capture::run(&state, device.as_ref(), sample_rate, &path))
        };
        let capture = match capture {
            Ok(handle) => handle,
            Err(e) => {
                self.stop();
                let _ = join_logged(Task::Playback, playback);
                return Err(EngineError::TaskSpawn(e));
            }
        };

        *session = Some(ActiveSession { playback, capture });
        info!("▶️  Engine started");
        Ok(())
    }

    /// Ask both loops to stop and return immediately.
    ///
    /// No-op when already stopped.
    pub fn stop(&self) {
        if !self.state.set_stopped() {
            debug!("Engine already stopped, ignoring stop");
            return;
        }
        info!("⏹️  Engine stopping");
        self.emit(EngineEvent::Stopped);
    }

    /// Wait for the current session's loops to finish.
    ///
    /// Returns `None` if no session was started since the last join. Blocks
    /// until someone calls `stop` (or both loops fail).
    pub fn join(&self) -> Option<SessionReport> {
        // Hold the lock so a concurrent start cannot reopen the devices early
        let mut session = self.session.lock();
        session.take().map(ActiveSession::join)
    }

    pub fn state(&self) -> EngineState {
        if self.state.is_running() { EngineState::Running } else { EngineState::Stopped }
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn output_path(&self) -> &Path {
        &self.config.output_path
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(events) = &self.events {
            // A dropped receiver just means nobody is listening
            let _ = events.send(event);
        }
    }
}

impl Drop for DuplexController {
    fn drop(&mut self) {
        self.stop();
        if let Some(session) = self.session.get_mut().take() {
            session.join().log();
        }
    }
}

/// Spawn a named loop thread that reports its outcome as an event.
fn spawn_task<T, F>(task: Task, events: Option<UnboundedSender<EngineEvent>>, body: F) -> std::io::Result<JoinHandle<Result<T>>>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    std::thread::Builder::new().name(format!("record-signal-{}", task)).spawn(move || {
        let result = body();
        let event = match &result {
            Ok(_) => {
                debug!("{} task finished", task);
                EngineEvent::TaskFinished(task)
            }
            Err(e) => {
                error!("❌ {} task failed: {}", task, e);
                EngineEvent::TaskFailed { task, message: e.to_string() }
            }
        };
        if let Some(events) = events {
            let _ = events.send(event);
        }
        result
    })
}

fn join_task<T>(task: Task, handle: JoinHandle<Result<T>>) -> Result<T> {
    handle.join().unwrap_or_else(|_| {
        warn!("{} task panicked", task);
        Err(EngineError::TaskPanicked(task.name()))
    })
}

/// Join a loop whose result nobody will report, logging any failure.
fn join_logged<T>(task: Task, handle: JoinHandle<Result<T>>) -> Result<T> {
    let result = join_task(task, handle);
    if let Err(e) = &result {
        error!("  {}: {}", task, e);
    }
    result
}
