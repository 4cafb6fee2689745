//! record-signal - loop an ultrasonic chirp and record the microphone.
//!
//! Plays a linear chirp (17-20 kHz by default) back to back on the output
//! device while capturing the input device to a headerless 16-bit PCM file,
//! until interrupted or the optional run time elapses.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::LocalTime;

use record_signal::EngineError;
use record_signal::audio::util::list_devices;
use record_signal::audio::{CpalInput, CpalOutput, InputPermission};
use record_signal::config::AppConfig;
use record_signal::engine::{DuplexController, EngineEvent, Task};

/// Why the main loop stopped waiting.
enum StopReason {
    Signal,
    Timer,
    AllTasksFailed,
}

/// Wait for Ctrl+C or SIGTERM.
async fn wait_for_signal() {
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("🛑 Received Ctrl+C, stopping...");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                    }
                    Err(e) => {
                        warn!("Failed to register SIGTERM handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("🛑 Received SIGTERM, stopping...");
        }
    }
}

/// Sleep for `run_for` seconds, or forever when unset.
async fn wait_for_timer(run_for: Option<f64>) {
    match run_for {
        Some(secs) => tokio::time::sleep(Duration::from_secs_f64(secs)).await,
        None => std::future::pending::<()>().await,
    }
}

/// Run until a signal, the timer, or both loops failing.
async fn wait_for_stop(events: &mut mpsc::UnboundedReceiver<EngineEvent>, run_for: Option<f64>) -> StopReason {
    let mut failed: Vec<Task> = Vec::new();
    let signal = wait_for_signal();
    let timer = wait_for_timer(run_for);
    tokio::pin!(signal, timer);

    loop {
        tokio::select! {
            _ = &mut signal => return StopReason::Signal,
            _ = &mut timer => return StopReason::Timer,
            Some(event) = events.recv() => match event {
                EngineEvent::TaskFailed { task, message } => {
                    error!("❌ {} stopped: {}", task, message);
                    if !failed.contains(&task) {
                        failed.push(task);
                    }
                    if failed.len() == 2 {
                        return StopReason::AllTasksFailed;
                    }
                }
                other => debug!("Engine event: {:?}", other),
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let config = AppConfig::from_args();

    // Respect RUST_LOG env var, fallback to verbose flag, default to info
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| if config.verbose { EnvFilter::try_new("debug") } else { EnvFilter::try_new("info") })?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(LocalTime::new(time::macros::format_description!("[hour]:[minute]:[second]")))
        .init();

    if config.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    if config.list_devices {
        let (inputs, outputs) = list_devices()?;
        println!("Input devices:");
        for name in inputs {
            println!("  {}", name);
        }
        println!("Output devices:");
        for name in outputs {
            println!("  {}", name);
        }
        return Ok(());
    }

    info!("📡 record-signal v{}", env!("CARGO_PKG_VERSION"));

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("❌ Configuration error: {:#}", e);
        std::process::exit(1);
    }
    config.log_config();

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let controller = DuplexController::new(
        config.engine_config()?,
        Arc::new(CpalOutput::new(config.output_device.clone())),
        Arc::new(CpalInput::new(config.input_device.clone())),
        Arc::new(InputPermission::new(config.input_device.clone())),
    )
    .with_events(events_tx);
    let controller = Arc::new(controller);

    match controller.start() {
        Ok(()) => {}
        Err(EngineError::PermissionDenied) => {
            error!("❌ Audio recording permission required");
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    }

    match wait_for_stop(&mut events_rx, config.run_for).await {
        StopReason::Signal => {}
        StopReason::Timer => info!("⏱️  Run time elapsed"),
        StopReason::AllTasksFailed => warn!("Both playback and capture failed"),
    }

    controller.stop();

    // Loop threads block on device I/O, so wait for them off the runtime
    let joiner = controller.clone();
    let report = tokio::task::spawn_blocking(move || joiner.join()).await?;

    if let Some(report) = report {
        info!("Session summary:");
        report.log();
        if report.playback.is_err() || report.capture.is_err() {
            std::process::exit(1);
        }
    }

    info!("✅ Recording stopped and saved to {}", controller.output_path().display());
    Ok(())
}
