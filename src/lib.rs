pub mod feedback;
pub mod models;
pub mod recording;
pub mod sampling;
pub mod selection;
pub mod settings;
pub mod trail;
mod utils;

use std::{
    env,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use feedback::{FeedbackBroadcaster, FeedbackLog};
use recording::RecordingController;
use sampling::{LocationSource, ReplaySource, SimulatedSource, SimulatedSourceConfig};
use settings::{SettingsStore, TrackerStateUpdate};
use trail::TrailWriter;

const DEFAULT_DATA_DIR: &str = "./stoptrack-data";
const DEFAULT_REPLAY_SPEED: f64 = 1.0;

fn build_source() -> Result<Arc<dyn LocationSource>> {
    match env::var_os("STOPTRACK_REPLAY") {
        Some(path) => {
            let speed = match env::var("STOPTRACK_REPLAY_SPEED") {
                Ok(raw) => raw
                    .parse::<f64>()
                    .with_context(|| format!("Invalid STOPTRACK_REPLAY_SPEED: {raw}"))?,
                Err(_) => DEFAULT_REPLAY_SPEED,
            };
            let source = ReplaySource::from_path(Path::new(&path), speed)?;
            log::info!(
                "Replaying {} recorded samples at {}x",
                source.len(),
                speed
            );
            Ok(Arc::new(source))
        }
        None => {
            log::info!("Using simulated location source");
            Ok(Arc::new(SimulatedSource::new(SimulatedSourceConfig::default())))
        }
    }
}

async fn handle_command(controller: &RecordingController, line: &str) -> Result<()> {
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some("s") | Some("stop") | Some("move") => {
            controller.toggle_movement()?;
        }
        Some("i") | Some("interval") => {
            let raw = parts.next().context("usage: interval <seconds>")?;
            let seconds = raw
                .parse::<u32>()
                .with_context(|| format!("not a number of seconds: {raw}"))?;
            controller
                .apply(TrackerStateUpdate::interval_secs(seconds))
                .await?;
        }
        Some("r") | Some("record") => {
            let recording = controller.snapshot().await.is_recording();
            if let Some(path) = controller.set_recording(!recording).await? {
                log::info!("Trail saved to {}", path.display());
            }
        }
        Some(other) => log::warn!("Unknown command: {other}"),
        None => {}
    }
    Ok(())
}

async fn run_tracker(data_dir: PathBuf) -> Result<()> {
    let settings = SettingsStore::new(data_dir.join("settings.json"))?;
    let trail = TrailWriter::new(&data_dir)?;
    let feedback = FeedbackBroadcaster::new();
    let source = build_source()?;

    let controller = RecordingController::new(settings, source, trail, feedback);
    let mut events = controller.subscribe_feedback();

    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => println!("{}", FeedbackLog::line(&event)),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("Dropped {skipped} status messages");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let snapshot = controller.resume().await?;
    if !snapshot.is_recording() {
        controller
            .apply(TrackerStateUpdate::recording(true))
            .await?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted, stopping recording");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let Err(err) = handle_command(&controller, line.trim()).await {
                        log::warn!("Command failed: {err:#}");
                    }
                }
                Ok(None) => {
                    tokio::signal::ctrl_c().await?;
                    log::info!("Interrupted, stopping recording");
                    break;
                }
                Err(err) => {
                    log::warn!("Failed to read stdin: {err}");
                    tokio::signal::ctrl_c().await?;
                    break;
                }
            },
        }
    }

    if let Some(path) = controller.set_recording(false).await? {
        log::info!("Trail saved to {}", path.display());
    }

    drop(controller);
    printer.abort();
    Ok(())
}

pub fn run() {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("StopTrack starting up...");

    let data_dir = env::var_os("STOPTRACK_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            log::error!("Failed to start async runtime: {err}");
            return;
        }
    };

    if let Err(err) = runtime.block_on(run_tracker(data_dir)) {
        log::error!("StopTrack exited with error: {err:#}");
    }
}
