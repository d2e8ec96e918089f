use std::{
    fs,
    path::PathBuf,
    sync::{Arc, Mutex as StdMutex},
};

use anyhow::{Context, Result};
use chrono::Utc;
use log::{error, info, warn};
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::{
    feedback::{FeedbackBroadcaster, FeedbackEvent},
    models::MovementFlag,
    sampling::{LocationSource, Sampler},
    selection::{SelectionConfig, Selector},
    settings::{SettingsStore, TrackerState, TrackerStateUpdate},
    trail::{TrailConsumer, TrailWriter},
};

use super::state::{RecordingSnapshot, SessionInfo};

struct ActiveSession {
    info: SessionInfo,
    sampler: Sampler,
}

/// Drives recording sessions from tracker state changes: starts and stops the
/// sampler, opens and closes trail files, keeps the stopped/moving flag in sync and
/// tells the UI what happened.
#[derive(Clone)]
pub struct RecordingController {
    session: Arc<Mutex<Option<ActiveSession>>>,
    settings: Arc<SettingsStore>,
    source: Arc<dyn LocationSource>,
    trail: TrailWriter,
    feedback: FeedbackBroadcaster,
    movement: MovementFlag,
}

impl RecordingController {
    pub fn new(
        settings: SettingsStore,
        source: Arc<dyn LocationSource>,
        trail: TrailWriter,
        feedback: FeedbackBroadcaster,
    ) -> Self {
        let movement = MovementFlag::new(settings.tracker_state().is_stopped);
        Self {
            session: Arc::new(Mutex::new(None)),
            settings: Arc::new(settings),
            source,
            trail,
            feedback,
            movement,
        }
    }

    pub fn subscribe_feedback(&self) -> broadcast::Receiver<FeedbackEvent> {
        self.feedback.subscribe()
    }

    pub fn tracker_state(&self) -> TrackerState {
        self.settings.tracker_state()
    }

    pub async fn snapshot(&self) -> RecordingSnapshot {
        let session = self.session.lock().await;
        RecordingSnapshot::new(
            self.settings.tracker_state(),
            session.as_ref().map(|active| active.info.clone()),
        )
    }

    /// Pick up a recording that was running when the process last exited.
    pub async fn resume(&self) -> Result<RecordingSnapshot> {
        if self.settings.tracker_state().is_recording {
            warn!("Recording was active at last shutdown; starting a new trail");
            self.start_session().await?;
        } else {
            self.feedback.publish(FeedbackEvent::Ready);
        }
        Ok(self.snapshot().await)
    }

    /// Apply a tracker state change: recording first, then stopped, then interval.
    ///
    /// A failed recording start does not prevent the other fields from being applied;
    /// its error is returned afterwards.
    pub async fn apply(&self, update: TrackerStateUpdate) -> Result<RecordingSnapshot> {
        update.validate()?;

        let recording_result = match update.is_recording {
            Some(should_record) => self.set_recording(should_record).await.map(|_| ()),
            None => Ok(()),
        };

        if let Some(is_stopped) = update.is_stopped {
            self.set_stopped(is_stopped)?;
        }

        if let Some(seconds) = update.recording_interval_secs {
            self.set_interval(seconds).await?;
        }

        recording_result?;
        Ok(self.snapshot().await)
    }

    /// Start or stop recording. Returns the closed trail path when a session ends.
    pub async fn set_recording(&self, should_record: bool) -> Result<Option<PathBuf>> {
        if should_record {
            self.start_session().await?;
            Ok(None)
        } else {
            self.finish_session(true).await
        }
    }

    pub fn set_stopped(&self, is_stopped: bool) -> Result<()> {
        self.settings
            .update(&TrackerStateUpdate::stopped(is_stopped))?;
        self.movement.set_stopped(is_stopped);
        info!("Changed to {}", if is_stopped { "stopped" } else { "moving" });
        self.feedback
            .publish(FeedbackEvent::MovementChanged { is_stopped });
        Ok(())
    }

    /// Flip stopped/moving, as the notification button does.
    pub fn toggle_movement(&self) -> Result<bool> {
        let is_stopped = !self.settings.tracker_state().is_stopped;
        self.set_stopped(is_stopped)?;
        Ok(is_stopped)
    }

    pub async fn set_interval(&self, seconds: u32) -> Result<()> {
        let state = self
            .settings
            .update(&TrackerStateUpdate::interval_secs(seconds))?;

        let mut session = self.session.lock().await;
        if let Some(active) = session.as_mut() {
            active.sampler.set_interval(state.recording_interval_ms())?;
            active.info.interval_ms = state.recording_interval_ms();
        }

        info!("Recording interval set to {seconds}s");
        self.feedback
            .publish(FeedbackEvent::IntervalChanged { seconds });
        Ok(())
    }

    /// Stop the active session but keep the persisted recording flag so the next
    /// launch resumes.
    pub async fn shutdown(&self) -> Result<Option<PathBuf>> {
        self.finish_session(false).await
    }

    async fn start_session(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            return Ok(());
        }

        let state = self.settings.tracker_state();
        let interval_ms = state.recording_interval_ms();
        let session_id = Uuid::new_v4().to_string();

        let trail_path = self.trail.new_trail_file().await?;

        let mut selector = Selector::new(SelectionConfig::new(interval_ms)?, self.movement.clone());
        selector.register_consumer(Box::new(TrailConsumer::new(self.trail.clone())));
        selector.register_consumer(Box::new(self.feedback.clone()));

        let mut sampler = Sampler::new(
            session_id.clone(),
            Arc::clone(&self.source),
            Arc::new(StdMutex::new(selector)),
        );

        self.feedback.publish(FeedbackEvent::AcquiringLocation);
        if let Err(err) = sampler.start(interval_ms).await {
            error!("Recording session {session_id} could not start: {err:#}");
            self.feedback.publish(FeedbackEvent::PermissionsRequired);
            self.discard_trail().await;
            self.settings
                .update(&TrackerStateUpdate::recording(false))?;
            return Err(err);
        }

        self.settings
            .update(&TrackerStateUpdate::recording(true))?;

        info!(
            "Recording session {} started, writing {}",
            session_id,
            trail_path.display()
        );
        *session = Some(ActiveSession {
            info: SessionInfo {
                id: session_id,
                started_at: Utc::now(),
                trail_path,
                interval_ms,
            },
            sampler,
        });

        self.feedback
            .publish(FeedbackEvent::RecordingChanged { started: true });
        Ok(())
    }

    async fn finish_session(&self, persist: bool) -> Result<Option<PathBuf>> {
        let mut session = self.session.lock().await;

        if persist {
            self.settings
                .update(&TrackerStateUpdate::recording(false))?;
        }

        let Some(mut active) = session.take() else {
            return Ok(None);
        };

        if let Err(err) = active.sampler.stop().await {
            error!("Failed to stop sampler for session {}: {err:#}", active.info.id);
        }

        let closed = self
            .trail
            .close_trail_file()
            .await
            .context("failed to close trail file")?;

        info!(
            "Recording session {} stopped after {}s",
            active.info.id,
            (Utc::now() - active.info.started_at).num_seconds()
        );
        self.feedback
            .publish(FeedbackEvent::RecordingChanged { started: false });
        Ok(closed)
    }

    async fn discard_trail(&self) {
        match self.trail.close_trail_file().await {
            Ok(Some(path)) => {
                if let Err(err) = fs::remove_file(&path) {
                    warn!("Failed to remove empty trail {}: {err}", path.display());
                }
            }
            Ok(None) => {}
            Err(err) => error!("Failed to close trail after refused start: {err:#}"),
        }
    }
}
