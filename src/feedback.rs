//! User-facing status messages and their broadcast to whatever UI is listening.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::models::Sample;
use crate::selection::SampleConsumer;

const FEEDBACK_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum FeedbackEvent {
    RecordingChanged { started: bool },
    MovementChanged { is_stopped: bool },
    IntervalChanged { seconds: u32 },
    LocationChanged { sample: Sample },
    PermissionsRequired,
    Ready,
    AcquiringLocation,
}

impl FeedbackEvent {
    pub fn message(&self) -> String {
        match self {
            FeedbackEvent::RecordingChanged { started } => {
                format!("{} recording", if *started { "Started" } else { "Stopped" })
            }
            FeedbackEvent::MovementChanged { is_stopped } => {
                format!("You are {}", if *is_stopped { "stopped" } else { "moving" })
            }
            FeedbackEvent::IntervalChanged { seconds } => {
                format!("Recording interval set to {seconds}s")
            }
            FeedbackEvent::LocationChanged { sample } => {
                format!("Got location, accuracy: {}m", sample.accuracy)
            }
            FeedbackEvent::PermissionsRequired => {
                "You need to accept that permissions pop-up".to_string()
            }
            FeedbackEvent::Ready => "Ready".to_string(),
            FeedbackEvent::AcquiringLocation => "Acquiring location".to_string(),
        }
    }
}

/// Formats events as the single status line shown to the user.
pub struct FeedbackLog;

impl FeedbackLog {
    pub fn line(event: &FeedbackEvent) -> String {
        Self::line_at(event, Local::now())
    }

    pub fn line_at(event: &FeedbackEvent, at: DateTime<Local>) -> String {
        format!("Log: {} ({})", event.message(), at.format("%H:%M:%S"))
    }
}

/// Fan-out of feedback events. Publishing with nobody subscribed is fine.
#[derive(Clone)]
pub struct FeedbackBroadcaster {
    tx: broadcast::Sender<FeedbackEvent>,
}

impl FeedbackBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FEEDBACK_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedbackEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: FeedbackEvent) {
        log::debug!("feedback: {}", event.message());
        let _ = self.tx.send(event);
    }
}

impl Default for FeedbackBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleConsumer for FeedbackBroadcaster {
    fn consume(&self, sample: &Sample, _is_stopped: bool) {
        self.publish(FeedbackEvent::LocationChanged { sample: *sample });
    }
}
