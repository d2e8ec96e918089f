use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::settings::TrackerState;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum RecordingStatus {
    #[default]
    Idle,
    Recording,
}

/// Details of the session currently being recorded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub trail_path: PathBuf,
    pub interval_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSnapshot {
    pub status: RecordingStatus,
    pub state: TrackerState,
    pub session: Option<SessionInfo>,
}

impl RecordingSnapshot {
    pub fn new(state: TrackerState, session: Option<SessionInfo>) -> Self {
        let status = if session.is_some() {
            RecordingStatus::Recording
        } else {
            RecordingStatus::Idle
        };
        Self {
            status,
            state,
            session,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.status == RecordingStatus::Recording
    }
}
