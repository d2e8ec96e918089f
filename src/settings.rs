use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

const DEFAULT_RECORDING_INTERVAL_SECS: u32 = 1;

/// Recording on/off, stopped/moving and the reporting interval. Survives restarts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackerState {
    pub is_recording: bool,
    pub is_stopped: bool,
    pub recording_interval_secs: u32,
}

impl Default for TrackerState {
    fn default() -> Self {
        Self {
            is_recording: false,
            is_stopped: false,
            recording_interval_secs: DEFAULT_RECORDING_INTERVAL_SECS,
        }
    }
}

/// Partial change to a [`TrackerState`]; absent fields are left alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TrackerStateUpdate {
    pub is_recording: Option<bool>,
    pub is_stopped: Option<bool>,
    pub recording_interval_secs: Option<u32>,
}

impl TrackerStateUpdate {
    pub fn recording(is_recording: bool) -> Self {
        Self {
            is_recording: Some(is_recording),
            ..Self::default()
        }
    }

    pub fn stopped(is_stopped: bool) -> Self {
        Self {
            is_stopped: Some(is_stopped),
            ..Self::default()
        }
    }

    pub fn interval_secs(seconds: u32) -> Self {
        Self {
            recording_interval_secs: Some(seconds),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(0) = self.recording_interval_secs {
            bail!("recording interval must be at least 1 second");
        }
        Ok(())
    }
}

impl TrackerState {
    pub fn apply(&mut self, update: &TrackerStateUpdate) -> Result<()> {
        update.validate()?;
        if let Some(is_recording) = update.is_recording {
            self.is_recording = is_recording;
        }
        if let Some(is_stopped) = update.is_stopped {
            self.is_stopped = is_stopped;
        }
        if let Some(seconds) = update.recording_interval_secs {
            self.recording_interval_secs = seconds;
        }
        Ok(())
    }

    pub fn recording_interval_ms(&self) -> i64 {
        i64::from(self.recording_interval_secs) * 1000
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<TrackerState>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let mut data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            TrackerState::default()
        };

        if data.recording_interval_secs == 0 {
            data.recording_interval_secs = DEFAULT_RECORDING_INTERVAL_SECS;
        }

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn tracker_state(&self) -> TrackerState {
        self.data
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Apply and persist a partial update, returning the resulting state.
    pub fn update(&self, update: &TrackerStateUpdate) -> Result<TrackerState> {
        let mut guard = self
            .data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut next = guard.clone();
        next.apply(update)?;
        self.persist(&next)?;
        *guard = next.clone();
        Ok(next)
    }

    fn persist(&self, data: &TrackerState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory {}", parent.display())
            })?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
