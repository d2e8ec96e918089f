use std::{fmt, str::FromStr};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::{Movement, Sample};

/// One line of a trail file: `latitude,longitude,timestampMs,Stopped|Moving`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrailEntry {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp_ms: i64,
    pub movement: Movement,
}

impl TrailEntry {
    pub fn from_sample(sample: &Sample, is_stopped: bool) -> Self {
        Self {
            latitude: sample.latitude,
            longitude: sample.longitude,
            timestamp_ms: sample.timestamp,
            movement: Movement::from_is_stopped(is_stopped),
        }
    }
}

impl fmt::Display for TrailEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.6},{:.6},{},{}",
            self.latitude,
            self.longitude,
            self.timestamp_ms,
            self.movement.as_str()
        )
    }
}

impl FromStr for TrailEntry {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut fields = line.trim().split(',');
        let mut next = |name: &str| {
            fields
                .next()
                .ok_or_else(|| anyhow!("trail line missing {name}"))
        };

        let latitude = next("latitude")?
            .parse::<f64>()
            .context("invalid latitude")?;
        let longitude = next("longitude")?
            .parse::<f64>()
            .context("invalid longitude")?;
        let timestamp_ms = next("timestamp")?
            .parse::<i64>()
            .context("invalid timestamp")?;
        let movement = match next("movement")? {
            "Stopped" => Movement::Stopped,
            "Moving" => Movement::Moving,
            other => bail!("unknown movement state '{other}'"),
        };

        if fields.next().is_some() {
            bail!("trail line has trailing fields");
        }

        Ok(Self {
            latitude,
            longitude,
            timestamp_ms,
            movement,
        })
    }
}
