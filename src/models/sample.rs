//! Raw location sample model.
//!
//! A sample is one reading from a location source: position, the time it was taken
//! and the radius of its error. Samples are produced by a `LocationSource` and never
//! mutated afterwards.

use std::{fmt, str::FromStr};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub latitude: f64,
    pub longitude: f64,
    /// Milliseconds, non-decreasing per stream (not enforced).
    pub timestamp: i64,
    /// Error radius in meters, bigger is worse.
    pub accuracy: f64,
}

impl Sample {
    pub fn new(latitude: f64, longitude: f64, timestamp: i64, accuracy: f64) -> Self {
        Self {
            latitude,
            longitude,
            timestamp,
            accuracy,
        }
    }
}

/// Raw sample line as read by the replay source: `lat,lon,timestampMs,accuracy`.
impl FromStr for Sample {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.trim().split(',').map(str::trim).collect();
        if fields.len() != 4 {
            return Err(anyhow!(
                "expected 4 fields (lat,lon,timestampMs,accuracy), got {}",
                fields.len()
            ));
        }

        let latitude = fields[0]
            .parse::<f64>()
            .with_context(|| format!("invalid latitude '{}'", fields[0]))?;
        let longitude = fields[1]
            .parse::<f64>()
            .with_context(|| format!("invalid longitude '{}'", fields[1]))?;
        let timestamp = fields[2]
            .parse::<i64>()
            .with_context(|| format!("invalid timestamp '{}'", fields[2]))?;
        let accuracy = fields[3]
            .parse::<f64>()
            .with_context(|| format!("invalid accuracy '{}'", fields[3]))?;

        Ok(Self::new(latitude, longitude, timestamp, accuracy))
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.6}, {:.6}) @{}ms ±{}m",
            self.latitude, self.longitude, self.timestamp, self.accuracy
        )
    }
}
