//! Synthetic location source.
//!
//! Walks a position around a starting point and delivers fixes at an irregular rate
//! (between one and three requested intervals apart), with random accuracy and the
//! occasional missed fix, which is roughly what a phone GPS does indoors.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::models::Sample;

use super::source::{LocationSource, SAMPLE_BUFFER};

const ENABLE_LOGS: bool = true;

use crate::log_info;

// Degrees per step, about 10m at mid latitudes.
const STEP_DEGREES: f64 = 0.0001;
const MIN_ACCURACY_M: f64 = 3.0;
const MAX_ACCURACY_M: f64 = 40.0;
const MISSED_FIX_PROBABILITY: f64 = 0.1;

#[derive(Debug, Clone)]
pub struct SimulatedSourceConfig {
    pub start_latitude: f64,
    pub start_longitude: f64,
    pub seed: Option<u64>,
}

impl Default for SimulatedSourceConfig {
    fn default() -> Self {
        Self {
            start_latitude: -31.9505,
            start_longitude: 115.8605,
            seed: None,
        }
    }
}

pub struct SimulatedSource {
    config: SimulatedSourceConfig,
    cancel_token: Mutex<Option<CancellationToken>>,
}

impl SimulatedSource {
    pub fn new(config: SimulatedSourceConfig) -> Self {
        Self {
            config,
            cancel_token: Mutex::new(None),
        }
    }
}

impl LocationSource for SimulatedSource {
    fn subscribe(&self, sampling_interval: Duration) -> Result<mpsc::Receiver<Sample>> {
        let runtime = Handle::try_current().context("simulated source needs a tokio runtime")?;

        self.unsubscribe();

        let (tx, rx) = mpsc::channel(SAMPLE_BUFFER);
        let token = CancellationToken::new();
        *self
            .cancel_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(token.clone());

        let rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let start = (self.config.start_latitude, self.config.start_longitude);

        log_info!(
            "simulated source subscribed, requested interval {}ms",
            sampling_interval.as_millis()
        );
        runtime.spawn(walk(tx, rng, start, sampling_interval, token));
        Ok(rx)
    }

    fn unsubscribe(&self) {
        let previous = self
            .cancel_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(token) = previous {
            token.cancel();
        }
    }
}

async fn walk(
    tx: mpsc::Sender<Sample>,
    mut rng: StdRng,
    start: (f64, f64),
    sampling_interval: Duration,
    cancel_token: CancellationToken,
) {
    let (mut latitude, mut longitude) = start;
    let base_ms = (sampling_interval.as_millis() as u64).max(1);

    loop {
        let delay = Duration::from_millis(rng.gen_range(base_ms..=base_ms * 3));
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel_token.cancelled() => break,
        }

        latitude += rng.gen_range(-STEP_DEGREES..=STEP_DEGREES);
        longitude += rng.gen_range(-STEP_DEGREES..=STEP_DEGREES);

        if rng.gen_bool(MISSED_FIX_PROBABILITY) {
            continue;
        }

        let sample = Sample::new(
            latitude,
            longitude,
            Utc::now().timestamp_millis(),
            rng.gen_range(MIN_ACCURACY_M..MAX_ACCURACY_M),
        );
        if tx.send(sample).await.is_err() {
            break;
        }
    }
}
