use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::models::Sample;

use super::source::{LocationSource, SAMPLE_BUFFER};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Replays a recorded raw sample file (`lat,lon,timestampMs,accuracy` per line).
///
/// Deliveries are paced by the gaps between timestamps divided by `speed`. Blank
/// lines and `#` comments are skipped. The channel closes after the last sample.
pub struct ReplaySource {
    samples: Arc<Vec<Sample>>,
    speed: f64,
    cancel_token: Mutex<Option<CancellationToken>>,
}

impl ReplaySource {
    pub fn new(samples: Vec<Sample>, speed: f64) -> Result<Self> {
        if !speed.is_finite() || speed <= 0.0 {
            bail!("replay speed must be positive and finite (got {speed})");
        }
        Ok(Self {
            samples: Arc::new(samples),
            speed,
            cancel_token: Mutex::new(None),
        })
    }

    pub fn from_path(path: &Path, speed: f64) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read replay file {}", path.display()))?;
        let samples = parse_samples(&contents)
            .with_context(|| format!("failed to parse replay file {}", path.display()))?;
        log_info!("loaded {} samples from {}", samples.len(), path.display());
        Self::new(samples, speed)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Wall-clock wait before delivering a sample recorded `gap_ms` after the previous one.
/// `None` when the scaled gap does not fit in a `Duration`.
fn pacing_delay(gap_ms: i64, speed: f64) -> Option<Duration> {
    let seconds = gap_ms.max(0) as f64 / speed / 1000.0;
    Duration::try_from_secs_f64(seconds).ok()
}

fn parse_samples(contents: &str) -> Result<Vec<Sample>> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(idx, line)| {
            line.parse::<Sample>()
                .map_err(|err| anyhow!("line {}: {err}", idx + 1))
        })
        .collect()
}

impl LocationSource for ReplaySource {
    // Recorded timestamps already carry the real arrival pattern.
    fn subscribe(&self, _sampling_interval: Duration) -> Result<mpsc::Receiver<Sample>> {
        let runtime = Handle::try_current().context("replay source needs a tokio runtime")?;

        self.unsubscribe();

        let (tx, rx) = mpsc::channel(SAMPLE_BUFFER);
        let token = CancellationToken::new();
        *self
            .cancel_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(token.clone());

        runtime.spawn(replay(tx, Arc::clone(&self.samples), self.speed, token));
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

async fn replay(
    tx: mpsc::Sender<Sample>,
    samples: Arc<Vec<Sample>>,
    speed: f64,
    cancel_token: CancellationToken,
) {
    let mut previous: Option<i64> = None;

    for sample in samples.iter().copied() {
        if let Some(prev) = previous {
            let gap_ms = sample.timestamp.saturating_sub(prev);
            let Some(delay) = pacing_delay(gap_ms, speed) else {
                log_error!(
                    "replay gap of {}ms at speed {} is too long to wait for, stopping replay",
                    gap_ms,
                    speed
                );
                return;
            };
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel_token.cancelled() => return,
            }
        }
        previous = Some(sample.timestamp);

        if tx.send(sample).await.is_err() {
            log_warn!("replay receiver dropped, stopping replay");
            return;
        }
    }

    log_info!("replay finished after {} samples", samples.len());
}
