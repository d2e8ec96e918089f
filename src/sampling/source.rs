use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex, MutexGuard, PoisonError,
};
use std::time::Duration;

use anyhow::{bail, Result};
use log::{debug, warn};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::models::Sample;

/// Capacity of the channel between a source and the sampling task.
pub const SAMPLE_BUFFER: usize = 64;

/// A best-effort provider of raw samples (GPS, network location, a replay file...).
///
/// `subscribe` asks for samples roughly every `sampling_interval`; nothing is
/// guaranteed about the actual rate and a source may deliver nothing at all.
/// Fails when the platform refuses the subscription, e.g. missing permission.
pub trait LocationSource: Send + Sync {
    fn subscribe(&self, sampling_interval: Duration) -> Result<mpsc::Receiver<Sample>>;

    /// Stop delivering. Must be safe to call when not subscribed.
    fn unsubscribe(&self);
}

/// Source fed by platform glue through [`ChannelSource::push`].
pub struct ChannelSource {
    authorized: AtomicBool,
    state: Mutex<ChannelSourceState>,
}

#[derive(Default)]
struct ChannelSourceState {
    sender: Option<mpsc::Sender<Sample>>,
    requested_interval: Option<Duration>,
}

impl ChannelSource {
    pub fn new() -> Self {
        Self {
            authorized: AtomicBool::new(true),
            state: Mutex::new(ChannelSourceState::default()),
        }
    }

    /// Mirrors the platform location permission. Only checked on `subscribe`.
    pub fn set_authorized(&self, authorized: bool) {
        self.authorized.store(authorized, Ordering::Release);
    }

    /// Deliver a sample to the current subscriber. Returns false when it was dropped.
    pub fn push(&self, sample: Sample) -> bool {
        let state = self.lock_state();
        let Some(sender) = state.sender.as_ref() else {
            debug!("dropping sample {sample}: no subscriber");
            return false;
        };

        match sender.try_send(sample) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("sample channel full, dropping {sample}");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.lock_state().sender.is_some()
    }

    /// Rate asked for by the last successful `subscribe`.
    pub fn requested_interval(&self) -> Option<Duration> {
        self.lock_state().requested_interval
    }

    fn lock_state(&self) -> MutexGuard<'_, ChannelSourceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ChannelSource {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationSource for ChannelSource {
    fn subscribe(&self, sampling_interval: Duration) -> Result<mpsc::Receiver<Sample>> {
        if !self.authorized.load(Ordering::Acquire) {
            bail!("location permission not granted");
        }

        let (tx, rx) = mpsc::channel(SAMPLE_BUFFER);
        let mut state = self.lock_state();
        state.sender = Some(tx);
        state.requested_interval = Some(sampling_interval);
        Ok(rx)
    }

    fn unsubscribe(&self) {
        self.lock_state().sender = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_only_while_subscribed() {
        let source = ChannelSource::new();
        assert!(!source.push(Sample::new(1.0, 2.0, 0, 5.0)));

        let mut rx = source.subscribe(Duration::from_millis(300)).unwrap();
        assert!(source.push(Sample::new(1.0, 2.0, 10, 5.0)));
        assert_eq!(rx.recv().await.unwrap().timestamp, 10);
        assert_eq!(source.requested_interval(), Some(Duration::from_millis(300)));

        source.unsubscribe();
        assert!(!source.is_subscribed());
        assert!(!source.push(Sample::new(1.0, 2.0, 20, 5.0)));
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn denied_subscription_is_an_error() {
        let source = ChannelSource::new();
        source.set_authorized(false);
        let err = source.subscribe(Duration::from_millis(300)).unwrap_err();
        assert!(err.to_string().contains("permission"));
        assert!(!source.is_subscribed());
    }

    #[test]
    fn full_channel_drops_samples() {
        let source = ChannelSource::new();
        let _rx = source.subscribe(Duration::ZERO).unwrap();
        for i in 0..SAMPLE_BUFFER {
            assert!(source.push(Sample::new(0.0, 0.0, i as i64, 1.0)));
        }
        assert!(!source.push(Sample::new(0.0, 0.0, 999, 1.0)));
    }
}
