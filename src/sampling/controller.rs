use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::{info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::selection::{config::validate_interval, Selector};

use super::loop_worker::{lock_selector, sampling_loop};
use super::source::LocationSource;

/// Fraction of the reporting interval requested from the source. Sources rarely honour
/// the requested rate, so ask for roughly three samples per report.
pub const SAMPLING_RATE_FACTOR: f64 = 0.3;

pub fn sampling_interval_for(reporting_interval_ms: i64) -> Duration {
    let millis = (reporting_interval_ms as f64 * SAMPLING_RATE_FACTOR) as u64;
    Duration::from_millis(millis)
}

/// Cloneable handle that stops a running sampler without waiting for it.
///
/// Safe to call from inside a consumer callback: it only cancels and unsubscribes;
/// the sampling task resets the selector once the callback has returned.
#[derive(Clone)]
pub struct StopHandle {
    source: Arc<dyn LocationSource>,
    cancel_token: CancellationToken,
}

impl StopHandle {
    pub fn stop(&self) {
        if self.cancel_token.is_cancelled() {
            return;
        }
        // Cancel before unsubscribing; the loop must see cancellation ahead of a closed channel.
        self.cancel_token.cancel();
        self.source.unsubscribe();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// Owns the subscription to a location source and feeds the selector.
pub struct Sampler {
    session_id: String,
    source: Arc<dyn LocationSource>,
    selector: Arc<Mutex<Selector>>,
    handle: Option<JoinHandle<()>>,
    stop_handle: Option<StopHandle>,
}

impl Sampler {
    pub fn new(
        session_id: String,
        source: Arc<dyn LocationSource>,
        selector: Arc<Mutex<Selector>>,
    ) -> Self {
        Self {
            session_id,
            source,
            selector,
            handle: None,
            stop_handle: None,
        }
    }

    /// Subscribe at `0.3 × reporting_interval_ms` and start forwarding samples.
    ///
    /// A refused subscription leaves the sampler untouched and is returned as an
    /// error; callers log it and may call `start` again.
    pub async fn start(&mut self, reporting_interval_ms: i64) -> Result<()> {
        if self.handle.is_some() {
            bail!("sampler already started");
        }
        validate_interval(reporting_interval_ms)?;

        let sampling_interval = sampling_interval_for(reporting_interval_ms);
        let samples = match self.source.subscribe(sampling_interval) {
            Ok(rx) => rx,
            Err(err) => {
                warn!(
                    "location subscription refused for session {}: {err:#}",
                    self.session_id
                );
                return Err(err.context("location subscription refused"));
            }
        };

        lock_selector(&self.selector).set_interval(reporting_interval_ms)?;

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(sampling_loop(
            self.session_id.clone(),
            samples,
            Arc::clone(&self.selector),
            cancel_token.clone(),
        ));

        info!(
            "sampling started for session {}: report every {}ms, requesting every {}ms",
            self.session_id,
            reporting_interval_ms,
            sampling_interval.as_millis()
        );

        self.handle = Some(handle);
        self.stop_handle = Some(StopHandle {
            source: Arc::clone(&self.source),
            cancel_token,
        });
        Ok(())
    }

    /// Unsubscribe, wait for the sampling task and reset the selector. Idempotent.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(stop_handle) = self.stop_handle.take() {
            stop_handle.stop();
        }

        let joined = match self.handle.take() {
            Some(handle) => handle.await.context("sampling loop task failed to join"),
            None => Ok(()),
        };

        lock_selector(&self.selector).reset();
        joined
    }

    /// Forward a new reporting interval to the live selector.
    pub fn set_interval(&self, reporting_interval_ms: i64) -> Result<()> {
        lock_selector(&self.selector).set_interval(reporting_interval_ms)
    }

    pub fn stop_handle(&self) -> Option<StopHandle> {
        self.stop_handle.clone()
    }

    pub fn is_running(&self) -> bool {
        self.stop_handle
            .as_ref()
            .map(|handle| !handle.is_stopped())
            .unwrap_or(false)
    }

    pub fn selector(&self) -> Arc<Mutex<Selector>> {
        Arc::clone(&self.selector)
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        if let Some(stop_handle) = self.stop_handle.take() {
            stop_handle.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MovementFlag, Sample};
    use crate::sampling::source::ChannelSource;
    use crate::selection::SelectionConfig;

    fn at(timestamp: i64, accuracy: f64) -> Sample {
        Sample::new(51.5, -0.12, timestamp, accuracy)
    }

    fn sampler_with_sink() -> (
        Sampler,
        Arc<ChannelSource>,
        tokio::sync::mpsc::UnboundedReceiver<Sample>,
    ) {
        let source = Arc::new(ChannelSource::new());
        let mut selector = Selector::new(SelectionConfig::default(), MovementFlag::default());
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        selector.register_consumer(Box::new(move |sample: &Sample, _: bool| {
            let _ = tx.send(*sample);
        }));
        let sampler = Sampler::new(
            "test-session".into(),
            source.clone(),
            Arc::new(Mutex::new(selector)),
        );
        (sampler, source, rx)
    }

    #[test]
    fn sampling_interval_is_three_tenths() {
        assert_eq!(sampling_interval_for(1000), Duration::from_millis(300));
        assert_eq!(sampling_interval_for(5000), Duration::from_millis(1500));
        assert_eq!(sampling_interval_for(1), Duration::ZERO);
    }

    #[tokio::test]
    async fn forwards_samples_and_emits_on_boundary() {
        let (mut sampler, source, mut emitted) = sampler_with_sink();
        sampler.start(1000).await.unwrap();
        assert_eq!(source.requested_interval(), Some(Duration::from_millis(300)));
        assert!(sampler.is_running());

        source.push(at(0, 10.0));
        source.push(at(400, 5.0));
        source.push(at(1000, 20.0));

        assert_eq!(emitted.recv().await, Some(at(1000, 20.0)));
        sampler.stop().await.unwrap();
        assert!(!source.is_subscribed());
    }

    #[tokio::test]
    async fn refused_subscription_holds_no_state() {
        let (mut sampler, source, _emitted) = sampler_with_sink();
        source.set_authorized(false);

        assert!(sampler.start(1000).await.is_err());
        assert!(!sampler.is_running());
        assert!(sampler.stop_handle().is_none());

        source.set_authorized(true);
        sampler.start(2000).await.unwrap();
        assert_eq!(lock_selector(&sampler.selector()).interval_ms(), 2000);
        sampler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn rejects_double_start_and_bad_interval() {
        let (mut sampler, _source, _emitted) = sampler_with_sink();
        assert!(sampler.start(0).await.is_err());
        sampler.start(1000).await.unwrap();
        assert!(sampler.start(1000).await.is_err());
        sampler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_resets_selector_and_is_idempotent() {
        let (mut sampler, source, _emitted) = sampler_with_sink();
        sampler.stop().await.unwrap();

        sampler.start(1000).await.unwrap();
        source.push(at(0, 10.0));
        // let the loop pick the sample up
        while lock_selector(&sampler.selector()).window().last_reported.is_none() {
            tokio::task::yield_now().await;
        }

        sampler.stop().await.unwrap();
        sampler.stop().await.unwrap();
        let selector = sampler.selector();
        let selector = lock_selector(&selector);
        assert!(selector.window().last_reported.is_none());
        assert!(selector.window().best_candidate.is_none());
    }

    #[tokio::test]
    async fn stop_handle_lets_the_loop_reset_the_selector() {
        let (mut sampler, source, _emitted) = sampler_with_sink();
        sampler.start(1000).await.unwrap();
        source.push(at(0, 10.0));
        while lock_selector(&sampler.selector()).window().last_reported.is_none() {
            tokio::task::yield_now().await;
        }

        let stop_handle = sampler.stop_handle().unwrap();
        stop_handle.stop();
        assert!(stop_handle.is_stopped());
        assert!(!source.is_subscribed());

        // the loop sees the cancellation, not a closed channel, and resets on its own
        tokio::time::timeout(Duration::from_secs(5), async {
            while lock_selector(&sampler.selector()).window().last_reported.is_some() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("sampling loop did not reset the selector");

        sampler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_from_inside_a_consumer() {
        let source = Arc::new(ChannelSource::new());
        let selector = Arc::new(Mutex::new(Selector::new(
            SelectionConfig::default(),
            MovementFlag::default(),
        )));
        let mut sampler = Sampler::new("reentrant".into(), source.clone(), selector.clone());
        sampler.start(1000).await.unwrap();

        let stop_handle = sampler.stop_handle().unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        lock_selector(&selector).register_consumer(Box::new(move |sample: &Sample, _: bool| {
            stop_handle.stop();
            let _ = tx.send(*sample);
        }));

        source.push(at(0, 10.0));
        source.push(at(1000, 1.0));
        assert_eq!(rx.recv().await, Some(at(1000, 1.0)));

        // unsubscribed from within the callback; later pushes go nowhere
        assert!(!source.push(at(2000, 1.0)));
        sampler.stop().await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
