use anyhow::Result;
use log::debug;

use crate::models::{MovementFlag, Sample};

use super::config::{validate_interval, SelectionConfig};
use super::scoring::beats;

/// Receives every emitted sample together with the stopped/moving flag.
///
/// Called synchronously from the sampling task; implementations must return quickly
/// and hand any slow work (disk, UI) to their own thread or channel.
pub trait SampleConsumer: Send {
    fn consume(&self, sample: &Sample, is_stopped: bool);
}

impl<F> SampleConsumer for F
where
    F: Fn(&Sample, bool) + Send,
{
    fn consume(&self, sample: &Sample, is_stopped: bool) {
        self(sample, is_stopped)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorPhase {
    /// Nothing buffered since the last report or session start.
    Idle,
    /// At least one sample buffered, window not yet elapsed.
    Candidate,
}

/// Per-session selection state. Lives for one recording session.
#[derive(Debug, Clone)]
pub struct ReportingWindow {
    pub last_reported: Option<Sample>,
    pub best_candidate: Option<Sample>,
    pub interval_ms: i64,
}

/// Picks one sample per reporting interval out of an irregular stream.
pub struct Selector {
    window: ReportingWindow,
    phase: SelectorPhase,
    movement: MovementFlag,
    consumers: Vec<Box<dyn SampleConsumer>>,
}

impl Selector {
    pub fn new(config: SelectionConfig, movement: MovementFlag) -> Self {
        Self {
            window: ReportingWindow {
                last_reported: None,
                best_candidate: None,
                interval_ms: config.interval_ms,
            },
            phase: SelectorPhase::Idle,
            movement,
            consumers: Vec::new(),
        }
    }

    /// Feed one raw sample. Returns the emitted sample when the window elapsed.
    ///
    /// At most one emission per call; consumers are notified in registration order
    /// before the emitted sample becomes the new reference point.
    pub fn on_sample(&mut self, sample: Sample) -> Option<Sample> {
        let interval_ms = self.window.interval_ms;

        let (reference, best) = match (self.window.last_reported, self.window.best_candidate) {
            (Some(reference), Some(current)) => {
                let best = if beats(&reference, &current, &sample, interval_ms) {
                    sample
                } else {
                    current
                };
                (reference, best)
            }
            // First sample of the session (or after a reset) is the reference point.
            _ => (sample, sample),
        };

        self.window.last_reported = Some(reference);
        self.window.best_candidate = Some(best);

        let elapsed = best.timestamp.saturating_sub(reference.timestamp);
        if elapsed < interval_ms {
            self.phase = SelectorPhase::Candidate;
            return None;
        }

        let is_stopped = self.movement.is_stopped();
        debug!(
            "emitting sample {} after {}ms to {} consumer(s)",
            best,
            elapsed,
            self.consumers.len()
        );
        for consumer in &self.consumers {
            consumer.consume(&best, is_stopped);
        }

        // The emitted sample, not the triggering one, is the new reference.
        self.window.last_reported = Some(best);
        self.phase = SelectorPhase::Idle;
        Some(best)
    }

    /// Forget the current window. The next sample behaves as the first one.
    pub fn reset(&mut self) {
        self.window.last_reported = None;
        self.window.best_candidate = None;
        self.phase = SelectorPhase::Idle;
    }

    /// Change the reporting interval. Applies from the next `on_sample`; a pending
    /// candidate is not re-evaluated.
    pub fn set_interval(&mut self, interval_ms: i64) -> Result<()> {
        validate_interval(interval_ms)?;
        self.window.interval_ms = interval_ms;
        Ok(())
    }

    pub fn register_consumer(&mut self, consumer: Box<dyn SampleConsumer>) {
        self.consumers.push(consumer);
    }

    pub fn interval_ms(&self) -> i64 {
        self.window.interval_ms
    }

    pub fn phase(&self) -> SelectorPhase {
        self.phase
    }

    pub fn window(&self) -> &ReportingWindow {
        &self.window
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn at(timestamp: i64, accuracy: f64) -> Sample {
        Sample::new(-31.95, 115.86, timestamp, accuracy)
    }

    fn selector(interval_ms: i64) -> (Selector, Arc<Mutex<Vec<(Sample, bool)>>>) {
        let emitted = Arc::new(Mutex::new(Vec::new()));
        let mut selector = Selector::new(
            SelectionConfig::new(interval_ms).unwrap(),
            MovementFlag::default(),
        );
        let sink = Arc::clone(&emitted);
        selector.register_consumer(Box::new(move |sample: &Sample, is_stopped: bool| {
            sink.lock().unwrap().push((*sample, is_stopped));
        }));
        (selector, emitted)
    }

    #[test]
    fn first_sample_becomes_reference_and_candidate() {
        let (mut selector, emitted) = selector(1000);
        assert_eq!(selector.phase(), SelectorPhase::Idle);

        assert_eq!(selector.on_sample(at(0, 10.0)), None);

        let window = selector.window();
        assert_eq!(window.last_reported, Some(at(0, 10.0)));
        assert_eq!(window.best_candidate, Some(at(0, 10.0)));
        assert_eq!(selector.phase(), SelectorPhase::Candidate);
        assert!(emitted.lock().unwrap().is_empty());
    }

    #[test]
    fn more_accurate_early_sample_takes_candidacy() {
        let (mut selector, emitted) = selector(1000);
        selector.on_sample(at(0, 10.0));
        assert_eq!(selector.on_sample(at(400, 5.0)), None);

        assert_eq!(selector.window().best_candidate, Some(at(400, 5.0)));
        assert_eq!(selector.window().last_reported, Some(at(0, 10.0)));
        assert!(emitted.lock().unwrap().is_empty());
    }

    #[test]
    fn boundary_sample_is_emitted_and_becomes_reference() {
        let (mut selector, emitted) = selector(1000);
        selector.on_sample(at(0, 10.0));
        selector.on_sample(at(400, 5.0));

        assert_eq!(selector.on_sample(at(1000, 20.0)), Some(at(1000, 20.0)));

        assert_eq!(selector.window().last_reported, Some(at(1000, 20.0)));
        assert_eq!(selector.phase(), SelectorPhase::Idle);
        assert_eq!(*emitted.lock().unwrap(), vec![(at(1000, 20.0), false)]);
    }

    #[test]
    fn candidate_tracks_best_sample_within_window() {
        let (mut selector, emitted) = selector(1000);
        selector.on_sample(at(0, 10.0));
        // exactly on the boundary: score 0, emitted at once
        selector.on_sample(at(1000, 8.0));
        assert_eq!(selector.window().last_reported, Some(at(1000, 8.0)));

        selector.on_sample(at(1100, 1.0)); // 1 * 0.9 = 0.9 beats 8
        selector.on_sample(at(1900, 50.0)); // 50 * 0.1 = 5 loses
        assert_eq!(selector.window().best_candidate, Some(at(1100, 1.0)));

        let fired = selector.on_sample(at(2000, 100.0)); // 0 beats 0.9
        assert_eq!(fired, Some(at(2000, 100.0)));
        assert_eq!(emitted.lock().unwrap().len(), 2);
    }

    #[test]
    fn emitted_sample_can_differ_from_trigger() {
        let (mut selector, emitted) = selector(1000);
        selector.on_sample(at(0, 10.0));
        selector.on_sample(at(600, 5.0));
        selector.set_interval(500).unwrap();

        // out of order and inaccurate: 50 * (1 - 0.2) = 40 loses to 5 * (1 - 1.2) = -1
        let fired = selector.on_sample(at(100, 50.0));
        assert_eq!(fired, Some(at(600, 5.0)));
        assert_eq!(selector.window().last_reported, Some(at(600, 5.0)));
        assert_eq!(emitted.lock().unwrap().len(), 1);
    }

    #[test]
    fn ties_keep_the_held_candidate() {
        let (mut selector, _) = selector(1000);
        selector.on_sample(at(0, 10.0));
        selector.on_sample(at(500, 4.0)); // 2.0
        selector.on_sample(at(750, 8.0)); // 8 * 0.25 = 2.0, tie
        assert_eq!(selector.window().best_candidate, Some(at(500, 4.0)));
    }

    #[test]
    fn at_most_one_emission_per_call_and_timestamps_monotonic() {
        let (mut selector, emitted) = selector(300);
        let stream = [
            at(0, 12.0),
            at(90, 3.0),
            at(250, 40.0),
            at(310, 9.0),
            at(400, 2.0),
            at(380, 1.0), // out of order
            at(900, 30.0),
            at(905, 2.0),
            at(1300, 15.0),
            at(2600, 6.0),
        ];

        let mut last_reference = None;
        for sample in stream {
            let before = emitted.lock().unwrap().len();
            let fired = selector.on_sample(sample);
            let after = emitted.lock().unwrap().len();
            assert!(after - before <= 1);
            assert_eq!(fired.is_some(), after == before + 1);

            let reference = selector.window().last_reported;
            if reference != last_reference && last_reference.is_some() {
                assert_eq!(reference, fired);
            }
            last_reference = reference;
        }

        let emitted = emitted.lock().unwrap();
        assert!(!emitted.is_empty());
        assert!(emitted.windows(2).all(|w| w[0].0.timestamp <= w[1].0.timestamp));
    }

    #[test]
    fn reset_makes_next_sample_the_first() {
        let (mut selector, emitted) = selector(1000);
        selector.on_sample(at(0, 10.0));
        selector.on_sample(at(400, 5.0));

        selector.reset();
        assert!(selector.window().last_reported.is_none());
        assert!(selector.window().best_candidate.is_none());
        assert_eq!(selector.phase(), SelectorPhase::Idle);
        selector.reset();

        // would have fired against t0
        assert_eq!(selector.on_sample(at(5000, 1.0)), None);
        assert_eq!(selector.window().last_reported, Some(at(5000, 1.0)));
        assert!(emitted.lock().unwrap().is_empty());
    }

    #[test]
    fn interval_change_is_not_retroactive() {
        let (mut selector, emitted) = selector(1000);
        selector.on_sample(at(0, 10.0));
        selector.on_sample(at(600, 5.0));

        selector.set_interval(500).unwrap();
        assert!(emitted.lock().unwrap().is_empty());
        assert_eq!(selector.interval_ms(), 500);

        // t600 now scores 5 * (1 - 1.2) = -1 and beats 1 * (1 - 1.3) = -0.3
        assert_eq!(selector.on_sample(at(650, 1.0)), Some(at(600, 5.0)));
    }

    #[test]
    fn rejects_non_positive_interval() {
        let (mut selector, _) = selector(1000);
        assert!(selector.set_interval(0).is_err());
        assert!(selector.set_interval(-5).is_err());
        assert_eq!(selector.interval_ms(), 1000);
    }

    #[test]
    fn consumers_run_in_registration_order_with_movement_flag() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let movement = MovementFlag::new(true);
        let mut selector = Selector::new(SelectionConfig::default(), movement.clone());

        for name in ["trail", "ui"] {
            let order = Arc::clone(&order);
            selector.register_consumer(Box::new(move |_: &Sample, is_stopped: bool| {
                order.lock().unwrap().push((name, is_stopped));
            }));
        }
        assert_eq!(selector.consumer_count(), 2);

        selector.on_sample(at(0, 3.0));
        selector.on_sample(at(1000, 3.0));
        movement.set_stopped(false);
        selector.on_sample(at(2000, 3.0));

        assert_eq!(
            *order.lock().unwrap(),
            vec![("trail", true), ("ui", true), ("trail", false), ("ui", false)]
        );
    }

    #[test]
    fn no_samples_means_no_emission() {
        let (selector, emitted) = selector(1000);
        assert_eq!(selector.phase(), SelectorPhase::Idle);
        assert!(emitted.lock().unwrap().is_empty());
    }

    #[test]
    fn extreme_timestamp_gap_emits_without_overflow() {
        let (mut selector, emitted) = selector(1000);
        assert_eq!(selector.on_sample(at(i64::MIN, 10.0)), None);
        assert_eq!(selector.on_sample(at(i64::MAX, 5.0)), Some(at(i64::MAX, 5.0)));
        assert_eq!(emitted.lock().unwrap().len(), 1);
    }
}
