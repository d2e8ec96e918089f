use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::models::Sample;
use crate::selection::Selector;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

pub(crate) fn lock_selector(selector: &Mutex<Selector>) -> MutexGuard<'_, Selector> {
    selector.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Forwards every delivered sample to the selector, one at a time, until cancelled.
///
/// Cancellation wins over a queued sample, so nothing reaches the selector once
/// `stop` has been requested. On cancellation the selector window is reset.
pub async fn sampling_loop(
    session_id: String,
    mut samples: mpsc::Receiver<Sample>,
    selector: Arc<Mutex<Selector>>,
    cancel_token: CancellationToken,
) {
    let mut received: u64 = 0;
    let mut emitted: u64 = 0;

    loop {
        tokio::select! {
            biased;

            _ = cancel_token.cancelled() => {
                lock_selector(&selector).reset();
                log_info!(
                    "sampling loop shutting down for session {} ({} received, {} emitted)",
                    session_id, received, emitted
                );
                break;
            }
            next = samples.recv() => {
                let Some(sample) = next else {
                    log_warn!("location source closed for session {} after {} samples", session_id, received);
                    break;
                };

                received += 1;
                if lock_selector(&selector).on_sample(sample).is_some() {
                    emitted += 1;
                }
            }
        }
    }
}
