use crate::models::Sample;

/// Score `candidate` against the last reported sample. Lower is better.
///
/// The accuracy radius is weighted by how far the candidate sits from the next report
/// boundary: `accuracy * (1 - timeDelta / interval)`. A sample exactly on the boundary
/// scores 0 whatever its accuracy; earlier samples are judged mostly on accuracy; late
/// samples score <= 0.
pub fn score(reference: &Sample, candidate: &Sample, interval_ms: i64) -> f64 {
    let time_delta = candidate.timestamp.saturating_sub(reference.timestamp) as f64;
    let t_score = 1.0 - time_delta / interval_ms as f64;
    candidate.accuracy * t_score
}

/// Returns true when `challenger` should replace `current` as the candidate.
/// Ties keep `current`.
pub fn beats(reference: &Sample, current: &Sample, challenger: &Sample, interval_ms: i64) -> bool {
    score(reference, challenger, interval_ms) < score(reference, current, interval_ms)
}
