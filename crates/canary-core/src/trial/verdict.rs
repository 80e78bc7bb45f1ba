//! Survival verdict for a resolved trial.

use crate::types::MetricDirection;

/// Signed improvement of `after` over `before`; positive means better.
pub fn improvement(direction: MetricDirection, before: f64, after: f64) -> f64 {
    (after - before) * direction.sign()
}

/// Decide whether a change survived its trial.
///
/// With an `expected_delta` the change must improve the metric by at least
/// that much. Without one the metric must not regress by more than
/// `tolerance` (0.0 = equal or better).
pub fn survived(
    direction: MetricDirection,
    before: f64,
    after: f64,
    expected_delta: Option<f64>,
    tolerance: f64,
) -> bool {
    let gain = improvement(direction, before, after);
    match expected_delta {
        Some(expected) => gain >= expected,
        None => gain >= -tolerance,
    }
}
