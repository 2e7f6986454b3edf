//! Resilience scoring over experiment history

use super::experiment::ExperimentResult;

const AVAILABILITY_WEIGHT: f64 = 0.4;
const ERROR_WEIGHT: f64 = 0.3;
const SUCCESS_WEIGHT: f64 = 0.3;

/// Score in [0, 1]; 1.0 when nothing has been run yet
pub fn resilience_score(history: &[ExperimentResult]) -> f64 {
    if history.is_empty() {
        return 1.0;
    }
    let n = history.len() as f64;
    let availability = history.iter().map(|r| r.metrics.availability).sum::<f64>() / n;
    let error_rate = history.iter().map(|r| r.metrics.error_rate).sum::<f64>() / n;
    let success_ratio = history.iter().filter(|r| r.is_success()).count() as f64 / n;

    let score = AVAILABILITY_WEIGHT * availability
        + ERROR_WEIGHT * (1.0 - error_rate)
        + SUCCESS_WEIGHT * success_ratio;
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
