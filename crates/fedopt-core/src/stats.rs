//! # Performance Statistics
//!
//! This module defines the sample and summary-statistic types used to estimate
//! the cost of resolving a pattern against the federation, and the regression
//! that turns raw samples into a cost model.
//!
//! ## Samples
//!
//! Every real resolution of a predicate produces one `Sample`: how many input
//! values were sent, how long the round trip took, and when. Response times
//! are `Measurement`s rather than bare integers because a source that silently
//! truncates its answer produces a timing that is a lower bound, not a
//! measurement -- those are recorded as `Truncated` and excluded from numeric
//! aggregation.
//!
//! ## The Cost Model
//!
//! Per (predicate, direction), samples are fit to a linear model:
//!
//! ```text
//! response_time(n) = base_time + n * time_per_input
//! ```
//!
//! by ordinary least squares over (num_inputs, response_time) pairs. The model
//! is intentionally simple: resolution cost is dominated by a fixed round-trip
//! overhead plus a per-input marginal cost, and a two-parameter fit stays
//! robust at the small sample counts collected online.
//!
//! Degenerate inputs (every sample at the same input count) leave the slope
//! undefined; the fit then falls back to the mean response time with slope
//! zero. Negative fitted parameters are clamped to zero -- a negative base
//! time or per-input time is always noise.

use crate::term::Direction;
use serde::{Deserialize, Serialize};

/// A response-time observation, or a marker that measurement was impossible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Measurement {
    /// Wall-clock milliseconds for a complete response.
    Measured(u64),
    /// The response was capped by a results limit; the timing is not a
    /// faithful measurement and must not enter numeric aggregation.
    Truncated,
}

impl Measurement {
    pub fn as_measured(&self) -> Option<u64> {
        match self {
            Measurement::Measured(ms) => Some(*ms),
            Measurement::Truncated => None,
        }
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self, Measurement::Truncated)
    }
}

/// One observed resolution of a predicate in a direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub predicate: String,
    pub direction: Direction,
    /// Number of bound input values sent with the resolution.
    pub num_inputs: u32,
    pub response_time: Measurement,
    /// Record time in epoch milliseconds; purge order is oldest-first.
    pub timestamp_ms: i64,
}

/// The derived linear cost model for one (predicate, direction).
///
/// Always recomputed from the current sample set, never hand-edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryStat {
    pub predicate: String,
    pub direction: Direction,
    pub base_time_ms: u64,
    pub time_per_input_ms: u64,
    /// Number of measured samples the fit was computed from.
    pub sample_count: u32,
}

impl SummaryStat {
    /// Estimated response time for a resolution with `num_inputs` inputs.
    pub fn estimate(&self, num_inputs: u32) -> u64 {
        self.base_time_ms + u64::from(num_inputs) * self.time_per_input_ms
    }
}

/// Least-squares fit of `y = base + slope * x` over the given points.
///
/// Returns `(base, slope)` rounded to whole milliseconds and clamped to be
/// non-negative, or `None` when there are no points at all. Fewer than two
/// distinct x values leaves the regression undefined; the fallback is
/// `base = mean(y)`, `slope = 0`.
pub fn fit_linear_model(points: &[(u32, u64)]) -> Option<(u64, u64)> {
    if points.is_empty() {
        return None;
    }

    let n = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| f64::from(*x)).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| *y as f64).sum::<f64>() / n;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (x, y) in points {
        let dx = f64::from(*x) - mean_x;
        sxx += dx * dx;
        sxy += dx * (*y as f64 - mean_y);
    }

    if sxx == 0.0 {
        // zero variance in the input counts: slope is undefined
        return Some((mean_y.max(0.0).round() as u64, 0));
    }

    let slope = sxy / sxx;
    let base = mean_y - slope * mean_x;

    Some((base.max(0.0).round() as u64, slope.max(0.0).round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_exact_line() {
        // y = 100 + 5x, no noise
        let points: Vec<(u32, u64)> = (1..=10).map(|x| (x, 100 + 5 * u64::from(x))).collect();
        assert_eq!(fit_linear_model(&points), Some((100, 5)));
    }

    #[test]
    fn test_fit_identical_inputs_falls_back_to_mean() {
        let points = [(4, 100), (4, 200), (4, 300)];
        assert_eq!(fit_linear_model(&points), Some((200, 0)));
    }

    #[test]
    fn test_fit_single_point() {
        assert_eq!(fit_linear_model(&[(7, 250)]), Some((250, 0)));
    }

    #[test]
    fn test_fit_clamps_negative_parameters() {
        // strongly decreasing data would fit a negative slope
        let points = [(1, 1000), (10, 10)];
        let (_, slope) = fit_linear_model(&points).unwrap();
        assert_eq!(slope, 0);

        // steep positive slope through the origin region fits a negative base
        let points = [(10, 5), (20, 1000)];
        let (base, _) = fit_linear_model(&points).unwrap();
        assert_eq!(base, 0);
    }

    #[test]
    fn test_fit_empty_is_none() {
        assert_eq!(fit_linear_model(&[]), None);
    }

    #[test]
    fn test_summary_estimate() {
        let summary = SummaryStat {
            predicate: "http://x/p".into(),
            direction: Direction::Forward,
            base_time_ms: 2,
            time_per_input_ms: 2,
            sample_count: 4,
        };
        assert_eq!(summary.estimate(0), 2);
        assert_eq!(summary.estimate(2), 6);
    }
}
