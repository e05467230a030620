//! NaN-aware band statistics.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Mean, minimum and maximum over the valid (finite) cells of one array.
///
/// All three are NaN when no cell is valid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandSummary {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub valid_cells: usize,
}

impl BandSummary {
    pub fn undefined() -> Self {
        Self {
            mean: f64::NAN,
            min: f64::NAN,
            max: f64::NAN,
            valid_cells: 0,
        }
    }

    pub fn is_defined(&self) -> bool {
        self.valid_cells > 0
    }
}

/// Summarize a stream of values, ignoring NaN and infinities.
///
/// The mean uses compensated (Neumaier) summation and is clamped into
/// `[min, max]` so rounding or overflow can never put it outside the observed
/// range.
pub fn summarize<I>(values: I) -> BandSummary
where
    I: IntoIterator<Item = f64>,
{
    let mut sum = 0.0_f64;
    let mut compensation = 0.0_f64;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut count = 0_usize;

    for value in values.into_iter().filter(|v| v.is_finite()) {
        let t = sum + value;
        if sum.abs() >= value.abs() {
            compensation += (sum - t) + value;
        } else {
            compensation += (value - t) + sum;
        }
        sum = t;

        min = min.min(value);
        max = max.max(value);
        count += 1;
    }

    if count == 0 {
        return BandSummary::undefined();
    }

    // Compensation is meaningless once the running sum overflows
    let total = if compensation.is_finite() {
        sum + compensation
    } else {
        sum
    };
    let mean = (total / count as f64).clamp(min, max);

    BandSummary {
        mean,
        min,
        max,
        valid_cells: count,
    }
}

pub fn summarize_array(array: &Array2<f64>) -> BandSummary {
    summarize(array.iter().copied())
}
