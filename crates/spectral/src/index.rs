//! Vegetation index computation.

use ndarray::{Array2, Zip};

use crate::error::{Result, SpectralError};

/// NDVI of one cell: `(nir - red) / (nir + red)`.
///
/// Returns NaN where `nir + red == 0` instead of dividing by zero.
#[inline]
pub fn ndvi_cell(nir: f64, red: f64) -> f64 {
    let sum = nir + red;
    if sum == 0.0 {
        f64::NAN
    } else {
        (nir - red) / sum
    }
}

/// Cell-wise normalized difference of two equally shaped bands.
pub fn normalized_difference(nir: &Array2<f64>, red: &Array2<f64>) -> Result<Array2<f64>> {
    if nir.dim() != red.dim() {
        return Err(SpectralError::ShapeMismatch {
            left: nir.dim(),
            right: red.dim(),
        });
    }

    Ok(Zip::from(nir).and(red).map_collect(|&n, &r| ndvi_cell(n, r)))
}
