//! One summary-table row per raster.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::bands::SpectralBands;
use crate::error::Result;
use crate::index::normalized_difference;
use crate::reflectance::ReflectanceMode;
use crate::stats::{summarize_array, BandSummary};

/// Column names of the summary table, in write order.
pub const SUMMARY_HEADER: [&str; 17] = [
    "Name",
    "Item_ID",
    "ndvi_mean",
    "ndvi_min",
    "ndvi_max",
    "red_mean",
    "red_min",
    "red_max",
    "blue_mean",
    "blue_min",
    "blue_max",
    "green_mean",
    "green_min",
    "green_max",
    "nir_mean",
    "nir_min",
    "nir_max",
];

/// Statistics for one raster: site, item, then index and band summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsRow {
    pub site: String,
    pub item_id: String,
    pub ndvi: BandSummary,
    pub red: BandSummary,
    pub blue: BandSummary,
    pub green: BandSummary,
    pub nir: BandSummary,
}

impl StatisticsRow {
    /// Compute the row for one raster's bands.
    ///
    /// CPU bound; callers on an async runtime should run it on a blocking
    /// thread.
    pub fn compute(
        site: &str,
        item_id: &str,
        bands: SpectralBands,
        mode: &ReflectanceMode,
    ) -> Result<Self> {
        let bands = mode.apply(bands);
        let ndvi = normalized_difference(&bands.nir, &bands.red)?;

        let arrays = [&ndvi, &bands.red, &bands.blue, &bands.green, &bands.nir];
        let summaries: Vec<BandSummary> = arrays
            .par_iter()
            .map(|array| summarize_array(array))
            .collect();

        Ok(Self {
            site: site.to_string(),
            item_id: item_id.to_string(),
            ndvi: summaries[0],
            red: summaries[1],
            blue: summaries[2],
            green: summaries[3],
            nir: summaries[4],
        })
    }

    /// The 15 numeric columns in header order.
    pub fn values(&self) -> [f64; 15] {
        let mut values = [0.0; 15];
        for (chunk, summary) in values
            .chunks_exact_mut(3)
            .zip([&self.ndvi, &self.red, &self.blue, &self.green, &self.nir])
        {
            chunk[0] = summary.mean;
            chunk[1] = summary.min;
            chunk[2] = summary.max;
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};
    use test_utils::assert_approx_eq;

    #[test]
    fn test_zero_red_and_nir_give_undefined_index() {
        let bands = SpectralBands {
            blue: array![[10.0, 20.0], [30.0, 40.0]],
            green: array![[1.0, 1.0], [1.0, 1.0]],
            red: Array2::zeros((2, 2)),
            nir: Array2::zeros((2, 2)),
        };
        let row = StatisticsRow::compute("Meadow", "X_3B_AnalyticMS_SR_clip.tif", bands, &ReflectanceMode::default())
            .unwrap();

        assert!(row.ndvi.mean.is_nan());
        assert!(row.ndvi.min.is_nan());
        assert!(row.ndvi.max.is_nan());
        assert_eq!(row.red.mean, 0.0);
        assert_approx_eq!(row.blue.mean, 25.0);
        assert_eq!(row.blue.min, 10.0);
        assert_eq!(row.blue.max, 40.0);
    }

    #[test]
    fn test_values_follow_header_order() {
        let bands = SpectralBands {
            blue: Array2::from_elem((1, 2), 1.0),
            green: Array2::from_elem((1, 2), 2.0),
            red: array![[1000.0, 2000.0]],
            nir: array![[3000.0, 2000.0]],
        };
        let row = StatisticsRow::compute("S", "i", bands, &ReflectanceMode::default()).unwrap();
        let values = row.values();

        assert_eq!(SUMMARY_HEADER.len(), 2 + values.len());
        assert_approx_eq!(values[0], 0.25); // ndvi mean of 0.5 and 0.0
        assert_eq!(values[1], 0.0);
        assert_approx_eq!(values[2], 0.5);
        assert_eq!(&values[3..6], &[1500.0, 1000.0, 2000.0]);
        assert_eq!(&values[6..9], &[1.0, 1.0, 1.0]);
        assert_eq!(&values[9..12], &[2.0, 2.0, 2.0]);
        assert_eq!(&values[12..15], &[2500.0, 2000.0, 3000.0]);
    }

    #[test]
    fn test_scaling_does_not_change_index_sign() {
        let bands = SpectralBands {
            blue: Array2::from_elem((1, 1), 100.0),
            green: Array2::from_elem((1, 1), 100.0),
            red: Array2::from_elem((1, 1), 100.0),
            nir: Array2::from_elem((1, 1), 300.0),
        };
        let mode = ReflectanceMode::Scaled {
            blue: 0.01,
            green: 0.01,
            red: 0.01,
            nir: 0.01,
        };
        let row = StatisticsRow::compute("S", "i", bands, &mode).unwrap();
        assert_approx_eq!(row.ndvi.mean, 0.5);
        assert_approx_eq!(row.nir.max, 3.0);
    }
}
