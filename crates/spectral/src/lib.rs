//! Spectral statistics for 4-band surface reflectance rasters.
//!
//! Turns one delivered raster into one statistics row:
//!
//! ```text
//! raster file ──► extract_bands ──► SpectralBands (blue, green, red, nir)
//!                                        │
//!                                        ├─► ReflectanceMode::apply (optional scaling)
//!                                        │
//!                                        ├─► normalized_difference(nir, red) ──► NDVI array
//!                                        │
//!                                        └─► summarize (NaN-aware mean/min/max)
//!                                                 │
//!                                                 ▼
//!                                           StatisticsRow
//! ```
//!
//! # Example
//!
//! ```ignore
//! use spectral::{extract_bands, ReflectanceMode, StatisticsRow};
//!
//! let bands = extract_bands(path)?;
//! let row = StatisticsRow::compute("Meadow1", "x_3B_AnalyticMS_SR_clip.tif", bands, &ReflectanceMode::default())?;
//! println!("ndvi mean {}", row.ndvi.mean);
//! ```

pub mod bands;
pub mod error;
pub mod index;
pub mod reflectance;
pub mod row;
pub mod stats;

pub use bands::{decode_bands, extract_bands, SpectralBands, BAND_COUNT};
pub use error::{Result, SpectralError};
pub use index::{ndvi_cell, normalized_difference};
pub use reflectance::ReflectanceMode;
pub use row::{StatisticsRow, SUMMARY_HEADER};
pub use stats::{summarize, summarize_array, BandSummary};
