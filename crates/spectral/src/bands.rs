//! Band extraction from multi-band rasters.
//!
//! Rasters are consumed as-is: no reprojection, resampling or georeferencing.
//! Band order is fixed by convention (1-based sample index): blue=1, green=2,
//! red=3, near-infrared=4. Bands past the fourth are ignored.
//!
//! Samples must be chunky (pixel-interleaved). Both the RGBA photometric
//! layout and the MinIsBlack + ExtraSamples layout that GDAL writes for
//! 4-band imagery decode, compressed or not.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use ndarray::Array2;
use num_traits::AsPrimitive;
use scene_common::DecodeError;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::TiffError;
use tracing::debug;

/// Number of bands a raster must provide.
pub const BAND_COUNT: usize = 4;

pub const BLUE_BAND: usize = 1;
pub const GREEN_BAND: usize = 2;
pub const RED_BAND: usize = 3;
pub const NIR_BAND: usize = 4;

/// The four spectral bands of one raster, all of identical shape `(rows, cols)`.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralBands {
    pub blue: Array2<f64>,
    pub green: Array2<f64>,
    pub red: Array2<f64>,
    pub nir: Array2<f64>,
}

impl SpectralBands {
    /// Shape as `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        self.blue.dim()
    }
}

/// Open a raster file and extract its blue, green, red and NIR bands.
pub fn extract_bands(path: &Path) -> Result<SpectralBands, DecodeError> {
    let file = File::open(path).map_err(|e| DecodeError::Open {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    decode_bands(BufReader::new(file), path)
}

/// Decode the four bands from any seekable TIFF source.
///
/// `path` is only used to label errors.
pub fn decode_bands<R: Read + Seek>(reader: R, path: &Path) -> Result<SpectralBands, DecodeError> {
    let mut decoder = Decoder::new(reader)
        .map_err(|e| tiff_error(path, e))?
        .with_limits(Limits::unlimited());

    let (width, height) = decoder.dimensions().map_err(|e| tiff_error(path, e))?;
    let (rows, cols) = (height as usize, width as usize);
    let pixels = rows * cols;

    let image = decoder.read_image().map_err(|e| tiff_error(path, e))?;
    let samples = match image {
        DecodingResult::U8(data) => convert(data),
        DecodingResult::U16(data) => convert(data),
        DecodingResult::U32(data) => convert(data),
        DecodingResult::U64(data) => convert(data),
        DecodingResult::F16(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I8(data) => convert(data),
        DecodingResult::I16(data) => convert(data),
        DecodingResult::I32(data) => convert(data),
        DecodingResult::I64(data) => convert(data),
        DecodingResult::F32(data) => convert(data),
        DecodingResult::F64(data) => data,
    };

    if pixels == 0 {
        return Err(DecodeError::Malformed {
            path: path.to_path_buf(),
            message: "raster has zero width or height".to_string(),
        });
    }
    if samples.len() % pixels != 0 {
        return Err(DecodeError::Malformed {
            path: path.to_path_buf(),
            message: format!(
                "{} samples do not divide into {}x{} pixels",
                samples.len(),
                cols,
                rows
            ),
        });
    }

    let band_count = samples.len() / pixels;
    if band_count < BAND_COUNT {
        return Err(DecodeError::TooFewBands {
            path: path.to_path_buf(),
            found: band_count,
        });
    }

    debug!(
        path = %path.display(),
        rows = rows,
        cols = cols,
        bands = band_count,
        "Decoded raster"
    );

    let band = |index: usize| -> Result<Array2<f64>, DecodeError> {
        let values: Vec<f64> = samples
            .iter()
            .skip(index - 1)
            .step_by(band_count)
            .copied()
            .collect();
        Array2::from_shape_vec((rows, cols), values).map_err(|e| DecodeError::Malformed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    };

    Ok(SpectralBands {
        blue: band(BLUE_BAND)?,
        green: band(GREEN_BAND)?,
        red: band(RED_BAND)?,
        nir: band(NIR_BAND)?,
    })
}

fn convert<T: AsPrimitive<f64>>(data: Vec<T>) -> Vec<f64> {
    data.into_iter().map(|v| v.as_()).collect()
}

fn tiff_error(path: &Path, err: TiffError) -> DecodeError {
    match err {
        TiffError::UnsupportedError(e) => DecodeError::Unsupported {
            path: path.to_path_buf(),
            message: e.to_string(),
        },
        TiffError::LimitsExceeded => DecodeError::Unsupported {
            path: path.to_path_buf(),
            message: "decoder limits exceeded".to_string(),
        },
        other => DecodeError::Malformed {
            path: path.to_path_buf(),
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_garbage_is_malformed() {
        let result = decode_bands(Cursor::new(b"definitely not a tiff".to_vec()), Path::new("x.tif"));
        assert!(matches!(result, Err(DecodeError::Malformed { .. })));
    }

    #[test]
    fn test_missing_file_is_open_error() {
        let result = extract_bands(Path::new("/nonexistent/dir/x.tif"));
        assert!(matches!(result, Err(DecodeError::Open { .. })));
    }
}
