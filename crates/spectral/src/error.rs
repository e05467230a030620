//! Error types for spectral computations.

use scene_common::DecodeError;
use thiserror::Error;

/// Errors that can occur turning a raster into statistics.
#[derive(Error, Debug)]
pub enum SpectralError {
    /// The raster could not be read as four bands.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Two arrays that must be combined cell by cell differ in shape.
    #[error("band shapes differ: {left:?} vs {right:?}")]
    ShapeMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },
}

/// Result type for spectral operations.
pub type Result<T> = std::result::Result<T, SpectralError>;
