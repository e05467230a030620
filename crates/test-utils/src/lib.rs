//! Shared test utilities for the scene-summary workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Multi-band TIFF fixture writers
//! - Order-status response builders
//! - A local HTTP fixture server standing in for the order API and artifact host
//! - Float assertion macros
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{FourBandRaster, FixtureServer, RasterLayout};
//! ```

pub mod fixtures;
pub mod rasters;
pub mod server;

// Re-export commonly used items at the crate root
pub use fixtures::*;
pub use rasters::*;
pub use server::{FixtureResponse, FixtureServer, RecordedRequest};

/// Create a temporary directory with a recognizable prefix.
pub fn temp_test_dir() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("scene-test-")
        .tempdir()
        .expect("Failed to create temp directory")
}

/// Macro for approximate floating-point equality assertions.
///
/// The epsilon defaults to `1e-9` when omitted.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.0001_f64, 1.0_f64, 0.001_f64); // passes
/// assert_approx_eq!(0.1 + 0.2, 0.3);                 // passes
/// assert_approx_eq!(1.1_f32, 1.0_f32, 0.001_f32);    // fails
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr) => {
        $crate::assert_approx_eq!($left, $right, 1e-9)
    };
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if !(diff <= epsilon) {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}

/// Assert that every listed value is NaN.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_all_nan;
///
/// assert_all_nan!(row.ndvi.mean, row.ndvi.min, row.ndvi.max);
/// ```
#[macro_export]
macro_rules! assert_all_nan {
    ($($value:expr),+ $(,)?) => {{
        $(
            let value: f64 = $value as f64;
            if !value.is_nan() {
                panic!(
                    "assertion failed: `{}` is not NaN (got `{:?}`)",
                    stringify!($value),
                    value
                );
            }
        )+
    }};
}
