//! Conversion from stored digital numbers to the values that get summarized.

use serde::{Deserialize, Serialize};

use crate::bands::SpectralBands;

/// How raw band samples are interpreted before index computation and
/// reduction.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReflectanceMode {
    /// Summarize the stored digital numbers unchanged.
    #[default]
    RawDigitalNumber,
    /// Multiply each band by its coefficient (e.g. the per-band reflectance
    /// coefficients delivered with the scene metadata).
    Scaled {
        blue: f64,
        green: f64,
        red: f64,
        nir: f64,
    },
}

impl ReflectanceMode {
    pub fn apply(&self, bands: SpectralBands) -> SpectralBands {
        match *self {
            Self::RawDigitalNumber => bands,
            Self::Scaled {
                blue,
                green,
                red,
                nir,
            } => SpectralBands {
                blue: bands.blue * blue,
                green: bands.green * green,
                red: bands.red * red,
                nir: bands.nir * nir,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RawDigitalNumber => "raw_digital_number",
            Self::Scaled { .. } => "scaled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn bands(value: f64) -> SpectralBands {
        SpectralBands {
            blue: Array2::from_elem((2, 2), value),
            green: Array2::from_elem((2, 2), value),
            red: Array2::from_elem((2, 2), value),
            nir: Array2::from_elem((2, 2), value),
        }
    }

    #[test]
    fn test_raw_is_identity() {
        let original = bands(1200.0);
        assert_eq!(ReflectanceMode::default().apply(original.clone()), original);
    }

    #[test]
    fn test_scaled_multiplies_each_band() {
        let mode = ReflectanceMode::Scaled {
            blue: 0.5,
            green: 0.25,
            red: 2.0,
            nir: 0.0,
        };
        let scaled = mode.apply(bands(100.0));
        assert_eq!(scaled.blue[[0, 0]], 50.0);
        assert_eq!(scaled.green[[1, 1]], 25.0);
        assert_eq!(scaled.red[[0, 1]], 200.0);
        assert_eq!(scaled.nir[[1, 0]], 0.0);
    }

    #[test]
    fn test_serde_tagged() {
        let raw: ReflectanceMode =
            serde_json::from_str(r#"{"mode": "raw_digital_number"}"#).unwrap();
        assert_eq!(raw, ReflectanceMode::RawDigitalNumber);

        let scaled: ReflectanceMode = serde_json::from_str(
            r#"{"mode": "scaled", "blue": 1.0, "green": 2.0, "red": 3.0, "nir": 4.0}"#,
        )
        .unwrap();
        assert_eq!(scaled.as_str(), "scaled");
    }
}
