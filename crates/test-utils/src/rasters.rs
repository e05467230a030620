//! Multi-band TIFF fixture writers.
//!
//! Band values are given as row-major slices of `width * height` samples and
//! are interleaved into a single chunky image. The default layout is the one
//! GDAL writes for 16-bit multi-band imagery and that delivered surface
//! reflectance clips use: MinIsBlack photometric interpretation with the
//! bands past the first tagged as ExtraSamples.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use tiff::encoder::colortype::{self, ColorType};
use tiff::encoder::{Compression, Predictor, TiffEncoder};
use tiff::tags::{PhotometricInterpretation, SampleFormat, Tag};

/// Chunky 16-bit MinIsBlack colortypes with a fixed sample count.
macro_rules! multiband16 {
    ($name:ident, $samples:expr) => {
        struct $name;

        impl ColorType for $name {
            type Inner = u16;
            const TIFF_VALUE: PhotometricInterpretation = PhotometricInterpretation::BlackIsZero;
            const BITS_PER_SAMPLE: &'static [u16] = &[16; $samples];
            const SAMPLE_FORMAT: &'static [SampleFormat] = &[SampleFormat::Uint; $samples];

            fn horizontal_predict(row: &[u16], result: &mut Vec<u16>) {
                let samples = Self::SAMPLE_FORMAT.len().min(row.len());
                result.extend_from_slice(&row[..samples]);
                result.extend(
                    row.iter()
                        .zip(&row[samples..])
                        .map(|(prev, current)| current.wrapping_sub(*prev)),
                );
            }
        }
    };
}

multiband16!(FourBand16, 4);
multiband16!(ThreeBand16, 3);

/// On-disk layout of a fixture raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterLayout {
    /// MinIsBlack + ExtraSamples, uncompressed
    MinIsBlack,
    /// MinIsBlack + ExtraSamples, LZW
    MinIsBlackLzw,
    /// MinIsBlack + ExtraSamples, LZW with horizontal differencing (predictor 2)
    MinIsBlackLzwPredictor,
    /// RGBA photometric interpretation, uncompressed
    Rgba,
}

impl RasterLayout {
    pub const ALL: [RasterLayout; 4] = [
        RasterLayout::MinIsBlack,
        RasterLayout::MinIsBlackLzw,
        RasterLayout::MinIsBlackLzwPredictor,
        RasterLayout::Rgba,
    ];

    fn encoder(self, path: &Path) -> TiffEncoder<BufWriter<File>> {
        let (compression, predictor) = match self {
            RasterLayout::MinIsBlackLzw => (Compression::Lzw, Predictor::None),
            RasterLayout::MinIsBlackLzwPredictor => (Compression::Lzw, Predictor::Horizontal),
            RasterLayout::MinIsBlack | RasterLayout::Rgba => {
                (Compression::Uncompressed, Predictor::None)
            }
        };

        let file = BufWriter::new(File::create(path).expect("Failed to create raster file"));
        TiffEncoder::new(file)
            .expect("Failed to create TIFF encoder")
            .with_compression(compression)
            .with_predictor(predictor)
    }
}

/// Write a MinIsBlack image whose samples past the first are ExtraSamples.
fn write_multiband<C: ColorType<Inner = u16>>(
    mut encoder: TiffEncoder<BufWriter<File>>,
    width: u32,
    height: u32,
    data: &[u16],
) {
    let extra_samples = vec![0u16; C::BITS_PER_SAMPLE.len() - 1];
    let mut image = encoder
        .new_image::<C>(width, height)
        .expect("Failed to start TIFF image");
    image
        .encoder()
        .write_tag(Tag::ExtraSamples, &extra_samples[..])
        .expect("Failed to write ExtraSamples");
    image.write_data(data).expect("Failed to write raster data");
}

/// Band values for a 4-band (blue, green, red, nir) raster.
#[derive(Debug, Clone)]
pub struct FourBandRaster {
    pub width: u32,
    pub height: u32,
    pub blue: Vec<u16>,
    pub green: Vec<u16>,
    pub red: Vec<u16>,
    pub nir: Vec<u16>,
}

impl FourBandRaster {
    /// Every band filled with the same value.
    pub fn uniform(width: u32, height: u32, value: u16) -> Self {
        let n = (width * height) as usize;
        Self {
            width,
            height,
            blue: vec![value; n],
            green: vec![value; n],
            red: vec![value; n],
            nir: vec![value; n],
        }
    }

    /// Creates a raster whose bands are easy to verify: each band holds
    /// `band_index * 1000 + cell_index` (band_index 1..=4, cell in row-major
    /// order).
    ///
    /// # Example
    ///
    /// ```
    /// use test_utils::FourBandRaster;
    ///
    /// let raster = FourBandRaster::indexed(2, 2);
    /// assert_eq!(raster.blue, vec![1000, 1001, 1002, 1003]);
    /// assert_eq!(raster.nir[3], 4003);
    /// ```
    pub fn indexed(width: u32, height: u32) -> Self {
        let n = (width * height) as u16;
        let band = |index: u16| (0..n).map(|cell| index * 1000 + cell).collect::<Vec<_>>();
        Self {
            width,
            height,
            blue: band(1),
            green: band(2),
            red: band(3),
            nir: band(4),
        }
    }

    /// Interleave the bands pixel by pixel.
    pub fn interleaved(&self) -> Vec<u16> {
        let n = (self.width * self.height) as usize;
        let mut data = Vec::with_capacity(n * 4);
        for i in 0..n {
            data.extend_from_slice(&[self.blue[i], self.green[i], self.red[i], self.nir[i]]);
        }
        data
    }

    /// Write in the delivered-clip layout (MinIsBlack + ExtraSamples).
    pub fn write(&self, path: &Path) {
        self.write_as(path, RasterLayout::MinIsBlack);
    }

    pub fn write_as(&self, path: &Path, layout: RasterLayout) {
        let mut encoder = layout.encoder(path);
        let data = self.interleaved();
        match layout {
            RasterLayout::Rgba => encoder
                .write_image::<colortype::RGBA16>(self.width, self.height, &data)
                .expect("Failed to write 4-band TIFF"),
            _ => write_multiband::<FourBand16>(encoder, self.width, self.height, &data),
        }
    }

    /// Encode to an in-memory TIFF (for serving from the fixture server).
    pub fn to_bytes(&self) -> Vec<u8> {
        let dir = crate::temp_test_dir();
        let path = dir.path().join("raster.tif");
        self.write(&path);
        std::fs::read(&path).expect("Failed to read back raster")
    }
}

/// Write a 3-band raster, which lacks the near-infrared band.
pub fn write_three_band_tiff(path: &Path, width: u32, height: u32, value: u16) {
    let data = vec![value; (width * height * 3) as usize];
    write_multiband::<ThreeBand16>(
        RasterLayout::MinIsBlack.encoder(path),
        width,
        height,
        &data,
    );
}

/// Write a single-band grayscale raster.
pub fn write_single_band_tiff(path: &Path, width: u32, height: u32, value: u16) {
    let data = vec![value; (width * height) as usize];
    RasterLayout::MinIsBlack
        .encoder(path)
        .write_image::<colortype::Gray16>(width, height, &data)
        .expect("Failed to write single-band TIFF");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interleaved_layout() {
        let raster = FourBandRaster::indexed(2, 1);
        assert_eq!(
            raster.interleaved(),
            vec![1000, 2000, 3000, 4000, 1001, 2001, 3001, 4001]
        );
    }

    #[test]
    fn test_multiband_predictor_differences_samples() {
        let mut result = Vec::new();
        FourBand16::horizontal_predict(&[10, 20, 30, 40, 11, 22, 33, 44], &mut result);
        assert_eq!(result, vec![10, 20, 30, 40, 1, 2, 3, 4]);
    }

    #[test]
    fn test_every_layout_writes_a_tiff() {
        let dir = crate::temp_test_dir();
        for layout in RasterLayout::ALL {
            let path = dir.path().join(format!("{:?}.tif", layout));
            FourBandRaster::indexed(3, 2).write_as(&path, layout);
            let bytes = std::fs::read(&path).unwrap();
            assert!(&bytes[..2] == b"II" || &bytes[..2] == b"MM");
        }
    }

    #[test]
    fn test_to_bytes_is_tiff() {
        let bytes = FourBandRaster::uniform(2, 2, 7).to_bytes();
        assert!(&bytes[..2] == b"II" || &bytes[..2] == b"MM");
        assert!(bytes.len() > 4 * 2 * 4);
    }
}
