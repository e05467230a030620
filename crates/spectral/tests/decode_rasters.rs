//! Decoding real TIFF files into bands and rows.

use scene_common::DecodeError;
use spectral::{extract_bands, ReflectanceMode, SpectralError, StatisticsRow};
use test_utils::{
    assert_all_nan, assert_approx_eq, temp_test_dir, write_single_band_tiff,
    write_three_band_tiff, FourBandRaster, RasterLayout,
};

#[test]
fn test_four_band_raster_band_order() {
    let dir = temp_test_dir();
    let path = dir.path().join("indexed_3B_AnalyticMS_SR_clip.tif");
    FourBandRaster::indexed(3, 2).write(&path);

    let bands = extract_bands(&path).unwrap();
    assert_eq!(bands.shape(), (2, 3));
    assert_eq!(bands.blue[[0, 0]], 1000.0);
    assert_eq!(bands.green[[0, 1]], 2001.0);
    assert_eq!(bands.red[[1, 0]], 3003.0);
    assert_eq!(bands.nir[[1, 2]], 4005.0);
}

#[test]
fn test_band_order_is_preserved_in_every_layout() {
    let dir = temp_test_dir();
    let raster = FourBandRaster::indexed(5, 3);

    for layout in RasterLayout::ALL {
        let path = dir.path().join(format!("{:?}_3B_AnalyticMS_SR_clip.tif", layout));
        raster.write_as(&path, layout);

        let bands = extract_bands(&path)
            .unwrap_or_else(|e| panic!("{:?} failed to decode: {}", layout, e));
        assert_eq!(bands.shape(), (3, 5), "{:?}", layout);
        for (cell, value) in bands.blue.iter().enumerate() {
            assert_eq!(*value, f64::from(raster.blue[cell]), "{:?} blue", layout);
        }
        assert_eq!(bands.green[[1, 1]], 2006.0, "{:?}", layout);
        assert_eq!(bands.red[[2, 0]], 3010.0, "{:?}", layout);
        assert_eq!(bands.nir[[2, 4]], 4014.0, "{:?}", layout);
    }
}

#[test]
fn test_min_is_black_clip_with_extra_samples() {
    let dir = temp_test_dir();
    let path = dir.path().join("clip_3B_AnalyticMS_SR_clip.tif");
    let mut raster = FourBandRaster::uniform(2, 2, 0);
    raster.blue = vec![0, 4, 8, 12];
    raster.red = vec![100, 100, 100, 100];
    raster.nir = vec![300, 300, 300, 300];
    raster.write_as(&path, RasterLayout::MinIsBlack);

    let bands = extract_bands(&path).unwrap();
    assert_eq!(bands.blue, ndarray::array![[0.0, 4.0], [8.0, 12.0]]);

    let row = StatisticsRow::compute("Meadow1", "clip", bands, &ReflectanceMode::default())
        .unwrap();
    assert_approx_eq!(row.ndvi.mean, 0.5);
    assert_approx_eq!(row.blue.mean, 6.0);
}

#[test]
fn test_zero_red_and_nir_row() {
    let dir = temp_test_dir();
    let path = dir.path().join("X_3B_AnalyticMS_SR_clip.tif");
    let mut raster = FourBandRaster::uniform(2, 2, 0);
    raster.blue = vec![100, 200, 300, 400];
    raster.write(&path);

    let bands = extract_bands(&path).unwrap();
    let row = StatisticsRow::compute(
        "Meadow1",
        "X_3B_AnalyticMS_SR_clip.tif",
        bands,
        &ReflectanceMode::default(),
    )
    .unwrap();

    assert_all_nan!(row.ndvi.mean, row.ndvi.min, row.ndvi.max);
    assert_eq!(row.ndvi.valid_cells, 0);
    assert_approx_eq!(row.blue.mean, 250.0);
    assert_eq!(row.nir.max, 0.0);
}

#[test]
fn test_three_band_raster_is_rejected() {
    let dir = temp_test_dir();
    let path = dir.path().join("rgb.tif");
    write_three_band_tiff(&path, 4, 4, 10);

    match extract_bands(&path) {
        Err(DecodeError::TooFewBands { found, .. }) => assert_eq!(found, 3),
        other => panic!("expected TooFewBands, got {:?}", other),
    }
}

#[test]
fn test_single_band_raster_is_rejected() {
    let dir = temp_test_dir();
    let path = dir.path().join("gray.tif");
    write_single_band_tiff(&path, 2, 2, 10);

    assert!(matches!(
        extract_bands(&path),
        Err(DecodeError::TooFewBands { found: 1, .. })
    ));
}

#[test]
fn test_non_raster_file_fails_to_decode() {
    let dir = temp_test_dir();
    let path = dir.path().join("metadata.json");
    std::fs::write(&path, br#"{"id": "not a raster"}"#).unwrap();

    let err = extract_bands(&path).unwrap_err();
    let err: SpectralError = err.into();
    assert!(err.to_string().contains("metadata.json"));
}
