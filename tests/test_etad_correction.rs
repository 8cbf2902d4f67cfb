mod common;

use approx::{assert_abs_diff_eq, assert_relative_eq};
use common::*;
use ndarray::Array2;
use sardine_etad::core::{
    EtadCorrectionParams, EtadCorrector, OutputMode, ResamplingMethod, TimingCorrectionMode, HEIGHT_BAND,
    PHASE_BAND,
};
use sardine_etad::io::{BurstIndex, CorrectionLayer, CorrectionProvider, EtadBurst, EtadProduct, RasterSource};
use sardine_etad::types::{SarError, SarResult, TileRect, HALF_LIGHT_SPEED};
use sardine_etad::MemoryRaster;
use std::f64::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn full_image() -> TileRect {
    TileRect::new(0, 0, WIDTH, HEIGHT)
}

#[test]
fn test_zero_corrections_keep_positions() {
    init_logging();

    let corrector = EtadCorrector::new(timing(), Arc::new(zero_product(6)), EtadCorrectionParams::default())
        .expect("Failed to create corrector");
    let positions = corrector
        .corrected_positions(full_image())
        .expect("Failed to compute positions");

    for ((y, x), pos) in positions.indexed_iter() {
        assert_abs_diff_eq!(pos.x, x as f64, epsilon = 1e-3);
        assert_abs_diff_eq!(pos.y, y as f64, epsilon = 1e-3);
    }
}

#[test]
fn test_constant_shift_moves_positions() {
    init_logging();

    let product = product_with(
        burst(6),
        &[
            (CorrectionLayer::SumOfCorrectionsAzimuth, 0.5 * LINE_TIME_INTERVAL),
            (CorrectionLayer::SumOfCorrectionsRange, range_shift(1.0)),
        ],
    );
    let corrector = EtadCorrector::new(timing(), Arc::new(product), EtadCorrectionParams::default())
        .expect("Failed to create corrector");
    let positions = corrector
        .corrected_positions(TileRect::new(2, 3, 5, 4))
        .expect("Failed to compute positions");

    for ((yy, xx), pos) in positions.indexed_iter() {
        assert_abs_diff_eq!(pos.x, (xx + 2) as f64 + 1.0, epsilon = 1e-3);
        assert_abs_diff_eq!(pos.y, (yy + 3) as f64 + 0.5, epsilon = 1e-3);
    }
}

fn layered_product() -> EtadProduct {
    product_with(
        burst(6),
        &[
            (CorrectionLayer::TroposphericRange, range_shift(0.25)),
            (CorrectionLayer::IonosphericRange, range_shift(0.25)),
            (CorrectionLayer::SumOfCorrectionsRange, range_shift(2.0)),
            (CorrectionLayer::GeodeticAzimuth, LINE_TIME_INTERVAL),
            (CorrectionLayer::SumOfCorrectionsAzimuth, 2.0 * LINE_TIME_INTERVAL),
        ],
    )
}

fn selected(instrument_calibration: bool) -> EtadCorrectionParams {
    EtadCorrectionParams {
        azimuth: TimingCorrectionMode::SelectedLayers {
            layers: vec![CorrectionLayer::GeodeticAzimuth],
            instrument_calibration,
        },
        range: TimingCorrectionMode::SelectedLayers {
            layers: vec![CorrectionLayer::TroposphericRange, CorrectionLayer::IonosphericRange],
            instrument_calibration,
        },
        ..Default::default()
    }
}

#[test]
fn test_summed_layer_never_adds_calibration_twice() {
    init_logging();

    let rect = TileRect::new(4, 4, 3, 3);
    let sum = EtadCorrector::new(timing(), Arc::new(layered_product()), EtadCorrectionParams::default())
        .expect("Failed to create corrector");
    assert_eq!(sum.engine().azimuth_calibration(), 0.0);
    assert_eq!(sum.engine().range_calibration(), 0.0);

    for ((yy, xx), pos) in sum.corrected_positions(rect).unwrap().indexed_iter() {
        assert_abs_diff_eq!(pos.x, (xx + 4) as f64 + 2.0, epsilon = 1e-3);
        assert_abs_diff_eq!(pos.y, (yy + 4) as f64 + 2.0, epsilon = 1e-3);
    }
}

#[test]
fn test_selected_layers_add_calibration_once() {
    init_logging();

    let rect = TileRect::new(4, 4, 3, 3);
    let calibrated = EtadCorrector::new(timing(), Arc::new(layered_product()), selected(true))
        .expect("Failed to create corrector");
    let plain = EtadCorrector::new(timing(), Arc::new(layered_product()), selected(false))
        .expect("Failed to create corrector");

    let dx_cal = RANGE_CALIBRATION * HALF_LIGHT_SPEED / RANGE_SPACING;
    let dy_cal = AZIMUTH_CALIBRATION / LINE_TIME_INTERVAL;
    println!("Calibration shifts: {:.4} pixels, {:.4} lines", dx_cal, dy_cal);

    let with_cal = calibrated.corrected_positions(rect).unwrap();
    let without_cal = plain.corrected_positions(rect).unwrap();

    for ((yy, xx), pos) in without_cal.indexed_iter() {
        assert_abs_diff_eq!(pos.x, (xx + 4) as f64 + 0.5, epsilon = 1e-3);
        assert_abs_diff_eq!(pos.y, (yy + 4) as f64 + 1.0, epsilon = 1e-3);

        let cal = with_cal[[yy, xx]];
        assert_abs_diff_eq!(cal.x - pos.x, dx_cal, epsilon = 1e-3);
        assert_abs_diff_eq!(cal.y - pos.y, dy_cal, epsilon = 1e-3);
    }
}

#[test]
fn test_sum_layer_in_selection_is_rejected() {
    let params = EtadCorrectionParams {
        range: TimingCorrectionMode::SelectedLayers {
            layers: vec![CorrectionLayer::SumOfCorrectionsRange],
            instrument_calibration: true,
        },
        ..Default::default()
    };

    let result = EtadCorrector::new(timing(), Arc::new(layered_product()), params);
    assert!(matches!(result, Err(SarError::InvalidConfiguration(_))));
}

#[test]
fn test_missing_calibration_fails_construction() {
    let mut product = EtadProduct::new();
    product
        .add_burst(burst(6), vec![(CorrectionLayer::GeodeticAzimuth, Array2::zeros((6, 6)))])
        .unwrap();

    let result = EtadCorrector::new(timing(), Arc::new(product), selected(true));
    assert!(matches!(result, Err(SarError::MissingCalibration(_))));
}

#[test]
fn test_identity_resampling_round_trip() {
    init_logging();

    let source = source_image();
    for method in [
        ResamplingMethod::NearestNeighbour,
        ResamplingMethod::Bilinear,
        ResamplingMethod::Bicubic,
    ] {
        let params = EtadCorrectionParams {
            output: OutputMode::ResampleImage { resampling: method },
            ..Default::default()
        };
        let corrector = EtadCorrector::new(timing(), Arc::new(zero_product(6)), params)
            .expect("Failed to create corrector");

        let output = corrector
            .compute_tile(TileRect::new(3, 5, 8, 6), &source)
            .expect("Failed to compute tile");
        let expected = source.read_tile("i_VV", TileRect::new(3, 5, 8, 6)).unwrap();

        let resampled = output.band("i_VV").expect("i band present");
        for ((yy, xx), v) in resampled.indexed_iter() {
            assert_abs_diff_eq!(*v, expected[[yy, xx]], epsilon = 1e-2);
        }
    }
}

/// Tropospheric delay proportional to terrain height plus a constant
const TROPO_GRADIENT: f64 = 2.0e-12;

fn insar_product() -> EtadProduct {
    let b = burst(6);
    let height = terrain(b.rows, b.cols);
    let tropo = height.mapv(|h| TROPO_GRADIENT * h + 1.0e-9);

    let mut product = product_with(
        b,
        &[
            (CorrectionLayer::SumOfCorrectionsAzimuth, 0.0),
            (CorrectionLayer::SumOfCorrectionsRange, 0.0),
            (CorrectionLayer::IonosphericRange, 5.0e-10),
            (CorrectionLayer::GeodeticRange, 2.0e-10),
        ],
    );
    // Second swath burst carries the height-correlated layer
    let b2 = EtadBurst {
        index: BurstIndex::new(2, 1, 1),
        ..b
    };
    product
        .add_burst(
            b2,
            vec![(CorrectionLayer::TroposphericRange, tropo), (CorrectionLayer::Height, height)],
        )
        .unwrap();
    product
}

fn phase_params() -> EtadCorrectionParams {
    EtadCorrectionParams {
        output: OutputMode::PhaseCorrections,
        insar_range_layers: vec![CorrectionLayer::IonosphericRange, CorrectionLayer::GeodeticRange],
        reference_burst: BurstIndex::new(2, 1, 1),
        ..Default::default()
    }
}

#[test]
fn test_phase_output_bands() {
    init_logging();

    let corrector = EtadCorrector::new(timing(), Arc::new(insar_product()), phase_params())
        .expect("Failed to create corrector");
    let source = source_image();

    let names: Vec<String> = corrector
        .target_bands(&source.band_names().unwrap())
        .into_iter()
        .map(|b| b.name)
        .collect();
    assert_eq!(names, vec!["i_VV", "q_VV", PHASE_BAND, HEIGHT_BAND]);

    let rect = TileRect::new(0, 0, 8, 5);
    let output = corrector.compute_tile(rect, &source).expect("Failed to compute tile");

    // Source bands pass through untouched
    assert_eq!(output.band("i_VV").unwrap(), &source.read_tile("i_VV", rect).unwrap());
    assert_eq!(output.band("q_VV").unwrap(), &source.read_tile("q_VV", rect).unwrap());

    let delay = corrector
        .engine()
        .correction_for_tile(&[CorrectionLayer::IonosphericRange, CorrectionLayer::GeodeticRange], rect)
        .unwrap();
    let height = corrector
        .engine()
        .correction_for_tile(&[CorrectionLayer::Height], rect)
        .unwrap();
    let scale = -2.0 * PI * FREQUENCY_MHZ * 1.0e6;

    let phase = output.band(PHASE_BAND).unwrap();
    for ((yy, xx), v) in phase.indexed_iter() {
        let expected = scale * (delay[[yy, xx]] + RANGE_CALIBRATION);
        assert_relative_eq!(*v as f64, expected, max_relative = 1e-5);
    }
    let height_band = output.band(HEIGHT_BAND).unwrap();
    for ((yy, xx), v) in height_band.indexed_iter() {
        assert_relative_eq!(*v as f64, height[[yy, xx]], max_relative = 1e-5);
    }
}

#[test]
fn test_phase_gradient_from_reference_burst() {
    init_logging();

    let corrector = EtadCorrector::new(timing(), Arc::new(insar_product()), phase_params())
        .expect("Failed to create corrector");

    assert_relative_eq!(corrector.gradient().unwrap(), TROPO_GRADIENT, max_relative = 1e-6);
    assert_relative_eq!(
        corrector.phase_gradient().unwrap(),
        -2.0 * PI * FREQUENCY_MHZ * 1.0e6 * TROPO_GRADIENT,
        max_relative = 1e-6
    );
}

/// Wraps a product and counts reference-burst lookups
struct CountingProvider {
    inner: EtadProduct,
    burst_lookups: AtomicUsize,
}

impl CorrectionProvider for CountingProvider {
    fn burst_at(&self, azimuth_time: f64, range_time: f64) -> SarResult<EtadBurst> {
        self.inner.burst_at(azimuth_time, range_time)
    }

    fn burst(&self, index: BurstIndex) -> SarResult<EtadBurst> {
        self.burst_lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.burst(index)
    }

    fn burst_layer(&self, layer: CorrectionLayer, burst: &EtadBurst) -> SarResult<Arc<Array2<f64>>> {
        self.inner.burst_layer(layer, burst)
    }

    fn instrument_azimuth_time_calibration(&self, swath: &str) -> SarResult<f64> {
        self.inner.instrument_azimuth_time_calibration(swath)
    }

    fn instrument_range_time_calibration(&self, swath: &str) -> SarResult<f64> {
        self.inner.instrument_range_time_calibration(swath)
    }
}

#[test]
fn test_gradient_is_estimated_once_across_tiles() {
    init_logging();

    let provider = Arc::new(CountingProvider {
        inner: insar_product(),
        burst_lookups: AtomicUsize::new(0),
    });
    let corrector = EtadCorrector::new(timing(), provider.clone(), phase_params())
        .expect("Failed to create corrector");

    let source = source_image();
    let names: Vec<String> = corrector
        .target_bands(&source.band_names().unwrap())
        .into_iter()
        .map(|b| b.name)
        .collect();
    let sink = MemoryRaster::with_zero_bands(WIDTH, HEIGHT, &names).unwrap();

    let tiles = TileRect::tiles_covering(WIDTH, HEIGHT, 4, 5);
    let outcomes = corrector.process_tiles(&tiles, &source, &sink);
    assert_eq!(outcomes.len(), tiles.len());
    assert!(outcomes.iter().all(|o| o.result.is_ok()));

    corrector.phase_gradient().unwrap();
    corrector.phase_gradient().unwrap();
    assert_eq!(provider.burst_lookups.load(Ordering::SeqCst), 1);
}

#[test]
fn test_gradient_failure_is_reported_for_every_tile() {
    init_logging();

    // No burst (3, 1, 1) exists, so the regression cannot run
    let params = EtadCorrectionParams {
        reference_burst: BurstIndex::new(3, 1, 1),
        ..phase_params()
    };
    let provider = Arc::new(CountingProvider {
        inner: insar_product(),
        burst_lookups: AtomicUsize::new(0),
    });
    let corrector = EtadCorrector::new(timing(), provider.clone(), params).unwrap();

    let source = source_image();
    let sink = MemoryRaster::with_zero_bands(
        WIDTH,
        HEIGHT,
        &["i_VV", "q_VV", PHASE_BAND, HEIGHT_BAND],
    )
    .unwrap();

    let outcomes = corrector.process_tiles(&TileRect::tiles_covering(WIDTH, HEIGHT, 8, 10), &source, &sink);
    assert_eq!(outcomes.len(), 4);
    assert!(outcomes.iter().all(|o| o.result.is_err()));
    assert_eq!(provider.burst_lookups.load(Ordering::SeqCst), 1);
    assert!(corrector.phase_gradient().is_err());
}
