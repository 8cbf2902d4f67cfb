#![allow(dead_code)]

use ndarray::Array2;
use sardine_etad::core::TimingModel;
use sardine_etad::io::{BurstIndex, CorrectionLayer, EtadBurst, EtadProduct, InstrumentCalibration};
use sardine_etad::types::{Polarization, HALF_LIGHT_SPEED};
use sardine_etad::MemoryRaster;

pub const WIDTH: usize = 16;
pub const HEIGHT: usize = 20;
pub const FIRST_LINE_TIME: f64 = 700_000_000.0;
pub const LINE_TIME_INTERVAL: f64 = 0.002;
pub const SLANT_RANGE: f64 = 800_000.0;
pub const RANGE_SPACING: f64 = 2.33;
pub const FREQUENCY_MHZ: f64 = 5405.0;
pub const SWATH: &str = "IW1";

pub const AZIMUTH_CALIBRATION: f64 = 4.0e-4;
pub const RANGE_CALIBRATION: f64 = 3.0e-9;

/// Range time shift that moves a pixel by `pixels` columns
pub fn range_shift(pixels: f64) -> f64 {
    pixels * RANGE_SPACING / HALF_LIGHT_SPEED
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn timing() -> TimingModel {
    TimingModel::new(
        FIRST_LINE_TIME,
        FIRST_LINE_TIME + (HEIGHT - 1) as f64 * LINE_TIME_INTERVAL,
        WIDTH,
        HEIGHT,
        SLANT_RANGE,
        RANGE_SPACING,
        FREQUENCY_MHZ,
        SWATH,
        Polarization::VV,
    )
    .expect("valid timing model")
}

/// ETAD burst grid around the test image; `rows` azimuth samples of 10 ms
pub fn burst(rows: usize) -> EtadBurst {
    EtadBurst::new(
        BurstIndex::default(),
        FIRST_LINE_TIME - 0.01,
        0.01,
        0.0053,
        1.0e-5,
        rows,
        6,
    )
    .expect("valid burst")
}

/// Height varying quadratically with range so adjacent differences are not constant
pub fn terrain(rows: usize, cols: usize) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        let (r, c) = (r as f64, c as f64);
        150.0 + 20.0 * c + 3.0 * c * c + 5.0 * r
    })
}

/// Constant-valued layers plus the height grid, all shaped like `burst`
pub fn product_with(burst: EtadBurst, layers: &[(CorrectionLayer, f64)]) -> EtadProduct {
    let shape = (burst.rows, burst.cols);
    let mut grids: Vec<(CorrectionLayer, Array2<f64>)> = layers
        .iter()
        .map(|&(layer, value)| (layer, Array2::from_elem(shape, value)))
        .collect();
    grids.push((CorrectionLayer::Height, terrain(burst.rows, burst.cols)));

    let mut product = EtadProduct::new();
    product.add_burst(burst, grids).expect("consistent burst layers");
    product.set_instrument_calibration(
        SWATH,
        InstrumentCalibration {
            azimuth_time: AZIMUTH_CALIBRATION,
            range_time: RANGE_CALIBRATION,
        },
    );
    product
}

/// Every layer zero: corrections are the identity
pub fn zero_product(rows: usize) -> EtadProduct {
    product_with(
        burst(rows),
        &[
            (CorrectionLayer::SumOfCorrectionsAzimuth, 0.0),
            (CorrectionLayer::SumOfCorrectionsRange, 0.0),
        ],
    )
}

/// Linear ramp image, strictly positive
pub fn ramp(x: f64, y: f64) -> f64 {
    1.0 + x + 10.0 * y
}

pub fn source_image() -> MemoryRaster {
    let raster = MemoryRaster::new(WIDTH, HEIGHT);
    let i = Array2::from_shape_fn((HEIGHT, WIDTH), |(y, x)| ramp(x as f64, y as f64) as f32);
    let q = i.mapv(|v| -0.5 * v);
    raster.add_band("i_VV", i).expect("i band");
    raster.add_band("q_VV", q).expect("q band");
    raster
}
