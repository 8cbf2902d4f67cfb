use num_complex::Complex;
use serde::{Deserialize, Serialize};

/// Complex-valued SAR sample (I + jQ)
pub type SarComplex = Complex<f32>;

/// Speed of light in vacuum (m/s)
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Half the speed of light, converts two-way slant range to one-way time (m/s)
pub const HALF_LIGHT_SPEED: f64 = SPEED_OF_LIGHT / 2.0;

/// Nanoseconds per second
pub const ONE_BILLION: f64 = 1.0e9;

/// Polarization modes for Sentinel-1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarization {
    VV,
    VH,
    HV,
    HH,
}

impl std::fmt::Display for Polarization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Polarization::VV => write!(f, "VV"),
            Polarization::VH => write!(f, "VH"),
            Polarization::HV => write!(f, "HV"),
            Polarization::HH => write!(f, "HH"),
        }
    }
}

impl std::str::FromStr for Polarization {
    type Err = SarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "VV" => Ok(Polarization::VV),
            "VH" => Ok(Polarization::VH),
            "HV" => Ok(Polarization::HV),
            "HH" => Ok(Polarization::HH),
            _ => Err(SarError::InvalidConfiguration(format!(
                "Invalid polarization: {}",
                s
            ))),
        }
    }
}

/// Fractional position in source image coordinates (x = range pixel, y = azimuth line)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PixelPos {
    pub x: f64,
    pub y: f64,
}

impl PixelPos {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Rectangular pixel region, the unit of concurrent work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileRect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl TileRect {
    pub fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self { x, y, width, height }
    }

    /// Last column covered (inclusive)
    pub fn x_max(&self) -> usize {
        self.x + self.width.saturating_sub(1)
    }

    /// Last line covered (inclusive)
    pub fn y_max(&self) -> usize {
        self.y + self.height.saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }

    /// Expand the rectangle by `margin` pixels on every side, clipped to the image
    pub fn with_halo(&self, margin: usize, image_width: usize, image_height: usize) -> TileRect {
        let x0 = self.x.saturating_sub(margin);
        let y0 = self.y.saturating_sub(margin);
        let x_end = (self.x + self.width + margin).min(image_width);
        let y_end = (self.y + self.height + margin).min(image_height);

        TileRect {
            x: x0,
            y: y0,
            width: x_end.saturating_sub(x0),
            height: y_end.saturating_sub(y0),
        }
    }

    /// Split an image into tiles of at most `tile_width` x `tile_height` pixels, row-major
    pub fn tiles_covering(
        image_width: usize,
        image_height: usize,
        tile_width: usize,
        tile_height: usize,
    ) -> Vec<TileRect> {
        if tile_width == 0 || tile_height == 0 {
            return Vec::new();
        }

        let mut tiles = Vec::new();
        for y in (0..image_height).step_by(tile_height) {
            for x in (0..image_width).step_by(tile_width) {
                tiles.push(TileRect {
                    x,
                    y,
                    width: tile_width.min(image_width - x),
                    height: tile_height.min(image_height - y),
                });
            }
        }
        tiles
    }
}

impl std::fmt::Display for TileRect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[x={}, y={}, {}x{}]", self.x, self.y, self.width, self.height)
    }
}

/// Error types for SAR processing
#[derive(Debug, Clone, thiserror::Error)]
pub enum SarError {
    #[error("{what} size {actual} does not match declared width x height = {expected}")]
    GridSizeMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid geolocation grid: {0}")]
    InvalidGrid(String),

    #[error("Correction data not found for azimuth time {azimuth_time} s, range time {range_time} s")]
    CorrectionDataNotFound { azimuth_time: f64, range_time: f64 },

    #[error("Correction layer '{layer}' not available for burst {burst}")]
    MissingLayer { layer: String, burst: String },

    #[error("Instrument timing calibration not available for swath {0}")]
    MissingCalibration(String),

    #[error("Singular regression: {0}")]
    SingularRegression(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid timing model: {0}")]
    InvalidTimingModel(String),

    #[error("Raster error: {0}")]
    Raster(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for SAR operations
pub type SarResult<T> = Result<T, SarError>;
