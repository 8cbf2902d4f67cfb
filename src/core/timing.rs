use crate::types::{Polarization, SarError, SarResult, HALF_LIGHT_SPEED};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Linear zero-Doppler timing of a single-swath SLC image.
///
/// Azimuth times are seconds since 2000-01-01T00:00:00Z, the reference the
/// ETAD correction products use. Range times are one-way slant range times
/// in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingModel {
    /// Azimuth time of the first line (s)
    pub first_line_time: f64,
    /// Azimuth time between consecutive lines (s)
    pub line_time_interval: f64,
    /// Slant range to the first pixel (m)
    pub slant_range_to_first_pixel: f64,
    /// Slant range pixel spacing (m)
    pub range_spacing: f64,
    /// Radar carrier frequency (Hz)
    pub radar_frequency: f64,
    /// Swath identifier, e.g. "S1" or "IW2"
    pub swath: String,
    pub polarization: Polarization,
    /// Image width in pixels
    pub image_width: usize,
    /// Image height in lines
    pub image_height: usize,
}

impl TimingModel {
    /// Build the model from abstracted annotation values.
    ///
    /// `last_line_time` and `image_height` define the line time interval;
    /// `radar_frequency_mhz` is converted to Hz.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        first_line_time: f64,
        last_line_time: f64,
        image_width: usize,
        image_height: usize,
        slant_range_to_first_pixel: f64,
        range_spacing: f64,
        radar_frequency_mhz: f64,
        swath: impl Into<String>,
        polarization: Polarization,
    ) -> SarResult<Self> {
        if image_height < 2 {
            return Err(SarError::InvalidTimingModel(format!(
                "Image height must be at least 2 lines, got {}",
                image_height
            )));
        }

        let model = Self {
            first_line_time,
            line_time_interval: (last_line_time - first_line_time) / (image_height - 1) as f64,
            slant_range_to_first_pixel,
            range_spacing,
            radar_frequency: radar_frequency_mhz * 1.0e6,
            swath: swath.into(),
            polarization,
            image_width,
            image_height,
        };
        model.validate()?;
        Ok(model)
    }

    /// Build the model from UTC first/last line times
    #[allow(clippy::too_many_arguments)]
    pub fn from_utc(
        first_line_utc: DateTime<Utc>,
        last_line_utc: DateTime<Utc>,
        image_width: usize,
        image_height: usize,
        slant_range_to_first_pixel: f64,
        range_spacing: f64,
        radar_frequency_mhz: f64,
        swath: impl Into<String>,
        polarization: Polarization,
    ) -> SarResult<Self> {
        Self::new(
            utc_to_seconds(&first_line_utc),
            utc_to_seconds(&last_line_utc),
            image_width,
            image_height,
            slant_range_to_first_pixel,
            range_spacing,
            radar_frequency_mhz,
            swath,
            polarization,
        )
    }

    /// Check that every scalar is finite and the spacings are non-zero
    pub fn validate(&self) -> SarResult<()> {
        let checks = [
            ("first line time", self.first_line_time),
            ("line time interval", self.line_time_interval),
            ("slant range to first pixel", self.slant_range_to_first_pixel),
            ("range spacing", self.range_spacing),
            ("radar frequency", self.radar_frequency),
        ];
        for (name, value) in checks {
            if !value.is_finite() {
                return Err(SarError::InvalidTimingModel(format!("{} is not finite", name)));
            }
        }

        if self.line_time_interval == 0.0 {
            return Err(SarError::InvalidTimingModel(
                "line time interval is zero".to_string(),
            ));
        }
        if self.range_spacing == 0.0 {
            return Err(SarError::InvalidTimingModel("range spacing is zero".to_string()));
        }
        if self.image_width == 0 || self.image_height == 0 {
            return Err(SarError::InvalidTimingModel(format!(
                "image dimensions must be non-zero, got {}x{}",
                self.image_width, self.image_height
            )));
        }
        Ok(())
    }

    /// Nominal azimuth time of line `y`
    #[inline]
    pub fn azimuth_time(&self, y: f64) -> f64 {
        self.first_line_time + y * self.line_time_interval
    }

    /// Nominal one-way slant range time of pixel `x`
    #[inline]
    pub fn range_time(&self, x: f64) -> f64 {
        (self.slant_range_to_first_pixel + x * self.range_spacing) / HALF_LIGHT_SPEED
    }

    /// Fractional line of an azimuth time
    #[inline]
    pub fn line_at(&self, azimuth_time: f64) -> f64 {
        (azimuth_time - self.first_line_time) / self.line_time_interval
    }

    /// Fractional pixel of a one-way slant range time
    #[inline]
    pub fn pixel_at(&self, range_time: f64) -> f64 {
        (range_time * HALF_LIGHT_SPEED - self.slant_range_to_first_pixel) / self.range_spacing
    }

    /// Azimuth time of the last line
    pub fn last_line_time(&self) -> f64 {
        self.azimuth_time((self.image_height - 1) as f64)
    }
}

/// Unix timestamp of 2000-01-01T00:00:00Z
const EPOCH_2000_UNIX_SECONDS: i64 = 946_684_800;

/// Seconds elapsed since 2000-01-01T00:00:00Z
pub fn utc_to_seconds(time: &DateTime<Utc>) -> f64 {
    (time.timestamp() - EPOCH_2000_UNIX_SECONDS) as f64
        + time.timestamp_subsec_nanos() as f64 * 1.0e-9
}
