//! Access to ETAD (Extended Timing Annotation Dataset) correction layers.
//!
//! The corrector only relies on the [`CorrectionProvider`] contract. [`EtadProduct`]
//! is an in-memory provider holding burst grids that a product reader has
//! already decoded.

use crate::types::{SarError, SarResult};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Direction a correction layer applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerAxis {
    /// Azimuth time correction (s)
    Azimuth,
    /// Range time correction (s)
    Range,
    /// Terrain height (m)
    Height,
}

/// Named ETAD correction layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CorrectionLayer {
    TroposphericRange,
    IonosphericRange,
    GeodeticRange,
    DopplerRangeShift,
    /// Sum of all range corrections including the instrument timing calibration
    SumOfCorrectionsRange,
    GeodeticAzimuth,
    BistaticAzimuth,
    FmMismatchAzimuth,
    /// Sum of all azimuth corrections including the instrument timing calibration
    SumOfCorrectionsAzimuth,
    Height,
}

impl CorrectionLayer {
    /// Layer name as found in the ETAD product
    pub fn name(&self) -> &'static str {
        match self {
            CorrectionLayer::TroposphericRange => "troposphericCorrectionRg",
            CorrectionLayer::IonosphericRange => "ionosphericCorrectionRg",
            CorrectionLayer::GeodeticRange => "geodeticCorrectionRg",
            CorrectionLayer::DopplerRangeShift => "dopplerRangeShiftRg",
            CorrectionLayer::SumOfCorrectionsRange => "sumOfCorrectionsRg",
            CorrectionLayer::GeodeticAzimuth => "geodeticCorrectionAz",
            CorrectionLayer::BistaticAzimuth => "bistaticCorrectionAz",
            CorrectionLayer::FmMismatchAzimuth => "fmMismatchCorrectionAz",
            CorrectionLayer::SumOfCorrectionsAzimuth => "sumOfCorrectionsAz",
            CorrectionLayer::Height => "height",
        }
    }

    pub fn axis(&self) -> LayerAxis {
        match self {
            CorrectionLayer::TroposphericRange
            | CorrectionLayer::IonosphericRange
            | CorrectionLayer::GeodeticRange
            | CorrectionLayer::DopplerRangeShift
            | CorrectionLayer::SumOfCorrectionsRange => LayerAxis::Range,
            CorrectionLayer::GeodeticAzimuth
            | CorrectionLayer::BistaticAzimuth
            | CorrectionLayer::FmMismatchAzimuth
            | CorrectionLayer::SumOfCorrectionsAzimuth => LayerAxis::Azimuth,
            CorrectionLayer::Height => LayerAxis::Height,
        }
    }

    /// Pre-summed layers already contain the instrument timing calibration
    pub fn is_sum(&self) -> bool {
        matches!(
            self,
            CorrectionLayer::SumOfCorrectionsRange | CorrectionLayer::SumOfCorrectionsAzimuth
        )
    }

    /// Pre-summed layer for an axis
    pub fn sum_for(axis: LayerAxis) -> Option<CorrectionLayer> {
        match axis {
            LayerAxis::Azimuth => Some(CorrectionLayer::SumOfCorrectionsAzimuth),
            LayerAxis::Range => Some(CorrectionLayer::SumOfCorrectionsRange),
            LayerAxis::Height => None,
        }
    }
}

impl std::fmt::Display for CorrectionLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 1-based burst address inside an ETAD product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BurstIndex {
    pub swath: usize,
    pub row: usize,
    pub col: usize,
}

impl BurstIndex {
    pub fn new(swath: usize, row: usize, col: usize) -> Self {
        Self { swath, row, col }
    }
}

impl Default for BurstIndex {
    fn default() -> Self {
        Self::new(1, 1, 1)
    }
}

impl std::fmt::Display for BurstIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.swath, self.row, self.col)
    }
}

/// Sampling of one ETAD burst: a regular azimuth/range time grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EtadBurst {
    pub index: BurstIndex,
    /// Azimuth time of grid row 0 (s since 2000-01-01)
    pub azimuth_time_start: f64,
    pub azimuth_time_interval: f64,
    /// One-way range time of grid column 0 (s)
    pub range_time_start: f64,
    pub range_time_interval: f64,
    pub rows: usize,
    pub cols: usize,
}

impl EtadBurst {
    pub fn new(
        index: BurstIndex,
        azimuth_time_start: f64,
        azimuth_time_interval: f64,
        range_time_start: f64,
        range_time_interval: f64,
        rows: usize,
        cols: usize,
    ) -> SarResult<Self> {
        if rows == 0 || cols == 0 {
            return Err(SarError::InvalidConfiguration(format!(
                "Burst {} grid must be non-empty, got {}x{}",
                index, rows, cols
            )));
        }
        let spacing_ok = |v: f64| v.is_finite() && v > 0.0;
        if !spacing_ok(azimuth_time_interval) || !spacing_ok(range_time_interval) {
            return Err(SarError::InvalidConfiguration(format!(
                "Burst {} time intervals must be positive and finite",
                index
            )));
        }
        if !azimuth_time_start.is_finite() || !range_time_start.is_finite() {
            return Err(SarError::InvalidConfiguration(format!(
                "Burst {} start times must be finite",
                index
            )));
        }

        Ok(Self {
            index,
            azimuth_time_start,
            azimuth_time_interval,
            range_time_start,
            range_time_interval,
            rows,
            cols,
        })
    }

    pub fn azimuth_time_end(&self) -> f64 {
        self.azimuth_time_start + (self.rows - 1) as f64 * self.azimuth_time_interval
    }

    pub fn range_time_end(&self) -> f64 {
        self.range_time_start + (self.cols - 1) as f64 * self.range_time_interval
    }

    /// True when the time pair falls inside the burst grid (bounds inclusive)
    pub fn contains(&self, azimuth_time: f64, range_time: f64) -> bool {
        azimuth_time >= self.azimuth_time_start
            && azimuth_time <= self.azimuth_time_end()
            && range_time >= self.range_time_start
            && range_time <= self.range_time_end()
    }

    /// Bilinear interpolation of a burst layer at a time pair, clamped to the grid
    pub fn interpolate(&self, layer: &Array2<f64>, azimuth_time: f64, range_time: f64) -> f64 {
        let (rows, cols) = layer.dim();
        let fr = ((azimuth_time - self.azimuth_time_start) / self.azimuth_time_interval)
            .clamp(0.0, (rows - 1) as f64);
        let fc = ((range_time - self.range_time_start) / self.range_time_interval)
            .clamp(0.0, (cols - 1) as f64);

        let r0 = fr.floor() as usize;
        let c0 = fc.floor() as usize;
        let r1 = (r0 + 1).min(rows - 1);
        let c1 = (c0 + 1).min(cols - 1);
        let wr = fr - r0 as f64;
        let wc = fc - c0 as f64;

        layer[[r0, c0]] * (1.0 - wr) * (1.0 - wc)
            + layer[[r0, c1]] * (1.0 - wr) * wc
            + layer[[r1, c0]] * wr * (1.0 - wc)
            + layer[[r1, c1]] * wr * wc
    }
}

/// Per-tile cache of fetched burst layers
pub type LayerCache = HashMap<(BurstIndex, CorrectionLayer), Arc<Array2<f64>>>;

/// Source of ETAD correction data.
///
/// Implementations may fetch lazily and block; they must be shareable across
/// tile worker threads.
pub trait CorrectionProvider: Send + Sync {
    /// Burst covering a time pair, or [`SarError::CorrectionDataNotFound`]
    fn burst_at(&self, azimuth_time: f64, range_time: f64) -> SarResult<EtadBurst>;

    /// Burst by its 1-based address
    fn burst(&self, index: BurstIndex) -> SarResult<EtadBurst>;

    /// Full correction grid of a layer for one burst
    fn burst_layer(&self, layer: CorrectionLayer, burst: &EtadBurst) -> SarResult<Arc<Array2<f64>>>;

    /// Instrument azimuth timing calibration for a swath (s)
    fn instrument_azimuth_time_calibration(&self, swath: &str) -> SarResult<f64>;

    /// Instrument range timing calibration for a swath (s)
    fn instrument_range_time_calibration(&self, swath: &str) -> SarResult<f64>;

    /// Correction value of a layer at a time pair inside `burst`
    fn correction(
        &self,
        layer: CorrectionLayer,
        azimuth_time: f64,
        range_time: f64,
        burst: &EtadBurst,
        cache: &mut LayerCache,
    ) -> SarResult<f64> {
        let key = (burst.index, layer);
        let grid = match cache.get(&key) {
            Some(grid) => Arc::clone(grid),
            None => {
                let grid = self.burst_layer(layer, burst)?;
                cache.insert(key, Arc::clone(&grid));
                grid
            }
        };
        Ok(burst.interpolate(&grid, azimuth_time, range_time))
    }
}

/// Instrument timing calibration constants of one swath
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct InstrumentCalibration {
    /// Azimuth time offset (s)
    pub azimuth_time: f64,
    /// Range time offset (s)
    pub range_time: f64,
}

#[derive(Debug, Clone)]
struct BurstData {
    burst: EtadBurst,
    layers: HashMap<CorrectionLayer, Arc<Array2<f64>>>,
}

/// In-memory ETAD product
#[derive(Debug, Clone, Default)]
pub struct EtadProduct {
    bursts: Vec<BurstData>,
    calibrations: HashMap<String, InstrumentCalibration>,
}

impl EtadProduct {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a burst with its layers; every layer must match the burst grid shape
    pub fn add_burst(
        &mut self,
        burst: EtadBurst,
        layers: Vec<(CorrectionLayer, Array2<f64>)>,
    ) -> SarResult<()> {
        if self.bursts.iter().any(|b| b.burst.index == burst.index) {
            return Err(SarError::InvalidConfiguration(format!(
                "Burst {} registered twice",
                burst.index
            )));
        }

        let mut layer_map = HashMap::with_capacity(layers.len());
        for (layer, grid) in layers {
            if grid.dim() != (burst.rows, burst.cols) {
                return Err(SarError::GridSizeMismatch {
                    what: format!("Layer {} of burst {}", layer, burst.index),
                    expected: burst.rows * burst.cols,
                    actual: grid.len(),
                });
            }
            layer_map.insert(layer, Arc::new(grid));
        }

        log::debug!(
            "Added ETAD burst {} with {} layers ({}x{} grid)",
            burst.index,
            layer_map.len(),
            burst.rows,
            burst.cols
        );
        self.bursts.push(BurstData {
            burst,
            layers: layer_map,
        });
        Ok(())
    }

    pub fn set_instrument_calibration(&mut self, swath: impl Into<String>, calibration: InstrumentCalibration) {
        self.calibrations.insert(swath.into(), calibration);
    }

    pub fn bursts(&self) -> impl Iterator<Item = &EtadBurst> {
        self.bursts.iter().map(|b| &b.burst)
    }

    fn calibration(&self, swath: &str) -> SarResult<&InstrumentCalibration> {
        self.calibrations
            .get(swath)
            .ok_or_else(|| SarError::MissingCalibration(swath.to_string()))
    }
}

impl CorrectionProvider for EtadProduct {
    fn burst_at(&self, azimuth_time: f64, range_time: f64) -> SarResult<EtadBurst> {
        self.bursts
            .iter()
            .find(|b| b.burst.contains(azimuth_time, range_time))
            .map(|b| b.burst)
            .ok_or(SarError::CorrectionDataNotFound {
                azimuth_time,
                range_time,
            })
    }

    fn burst(&self, index: BurstIndex) -> SarResult<EtadBurst> {
        self.bursts
            .iter()
            .find(|b| b.burst.index == index)
            .map(|b| b.burst)
            .ok_or_else(|| SarError::Processing(format!("ETAD burst {} not found", index)))
    }

    fn burst_layer(&self, layer: CorrectionLayer, burst: &EtadBurst) -> SarResult<Arc<Array2<f64>>> {
        self.bursts
            .iter()
            .find(|b| b.burst.index == burst.index)
            .and_then(|b| b.layers.get(&layer))
            .cloned()
            .ok_or_else(|| SarError::MissingLayer {
                layer: layer.name().to_string(),
                burst: burst.index.to_string(),
            })
    }

    fn instrument_azimuth_time_calibration(&self, swath: &str) -> SarResult<f64> {
        self.calibration(swath).map(|c| c.azimuth_time)
    }

    fn instrument_range_time_calibration(&self, swath: &str) -> SarResult<f64> {
        self.calibration(swath).map(|c| c.range_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn burst() -> EtadBurst {
        EtadBurst::new(BurstIndex::default(), 100.0, 1.0, 0.005, 1.0e-6, 3, 3).unwrap()
    }

    #[test]
    fn test_interpolation_is_bilinear_and_clamped() {
        let b = burst();
        let grid = array![[0.0, 1.0, 2.0], [10.0, 11.0, 12.0], [20.0, 21.0, 22.0]];

        assert_relative_eq!(b.interpolate(&grid, 100.5, 0.005 + 0.5e-6), 5.5, epsilon = 1e-9);
        assert_relative_eq!(b.interpolate(&grid, 102.0, 0.005 + 2.0e-6), 22.0, epsilon = 1e-9);
        // Beyond the grid the edge value is held
        assert_relative_eq!(b.interpolate(&grid, 150.0, 0.0), 20.0, epsilon = 1e-9);
    }

    #[test]
    fn test_burst_lookup_and_missing_coverage() {
        let mut product = EtadProduct::new();
        product
            .add_burst(burst(), vec![(CorrectionLayer::Height, Array2::zeros((3, 3)))])
            .unwrap();

        assert!(product.burst_at(101.0, 0.005001).is_ok());
        assert!(matches!(
            product.burst_at(99.0, 0.005001),
            Err(SarError::CorrectionDataNotFound { .. })
        ));
        assert!(matches!(
            product.burst_layer(CorrectionLayer::TroposphericRange, &burst()),
            Err(SarError::MissingLayer { .. })
        ));
    }

    #[test]
    fn test_layer_shape_must_match_burst() {
        let mut product = EtadProduct::new();
        let result = product.add_burst(burst(), vec![(CorrectionLayer::Height, Array2::zeros((2, 3)))]);
        assert!(matches!(result, Err(SarError::GridSizeMismatch { .. })));
    }

    #[test]
    fn test_layer_cache_is_filled_once() {
        let mut product = EtadProduct::new();
        product
            .add_burst(burst(), vec![(CorrectionLayer::Height, Array2::from_elem((3, 3), 42.0))])
            .unwrap();

        let b = product.burst_at(100.0, 0.005).unwrap();
        let mut cache = LayerCache::new();
        for _ in 0..3 {
            let v = product
                .correction(CorrectionLayer::Height, 100.0, 0.005, &b, &mut cache)
                .unwrap();
            assert_relative_eq!(v, 42.0);
        }
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_missing_calibration() {
        let product = EtadProduct::new();
        assert!(matches!(
            product.instrument_range_time_calibration("S1"),
            Err(SarError::MissingCalibration(_))
        ));
    }
}
