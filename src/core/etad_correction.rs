//! ETAD timing correction of SLC images.
//!
//! For every output pixel the nominal azimuth/range times are shifted by the
//! ETAD corrections of the covering burst and mapped back to a fractional
//! source position. The image is then either resampled at those positions or,
//! in phase-correction mode, the InSAR range corrections are exported as a
//! phase band together with the ETAD height.

use crate::core::gradient::GradientEstimator;
use crate::core::resampling::{ImageResampler, ResamplingMethod};
use crate::core::timing::TimingModel;
use crate::io::etad::{BurstIndex, CorrectionLayer, CorrectionProvider, EtadBurst, LayerAxis, LayerCache};
use crate::io::raster::{RasterSink, RasterSource};
use crate::types::{PixelPos, SarError, SarResult, TileRect};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::f64::consts::PI;
use std::sync::Arc;

/// Output band holding the range correction as phase (rad)
pub const PHASE_BAND: &str = "phase";
/// Output band holding the ETAD terrain height (m)
pub const HEIGHT_BAND: &str = "height";

/// How the timing correction of one axis is assembled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TimingCorrectionMode {
    /// Use the pre-summed ETAD layer. The instrument timing calibration is
    /// part of that sum, so it is never added again.
    SumOfCorrections,
    /// Sum the listed layers per pixel, then add the instrument timing
    /// calibration once when `instrument_calibration` is set.
    SelectedLayers {
        layers: Vec<CorrectionLayer>,
        instrument_calibration: bool,
    },
}

impl TimingCorrectionMode {
    pub fn validate(&self, axis: LayerAxis) -> SarResult<()> {
        match self {
            TimingCorrectionMode::SumOfCorrections => {
                if CorrectionLayer::sum_for(axis).is_none() {
                    return Err(SarError::InvalidConfiguration(format!(
                        "No pre-summed layer exists for {:?} corrections",
                        axis
                    )));
                }
                Ok(())
            }
            TimingCorrectionMode::SelectedLayers {
                layers,
                instrument_calibration,
            } => {
                validate_layer_list(layers, axis)?;
                if layers.is_empty() && !instrument_calibration {
                    return Err(SarError::InvalidConfiguration(format!(
                        "{:?} correction selects no layers and no instrument calibration",
                        axis
                    )));
                }
                Ok(())
            }
        }
    }

    fn layers(&self, axis: LayerAxis) -> Vec<CorrectionLayer> {
        match self {
            TimingCorrectionMode::SumOfCorrections => {
                CorrectionLayer::sum_for(axis).into_iter().collect()
            }
            TimingCorrectionMode::SelectedLayers { layers, .. } => layers.clone(),
        }
    }

    fn adds_instrument_calibration(&self) -> bool {
        matches!(
            self,
            TimingCorrectionMode::SelectedLayers {
                instrument_calibration: true,
                ..
            }
        )
    }
}

/// Reject wrong-axis, pre-summed and duplicated layers
fn validate_layer_list(layers: &[CorrectionLayer], axis: LayerAxis) -> SarResult<()> {
    let mut seen = HashSet::new();
    for layer in layers {
        if layer.axis() != axis {
            return Err(SarError::InvalidConfiguration(format!(
                "Layer {} is not a {:?} correction",
                layer, axis
            )));
        }
        if layer.is_sum() {
            return Err(SarError::InvalidConfiguration(format!(
                "Layer {} already contains the instrument calibration and every other \
                 correction; use SumOfCorrections instead of listing it",
                layer
            )));
        }
        if !seen.insert(*layer) {
            return Err(SarError::InvalidConfiguration(format!(
                "Layer {} selected twice",
                layer
            )));
        }
    }
    Ok(())
}

/// What the corrector produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputMode {
    /// Resample every source band at the corrected positions
    ResampleImage { resampling: ResamplingMethod },
    /// Copy source bands and add InSAR phase correction and height bands
    PhaseCorrections,
}

/// ETAD correction parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtadCorrectionParams {
    pub azimuth: TimingCorrectionMode,
    pub range: TimingCorrectionMode,
    pub output: OutputMode,
    /// Range layers converted to phase in [`OutputMode::PhaseCorrections`]
    pub insar_range_layers: Vec<CorrectionLayer>,
    /// Layer regressed against height for the phase gradient
    pub gradient_layer: CorrectionLayer,
    /// Burst the gradient is estimated from
    pub reference_burst: BurstIndex,
}

/// Commits both axes to [`TimingCorrectionMode::SumOfCorrections`], the
/// pre-summed layers that already contain the instrument calibration. Use
/// [`EtadCorrectionParams::new`] to choose the modes explicitly.
impl Default for EtadCorrectionParams {
    fn default() -> Self {
        Self {
            azimuth: TimingCorrectionMode::SumOfCorrections,
            range: TimingCorrectionMode::SumOfCorrections,
            output: OutputMode::ResampleImage {
                resampling: ResamplingMethod::Bilinear,
            },
            insar_range_layers: vec![
                CorrectionLayer::TroposphericRange,
                CorrectionLayer::IonosphericRange,
                CorrectionLayer::GeodeticRange,
            ],
            gradient_layer: CorrectionLayer::TroposphericRange,
            reference_burst: BurstIndex::default(),
        }
    }
}

impl EtadCorrectionParams {
    /// Parameters with explicit azimuth and range correction modes
    pub fn new(azimuth: TimingCorrectionMode, range: TimingCorrectionMode, output: OutputMode) -> Self {
        Self {
            azimuth,
            range,
            output,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> SarResult<()> {
        self.azimuth.validate(LayerAxis::Azimuth)?;
        self.range.validate(LayerAxis::Range)?;

        if self.output == OutputMode::PhaseCorrections {
            if self.insar_range_layers.is_empty() {
                return Err(SarError::InvalidConfiguration(
                    "Phase correction output needs at least one InSAR range layer".to_string(),
                ));
            }
            validate_layer_list(&self.insar_range_layers, LayerAxis::Range)?;
        }

        if self.gradient_layer.axis() == LayerAxis::Height {
            return Err(SarError::InvalidConfiguration(
                "Gradient layer must be a correction layer, not height".to_string(),
            ));
        }
        Ok(())
    }
}

/// Layers and calibration offset resolved for one axis
#[derive(Debug, Clone)]
struct AxisCorrection {
    layers: Vec<CorrectionLayer>,
    calibration: f64,
}

/// Phase and height of one tile in phase-correction mode
#[derive(Debug, Clone)]
pub struct CorrectionOutputTile {
    pub rect: TileRect,
    /// -2π · f · (range correction + range calibration), radians
    pub phase: Array2<f32>,
    /// ETAD height, metres
    pub height: Array2<f32>,
}

/// Maps nominal pixel positions to ETAD-corrected source positions
pub struct TimingCorrectionEngine {
    timing: TimingModel,
    provider: Arc<dyn CorrectionProvider>,
    azimuth: AxisCorrection,
    range: AxisCorrection,
}

impl TimingCorrectionEngine {
    pub fn new(
        timing: TimingModel,
        provider: Arc<dyn CorrectionProvider>,
        azimuth_mode: &TimingCorrectionMode,
        range_mode: &TimingCorrectionMode,
    ) -> SarResult<Self> {
        timing.validate()?;
        azimuth_mode.validate(LayerAxis::Azimuth)?;
        range_mode.validate(LayerAxis::Range)?;

        let azimuth_calibration = if azimuth_mode.adds_instrument_calibration() {
            provider.instrument_azimuth_time_calibration(&timing.swath)?
        } else {
            0.0
        };
        let range_calibration = if range_mode.adds_instrument_calibration() {
            provider.instrument_range_time_calibration(&timing.swath)?
        } else {
            0.0
        };

        let azimuth = AxisCorrection {
            layers: azimuth_mode.layers(LayerAxis::Azimuth),
            calibration: azimuth_calibration,
        };
        let range = AxisCorrection {
            layers: range_mode.layers(LayerAxis::Range),
            calibration: range_calibration,
        };

        log::debug!(
            "Timing correction: azimuth layers {:?} + {:.3e} s, range layers {:?} + {:.3e} s",
            azimuth.layers,
            azimuth.calibration,
            range.layers,
            range.calibration
        );

        Ok(Self {
            timing,
            provider,
            azimuth,
            range,
        })
    }

    pub fn timing(&self) -> &TimingModel {
        &self.timing
    }

    pub fn provider(&self) -> &dyn CorrectionProvider {
        self.provider.as_ref()
    }

    /// Calibration offset added once to the azimuth correction (0 when already summed)
    pub fn azimuth_calibration(&self) -> f64 {
        self.azimuth.calibration
    }

    /// Calibration offset added once to the range correction (0 when already summed)
    pub fn range_calibration(&self) -> f64 {
        self.range.calibration
    }

    fn check_rect(&self, rect: &TileRect) -> SarResult<()> {
        if rect.is_empty()
            || rect.x + rect.width > self.timing.image_width
            || rect.y + rect.height > self.timing.image_height
        {
            return Err(SarError::Processing(format!(
                "Tile {} outside {}x{} image",
                rect, self.timing.image_width, self.timing.image_height
            )));
        }
        Ok(())
    }

    fn sum_layers(
        &self,
        layers: &[CorrectionLayer],
        azimuth_time: f64,
        range_time: f64,
        burst: &EtadBurst,
        cache: &mut LayerCache,
    ) -> SarResult<f64> {
        let mut sum = 0.0;
        for &layer in layers {
            sum += self
                .provider
                .correction(layer, azimuth_time, range_time, burst, cache)?;
        }
        Ok(sum)
    }

    /// Visit every pixel of a tile with its nominal times and covering burst
    fn for_each_pixel<F>(&self, rect: TileRect, mut f: F) -> SarResult<()>
    where
        F: FnMut(usize, usize, f64, f64, &EtadBurst, &mut LayerCache) -> SarResult<()>,
    {
        self.check_rect(&rect)?;

        let range_times: Vec<f64> = (rect.x..rect.x + rect.width)
            .map(|x| self.timing.range_time(x as f64))
            .collect();
        let mut cache = LayerCache::new();

        for yy in 0..rect.height {
            let az_time = self.timing.azimuth_time((rect.y + yy) as f64);
            for (xx, &rg_time) in range_times.iter().enumerate() {
                let burst = self.provider.burst_at(az_time, rg_time)?;
                f(yy, xx, az_time, rg_time, &burst, &mut cache)?;
            }
        }
        Ok(())
    }

    /// Per-pixel sum of `layers` over a tile, indexed (line, pixel) relative to the tile
    pub fn correction_for_tile(&self, layers: &[CorrectionLayer], rect: TileRect) -> SarResult<Array2<f64>> {
        let mut correction = Array2::zeros((rect.height, rect.width));
        self.for_each_pixel(rect, |yy, xx, az, rg, burst, cache| {
            correction[[yy, xx]] = self.sum_layers(layers, az, rg, burst, cache)?;
            Ok(())
        })?;
        Ok(correction)
    }

    /// Azimuth time correction of a tile (s), calibration not included
    pub fn azimuth_time_correction(&self, rect: TileRect) -> SarResult<Array2<f64>> {
        self.correction_for_tile(&self.azimuth.layers, rect)
    }

    /// Range time correction of a tile (s), calibration not included
    pub fn range_time_correction(&self, rect: TileRect) -> SarResult<Array2<f64>> {
        self.correction_for_tile(&self.range.layers, rect)
    }

    /// Corrected fractional source position of every pixel of a tile
    pub fn corrected_positions(&self, rect: TileRect) -> SarResult<Array2<PixelPos>> {
        let mut positions = Array2::from_elem((rect.height, rect.width), PixelPos::default());

        self.for_each_pixel(rect, |yy, xx, az, rg, burst, cache| {
            let az_corr = self.sum_layers(&self.azimuth.layers, az, rg, burst, cache)?;
            let rg_corr = self.sum_layers(&self.range.layers, az, rg, burst, cache)?;

            let az_corr_time = az + az_corr + self.azimuth.calibration;
            let rg_corr_time = rg + rg_corr + self.range.calibration;

            positions[[yy, xx]] = PixelPos::new(
                self.timing.pixel_at(rg_corr_time),
                self.timing.line_at(az_corr_time),
            );
            Ok(())
        })?;

        Ok(positions)
    }

    /// InSAR phase and height of a tile.
    ///
    /// `range_calibration` is the instrument range timing calibration; it is
    /// added once to the summed `layers` before conversion to phase.
    pub fn phase_corrections(
        &self,
        layers: &[CorrectionLayer],
        range_calibration: f64,
        rect: TileRect,
    ) -> SarResult<CorrectionOutputTile> {
        let mut phase = Array2::zeros((rect.height, rect.width));
        let mut height = Array2::zeros((rect.height, rect.width));
        let phase_scale = -2.0 * PI * self.timing.radar_frequency;

        self.for_each_pixel(rect, |yy, xx, az, rg, burst, cache| {
            let delay = self.sum_layers(layers, az, rg, burst, cache)? + range_calibration;
            phase[[yy, xx]] = (phase_scale * delay) as f32;
            height[[yy, xx]] = self
                .provider
                .correction(CorrectionLayer::Height, az, rg, burst, cache)? as f32;
            Ok(())
        })?;

        Ok(CorrectionOutputTile { rect, phase, height })
    }
}

impl std::fmt::Debug for TimingCorrectionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimingCorrectionEngine")
            .field("timing", &self.timing)
            .field("azimuth", &self.azimuth)
            .field("range", &self.range)
            .finish()
    }
}

/// Where a target band's values come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetBandKind {
    /// Source band resampled at corrected positions
    Resampled,
    /// Source band copied unchanged
    Copied,
    PhaseCorrection,
    Height,
}

/// One band of the corrected product
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetBand {
    pub name: String,
    pub kind: TargetBandKind,
    pub source_band: Option<String>,
}

/// All bands computed for one tile
#[derive(Debug, Clone)]
pub struct TileOutput {
    pub rect: TileRect,
    pub bands: Vec<(String, Array2<f32>)>,
}

impl TileOutput {
    pub fn band(&self, name: &str) -> Option<&Array2<f32>> {
        self.bands.iter().find(|(n, _)| n == name).map(|(_, data)| data)
    }
}

/// Result of processing one tile
#[derive(Debug)]
pub struct TileOutcome {
    pub rect: TileRect,
    pub result: SarResult<()>,
}

/// ETAD corrector for single-swath SLC products
pub struct EtadCorrector {
    params: EtadCorrectionParams,
    engine: TimingCorrectionEngine,
    resampler: Option<ImageResampler>,
    gradient: GradientEstimator,
    /// Instrument range calibration used for phase output
    phase_range_calibration: f64,
}

impl EtadCorrector {
    pub fn new(
        timing: TimingModel,
        provider: Arc<dyn CorrectionProvider>,
        params: EtadCorrectionParams,
    ) -> SarResult<Self> {
        params.validate()?;
        log::info!(
            "Initialising ETAD corrector for swath {} {} ({}x{}), output {:?}",
            timing.swath,
            timing.polarization,
            timing.image_width,
            timing.image_height,
            params.output
        );

        let (resampler, phase_range_calibration) = match params.output {
            OutputMode::ResampleImage { resampling } => (
                Some(ImageResampler::new(resampling, timing.image_width, timing.image_height)),
                0.0,
            ),
            OutputMode::PhaseCorrections => {
                (None, provider.instrument_range_time_calibration(&timing.swath)?)
            }
        };

        let engine = TimingCorrectionEngine::new(timing, provider, &params.azimuth, &params.range)?;
        let gradient = GradientEstimator::new(params.gradient_layer, params.reference_burst);

        Ok(Self {
            params,
            engine,
            resampler,
            gradient,
            phase_range_calibration,
        })
    }

    pub fn params(&self) -> &EtadCorrectionParams {
        &self.params
    }

    pub fn engine(&self) -> &TimingCorrectionEngine {
        &self.engine
    }

    /// Bands of the corrected product for the given source bands
    pub fn target_bands(&self, source_bands: &[String]) -> Vec<TargetBand> {
        let kind = match self.params.output {
            OutputMode::ResampleImage { .. } => TargetBandKind::Resampled,
            OutputMode::PhaseCorrections => TargetBandKind::Copied,
        };

        let mut bands: Vec<TargetBand> = source_bands
            .iter()
            .map(|name| TargetBand {
                name: name.clone(),
                kind: kind.clone(),
                source_band: Some(name.clone()),
            })
            .collect();

        if self.params.output == OutputMode::PhaseCorrections {
            bands.push(TargetBand {
                name: PHASE_BAND.to_string(),
                kind: TargetBandKind::PhaseCorrection,
                source_band: None,
            });
            bands.push(TargetBand {
                name: HEIGHT_BAND.to_string(),
                kind: TargetBandKind::Height,
                source_band: None,
            });
        }
        bands
    }

    /// Corrected source positions of a tile, for resampling or diagnostics
    pub fn corrected_positions(&self, rect: TileRect) -> SarResult<Array2<PixelPos>> {
        self.engine.corrected_positions(rect)
    }

    /// Slope of the gradient layer against height, estimated once per corrector
    pub fn gradient(&self) -> SarResult<f64> {
        self.gradient.gradient(self.engine.provider())
    }

    /// Gradient converted to interferometric phase per metre of height (rad/m)
    pub fn phase_gradient(&self) -> SarResult<f64> {
        Ok(-2.0 * PI * self.engine.timing().radar_frequency * self.gradient()?)
    }

    /// Compute every target band of one tile without writing anything
    pub fn compute_tile(&self, rect: TileRect, source: &dyn RasterSource) -> SarResult<TileOutput> {
        let timing = self.engine.timing();
        if source.dimensions() != (timing.image_width, timing.image_height) {
            return Err(SarError::Raster(format!(
                "Source raster is {:?}, timing model expects {}x{}",
                source.dimensions(),
                timing.image_width,
                timing.image_height
            )));
        }

        let mut bands = Vec::new();
        match &self.resampler {
            Some(resampler) => {
                let positions = self.engine.corrected_positions(rect)?;
                let source_rect = resampler.source_rect(rect);
                log::debug!("Resampling tile {} from source {}", rect, source_rect);

                for name in source.band_names()? {
                    let data = source.read_tile(&name, source_rect)?;
                    let resampled = resampler.resample_tile(data.view(), source_rect, &positions)?;
                    bands.push((name, resampled));
                }
            }
            None => {
                self.gradient()?;
                let corrections = self.engine.phase_corrections(
                    &self.params.insar_range_layers,
                    self.phase_range_calibration,
                    rect,
                )?;

                for name in source.band_names()? {
                    let data = source.read_tile(&name, rect)?;
                    bands.push((name, data));
                }
                bands.push((PHASE_BAND.to_string(), corrections.phase));
                bands.push((HEIGHT_BAND.to_string(), corrections.height));
            }
        }

        Ok(TileOutput { rect, bands })
    }

    fn process_tile(&self, rect: TileRect, source: &dyn RasterSource, sink: &dyn RasterSink) -> TileOutcome {
        let result = self.compute_tile(rect, source).and_then(|output| {
            // Every band must have a target before the first write
            for (name, _) in &output.bands {
                if !sink.has_band(name)? {
                    return Err(SarError::Raster(format!(
                        "Target raster has no band {}, tile {} not written",
                        name, rect
                    )));
                }
            }
            for (name, data) in &output.bands {
                sink.write_tile(name, rect, data)?;
            }
            Ok(())
        });

        if let Err(e) = &result {
            log::warn!("Tile {} failed: {}", rect, e);
        }
        TileOutcome { rect, result }
    }

    /// Compute and write a set of independent tiles.
    ///
    /// A tile is written only after all of its bands are computed, so a
    /// failing tile leaves the sink untouched for that rectangle.
    #[cfg(feature = "parallel")]
    pub fn process_tiles(
        &self,
        rects: &[TileRect],
        source: &dyn RasterSource,
        sink: &dyn RasterSink,
    ) -> Vec<TileOutcome> {
        use rayon::prelude::*;

        log::info!(
            "Processing {} tiles using {} threads",
            rects.len(),
            rayon::current_num_threads()
        );
        let outcomes: Vec<TileOutcome> = rects
            .par_iter()
            .map(|&rect| self.process_tile(rect, source, sink))
            .collect();
        log_summary(&outcomes);
        outcomes
    }

    #[cfg(not(feature = "parallel"))]
    pub fn process_tiles(
        &self,
        rects: &[TileRect],
        source: &dyn RasterSource,
        sink: &dyn RasterSink,
    ) -> Vec<TileOutcome> {
        log::info!("Processing {} tiles sequentially", rects.len());
        let outcomes: Vec<TileOutcome> = rects
            .iter()
            .map(|&rect| self.process_tile(rect, source, sink))
            .collect();
        log_summary(&outcomes);
        outcomes
    }
}

fn log_summary(outcomes: &[TileOutcome]) {
    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    log::info!(
        "ETAD correction finished: {} tiles, {} failed",
        outcomes.len(),
        failed
    );
}

impl std::fmt::Debug for EtadCorrector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EtadCorrector")
            .field("params", &self.params)
            .field("engine", &self.engine)
            .field("resampler", &self.resampler)
            .field("gradient_computed", &self.gradient.is_computed())
            .finish()
    }
}
