//! Core geolocation and timing correction modules

pub mod etad_correction;
pub mod geolocation_grid;
pub mod gradient;
pub mod resampling;
pub mod timing;

// Re-export main types
pub use etad_correction::{
    CorrectionOutputTile, EtadCorrectionParams, EtadCorrector, OutputMode, TargetBand, TargetBandKind,
    TileOutcome, TileOutput, TimingCorrectionEngine, TimingCorrectionMode, HEIGHT_BAND, PHASE_BAND,
};
pub use geolocation_grid::{
    infer_grid_dimensions, normalize_antimeridian, GeolocationGrid, GeolocationGridPoint, GridResampler,
    TargetGridLayout, TiePointGrid, TiePointGridSet,
};
pub use gradient::{estimate_gradient, GradientEstimator};
pub use resampling::{ImageResampler, Resampling, ResamplingMethod};
pub use timing::TimingModel;
