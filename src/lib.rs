//! sardine-etad: Sentinel-1 geolocation grids and ETAD timing correction
//!
//! This library turns the sparse geolocation grid of a Sentinel-1 SLC product
//! into regular tie-point grids and applies Extended Timing Annotation Dataset
//! (ETAD) corrections to the image, either by resampling it at corrected
//! positions or by exporting InSAR phase corrections.

pub mod core;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use types::{PixelPos, Polarization, SarComplex, SarError, SarResult, TileRect};

pub use crate::core::{
    EtadCorrectionParams, EtadCorrector, GeolocationGrid, GridResampler, ImageResampler, TimingCorrectionEngine,
    TimingModel,
};
pub use io::{CorrectionProvider, EtadProduct, MemoryRaster};
