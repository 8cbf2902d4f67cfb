//! Correction data and raster access

pub mod etad;
pub mod raster;

pub use etad::{
    BurstIndex, CorrectionLayer, CorrectionProvider, EtadBurst, EtadProduct, InstrumentCalibration, LayerAxis,
};
pub use raster::{MemoryRaster, RasterSink, RasterSource};
