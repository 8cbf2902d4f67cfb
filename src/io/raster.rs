use crate::types::{SarError, SarResult, TileRect};
use ndarray::{s, Array2};
use std::sync::RwLock;

/// Read access to the bands of a source image
pub trait RasterSource: Sync {
    /// (width, height) of every band
    fn dimensions(&self) -> (usize, usize);

    /// Names of the stored (non-virtual) bands, in product order
    fn band_names(&self) -> SarResult<Vec<String>>;

    /// Copy of a rectangle of one band; the rectangle must lie inside the image
    fn read_tile(&self, band: &str, rect: TileRect) -> SarResult<Array2<f32>>;
}

/// Write access to the bands of a target image
pub trait RasterSink: Sync {
    fn has_band(&self, band: &str) -> SarResult<bool>;

    fn write_tile(&self, band: &str, rect: TileRect, data: &Array2<f32>) -> SarResult<()>;
}

/// Raster held entirely in memory, usable both as source and sink
#[derive(Debug)]
pub struct MemoryRaster {
    width: usize,
    height: usize,
    bands: RwLock<Vec<(String, Array2<f32>)>>,
}

impl MemoryRaster {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            bands: RwLock::new(Vec::new()),
        }
    }

    /// Raster with zero-filled bands, typically a target product
    pub fn with_zero_bands<S: AsRef<str>>(width: usize, height: usize, names: &[S]) -> SarResult<Self> {
        let raster = Self::new(width, height);
        for name in names {
            raster.add_band(name.as_ref(), Array2::zeros((height, width)))?;
        }
        Ok(raster)
    }

    /// Add a band; `data` is (height, width)
    pub fn add_band(&self, name: &str, data: Array2<f32>) -> SarResult<()> {
        if data.dim() != (self.height, self.width) {
            return Err(SarError::Raster(format!(
                "Band {} has shape {:?}, raster is {}x{}",
                name,
                data.dim(),
                self.width,
                self.height
            )));
        }

        let mut bands = self
            .bands
            .write()
            .map_err(|_| SarError::Raster("Band table lock poisoned".to_string()))?;
        if bands.iter().any(|(n, _)| n == name) {
            return Err(SarError::Raster(format!("Band {} already exists", name)));
        }
        bands.push((name.to_string(), data));
        Ok(())
    }

    /// Copy of a whole band
    pub fn band(&self, name: &str) -> SarResult<Array2<f32>> {
        let bands = self
            .bands
            .read()
            .map_err(|_| SarError::Raster("Band table lock poisoned".to_string()))?;
        bands
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, data)| data.clone())
            .ok_or_else(|| SarError::Raster(format!("Unknown band {}", name)))
    }

    fn check_rect(&self, rect: &TileRect) -> SarResult<()> {
        if rect.is_empty() || rect.x + rect.width > self.width || rect.y + rect.height > self.height {
            return Err(SarError::Raster(format!(
                "Tile {} outside {}x{} raster",
                rect, self.width, self.height
            )));
        }
        Ok(())
    }
}

impl RasterSource for MemoryRaster {
    fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn band_names(&self) -> SarResult<Vec<String>> {
        let bands = self
            .bands
            .read()
            .map_err(|_| SarError::Raster("Band table lock poisoned".to_string()))?;
        Ok(bands.iter().map(|(n, _)| n.clone()).collect())
    }

    fn read_tile(&self, band: &str, rect: TileRect) -> SarResult<Array2<f32>> {
        self.check_rect(&rect)?;
        let bands = self
            .bands
            .read()
            .map_err(|_| SarError::Raster("Band table lock poisoned".to_string()))?;
        let (_, data) = bands
            .iter()
            .find(|(n, _)| n == band)
            .ok_or_else(|| SarError::Raster(format!("Unknown band {}", band)))?;

        Ok(data
            .slice(s![rect.y..rect.y + rect.height, rect.x..rect.x + rect.width])
            .to_owned())
    }
}

impl RasterSink for MemoryRaster {
    fn has_band(&self, band: &str) -> SarResult<bool> {
        let bands = self
            .bands
            .read()
            .map_err(|_| SarError::Raster("Band table lock poisoned".to_string()))?;
        Ok(bands.iter().any(|(n, _)| n == band))
    }

    fn write_tile(&self, band: &str, rect: TileRect, data: &Array2<f32>) -> SarResult<()> {
        self.check_rect(&rect)?;
        if data.dim() != (rect.height, rect.width) {
            return Err(SarError::Raster(format!(
                "Tile data shape {:?} does not match {}",
                data.dim(),
                rect
            )));
        }

        let mut bands = self
            .bands
            .write()
            .map_err(|_| SarError::Raster("Band table lock poisoned".to_string()))?;
        let (_, target) = bands
            .iter_mut()
            .find(|(n, _)| n == band)
            .ok_or_else(|| SarError::Raster(format!("Unknown band {}", band)))?;

        target
            .slice_mut(s![rect.y..rect.y + rect.height, rect.x..rect.x + rect.width])
            .assign(data);
        Ok(())
    }
}
