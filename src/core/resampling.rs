//! Kernel-based image resampling at corrected sub-pixel positions.
//!
//! Positions are corner based: integer coordinate `i` addresses pixel `i`
//! itself, not the pixel's upper-left corner.

use crate::types::{PixelPos, SarComplex, SarError, SarResult, TileRect};
use ndarray::{Array2, ArrayView2};
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Largest kernel footprint supported by [`ResamplingIndex`]
pub const MAX_KERNEL_SIZE: usize = 4;

/// Source samples addressed in full-image coordinates
pub trait ResamplingRaster {
    fn width(&self) -> usize;
    fn height(&self) -> usize;

    /// Fill `samples` (row-major, `ys.len() x xs.len()`) for the given image
    /// columns and lines. Returns false when any sample is unavailable.
    fn get_samples(&self, xs: &[usize], ys: &[usize], samples: &mut [f64]) -> bool;
}

/// Kernel footprint and weights for one output pixel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResamplingIndex {
    pub x: f64,
    pub y: f64,
    /// Image columns covered by the kernel
    pub i: [usize; MAX_KERNEL_SIZE],
    /// Image lines covered by the kernel
    pub j: [usize; MAX_KERNEL_SIZE],
    /// Fractional offset from the kernel's reference column
    pub ki: f64,
    /// Fractional offset from the kernel's reference line
    pub kj: f64,
    /// Number of valid entries in `i` and `j`
    pub size: usize,
    /// False for non-finite positions
    pub valid: bool,
}

impl ResamplingIndex {
    pub fn new(size: usize) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            i: [0; MAX_KERNEL_SIZE],
            j: [0; MAX_KERNEL_SIZE],
            ki: 0.0,
            kj: 0.0,
            size,
            valid: false,
        }
    }
}

/// Clamp a (possibly negative) index into [0, max]
#[inline]
fn crop(value: i64, max: usize) -> usize {
    value.clamp(0, max as i64) as usize
}

/// Resampling strategy
pub trait Resampling: Send + Sync {
    fn name(&self) -> &'static str;

    /// Kernel footprint in pixels along each axis, also the halo a source tile needs
    fn kernel_size(&self) -> usize;

    fn create_index(&self) -> ResamplingIndex {
        ResamplingIndex::new(self.kernel_size())
    }

    /// Fill `index` for position `(x, y)` in a `width x height` image
    fn compute_corner_based_index(
        &self,
        x: f64,
        y: f64,
        width: usize,
        height: usize,
        index: &mut ResamplingIndex,
    );

    /// Kernel value at `index`, NaN when the footprint is not available in `raster`
    fn resample(&self, raster: &dyn ResamplingRaster, index: &ResamplingIndex) -> f64;
}

/// Fill the kernel columns/lines starting `before` pixels ahead of the reference pixel
fn fill_footprint(
    x: f64,
    y: f64,
    width: usize,
    height: usize,
    before: i64,
    index: &mut ResamplingIndex,
) {
    index.x = x;
    index.y = y;
    index.valid = x.is_finite() && y.is_finite() && width > 0 && height > 0;
    if !index.valid {
        return;
    }

    // Keep far-away positions in integer range; their footprint crops to the edge
    let reach = index.size as f64;
    let xc = x.clamp(-reach, width as f64 + reach);
    let yc = y.clamp(-reach, height as f64 + reach);

    let i0 = xc.floor() as i64;
    let j0 = yc.floor() as i64;
    index.ki = xc - i0 as f64;
    index.kj = yc - j0 as f64;

    for k in 0..index.size {
        index.i[k] = crop(i0 - before + k as i64, width - 1);
        index.j[k] = crop(j0 - before + k as i64, height - 1);
    }
}

/// Nearest neighbour, 1x1 footprint
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestNeighbourResampling;

impl Resampling for NearestNeighbourResampling {
    fn name(&self) -> &'static str {
        "NEAREST_NEIGHBOUR"
    }

    fn kernel_size(&self) -> usize {
        1
    }

    fn compute_corner_based_index(
        &self,
        x: f64,
        y: f64,
        width: usize,
        height: usize,
        index: &mut ResamplingIndex,
    ) {
        fill_footprint(x.round(), y.round(), width, height, 0, index);
        index.x = x;
        index.y = y;
    }

    fn resample(&self, raster: &dyn ResamplingRaster, index: &ResamplingIndex) -> f64 {
        if !index.valid {
            return f64::NAN;
        }
        let mut sample = [0.0; 1];
        if raster.get_samples(&index.i[..1], &index.j[..1], &mut sample) {
            sample[0]
        } else {
            f64::NAN
        }
    }
}

/// Bilinear interpolation, 2x2 footprint
#[derive(Debug, Clone, Copy, Default)]
pub struct BilinearResampling;

impl Resampling for BilinearResampling {
    fn name(&self) -> &'static str {
        "BILINEAR_INTERPOLATION"
    }

    fn kernel_size(&self) -> usize {
        2
    }

    fn compute_corner_based_index(
        &self,
        x: f64,
        y: f64,
        width: usize,
        height: usize,
        index: &mut ResamplingIndex,
    ) {
        fill_footprint(x, y, width, height, 0, index);
    }

    fn resample(&self, raster: &dyn ResamplingRaster, index: &ResamplingIndex) -> f64 {
        if !index.valid {
            return f64::NAN;
        }
        let mut s = [0.0; 4];
        if !raster.get_samples(&index.i[..2], &index.j[..2], &mut s) {
            return f64::NAN;
        }

        let (ki, kj) = (index.ki, index.kj);
        s[0] * (1.0 - ki) * (1.0 - kj) + s[1] * ki * (1.0 - kj) + s[2] * (1.0 - ki) * kj + s[3] * ki * kj
    }
}

/// Cubic convolution (Catmull-Rom), 4x4 footprint
#[derive(Debug, Clone, Copy, Default)]
pub struct BicubicResampling;

/// Catmull-Rom kernel weight
#[inline]
fn cubic_weight(x: f64) -> f64 {
    const A: f64 = -0.5;
    let ax = x.abs();
    if ax <= 1.0 {
        ((A + 2.0) * ax - (A + 3.0)) * ax * ax + 1.0
    } else if ax < 2.0 {
        ((A * ax - 5.0 * A) * ax + 8.0 * A) * ax - 4.0 * A
    } else {
        0.0
    }
}

#[inline]
fn cubic_weights(t: f64) -> [f64; 4] {
    [
        cubic_weight(1.0 + t),
        cubic_weight(t),
        cubic_weight(1.0 - t),
        cubic_weight(2.0 - t),
    ]
}

impl Resampling for BicubicResampling {
    fn name(&self) -> &'static str {
        "BICUBIC_INTERPOLATION"
    }

    fn kernel_size(&self) -> usize {
        4
    }

    fn compute_corner_based_index(
        &self,
        x: f64,
        y: f64,
        width: usize,
        height: usize,
        index: &mut ResamplingIndex,
    ) {
        fill_footprint(x, y, width, height, 1, index);
    }

    fn resample(&self, raster: &dyn ResamplingRaster, index: &ResamplingIndex) -> f64 {
        if !index.valid {
            return f64::NAN;
        }
        let mut s = [0.0; 16];
        if !raster.get_samples(&index.i[..4], &index.j[..4], &mut s) {
            return f64::NAN;
        }

        let wx = cubic_weights(index.ki);
        let wy = cubic_weights(index.kj);
        let mut sum = 0.0;
        for (r, wr) in wy.iter().enumerate() {
            let row: f64 = (0..4).map(|c| wx[c] * s[r * 4 + c]).sum();
            sum += wr * row;
        }
        sum
    }
}

/// Selectable resampling method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResamplingMethod {
    NearestNeighbour,
    #[default]
    Bilinear,
    Bicubic,
}

impl ResamplingMethod {
    pub fn create(&self) -> Arc<dyn Resampling> {
        match self {
            ResamplingMethod::NearestNeighbour => Arc::new(NearestNeighbourResampling),
            ResamplingMethod::Bilinear => Arc::new(BilinearResampling),
            ResamplingMethod::Bicubic => Arc::new(BicubicResampling),
        }
    }
}

/// Tile buffer addressed in full-image coordinates
pub struct TileRaster<'a, T> {
    data: ArrayView2<'a, T>,
    rect: TileRect,
}

impl<'a, T> TileRaster<'a, T> {
    /// `data` is (height, width) and covers `rect` of the full image
    pub fn new(data: ArrayView2<'a, T>, rect: TileRect) -> SarResult<Self> {
        if data.dim() != (rect.height, rect.width) {
            return Err(SarError::Raster(format!(
                "Source tile shape {:?} does not match {}",
                data.dim(),
                rect
            )));
        }
        Ok(Self { data, rect })
    }
}

impl<T: Copy + ToPrimitive> ResamplingRaster for TileRaster<'_, T> {
    fn width(&self) -> usize {
        self.rect.width
    }

    fn height(&self) -> usize {
        self.rect.height
    }

    fn get_samples(&self, xs: &[usize], ys: &[usize], samples: &mut [f64]) -> bool {
        let n = xs.len();
        for (r, &y) in ys.iter().enumerate() {
            if y < self.rect.y || y >= self.rect.y + self.rect.height {
                return false;
            }
            let row = y - self.rect.y;
            for (c, &x) in xs.iter().enumerate() {
                if x < self.rect.x || x >= self.rect.x + self.rect.width {
                    return false;
                }
                match self.data[[row, x - self.rect.x]].to_f64() {
                    Some(v) => samples[r * n + c] = v,
                    None => return false,
                }
            }
        }
        true
    }
}

/// Resamples source tiles at corrected positions
#[derive(Clone)]
pub struct ImageResampler {
    resampling: Arc<dyn Resampling>,
    image_width: usize,
    image_height: usize,
}

impl ImageResampler {
    pub fn new(method: ResamplingMethod, image_width: usize, image_height: usize) -> Self {
        Self::with_resampling(method.create(), image_width, image_height)
    }

    /// Use a caller-provided strategy
    pub fn with_resampling(resampling: Arc<dyn Resampling>, image_width: usize, image_height: usize) -> Self {
        Self {
            resampling,
            image_width,
            image_height,
        }
    }

    pub fn kernel_size(&self) -> usize {
        self.resampling.kernel_size()
    }

    pub fn resampling_name(&self) -> &'static str {
        self.resampling.name()
    }

    /// Source rectangle a target tile needs: the tile plus a kernel-sized halo
    pub fn source_rect(&self, target: TileRect) -> TileRect {
        target.with_halo(self.kernel_size(), self.image_width, self.image_height)
    }

    /// Resample `source` (covering `source_rect`) at every position of the tile.
    ///
    /// Pixels whose kernel reaches outside the source buffer are set to NaN.
    pub fn resample_tile<T: Copy + ToPrimitive>(
        &self,
        source: ArrayView2<'_, T>,
        source_rect: TileRect,
        positions: &Array2<PixelPos>,
    ) -> SarResult<Array2<f32>> {
        let raster = TileRaster::new(source, source_rect)?;
        let mut index = self.resampling.create_index();
        let mut outside = 0usize;

        let output = positions.map(|pos| {
            self.resampling.compute_corner_based_index(
                pos.x,
                pos.y,
                self.image_width,
                self.image_height,
                &mut index,
            );
            let v = self.resampling.resample(&raster, &index);
            if v.is_nan() && index.valid {
                outside += 1;
            }
            v as f32
        });

        if outside > 0 {
            log::warn!(
                "{} pixels have a kernel footprint outside source tile {}",
                outside,
                source_rect
            );
        }
        Ok(output)
    }

    /// Resample complex samples, interpolating I and Q with the same kernel index
    pub fn resample_complex(
        &self,
        source: ArrayView2<'_, SarComplex>,
        source_rect: TileRect,
        positions: &Array2<PixelPos>,
    ) -> SarResult<Array2<SarComplex>> {
        let re = source.mapv(|c| c.re);
        let im = source.mapv(|c| c.im);
        let re_raster = TileRaster::new(re.view(), source_rect)?;
        let im_raster = TileRaster::new(im.view(), source_rect)?;
        let mut index = self.resampling.create_index();

        Ok(positions.map(|pos| {
            self.resampling.compute_corner_based_index(
                pos.x,
                pos.y,
                self.image_width,
                self.image_height,
                &mut index,
            );
            SarComplex::new(
                self.resampling.resample(&re_raster, &index) as f32,
                self.resampling.resample(&im_raster, &index) as f32,
            )
        }))
    }
}

impl std::fmt::Debug for ImageResampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageResampler")
            .field("resampling", &self.resampling.name())
            .field("image_width", &self.image_width)
            .field("image_height", &self.image_height)
            .finish()
    }
}
