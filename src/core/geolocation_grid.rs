//! Geolocation tie-point grids
//!
//! Sentinel-1 annotations carry a sparse, irregular grid of geolocation control
//! points. Geocoding wants evenly spaced tie-point grids instead, so every
//! physical quantity (latitude, longitude, incidence angle, elevation angle and
//! slant range time) is resampled onto a regular grid by piecewise-bilinear
//! interpolation. Longitudes are unwrapped first when the scene crosses the
//! antimeridian.

use crate::types::{SarError, SarResult, ONE_BILLION};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Longitude jump between consecutive control points that signals an antimeridian crossing
pub const ANTIMERIDIAN_JUMP_DEGREES: f64 = 350.0;

/// Tie-point grid names
pub const TPG_LATITUDE: &str = "latitude";
pub const TPG_LONGITUDE: &str = "longitude";
pub const TPG_INCIDENT_ANGLE: &str = "incident_angle";
pub const TPG_ELEVATION_ANGLE: &str = "elevation_angle";
pub const TPG_SLANT_RANGE_TIME: &str = "slant_range_time";

/// Single geolocation control point from the annotation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeolocationGridPoint {
    /// Range pixel index
    pub pixel: i32,
    /// Azimuth line index
    pub line: i32,
    pub latitude: f64,
    pub longitude: f64,
    /// Degrees
    pub incidence_angle: f64,
    /// Degrees
    pub elevation_angle: f64,
    /// Two-way slant range time in seconds
    pub slant_range_time: f64,
}

/// Infer the control-point grid dimensions from a row-major point list.
///
/// A new row starts wherever the pixel index resets to 0. The width is the
/// position of the second reset, so every row is assumed to hold the same
/// number of points.
pub fn infer_grid_dimensions(points: &[GeolocationGridPoint]) -> SarResult<(usize, usize)> {
    let mut grid_width = 0;
    let mut grid_height = 0;

    for (i, point) in points.iter().enumerate() {
        if point.pixel == 0 {
            if grid_width == 0 {
                grid_width = i;
            }
            grid_height += 1;
        }
    }

    // Single row: no second reset was found
    if grid_width == 0 {
        grid_width = points.len();
    }

    if grid_width * grid_height != points.len() {
        return Err(SarError::GridSizeMismatch {
            what: "Geolocation point list".to_string(),
            expected: grid_width * grid_height,
            actual: points.len(),
        });
    }

    Ok((grid_width, grid_height))
}

/// Validated row-major rectangular grid of control points
#[derive(Debug, Clone)]
pub struct GeolocationGrid {
    width: usize,
    height: usize,
    points: Vec<GeolocationGridPoint>,
}

impl GeolocationGrid {
    /// Build a grid with explicit dimensions, validated against the point list
    pub fn new(points: Vec<GeolocationGridPoint>, width: usize, height: usize) -> SarResult<Self> {
        if points.len() != width * height {
            return Err(SarError::GridSizeMismatch {
                what: "Geolocation point list".to_string(),
                expected: width * height,
                actual: points.len(),
            });
        }

        if width < 2 || height < 2 {
            return Err(SarError::InvalidGrid(format!(
                "At least 2x2 control points are required, got {}x{}",
                width, height
            )));
        }

        for row in 0..height {
            for col in 1..width {
                let prev = &points[row * width + col - 1];
                let curr = &points[row * width + col];
                if curr.pixel <= prev.pixel {
                    return Err(SarError::InvalidGrid(format!(
                        "Pixel index not strictly increasing in row {} at column {} ({} -> {})",
                        row, col, prev.pixel, curr.pixel
                    )));
                }
            }
        }

        for col in 0..width {
            for row in 1..height {
                let prev = &points[(row - 1) * width + col];
                let curr = &points[row * width + col];
                if curr.line <= prev.line {
                    return Err(SarError::InvalidGrid(format!(
                        "Line index not strictly increasing in column {} at row {} ({} -> {})",
                        col, row, prev.line, curr.line
                    )));
                }
            }
        }

        Ok(Self { width, height, points })
    }

    /// Build a grid whose dimensions are derived from pixel-index resets
    pub fn from_points(points: Vec<GeolocationGridPoint>) -> SarResult<Self> {
        let (width, height) = infer_grid_dimensions(&points)?;
        log::debug!("Inferred geolocation grid dimensions {}x{}", width, height);
        Self::new(points, width, height)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn points(&self) -> &[GeolocationGridPoint] {
        &self.points
    }

    pub fn pixels(&self) -> Vec<i32> {
        self.points.iter().map(|p| p.pixel).collect()
    }

    pub fn lines(&self) -> Vec<i32> {
        self.points.iter().map(|p| p.line).collect()
    }

    /// Extract one scalar channel in row-major order
    pub fn channel<F>(&self, f: F) -> Vec<f64>
    where
        F: Fn(&GeolocationGridPoint) -> f64,
    {
        self.points.iter().map(f).collect()
    }
}

/// Return true when consecutive longitudes jump by more than 350 degrees
pub fn crosses_antimeridian(longitudes: &[f64]) -> bool {
    longitudes
        .windows(2)
        .any(|pair| (pair[1] - pair[0]).abs() > ANTIMERIDIAN_JUMP_DEGREES)
}

/// Unwrap longitudes across the antimeridian in place.
///
/// When a crossing is detected every negative longitude is shifted by +360 so
/// the values become continuous. Returns whether the list was modified.
pub fn normalize_antimeridian(longitudes: &mut [f64]) -> bool {
    if !crosses_antimeridian(longitudes) {
        return false;
    }

    log::warn!("Geolocation grid crosses the antimeridian, unwrapping longitudes");
    for lon in longitudes.iter_mut() {
        if *lon < 0.0 {
            *lon += 360.0;
        }
    }
    true
}

/// Map an unwrapped longitude back into [-180, 180]
pub fn wrap_longitude(lon: f64) -> f64 {
    if lon > 180.0 {
        lon - 360.0
    } else {
        lon
    }
}

/// Dimensions and spacing of an evenly spaced target grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetGridLayout {
    pub width: usize,
    pub height: usize,
    pub sub_sampling_x: f64,
    pub sub_sampling_y: f64,
}

impl TargetGridLayout {
    /// Spacing that stretches `width x height` nodes over the full scene
    pub fn spanning_scene(
        width: usize,
        height: usize,
        scene_width: usize,
        scene_height: usize,
    ) -> SarResult<Self> {
        if width < 2 || height < 2 {
            return Err(SarError::InvalidGrid(format!(
                "Target grid must be at least 2x2, got {}x{}",
                width, height
            )));
        }

        Ok(Self {
            width,
            height,
            sub_sampling_x: scene_width as f64 / (width - 1) as f64,
            sub_sampling_y: scene_height as f64 / (height - 1) as f64,
        })
    }
}

/// Bracketing source indices and weight for one target coordinate
#[derive(Debug, Clone, Copy)]
struct Bracket {
    lower: usize,
    upper: usize,
    weight: f64,
}

/// Bracket weights divide by neighbour distances, so coordinates must not repeat
fn check_strictly_increasing(what: &str, coords: &[f64]) -> SarResult<()> {
    match coords.windows(2).position(|pair| pair[1] <= pair[0]) {
        Some(k) => Err(SarError::InvalidGrid(format!(
            "{} coordinates not strictly increasing at index {} ({} -> {})",
            what,
            k + 1,
            coords[k],
            coords[k + 1]
        ))),
        None => Ok(()),
    }
}

/// Linear scan for the first source coordinate strictly beyond `target`
fn find_bracket(coords: &[f64], target: f64) -> Bracket {
    let mut lower = 0;
    let mut upper = 0;

    for k in 1..coords.len() {
        lower = k - 1;
        upper = k;
        if coords[upper] > target {
            break;
        }
    }

    Bracket {
        lower,
        upper,
        weight: (target - coords[lower]) / (coords[upper] - coords[lower]),
    }
}

/// Resamples an irregular control-point grid onto an evenly spaced grid
#[derive(Debug, Clone)]
pub struct GridResampler {
    scene_width: usize,
    scene_height: usize,
    source_width: usize,
    source_height: usize,
    /// Pixel coordinate of each column, taken from the first source row
    column_coords: Vec<f64>,
    /// Line coordinate of each row, taken from the first source column
    row_coords: Vec<f64>,
}

impl GridResampler {
    /// `pixels` and `lines` are the row-major coordinate arrays of the source grid
    pub fn new(
        scene_width: usize,
        scene_height: usize,
        source_width: usize,
        source_height: usize,
        pixels: &[i32],
        lines: &[i32],
    ) -> SarResult<Self> {
        let expected = source_width * source_height;
        if pixels.len() != expected {
            return Err(SarError::GridSizeMismatch {
                what: "Source pixel coordinate array".to_string(),
                expected,
                actual: pixels.len(),
            });
        }
        if lines.len() != expected {
            return Err(SarError::GridSizeMismatch {
                what: "Source line coordinate array".to_string(),
                expected,
                actual: lines.len(),
            });
        }
        if source_width < 2 || source_height < 2 {
            return Err(SarError::InvalidGrid(format!(
                "Source grid must be at least 2x2, got {}x{}",
                source_width, source_height
            )));
        }
        if scene_width == 0 || scene_height == 0 {
            return Err(SarError::InvalidGrid("Scene dimensions must be non-zero".to_string()));
        }

        let column_coords: Vec<f64> = pixels[..source_width].iter().map(|&x| x as f64).collect();
        let row_coords: Vec<f64> = (0..source_height)
            .map(|j| lines[j * source_width] as f64)
            .collect();
        check_strictly_increasing("Pixel", &column_coords)?;
        check_strictly_increasing("Line", &row_coords)?;

        Ok(Self {
            scene_width,
            scene_height,
            source_width,
            source_height,
            column_coords,
            row_coords,
        })
    }

    /// Resampler for a validated geolocation grid
    pub fn for_grid(grid: &GeolocationGrid, scene_width: usize, scene_height: usize) -> SarResult<Self> {
        Self::new(
            scene_width,
            scene_height,
            grid.width(),
            grid.height(),
            &grid.pixels(),
            &grid.lines(),
        )
    }

    /// Interpolate `source_values` (row-major, source grid sized) onto the target grid.
    ///
    /// Target node `(c, r)` sits at image coordinate `(c * sub_sampling_x, r * sub_sampling_y)`,
    /// clamped to the last valid pixel and line of the scene.
    pub fn resample(&self, source_values: &[f64], target: &TargetGridLayout) -> SarResult<Array2<f64>> {
        let expected = self.source_width * self.source_height;
        if source_values.len() != expected {
            return Err(SarError::GridSizeMismatch {
                what: "Source tie point array".to_string(),
                expected,
                actual: source_values.len(),
            });
        }

        let max_x = (self.scene_width - 1) as f64;
        let max_y = (self.scene_height - 1) as f64;

        let column_brackets: Vec<Bracket> = (0..target.width)
            .map(|c| {
                let new_x = (c as f64 * target.sub_sampling_x).min(max_x);
                find_bracket(&self.column_coords, new_x)
            })
            .collect();

        let sw = self.source_width;
        let mut output = Array2::zeros((target.height, target.width));

        for r in 0..target.height {
            let new_y = (r as f64 * target.sub_sampling_y).min(max_y);
            let row = find_bracket(&self.row_coords, new_y);

            for (c, col) in column_brackets.iter().enumerate() {
                output[[r, c]] = interpolate_2d(
                    col.weight,
                    row.weight,
                    source_values[col.lower + row.lower * sw],
                    source_values[col.upper + row.lower * sw],
                    source_values[col.lower + row.upper * sw],
                    source_values[col.upper + row.upper * sw],
                );
            }
        }

        Ok(output)
    }

    /// Same as [`resample`](Self::resample) but writes into a caller-provided flat buffer
    pub fn resample_into(
        &self,
        source_values: &[f64],
        target: &TargetGridLayout,
        target_values: &mut [f64],
    ) -> SarResult<()> {
        let expected = target.width * target.height;
        if target_values.len() != expected {
            return Err(SarError::GridSizeMismatch {
                what: "Target tie point array".to_string(),
                expected,
                actual: target_values.len(),
            });
        }

        let grid = self.resample(source_values, target)?;
        for (dst, src) in target_values.iter_mut().zip(grid.iter()) {
            *dst = *src;
        }
        Ok(())
    }
}

/// Bilinear blend of four corner values
#[inline]
fn interpolate_2d(wi: f64, wj: f64, v00: f64, v10: f64, v01: f64, v11: f64) -> f64 {
    v00 * (1.0 - wi) * (1.0 - wj) + v10 * wi * (1.0 - wj) + v01 * (1.0 - wi) * wj + v11 * wi * wj
}

/// Value discontinuity carried by a tie-point grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Discontinuity {
    None,
    /// Values were unwrapped past +180 and must be wrapped back on read
    At180,
}

/// Physical unit of a tie-point grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridUnit {
    Degrees,
    Nanoseconds,
}

impl std::fmt::Display for GridUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GridUnit::Degrees => write!(f, "deg"),
            GridUnit::Nanoseconds => write!(f, "ns"),
        }
    }
}

/// Evenly spaced grid of one physical quantity
#[derive(Debug, Clone)]
pub struct TiePointGrid {
    pub name: String,
    pub unit: GridUnit,
    pub offset_x: f64,
    pub offset_y: f64,
    pub sub_sampling_x: f64,
    pub sub_sampling_y: f64,
    /// (rows, cols) = (grid height, grid width)
    pub data: Array2<f64>,
    pub discontinuity: Discontinuity,
}

impl TiePointGrid {
    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    /// Interpolated value at image coordinate `(x, y)`.
    ///
    /// Positions outside the grid extrapolate from the nearest edge cell.
    /// Longitude grids flagged [`Discontinuity::At180`] are wrapped back to [-180, 180].
    pub fn pixel_value(&self, x: f64, y: f64) -> f64 {
        let fi = (x - self.offset_x) / self.sub_sampling_x;
        let fj = (y - self.offset_y) / self.sub_sampling_y;

        let i = (fi.floor().max(0.0) as usize).min(self.width() - 2);
        let j = (fj.floor().max(0.0) as usize).min(self.height() - 2);

        let value = interpolate_2d(
            fi - i as f64,
            fj - j as f64,
            self.data[[j, i]],
            self.data[[j, i + 1]],
            self.data[[j + 1, i]],
            self.data[[j + 1, i + 1]],
        );

        match self.discontinuity {
            Discontinuity::At180 => wrap_longitude(value),
            Discontinuity::None => value,
        }
    }
}

/// Geographic position of one scene corner
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CornerCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

/// Scene corner coordinates read from the latitude/longitude grids
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SceneCorners {
    pub first_near: CornerCoordinate,
    pub first_far: CornerCoordinate,
    pub last_near: CornerCoordinate,
    pub last_far: CornerCoordinate,
}

/// The five tie-point grids built from one annotation's geolocation grid
#[derive(Debug, Clone)]
pub struct TiePointGridSet {
    pub latitude: TiePointGrid,
    pub longitude: TiePointGrid,
    pub incidence_angle: TiePointGrid,
    pub elevation_angle: TiePointGrid,
    pub slant_range_time: TiePointGrid,
    scene_width: usize,
    scene_height: usize,
}

impl TiePointGridSet {
    /// Resample every geolocation channel onto a grid spanning the scene.
    ///
    /// The target grid keeps the control-point grid dimensions. Slant range time
    /// is converted from seconds to nanoseconds.
    pub fn from_geolocation_grid(
        grid: &GeolocationGrid,
        scene_width: usize,
        scene_height: usize,
    ) -> SarResult<Self> {
        log::info!(
            "Building tie-point grids: {}x{} control points over {}x{} scene",
            grid.width(),
            grid.height(),
            scene_width,
            scene_height
        );

        let resampler = GridResampler::for_grid(grid, scene_width, scene_height)?;
        let target =
            TargetGridLayout::spanning_scene(grid.width(), grid.height(), scene_width, scene_height)?;

        let mut longitudes = grid.channel(|p| p.longitude);
        let lon_discontinuity = if normalize_antimeridian(&mut longitudes) {
            Discontinuity::At180
        } else {
            Discontinuity::None
        };

        let build = |name: &str, unit: GridUnit, values: &[f64], discontinuity: Discontinuity| {
            resampler.resample(values, &target).map(|data| TiePointGrid {
                name: name.to_string(),
                unit,
                offset_x: 0.5,
                offset_y: 0.5,
                sub_sampling_x: target.sub_sampling_x,
                sub_sampling_y: target.sub_sampling_y,
                data,
                discontinuity,
            })
        };

        let latitude = build(
            TPG_LATITUDE,
            GridUnit::Degrees,
            &grid.channel(|p| p.latitude),
            Discontinuity::None,
        )?;
        let longitude = build(TPG_LONGITUDE, GridUnit::Degrees, &longitudes, lon_discontinuity)?;
        let incidence_angle = build(
            TPG_INCIDENT_ANGLE,
            GridUnit::Degrees,
            &grid.channel(|p| p.incidence_angle),
            Discontinuity::None,
        )?;
        let elevation_angle = build(
            TPG_ELEVATION_ANGLE,
            GridUnit::Degrees,
            &grid.channel(|p| p.elevation_angle),
            Discontinuity::None,
        )?;
        let slant_range_time = build(
            TPG_SLANT_RANGE_TIME,
            GridUnit::Nanoseconds,
            &grid.channel(|p| p.slant_range_time * ONE_BILLION),
            Discontinuity::None,
        )?;

        Ok(Self {
            latitude,
            longitude,
            incidence_angle,
            elevation_angle,
            slant_range_time,
            scene_width,
            scene_height,
        })
    }

    /// Grids in a fixed order: latitude, longitude, incidence, elevation, slant range time
    pub fn grids(&self) -> [&TiePointGrid; 5] {
        [
            &self.latitude,
            &self.longitude,
            &self.incidence_angle,
            &self.elevation_angle,
            &self.slant_range_time,
        ]
    }

    /// Geographic position at an image coordinate
    pub fn geo_position(&self, x: f64, y: f64) -> CornerCoordinate {
        CornerCoordinate {
            latitude: self.latitude.pixel_value(x, y),
            longitude: self.longitude.pixel_value(x, y),
        }
    }

    pub fn corner_coordinates(&self) -> SceneCorners {
        let w = self.scene_width as f64;
        let h = self.scene_height as f64;

        SceneCorners {
            first_near: self.geo_position(0.0, 0.0),
            first_far: self.geo_position(w, 0.0),
            last_near: self.geo_position(0.0, h),
            last_far: self.geo_position(w, h),
        }
    }
}
