use serde::{Deserialize, Serialize};

use crate::error::{Result, RusleError};
use crate::geometry::ZoneMask;

/// Georeferencing for a north-up raster in a projected CRS (metres).
///
/// Row 0 is the northern edge; `origin_x`/`origin_y` are the coordinates of
/// the top-left corner of cell (0, 0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub width: usize,
    pub height: usize,
    pub origin_x: f64,
    pub origin_y: f64,
    /// Ground distance covered by one cell edge, in metres.
    pub resolution: f64,
}

impl GridSpec {
    pub fn new(width: usize, height: usize, origin_x: f64, origin_y: f64, resolution: f64) -> Self {
        Self { width, height, origin_x, origin_y, resolution }
    }

    /// Fail unless the resolution is a positive finite length and the origin is finite.
    pub fn validate(&self) -> Result<()> {
        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            return Err(RusleError::invalid_raster(format!(
                "grid resolution must be a positive length, got {}",
                self.resolution
            )));
        }
        if !(self.origin_x.is_finite() && self.origin_y.is_finite()) {
            return Err(RusleError::invalid_raster(format!(
                "grid origin ({}, {}) is not finite",
                self.origin_x, self.origin_y
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Area of one cell in square metres. Constant across the grid.
    pub fn pixel_area_m2(&self) -> f64 {
        self.resolution * self.resolution
    }

    /// `(min_x, min_y, max_x, max_y)` of the grid's outer edges.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        let max_x = self.origin_x + self.width as f64 * self.resolution;
        let min_y = self.origin_y - self.height as f64 * self.resolution;
        (self.origin_x, min_y, max_x, self.origin_y)
    }

    /// Projected coordinates of the centre of cell `(row, col)`.
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        let x = self.origin_x + (col as f64 + 0.5) * self.resolution;
        let y = self.origin_y - (row as f64 + 0.5) * self.resolution;
        (x, y)
    }

    /// Fail unless `other` has the same dimensions, resolution and origin.
    ///
    /// `left`/`right` name the two rasters in the diagnostic.
    pub fn ensure_matches(&self, other: &GridSpec, left: &str, right: &str) -> Result<()> {
        let detail = if self.width != other.width || self.height != other.height {
            format!(
                "dimensions {}x{} vs {}x{}",
                self.width, self.height, other.width, other.height
            )
        } else if !nearly_equal(self.resolution, other.resolution) {
            format!("resolution {} m vs {} m", self.resolution, other.resolution)
        } else if !nearly_equal(self.origin_x, other.origin_x)
            || !nearly_equal(self.origin_y, other.origin_y)
        {
            format!(
                "origin ({}, {}) vs ({}, {})",
                self.origin_x, self.origin_y, other.origin_x, other.origin_y
            )
        } else {
            return Ok(());
        };
        Err(RusleError::shape_mismatch(left, right, detail))
    }
}

fn nearly_equal(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}

/// Summary of the valid cells of a raster.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RasterStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub valid_count: usize,
}

/// A georeferenced single-band raster, row-major f32 values.
///
/// Masked cells are stored as NaN. `nodata` is the sentinel used when values
/// cross the crate boundary (`from_values` / `to_values`). Grids are never
/// modified after construction: every transform returns a new grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RasterGridRepr")]
pub struct RasterGrid {
    pub grid: GridSpec,
    pub band: String,
    pub nodata: f32,
    #[serde(with = "nan_as_null")]
    data: Vec<f32>,
}

/// Wire form of [`RasterGrid`]; checked against its grid on the way in.
#[derive(Deserialize)]
struct RasterGridRepr {
    grid: GridSpec,
    band: String,
    nodata: f32,
    #[serde(with = "nan_as_null")]
    data: Vec<f32>,
}

impl TryFrom<RasterGridRepr> for RasterGrid {
    type Error = RusleError;

    fn try_from(r: RasterGridRepr) -> Result<Self> {
        r.grid.validate()?;
        if r.data.len() != r.grid.len() {
            return Err(RusleError::invalid_raster(format!(
                "band '{}' has {} values but its {}x{} grid needs {}",
                r.band,
                r.data.len(),
                r.grid.width,
                r.grid.height,
                r.grid.len()
            )));
        }
        Ok(Self { grid: r.grid, band: r.band, nodata: r.nodata, data: r.data })
    }
}

/// Default sentinel for masked cells on export.
pub const DEFAULT_NODATA: f32 = -9999.0;

impl RasterGrid {
    /// Create a raster filled with `fill` (NaN fills a fully masked raster).
    pub fn filled(grid: GridSpec, band: impl Into<String>, fill: f32) -> Self {
        Self {
            grid,
            band: band.into(),
            nodata: DEFAULT_NODATA,
            data: vec![fill; grid.len()],
        }
    }

    /// Build a raster from external values. Cells equal to `nodata` or
    /// non-finite become masked.
    pub fn from_values(
        grid: GridSpec,
        band: impl Into<String>,
        values: Vec<f32>,
        nodata: f32,
    ) -> Result<Self> {
        let band = band.into();
        if values.len() != grid.len() {
            return Err(RusleError::invalid_raster(format!(
                "band '{band}' has {} values but its {}x{} grid needs {}",
                values.len(),
                grid.width,
                grid.height,
                grid.len()
            )));
        }
        let data = values
            .into_iter()
            .map(|v| if v == nodata || !v.is_finite() { f32::NAN } else { v })
            .collect();
        Ok(Self { grid, band, nodata, data })
    }

    /// Build a raster by evaluating `f(row, col)` at every cell.
    pub fn from_fn(
        grid: GridSpec,
        band: impl Into<String>,
        mut f: impl FnMut(usize, usize) -> f32,
    ) -> Self {
        let mut data = Vec::with_capacity(grid.len());
        for r in 0..grid.height {
            for c in 0..grid.width {
                data.push(f(r, c));
            }
        }
        Self {
            grid,
            band: band.into(),
            nodata: DEFAULT_NODATA,
            data,
        }
    }

    /// Values with masked cells replaced by the `nodata` sentinel.
    pub fn to_values(&self) -> Vec<f32> {
        self.data
            .iter()
            .map(|&v| if v.is_nan() { self.nodata } else { v })
            .collect()
    }

    /// Raw values; masked cells are NaN.
    pub fn values(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.grid.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.grid.height
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.grid.width + col]
    }

    /// Value at `(row, col)`, or `None` for masked cells.
    pub fn value(&self, row: usize, col: usize) -> Option<f32> {
        let v = self.get(row, col);
        if v.is_nan() { None } else { Some(v) }
    }

    pub fn with_band(mut self, band: impl Into<String>) -> Self {
        self.band = band.into();
        self
    }

    /// Apply `f` to every valid cell; masked cells stay masked.
    pub fn map(&self, band: impl Into<String>, f: impl Fn(f32) -> f32) -> RasterGrid {
        let data = self
            .data
            .iter()
            .map(|&v| if v.is_nan() { f32::NAN } else { f(v) })
            .collect();
        RasterGrid {
            grid: self.grid,
            band: band.into(),
            nodata: self.nodata,
            data,
        }
    }

    /// Combine two rasters cell by cell. A cell is masked in the output if it
    /// is masked in either input. Fails if the grids differ.
    pub fn zip_map(
        &self,
        other: &RasterGrid,
        band: impl Into<String>,
        f: impl Fn(f32, f32) -> f32,
    ) -> Result<RasterGrid> {
        self.grid.ensure_matches(&other.grid, &self.band, &other.band)?;
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(&a, &b)| if a.is_nan() || b.is_nan() { f32::NAN } else { f(a, b) })
            .collect();
        Ok(RasterGrid {
            grid: self.grid,
            band: band.into(),
            nodata: self.nodata,
            data,
        })
    }

    /// Mask every cell outside `zone`.
    pub fn clip_to(&self, zone: &ZoneMask) -> Result<RasterGrid> {
        self.grid.ensure_matches(&zone.grid, &self.band, "zone mask")?;
        let data = self
            .data
            .iter()
            .zip(zone.cells())
            .map(|(&v, &inside)| if inside { v } else { f32::NAN })
            .collect();
        Ok(RasterGrid {
            grid: self.grid,
            band: self.band.clone(),
            nodata: self.nodata,
            data,
        })
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !v.is_nan()).count()
    }

    /// Min, max and mean over valid cells; `None` if every cell is masked.
    pub fn stats(&self) -> Option<RasterStats> {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0f64;
        let mut n = 0usize;
        for &v in self.data.iter().filter(|v| !v.is_nan()) {
            let v = v as f64;
            min = min.min(v);
            max = max.max(v);
            sum += v;
            n += 1;
        }
        if n == 0 {
            return None;
        }
        Some(RasterStats {
            min,
            max,
            mean: sum / n as f64,
            valid_count: n,
        })
    }
}

/// Masked cells serialise as JSON `null` (serde_json would otherwise reject NaN on read).
mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(data: &[f32], s: S) -> Result<S::Ok, S::Error> {
        let v: Vec<Option<f32>> = data
            .iter()
            .map(|&x| if x.is_nan() { None } else { Some(x) })
            .collect();
        v.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<f32>, D::Error> {
        let v: Vec<Option<f32>> = Vec::deserialize(d)?;
        Ok(v.into_iter().map(|x| x.unwrap_or(f32::NAN)).collect())
    }
}
