//! Region and sub-unit polygons, and their rasterisation onto a grid.
//!
//! A cell belongs to a polygon when its centre lies inside it (even-odd rule,
//! holes subtract). Coordinates are in the same projected CRS as the grid.

use serde::{Deserialize, Serialize};

use crate::error::{Result, RusleError};
use crate::raster::GridSpec;

/// A simple polygon with optional interior rings. Rings are implicitly closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub exterior: Vec<(f64, f64)>,
    #[serde(default)]
    pub holes: Vec<Vec<(f64, f64)>>,
}

impl Polygon {
    pub fn new(exterior: Vec<(f64, f64)>) -> Self {
        Self { exterior, holes: Vec::new() }
    }

    /// Axis-aligned rectangle, handy for tiles and tests.
    pub fn rect(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self::new(vec![(min_x, min_y), (max_x, min_y), (max_x, max_y), (min_x, max_y)])
    }

    pub fn with_hole(mut self, ring: Vec<(f64, f64)>) -> Self {
        self.holes.push(ring);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.exterior.len() < 3 {
            return Err(RusleError::invalid_geometry(format!(
                "exterior ring has {} vertices, need at least 3",
                self.exterior.len()
            )));
        }
        if let Some(h) = self.holes.iter().find(|h| h.len() < 3) {
            return Err(RusleError::invalid_geometry(format!(
                "interior ring has {} vertices, need at least 3",
                h.len()
            )));
        }
        if self
            .exterior
            .iter()
            .chain(self.holes.iter().flatten())
            .any(|(x, y)| !x.is_finite() || !y.is_finite())
        {
            return Err(RusleError::invalid_geometry("non-finite vertex coordinate"));
        }
        Ok(())
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        ring_contains(&self.exterior, x, y) && !self.holes.iter().any(|h| ring_contains(h, x, y))
    }

    /// `(min_x, min_y, max_x, max_y)` of the exterior ring.
    pub fn bbox(&self) -> (f64, f64, f64, f64) {
        self.exterior.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(a, b, c, d), &(x, y)| (a.min(x), b.min(y), c.max(x), d.max(y)),
        )
    }
}

/// Ray-casting point-in-ring test.
fn ring_contains(ring: &[(f64, f64)], px: f64, py: f64) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = ring[i];
        let (xj, yj) = ring[j];
        if ((yi > py) != (yj > py)) && (px < (xj - xi) * (py - yi) / (yj - yi) + xi) {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// The study-area boundary. Every input raster is clipped to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionMask {
    pub polygons: Vec<Polygon>,
}

impl RegionMask {
    pub fn new(polygons: Vec<Polygon>) -> Self {
        Self { polygons }
    }

    pub fn rasterize(&self, grid: &GridSpec) -> Result<ZoneMask> {
        if self.polygons.is_empty() {
            return Err(RusleError::invalid_geometry("region mask has no polygons"));
        }
        ZoneMask::from_polygons(grid, &self.polygons)
    }
}

/// One polygonal zone of the region (a sub-basin, a district).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubUnit {
    pub id: String,
    pub polygons: Vec<Polygon>,
}

impl SubUnit {
    pub fn new(id: impl Into<String>, polygons: Vec<Polygon>) -> Self {
        Self { id: id.into(), polygons }
    }

    pub fn rasterize(&self, grid: &GridSpec) -> Result<ZoneMask> {
        ZoneMask::from_polygons(grid, &self.polygons)
    }
}

/// Per-cell membership of a zone on a specific grid.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneMask {
    pub grid: GridSpec,
    cells: Vec<bool>,
}

impl ZoneMask {
    /// Every cell of the grid.
    pub fn full(grid: GridSpec) -> Self {
        Self { grid, cells: vec![true; grid.len()] }
    }

    /// Cells whose centres fall inside any of `polygons`.
    pub fn from_polygons(grid: &GridSpec, polygons: &[Polygon]) -> Result<Self> {
        for p in polygons {
            p.validate()?;
        }
        let boxes: Vec<_> = polygons.iter().map(Polygon::bbox).collect();
        let mut cells = Vec::with_capacity(grid.len());
        for r in 0..grid.height {
            for c in 0..grid.width {
                let (x, y) = grid.cell_center(r, c);
                let inside = polygons.iter().zip(&boxes).any(|(p, &(x0, y0, x1, y1))| {
                    x >= x0 && x <= x1 && y >= y0 && y <= y1 && p.contains(x, y)
                });
                cells.push(inside);
            }
        }
        Ok(Self { grid: *grid, cells })
    }

    pub fn cells(&self) -> &[bool] {
        &self.cells
    }

    #[inline]
    pub fn contains(&self, idx: usize) -> bool {
        self.cells[idx]
    }

    pub fn count(&self) -> usize {
        self.cells.iter().filter(|&&b| b).count()
    }

    /// Cells inside both masks.
    pub fn intersect(&self, other: &ZoneMask) -> Result<ZoneMask> {
        self.grid.ensure_matches(&other.grid, "zone mask", "zone mask")?;
        let cells = self.cells.iter().zip(&other.cells).map(|(&a, &b)| a && b).collect();
        Ok(ZoneMask { grid: self.grid, cells })
    }
}
