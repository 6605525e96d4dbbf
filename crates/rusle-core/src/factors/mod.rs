//! The five RUSLE factor calculators.
//!
//! Each calculator is a pure function from one or more input rasters to a
//! factor raster on the same grid. Calculators never resample; callers hand
//! them rasters already clipped to the common processing grid.

pub mod cover;
pub mod erodibility;
pub mod erosivity;
pub mod slope;
pub mod support;
pub mod topographic;

use serde::{Deserialize, Serialize};

use crate::raster::{RasterGrid, RasterStats};

pub use cover::{cover_management, ndvi, raw_cover, CoverResult, ReflectanceComposite};
pub use erodibility::{k_value, soil_erodibility, K_TABLE};
pub use erosivity::{rainfall_erosivity, rainfall_erosivity_value};
pub use slope::{percent_slope, slope_degrees};
pub use support::{support_practice, support_practice_value, SUPPORT_RULES};
pub use topographic::{ls_value, topographic_factor, TopographicResult};

/// Which RUSLE term a factor raster holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FactorKind {
    /// Rainfall erosivity, MJ·mm/(ha·h·yr).
    R,
    /// Soil erodibility, t·ha·h/(ha·MJ·mm).
    K,
    /// Slope length and steepness, dimensionless.
    LS,
    /// Cover management, dimensionless in [0, 1].
    C,
    /// Support practice, dimensionless in (0, 1].
    P,
}

impl FactorKind {
    pub const ALL: [FactorKind; 5] = [Self::R, Self::K, Self::LS, Self::C, Self::P];

    pub fn band_name(self) -> &'static str {
        match self {
            Self::R => "R",
            Self::K => "K",
            Self::LS => "LS",
            Self::C => "C",
            Self::P => "P",
        }
    }

    /// Physically meaningful value range (inclusive). `f64::INFINITY` = open.
    pub fn value_range(self) -> (f64, f64) {
        match self {
            Self::R => (79.0, f64::INFINITY),
            Self::K => (0.0, 0.05),
            Self::LS => (0.0, f64::INFINITY),
            Self::C => (0.0, 1.0),
            Self::P => (0.0, 1.0),
        }
    }

    /// Whether `v` lies in [`value_range`](Self::value_range), allowing for
    /// f32 storage rounding at the bounds.
    pub fn admits(self, v: f64) -> bool {
        let (lo, hi) = self.value_range();
        let slack = |b: f64| 1e-6 * b.abs().max(1.0);
        v >= lo - slack(lo) && v <= hi + slack(hi)
    }
}

/// A raster tagged with the factor it represents.
#[derive(Debug, Clone)]
pub struct FactorRaster {
    pub kind: FactorKind,
    pub raster: RasterGrid,
}

impl FactorRaster {
    pub fn new(kind: FactorKind, raster: RasterGrid) -> Self {
        let raster = raster.with_band(kind.band_name());
        Self { kind, raster }
    }

    pub fn stats(&self) -> Option<RasterStats> {
        self.raster.stats()
    }
}

/// Pixels that hit a class-code fallback during a lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackCount {
    pub pixels: usize,
    /// One offending code, for the log line.
    pub example_code: Option<i64>,
}

impl FallbackCount {
    pub(crate) fn record(&mut self, code: i64) {
        self.pixels += 1;
        self.example_code.get_or_insert(code);
    }
}

/// Integer class code of a raster cell. Non-integral values truncate toward zero.
#[inline]
pub(crate) fn class_code(v: f32) -> i64 {
    v as i64
}
