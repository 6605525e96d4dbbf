//! Slope length and steepness factor (LS).
//!
//! `LS = (0.53·s + 0.076·s² + 0.76) · √(L / 72.6)`, with `s` the slope in
//! percent and `L` the slope length in feet (72.6 ft is the unit plot length).
//! Flat cells are not special: s = 0 gives `0.76 · √(L / 72.6)`.

use crate::raster::RasterGrid;

use super::slope::{percent_slope, slope_degrees};
use super::{FactorKind, FactorRaster};

/// Length of the standard RUSLE unit plot, feet.
pub const UNIT_PLOT_LENGTH_FT: f64 = 72.6;

/// Default assumed slope length, feet.
pub const DEFAULT_SLOPE_LENGTH_FT: f64 = 500.0;

#[inline]
pub fn ls_value(slope_pct: f64, slope_length_ft: f64) -> f64 {
    (0.53 * slope_pct + 0.076 * slope_pct * slope_pct + 0.76)
        * (slope_length_ft / UNIT_PLOT_LENGTH_FT).sqrt()
}

/// LS together with the percent-slope raster it was derived from; the
/// support-practice factor reuses the latter.
#[derive(Debug, Clone)]
pub struct TopographicResult {
    pub ls: FactorRaster,
    pub slope_pct: RasterGrid,
}

pub fn topographic_factor(dem: &RasterGrid, slope_length_ft: f64) -> TopographicResult {
    let slope_pct = percent_slope(&slope_degrees(dem));
    let ls = slope_pct.map(FactorKind::LS.band_name(), |s| {
        ls_value(s as f64, slope_length_ft) as f32
    });
    TopographicResult {
        ls: FactorRaster::new(FactorKind::LS, ls),
        slope_pct,
    }
}
