//! Rainfall erosivity (R) from mean annual precipitation.
//!
//! `R = 0.363 · P + 79`, P in mm/yr, R in MJ·mm/(ha·h·yr).

use crate::raster::RasterGrid;

use super::{FactorKind, FactorRaster};

const SLOPE: f64 = 0.363;
const INTERCEPT: f64 = 79.0;

#[inline]
pub fn rainfall_erosivity_value(precip_mm: f64) -> f64 {
    SLOPE * precip_mm + INTERCEPT
}

pub fn rainfall_erosivity(mean_annual_precip: &RasterGrid) -> FactorRaster {
    let r = mean_annual_precip.map(FactorKind::R.band_name(), |p| {
        rainfall_erosivity_value(p as f64) as f32
    });
    FactorRaster::new(FactorKind::R, r)
}
