//! Cover management factor (C) from surface reflectance.
//!
//! 1. NDVI = (NIR − RED) / (NIR + RED), clamped to [0, 1].
//! 2. Craw = exp(α · NDVI / (1 − NDVI)), α = −2 by default.
//! 3. C = region-wide min-max rescaling of Craw.
//!
//! As NDVI → 1 the exponent → −∞ and Craw → 0. Cells with
//! `1 − NDVI ≤ NDVI_SATURATION_EPS` take that limit directly instead of
//! dividing by (near) zero. Cells with NIR + RED = 0 have no NDVI and are masked.

use tracing::{debug, warn};

use crate::error::{Result, RusleError};
use crate::normalize::{normalize, NormalizationOutcome};
use crate::raster::RasterGrid;

use super::{FactorKind, FactorRaster};

pub const DEFAULT_NDVI_ALPHA: f64 = -2.0;
pub const NDVI_SATURATION_EPS: f64 = 1e-6;

/// A multispectral surface-reflectance composite.
#[derive(Debug, Clone)]
pub struct ReflectanceComposite {
    pub bands: Vec<RasterGrid>,
}

impl ReflectanceComposite {
    pub fn new(bands: Vec<RasterGrid>) -> Self {
        Self { bands }
    }

    pub fn band(&self, name: &str) -> Result<&RasterGrid> {
        self.bands.iter().find(|b| b.band == name).ok_or_else(|| {
            let have: Vec<&str> = self.bands.iter().map(|b| b.band.as_str()).collect();
            RusleError::invalid_raster(format!(
                "reflectance composite has no band '{name}' (bands: {have:?})"
            ))
        })
    }
}

/// NDVI of the composite from the named near-infrared and red bands.
pub fn ndvi(composite: &ReflectanceComposite, nir_band: &str, red_band: &str) -> Result<RasterGrid> {
    let nir = composite.band(nir_band)?;
    let red = composite.band(red_band)?;
    nir.zip_map(red, "ndvi", |n, r| {
        let sum = n as f64 + r as f64;
        if sum == 0.0 {
            return f32::NAN;
        }
        (((n as f64 - r as f64) / sum).clamp(0.0, 1.0)) as f32
    })
}

#[inline]
fn raw_cover_value(ndvi: f64, alpha: f64) -> f64 {
    let denom = 1.0 - ndvi;
    if denom <= NDVI_SATURATION_EPS {
        0.0
    } else {
        (alpha * ndvi / denom).exp()
    }
}

/// Un-normalised cover factor, plus the number of saturated (NDVI ≈ 1) cells.
pub fn raw_cover(ndvi: &RasterGrid, alpha: f64) -> (RasterGrid, usize) {
    let mut saturated = 0usize;
    let craw = RasterGrid::from_fn(ndvi.grid, "c_raw", |r, c| {
        let v = ndvi.get(r, c);
        if v.is_nan() {
            return f32::NAN;
        }
        let v = (v as f64).clamp(0.0, 1.0);
        if 1.0 - v <= NDVI_SATURATION_EPS {
            saturated += 1;
        }
        raw_cover_value(v, alpha) as f32
    });
    if saturated > 0 {
        warn!(pixels = saturated, "NDVI saturated at 1; raw cover factor set to its limit 0");
    }
    (craw, saturated)
}

#[derive(Debug, Clone)]
pub struct CoverResult {
    pub c: FactorRaster,
    pub normalization: NormalizationOutcome,
    pub saturated_pixels: usize,
}

/// C factor from an NDVI raster already clipped to the region.
pub fn cover_management(ndvi: &RasterGrid, alpha: f64, degenerate_value: f32) -> CoverResult {
    let (craw, saturated_pixels) = raw_cover(ndvi, alpha);
    let (c, normalization) = normalize(&craw, FactorKind::C.band_name(), degenerate_value);
    debug!(?normalization, "cover management factor");
    CoverResult {
        c: FactorRaster::new(FactorKind::C, c),
        normalization,
        saturated_pixels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::GridSpec;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn grid(w: usize) -> GridSpec {
        GridSpec::new(w, 1, 0.0, 0.0, 10.0)
    }

    fn composite(nir: Vec<f32>, red: Vec<f32>) -> ReflectanceComposite {
        let g = grid(nir.len());
        ReflectanceComposite::new(vec![
            RasterGrid::from_values(g, "B8", nir, -9999.0).unwrap(),
            RasterGrid::from_values(g, "B4", red, -9999.0).unwrap(),
        ])
    }

    #[test]
    fn ndvi_band_ratio_and_clamp() {
        let comp = composite(vec![0.5, 0.1, 0.3, 0.0], vec![0.1, 0.5, 0.3, 0.0]);
        let n = ndvi(&comp, "B8", "B4").unwrap();
        assert_relative_eq!(n.get(0, 0), 0.4 / 0.6, max_relative = 1e-6);
        assert_eq!(n.get(0, 1), 0.0); // negative NDVI clamped
        assert_eq!(n.get(0, 2), 0.0);
        assert_eq!(n.value(0, 3), None); // 0/0
    }

    #[test]
    fn missing_band_is_an_error() {
        let comp = composite(vec![0.5], vec![0.1]);
        let err = ndvi(&comp, "B5", "B4").unwrap_err();
        assert!(err.to_string().contains("'B5'"));
    }

    #[test]
    fn raw_cover_formula() {
        let g = grid(3);
        let n = RasterGrid::from_values(g, "ndvi", vec![0.0, 0.5, 0.8], -9999.0).unwrap();
        let (craw, sat) = raw_cover(&n, DEFAULT_NDVI_ALPHA);
        assert_eq!(sat, 0);
        assert_relative_eq!(craw.get(0, 0), 1.0);
        assert_relative_eq!(craw.get(0, 1), (-2.0f64).exp() as f32, max_relative = 1e-6);
        assert_relative_eq!(craw.get(0, 2), (-8.0f64).exp() as f32, max_relative = 1e-5);
    }

    #[test]
    fn saturated_ndvi_does_not_produce_nan() {
        let n = RasterGrid::from_values(grid(3), "ndvi", vec![1.0, 0.2, 0.6], -9999.0).unwrap();
        let result = cover_management(&n, DEFAULT_NDVI_ALPHA, 1.0);
        assert_eq!(result.saturated_pixels, 1);
        assert!(result.c.raster.values().iter().all(|v| v.is_finite()));
        assert_eq!(result.c.raster.get(0, 0), 0.0);
        assert_eq!(result.c.raster.get(0, 1), 1.0);
    }

    #[test]
    fn normalized_cover_spans_unit_interval() {
        let mut rng = StdRng::seed_from_u64(42);
        let vals: Vec<f32> = (0..256).map(|_| rng.gen_range(0.0f32..0.9)).collect();
        let n = RasterGrid::from_values(grid(256), "ndvi", vals, -9999.0).unwrap();
        let result = cover_management(&n, DEFAULT_NDVI_ALPHA, 1.0);
        assert!(matches!(result.normalization, NormalizationOutcome::Scaled(_)));
        let s = result.c.stats().unwrap();
        assert!(s.min.abs() < 1e-6);
        assert!((s.max - 1.0).abs() < 1e-6);
    }

    #[test]
    fn uniform_ndvi_is_degenerate() {
        let n = RasterGrid::filled(grid(10), "ndvi", 0.4);
        let result = cover_management(&n, DEFAULT_NDVI_ALPHA, 1.0);
        assert!(matches!(result.normalization, NormalizationOutcome::Degenerate { .. }));
        assert!(result.c.raster.values().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn denser_vegetation_gives_lower_cover_factor() {
        let n = RasterGrid::from_values(grid(3), "ndvi", vec![0.1, 0.5, 0.9], -9999.0).unwrap();
        let c = cover_management(&n, DEFAULT_NDVI_ALPHA, 1.0).c.raster;
        assert!(c.get(0, 0) > c.get(0, 1));
        assert!(c.get(0, 1) > c.get(0, 2));
    }
}
