//! Soil erodibility (K) from a soil texture class raster.
//!
//! Texture classes 0–11 index a fixed table of K values. Class 5 breaks the
//! otherwise rising sequence; the value is the calibrated one and is kept.
//! Codes outside the table take K = 0 and are reported as a data-quality
//! warning.

use tracing::warn;

use crate::raster::RasterGrid;

use super::{class_code, FactorKind, FactorRaster, FallbackCount};

/// K by texture class code, class 0 first.
pub const K_TABLE: [f64; 12] = [
    0.0288, 0.0341, 0.0360, 0.0394, 0.0423, 0.0264, 0.0394, 0.0499, 0.0500, 0.0450, 0.0170, 0.0053,
];

/// K assigned to codes outside the table.
pub const K_FALLBACK: f64 = 0.0;

/// Table lookup; `None` for codes outside 0–11.
#[inline]
pub fn k_value(code: i64) -> Option<f64> {
    usize::try_from(code).ok().and_then(|i| K_TABLE.get(i)).copied()
}

/// Map every texture cell to its K value. Masked cells stay masked.
pub fn soil_erodibility(texture: &RasterGrid) -> (FactorRaster, FallbackCount) {
    let mut fallback = FallbackCount::default();
    let k = RasterGrid::from_fn(texture.grid, FactorKind::K.band_name(), |r, c| {
        let v = texture.get(r, c);
        if v.is_nan() {
            return f32::NAN;
        }
        let code = class_code(v);
        match k_value(code) {
            Some(k) => k as f32,
            None => {
                fallback.record(code);
                K_FALLBACK as f32
            }
        }
    });
    if fallback.pixels > 0 {
        warn!(
            pixels = fallback.pixels,
            example_code = ?fallback.example_code,
            "soil texture codes outside 0-11; K set to {K_FALLBACK}"
        );
    }
    (FactorRaster::new(FactorKind::K, k), fallback)
}
