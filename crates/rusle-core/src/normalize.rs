//! Region-wide min-max rescaling to [0, 1].
//!
//! The extremes are a reduction over every valid cell of the raster (already
//! clipped to the region), never a per-pixel neighbourhood.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::raster::RasterGrid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinMax {
    pub min: f64,
    pub max: f64,
}

/// How a normalisation was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum NormalizationOutcome {
    /// `(v - min) / (max - min)` was applied.
    Scaled(MinMax),
    /// Every valid cell held the same value; all were set to `value`.
    Degenerate { value: f64, constant: f64 },
    /// No valid cells.
    Empty,
}

/// Min and max over valid cells, `None` if all are masked.
pub fn region_min_max(raster: &RasterGrid) -> Option<MinMax> {
    raster.stats().map(|s| MinMax { min: s.min, max: s.max })
}

/// Rescale `raster` to [0, 1] over its valid cells.
///
/// When max == min the rescaling is undefined and every valid cell is set to
/// `degenerate_value` instead.
pub fn normalize(
    raster: &RasterGrid,
    band: impl Into<String>,
    degenerate_value: f32,
) -> (RasterGrid, NormalizationOutcome) {
    let band = band.into();
    let Some(mm) = region_min_max(raster) else {
        return (raster.map(band, |v| v), NormalizationOutcome::Empty);
    };

    let span = mm.max - mm.min;
    if span <= 0.0 {
        warn!(
            band = %raster.band,
            constant = mm.min,
            value = degenerate_value,
            "degenerate normalisation: region-wide max equals min"
        );
        let out = raster.map(band, |_| degenerate_value);
        let outcome = NormalizationOutcome::Degenerate {
            value: degenerate_value as f64,
            constant: mm.min,
        };
        return (out, outcome);
    }

    debug!(band = %raster.band, min = mm.min, max = mm.max, "normalising");
    let out = raster.map(band, |v| (((v as f64 - mm.min) / span).clamp(0.0, 1.0)) as f32);
    (out, NormalizationOutcome::Scaled(mm))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::GridSpec;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn grid(n: usize) -> GridSpec {
        GridSpec::new(n, 1, 0.0, 0.0, 10.0)
    }

    #[test]
    fn scaled_output_spans_zero_to_one() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let vals: Vec<f32> = (0..64).map(|_| rng.gen_range(0.05f32..0.95)).collect();
            let r = RasterGrid::from_values(grid(64), "craw", vals, -9999.0).unwrap();
            let (out, outcome) = normalize(&r, "c", 1.0);
            assert!(matches!(outcome, NormalizationOutcome::Scaled(_)));
            let s = out.stats().unwrap();
            assert!(s.min.abs() < 1e-6, "min {}", s.min);
            assert!((s.max - 1.0).abs() < 1e-6, "max {}", s.max);
        }
    }

    #[test]
    fn degenerate_uses_configured_constant() {
        let r = RasterGrid::filled(grid(5), "craw", 0.3);
        let (out, outcome) = normalize(&r, "c", 1.0);
        assert_eq!(
            outcome,
            NormalizationOutcome::Degenerate { value: 1.0, constant: 0.3f32 as f64 }
        );
        assert!(out.values().iter().all(|&v| v == 1.0));

        let (zero, _) = normalize(&r, "c", 0.0);
        assert!(zero.values().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn masked_cells_do_not_affect_extremes() {
        let r = RasterGrid::from_values(grid(4), "craw", vec![2.0, -9999.0, 4.0, 3.0], -9999.0)
            .unwrap();
        let (out, _) = normalize(&r, "c", 1.0);
        assert_eq!(out.value(0, 0), Some(0.0));
        assert_eq!(out.value(0, 1), None);
        assert_eq!(out.value(0, 2), Some(1.0));
        assert_eq!(out.value(0, 3), Some(0.5));
    }

    #[test]
    fn empty_raster_is_reported() {
        let r = RasterGrid::filled(grid(3), "craw", f32::NAN);
        let (out, outcome) = normalize(&r, "c", 1.0);
        assert_eq!(outcome, NormalizationOutcome::Empty);
        assert_eq!(out.valid_count(), 0);
    }
}
