//! Support practice factor (P) from land cover and percent slope.
//!
//! P is the value of the first rule in [`SUPPORT_RULES`] whose land-cover
//! test and slope test both hold; if none holds, P = [`P_FALLBACK`] (no
//! conservation benefit). The table order is significant: the cropland
//! slope bins are not contiguous (a cropland cell at exactly 20 % slope
//! matches neither `[16, 20)` nor `> 20` and takes the fallback).
//!
//! Land-cover codes follow the 17-class IGBP scheme: 11 permanent wetland,
//! 12 cropland, 13 built-up, 14 cropland/natural mosaic, 15–17 snow, barren,
//! water. Codes outside 1–17 take the fallback and are counted. The range
//! guard runs before the table, so code 0 gets 1.0 rather than the 0.8 that
//! the `< 11` rule would give it.

use tracing::warn;

use crate::error::Result;
use crate::raster::RasterGrid;

use super::{class_code, FactorKind, FactorRaster, FallbackCount};

pub const P_FALLBACK: f64 = 1.0;

/// Valid land-cover codes.
pub const LAND_COVER_CODES: std::ops::RangeInclusive<i64> = 1..=17;

pub const CROPLAND: i64 = 12;
pub const CROPLAND_MOSAIC: i64 = 14;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClassTest {
    /// Cropland (12) or cropland/natural mosaic (14).
    Cropland,
    /// `code < n`.
    Below(i64),
    /// `code == a || code == b`.
    EitherOf(i64, i64),
    /// `code > n`.
    Above(i64),
}

impl ClassTest {
    fn matches(self, code: i64) -> bool {
        match self {
            Self::Cropland => code == CROPLAND || code == CROPLAND_MOSAIC,
            Self::Below(n) => code < n,
            Self::EitherOf(a, b) => code == a || code == b,
            Self::Above(n) => code > n,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlopeTest {
    Any,
    /// `lo <= s < hi`.
    Within(f64, f64),
    /// `s > lo`.
    Above(f64),
}

impl SlopeTest {
    fn matches(self, slope_pct: f64) -> bool {
        match self {
            Self::Any => true,
            Self::Within(lo, hi) => slope_pct >= lo && slope_pct < hi,
            Self::Above(lo) => slope_pct > lo,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupportRule {
    pub class: ClassTest,
    pub slope: SlopeTest,
    pub p: f64,
}

const fn rule(class: ClassTest, slope: SlopeTest, p: f64) -> SupportRule {
    SupportRule { class, slope, p }
}

/// Evaluated top to bottom; first match wins.
pub const SUPPORT_RULES: [SupportRule; 9] = [
    rule(ClassTest::Cropland, SlopeTest::Within(0.0, 2.0), 0.6),
    rule(ClassTest::Cropland, SlopeTest::Within(2.0, 8.0), 0.5),
    rule(ClassTest::Cropland, SlopeTest::Within(8.0, 12.0), 0.6),
    rule(ClassTest::Cropland, SlopeTest::Within(12.0, 16.0), 0.7),
    rule(ClassTest::Cropland, SlopeTest::Within(16.0, 20.0), 0.8),
    rule(ClassTest::Cropland, SlopeTest::Above(20.0), 0.9),
    rule(ClassTest::Below(11), SlopeTest::Any, 0.8),
    rule(ClassTest::EitherOf(11, 13), SlopeTest::Any, 1.0),
    rule(ClassTest::Above(14), SlopeTest::Any, 1.0),
];

/// P for one cell. Out-of-scheme codes take the fallback.
pub fn support_practice_value(land_cover: i64, slope_pct: f64) -> f64 {
    if !LAND_COVER_CODES.contains(&land_cover) {
        return P_FALLBACK;
    }
    SUPPORT_RULES
        .iter()
        .find(|r| r.class.matches(land_cover) && r.slope.matches(slope_pct))
        .map_or(P_FALLBACK, |r| r.p)
}

/// P raster. A cell is masked if either input is masked there.
pub fn support_practice(
    land_cover: &RasterGrid,
    slope_pct: &RasterGrid,
) -> Result<(FactorRaster, FallbackCount)> {
    land_cover
        .grid
        .ensure_matches(&slope_pct.grid, &land_cover.band, &slope_pct.band)?;
    let mut fallback = FallbackCount::default();
    let p = RasterGrid::from_fn(land_cover.grid, FactorKind::P.band_name(), |r, c| {
        let lc = land_cover.get(r, c);
        let s = slope_pct.get(r, c);
        if lc.is_nan() || s.is_nan() {
            return f32::NAN;
        }
        let code = class_code(lc);
        if !LAND_COVER_CODES.contains(&code) {
            fallback.record(code);
        }
        support_practice_value(code, s as f64) as f32
    });
    if fallback.pixels > 0 {
        warn!(
            pixels = fallback.pixels,
            example_code = ?fallback.example_code,
            "land-cover codes outside 1-17; P set to {P_FALLBACK}"
        );
    }
    Ok((FactorRaster::new(FactorKind::P, p), fallback))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::GridSpec;

    #[test]
    fn cropland_curve_falls_then_rises() {
        let cases = [
            (0.0, 0.6),
            (1.99, 0.6),
            (2.0, 0.5),
            (7.9, 0.5),
            (8.0, 0.6),
            (12.0, 0.7),
            (16.0, 0.8),
            (19.99, 0.8),
            (20.01, 0.9),
            (45.0, 0.9),
        ];
        for (s, p) in cases {
            assert_eq!(support_practice_value(CROPLAND, s), p, "cropland slope {s}");
            assert_eq!(support_practice_value(CROPLAND_MOSAIC, s), p, "mosaic slope {s}");
        }
    }

    #[test]
    fn cropland_at_exactly_20_percent_takes_fallback() {
        assert_eq!(support_practice_value(CROPLAND, 20.0), P_FALLBACK);
    }

    #[test]
    fn non_cropland_classes() {
        for code in 1..11 {
            assert_eq!(support_practice_value(code, 30.0), 0.8, "class {code}");
        }
        assert_eq!(support_practice_value(11, 5.0), 1.0);
        assert_eq!(support_practice_value(13, 5.0), 1.0);
        for code in 15..=17 {
            assert_eq!(support_practice_value(code, 5.0), 1.0, "class {code}");
        }
    }

    #[test]
    fn out_of_scheme_codes_fall_back_and_are_counted() {
        assert_eq!(support_practice_value(0, 1.0), P_FALLBACK);
        assert_eq!(support_practice_value(1, 1.0), 0.8);
        assert_eq!(support_practice_value(-3, 1.0), P_FALLBACK);
        assert_eq!(support_practice_value(255, 1.0), P_FALLBACK);

        let g = GridSpec::new(3, 1, 0.0, 0.0, 500.0);
        let lc = RasterGrid::from_values(g, "land_cover", vec![0.0, 12.0, 99.0], -9999.0).unwrap();
        let slope = RasterGrid::filled(g, "slope_pct", 5.0);
        let (p, fb) = support_practice(&lc, &slope).unwrap();
        assert_eq!(p.raster.values(), &[1.0f32, 0.5, 1.0][..]);
        assert_eq!(fb.pixels, 2);
        assert_eq!(fb.example_code, Some(0));
    }

    #[test]
    fn mismatched_grids_fail() {
        let lc = RasterGrid::filled(GridSpec::new(3, 1, 0.0, 0.0, 500.0), "land_cover", 12.0);
        let slope = RasterGrid::filled(GridSpec::new(3, 1, 0.0, 0.0, 30.0), "slope_pct", 1.0);
        assert!(support_practice(&lc, &slope).is_err());
    }
}
