//! Pipeline orchestrator: runs every stage from raw inputs to zonal summaries.
//!
//! Stage order:
//!   1. Grid check and region rasterisation
//!   2. Factor rasters (R, K, LS+P, C are independent tasks)
//!   3. Soil loss composition and classification
//!   4. Region and sub-unit zonal statistics

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::factors::{
    cover_management, ndvi, rainfall_erosivity, soil_erodibility, support_practice,
    topographic_factor, CoverResult, FactorKind, FactorRaster, FallbackCount, ReflectanceComposite,
};
use crate::geometry::{RegionMask, SubUnit, ZoneMask};
use crate::normalize::NormalizationOutcome;
use crate::params::PipelineParams;
use crate::precipitation::{mean_annual_precipitation, PrecipitationSource};
use crate::raster::{GridSpec, RasterGrid, RasterStats};
use crate::soil_loss::{compose, FactorSet};
use crate::zonal::{class_area_table, region_summary, sub_unit_summaries, ClassAreaRow, ZonalSummary};

// ── Inputs / outputs ──────────────────────────────────────────────────────────

/// Everything a run consumes. All rasters must already be on one grid.
pub struct ErosionInputs<S: PrecipitationSource> {
    pub precipitation: S,
    /// Soil texture class codes 0–11.
    pub soil_texture: RasterGrid,
    /// Elevation, metres.
    pub elevation: RasterGrid,
    pub reflectance: ReflectanceComposite,
    /// IGBP land-cover codes 1–17.
    pub land_cover: RasterGrid,
    pub region: RegionMask,
    pub sub_units: Vec<SubUnit>,
}

/// Region-wide statistics of one factor raster.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorStats {
    pub kind: FactorKind,
    pub stats: Option<RasterStats>,
}

impl FactorStats {
    /// True when min and max fall in the factor's physical range. A factor
    /// with no valid cells is trivially in range.
    pub fn within_range(&self) -> bool {
        self.stats
            .map_or(true, |s| self.kind.admits(s.min) && self.kind.admits(s.max))
    }
}

/// Data-quality events that were absorbed by fallbacks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataQuality {
    pub soil_texture_fallback: FallbackCount,
    pub land_cover_fallback: FallbackCount,
    pub ndvi_saturated_pixels: usize,
    pub cover_normalization: NormalizationOutcome,
}

/// Full output of one pipeline run.
pub struct PipelineResult {
    pub mean_annual_precipitation: RasterGrid,
    pub slope_pct: RasterGrid,
    pub factors: FactorSet,
    /// t/ha/yr.
    pub soil_loss: RasterGrid,
    /// Severity class 1–5 per cell.
    pub severity: RasterGrid,
    pub region_summary: ZonalSummary,
    /// Sorted by sub-unit id.
    pub sub_unit_summaries: Vec<ZonalSummary>,
    pub factor_stats: Vec<FactorStats>,
    pub quality: DataQuality,
    pub elapsed_ms: u64,
}

impl PipelineResult {
    /// `{id, class_1..class_5}` rows, one per sub-unit.
    pub fn class_area_table(&self) -> Vec<ClassAreaRow> {
        class_area_table(&self.sub_unit_summaries)
    }
}

// ── Task helpers ──────────────────────────────────────────────────────────────

#[cfg(feature = "threading")]
fn join<A, B, RA, RB>(a: A, b: B) -> (RA, RB)
where
    A: FnOnce() -> RA + Send,
    B: FnOnce() -> RB + Send,
    RA: Send,
    RB: Send,
{
    rayon::join(a, b)
}

#[cfg(not(feature = "threading"))]
fn join<A, B, RA, RB>(a: A, b: B) -> (RA, RB)
where
    A: FnOnce() -> RA + Send,
    B: FnOnce() -> RB + Send,
    RA: Send,
    RB: Send,
{
    (a(), b())
}

fn check_grid(grid: &GridSpec, raster: &RasterGrid) -> Result<()> {
    grid.ensure_matches(&raster.grid, "elevation", &raster.band)
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

pub struct ErosionPipeline {
    params: PipelineParams,
}

impl ErosionPipeline {
    /// Fails if `params` do not validate.
    pub fn new(params: PipelineParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &PipelineParams {
        &self.params
    }

    /// Run the full pipeline. Deterministic for identical inputs.
    pub fn run<S: PrecipitationSource>(&self, inputs: &ErosionInputs<S>) -> Result<PipelineResult> {
        let started = Instant::now();
        let p = &self.params;

        // ── 1. Common grid + region ─────────────────────────────────────────
        let grid = inputs.elevation.grid;
        grid.validate()?;
        grid.ensure_matches(inputs.precipitation.grid(), "elevation", "precipitation")?;
        check_grid(&grid, &inputs.soil_texture)?;
        check_grid(&grid, &inputs.land_cover)?;
        for band in &inputs.reflectance.bands {
            check_grid(&grid, band)?;
        }
        let region = inputs.region.rasterize(&grid)?;
        info!(
            width = grid.width,
            height = grid.height,
            resolution_m = grid.resolution,
            region_cells = region.count(),
            "starting soil-loss run"
        );

        // ── 2. Factors ──────────────────────────────────────────────────────
        let ((r, k), (topo_p, c)) = join(
            || join(|| self.erosivity(inputs, &region), || self.erodibility(inputs, &region)),
            || join(|| self.topography(inputs, &region), || self.cover(inputs, &region)),
        );
        let (map, r) = r?;
        let (k, soil_texture_fallback) = k?;
        let (ls, slope_pct, p_factor, land_cover_fallback) = topo_p?;
        let cover = c?;

        let factors = FactorSet { r, k, ls, c: cover.c, p: p_factor };
        let factor_stats: Vec<FactorStats> = factors
            .iter()
            .map(|f| FactorStats { kind: f.kind, stats: f.stats() })
            .collect();
        for fs in &factor_stats {
            debug!(factor = fs.kind.band_name(), stats = ?fs.stats, "factor computed");
            if !fs.within_range() {
                let (lo, hi) = fs.kind.value_range();
                warn!(
                    factor = fs.kind.band_name(),
                    stats = ?fs.stats,
                    expected_min = lo,
                    expected_max = hi,
                    "factor outside its physical range"
                );
            }
        }

        // ── 3. Soil loss ────────────────────────────────────────────────────
        let composed = compose(&factors)?;

        // ── 4. Zonal statistics ─────────────────────────────────────────────
        let region_summary =
            region_summary(&composed.soil_loss, &composed.classes, &region, p.area_unit)?;
        let sub_unit_summaries = sub_unit_summaries(
            &composed.soil_loss,
            &composed.classes,
            &region,
            &inputs.sub_units,
            p.area_unit,
        )?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            mean_soil_loss = region_summary.mean_soil_loss,
            valid_pixels = region_summary.valid_pixels,
            sub_units = sub_unit_summaries.len(),
            elapsed_ms,
            "soil-loss run finished"
        );

        Ok(PipelineResult {
            mean_annual_precipitation: map,
            slope_pct,
            factors,
            soil_loss: composed.soil_loss,
            severity: composed.classes,
            region_summary,
            sub_unit_summaries,
            factor_stats,
            quality: DataQuality {
                soil_texture_fallback,
                land_cover_fallback,
                ndvi_saturated_pixels: cover.saturated_pixels,
                cover_normalization: cover.normalization,
            },
            elapsed_ms,
        })
    }

    fn erosivity<S: PrecipitationSource>(
        &self,
        inputs: &ErosionInputs<S>,
        region: &ZoneMask,
    ) -> Result<(RasterGrid, FactorRaster)> {
        let map = mean_annual_precipitation(
            &inputs.precipitation,
            self.params.start_year,
            self.params.end_year,
            region,
        )?;
        let r = rainfall_erosivity(&map);
        Ok((map, r))
    }

    fn erodibility<S: PrecipitationSource>(
        &self,
        inputs: &ErosionInputs<S>,
        region: &ZoneMask,
    ) -> Result<(FactorRaster, FallbackCount)> {
        let texture = inputs.soil_texture.clip_to(region)?;
        Ok(soil_erodibility(&texture))
    }

    /// LS and P together, since P needs the percent slope. Slope is taken on
    /// the unclipped elevation so region edges see their real neighbours.
    fn topography<S: PrecipitationSource>(
        &self,
        inputs: &ErosionInputs<S>,
        region: &ZoneMask,
    ) -> Result<(FactorRaster, RasterGrid, FactorRaster, FallbackCount)> {
        let topo = topographic_factor(&inputs.elevation, self.params.slope_length_ft);
        let ls = FactorRaster::new(FactorKind::LS, topo.ls.raster.clip_to(region)?);
        let slope_pct = topo.slope_pct.clip_to(region)?;
        let land_cover = inputs.land_cover.clip_to(region)?;
        let (p, fallback) = support_practice(&land_cover, &slope_pct)?;
        Ok((ls, slope_pct, p, fallback))
    }

    fn cover<S: PrecipitationSource>(
        &self,
        inputs: &ErosionInputs<S>,
        region: &ZoneMask,
    ) -> Result<CoverResult> {
        let vi = ndvi(&inputs.reflectance, &self.params.nir_band, &self.params.red_band)?
            .clip_to(region)?;
        Ok(cover_management(&vi, self.params.ndvi_alpha, self.params.degenerate_cover_value))
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RusleError;
    use crate::geometry::Polygon;
    use crate::precipitation::{DailyPrecipitation, DailySeries};
    use crate::soil_loss::SeverityClass;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use noise::{NoiseFn, Perlin};

    const N: usize = 24;
    const RES: f64 = 30.0;

    fn grid() -> GridSpec {
        GridSpec::new(N, N, 0.0, N as f64 * RES, RES)
    }

    fn extent() -> f64 {
        N as f64 * RES
    }

    /// 100 mm on four days of every year 2018–2020 → 400 mm/yr.
    fn precipitation() -> DailySeries {
        let mut days = Vec::new();
        for y in 2018..=2020 {
            for m in [2, 5, 8, 11] {
                days.push(DailyPrecipitation {
                    date: NaiveDate::from_ymd_opt(y, m, 10).unwrap(),
                    raster: RasterGrid::filled(grid(), "precip", 100.0),
                });
            }
        }
        DailySeries::new(grid(), days).unwrap()
    }

    /// Perlin hills up to ~60 m relief.
    fn hilly_dem(seed: u32) -> RasterGrid {
        let perlin = Perlin::new(seed);
        RasterGrid::from_fn(grid(), "elevation", |r, c| {
            let v = perlin.get([c as f64 * 0.15, r as f64 * 0.15]);
            (300.0 + 60.0 * v) as f32
        })
    }

    fn reflectance(seed: u32) -> ReflectanceComposite {
        let perlin = Perlin::new(seed.wrapping_add(1));
        let nir = RasterGrid::from_fn(grid(), "B8", |r, c| {
            let v = perlin.get([c as f64 * 0.2, r as f64 * 0.2]);
            (0.35 + 0.15 * v) as f32
        });
        let red = RasterGrid::filled(grid(), "B4", 0.08);
        ReflectanceComposite::new(vec![nir, red])
    }

    fn inputs(dem: RasterGrid, land_cover: f32) -> ErosionInputs<DailySeries> {
        let half = extent() / 2.0;
        ErosionInputs {
            precipitation: precipitation(),
            soil_texture: RasterGrid::filled(grid(), "soil_texture", 7.0),
            elevation: dem,
            reflectance: reflectance(5),
            land_cover: RasterGrid::filled(grid(), "land_cover", land_cover),
            region: RegionMask::new(vec![Polygon::rect(0.0, 0.0, extent(), extent())]),
            sub_units: vec![
                SubUnit::new("north", vec![Polygon::rect(0.0, half, extent(), extent())]),
                SubUnit::new("south", vec![Polygon::rect(0.0, 0.0, extent(), half)]),
                SubUnit::new("offshore", vec![Polygon::rect(-900.0, -900.0, -100.0, -100.0)]),
            ],
        }
    }

    fn params() -> PipelineParams {
        PipelineParams { start_year: 2018, end_year: 2020, ..PipelineParams::default() }
    }

    #[test]
    fn flat_uniform_scene_matches_hand_calculation() {
        let dem = RasterGrid::filled(grid(), "elevation", 120.0);
        let mut scene = inputs(dem, 12.0);
        scene.soil_texture = RasterGrid::filled(grid(), "soil_texture", 11.0);
        scene.reflectance = ReflectanceComposite::new(vec![
            RasterGrid::filled(grid(), "B8", 0.4),
            RasterGrid::filled(grid(), "B4", 0.1),
        ]);

        let pipeline = ErosionPipeline::new(params()).unwrap();
        let out = pipeline.run(&scene).unwrap();

        let r = 0.363 * 400.0 + 79.0;
        let k = 0.0053;
        let ls = 0.76 * (500.0f64 / 72.6).sqrt();
        let c = 1.0; // uniform NDVI → degenerate normalisation
        let p = 0.6; // cropland, 0 % slope
        let expected = r * k * ls * c * p;

        assert_relative_eq!(out.factors.r.raster.get(3, 3) as f64, 224.2, max_relative = 1e-5);
        assert!(matches!(out.quality.cover_normalization, NormalizationOutcome::Degenerate { .. }));
        for &v in out.soil_loss.values() {
            assert_relative_eq!(v as f64, expected, max_relative = 1e-4);
        }
        assert_relative_eq!(out.region_summary.mean_soil_loss, expected, max_relative = 1e-4);
        assert_eq!(
            SeverityClass::classify(expected),
            Some(SeverityClass::Slight),
            "expected {expected}"
        );
        let region_area_km2 = (N * N) as f64 * RES * RES / 1e6;
        assert_relative_eq!(out.region_summary.class_areas.class_1, region_area_km2, max_relative = 1e-9);
    }

    #[test]
    fn hilly_scene_is_consistent() {
        let pipeline = ErosionPipeline::new(params()).unwrap();
        let out = pipeline.run(&inputs(hilly_dem(42), 12.0)).unwrap();

        // Cover factor spans [0, 1].
        let c = out.factors.c.stats().unwrap();
        assert!(c.min.abs() < 1e-6 && (c.max - 1.0).abs() < 1e-6, "{c:?}");

        // Every factor has a stats entry, in R K LS C P order.
        let kinds: Vec<FactorKind> = out.factor_stats.iter().map(|f| f.kind).collect();
        assert_eq!(kinds, FactorKind::ALL.to_vec());

        // Sub-units: sorted, empty one zero-filled, halves add up to the region.
        let ids: Vec<&str> = out.sub_unit_summaries.iter().map(|s| s.zone_id.as_str()).collect();
        assert_eq!(ids, ["north", "offshore", "south"]);
        let offshore = &out.sub_unit_summaries[1];
        assert!(offshore.is_empty());
        assert_eq!(offshore.class_areas.total(), 0.0);

        let halves = out.sub_unit_summaries[0].total_area + out.sub_unit_summaries[2].total_area;
        assert_relative_eq!(halves, out.region_summary.total_area, max_relative = 1e-9);
        let rel = (out.region_summary.class_areas.total() - out.region_summary.total_area).abs()
            / out.region_summary.total_area;
        assert!(rel < 1e-3);

        let rows = out.class_area_table();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].id, "offshore");
    }

    #[test]
    fn repeated_runs_are_identical() {
        let pipeline = ErosionPipeline::new(params()).unwrap();
        let scene = inputs(hilly_dem(7), 14.0);
        let a = pipeline.run(&scene).unwrap();
        let b = pipeline.run(&scene).unwrap();
        assert_eq!(a.soil_loss.to_values(), b.soil_loss.to_values());
        assert_eq!(a.severity.to_values(), b.severity.to_values());
        assert_eq!(a.region_summary, b.region_summary);
        assert_eq!(a.sub_unit_summaries, b.sub_unit_summaries);
    }

    #[test]
    fn region_clip_masks_outside_cells() {
        let mut scene = inputs(hilly_dem(3), 12.0);
        scene.region = RegionMask::new(vec![Polygon::rect(0.0, 0.0, extent() / 2.0, extent())]);
        let out = ErosionPipeline::new(params()).unwrap().run(&scene).unwrap();
        assert_eq!(out.soil_loss.valid_count(), N * N / 2);
        assert_eq!(out.region_summary.valid_pixels, N * N / 2);
        assert_eq!(out.soil_loss.value(0, N - 1), None);
    }

    #[test]
    fn mismatched_input_grid_fails_fast() {
        let mut scene = inputs(hilly_dem(1), 12.0);
        scene.land_cover = RasterGrid::filled(
            GridSpec::new(N, N, 0.0, N as f64 * RES, 500.0),
            "land_cover",
            12.0,
        );
        let err = ErosionPipeline::new(params()).unwrap().run(&scene).err().unwrap();
        match err {
            RusleError::InputShapeMismatch { left, right, detail } => {
                assert_eq!(left, "elevation");
                assert_eq!(right, "land_cover");
                assert!(detail.contains("resolution"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bad_codes_are_counted_not_fatal() {
        let mut scene = inputs(hilly_dem(9), 99.0);
        scene.soil_texture = RasterGrid::filled(grid(), "soil_texture", 40.0);
        let out = ErosionPipeline::new(params()).unwrap().run(&scene).unwrap();
        assert_eq!(out.quality.soil_texture_fallback.pixels, N * N);
        assert_eq!(out.quality.land_cover_fallback.pixels, N * N);
        // K = 0 everywhere → no soil loss.
        assert!(out.soil_loss.values().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn zero_resolution_grid_is_rejected() {
        let mut scene = inputs(RasterGrid::filled(grid(), "elevation", 120.0), 12.0);
        scene.elevation.grid.resolution = 0.0;
        let err = ErosionPipeline::new(params()).unwrap().run(&scene).err().unwrap();
        match err {
            RusleError::InvalidRaster(msg) => assert!(msg.contains("resolution"), "{msg}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn factor_stats_are_checked_against_physical_ranges() {
        let out = ErosionPipeline::new(params()).unwrap().run(&inputs(hilly_dem(11), 12.0)).unwrap();
        assert!(out.factor_stats.iter().all(FactorStats::within_range));

        let k_too_high = FactorStats {
            kind: FactorKind::K,
            stats: Some(RasterStats { min: 0.01, max: 0.2, mean: 0.05, valid_count: 4 }),
        };
        assert!(!k_too_high.within_range());
        assert!(FactorStats { kind: FactorKind::C, stats: None }.within_range());
    }

    #[test]
    fn invalid_params_are_rejected_up_front() {
        let bad = PipelineParams { slope_length_ft: -1.0, ..params() };
        assert!(matches!(ErosionPipeline::new(bad), Err(RusleError::InvalidParams(_))));
    }
}
