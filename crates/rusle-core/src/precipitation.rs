//! Mean annual precipitation from a daily precipitation series.
//!
//! Each year is reduced independently by streaming its daily rasters into a
//! running sum, so the full multi-year stack is never held at once. The
//! mean across years is the only barrier.
//!
//! Gap policy: a cell with no valid daily value in a year is masked in that
//! year's total (not zero). The mean-annual value of a cell is the mean over
//! the years in which it has data; a cell with no data in any year is masked.

use chrono::{Datelike, NaiveDate};
#[cfg(feature = "threading")]
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::error::{Result, RusleError};
use crate::geometry::ZoneMask;
use crate::raster::{GridSpec, RasterGrid};

/// One day of precipitation in millimetres.
#[derive(Debug, Clone)]
pub struct DailyPrecipitation {
    pub date: NaiveDate,
    pub raster: RasterGrid,
}

/// A date-queryable stream of daily precipitation rasters on one grid.
pub trait PrecipitationSource: Sync {
    fn grid(&self) -> &GridSpec;

    /// Observations with `start <= date <= end`, in date order.
    fn observations<'a>(
        &'a self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Box<dyn Iterator<Item = &'a DailyPrecipitation> + 'a>;
}

/// In-memory daily series, sorted by date.
#[derive(Debug, Clone)]
pub struct DailySeries {
    grid: GridSpec,
    days: Vec<DailyPrecipitation>,
}

impl DailySeries {
    /// Every day must be on `grid`.
    pub fn new(grid: GridSpec, mut days: Vec<DailyPrecipitation>) -> Result<Self> {
        for d in &days {
            grid.ensure_matches(&d.raster.grid, "precipitation series", &d.raster.band)?;
        }
        days.sort_by_key(|d| d.date);
        Ok(Self { grid, days })
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

impl PrecipitationSource for DailySeries {
    fn grid(&self) -> &GridSpec {
        &self.grid
    }

    fn observations<'a>(
        &'a self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Box<dyn Iterator<Item = &'a DailyPrecipitation> + 'a> {
        let lo = self.days.partition_point(|d| d.date < start);
        let hi = self.days.partition_point(|d| d.date <= end);
        Box::new(self.days[lo..hi.max(lo)].iter())
    }
}

/// Precipitation summed over one calendar year.
#[derive(Debug, Clone)]
pub struct AnnualTotal {
    pub year: i32,
    pub raster: RasterGrid,
    pub observation_count: usize,
}

fn year_bounds(year: i32) -> Result<(NaiveDate, NaiveDate)> {
    match (NaiveDate::from_ymd_opt(year, 1, 1), NaiveDate::from_ymd_opt(year, 12, 31)) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(RusleError::InvalidYearRange { start: year, end: year }),
    }
}

/// Sum the daily rasters of `year` inside `zone`.
///
/// Negative or masked daily values are treated as gaps.
pub fn annual_total<S: PrecipitationSource + ?Sized>(
    source: &S,
    year: i32,
    zone: &ZoneMask,
) -> Result<AnnualTotal> {
    let grid = *source.grid();
    grid.ensure_matches(&zone.grid, "precipitation series", "region mask")?;
    let (start, end) = year_bounds(year)?;

    let mut sum = vec![0.0f64; grid.len()];
    let mut seen = vec![false; grid.len()];
    let mut observation_count = 0usize;

    for obs in source.observations(start, end) {
        debug_assert_eq!(obs.date.year(), year);
        grid.ensure_matches(&obs.raster.grid, "precipitation series", &obs.raster.band)?;
        observation_count += 1;
        for (i, &v) in obs.raster.values().iter().enumerate() {
            if zone.contains(i) && v >= 0.0 {
                sum[i] += v as f64;
                seen[i] = true;
            }
        }
    }

    if observation_count == 0 {
        warn!(year, "no precipitation observations in year; annual total fully masked");
    } else {
        debug!(year, observation_count, "annual precipitation total");
    }

    let raster = RasterGrid::from_fn(grid, format!("precipitation_{year}"), |r, c| {
        let i = r * grid.width + c;
        if seen[i] { sum[i] as f32 } else { f32::NAN }
    });
    Ok(AnnualTotal { year, raster, observation_count })
}

/// Pixel-wise mean of the annual totals of `start_year..=end_year`.
pub fn mean_annual_precipitation<S: PrecipitationSource + ?Sized>(
    source: &S,
    start_year: i32,
    end_year: i32,
    zone: &ZoneMask,
) -> Result<RasterGrid> {
    if start_year > end_year {
        return Err(RusleError::InvalidYearRange { start: start_year, end: end_year });
    }
    let years: Vec<i32> = (start_year..=end_year).collect();

    #[cfg(feature = "threading")]
    let totals = years
        .par_iter()
        .map(|&y| annual_total(source, y, zone))
        .collect::<Result<Vec<_>>>()?;
    #[cfg(not(feature = "threading"))]
    let totals = years
        .iter()
        .map(|&y| annual_total(source, y, zone))
        .collect::<Result<Vec<_>>>()?;

    let grid = *source.grid();
    let mut sum = vec![0.0f64; grid.len()];
    let mut n_years = vec![0u32; grid.len()];
    for t in &totals {
        for (i, &v) in t.raster.values().iter().enumerate() {
            if !v.is_nan() {
                sum[i] += v as f64;
                n_years[i] += 1;
            }
        }
    }

    Ok(RasterGrid::from_fn(grid, "mean_annual_precipitation", |r, c| {
        let i = r * grid.width + c;
        if n_years[i] == 0 { f32::NAN } else { (sum[i] / n_years[i] as f64) as f32 }
    }))
}
