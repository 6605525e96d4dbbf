//! Zonal statistics over the region and its sub-units.
//!
//! Every cell has the same area (`resolution²`), so the zone mean is a plain
//! pixel mean and class areas are pixel counts times the cell area. A zone
//! with no valid cells is a normal outcome: its mean and areas are zero and
//! `valid_pixels` is 0.

#[cfg(feature = "threading")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, RusleError};
use crate::geometry::{SubUnit, ZoneMask};
use crate::raster::RasterGrid;
use crate::soil_loss::SeverityClass;

/// Zone id used for the whole-region summary.
pub const REGION_ZONE_ID: &str = "region";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AreaUnit {
    SquareMeters,
    Hectares,
    #[default]
    SquareKilometers,
}

impl AreaUnit {
    pub fn convert_m2(self, m2: f64) -> f64 {
        match self {
            Self::SquareMeters => m2,
            Self::Hectares => m2 / 10_000.0,
            Self::SquareKilometers => m2 / 1_000_000.0,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::SquareMeters => "m2",
            Self::Hectares => "ha",
            Self::SquareKilometers => "km2",
        }
    }

    /// Accepts the symbol or the variant name, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "m2" | "squaremeters" | "square_meters" => Some(Self::SquareMeters),
            "ha" | "hectares" => Some(Self::Hectares),
            "km2" | "squarekilometers" | "square_kilometers" => Some(Self::SquareKilometers),
            _ => None,
        }
    }
}

/// One number per severity class. All five keys are always present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassAreas {
    pub class_1: f64,
    pub class_2: f64,
    pub class_3: f64,
    pub class_4: f64,
    pub class_5: f64,
}

impl ClassAreas {
    pub fn from_array(v: [f64; 5]) -> Self {
        Self { class_1: v[0], class_2: v[1], class_3: v[2], class_4: v[3], class_5: v[4] }
    }

    pub fn to_array(self) -> [f64; 5] {
        [self.class_1, self.class_2, self.class_3, self.class_4, self.class_5]
    }

    pub fn get(&self, class: SeverityClass) -> f64 {
        self.to_array()[class.code() as usize - 1]
    }

    pub fn total(&self) -> f64 {
        self.to_array().iter().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZonalSummary {
    pub zone_id: String,
    /// Mean soil loss over valid cells, t/ha/yr. 0 for an empty zone.
    pub mean_soil_loss: f64,
    pub valid_pixels: usize,
    pub area_unit: AreaUnit,
    /// Area of all valid cells.
    pub total_area: f64,
    pub class_areas: ClassAreas,
    /// Share of `total_area` per class, percent.
    pub class_percent: ClassAreas,
}

impl ZonalSummary {
    pub fn is_empty(&self) -> bool {
        self.valid_pixels == 0
    }

    fn empty(zone_id: String, area_unit: AreaUnit) -> Self {
        Self {
            zone_id,
            mean_soil_loss: 0.0,
            valid_pixels: 0,
            area_unit,
            total_area: 0.0,
            class_areas: ClassAreas::default(),
            class_percent: ClassAreas::default(),
        }
    }
}

/// Reduce the soil-loss and class rasters over one zone.
///
/// A cell counts when it is inside `zone` and both rasters are valid there.
pub fn zone_summary(
    zone_id: impl Into<String>,
    soil_loss: &RasterGrid,
    classes: &RasterGrid,
    zone: &ZoneMask,
    unit: AreaUnit,
) -> Result<ZonalSummary> {
    let zone_id = zone_id.into();
    soil_loss.grid.ensure_matches(&classes.grid, &soil_loss.band, &classes.band)?;
    soil_loss.grid.ensure_matches(&zone.grid, &soil_loss.band, &zone_id)?;

    let mut sum = 0.0f64;
    let mut n = 0usize;
    let mut counts = [0usize; 5];
    for (i, (&a, &cls)) in soil_loss.values().iter().zip(classes.values()).enumerate() {
        if !zone.contains(i) || a.is_nan() || cls.is_nan() {
            continue;
        }
        let class = SeverityClass::from_code(cls as u8).ok_or_else(|| {
            RusleError::invalid_raster(format!("severity class raster holds {cls} at cell {i}"))
        })?;
        sum += a as f64;
        n += 1;
        counts[class.code() as usize - 1] += 1;
    }

    if n == 0 {
        return Ok(ZonalSummary::empty(zone_id, unit));
    }

    let cell_area = unit.convert_m2(soil_loss.grid.pixel_area_m2());
    let areas = counts.map(|c| c as f64 * cell_area);
    let percent = counts.map(|c| c as f64 * 100.0 / n as f64);
    Ok(ZonalSummary {
        zone_id,
        mean_soil_loss: sum / n as f64,
        valid_pixels: n,
        area_unit: unit,
        total_area: n as f64 * cell_area,
        class_areas: ClassAreas::from_array(areas),
        class_percent: ClassAreas::from_array(percent),
    })
}

/// Whole-region summary.
pub fn region_summary(
    soil_loss: &RasterGrid,
    classes: &RasterGrid,
    region: &ZoneMask,
    unit: AreaUnit,
) -> Result<ZonalSummary> {
    let summary = zone_summary(REGION_ZONE_ID, soil_loss, classes, region, unit)?;
    if summary.is_empty() {
        warn!("region has no valid soil-loss cells");
    }
    Ok(summary)
}

/// One summary per sub-unit, restricted to the region, sorted by id.
pub fn sub_unit_summaries(
    soil_loss: &RasterGrid,
    classes: &RasterGrid,
    region: &ZoneMask,
    sub_units: &[SubUnit],
    unit: AreaUnit,
) -> Result<Vec<ZonalSummary>> {
    let summarise = |su: &SubUnit| -> Result<ZonalSummary> {
        let zone = su.rasterize(&soil_loss.grid)?.intersect(region)?;
        let summary = zone_summary(su.id.clone(), soil_loss, classes, &zone, unit)?;
        if summary.is_empty() {
            warn!(sub_unit = %su.id, "sub-unit covers no valid cells; summary zero-filled");
        } else {
            debug!(sub_unit = %su.id, mean = summary.mean_soil_loss, "sub-unit summary");
        }
        Ok(summary)
    };

    #[cfg(feature = "threading")]
    let mut out = sub_units.par_iter().map(summarise).collect::<Result<Vec<_>>>()?;
    #[cfg(not(feature = "threading"))]
    let mut out = sub_units.iter().map(summarise).collect::<Result<Vec<_>>>()?;

    out.sort_by(|a, b| a.zone_id.cmp(&b.zone_id));
    Ok(out)
}

/// One row of the sub-unit class-area table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassAreaRow {
    pub id: String,
    pub class_1: f64,
    pub class_2: f64,
    pub class_3: f64,
    pub class_4: f64,
    pub class_5: f64,
}

/// `{id, class_1..class_5}` rows in the order of `summaries`.
pub fn class_area_table(summaries: &[ZonalSummary]) -> Vec<ClassAreaRow> {
    summaries
        .iter()
        .map(|s| {
            let a = s.class_areas;
            ClassAreaRow {
                id: s.zone_id.clone(),
                class_1: a.class_1,
                class_2: a.class_2,
                class_3: a.class_3,
                class_4: a.class_4,
                class_5: a.class_5,
            }
        })
        .collect()
}
