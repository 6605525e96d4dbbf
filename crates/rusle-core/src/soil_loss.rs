//! Soil loss A = R · K · LS · C · P and its severity classification.

use serde::{Deserialize, Serialize};

use crate::error::{Result, RusleError};
use crate::factors::{FactorKind, FactorRaster};
use crate::raster::RasterGrid;

/// Ordinal soil-loss severity, t/ha/yr.
///
/// The five classes partition [0, ∞) into half-open intervals, lower bound
/// inclusive: [0,5) [5,10) [10,20) [20,40) [40,∞).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SeverityClass {
    Slight = 1,
    Moderate = 2,
    High = 3,
    VeryHigh = 4,
    Severe = 5,
}

/// Exclusive upper bounds of classes 1–4, ascending.
pub const SEVERITY_UPPER_BOUNDS: [f64; 4] = [5.0, 10.0, 20.0, 40.0];

impl SeverityClass {
    pub const ALL: [SeverityClass; 5] = [
        Self::Slight,
        Self::Moderate,
        Self::High,
        Self::VeryHigh,
        Self::Severe,
    ];

    /// 1-based class number.
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get((code as usize).checked_sub(1)?).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Slight => "Slight",
            Self::Moderate => "Moderate",
            Self::High => "High",
            Self::VeryHigh => "Very high",
            Self::Severe => "Severe",
        }
    }

    /// `[lower, upper)` in t/ha/yr; the last class is open above.
    pub fn interval(self) -> (f64, f64) {
        let i = self.code() as usize - 1;
        let lower = if i == 0 { 0.0 } else { SEVERITY_UPPER_BOUNDS[i - 1] };
        let upper = SEVERITY_UPPER_BOUNDS.get(i).copied().unwrap_or(f64::INFINITY);
        (lower, upper)
    }

    /// Thresholds are tested in ascending order and the first match wins, so
    /// a value exactly on a boundary lands in the higher class. Negative and
    /// NaN values have no class.
    pub fn classify(soil_loss: f64) -> Option<Self> {
        if soil_loss.is_nan() || soil_loss < 0.0 {
            return None;
        }
        for (class, &upper) in Self::ALL.iter().zip(SEVERITY_UPPER_BOUNDS.iter()) {
            if soil_loss < upper {
                return Some(*class);
            }
        }
        Some(Self::Severe)
    }
}

/// The five factor rasters, all on the same grid.
#[derive(Debug, Clone)]
pub struct FactorSet {
    pub r: FactorRaster,
    pub k: FactorRaster,
    pub ls: FactorRaster,
    pub c: FactorRaster,
    pub p: FactorRaster,
}

impl FactorSet {
    pub fn iter(&self) -> impl Iterator<Item = &FactorRaster> {
        [&self.r, &self.k, &self.ls, &self.c, &self.p].into_iter()
    }

    /// Fail if a slot holds the wrong factor or any grid differs from R's.
    pub fn validate(&self) -> Result<()> {
        for (slot, f) in FactorKind::ALL.iter().zip(self.iter()) {
            if f.kind != *slot {
                return Err(RusleError::invalid_raster(format!(
                    "factor slot {} holds a {} raster",
                    slot.band_name(),
                    f.kind.band_name()
                )));
            }
            self.r
                .raster
                .grid
                .ensure_matches(&f.raster.grid, "R", f.kind.band_name())?;
        }
        Ok(())
    }
}

/// Soil loss and its class raster. Class values are 1–5, masked where soil
/// loss is masked.
#[derive(Debug, Clone)]
pub struct SoilLossResult {
    pub soil_loss: RasterGrid,
    pub classes: RasterGrid,
}

/// Multiply the factors cell by cell and classify the product.
pub fn compose(factors: &FactorSet) -> Result<SoilLossResult> {
    factors.validate()?;
    let grid = factors.r.raster.grid;
    let layers: Vec<&[f32]> = factors.iter().map(|f| f.raster.values()).collect();

    let soil_loss = RasterGrid::from_fn(grid, "soil_loss", |r, c| {
        let i = r * grid.width + c;
        let mut a = 1.0f64;
        for layer in &layers {
            let v = layer[i];
            if v.is_nan() {
                return f32::NAN;
            }
            a *= v as f64;
        }
        a as f32
    });
    let classes = classify_raster(&soil_loss);
    Ok(SoilLossResult { soil_loss, classes })
}

/// Severity class per cell (as 1.0–5.0).
pub fn classify_raster(soil_loss: &RasterGrid) -> RasterGrid {
    RasterGrid::from_fn(soil_loss.grid, "severity_class", |r, c| {
        match SeverityClass::classify(soil_loss.get(r, c) as f64) {
            Some(class) => class.code() as f32,
            None => f32::NAN,
        }
    })
}
