//! Pipeline configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RusleError};
use crate::factors::cover::DEFAULT_NDVI_ALPHA;
use crate::factors::topographic::DEFAULT_SLOPE_LENGTH_FT;
use crate::zonal::AreaUnit;

/// Tunable inputs of a pipeline run. Missing JSON fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineParams {
    /// First year of the precipitation record (inclusive).
    pub start_year: i32,
    /// Last year of the precipitation record (inclusive).
    pub end_year: i32,
    /// Assumed slope length for LS, feet.
    pub slope_length_ft: f64,
    /// Exponent scale in `exp(α · NDVI / (1 − NDVI))`; must be negative.
    pub ndvi_alpha: f64,
    /// C assigned everywhere when the raw cover factor is constant over the region.
    pub degenerate_cover_value: f32,
    pub nir_band: String,
    pub red_band: String,
    pub area_unit: AreaUnit,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            start_year: 2015,
            end_year: 2020,
            slope_length_ft: DEFAULT_SLOPE_LENGTH_FT,
            ndvi_alpha: DEFAULT_NDVI_ALPHA,
            degenerate_cover_value: 1.0,
            nir_band: "B8".to_string(),
            red_band: "B4".to_string(),
            area_unit: AreaUnit::SquareKilometers,
        }
    }
}

impl PipelineParams {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| RusleError::invalid_params(e.to_string()))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| RusleError::invalid_params(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    /// Override fields from `RUSLE_*` environment variables.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Override fields from any key lookup (environment, CLI `key=value` pairs).
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        fn parse<T: std::str::FromStr>(key: &str, val: &str) -> Result<T> {
            val.trim()
                .parse()
                .map_err(|_| RusleError::invalid_params(format!("{key}={val} is not a valid value")))
        }

        if let Some(v) = lookup("RUSLE_START_YEAR") {
            self.start_year = parse("RUSLE_START_YEAR", &v)?;
        }
        if let Some(v) = lookup("RUSLE_END_YEAR") {
            self.end_year = parse("RUSLE_END_YEAR", &v)?;
        }
        if let Some(v) = lookup("RUSLE_SLOPE_LENGTH_FT") {
            self.slope_length_ft = parse("RUSLE_SLOPE_LENGTH_FT", &v)?;
        }
        if let Some(v) = lookup("RUSLE_AREA_UNIT") {
            self.area_unit = AreaUnit::parse(&v).ok_or_else(|| {
                RusleError::invalid_params(format!("RUSLE_AREA_UNIT={v} is not m2, ha or km2"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.start_year > self.end_year {
            return Err(RusleError::InvalidYearRange {
                start: self.start_year,
                end: self.end_year,
            });
        }
        if !(self.slope_length_ft.is_finite() && self.slope_length_ft > 0.0) {
            return Err(RusleError::invalid_params(format!(
                "slope_length_ft must be > 0, got {}",
                self.slope_length_ft
            )));
        }
        if !(self.ndvi_alpha.is_finite() && self.ndvi_alpha < 0.0) {
            return Err(RusleError::invalid_params(format!(
                "ndvi_alpha must be < 0, got {}",
                self.ndvi_alpha
            )));
        }
        if !(0.0..=1.0).contains(&self.degenerate_cover_value) {
            return Err(RusleError::invalid_params(format!(
                "degenerate_cover_value must be in [0, 1], got {}",
                self.degenerate_cover_value
            )));
        }
        if self.nir_band.is_empty() || self.red_band.is_empty() {
            return Err(RusleError::invalid_params("nir_band and red_band must be named"));
        }
        Ok(())
    }
}
