//! Error types for the soil-loss pipeline.
//!
//! Only structural problems are errors. Data-quality irregularities (bad
//! class codes, empty zones, flat cover distributions) degrade to defined
//! fallback values and are reported through `tracing` instead.

use thiserror::Error;

/// Errors that abort a pipeline run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RusleError {
    /// Two rasters combined in one expression do not share a grid.
    #[error("raster '{left}' and raster '{right}' are on different grids: {detail}")]
    InputShapeMismatch {
        left: String,
        right: String,
        detail: String,
    },

    /// A raster's value vector does not fit its grid.
    #[error("invalid raster: {0}")]
    InvalidRaster(String),

    /// The aggregation year range is empty.
    #[error("invalid year range: start year {start} is after end year {end}")]
    InvalidYearRange { start: i32, end: i32 },

    /// A polygon cannot be used for masking.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Pipeline parameters failed validation.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
}

impl RusleError {
    /// Create an InputShapeMismatch error.
    pub fn shape_mismatch(
        left: impl Into<String>,
        right: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::InputShapeMismatch {
            left: left.into(),
            right: right.into(),
            detail: detail.into(),
        }
    }

    /// Create an InvalidRaster error.
    pub fn invalid_raster(msg: impl Into<String>) -> Self {
        Self::InvalidRaster(msg.into())
    }

    /// Create an InvalidGeometry error.
    pub fn invalid_geometry(msg: impl Into<String>) -> Self {
        Self::InvalidGeometry(msg.into())
    }

    /// Create an InvalidParams error.
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::InvalidParams(msg.into())
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, RusleError>;
