//! RUSLE soil-loss estimation over a gridded region.
//!
//! `A = R · K · LS · C · P` is computed per cell from precipitation, soil
//! texture, elevation, reflectance and land cover, classified into five
//! severity classes, and reduced to per-zone means and class areas.
//! [`pipeline::ErosionPipeline`] runs the whole chain.

pub mod error;
pub mod factors;
pub mod geometry;
pub mod normalize;
pub mod params;
pub mod pipeline;
pub mod precipitation;
pub mod raster;
pub mod soil_loss;
pub mod zonal;

pub use error::{Result, RusleError};
pub use factors::{FactorKind, FactorRaster, FallbackCount, ReflectanceComposite};
pub use geometry::{Polygon, RegionMask, SubUnit, ZoneMask};
pub use params::PipelineParams;
pub use pipeline::{DataQuality, ErosionInputs, ErosionPipeline, FactorStats, PipelineResult};
pub use precipitation::{DailyPrecipitation, DailySeries, PrecipitationSource};
pub use raster::{GridSpec, RasterGrid, RasterStats, DEFAULT_NODATA};
pub use soil_loss::{FactorSet, SeverityClass};
pub use zonal::{AreaUnit, ClassAreaRow, ZonalSummary};
