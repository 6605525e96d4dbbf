//! Terrain slope (Horn method) over a projected elevation raster.
//!
//! Slope is computed at every cell from Horn's (1981) 3×3 weighted
//! finite-difference gradient. At the raster edge the neighbourhood is
//! clamped to the nearest row/column; a masked neighbour takes the centre
//! cell's elevation. Masked centre cells stay masked.

use crate::raster::RasterGrid;

/// Horn (1981) weighted 3×3 gradient at cell `(r, c)`.
///
/// Returns `(dz_dx, dz_dy)` as dimensionless rise/run, or `None` if the
/// centre cell is masked.
///
/// 3×3 neighbourhood layout:
/// ```text
///   NW(-1,-1)  N(-1, 0)  NE(-1,+1)
///   W ( 0,-1)  *         E ( 0,+1)
///   SW(+1,-1)  S(+1, 0)  SE(+1,+1)
/// ```
///
/// `dz/dx = ((NE + 2E + SE) − (NW + 2W + SW)) / (8 · cellsize)`
/// `dz/dy = ((NW + 2N + NE) − (SW + 2S + SE)) / (8 · cellsize)`
pub(crate) fn horn_gradient(dem: &RasterGrid, r: usize, c: usize, cellsize: f64) -> Option<(f64, f64)> {
    let centre = dem.get(r, c);
    if centre.is_nan() {
        return None;
    }
    let h = dem.height() as i64;
    let w = dem.width() as i64;
    let at = |dr: i64, dc: i64| -> f64 {
        let nr = (r as i64 + dr).clamp(0, h - 1) as usize;
        let nc = (c as i64 + dc).clamp(0, w - 1) as usize;
        let v = dem.get(nr, nc);
        if v.is_nan() { centre as f64 } else { v as f64 }
    };

    let nw = at(-1, -1);
    let n  = at(-1,  0);
    let ne = at(-1,  1);
    let w_ = at( 0, -1);
    let e  = at( 0,  1);
    let sw = at( 1, -1);
    let s  = at( 1,  0);
    let se = at( 1,  1);

    let dz_dx = ((ne + 2.0 * e + se) - (nw + 2.0 * w_ + sw)) / (8.0 * cellsize);
    let dz_dy = ((nw + 2.0 * n + ne) - (sw + 2.0 * s + se)) / (8.0 * cellsize);
    Some((dz_dx, dz_dy))
}

/// Slope angle in degrees, `atan(√(dz_dx² + dz_dy²))`.
pub fn slope_degrees(dem: &RasterGrid) -> RasterGrid {
    let cellsize = dem.grid.resolution;
    RasterGrid::from_fn(dem.grid, "slope_deg", |r, c| match horn_gradient(dem, r, c, cellsize) {
        Some((dz_dx, dz_dy)) => {
            let slope_rad = (dz_dx * dz_dx + dz_dy * dz_dy).sqrt().atan();
            (slope_rad.to_degrees() as f32).max(0.0)
        }
        None => f32::NAN,
    })
}

/// Slope in percent rise: `tan(deg · π/180) · 100`.
pub fn percent_slope(slope_deg: &RasterGrid) -> RasterGrid {
    slope_deg.map("slope_pct", |deg| ((deg as f64).to_radians().tan() * 100.0) as f32)
}
