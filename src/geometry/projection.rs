//! CRS-to-CRS projection using pure Rust (proj4rs + crs-definitions).
//!
//! [`CrsTransform`] parses both PROJ definitions once and is reused for every
//! point of a batch, which matters when a transformer is called for each
//! perimeter sample of every chunk.

use proj4rs::proj::Proj;
use proj4rs::transform::transform;

/// Get PROJ4 string for an EPSG code using the crs-definitions database
#[inline]
#[must_use]
pub fn get_proj_string(epsg: i32) -> Option<&'static str> {
    u16::try_from(epsg)
        .ok()
        .and_then(crs_definitions::from_code)
        .map(|def| def.proj4)
}

/// Check if an EPSG code represents a geographic (lon/lat) CRS
#[inline]
#[must_use]
pub fn is_geographic_crs(epsg: i32) -> bool {
    if let Some(proj_str) = get_proj_string(epsg) {
        proj_str.contains("+proj=longlat")
    } else {
        epsg == 4326 || (4000..5000).contains(&epsg)
    }
}

/// A prepared projection between two EPSG codes.
///
/// Geographic coordinates are taken and returned in degrees; the radian
/// conversion proj4rs needs happens inside.
pub struct CrsTransform {
    source_epsg: i32,
    target_epsg: i32,
    /// `None` when both codes are equal and points pass through untouched.
    projs: Option<(Proj, Proj)>,
    source_is_geographic: bool,
    target_is_geographic: bool,
}

impl std::fmt::Debug for CrsTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrsTransform")
            .field("source_epsg", &self.source_epsg)
            .field("target_epsg", &self.target_epsg)
            .finish_non_exhaustive()
    }
}

impl CrsTransform {
    /// Prepare a projection from `source_epsg` to `target_epsg`.
    ///
    /// # Errors
    /// Returns an error if either code is not in the crs-definitions database
    /// or its PROJ string cannot be parsed.
    pub fn new(source_epsg: i32, target_epsg: i32) -> Result<Self, String> {
        let projs = if source_epsg == target_epsg {
            None
        } else {
            Some((parse_proj(source_epsg)?, parse_proj(target_epsg)?))
        };

        Ok(Self {
            source_epsg,
            target_epsg,
            projs,
            source_is_geographic: is_geographic_crs(source_epsg),
            target_is_geographic: is_geographic_crs(target_epsg),
        })
    }

    /// The same projection in the opposite direction.
    ///
    /// # Errors
    /// See [`CrsTransform::new`].
    pub fn inverse(&self) -> Result<Self, String> {
        Self::new(self.target_epsg, self.source_epsg)
    }

    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.projs.is_none()
    }

    /// Project one point.
    ///
    /// # Errors
    /// Returns an error if proj4rs rejects the point (outside the projection's
    /// domain) or produces a non-finite result.
    pub fn project(&self, x: f64, y: f64) -> Result<(f64, f64), String> {
        let Some((source, target)) = &self.projs else {
            return Ok((x, y));
        };

        let mut point = if self.source_is_geographic {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };

        transform(source, target, &mut point).map_err(|e| {
            format!(
                "Transform from EPSG:{} to EPSG:{} failed: {e:?}",
                self.source_epsg, self.target_epsg
            )
        })?;

        let (out_x, out_y) = if self.target_is_geographic {
            (point.0.to_degrees(), point.1.to_degrees())
        } else {
            (point.0, point.1)
        };

        if out_x.is_finite() && out_y.is_finite() {
            Ok((out_x, out_y))
        } else {
            Err(format!(
                "Transform from EPSG:{} to EPSG:{} produced a non-finite point",
                self.source_epsg, self.target_epsg
            ))
        }
    }
}

fn parse_proj(epsg: i32) -> Result<Proj, String> {
    let proj_str = get_proj_string(epsg)
        .ok_or_else(|| format!("EPSG:{epsg} is not in the crs-definitions database"))?;
    Proj::from_proj_string(proj_str).map_err(|e| format!("Invalid projection EPSG:{epsg}: {e:?}"))
}

/// Project a single point from one CRS to another.
///
/// # Errors
/// Returns an error if either EPSG code is unsupported or the point cannot be
/// projected.
pub fn project_point(source_epsg: i32, target_epsg: i32, x: f64, y: f64) -> Result<(f64, f64), String> {
    CrsTransform::new(source_epsg, target_epsg)?.project(x, y)
}
