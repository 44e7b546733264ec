//! Coordinate transformers between destination and source pixel space.
//!
//! The warper only ever asks for [`TransformDirection::DstToSrc`]; the
//! opposite direction exists so that a kernel (or a caller building output
//! bounds) can use the same object.

use crate::geometry::projection::CrsTransform;
use crate::geometry::{GeoReference, GeoTransform, Point};

/// Which way a batch of points is mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformDirection {
    /// Destination pixel/line to source pixel/line.
    DstToSrc,
    /// Source pixel/line to destination pixel/line.
    SrcToDst,
}

/// A bidirectional mapping between destination and source pixel space.
///
/// Implementations transform `points` in place and set `success[i]` per
/// point; mixed success within one batch is normal. Returning `Err` means the
/// whole call failed and no point can be trusted.
pub trait Transformer {
    /// Transform a batch of points.
    ///
    /// `points` and `success` always have the same length.
    ///
    /// # Errors
    /// Returns a description when the transformer cannot run at all.
    fn transform(
        &self,
        direction: TransformDirection,
        points: &mut [Point],
        success: &mut [bool],
    ) -> Result<(), String>;
}

/// Adapts a per-point closure into a [`Transformer`].
///
/// The closure returns `None` for points it cannot map.
pub struct FnTransformer<F> {
    func: F,
}

impl<F> FnTransformer<F>
where
    F: Fn(TransformDirection, Point) -> Option<Point>,
{
    #[must_use]
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Transformer for FnTransformer<F>
where
    F: Fn(TransformDirection, Point) -> Option<Point>,
{
    fn transform(
        &self,
        direction: TransformDirection,
        points: &mut [Point],
        success: &mut [bool],
    ) -> Result<(), String> {
        for (point, ok) in points.iter_mut().zip(success.iter_mut()) {
            match (self.func)(direction, *point) {
                Some(mapped) => {
                    *point = mapped;
                    *ok = true;
                }
                None => *ok = false,
            }
        }
        Ok(())
    }
}

/// Maps pixel/line of one georeferenced raster onto another.
///
/// Destination pixel → destination world (geotransform) → source CRS
/// (proj4rs, skipped when both EPSG codes match) → source pixel.
#[derive(Debug)]
pub struct GenImgProjTransformer {
    src_gt: GeoTransform,
    dst_gt: GeoTransform,
    dst_to_src: CrsTransform,
    src_to_dst: CrsTransform,
}

impl GenImgProjTransformer {
    /// Build a transformer between two georeferenced rasters.
    ///
    /// # Errors
    /// Returns an error if either geotransform is degenerate or either EPSG
    /// code is unsupported.
    pub fn new(src: &GeoReference, dst: &GeoReference) -> Result<Self, String> {
        if !src.geo_transform.is_invertible() {
            return Err("Source geotransform is not invertible".to_string());
        }
        if !dst.geo_transform.is_invertible() {
            return Err("Destination geotransform is not invertible".to_string());
        }

        let dst_to_src = CrsTransform::new(dst.epsg, src.epsg)?;
        let src_to_dst = dst_to_src.inverse()?;

        Ok(Self {
            src_gt: src.geo_transform,
            dst_gt: dst.geo_transform,
            dst_to_src,
            src_to_dst,
        })
    }

    fn map_point(&self, direction: TransformDirection, point: &Point) -> Option<(f64, f64)> {
        let (from_gt, to_gt, crs) = match direction {
            TransformDirection::DstToSrc => (&self.dst_gt, &self.src_gt, &self.dst_to_src),
            TransformDirection::SrcToDst => (&self.src_gt, &self.dst_gt, &self.src_to_dst),
        };

        let (wx, wy) = from_gt.pixel_to_world(point.x, point.y);
        let (tx, ty) = crs.project(wx, wy).ok()?;
        let (px, py) = to_gt.world_to_pixel(tx, ty);
        (px.is_finite() && py.is_finite()).then_some((px, py))
    }
}

impl Transformer for GenImgProjTransformer {
    fn transform(
        &self,
        direction: TransformDirection,
        points: &mut [Point],
        success: &mut [bool],
    ) -> Result<(), String> {
        if points.len() != success.len() {
            return Err(format!(
                "{} points but {} success flags",
                points.len(),
                success.len()
            ));
        }

        for (point, ok) in points.iter_mut().zip(success.iter_mut()) {
            if let Some((x, y)) = self.map_point(direction, point) {
                point.x = x;
                point.y = y;
                *ok = true;
            } else {
                *ok = false;
            }
        }
        Ok(())
    }
}
