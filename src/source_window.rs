//! Estimate the source window a destination window depends on.
//!
//! The destination window's perimeter is sampled, mapped into source pixel
//! space in one transformer call, and bounded. The bound is grown by the
//! resampling kernel's halo and clamped to the source raster.

use tracing::{debug, warn};

use crate::casting::{ceil_to_i64, floor_to_i64, i64_to_clamped_usize};
use crate::error::{Result, WarpError};
use crate::geometry::{Point, Window};
use crate::options::ResampleAlg;
use crate::transformer::{TransformDirection, Transformer};

/// Sample points per window edge, both corners included.
pub const SAMPLES_PER_EDGE: usize = 21;

/// Total perimeter samples.
pub const SAMPLE_COUNT: usize = SAMPLES_PER_EDGE * 4;

/// The estimate fails when fewer than this many samples transform.
pub const MIN_SUCCESSFUL_SAMPLES: usize = 10;

/// Points along the four edges of `dst`, in destination pixel coordinates.
///
/// For each step the top, bottom, left and right edge points are emitted in
/// that order. The last step lands exactly on the far corner.
#[must_use]
pub fn perimeter_samples(dst: Window) -> Vec<Point> {
    let x0 = dst.x_off as f64;
    let y0 = dst.y_off as f64;
    let w = dst.x_size as f64;
    let h = dst.y_size as f64;
    let last = (SAMPLES_PER_EDGE - 1) as f64;

    let mut points = Vec::with_capacity(SAMPLE_COUNT);
    for step in 0..SAMPLES_PER_EDGE {
        let ratio = if step == SAMPLES_PER_EDGE - 1 {
            1.0
        } else {
            step as f64 / last
        };
        points.push(Point::new(x0 + ratio * w, y0));
        points.push(Point::new(x0 + ratio * w, y0 + h));
        points.push(Point::new(x0, y0 + ratio * h));
        points.push(Point::new(x0 + w, y0 + ratio * h));
    }
    points
}

/// Source window needed to warp `dst`, clamped to a `src_width` by
/// `src_height` source raster.
///
/// # Errors
/// [`WarpError::Transform`] if the transformer call fails or more than
/// `SAMPLE_COUNT - MIN_SUCCESSFUL_SAMPLES` samples fail to map.
pub fn compute_source_window(
    dst: Window,
    transformer: &dyn Transformer,
    resample_alg: ResampleAlg,
    src_width: usize,
    src_height: usize,
) -> Result<Window> {
    let mut points = perimeter_samples(dst);
    let mut success = vec![false; points.len()];

    transformer
        .transform(TransformDirection::DstToSrc, &mut points, &mut success)
        .map_err(|e| WarpError::transform(format!("transformer failed for window {dst}: {e}")))?;

    let failed = success.iter().filter(|ok| !**ok).count();
    if failed > points.len() - MIN_SUCCESSFUL_SAMPLES {
        return Err(WarpError::transform(format!(
            "too many points ({failed} out of {}) failed to transform for window {dst}",
            points.len()
        )));
    }
    if failed > 0 {
        warn!(
            failed,
            total = points.len(),
            window = %dst,
            "some perimeter points failed to transform"
        );
    }

    let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
    let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for point in points.iter().zip(&success).filter(|(_, ok)| **ok).map(|(p, _)| p) {
        min_x = min_x.min(point.x);
        min_y = min_y.min(point.y);
        max_x = max_x.max(point.x);
        max_y = max_y.max(point.y);
    }

    let halo = i64::try_from(resample_alg.halo_margin()).unwrap_or(0);
    let (x_off, x_size) = clamp_axis(min_x, max_x, halo, src_width);
    let (y_off, y_size) = clamp_axis(min_y, max_y, halo, src_height);

    let window = Window::new(x_off, y_off, x_size, y_size);
    debug!(dst = %dst, src = %window, "computed source window");
    Ok(window)
}

/// Grow `[min, max]` by `halo` on both sides and clamp to `[0, extent]`.
fn clamp_axis(min: f64, max: f64, halo: i64, extent: usize) -> (usize, usize) {
    let start = floor_to_i64(min).saturating_sub(halo);
    let end = ceil_to_i64(max).saturating_add(halo);
    let off = i64_to_clamped_usize(start, extent);
    let end = i64_to_clamped_usize(end, extent);
    (off, end.saturating_sub(off))
}
