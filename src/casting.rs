//! Safe numeric casting utilities for raster warping.
//!
//! This module provides checked conversions and documents our assumptions
//! about numeric ranges in the context of chunked warping.
//!
//! # Design Decisions
//!
//! ## Image Dimensions (`usize` ↔ `f64`)
//! We allow `usize` to `f64` conversions without explicit checks because:
//! - Maximum practical image dimension: ~1 billion pixels per side
//! - `f64` mantissa: 52 bits, can exactly represent integers up to 2^53
//! - No real-world raster will exceed this limit
//!
//! ## Transformed Coordinates (`f64` → `i64`)
//! Source-space coordinates come back from an arbitrary transformer and may be
//! huge, negative or NaN. They are floored/ceiled into `i64` with saturation
//! before being clamped to the raster extent.
//!
//! ## Element Values (`f64` → integer types)
//! Values written into integer working buffers are rounded to nearest and
//! saturated at the type's range. NaN becomes zero.

use std::convert::TryFrom;

/// Round to nearest and clamp into `[min, max]`. NaN maps to `0` (clamped).
#[inline]
#[must_use]
pub fn round_clamp(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        return 0.0_f64.clamp(min, max);
    }
    (value + 0.5).floor().clamp(min, max)
}

/// Floor a coordinate into `i64`, saturating at the `i64` range.
///
/// NaN floors to zero.
#[inline]
#[must_use]
pub fn floor_to_i64(value: f64) -> i64 {
    // Float-to-int `as` saturates and maps NaN to 0.
    #[allow(clippy::cast_possible_truncation)]
    let v = value.floor() as i64;
    v
}

/// Ceil a coordinate into `i64`, saturating at the `i64` range.
#[inline]
#[must_use]
pub fn ceil_to_i64(value: f64) -> i64 {
    #[allow(clippy::cast_possible_truncation)]
    let v = value.ceil() as i64;
    v
}

/// Clamp a signed pixel coordinate into `[0, max_value]`.
#[inline]
#[must_use]
pub fn i64_to_clamped_usize(value: i64, max_value: usize) -> usize {
    if value <= 0 {
        return 0;
    }
    usize::try_from(value).map_or(max_value, |v| v.min(max_value))
}

/// Convert a `usize` to `u32`, failing on 64-bit overflow.
///
/// # Errors
/// Returns an error string if the value exceeds `u32::MAX`.
#[inline]
pub fn usize_to_u32(value: usize) -> Result<u32, String> {
    u32::try_from(value).map_err(|_| format!("Value {value} exceeds u32 maximum"))
}

/// Convert a `u32` TIFF field to `usize`.
///
/// # Errors
/// Returns an error string on targets where `usize` is narrower than `u32`.
#[inline]
pub fn u32_to_usize(value: u32) -> Result<usize, String> {
    usize::try_from(value).map_err(|_| format!("Value {value} exceeds usize maximum"))
}

/// Convert a `u64` file offset to `u32` for classic TIFF offsets.
///
/// # Errors
/// Returns an error string if the value exceeds `u32::MAX`.
#[inline]
pub fn u64_to_u32(value: u64) -> Result<u32, String> {
    u32::try_from(value)
        .map_err(|_| format!("File offset {value} exceeds the classic TIFF 4 GiB limit"))
}

/// Convert an `i32` EPSG code to `u16` for GeoKey storage.
///
/// # Errors
/// Returns an error string if the code does not fit a GeoKey value.
#[inline]
pub fn i32_to_u16(value: i32) -> Result<u16, String> {
    u16::try_from(value).map_err(|_| format!("Value {value} does not fit in a u16"))
}
