//! Pixel-space geometry: points, integer windows and north-up geotransforms.

pub mod projection;

/// A point handed to a [`Transformer`](crate::Transformer).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }
}

/// An axis-aligned rectangle of whole pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Window {
    pub x_off: usize,
    pub y_off: usize,
    pub x_size: usize,
    pub y_size: usize,
}

impl Window {
    #[must_use]
    pub const fn new(x_off: usize, y_off: usize, x_size: usize, y_size: usize) -> Self {
        Self {
            x_off,
            y_off,
            x_size,
            y_size,
        }
    }

    /// Window covering a whole `width` x `height` raster.
    #[must_use]
    pub const fn full(width: usize, height: usize) -> Self {
        Self::new(0, 0, width, height)
    }

    #[must_use]
    pub const fn area(&self) -> usize {
        self.x_size * self.y_size
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.x_size == 0 || self.y_size == 0
    }

    /// Whether the window lies inside a `width` x `height` raster.
    #[must_use]
    pub fn fits_within(&self, width: usize, height: usize) -> bool {
        self.x_off
            .checked_add(self.x_size)
            .is_some_and(|right| right <= width)
            && self
                .y_off
                .checked_add(self.y_size)
                .is_some_and(|bottom| bottom <= height)
    }

    /// Split across the longer dimension into `floor(n/2)` and the rest.
    ///
    /// Ties split along Y.
    #[must_use]
    pub fn bisect(&self) -> (Window, Window) {
        if self.x_size > self.y_size {
            let first = self.x_size / 2;
            (
                Window::new(self.x_off, self.y_off, first, self.y_size),
                Window::new(self.x_off + first, self.y_off, self.x_size - first, self.y_size),
            )
        } else {
            let first = self.y_size / 2;
            (
                Window::new(self.x_off, self.y_off, self.x_size, first),
                Window::new(self.x_off, self.y_off + first, self.x_size, self.y_size - first),
            )
        }
    }
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{}+{}+{}",
            self.x_size, self.y_size, self.x_off, self.y_off
        )
    }
}

/// North-up affine mapping between pixel/line and world coordinates.
///
/// Pixel `(0, 0)` is the top-left corner of the top-left pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    /// World units per pixel along X (positive).
    pub pixel_width: f64,
    /// World units per pixel along Y (positive, Y decreases downwards).
    pub pixel_height: f64,
}

impl GeoTransform {
    #[must_use]
    pub const fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    #[inline]
    #[must_use]
    pub fn pixel_to_world(&self, px: f64, py: f64) -> (f64, f64) {
        (
            self.origin_x + px * self.pixel_width,
            self.origin_y - py * self.pixel_height,
        )
    }

    #[inline]
    #[must_use]
    pub fn world_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_width,
            (self.origin_y - y) / self.pixel_height,
        )
    }

    /// Whether the transform can be inverted.
    #[must_use]
    pub fn is_invertible(&self) -> bool {
        self.pixel_width.is_finite()
            && self.pixel_height.is_finite()
            && self.pixel_width != 0.0
            && self.pixel_height != 0.0
    }
}

/// Georeferencing of a raster: pixel grid plus EPSG code.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoReference {
    pub geo_transform: GeoTransform,
    pub epsg: i32,
}

impl GeoReference {
    #[must_use]
    pub const fn new(geo_transform: GeoTransform, epsg: i32) -> Self {
        Self { geo_transform, epsg }
    }
}
