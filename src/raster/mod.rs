//! Raster store abstraction.
//!
//! The warper only needs windowed band reads and writes plus a few extent
//! queries. Anything that can answer those (a file, a tile server, an
//! in-memory grid) can be a source or destination.

pub mod geotiff;
pub mod memory;

pub use memory::MemRaster;

use crate::data_type::DataType;
use crate::geometry::Window;

/// Errors raised by raster stores.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("band {band} is out of range (raster has {count} bands)")]
    BandOutOfRange { band: usize, count: usize },

    #[error("window {window} lies outside the {width}x{height} raster")]
    WindowOutOfBounds {
        window: Window,
        width: usize,
        height: usize,
    },

    #[error("band {band} is read-only")]
    ReadOnly { band: usize },

    #[error("buffer holds {actual} bytes, window needs {expected}")]
    BufferSize { expected: usize, actual: usize },

    #[error("unsupported data type: {0}")]
    UnsupportedType(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TIFF error: {0}")]
    Tiff(String),

    #[error("store failure: {0}")]
    Other(String),
}

impl From<tiff::TiffError> for StoreError {
    fn from(e: tiff::TiffError) -> Self {
        Self::Tiff(e.to_string())
    }
}

/// Windowed access to a multi-band raster.
///
/// Band indices are 1-based. Buffers are packed row-major runs of
/// `window.area()` elements of the requested [`DataType`] in native
/// endianness; stores convert from their own band type as needed.
pub trait RasterStore {
    fn width(&self) -> usize;

    fn height(&self) -> usize;

    fn band_count(&self) -> usize;

    /// Native element type of a band, if the band exists.
    fn band_data_type(&self, band: usize) -> Option<DataType>;

    /// Whether a band accepts writes. Missing bands are not writable.
    fn is_band_writable(&self, band: usize) -> bool;

    /// Read `window` of `band` into `buf` as `data_type` elements.
    ///
    /// # Errors
    /// Fails if the band or window is out of range, the buffer size does not
    /// match, or the underlying storage fails.
    fn read(
        &self,
        band: usize,
        window: Window,
        data_type: DataType,
        buf: &mut [u8],
    ) -> Result<(), StoreError>;

    /// Write `buf`, holding `data_type` elements, into `window` of `band`.
    ///
    /// # Errors
    /// Fails if the band is read-only or out of range, the window or buffer
    /// size is wrong, or the underlying storage fails.
    fn write(
        &self,
        band: usize,
        window: Window,
        data_type: DataType,
        buf: &[u8],
    ) -> Result<(), StoreError>;
}

/// Common argument checks for store implementations.
///
/// # Errors
/// Returns the first violated precondition.
pub fn check_request(
    store: &dyn RasterStore,
    band: usize,
    window: Window,
    data_type: DataType,
    buf_len: usize,
) -> Result<(), StoreError> {
    let count = store.band_count();
    if band == 0 || band > count {
        return Err(StoreError::BandOutOfRange { band, count });
    }
    if !window.fits_within(store.width(), store.height()) {
        return Err(StoreError::WindowOutOfBounds {
            window,
            width: store.width(),
            height: store.height(),
        });
    }
    let expected = window.area() * data_type.size_bytes();
    if buf_len != expected {
        return Err(StoreError::BufferSize {
            expected,
            actual: buf_len,
        });
    }
    Ok(())
}
