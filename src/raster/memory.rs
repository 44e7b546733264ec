//! In-memory raster store.

use std::sync::RwLock;

use super::{check_request, RasterStore, StoreError};
use crate::data_type::DataType;
use crate::geometry::{GeoReference, Window};

struct MemBand {
    data_type: DataType,
    writable: bool,
    data: RwLock<Vec<u8>>,
}

/// A multi-band raster held entirely in memory.
///
/// Each band keeps its own element type; reads and writes convert to and
/// from the caller's working type.
pub struct MemRaster {
    width: usize,
    height: usize,
    bands: Vec<MemBand>,
    georef: Option<GeoReference>,
}

impl std::fmt::Debug for MemRaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemRaster")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bands", &self.bands.len())
            .field("georef", &self.georef)
            .finish()
    }
}

impl MemRaster {
    /// Create a zero-filled raster with `band_count` bands of `data_type`.
    #[must_use]
    pub fn new(width: usize, height: usize, band_count: usize, data_type: DataType) -> Self {
        let plane = width * height * data_type.size_bytes();
        let bands = (0..band_count)
            .map(|_| MemBand {
                data_type,
                writable: true,
                data: RwLock::new(vec![0; plane]),
            })
            .collect();

        Self {
            width,
            height,
            bands,
            georef: None,
        }
    }

    /// Create a raster from packed band planes of `data_type`.
    ///
    /// # Errors
    /// Returns [`StoreError::BufferSize`] if a plane does not hold exactly
    /// `width * height` elements.
    pub fn from_bands(
        width: usize,
        height: usize,
        data_type: DataType,
        planes: Vec<Vec<u8>>,
    ) -> Result<Self, StoreError> {
        let expected = width * height * data_type.size_bytes();
        let mut bands = Vec::with_capacity(planes.len());
        for plane in planes {
            if plane.len() != expected {
                return Err(StoreError::BufferSize {
                    expected,
                    actual: plane.len(),
                });
            }
            bands.push(MemBand {
                data_type,
                writable: true,
                data: RwLock::new(plane),
            });
        }

        Ok(Self {
            width,
            height,
            bands,
            georef: None,
        })
    }

    /// Attach georeferencing.
    #[must_use]
    pub fn with_georef(mut self, georef: GeoReference) -> Self {
        self.georef = Some(georef);
        self
    }

    /// Mark a band (1-based) as read-only. Out-of-range bands are ignored.
    #[must_use]
    pub fn with_read_only(mut self, band: usize) -> Self {
        if let Some(b) = band.checked_sub(1).and_then(|i| self.bands.get_mut(i)) {
            b.writable = false;
        }
        self
    }

    #[must_use]
    pub fn georef(&self) -> Option<&GeoReference> {
        self.georef.as_ref()
    }

    /// Copy of a band's packed plane in its native type.
    ///
    /// # Errors
    /// Fails if the band is out of range.
    pub fn band_bytes(&self, band: usize) -> Result<Vec<u8>, StoreError> {
        let b = self.band(band)?;
        let data = b
            .data
            .read()
            .map_err(|_| StoreError::Other(format!("band {band} lock poisoned")))?;
        Ok(data.clone())
    }

    fn band(&self, band: usize) -> Result<&MemBand, StoreError> {
        band.checked_sub(1)
            .and_then(|i| self.bands.get(i))
            .ok_or(StoreError::BandOutOfRange {
                band,
                count: self.bands.len(),
            })
    }
}

impl RasterStore for MemRaster {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn band_count(&self) -> usize {
        self.bands.len()
    }

    fn band_data_type(&self, band: usize) -> Option<DataType> {
        self.band(band).ok().map(|b| b.data_type)
    }

    fn is_band_writable(&self, band: usize) -> bool {
        self.band(band).is_ok_and(|b| b.writable)
    }

    fn read(
        &self,
        band: usize,
        window: Window,
        data_type: DataType,
        buf: &mut [u8],
    ) -> Result<(), StoreError> {
        check_request(self, band, window, data_type, buf.len())?;
        let b = self.band(band)?;
        let data = b
            .data
            .read()
            .map_err(|_| StoreError::Other(format!("band {band} lock poisoned")))?;

        let src_word = b.data_type.size_bytes();
        let dst_row = window.x_size * data_type.size_bytes();
        if dst_row == 0 {
            return Ok(());
        }
        for (row, out) in buf.chunks_exact_mut(dst_row).enumerate() {
            let start = ((window.y_off + row) * self.width + window.x_off) * src_word;
            let end = start + window.x_size * src_word;
            DataType::convert(&data[start..end], b.data_type, out, data_type);
        }
        Ok(())
    }

    fn write(
        &self,
        band: usize,
        window: Window,
        data_type: DataType,
        buf: &[u8],
    ) -> Result<(), StoreError> {
        check_request(self, band, window, data_type, buf.len())?;
        let b = self.band(band)?;
        if !b.writable {
            return Err(StoreError::ReadOnly { band });
        }
        let mut data = b
            .data
            .write()
            .map_err(|_| StoreError::Other(format!("band {band} lock poisoned")))?;

        let dst_word = b.data_type.size_bytes();
        let src_row = window.x_size * data_type.size_bytes();
        if src_row == 0 {
            return Ok(());
        }
        for (row, input) in buf.chunks_exact(src_row).enumerate() {
            let start = ((window.y_off + row) * self.width + window.x_off) * dst_word;
            let end = start + window.x_size * dst_word;
            DataType::convert(input, data_type, &mut data[start..end], b.data_type);
        }
        Ok(())
    }
}
