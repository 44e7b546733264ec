//! The per-chunk task handed to the resampling kernel.
//!
//! A [`KernelTask`] owns its source band buffers and masks and borrows the
//! destination planes from the buffer owned by the region warper. The two
//! buffer types make that split visible: [`BandBuffer`] owns, [`BandViewMut`]
//! borrows.

use std::sync::Arc;

use crate::buffer::alloc_bytes;
use crate::data_type::DataType;
use crate::error::Result;
use crate::geometry::Window;
use crate::mask::{DensityMask, ValidityMask};
use crate::options::{ResampleAlg, WarpOptionList};
use crate::progress::Progress;
use crate::transformer::Transformer;

/// An owned plane of pixels for one band of a window.
#[derive(Debug, Clone, PartialEq)]
pub struct BandBuffer {
    data: Vec<u8>,
    data_type: DataType,
    width: usize,
    height: usize,
}

impl BandBuffer {
    /// Allocate a zeroed plane.
    ///
    /// # Errors
    /// Returns [`WarpError::Allocation`](crate::WarpError::Allocation) if
    /// the plane cannot be allocated.
    pub fn new(width: usize, height: usize, data_type: DataType) -> Result<Self> {
        let len = width
            .saturating_mul(height)
            .saturating_mul(data_type.size_bytes());
        Ok(Self {
            data: alloc_bytes(len, "source band buffer")?,
            data_type,
            width,
            height,
        })
    }

    #[must_use]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Bytes between the starts of consecutive rows.
    #[must_use]
    pub fn line_stride(&self) -> usize {
        self.width * self.data_type.size_bytes()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Value at `(x, y)` as a `(real, imag)` pair, or `None` outside the plane.
    #[must_use]
    pub fn pixel(&self, x: usize, y: usize) -> Option<(f64, f64)> {
        pixel_at(&self.data, self.data_type, self.width, self.height, x, y)
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// A borrowed plane of destination pixels.
#[derive(Debug)]
pub struct BandViewMut<'a> {
    data: &'a mut [u8],
    data_type: DataType,
    width: usize,
    height: usize,
}

impl<'a> BandViewMut<'a> {
    /// Wrap `data`, which must hold exactly `width * height` elements.
    ///
    /// # Errors
    /// Returns [`WarpError::Internal`](crate::WarpError::Internal) on a
    /// length mismatch.
    pub fn new(data: &'a mut [u8], data_type: DataType, width: usize, height: usize) -> Result<Self> {
        let expected = width * height * data_type.size_bytes();
        if data.len() != expected {
            return Err(crate::WarpError::internal(format!(
                "destination view holds {} bytes, window needs {expected}",
                data.len()
            )));
        }
        Ok(Self {
            data,
            data_type,
            width,
            height,
        })
    }

    #[must_use]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    #[must_use]
    pub fn line_stride(&self) -> usize {
        self.width * self.data_type.size_bytes()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &*self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut *self.data
    }

    #[must_use]
    pub fn pixel(&self, x: usize, y: usize) -> Option<(f64, f64)> {
        pixel_at(&*self.data, self.data_type, self.width, self.height, x, y)
    }

    /// Store `(real, imag)` at `(x, y)`. Returns false outside the plane.
    pub fn set_pixel(&mut self, x: usize, y: usize, real: f64, imag: f64) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let size = self.data_type.size_bytes();
        let at = (y * self.width + x) * size;
        self.data_type.encode(real, imag, &mut self.data[at..at + size]);
        true
    }
}

fn pixel_at(
    data: &[u8],
    data_type: DataType,
    width: usize,
    height: usize,
    x: usize,
    y: usize,
) -> Option<(f64, f64)> {
    if x >= width || y >= height {
        return None;
    }
    let size = data_type.size_bytes();
    let at = (y * width + x) * size;
    data.get(at..at + size).map(|bytes| data_type.decode(bytes))
}

/// Everything the kernel needs to warp one chunk.
pub struct KernelTask<'a> {
    pub resample_alg: ResampleAlg,
    pub working_data_type: DataType,
    pub transformer: Arc<dyn Transformer>,
    /// Bound to this chunk's slice of overall progress.
    pub progress: Progress,
    pub options: &'a WarpOptionList,

    pub src_window: Window,
    pub dst_window: Window,

    pub src_bands: Vec<BandBuffer>,
    pub dst_bands: Vec<BandViewMut<'a>>,

    /// Per-band source validity, created lazily by
    /// [`ensure_mask`](crate::mask::ensure_mask).
    pub band_src_valid: Option<Vec<Option<ValidityMask>>>,
    pub unified_src_valid: Option<ValidityMask>,
    pub unified_src_density: Option<DensityMask>,
    pub dst_valid: Option<ValidityMask>,
    pub dst_density: Option<DensityMask>,
}

impl std::fmt::Debug for KernelTask<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelTask")
            .field("resample_alg", &self.resample_alg)
            .field("working_data_type", &self.working_data_type)
            .field("src_window", &self.src_window)
            .field("dst_window", &self.dst_window)
            .field("bands", &self.src_bands.len())
            .field("progress", &self.progress)
            .finish_non_exhaustive()
    }
}

impl<'a> KernelTask<'a> {
    /// A task with no bands and no masks.
    #[must_use]
    pub fn new(
        resample_alg: ResampleAlg,
        working_data_type: DataType,
        transformer: Arc<dyn Transformer>,
        progress: Progress,
        options: &'a WarpOptionList,
        src_window: Window,
        dst_window: Window,
    ) -> Self {
        Self {
            resample_alg,
            working_data_type,
            transformer,
            progress,
            options,
            src_window,
            dst_window,
            src_bands: Vec::new(),
            dst_bands: Vec::new(),
            band_src_valid: None,
            unified_src_valid: None,
            unified_src_density: None,
            dst_valid: None,
            dst_density: None,
        }
    }

    #[must_use]
    pub fn band_count(&self) -> usize {
        self.src_bands.len()
    }

    /// Source validity for band `index` (0-based), if it was created.
    #[must_use]
    pub fn band_src_validity(&self, index: usize) -> Option<&ValidityMask> {
        self.band_src_valid.as_ref()?.get(index)?.as_ref()
    }
}

/// The resampling step, invoked once per leaf chunk.
///
/// Implementations read `task.src_bands` and masks and write into
/// `task.dst_bands`. Whatever they leave in the destination views is written
/// back to the destination store when they return `Ok`.
pub trait WarpKernel {
    /// # Errors
    /// Any error aborts the chunk and the whole warp.
    fn perform_warp(&self, task: &mut KernelTask<'_>) -> Result<()>;
}

impl<F> WarpKernel for F
where
    F: Fn(&mut KernelTask<'_>) -> Result<()>,
{
    fn perform_warp(&self, task: &mut KernelTask<'_>) -> Result<()> {
        self(task)
    }
}
