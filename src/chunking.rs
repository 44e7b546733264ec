//! Split a destination window into chunks that fit the memory budget.
//!
//! [`ChunkPlanner`] walks the split tree with an explicit stack instead of
//! recursion. Each chunk carries its own [`ProgressWindow`]; halving a chunk
//! halves its window, so the leaves of any tree cover `[0, 1]` exactly.

use tracing::debug;

use crate::data_type::DataType;
use crate::error::Result;
use crate::geometry::Window;
use crate::options::WarpOptions;
use crate::progress::ProgressWindow;

/// Bits per pixel held in memory while warping one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryCost {
    pub src_bits_per_pixel: usize,
    pub dst_bits_per_pixel: usize,
}

impl MemoryCost {
    /// Cost of the band buffers and masks these options will create.
    #[must_use]
    pub fn from_options(options: &WarpOptions, working_data_type: DataType) -> Self {
        let bands = options.band_count();
        let band_bits = working_data_type.size_bits() * bands;

        let mut src = band_bits;
        if options.src_density_mask.is_some() {
            src += 32;
        }
        if options.src_per_band_validity_mask.is_some() || options.src_nodata_real.is_some() {
            src += bands;
        }
        if options.src_validity_mask.is_some() {
            src += 1;
        }

        let mut dst = band_bits;
        if options.dst_density_mask.is_some() {
            dst += 32;
        }
        if options.dst_nodata_real.is_some() || options.dst_validity_mask.is_some() {
            dst += bands;
        }

        Self {
            src_bits_per_pixel: src,
            dst_bits_per_pixel: dst,
        }
    }

    /// Estimated bytes to warp `dst` from `src`.
    #[must_use]
    pub fn estimate(&self, src: Window, dst: Window) -> f64 {
        (self.src_bits_per_pixel as f64 * src.area() as f64
            + self.dst_bits_per_pixel as f64 * dst.area() as f64)
            / 8.0
    }
}

/// One leaf of the split tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chunk {
    pub dst: Window,
    pub src: Window,
    pub progress: ProgressWindow,
}

/// Whether a window can still be split.
#[must_use]
pub fn is_splittable(dst: Window) -> bool {
    dst.x_size > 2 || dst.y_size > 2
}

/// Yields the leaf chunks of a destination window, low to high along each
/// split axis.
///
/// `estimate_source` maps a destination window to its source window. Each
/// window's source is estimated once; leaves carry it so the warp does not
/// repeat the estimate. After the first error the iterator is exhausted.
pub struct ChunkPlanner<F> {
    stack: Vec<(Window, ProgressWindow)>,
    estimate_source: F,
    cost: MemoryCost,
    memory_limit: f64,
}

impl<F> ChunkPlanner<F>
where
    F: FnMut(Window) -> Result<Window>,
{
    #[must_use]
    pub fn new(
        dst: Window,
        progress: ProgressWindow,
        cost: MemoryCost,
        memory_limit: usize,
        estimate_source: F,
    ) -> Self {
        Self {
            stack: vec![(dst, progress)],
            estimate_source,
            cost,
            memory_limit: memory_limit as f64,
        }
    }
}

impl<F> Iterator for ChunkPlanner<F>
where
    F: FnMut(Window) -> Result<Window>,
{
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((dst, progress)) = self.stack.pop() {
            let src = match (self.estimate_source)(dst) {
                Ok(src) => src,
                Err(e) => {
                    self.stack.clear();
                    return Some(Err(e));
                }
            };

            let bytes = self.cost.estimate(src, dst);
            if bytes > self.memory_limit && is_splittable(dst) {
                let (first, second) = dst.bisect();
                let (first_progress, second_progress) = progress.split();
                debug!(
                    dst = %dst,
                    estimated_bytes = bytes,
                    first = %first,
                    second = %second,
                    "splitting chunk"
                );
                self.stack.push((second, second_progress));
                self.stack.push((first, first_progress));
                continue;
            }

            return Some(Ok(Chunk { dst, src, progress }));
        }
        None
    }
}
