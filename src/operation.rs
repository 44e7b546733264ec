//! The warp session object.
//!
//! A [`WarpOperation`] holds one validated configuration and a kernel. The
//! top-level [`WarpOperation::chunk_and_warp_image`] plans chunks under the
//! memory limit and warps each one in turn:
//!
//! 1. allocate the destination chunk buffer
//! 2. pre-fill it (`INIT_DEST`) or read the current destination pixels
//! 3. read the source bands, build masks, run the kernel
//! 4. write the buffer back band by band
//!
//! Every buffer is owned by the scope that allocated it and is released on
//! every exit path.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::buffer::alloc_bytes;
use crate::chunking::{Chunk, ChunkPlanner, MemoryCost};
use crate::data_type::DataType;
use crate::error::{Result, WarpError};
use crate::geometry::Window;
use crate::kernel::{BandBuffer, BandViewMut, KernelTask, WarpKernel};
use crate::mask::{apply_nodata_mask, ensure_mask, MaskContext, MaskKind, ValidityMask};
use crate::options::{ValidatedOptions, WarpOptions};
use crate::progress::{Progress, ProgressWindow};
use crate::raster::StoreError;
use crate::source_window;

/// A configured warp between one source and one destination raster.
pub struct WarpOperation {
    config: Option<ValidatedOptions>,
    kernel: Arc<dyn WarpKernel>,
}

impl std::fmt::Debug for WarpOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarpOperation")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl WarpOperation {
    /// An operation with no configuration yet.
    #[must_use]
    pub fn new(kernel: Arc<dyn WarpKernel>) -> Self {
        Self {
            config: None,
            kernel,
        }
    }

    /// Validate and take a copy of `options`.
    ///
    /// Any previous configuration is dropped first. On failure the operation
    /// is left without a configuration.
    ///
    /// # Errors
    /// [`WarpError::Config`] listing every invalid setting.
    pub fn initialize(&mut self, options: &WarpOptions) -> Result<()> {
        self.config = None;
        let config = options.validated()?;
        info!(
            bands = config.band_count(),
            working_data_type = %config.working_data_type(),
            memory_limit = config.memory_limit(),
            resample_alg = ?config.resample_alg(),
            "warp operation initialized"
        );
        self.config = Some(config);
        Ok(())
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.config.is_some()
    }

    /// The active configuration, after defaults were applied.
    #[must_use]
    pub fn options(&self) -> Option<&WarpOptions> {
        self.config.as_ref().map(ValidatedOptions::options)
    }

    fn config(&self) -> Result<&ValidatedOptions> {
        self.config
            .as_ref()
            .ok_or_else(|| WarpError::config("warp operation is not initialized"))
    }

    /// Source window needed to warp `dst`.
    ///
    /// # Errors
    /// [`WarpError::Transform`] when too few perimeter points map.
    pub fn compute_source_window(&self, dst: Window) -> Result<Window> {
        let config = self.config()?;
        source_window::compute_source_window(
            dst,
            config.transformer.as_ref(),
            config.resample_alg(),
            config.src.width(),
            config.src.height(),
        )
    }

    fn planner(
        &self,
        dst: Window,
    ) -> Result<ChunkPlanner<impl FnMut(Window) -> Result<Window> + '_>> {
        let config = self.config()?;
        check_destination_window(config, dst)?;
        let cost = MemoryCost::from_options(config.options(), config.working_data_type());
        Ok(ChunkPlanner::new(
            dst,
            ProgressWindow::FULL,
            cost,
            config.memory_limit(),
            move |window| self.compute_source_window(window),
        ))
    }

    /// The leaf chunks `dst` would be warped in, without warping.
    ///
    /// # Errors
    /// Fails like [`WarpOperation::chunk_and_warp_image`] would while planning.
    pub fn plan_chunks(&self, dst: Window) -> Result<Vec<Chunk>> {
        self.planner(dst)?.collect()
    }

    /// Warp `dst` of the destination raster, splitting it as needed to stay
    /// within the memory limit.
    ///
    /// Stops at the first failing chunk. Chunks already written stay written.
    ///
    /// # Errors
    /// The first error from planning, I/O, the kernel, or cancellation.
    pub fn chunk_and_warp_image(&self, dst: Window) -> Result<()> {
        let config = self.config()?;
        let planner = self.planner(dst)?;

        Progress::new(Arc::clone(&config.progress), ProgressWindow::FULL).report(0.0)?;

        let mut chunks = 0usize;
        for chunk in planner {
            let chunk = chunk?;
            self.warp_chunk(config, chunk.dst, Some(chunk.src), chunk.progress)?;
            chunks += 1;
        }

        info!(dst = %dst, chunks, "warp complete");
        Ok(())
    }

    /// Warp `dst` in one piece, ignoring the memory limit.
    ///
    /// `src` skips the source window estimate when the caller already has it.
    ///
    /// # Errors
    /// Allocation, I/O, transform and kernel errors, or cancellation.
    pub fn warp_region(&self, dst: Window, src: Option<Window>) -> Result<()> {
        let config = self.config()?;
        check_destination_window(config, dst)?;
        self.warp_chunk(config, dst, src, ProgressWindow::FULL)
    }

    /// Warp `dst` into a caller-owned buffer without touching the
    /// destination raster.
    ///
    /// `buffer` holds one plane per band in the working data type, band after
    /// band. Its existing content is what the kernel composites onto.
    ///
    /// # Errors
    /// [`WarpError::Internal`] if `buffer` has the wrong size, otherwise as
    /// [`WarpOperation::warp_region`].
    pub fn warp_region_to_buffer(
        &self,
        dst: Window,
        buffer: &mut [u8],
        src: Option<Window>,
    ) -> Result<()> {
        let config = self.config()?;
        self.compose(config, dst, buffer, src, ProgressWindow::FULL)
    }

    fn warp_chunk(
        &self,
        config: &ValidatedOptions,
        dst: Window,
        src: Option<Window>,
        progress: ProgressWindow,
    ) -> Result<()> {
        let working = config.working_data_type();
        let dst_bands = &config.options().dst_bands;
        let plane = plane_bytes(config, dst)?;
        let total = plane
            .checked_mul(dst_bands.len())
            .ok_or_else(|| WarpError::allocation(usize::MAX, "destination buffer"))?;

        let mut buffer = alloc_bytes(total, "destination buffer")?;

        if config.init_dest.is_some() {
            for (i, band) in planes_mut(&mut buffer, plane, dst_bands.len()).enumerate() {
                if let Some((real, imag)) = config.init_value(i) {
                    // Byte fills truncate toward zero before clamping.
                    let real = if working == DataType::Byte { real.trunc() } else { real };
                    working.fill(band, real, imag);
                }
            }
        } else {
            for (band, data) in dst_bands
                .iter()
                .zip(planes_mut(&mut buffer, plane, dst_bands.len()))
            {
                config.dst.read(*band, dst, working, data)?;
            }
        }

        self.compose(config, dst, &mut buffer, src, progress)?;

        for (i, band) in dst_bands.iter().enumerate() {
            let data = &buffer[i * plane..(i + 1) * plane];
            if let Err(e) = config.dst.write(*band, dst, working, data) {
                warn!(
                    band,
                    bands_written = i,
                    dst = %dst,
                    "destination write failed, earlier bands of this chunk stay written"
                );
                return Err(e.into());
            }
        }

        Progress::new(Arc::clone(&config.progress), progress).report(1.0)
    }

    fn compose(
        &self,
        config: &ValidatedOptions,
        dst: Window,
        buffer: &mut [u8],
        src: Option<Window>,
        progress: ProgressWindow,
    ) -> Result<()> {
        let working = config.working_data_type();
        let options = config.options();
        let band_count = config.band_count();
        let plane = plane_bytes(config, dst)?;
        if Some(buffer.len()) != plane.checked_mul(band_count) {
            return Err(WarpError::internal(format!(
                "destination buffer holds {} bytes, {band_count} bands of {dst} need {}",
                buffer.len(),
                plane.saturating_mul(band_count)
            )));
        }

        let src = match src {
            Some(src) => src,
            None => self.compute_source_window(dst)?,
        };

        let mut task = KernelTask::new(
            config.resample_alg(),
            working,
            Arc::clone(&config.transformer),
            Progress::new(Arc::clone(&config.progress), progress),
            &options.warp_options,
            src,
            dst,
        );

        for &band in &options.src_bands {
            let mut data = BandBuffer::new(src.x_size, src.y_size, working)?;
            config.src.read(band, src, working, data.as_bytes_mut())?;
            task.src_bands.push(data);
        }

        for data in planes_mut(buffer, plane, band_count) {
            task.dst_bands
                .push(BandViewMut::new(data, working, dst.x_size, dst.y_size)?);
        }

        if let (Some(real), Some(imag)) = (&options.src_nodata_real, &options.src_nodata_imag) {
            for (i, nodata) in real.iter().copied().zip(imag.iter().copied()).enumerate() {
                ensure_mask(&mut task, Some(i), MaskKind::BandSrcValid)?;
                let mask = band_mask(&mut task.band_src_valid, i)?;
                let cleared = apply_nodata_mask(task.src_bands[i].as_bytes(), working, nodata, mask);
                debug!(band = i + 1, cleared, "applied source nodata");
            }
        }

        build_generated_masks(config, &mut task)?;

        debug!(dst = %dst, src = %src, bands = band_count, "running warp kernel");
        self.kernel.perform_warp(&mut task)
    }
}

fn check_destination_window(config: &ValidatedOptions, dst: Window) -> Result<()> {
    let (width, height) = (config.dst.width(), config.dst.height());
    if dst.fits_within(width, height) {
        Ok(())
    } else {
        Err(StoreError::WindowOutOfBounds {
            window: dst,
            width,
            height,
        }
        .into())
    }
}

fn plane_bytes(config: &ValidatedOptions, dst: Window) -> Result<usize> {
    dst.area()
        .checked_mul(config.working_data_type().size_bytes())
        .ok_or_else(|| WarpError::allocation(usize::MAX, "destination buffer"))
}

/// Consecutive `plane`-byte slices of `buffer`. Works for empty planes.
fn planes_mut(buffer: &mut [u8], plane: usize, count: usize) -> impl Iterator<Item = &mut [u8]> {
    let mut rest = buffer;
    (0..count).map(move |_| {
        let (head, tail) = std::mem::take(&mut rest).split_at_mut(plane);
        rest = tail;
        head
    })
}

fn band_mask(
    slots: &mut Option<Vec<Option<ValidityMask>>>,
    index: usize,
) -> Result<&mut ValidityMask> {
    slots
        .as_mut()
        .and_then(|masks| masks.get_mut(index))
        .and_then(Option::as_mut)
        .ok_or_else(|| WarpError::internal(format!("source validity mask {index} is missing")))
}

/// Run the configured mask generators after nodata masking.
fn build_generated_masks(config: &ValidatedOptions, task: &mut KernelTask<'_>) -> Result<()> {
    let options = config.options();
    let working = task.working_data_type;
    let (src, dst) = (task.src_window, task.dst_window);

    if let Some(funcs) = &options.src_per_band_validity_mask {
        for (i, func) in funcs.iter().enumerate() {
            ensure_mask(task, Some(i), MaskKind::BandSrcValid)?;
            let planes = [task.src_bands[i].as_bytes()];
            let ctx = MaskContext {
                data_type: working,
                window: src,
                bands: &planes,
            };
            func.generate(&ctx, band_mask(&mut task.band_src_valid, i)?)?;
        }
    }

    if let Some(func) = &options.src_validity_mask {
        ensure_mask(task, None, MaskKind::UnifiedSrcValid)?;
        let planes: Vec<&[u8]> = task.src_bands.iter().map(BandBuffer::as_bytes).collect();
        let ctx = MaskContext {
            data_type: working,
            window: src,
            bands: &planes,
        };
        let mask = task
            .unified_src_valid
            .as_mut()
            .ok_or_else(|| WarpError::internal("unified source validity mask is missing"))?;
        func.generate(&ctx, mask)?;
    }

    if let Some(func) = &options.src_density_mask {
        ensure_mask(task, None, MaskKind::UnifiedSrcDensity)?;
        let planes: Vec<&[u8]> = task.src_bands.iter().map(BandBuffer::as_bytes).collect();
        let ctx = MaskContext {
            data_type: working,
            window: src,
            bands: &planes,
        };
        let mask = task
            .unified_src_density
            .as_mut()
            .ok_or_else(|| WarpError::internal("unified source density mask is missing"))?;
        func.generate(&ctx, mask)?;
    }

    if let Some(func) = &options.dst_validity_mask {
        ensure_mask(task, None, MaskKind::DstValid)?;
        let planes: Vec<&[u8]> = task.dst_bands.iter().map(BandViewMut::as_bytes).collect();
        let ctx = MaskContext {
            data_type: working,
            window: dst,
            bands: &planes,
        };
        let mask = task
            .dst_valid
            .as_mut()
            .ok_or_else(|| WarpError::internal("destination validity mask is missing"))?;
        func.generate(&ctx, mask)?;
    }

    if let Some(func) = &options.dst_density_mask {
        ensure_mask(task, None, MaskKind::DstDensity)?;
        let planes: Vec<&[u8]> = task.dst_bands.iter().map(BandViewMut::as_bytes).collect();
        let ctx = MaskContext {
            data_type: working,
            window: dst,
            bands: &planes,
        };
        let mask = task
            .dst_density
            .as_mut()
            .ok_or_else(|| WarpError::internal("destination density mask is missing"))?;
        func.generate(&ctx, mask)?;
    }

    Ok(())
}
