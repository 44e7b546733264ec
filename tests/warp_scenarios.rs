//! End-to-end warps through `WarpOperation` with in-memory rasters.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use rasterwarp::{
    DataType, DensityMask, DensityMaskFunc, FnTransformer, GenImgProjTransformer, GeoReference,
    GeoTransform, KernelTask, MaskContext, MemRaster, Point, RasterStore, ResampleAlg,
    StoreError, TransformDirection, Transformer, ValidityMask, ValidityMaskFunc, WarpError,
    WarpKernel, WarpOperation, WarpOptions, Window, INIT_DEST,
};
use tracing_subscriber::EnvFilter;

/// Route crate logs to the test output; filter with `RUST_LOG`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Test doubles
// ============================================================================

/// Nearest-neighbour resampling that honours source validity masks.
struct NearestKernel;

impl WarpKernel for NearestKernel {
    fn perform_warp(&self, task: &mut KernelTask<'_>) -> rasterwarp::Result<()> {
        let dst = task.dst_window;
        let src = task.src_window;

        let mut points = Vec::with_capacity(dst.area());
        for y in 0..dst.y_size {
            for x in 0..dst.x_size {
                points.push(Point::new(
                    (dst.x_off + x) as f64 + 0.5,
                    (dst.y_off + y) as f64 + 0.5,
                ));
            }
        }
        let mut success = vec![false; points.len()];
        task.transformer
            .transform(TransformDirection::DstToSrc, &mut points, &mut success)
            .map_err(WarpError::transform)?;

        for (i, point) in points.iter().enumerate() {
            if !success[i] {
                continue;
            }
            let sx = point.x.floor() - src.x_off as f64;
            let sy = point.y.floor() - src.y_off as f64;
            if sx < 0.0 || sy < 0.0 {
                continue;
            }
            let (sx, sy) = (sx as usize, sy as usize);
            if sx >= src.x_size || sy >= src.y_size {
                continue;
            }
            let si = sy * src.x_size + sx;
            if task.unified_src_valid.as_ref().is_some_and(|m| !m.is_valid(si)) {
                continue;
            }
            for band in 0..task.band_count() {
                if task.band_src_validity(band).is_some_and(|m| !m.is_valid(si)) {
                    continue;
                }
                if let Some((re, im)) = task.src_bands[band].pixel(sx, sy) {
                    task.dst_bands[band].set_pixel(i % dst.x_size, i / dst.x_size, re, im);
                }
            }
        }
        Ok(())
    }
}

/// Counts kernel calls and leaves the destination buffer alone.
#[derive(Default)]
struct CountingKernel {
    calls: Rc<Cell<usize>>,
}

impl WarpKernel for CountingKernel {
    fn perform_warp(&self, _task: &mut KernelTask<'_>) -> rasterwarp::Result<()> {
        self.calls.set(self.calls.get() + 1);
        Ok(())
    }
}

/// What the kernel found in each mask slot: (slot, sized to its window, default fill).
type MaskLog = Rc<RefCell<Vec<(&'static str, bool, bool)>>>;

/// Records the shape and content of the unified and destination masks.
struct MaskRecorder {
    seen: MaskLog,
}

impl WarpKernel for MaskRecorder {
    fn perform_warp(&self, task: &mut KernelTask<'_>) -> rasterwarp::Result<()> {
        let (src, dst) = (task.src_window.area(), task.dst_window.area());
        let mut seen = self.seen.borrow_mut();
        if let Some(m) = &task.unified_src_valid {
            seen.push(("unified_src_valid", m.len() == src, m.count_valid() == src));
        }
        if let Some(m) = &task.unified_src_density {
            let zeroed = m.values().iter().all(|&v| v == 0.0);
            seen.push(("unified_src_density", m.len() == src, zeroed));
        }
        if let Some(m) = &task.dst_valid {
            seen.push(("dst_valid", m.len() == dst, m.count_valid() == dst));
        }
        if let Some(m) = &task.dst_density {
            let zeroed = m.values().iter().all(|&v| v == 0.0);
            seen.push(("dst_density", m.len() == dst, zeroed));
        }
        Ok(())
    }
}

/// A store that logs every access and can fail reads or writes of one band.
struct RecordingStore {
    inner: MemRaster,
    reads: RefCell<Vec<(usize, Window)>>,
    writes: RefCell<Vec<(usize, Window)>>,
    fail_read_band: Option<usize>,
    fail_write_band: Option<usize>,
}

impl RecordingStore {
    fn new(inner: MemRaster) -> Self {
        Self {
            inner,
            reads: RefCell::new(Vec::new()),
            writes: RefCell::new(Vec::new()),
            fail_read_band: None,
            fail_write_band: None,
        }
    }

    fn failing_reads_from(mut self, band: usize) -> Self {
        self.fail_read_band = Some(band);
        self
    }

    fn failing_writes_to(mut self, band: usize) -> Self {
        self.fail_write_band = Some(band);
        self
    }
}

impl RasterStore for RecordingStore {
    fn width(&self) -> usize {
        self.inner.width()
    }

    fn height(&self) -> usize {
        self.inner.height()
    }

    fn band_count(&self) -> usize {
        self.inner.band_count()
    }

    fn band_data_type(&self, band: usize) -> Option<DataType> {
        self.inner.band_data_type(band)
    }

    fn is_band_writable(&self, band: usize) -> bool {
        self.inner.is_band_writable(band)
    }

    fn read(
        &self,
        band: usize,
        window: Window,
        data_type: DataType,
        buf: &mut [u8],
    ) -> Result<(), StoreError> {
        if self.fail_read_band == Some(band) {
            return Err(StoreError::Other(format!("checksum mismatch reading band {band}")));
        }
        self.reads.borrow_mut().push((band, window));
        self.inner.read(band, window, data_type, buf)
    }

    fn write(
        &self,
        band: usize,
        window: Window,
        data_type: DataType,
        buf: &[u8],
    ) -> Result<(), StoreError> {
        if self.fail_write_band == Some(band) {
            return Err(StoreError::Other(format!("disk full writing band {band}")));
        }
        self.writes.borrow_mut().push((band, window));
        self.inner.write(band, window, data_type, buf)
    }
}

/// Identity mapping that fails the first `fail_first` points of every batch.
struct FlakyIdentity {
    fail_first: usize,
    calls: Cell<usize>,
}

impl Transformer for FlakyIdentity {
    fn transform(
        &self,
        _direction: TransformDirection,
        _points: &mut [Point],
        success: &mut [bool],
    ) -> Result<(), String> {
        self.calls.set(self.calls.get() + 1);
        for (i, ok) in success.iter_mut().enumerate() {
            *ok = i >= self.fail_first;
        }
        Ok(())
    }
}

/// Per-band validity generator that invalidates the last pixel.
fn invalidate_last_pixel(ctx: &MaskContext<'_>, mask: &mut ValidityMask) -> rasterwarp::Result<()> {
    assert_eq!(ctx.bands.len(), 1);
    mask.set_valid(ctx.window.area() - 1, false);
    Ok(())
}

fn keep_validity(ctx: &MaskContext<'_>, _mask: &mut ValidityMask) -> rasterwarp::Result<()> {
    assert_eq!(ctx.bands.len(), 2);
    Ok(())
}

fn keep_density(ctx: &MaskContext<'_>, _mask: &mut DensityMask) -> rasterwarp::Result<()> {
    assert_eq!(ctx.bands.len(), 2);
    Ok(())
}

fn identity() -> Arc<dyn Transformer> {
    Arc::new(FnTransformer::new(|_, p: Point| Some(p)))
}

fn byte_ramp(width: usize, height: usize) -> Vec<u8> {
    (0..width * height).map(|i| (i % 256) as u8).collect()
}

/// Options whose per-chunk cost exceeds the minimum memory limit for any
/// window larger than 4x4: 100 bands of 128-bit complex in and out.
fn heavy_options(width: usize, height: usize) -> WarpOptions {
    let src: Arc<dyn RasterStore> = Arc::new(MemRaster::new(width, height, 100, DataType::CFloat64));
    let dst: Arc<dyn RasterStore> = Arc::new(MemRaster::new(width, height, 100, DataType::CFloat64));
    WarpOptions::new()
        .with_source(src)
        .with_destination(dst)
        .with_transformer(identity())
        .with_memory_limit(100_000)
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_identity_warp_single_chunk() {
    let input = byte_ramp(4, 4);
    let src = Arc::new(MemRaster::from_bands(4, 4, DataType::Byte, vec![input.clone()]).unwrap());
    let dst = Arc::new(MemRaster::new(4, 4, 1, DataType::Byte));

    let options = WarpOptions::new()
        .with_source(src)
        .with_destination(dst.clone())
        .with_transformer(identity())
        .with_resample_alg(ResampleAlg::NearestNeighbour)
        .with_memory_limit(64 * 1024 * 1024);

    let mut op = WarpOperation::new(Arc::new(NearestKernel));
    op.initialize(&options).unwrap();

    let window = Window::full(4, 4);
    assert_eq!(op.plan_chunks(window).unwrap().len(), 1);
    op.chunk_and_warp_image(window).unwrap();

    assert_eq!(dst.band_bytes(1).unwrap(), input);
}

#[test]
fn test_init_dest_nodata_skips_destination_reads() {
    let src = Arc::new(MemRaster::new(8, 8, 1, DataType::Byte));
    let dst = Arc::new(RecordingStore::new(MemRaster::new(8, 8, 1, DataType::Byte)));

    let options = WarpOptions::new()
        .with_source(src)
        .with_destination(dst.clone())
        .with_transformer(identity())
        .with_dst_nodata(vec![255.0])
        .with_option(INIT_DEST, "NO_DATA");

    let mut op = WarpOperation::new(Arc::new(CountingKernel::default()));
    op.initialize(&options).unwrap();
    op.chunk_and_warp_image(Window::full(8, 8)).unwrap();

    assert!(dst.reads.borrow().is_empty());
    assert_eq!(dst.writes.borrow().len(), 1);
    assert!(dst.inner.band_bytes(1).unwrap().iter().all(|&v| v == 255));
}

#[test]
fn test_without_init_dest_destination_is_read() {
    let src = Arc::new(MemRaster::new(4, 4, 2, DataType::Byte));
    let dst = Arc::new(RecordingStore::new(MemRaster::new(4, 4, 2, DataType::Byte)));

    let options = WarpOptions::new()
        .with_source(src)
        .with_destination(dst.clone())
        .with_transformer(identity());

    let mut op = WarpOperation::new(Arc::new(CountingKernel::default()));
    op.initialize(&options).unwrap();
    op.chunk_and_warp_image(Window::full(4, 4)).unwrap();

    let reads = dst.reads.borrow();
    assert_eq!(reads.as_slice(), &[(1, Window::full(4, 4)), (2, Window::full(4, 4))]);
}

#[test]
fn test_init_dest_literal_clamps_for_bytes() {
    let src = Arc::new(MemRaster::new(4, 4, 1, DataType::Byte));
    let dst = Arc::new(MemRaster::new(4, 4, 1, DataType::Byte));

    let options = WarpOptions::new()
        .with_source(src)
        .with_destination(dst.clone())
        .with_transformer(identity())
        .with_option("init_dest", "1000");

    let mut op = WarpOperation::new(Arc::new(CountingKernel::default()));
    op.initialize(&options).unwrap();
    op.warp_region(Window::full(4, 4), None).unwrap();

    assert!(dst.band_bytes(1).unwrap().iter().all(|&v| v == 255));
}

#[test]
fn test_init_dest_truncates_for_bytes() {
    let src = Arc::new(MemRaster::new(4, 4, 1, DataType::Byte));
    let dst = Arc::new(MemRaster::new(4, 4, 1, DataType::Byte));

    let options = WarpOptions::new()
        .with_source(src)
        .with_destination(dst.clone())
        .with_transformer(identity())
        .with_option(INIT_DEST, "254.7");

    let mut op = WarpOperation::new(Arc::new(CountingKernel::default()));
    op.initialize(&options).unwrap();
    op.warp_region(Window::full(4, 4), None).unwrap();

    assert!(dst.band_bytes(1).unwrap().iter().all(|&v| v == 254));
}

#[test]
fn test_missing_transformer_rejected() {
    let src: Arc<dyn RasterStore> = Arc::new(MemRaster::new(4, 4, 1, DataType::Byte));
    let dst: Arc<dyn RasterStore> = Arc::new(MemRaster::new(4, 4, 1, DataType::Byte));
    let options = WarpOptions::new().with_source(src).with_destination(dst);

    let mut op = WarpOperation::new(Arc::new(NearestKernel));
    let err = op.initialize(&options).unwrap_err();
    assert!(matches!(err, WarpError::Config(_)));
    assert!(!op.is_initialized());
    assert!(op.options().is_none());
}

#[test]
fn test_all_violations_reported_together() {
    let options = WarpOptions::new().with_memory_limit(10);
    let err = WarpOperation::new(Arc::new(NearestKernel))
        .initialize(&options)
        .unwrap_err()
        .to_string();
    assert!(err.contains("unreasonably small"));
    assert!(err.contains("source raster is not set"));
    assert!(err.contains("destination raster is not set"));
    assert!(err.contains("transformer is not set"));
}

#[test]
fn test_wide_window_splits_along_x_first() {
    let mut op = WarpOperation::new(Arc::new(NearestKernel));
    op.initialize(&heavy_options(16, 8)).unwrap();

    let chunks = op.plan_chunks(Window::full(16, 8)).unwrap();
    assert_eq!(chunks.len(), 8);
    assert!(chunks.iter().all(|c| c.dst.x_size == 4 && c.dst.y_size == 4));

    // The first split is along X, so the left half is finished first.
    assert!(chunks[..4].iter().all(|c| c.dst.x_off < 8));
    assert!(chunks[4..].iter().all(|c| c.dst.x_off >= 8));
    assert_eq!(chunks[4].progress.base, 0.5);
}

#[test]
fn test_eight_by_four_halves_into_four_by_four() {
    let mut op = WarpOperation::new(Arc::new(NearestKernel));
    op.initialize(&heavy_options(8, 4)).unwrap();

    let chunks = op.plan_chunks(Window::full(8, 4)).unwrap();
    let windows: Vec<_> = chunks.iter().map(|c| c.dst).collect();
    assert_eq!(windows, vec![Window::new(0, 0, 4, 4), Window::new(4, 0, 4, 4)]);
}

#[test]
fn test_progress_covers_unit_interval() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let options = heavy_options(8, 8).with_progress(move |p| {
        sink.borrow_mut().push(p);
        true
    });

    let mut op = WarpOperation::new(Arc::new(CountingKernel::default()));
    op.initialize(&options).unwrap();
    op.chunk_and_warp_image(Window::full(8, 8)).unwrap();

    let seen = seen.borrow();
    assert_eq!(seen.as_slice(), &[0.0, 0.25, 0.5, 0.75, 1.0]);
}

#[test]
fn test_cancellation_stops_remaining_chunks() {
    let calls = Rc::new(Cell::new(0));
    let kernel = CountingKernel {
        calls: Rc::clone(&calls),
    };
    let options = heavy_options(8, 8).with_progress(|p| p < 0.5);

    let mut op = WarpOperation::new(Arc::new(kernel));
    op.initialize(&options).unwrap();
    let err = op.chunk_and_warp_image(Window::full(8, 8)).unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(calls.get(), 2);
}

#[test]
fn test_source_window_failure_threshold() {
    init_tracing();
    let build = |fail_first| {
        let src: Arc<dyn RasterStore> = Arc::new(MemRaster::new(8, 8, 1, DataType::Byte));
        let dst: Arc<dyn RasterStore> = Arc::new(MemRaster::new(8, 8, 1, DataType::Byte));
        let options = WarpOptions::new()
            .with_source(src)
            .with_destination(dst)
            .with_transformer(Arc::new(FlakyIdentity {
                fail_first,
                calls: Cell::new(0),
            }));
        let mut op = WarpOperation::new(Arc::new(NearestKernel));
        op.initialize(&options).unwrap();
        op
    };

    let err = build(75)
        .compute_source_window(Window::full(8, 8))
        .unwrap_err();
    assert!(matches!(err, WarpError::Transform(_)));
    assert!(build(74).compute_source_window(Window::full(8, 8)).is_ok());
}

#[test]
fn test_failed_estimate_aborts_warp_without_writes() {
    let src: Arc<dyn RasterStore> = Arc::new(MemRaster::new(8, 8, 1, DataType::Byte));
    let dst = Arc::new(RecordingStore::new(MemRaster::new(8, 8, 1, DataType::Byte)));
    let options = WarpOptions::new()
        .with_source(src)
        .with_destination(dst.clone())
        .with_transformer(Arc::new(FnTransformer::new(|_, _: Point| None)));

    let mut op = WarpOperation::new(Arc::new(NearestKernel));
    op.initialize(&options).unwrap();
    let err = op.chunk_and_warp_image(Window::full(8, 8)).unwrap_err();
    assert!(matches!(err, WarpError::Transform(_)));
    assert!(dst.writes.borrow().is_empty());
}

#[test]
fn test_identity_source_window_halo() {
    let expected = [
        (ResampleAlg::NearestNeighbour, Window::new(10, 10, 20, 20)),
        (ResampleAlg::Bilinear, Window::new(9, 9, 22, 22)),
        (ResampleAlg::Cubic, Window::new(8, 8, 24, 24)),
    ];
    for (alg, window) in expected {
        let src: Arc<dyn RasterStore> = Arc::new(MemRaster::new(100, 100, 1, DataType::Byte));
        let dst: Arc<dyn RasterStore> = Arc::new(MemRaster::new(100, 100, 1, DataType::Byte));
        let options = WarpOptions::new()
            .with_source(src)
            .with_destination(dst)
            .with_transformer(identity())
            .with_resample_alg(alg);
        let mut op = WarpOperation::new(Arc::new(NearestKernel));
        op.initialize(&options).unwrap();
        assert_eq!(op.compute_source_window(Window::new(10, 10, 20, 20)).unwrap(), window);
    }
}

#[test]
fn test_write_failure_keeps_earlier_bands() {
    init_tracing();
    let src = Arc::new(MemRaster::new(4, 4, 3, DataType::Byte));
    let dst = Arc::new(RecordingStore::new(MemRaster::new(4, 4, 3, DataType::Byte)).failing_writes_to(2));

    let options = WarpOptions::new()
        .with_source(src)
        .with_destination(dst.clone())
        .with_transformer(identity())
        .with_option(INIT_DEST, "7");

    let mut op = WarpOperation::new(Arc::new(CountingKernel::default()));
    op.initialize(&options).unwrap();
    let err = op.warp_region(Window::full(4, 4), None).unwrap_err();

    assert!(matches!(err, WarpError::Store(StoreError::Other(_))));
    assert_eq!(dst.writes.borrow().as_slice(), &[(1, Window::full(4, 4))]);
    assert!(dst.inner.band_bytes(1).unwrap().iter().all(|&v| v == 7));
    assert!(dst.inner.band_bytes(3).unwrap().iter().all(|&v| v == 0));
}

#[test]
fn test_source_nodata_left_unwarped() {
    let mut input = byte_ramp(4, 4);
    input[5] = 0;
    input[0] = 0;
    let src = Arc::new(MemRaster::from_bands(4, 4, DataType::Byte, vec![input.clone()]).unwrap());
    let dst = Arc::new(MemRaster::new(4, 4, 1, DataType::Byte));

    let options = WarpOptions::new()
        .with_source(src)
        .with_destination(dst.clone())
        .with_transformer(identity())
        .with_src_nodata(vec![0.0])
        .with_option(INIT_DEST, "99");

    let mut op = WarpOperation::new(Arc::new(NearestKernel));
    op.initialize(&options).unwrap();
    op.chunk_and_warp_image(Window::full(4, 4)).unwrap();

    let output = dst.band_bytes(1).unwrap();
    assert_eq!(output[0], 99);
    assert_eq!(output[5], 99);
    assert_eq!(output[6], input[6]);
}

#[test]
fn test_float32_source_nodata_matches_stored_value() {
    let input: Vec<u8> = [0.5f32, 0.1, 0.25, 0.75]
        .iter()
        .flat_map(|v| v.to_ne_bytes())
        .collect();
    let src = Arc::new(MemRaster::from_bands(2, 2, DataType::Float32, vec![input]).unwrap());
    let dst = Arc::new(MemRaster::new(2, 2, 1, DataType::Float32));

    let options = WarpOptions::new()
        .with_source(src)
        .with_destination(dst.clone())
        .with_transformer(identity())
        .with_src_nodata(vec![0.1])
        .with_option(INIT_DEST, "-1");

    let mut op = WarpOperation::new(Arc::new(NearestKernel));
    op.initialize(&options).unwrap();
    op.chunk_and_warp_image(Window::full(2, 2)).unwrap();

    let output = dst.band_bytes(1).unwrap();
    let pixel = |i: usize| DataType::Float32.decode(&output[i * 4..(i + 1) * 4]).0;
    assert_eq!(pixel(0), 0.5);
    assert_eq!(pixel(1), -1.0);
    assert_eq!(pixel(2), 0.25);
}

#[test]
fn test_source_read_failure_skips_kernel_and_writes() {
    init_tracing();
    let src = Arc::new(RecordingStore::new(MemRaster::new(4, 4, 3, DataType::Byte)).failing_reads_from(2));
    let dst = Arc::new(RecordingStore::new(MemRaster::new(4, 4, 3, DataType::Byte)));
    let calls = Rc::new(Cell::new(0));

    let options = WarpOptions::new()
        .with_source(src.clone())
        .with_destination(dst.clone())
        .with_transformer(identity())
        .with_option(INIT_DEST, "0");

    let mut op = WarpOperation::new(Arc::new(CountingKernel {
        calls: Rc::clone(&calls),
    }));
    op.initialize(&options).unwrap();
    let err = op.chunk_and_warp_image(Window::full(4, 4)).unwrap_err();

    assert!(matches!(err, WarpError::Store(StoreError::Other(_))));
    assert_eq!(src.reads.borrow().as_slice(), &[(1, Window::full(4, 4))]);
    assert_eq!(calls.get(), 0);
    assert!(dst.writes.borrow().is_empty());
}

#[test]
fn test_unified_and_destination_mask_generators() {
    let src = Arc::new(MemRaster::new(8, 8, 2, DataType::Byte));
    let dst = Arc::new(MemRaster::new(8, 8, 2, DataType::Byte));
    let seen = MaskLog::default();

    let validity: Arc<dyn ValidityMaskFunc> = Arc::new(keep_validity);
    let density: Arc<dyn DensityMaskFunc> = Arc::new(keep_density);

    let options = WarpOptions::new()
        .with_source(src)
        .with_destination(dst)
        .with_transformer(identity())
        .with_resample_alg(ResampleAlg::Bilinear)
        .with_src_validity_mask(Arc::clone(&validity))
        .with_src_density_mask(Arc::clone(&density))
        .with_dst_validity_mask(validity)
        .with_dst_density_mask(density)
        .with_option(INIT_DEST, "0");

    let mut op = WarpOperation::new(Arc::new(MaskRecorder {
        seen: Rc::clone(&seen),
    }));
    op.initialize(&options).unwrap();
    // The bilinear halo makes the source window larger than the destination.
    op.warp_region(Window::new(2, 2, 3, 3), None).unwrap();

    assert_eq!(
        seen.borrow().as_slice(),
        &[
            ("unified_src_valid", true, true),
            ("unified_src_density", true, true),
            ("dst_valid", true, true),
            ("dst_density", true, true),
        ]
    );
}

#[test]
fn test_mask_generators_accumulate_with_nodata() {
    let input = byte_ramp(4, 4);
    let src = Arc::new(MemRaster::from_bands(4, 4, DataType::Byte, vec![input.clone()]).unwrap());
    let dst = Arc::new(MemRaster::new(4, 4, 1, DataType::Byte));

    let last_pixel: Arc<dyn ValidityMaskFunc> = Arc::new(invalidate_last_pixel);

    let options = WarpOptions::new()
        .with_source(src)
        .with_destination(dst.clone())
        .with_transformer(identity())
        .with_src_nodata(vec![3.0])
        .with_src_per_band_validity_mask(vec![last_pixel])
        .with_option(INIT_DEST, "200");

    let mut op = WarpOperation::new(Arc::new(NearestKernel));
    op.initialize(&options).unwrap();
    op.chunk_and_warp_image(Window::full(4, 4)).unwrap();

    let output = dst.band_bytes(1).unwrap();
    assert_eq!(output[3], 200);
    assert_eq!(output[15], 200);
    assert_eq!(output[4], input[4]);
}

#[test]
fn test_warp_region_to_buffer_uses_caller_memory() {
    let input = byte_ramp(4, 4);
    let src = Arc::new(MemRaster::from_bands(4, 4, DataType::Byte, vec![input.clone()]).unwrap());
    let dst = Arc::new(RecordingStore::new(MemRaster::new(4, 4, 1, DataType::Byte)));

    let options = WarpOptions::new()
        .with_source(src)
        .with_destination(dst.clone())
        .with_transformer(identity());

    let mut op = WarpOperation::new(Arc::new(NearestKernel));
    op.initialize(&options).unwrap();

    let mut buffer = vec![0u8; 4];
    op.warp_region_to_buffer(Window::new(1, 1, 2, 2), &mut buffer, None)
        .unwrap();

    assert_eq!(buffer, vec![input[5], input[6], input[9], input[10]]);
    assert!(dst.reads.borrow().is_empty());
    assert!(dst.writes.borrow().is_empty());
}

#[test]
fn test_supplied_source_window_skips_estimate() {
    let transformer = Arc::new(FlakyIdentity {
        fail_first: 0,
        calls: Cell::new(0),
    });
    let src: Arc<dyn RasterStore> = Arc::new(MemRaster::new(4, 4, 1, DataType::Byte));
    let dst: Arc<dyn RasterStore> = Arc::new(MemRaster::new(4, 4, 1, DataType::Byte));
    let options = WarpOptions::new()
        .with_source(src)
        .with_destination(dst)
        .with_transformer(transformer.clone());

    let mut op = WarpOperation::new(Arc::new(CountingKernel::default()));
    op.initialize(&options).unwrap();

    op.warp_region(Window::full(4, 4), Some(Window::full(4, 4))).unwrap();
    assert_eq!(transformer.calls.get(), 0);

    op.warp_region(Window::full(4, 4), None).unwrap();
    assert_eq!(transformer.calls.get(), 1);
}

#[test]
fn test_geotiff_reprojection_between_grids() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("source.tif");

    // 20x10 source grid, values encode their own pixel position.
    let values: Vec<u8> = (0..10)
        .flat_map(|y| (0..20).map(move |x| (y * 20 + x) as u8))
        .collect();
    let src_georef = GeoReference::new(GeoTransform::new(0.0, 1000.0, 1.0, 1.0), 32633);
    MemRaster::from_bands(20, 10, DataType::Byte, vec![values])
        .unwrap()
        .with_georef(src_georef)
        .write_geotiff(&path)
        .unwrap();

    let src = MemRaster::open_geotiff(&path).unwrap();
    let src_georef = *src.georef().unwrap();

    // Destination starts 10 source pixels right at half resolution.
    let dst_georef = GeoReference::new(GeoTransform::new(10.0, 1000.0, 2.0, 2.0), 32633);
    let dst = Arc::new(MemRaster::new(4, 4, 1, DataType::Byte).with_georef(dst_georef));
    let transformer = GenImgProjTransformer::new(&src_georef, &dst_georef).unwrap();

    let options = WarpOptions::new()
        .with_source(Arc::new(src))
        .with_destination(dst.clone())
        .with_transformer(Arc::new(transformer));

    let mut op = WarpOperation::new(Arc::new(NearestKernel));
    op.initialize(&options).unwrap();
    assert_eq!(
        op.compute_source_window(Window::full(4, 4)).unwrap(),
        Window::new(10, 0, 8, 8)
    );
    op.chunk_and_warp_image(Window::full(4, 4)).unwrap();

    let output = dst.band_bytes(1).unwrap();
    for y in 0..4 {
        for x in 0..4 {
            let expected = (1 + 2 * y) * 20 + 11 + 2 * x;
            assert_eq!(usize::from(output[y * 4 + x]), expected, "pixel ({x}, {y})");
        }
    }
}
