#![doc = include_str!("../README.md")]
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`operation`]: The [`WarpOperation`] session: chunking, buffer lifecycle, kernel dispatch
//! - [`options`]: [`WarpOptions`] builder, defaults and validation
//! - [`chunking`]: Memory cost model and the [`ChunkPlanner`] work list
//! - [`source_window`]: Source window estimation from perimeter samples
//! - [`kernel`]: [`KernelTask`] and the [`WarpKernel`] resampling hook
//! - [`mask`]: Validity and density masks
//! - [`transformer`]: Destination/source pixel mapping via [`Transformer`]
//! - [`geometry`]: Pixel windows, geotransforms and projections
//! - [`raster`]: [`RasterStore`] abstraction, in-memory rasters and GeoTIFF I/O
//! - [`progress`]: Progress windows and cancellation

// ============================================================================
// Public modules
// ============================================================================

pub mod buffer;
pub mod casting;
pub mod chunking;
pub mod data_type;
pub mod error;
pub mod geometry;
pub mod kernel;
pub mod mask;
pub mod operation;
pub mod options;
pub mod progress;
pub mod raster;
pub mod source_window;
pub mod transformer;

// ============================================================================
// Warp Operation
// ============================================================================
// Primary API: WarpOperation::new(kernel).initialize(&options)?.chunk_and_warp_image(window)

pub use operation::WarpOperation;

pub use options::{
    InitDest,
    ResampleAlg,
    ValidatedOptions,
    WarpOptionList,
    WarpOptions,
    DEFAULT_MEMORY_LIMIT,
    INIT_DEST,
    MIN_MEMORY_LIMIT,
};

pub use error::{Result, WarpError};

// ============================================================================
// Chunk Planning
// ============================================================================

pub use chunking::{
    Chunk,
    ChunkPlanner,
    MemoryCost,
};

pub use source_window::compute_source_window;

pub use progress::{
    no_progress,
    Progress,
    ProgressFunc,
    ProgressWindow,
};

// ============================================================================
// Kernel Interface
// ============================================================================

pub use kernel::{
    BandBuffer,
    BandViewMut,
    KernelTask,
    WarpKernel,
};

pub use mask::{
    ensure_mask,
    DensityMask,
    DensityMaskFunc,
    MaskContext,
    MaskKind,
    ValidityMask,
    ValidityMaskFunc,
};

// ============================================================================
// Coordinate Transformation
// ============================================================================

pub use transformer::{
    FnTransformer,
    GenImgProjTransformer,
    TransformDirection,
    Transformer,
};

pub use geometry::{GeoReference, GeoTransform, Point, Window};
pub use geometry::projection::{
    get_proj_string,
    is_geographic_crs,
    project_point,
};

// ============================================================================
// Raster Stores
// ============================================================================

pub use data_type::DataType;

pub use raster::{
    MemRaster,
    RasterStore,
    StoreError,
};
