//! Validity and density masks for a kernel task.
//!
//! Five mask slots exist on a [`KernelTask`]. Each is created on first use by
//! [`ensure_mask`] and never reset afterwards, so several producers (nodata
//! matching, generator hooks) can accumulate into the same mask.

use crate::buffer::alloc_filled;
use crate::data_type::DataType;
use crate::error::{Result, WarpError};
use crate::geometry::Window;
use crate::kernel::KernelTask;

/// The mask slots of a kernel task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaskKind {
    /// Source validity for a single band.
    BandSrcValid,
    /// Source validity shared by all bands.
    UnifiedSrcValid,
    /// Source density shared by all bands.
    UnifiedSrcDensity,
    DstValid,
    DstDensity,
}

/// Which window a mask covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskExtent {
    Source,
    Destination,
}

/// Shape and initial content of a mask kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskDescriptor {
    pub extent: MaskExtent,
    pub bits_per_pixel: usize,
    /// Validity: every byte set to this. Density: every value set to this.
    pub default_fill: f32,
}

const VALIDITY: MaskDescriptor = MaskDescriptor {
    extent: MaskExtent::Source,
    bits_per_pixel: 1,
    default_fill: 1.0,
};

const DENSITY: MaskDescriptor = MaskDescriptor {
    extent: MaskExtent::Source,
    bits_per_pixel: 32,
    default_fill: 0.0,
};

impl MaskKind {
    pub const ALL: [MaskKind; 5] = [
        MaskKind::BandSrcValid,
        MaskKind::UnifiedSrcValid,
        MaskKind::UnifiedSrcDensity,
        MaskKind::DstValid,
        MaskKind::DstDensity,
    ];

    #[must_use]
    pub const fn descriptor(self) -> MaskDescriptor {
        match self {
            Self::BandSrcValid | Self::UnifiedSrcValid => VALIDITY,
            Self::UnifiedSrcDensity => DENSITY,
            Self::DstValid => MaskDescriptor {
                extent: MaskExtent::Destination,
                ..VALIDITY
            },
            Self::DstDensity => MaskDescriptor {
                extent: MaskExtent::Destination,
                ..DENSITY
            },
        }
    }

    /// Whether the slot is indexed by band.
    #[must_use]
    pub const fn is_per_band(self) -> bool {
        matches!(self, Self::BandSrcValid)
    }
}

/// One bit per pixel, least significant bit first; set means valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidityMask {
    bits: Vec<u8>,
    pixels: usize,
}

impl ValidityMask {
    /// A mask with every pixel valid.
    ///
    /// # Errors
    /// Returns [`WarpError::Allocation`] if the bitmap cannot be allocated.
    pub fn new(pixels: usize) -> Result<Self> {
        Ok(Self {
            bits: alloc_filled(pixels.div_ceil(8), 0xff, "validity mask")?,
            pixels,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pixels
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pixels == 0
    }

    /// Whether pixel `i` is valid. Out-of-range pixels are invalid.
    #[inline]
    #[must_use]
    pub fn is_valid(&self, i: usize) -> bool {
        i < self.pixels && self.bits[i >> 3] & (1 << (i & 7)) != 0
    }

    #[inline]
    pub fn set_valid(&mut self, i: usize, valid: bool) {
        if i >= self.pixels {
            return;
        }
        if valid {
            self.bits[i >> 3] |= 1 << (i & 7);
        } else {
            self.bits[i >> 3] &= !(1 << (i & 7));
        }
    }

    #[must_use]
    pub fn count_valid(&self) -> usize {
        (0..self.pixels).filter(|&i| self.is_valid(i)).count()
    }

    /// The packed bitmap, rounded up to whole bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }
}

/// One `f32` weight per pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityMask {
    values: Vec<f32>,
}

impl DensityMask {
    /// A mask of zeros.
    ///
    /// # Errors
    /// Returns [`WarpError::Allocation`] if the values cannot be allocated.
    pub fn new(pixels: usize) -> Result<Self> {
        Ok(Self {
            values: alloc_filled(pixels, DENSITY.default_fill, "density mask")?,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f32] {
        &mut self.values
    }
}

/// Create the mask `kind` on `task` if it does not exist yet.
///
/// `band` is the 0-based band slot and is required for
/// [`MaskKind::BandSrcValid`] only. Calling this again for an existing mask
/// leaves its contents untouched.
///
/// # Errors
/// [`WarpError::Internal`] for a missing or out-of-range band slot,
/// [`WarpError::Allocation`] if the mask cannot be allocated.
pub fn ensure_mask(task: &mut KernelTask<'_>, band: Option<usize>, kind: MaskKind) -> Result<()> {
    let window = match kind.descriptor().extent {
        MaskExtent::Source => task.src_window,
        MaskExtent::Destination => task.dst_window,
    };
    let pixels = window.area();

    match kind {
        MaskKind::BandSrcValid => {
            let band_count = task.band_count();
            let index = match band {
                Some(i) if i < band_count => i,
                Some(i) => {
                    return Err(WarpError::internal(format!(
                        "band mask slot {i} out of range for {band_count} bands"
                    )))
                }
                None => return Err(WarpError::internal("per-band mask requested without a band")),
            };
            let slots = task
                .band_src_valid
                .get_or_insert_with(|| (0..band_count).map(|_| None).collect());
            if slots[index].is_none() {
                slots[index] = Some(ValidityMask::new(pixels)?);
            }
        }
        MaskKind::UnifiedSrcValid => ensure_validity(&mut task.unified_src_valid, pixels)?,
        MaskKind::DstValid => ensure_validity(&mut task.dst_valid, pixels)?,
        MaskKind::UnifiedSrcDensity => ensure_density(&mut task.unified_src_density, pixels)?,
        MaskKind::DstDensity => ensure_density(&mut task.dst_density, pixels)?,
    }
    Ok(())
}

fn ensure_validity(slot: &mut Option<ValidityMask>, pixels: usize) -> Result<()> {
    if slot.is_none() {
        *slot = Some(ValidityMask::new(pixels)?);
    }
    Ok(())
}

fn ensure_density(slot: &mut Option<DensityMask>, pixels: usize) -> Result<()> {
    if slot.is_none() {
        *slot = Some(DensityMask::new(pixels)?);
    }
    Ok(())
}

/// Clear validity for every pixel of `data` equal to `nodata`.
///
/// `nodata` is first stored in `data_type`, so the comparison sees the value
/// the buffer can actually hold. Both real and imaginary parts must match;
/// NaN matches NaN. Returns the number of pixels newly marked invalid.
pub fn apply_nodata_mask(
    data: &[u8],
    data_type: DataType,
    nodata: (f64, f64),
    mask: &mut ValidityMask,
) -> usize {
    let size = data_type.size_bytes();
    let mut word = [0u8; 16];
    data_type.encode(nodata.0, nodata.1, &mut word);
    let nodata = data_type.decode(&word[..size]);

    let mut cleared = 0;
    for (i, element) in data.chunks_exact(size).enumerate() {
        let (re, im) = data_type.decode(element);
        if same_value(re, nodata.0) && same_value(im, nodata.1) && mask.is_valid(i) {
            mask.set_valid(i, false);
            cleared += 1;
        }
    }
    cleared
}

fn same_value(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

/// What a mask generator sees: the window and the working-type band data.
#[derive(Debug, Clone, Copy)]
pub struct MaskContext<'a> {
    pub data_type: DataType,
    pub window: Window,
    /// One plane per band, or a single plane for per-band generators.
    pub bands: &'a [&'a [u8]],
}

/// Writes validity into an existing mask.
pub trait ValidityMaskFunc {
    /// # Errors
    /// Any error aborts the chunk.
    fn generate(&self, ctx: &MaskContext<'_>, mask: &mut ValidityMask) -> Result<()>;
}

/// Writes density into an existing mask.
pub trait DensityMaskFunc {
    /// # Errors
    /// Any error aborts the chunk.
    fn generate(&self, ctx: &MaskContext<'_>, mask: &mut DensityMask) -> Result<()>;
}

impl<F> ValidityMaskFunc for F
where
    F: Fn(&MaskContext<'_>, &mut ValidityMask) -> Result<()>,
{
    fn generate(&self, ctx: &MaskContext<'_>, mask: &mut ValidityMask) -> Result<()> {
        self(ctx, mask)
    }
}

impl<F> DensityMaskFunc for F
where
    F: Fn(&MaskContext<'_>, &mut DensityMask) -> Result<()>,
{
    fn generate(&self, ctx: &MaskContext<'_>, mask: &mut DensityMask) -> Result<()> {
        self(ctx, mask)
    }
}
