//! Working element types.
//!
//! Every band of a warp is processed in one element type. Buffers are plain
//! byte vectors in native endianness; this module knows how to turn one
//! element into a `(real, imaginary)` pair and back.

use crate::casting::round_clamp;

/// Element type of a raster band or working buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Byte,
    UInt16,
    Int16,
    UInt32,
    Int32,
    Float32,
    Float64,
    CInt16,
    CInt32,
    CFloat32,
    CFloat64,
}

impl DataType {
    /// Width of one element in bits.
    #[must_use]
    pub const fn size_bits(self) -> usize {
        match self {
            Self::Byte => 8,
            Self::UInt16 | Self::Int16 => 16,
            Self::UInt32 | Self::Int32 | Self::Float32 | Self::CInt16 => 32,
            Self::Float64 | Self::CInt32 | Self::CFloat32 => 64,
            Self::CFloat64 => 128,
        }
    }

    /// Width of one element in bytes.
    #[must_use]
    pub const fn size_bytes(self) -> usize {
        self.size_bits() / 8
    }

    #[must_use]
    pub const fn is_complex(self) -> bool {
        matches!(
            self,
            Self::CInt16 | Self::CInt32 | Self::CFloat32 | Self::CFloat64
        )
    }

    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(
            self,
            Self::Float32 | Self::Float64 | Self::CFloat32 | Self::CFloat64
        )
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Byte => "Byte",
            Self::UInt16 => "UInt16",
            Self::Int16 => "Int16",
            Self::UInt32 => "UInt32",
            Self::Int32 => "Int32",
            Self::Float32 => "Float32",
            Self::Float64 => "Float64",
            Self::CInt16 => "CInt16",
            Self::CInt32 => "CInt32",
            Self::CFloat32 => "CFloat32",
            Self::CFloat64 => "CFloat64",
        }
    }

    /// Decode one element from the start of `bytes`.
    ///
    /// `bytes` must hold at least [`size_bytes`](Self::size_bytes) bytes.
    #[must_use]
    pub fn decode(self, bytes: &[u8]) -> (f64, f64) {
        fn arr<const N: usize>(b: &[u8], at: usize) -> [u8; N] {
            let mut out = [0u8; N];
            out.copy_from_slice(&b[at..at + N]);
            out
        }

        match self {
            Self::Byte => (f64::from(bytes[0]), 0.0),
            Self::UInt16 => (f64::from(u16::from_ne_bytes(arr(bytes, 0))), 0.0),
            Self::Int16 => (f64::from(i16::from_ne_bytes(arr(bytes, 0))), 0.0),
            Self::UInt32 => (f64::from(u32::from_ne_bytes(arr(bytes, 0))), 0.0),
            Self::Int32 => (f64::from(i32::from_ne_bytes(arr(bytes, 0))), 0.0),
            Self::Float32 => (f64::from(f32::from_ne_bytes(arr(bytes, 0))), 0.0),
            Self::Float64 => (f64::from_ne_bytes(arr(bytes, 0)), 0.0),
            Self::CInt16 => (
                f64::from(i16::from_ne_bytes(arr(bytes, 0))),
                f64::from(i16::from_ne_bytes(arr(bytes, 2))),
            ),
            Self::CInt32 => (
                f64::from(i32::from_ne_bytes(arr(bytes, 0))),
                f64::from(i32::from_ne_bytes(arr(bytes, 4))),
            ),
            Self::CFloat32 => (
                f64::from(f32::from_ne_bytes(arr(bytes, 0))),
                f64::from(f32::from_ne_bytes(arr(bytes, 4))),
            ),
            Self::CFloat64 => (
                f64::from_ne_bytes(arr(bytes, 0)),
                f64::from_ne_bytes(arr(bytes, 8)),
            ),
        }
    }

    /// Encode one element into the start of `out`.
    ///
    /// Integer types round to nearest and saturate at the type's range; the
    /// imaginary part is dropped for real types.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn encode(self, real: f64, imag: f64, out: &mut [u8]) {
        match self {
            Self::Byte => out[0] = round_clamp(real, 0.0, 255.0) as u8,
            Self::UInt16 => {
                let v = round_clamp(real, 0.0, f64::from(u16::MAX)) as u16;
                out[..2].copy_from_slice(&v.to_ne_bytes());
            }
            Self::Int16 => {
                let v = round_clamp(real, f64::from(i16::MIN), f64::from(i16::MAX)) as i16;
                out[..2].copy_from_slice(&v.to_ne_bytes());
            }
            Self::UInt32 => {
                let v = round_clamp(real, 0.0, f64::from(u32::MAX)) as u32;
                out[..4].copy_from_slice(&v.to_ne_bytes());
            }
            Self::Int32 => {
                let v = round_clamp(real, f64::from(i32::MIN), f64::from(i32::MAX)) as i32;
                out[..4].copy_from_slice(&v.to_ne_bytes());
            }
            Self::Float32 => out[..4].copy_from_slice(&(real as f32).to_ne_bytes()),
            Self::Float64 => out[..8].copy_from_slice(&real.to_ne_bytes()),
            Self::CInt16 => {
                let lo = f64::from(i16::MIN);
                let hi = f64::from(i16::MAX);
                out[..2].copy_from_slice(&(round_clamp(real, lo, hi) as i16).to_ne_bytes());
                out[2..4].copy_from_slice(&(round_clamp(imag, lo, hi) as i16).to_ne_bytes());
            }
            Self::CInt32 => {
                let lo = f64::from(i32::MIN);
                let hi = f64::from(i32::MAX);
                out[..4].copy_from_slice(&(round_clamp(real, lo, hi) as i32).to_ne_bytes());
                out[4..8].copy_from_slice(&(round_clamp(imag, lo, hi) as i32).to_ne_bytes());
            }
            Self::CFloat32 => {
                out[..4].copy_from_slice(&(real as f32).to_ne_bytes());
                out[4..8].copy_from_slice(&(imag as f32).to_ne_bytes());
            }
            Self::CFloat64 => {
                out[..8].copy_from_slice(&real.to_ne_bytes());
                out[8..16].copy_from_slice(&imag.to_ne_bytes());
            }
        }
    }

    /// Fill every element of `buf` with the same value.
    pub fn fill(self, buf: &mut [u8], real: f64, imag: f64) {
        let size = self.size_bytes();
        let mut word = [0u8; 16];
        self.encode(real, imag, &mut word);
        if word[..size].iter().all(|&b| b == 0) {
            buf.fill(0);
            return;
        }
        for element in buf.chunks_exact_mut(size) {
            element.copy_from_slice(&word[..size]);
        }
    }

    /// Convert a packed run of `src_type` elements into `dst_type` elements.
    ///
    /// Both slices must describe the same number of elements.
    pub fn convert(src: &[u8], src_type: DataType, dst: &mut [u8], dst_type: DataType) {
        if src_type == dst_type {
            dst.copy_from_slice(src);
            return;
        }
        for (s, d) in src
            .chunks_exact(src_type.size_bytes())
            .zip(dst.chunks_exact_mut(dst_type.size_bytes()))
        {
            let (re, im) = src_type.decode(s);
            dst_type.encode(re, im, d);
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
