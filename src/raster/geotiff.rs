//! GeoTIFF load and save for [`MemRaster`].
//!
//! Uses the pure Rust `tiff` crate (no GDAL dependency). Writing always
//! produces one uncompressed, pixel-interleaved strip with the GeoTIFF tags
//! needed to georeference the result; reading accepts any single-image TIFF
//! the decoder understands and picks up the same tags when present.
//!
//! # Example
//!
//! ```rust,no_run
//! use rasterwarp::MemRaster;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let raster = MemRaster::open_geotiff("input.tif")?;
//!     raster.write_geotiff("copy.tif")?;
//!     Ok(())
//! }
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

use super::{MemRaster, RasterStore, StoreError};
use crate::casting::{i32_to_u16, u32_to_usize, u64_to_u32, usize_to_u32};
use crate::data_type::DataType;
use crate::geometry::projection::{get_proj_string, is_geographic_crs};
use crate::geometry::{GeoReference, GeoTransform};

// GeoTIFF Tag IDs (not in standard tiff crate)
const GEOTIFF_MODELPIXELSCALE: u16 = 33550;
const GEOTIFF_MODELTIEPOINT: u16 = 33922;
const GEOTIFF_GEOKEYDIRECTORY: u16 = 34735;
const GEOTIFF_GEOASCIIPARAMS: u16 = 34737;

// GeoKey IDs
const GT_MODEL_TYPE_GEO_KEY: u16 = 1024;
const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;

// GeoKey values
const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;

// TIFF SampleFormat values
const SAMPLE_FORMAT_UINT: u16 = 1;
const SAMPLE_FORMAT_INT: u16 = 2;
const SAMPLE_FORMAT_IEEEFP: u16 = 3;
const SAMPLE_FORMAT_COMPLEXINT: u16 = 5;
const SAMPLE_FORMAT_COMPLEXIEEEFP: u16 = 6;

fn sample_format(data_type: DataType) -> u16 {
    match data_type {
        DataType::Byte | DataType::UInt16 | DataType::UInt32 => SAMPLE_FORMAT_UINT,
        DataType::Int16 | DataType::Int32 => SAMPLE_FORMAT_INT,
        DataType::Float32 | DataType::Float64 => SAMPLE_FORMAT_IEEEFP,
        DataType::CInt16 | DataType::CInt32 => SAMPLE_FORMAT_COMPLEXINT,
        DataType::CFloat32 | DataType::CFloat64 => SAMPLE_FORMAT_COMPLEXIEEEFP,
    }
}

fn encode_err(e: String) -> StoreError {
    StoreError::Tiff(e)
}

impl MemRaster {
    /// Load a GeoTIFF file into memory.
    ///
    /// # Errors
    /// Fails on I/O errors, undecodable TIFFs and unsupported sample types.
    pub fn open_geotiff<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let file = File::open(path)?;
        Self::read_geotiff(BufReader::new(file))
    }

    /// Load a GeoTIFF from any seekable reader.
    ///
    /// # Errors
    /// See [`MemRaster::open_geotiff`].
    pub fn read_geotiff<R: Read + Seek>(reader: R) -> Result<Self, StoreError> {
        let mut decoder = Decoder::new(reader)?;
        let (width, height) = decoder.dimensions()?;
        let width = u32_to_usize(width).map_err(encode_err)?;
        let height = u32_to_usize(height).map_err(encode_err)?;
        let samples = decoder.get_tag_u32(Tag::SamplesPerPixel).unwrap_or(1);
        let samples = u32_to_usize(samples).map_err(encode_err)?;

        let georef = read_georef(&mut decoder);

        let (data_type, interleaved) = match decoder.read_image()? {
            DecodingResult::U8(v) => (DataType::Byte, v),
            DecodingResult::U16(v) => (DataType::UInt16, to_ne_bytes(&v, |x| x.to_ne_bytes())),
            DecodingResult::I16(v) => (DataType::Int16, to_ne_bytes(&v, |x| x.to_ne_bytes())),
            DecodingResult::U32(v) => (DataType::UInt32, to_ne_bytes(&v, |x| x.to_ne_bytes())),
            DecodingResult::I32(v) => (DataType::Int32, to_ne_bytes(&v, |x| x.to_ne_bytes())),
            DecodingResult::F32(v) => (DataType::Float32, to_ne_bytes(&v, |x| x.to_ne_bytes())),
            DecodingResult::F64(v) => (DataType::Float64, to_ne_bytes(&v, |x| x.to_ne_bytes())),
            _ => {
                return Err(StoreError::UnsupportedType(
                    "TIFF sample type has no matching working type".to_string(),
                ))
            }
        };

        let word = data_type.size_bytes();
        let pixel = word * samples;
        if samples == 0 || interleaved.len() != width * height * pixel {
            return Err(StoreError::Tiff(format!(
                "decoded {} bytes for a {width}x{height} image with {samples} samples",
                interleaved.len()
            )));
        }

        let mut planes = vec![Vec::with_capacity(width * height * word); samples];
        for px in interleaved.chunks_exact(pixel) {
            for (band, plane) in planes.iter_mut().enumerate() {
                plane.extend_from_slice(&px[band * word..(band + 1) * word]);
            }
        }

        let raster = MemRaster::from_bands(width, height, data_type, planes)?;
        Ok(match georef {
            Some(g) => raster.with_georef(g),
            None => raster,
        })
    }

    /// Write this raster to a GeoTIFF file.
    ///
    /// # Errors
    /// Fails on I/O errors, empty rasters, or bands of differing types.
    pub fn write_geotiff<P: AsRef<Path>>(&self, path: P) -> Result<(), StoreError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.write_geotiff_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Write this raster as a GeoTIFF into memory.
    ///
    /// # Errors
    /// See [`MemRaster::write_geotiff`].
    pub fn to_geotiff_bytes(&self) -> Result<Vec<u8>, StoreError> {
        let mut buffer = std::io::Cursor::new(Vec::new());
        self.write_geotiff_to(&mut buffer)?;
        Ok(buffer.into_inner())
    }

    /// Write this raster as a GeoTIFF to any `Write + Seek`.
    ///
    /// # Errors
    /// See [`MemRaster::write_geotiff`].
    pub fn write_geotiff_to<W: Write + Seek>(&self, writer: W) -> Result<(), StoreError> {
        let bands = self.band_count();
        if bands == 0 || self.width() == 0 || self.height() == 0 {
            return Err(StoreError::Other("Raster has no pixel data".to_string()));
        }

        let data_type = self
            .band_data_type(1)
            .ok_or(StoreError::BandOutOfRange { band: 1, count: 0 })?;
        if (2..=bands).any(|b| self.band_data_type(b) != Some(data_type)) {
            return Err(StoreError::UnsupportedType(
                "GeoTIFF output needs every band in the same data type".to_string(),
            ));
        }

        let width = usize_to_u32(self.width()).map_err(encode_err)?;
        let height = usize_to_u32(self.height()).map_err(encode_err)?;
        let samples = u16::try_from(bands)
            .map_err(|_| StoreError::Other(format!("{bands} bands exceed the TIFF limit")))?;
        let bits = u16::try_from(data_type.size_bits())
            .map_err(|_| StoreError::UnsupportedType(data_type.to_string()))?;

        let mut encoder = TiffEncoder::new(writer)?;
        let mut dir = encoder.new_directory()?;

        dir.write_tag(Tag::ImageWidth, width)?;
        dir.write_tag(Tag::ImageLength, height)?;

        let bits_per_sample: Vec<u16> = vec![bits; bands];
        dir.write_tag(Tag::BitsPerSample, bits_per_sample.as_slice())?;
        dir.write_tag(Tag::Compression, 1u16)?;

        // BlackIsZero: treat every band as a grey channel
        dir.write_tag(Tag::PhotometricInterpretation, 1u16)?;
        dir.write_tag(Tag::SamplesPerPixel, samples)?;

        let formats: Vec<u16> = vec![sample_format(data_type); bands];
        dir.write_tag(Tag::SampleFormat, formats.as_slice())?;

        // Chunky (pixel interleaved)
        dir.write_tag(Tag::PlanarConfiguration, 1u16)?;
        dir.write_tag(Tag::RowsPerStrip, height)?;

        if bands > 1 {
            let extra_samples: Vec<u16> = vec![0; bands - 1];
            dir.write_tag(Tag::ExtraSamples, extra_samples.as_slice())?;
        }

        if let Some(georef) = self.georef() {
            let pixel_scale = [
                georef.geo_transform.pixel_width,
                georef.geo_transform.pixel_height,
                0.0,
            ];
            dir.write_tag(Tag::from_u16_exhaustive(GEOTIFF_MODELPIXELSCALE), pixel_scale.as_slice())?;

            // Ties pixel (0, 0) to the world origin
            let tiepoint = [
                0.0,
                0.0,
                0.0,
                georef.geo_transform.origin_x,
                georef.geo_transform.origin_y,
                0.0,
            ];
            dir.write_tag(Tag::from_u16_exhaustive(GEOTIFF_MODELTIEPOINT), tiepoint.as_slice())?;

            let geokeys = build_geokey_directory(georef.epsg)?;
            dir.write_tag(Tag::from_u16_exhaustive(GEOTIFF_GEOKEYDIRECTORY), geokeys.as_slice())?;

            if let Some(proj_string) = get_proj_string(georef.epsg) {
                let ascii_params = format!("{proj_string}|");
                dir.write_tag(Tag::from_u16_exhaustive(GEOTIFF_GEOASCIIPARAMS), ascii_params.as_bytes())?;
            }
        }

        let planes = (1..=bands)
            .map(|b| self.band_bytes(b))
            .collect::<Result<Vec<_>, _>>()?;
        let word = data_type.size_bytes();
        let mut pixel_bytes = Vec::with_capacity(planes.len() * planes[0].len());
        for px in 0..self.width() * self.height() {
            for plane in &planes {
                pixel_bytes.extend_from_slice(&plane[px * word..(px + 1) * word]);
            }
        }

        let strip_offset = dir.write_data(pixel_bytes.as_slice())?;
        dir.write_tag(Tag::StripOffsets, u64_to_u32(strip_offset).map_err(encode_err)?)?;

        let strip_byte_count = usize_to_u32(pixel_bytes.len()).map_err(encode_err)?;
        dir.write_tag(Tag::StripByteCounts, strip_byte_count)?;

        dir.finish()?;
        Ok(())
    }
}

fn to_ne_bytes<T: Copy, const N: usize>(values: &[T], f: impl Fn(T) -> [u8; N]) -> Vec<u8> {
    values.iter().flat_map(|&v| f(v)).collect()
}

/// GeoKeyDirectory: header `[version, revision, minor, count]` then
/// `[key, location, count, value]` per key.
fn build_geokey_directory(epsg: i32) -> Result<Vec<u16>, StoreError> {
    let is_geographic = is_geographic_crs(epsg);
    let code = i32_to_u16(epsg).map_err(encode_err)?;

    let mut keys = vec![1, 1, 0, 3];
    keys.extend_from_slice(&[
        GT_MODEL_TYPE_GEO_KEY,
        0,
        1,
        if is_geographic {
            MODEL_TYPE_GEOGRAPHIC
        } else {
            MODEL_TYPE_PROJECTED
        },
    ]);
    keys.extend_from_slice(&[GT_RASTER_TYPE_GEO_KEY, 0, 1, RASTER_PIXEL_IS_AREA]);
    if is_geographic {
        keys.extend_from_slice(&[GEOGRAPHIC_TYPE_GEO_KEY, 0, 1, code]);
    } else {
        keys.extend_from_slice(&[PROJECTED_CS_TYPE_GEO_KEY, 0, 1, code]);
    }
    Ok(keys)
}

/// Pull pixel scale, tiepoint and EPSG code out of the GeoTIFF tags.
fn read_georef<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoReference> {
    let scale = decoder
        .get_tag_f64_vec(Tag::from_u16_exhaustive(GEOTIFF_MODELPIXELSCALE))
        .ok()?;
    let tie = decoder
        .get_tag_f64_vec(Tag::from_u16_exhaustive(GEOTIFF_MODELTIEPOINT))
        .ok()?;
    if scale.len() < 2 || tie.len() < 6 {
        return None;
    }

    let epsg = decoder
        .get_tag_u16_vec(Tag::from_u16_exhaustive(GEOTIFF_GEOKEYDIRECTORY))
        .ok()
        .and_then(|keys| {
            keys.get(4..)?
                .chunks_exact(4)
                .find(|k| k[0] == PROJECTED_CS_TYPE_GEO_KEY || k[0] == GEOGRAPHIC_TYPE_GEO_KEY)
                .map(|k| i32::from(k[3]))
        })
        .unwrap_or(0);

    // Tiepoint (i, j, k, x, y, z) maps pixel (i, j) to world (x, y)
    let gt = GeoTransform::new(
        tie[3] - tie[0] * scale[0],
        tie[4] + tie[1] * scale[1],
        scale[0],
        scale[1],
    );
    Some(GeoReference::new(gt, epsg))
}
