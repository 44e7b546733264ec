//! Warp configuration and its validation.
//!
//! [`WarpOptions`] is what a caller fills in. [`WarpOptions::validated`]
//! applies the defaults, checks every invariant, and produces the
//! [`ValidatedOptions`] that a [`WarpOperation`](crate::WarpOperation) keeps
//! for its lifetime. A configuration that fails any check is rejected whole.

use std::sync::Arc;

use tracing::debug;

use crate::data_type::DataType;
use crate::error::{Result, WarpError};
use crate::mask::{DensityMaskFunc, ValidityMaskFunc};
use crate::progress::{no_progress, ProgressFunc};
use crate::raster::RasterStore;
use crate::transformer::Transformer;

/// Smallest memory limit accepted, in bytes.
pub const MIN_MEMORY_LIMIT: usize = 100_000;

/// Memory limit used when none is given, in bytes.
pub const DEFAULT_MEMORY_LIMIT: usize = 64 * 1024 * 1024;

/// Option key: pre-fill destination chunks instead of reading them.
pub const INIT_DEST: &str = "INIT_DEST";

/// Resampling algorithm handed to the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResampleAlg {
    #[default]
    NearestNeighbour,
    Bilinear,
    Cubic,
}

impl ResampleAlg {
    /// Extra source pixels needed around a mapped point for this kernel.
    #[must_use]
    pub const fn halo_margin(self) -> usize {
        match self {
            Self::NearestNeighbour => 0,
            Self::Bilinear => 1,
            Self::Cubic => 2,
        }
    }
}

/// Ordered string options with case-insensitive keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WarpOptionList {
    entries: Vec<(String, String)>,
}

impl WarpOptionList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, replacing an existing entry in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&key))
        {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for WarpOptionList {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut list = Self::new();
        for (k, v) in iter {
            list.set(k, v);
        }
        list
    }
}

/// Parsed `INIT_DEST` value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InitDest {
    /// Fill with the destination nodata value of each band.
    NoData,
    /// Fill with a fixed real or complex value.
    Value { real: f64, imag: f64 },
}

impl InitDest {
    /// Parse `NO_DATA` or a literal like `255`, `-1.5`, `1+2i`, `3-4j`.
    #[must_use]
    pub fn parse(value: &str) -> Option<InitDest> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("NO_DATA") {
            return Some(InitDest::NoData);
        }
        parse_complex(value).map(|(real, imag)| InitDest::Value { real, imag })
    }
}

fn parse_complex(s: &str) -> Option<(f64, f64)> {
    if let Ok(real) = s.parse::<f64>() {
        return Some((real, 0.0));
    }

    let body = s.strip_suffix(['i', 'j', 'I', 'J'])?;
    // Split at the last sign that is not the leading one or an exponent sign.
    let bytes = body.as_bytes();
    let split = (1..bytes.len())
        .rev()
        .find(|&i| (bytes[i] == b'+' || bytes[i] == b'-') && !matches!(bytes[i - 1], b'e' | b'E'));

    match split {
        Some(at) => {
            let real = body[..at].trim().parse().ok()?;
            let imag_str = body[at..].trim();
            let imag = match imag_str {
                "+" => 1.0,
                "-" => -1.0,
                other => other.parse().ok()?,
            };
            Some((real, imag))
        }
        None => Some((0.0, body.trim().parse().ok()?)),
    }
}

/// Everything a warp needs, as supplied by the caller.
///
/// Band indices are 1-based. Fields left `None` or empty are either defaulted
/// by [`WarpOptions::validated`] or reported as configuration errors.
#[derive(Clone)]
pub struct WarpOptions {
    pub resample_alg: ResampleAlg,
    /// Element type for every band during processing. Defaults to the
    /// type of the first destination band.
    pub working_data_type: Option<DataType>,
    /// Memory budget in bytes. `0` means [`DEFAULT_MEMORY_LIMIT`].
    pub memory_limit: usize,
    pub src: Option<Arc<dyn RasterStore>>,
    pub dst: Option<Arc<dyn RasterStore>>,
    pub src_bands: Vec<usize>,
    pub dst_bands: Vec<usize>,
    pub src_nodata_real: Option<Vec<f64>>,
    pub src_nodata_imag: Option<Vec<f64>>,
    pub dst_nodata_real: Option<Vec<f64>>,
    pub dst_nodata_imag: Option<Vec<f64>>,
    pub transformer: Option<Arc<dyn Transformer>>,
    pub progress: Option<ProgressFunc>,
    pub warp_options: WarpOptionList,
    /// One validity generator per band, run on each source band.
    pub src_per_band_validity_mask: Option<Vec<Arc<dyn ValidityMaskFunc>>>,
    pub src_validity_mask: Option<Arc<dyn ValidityMaskFunc>>,
    pub src_density_mask: Option<Arc<dyn DensityMaskFunc>>,
    pub dst_validity_mask: Option<Arc<dyn ValidityMaskFunc>>,
    pub dst_density_mask: Option<Arc<dyn DensityMaskFunc>>,
}

impl Default for WarpOptions {
    fn default() -> Self {
        Self {
            resample_alg: ResampleAlg::default(),
            working_data_type: None,
            memory_limit: 0,
            src: None,
            dst: None,
            src_bands: Vec::new(),
            dst_bands: Vec::new(),
            src_nodata_real: None,
            src_nodata_imag: None,
            dst_nodata_real: None,
            dst_nodata_imag: None,
            transformer: None,
            progress: Some(no_progress()),
            warp_options: WarpOptionList::new(),
            src_per_band_validity_mask: None,
            src_validity_mask: None,
            src_density_mask: None,
            dst_validity_mask: None,
            dst_density_mask: None,
        }
    }
}

impl std::fmt::Debug for WarpOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarpOptions")
            .field("resample_alg", &self.resample_alg)
            .field("working_data_type", &self.working_data_type)
            .field("memory_limit", &self.memory_limit)
            .field("has_src", &self.src.is_some())
            .field("has_dst", &self.dst.is_some())
            .field("src_bands", &self.src_bands)
            .field("dst_bands", &self.dst_bands)
            .field("src_nodata_real", &self.src_nodata_real)
            .field("dst_nodata_real", &self.dst_nodata_real)
            .field("has_transformer", &self.transformer.is_some())
            .field("warp_options", &self.warp_options)
            .finish_non_exhaustive()
    }
}

impl WarpOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_source(mut self, src: Arc<dyn RasterStore>) -> Self {
        self.src = Some(src);
        self
    }

    #[must_use]
    pub fn with_destination(mut self, dst: Arc<dyn RasterStore>) -> Self {
        self.dst = Some(dst);
        self
    }

    /// Map `src_bands[i]` onto `dst_bands[i]`.
    #[must_use]
    pub fn with_bands(mut self, src_bands: Vec<usize>, dst_bands: Vec<usize>) -> Self {
        self.src_bands = src_bands;
        self.dst_bands = dst_bands;
        self
    }

    #[must_use]
    pub fn with_resample_alg(mut self, alg: ResampleAlg) -> Self {
        self.resample_alg = alg;
        self
    }

    #[must_use]
    pub fn with_working_data_type(mut self, data_type: DataType) -> Self {
        self.working_data_type = Some(data_type);
        self
    }

    #[must_use]
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = bytes;
        self
    }

    #[must_use]
    pub fn with_transformer(mut self, transformer: Arc<dyn Transformer>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: impl Fn(f64) -> bool + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    /// Source nodata, one real value per band, imaginary parts zero.
    #[must_use]
    pub fn with_src_nodata(mut self, real: Vec<f64>) -> Self {
        self.src_nodata_imag = Some(vec![0.0; real.len()]);
        self.src_nodata_real = Some(real);
        self
    }

    /// Destination nodata, one real value per band, imaginary parts zero.
    #[must_use]
    pub fn with_dst_nodata(mut self, real: Vec<f64>) -> Self {
        self.dst_nodata_imag = Some(vec![0.0; real.len()]);
        self.dst_nodata_real = Some(real);
        self
    }

    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.warp_options.set(key, value);
        self
    }

    #[must_use]
    pub fn with_src_per_band_validity_mask(mut self, funcs: Vec<Arc<dyn ValidityMaskFunc>>) -> Self {
        self.src_per_band_validity_mask = Some(funcs);
        self
    }

    #[must_use]
    pub fn with_src_validity_mask(mut self, func: Arc<dyn ValidityMaskFunc>) -> Self {
        self.src_validity_mask = Some(func);
        self
    }

    #[must_use]
    pub fn with_src_density_mask(mut self, func: Arc<dyn DensityMaskFunc>) -> Self {
        self.src_density_mask = Some(func);
        self
    }

    #[must_use]
    pub fn with_dst_validity_mask(mut self, func: Arc<dyn ValidityMaskFunc>) -> Self {
        self.dst_validity_mask = Some(func);
        self
    }

    #[must_use]
    pub fn with_dst_density_mask(mut self, func: Arc<dyn DensityMaskFunc>) -> Self {
        self.dst_density_mask = Some(func);
        self
    }

    #[must_use]
    pub fn band_count(&self) -> usize {
        self.src_bands.len()
    }

    /// Fill in band mapping, working type and memory limit where missing.
    pub fn apply_defaults(&mut self) {
        if self.src_bands.is_empty() && self.dst_bands.is_empty() {
            if let (Some(src), Some(dst)) = (&self.src, &self.dst) {
                if src.band_count() == dst.band_count() {
                    self.src_bands = (1..=src.band_count()).collect();
                    self.dst_bands = self.src_bands.clone();
                    debug!(bands = self.src_bands.len(), "defaulted band mapping");
                }
            }
        }

        if self.working_data_type.is_none() {
            if let (Some(dst), Some(&band)) = (&self.dst, self.dst_bands.first()) {
                self.working_data_type = dst.band_data_type(band);
            }
        }

        if self.memory_limit == 0 {
            self.memory_limit = DEFAULT_MEMORY_LIMIT;
        }
    }

    /// Every invariant violation, one message each.
    #[must_use]
    pub fn diagnostics(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let band_count = self.band_count();

        if self.memory_limit < MIN_MEMORY_LIMIT {
            problems.push(format!(
                "memory limit {} is unreasonably small (minimum {MIN_MEMORY_LIMIT} bytes)",
                self.memory_limit
            ));
        }
        if self.working_data_type.is_none() {
            problems.push("working data type is not set".to_string());
        }
        if self.src.is_none() {
            problems.push("source raster is not set".to_string());
        }
        if self.dst.is_none() {
            problems.push("destination raster is not set".to_string());
        }
        if band_count == 0 {
            problems.push("no bands configured".to_string());
        }
        if self.src_bands.len() != self.dst_bands.len() {
            problems.push(format!(
                "{} source bands but {} destination bands",
                self.src_bands.len(),
                self.dst_bands.len()
            ));
        }

        if let Some(src) = &self.src {
            for (i, &band) in self.src_bands.iter().enumerate() {
                if band < 1 || band > src.band_count() {
                    problems.push(format!(
                        "src_bands[{i}] = {band} is out of range for the source raster"
                    ));
                }
            }
        }
        if let Some(dst) = &self.dst {
            for (i, &band) in self.dst_bands.iter().enumerate() {
                if band < 1 || band > dst.band_count() {
                    problems.push(format!(
                        "dst_bands[{i}] = {band} is out of range for the destination raster"
                    ));
                } else if !dst.is_band_writable(band) {
                    problems.push(format!("destination band {band} is read-only"));
                }
            }
        }

        check_nodata(
            "src",
            self.src_nodata_real.as_deref(),
            self.src_nodata_imag.as_deref(),
            band_count,
            &mut problems,
        );
        check_nodata(
            "dst",
            self.dst_nodata_real.as_deref(),
            self.dst_nodata_imag.as_deref(),
            band_count,
            &mut problems,
        );

        if let Some(funcs) = &self.src_per_band_validity_mask {
            if funcs.len() != band_count {
                problems.push(format!(
                    "{} per-band validity generators for {band_count} bands",
                    funcs.len()
                ));
            }
        }

        if self.progress.is_none() {
            problems.push("progress callback is not set".to_string());
        }
        if self.transformer.is_none() {
            problems.push("transformer is not set".to_string());
        }

        if let Some(init) = self.warp_options.get(INIT_DEST) {
            if InitDest::parse(init).is_none() {
                problems.push(format!("{INIT_DEST}={init} is not NO_DATA or a number"));
            }
        }

        problems
    }

    /// Apply defaults to a copy of these options and validate it.
    ///
    /// # Errors
    /// Returns [`WarpError::Config`] listing every violated invariant.
    pub fn validated(&self) -> Result<ValidatedOptions> {
        let mut options = self.clone();
        options.apply_defaults();

        let problems = options.diagnostics();
        if !problems.is_empty() {
            return Err(WarpError::config(problems.join("; ")));
        }

        // Presence of every field below was checked by diagnostics().
        match (
            options.src.clone(),
            options.dst.clone(),
            options.transformer.clone(),
            options.progress.clone(),
            options.working_data_type,
        ) {
            (Some(src), Some(dst), Some(transformer), Some(progress), Some(working_data_type)) => {
                let init_dest = options.warp_options.get(INIT_DEST).and_then(InitDest::parse);
                Ok(ValidatedOptions {
                    src,
                    dst,
                    transformer,
                    progress,
                    working_data_type,
                    init_dest,
                    options,
                })
            }
            _ => Err(WarpError::internal("validated options lost a required field")),
        }
    }
}

fn check_nodata(
    side: &str,
    real: Option<&[f64]>,
    imag: Option<&[f64]>,
    band_count: usize,
    problems: &mut Vec<String>,
) {
    match (real, imag) {
        (Some(_), None) => problems.push(format!(
            "{side} nodata real parts are set but imaginary parts are not"
        )),
        (Some(re), Some(im)) if re.len() != band_count || im.len() != band_count => {
            problems.push(format!(
                "{side} nodata has {} real and {} imaginary values for {band_count} bands",
                re.len(),
                im.len()
            ));
        }
        _ => {}
    }
}

/// Options that passed validation, with required handles unwrapped.
#[derive(Clone)]
pub struct ValidatedOptions {
    pub(crate) src: Arc<dyn RasterStore>,
    pub(crate) dst: Arc<dyn RasterStore>,
    pub(crate) transformer: Arc<dyn Transformer>,
    pub(crate) progress: ProgressFunc,
    pub(crate) working_data_type: DataType,
    pub(crate) init_dest: Option<InitDest>,
    pub(crate) options: WarpOptions,
}

impl ValidatedOptions {
    /// The defaulted options this configuration was built from.
    #[must_use]
    pub fn options(&self) -> &WarpOptions {
        &self.options
    }

    #[must_use]
    pub fn working_data_type(&self) -> DataType {
        self.working_data_type
    }

    #[must_use]
    pub fn band_count(&self) -> usize {
        self.options.band_count()
    }

    #[must_use]
    pub fn memory_limit(&self) -> usize {
        self.options.memory_limit
    }

    #[must_use]
    pub fn resample_alg(&self) -> ResampleAlg {
        self.options.resample_alg
    }

    /// Fill value for destination band `index` (0-based) under `INIT_DEST`.
    ///
    /// `NO_DATA` without configured destination nodata fills with zero.
    #[must_use]
    pub fn init_value(&self, index: usize) -> Option<(f64, f64)> {
        match self.init_dest? {
            InitDest::Value { real, imag } => Some((real, imag)),
            InitDest::NoData => {
                let real = self
                    .options
                    .dst_nodata_real
                    .as_ref()
                    .and_then(|v| v.get(index).copied());
                let imag = self
                    .options
                    .dst_nodata_imag
                    .as_ref()
                    .and_then(|v| v.get(index).copied());
                Some((real.unwrap_or(0.0), imag.unwrap_or(0.0)))
            }
        }
    }
}

impl std::fmt::Debug for ValidatedOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatedOptions")
            .field("working_data_type", &self.working_data_type)
            .field("init_dest", &self.init_dest)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
