use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::fits::{Header, MefFile};
use crate::plane::{Plane, Region};

/// Raw header and pixel access for one exposure, independent of camera.
pub trait ExposureSource: Send + Sync {
    fn filename(&self) -> &str;

    fn primary_header(&self) -> &Header;

    /// Image extension names after the primary, in file order.
    fn extensions(&self) -> Vec<String>;

    /// HDU number of `ext` in the image file.
    fn image_hdu(&self, ext: &str) -> Result<i64>;

    fn header(&self, ext: &str) -> Result<&Header>;

    /// `(width, height)` of `ext`.
    fn shape(&self, ext: &str) -> Result<(usize, usize)>;

    fn read_image(&self, ext: &str, region: Option<Region>) -> Result<Plane<f64>>;

    fn read_weight(&self, ext: &str, region: Option<Region>) -> Result<Plane<f64>>;

    fn read_mask(&self, ext: &str, region: Option<Region>) -> Result<Plane<f64>>;
}

fn swap_product(path: &Path, code: &str) -> Result<PathBuf> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Bad image path {}", path.display()))?;
    for from in ["ooi", "oki"] {
        if name.contains(from) {
            return Ok(path.with_file_name(name.replacen(from, code, 1)));
        }
    }
    bail!("Cannot derive the {} file name from {}", code, path.display())
}

/// CP weight-map file next to `image`: `ooi`/`oki` becomes `oow`.
pub fn weight_filename<P: AsRef<Path>>(image: P) -> Result<PathBuf> {
    swap_product(image.as_ref(), "oow")
}

/// CP data-quality file next to `image`: `ooi`/`oki` becomes `ood`.
pub fn bitmask_filename<P: AsRef<Path>>(image: P) -> Result<PathBuf> {
    swap_product(image.as_ref(), "ood")
}

// ── FITS files ─────────────────────────────────────────────────────────────

/// A CP exposure on disk. Image headers are read once at open; the weight and
/// mask files are opened on each read.
#[derive(Debug, Clone)]
pub struct FitsExposure {
    filename: String,
    image: MefFile,
    weight_path: PathBuf,
    mask_path: PathBuf,
}

impl FitsExposure {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let image = MefFile::open(path)?;
        Ok(Self {
            filename: path.display().to_string(),
            weight_path: weight_filename(path)?,
            mask_path: bitmask_filename(path)?,
            image,
        })
    }

    fn read_companion(&self, path: &Path, ext: &str, region: Option<Region>) -> Result<Plane<f64>> {
        let file = MefFile::open(path)?;
        let idx = file.hdu_index(ext)?;
        file.read_image(idx, region)
    }
}

impl ExposureSource for FitsExposure {
    fn filename(&self) -> &str {
        &self.filename
    }

    fn primary_header(&self) -> &Header {
        self.image.primary_header()
    }

    fn extensions(&self) -> Vec<String> {
        self.image.extension_names()
    }

    fn image_hdu(&self, ext: &str) -> Result<i64> {
        Ok(self.image.hdu_index(ext)? as i64)
    }

    fn header(&self, ext: &str) -> Result<&Header> {
        let idx = self.image.hdu_index(ext)?;
        Ok(&self.image.hdus()[idx].header)
    }

    fn shape(&self, ext: &str) -> Result<(usize, usize)> {
        let idx = self.image.hdu_index(ext)?;
        self.image.hdus()[idx]
            .shape()
            .with_context(|| format!("Extension {} of {} has no image", ext, self.filename))
    }

    fn read_image(&self, ext: &str, region: Option<Region>) -> Result<Plane<f64>> {
        let idx = self.image.hdu_index(ext)?;
        self.image.read_image(idx, region)
    }

    fn read_weight(&self, ext: &str, region: Option<Region>) -> Result<Plane<f64>> {
        self.read_companion(&self.weight_path, ext, region)
    }

    fn read_mask(&self, ext: &str, region: Option<Region>) -> Result<Plane<f64>> {
        self.read_companion(&self.mask_path, ext, region)
    }
}

// ── In memory ──────────────────────────────────────────────────────────────

/// One CCD held in memory.
#[derive(Debug, Clone)]
pub struct MemoryCcd {
    pub name: String,
    pub header: Header,
    pub image: Plane<f64>,
    pub weight: Plane<f64>,
    pub mask: Plane<i32>,
}

/// An exposure assembled in memory, for tests and for callers that decode
/// pixels themselves.
#[derive(Debug, Clone)]
pub struct MemoryExposure {
    pub filename: String,
    pub primary: Header,
    pub ccds: Vec<MemoryCcd>,
}

impl MemoryExposure {
    fn ccd(&self, ext: &str) -> Result<(usize, &MemoryCcd)> {
        self.ccds
            .iter()
            .enumerate()
            .find(|(_, c)| c.name.eq_ignore_ascii_case(ext.trim()))
            .with_context(|| format!("No extension {} in {}", ext, self.filename))
    }
}

fn maybe_crop<T: Copy>(plane: &Plane<T>, region: Option<Region>) -> Result<Plane<T>> {
    match region {
        Some(r) => plane.crop(&r),
        None => Ok(plane.clone()),
    }
}

impl ExposureSource for MemoryExposure {
    fn filename(&self) -> &str {
        &self.filename
    }

    fn primary_header(&self) -> &Header {
        &self.primary
    }

    fn extensions(&self) -> Vec<String> {
        self.ccds.iter().map(|c| c.name.clone()).collect()
    }

    fn image_hdu(&self, ext: &str) -> Result<i64> {
        Ok(self.ccd(ext)?.0 as i64 + 1)
    }

    fn header(&self, ext: &str) -> Result<&Header> {
        Ok(&self.ccd(ext)?.1.header)
    }

    fn shape(&self, ext: &str) -> Result<(usize, usize)> {
        let ccd = self.ccd(ext)?.1;
        Ok((ccd.image.width(), ccd.image.height()))
    }

    fn read_image(&self, ext: &str, region: Option<Region>) -> Result<Plane<f64>> {
        maybe_crop(&self.ccd(ext)?.1.image, region)
    }

    fn read_weight(&self, ext: &str, region: Option<Region>) -> Result<Plane<f64>> {
        maybe_crop(&self.ccd(ext)?.1.weight, region)
    }

    fn read_mask(&self, ext: &str, region: Option<Region>) -> Result<Plane<f64>> {
        Ok(maybe_crop(&self.ccd(ext)?.1.mask, region)?.map(|m| m as f64))
    }
}
