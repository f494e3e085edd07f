//! Camera-specific access to a CCD exposure.
//!
//! Pixel and header data come from an [`ExposureSource`] (FITS files on disk,
//! or in-memory planes in tests). An [`ImageAccessor`] carries the per-camera
//! conventions layered on top: which header cards hold the band, exposure
//! number and boresight, how the image and weight are scaled to electrons, and
//! how the CP data-quality mask is remapped.
//!
//! One implementation exists per [`Camera`]; [`accessor_for`] selects it.

mod cameras;
mod source;

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use tracing::debug;

use crate::astrometry::{dms_to_dec, hms_to_ra};
use crate::camera::Camera;
use crate::catalogs::ps1_band_index;
use crate::fits::Header;
use crate::plane::{Plane, Region};
use crate::refstars::{ColorTerms, Ps1Transform};
use crate::stats::median;

pub use cameras::{DecamAccessor, MegaPrimeAccessor, MosaicAccessor, NinetyPrimeAccessor};
pub use source::{bitmask_filename, weight_filename, ExposureSource, FitsExposure, MemoryCcd, MemoryExposure};

// ── Data-quality bits ──────────────────────────────────────────────────────

pub const DQ_BADPIX: i32 = 0x1;
pub const DQ_SATUR: i32 = 0x2;
pub const DQ_CR: i32 = 0x10;
pub const DQ_BLEED: i32 = 0x40;
pub const DQ_TRANS: i32 = 0x80;

/// Map CP data-quality codes (1-8) onto bit flags. Unknown codes become 0.
pub fn remap_dq_cp_codes(mask: &Plane<i32>) -> Plane<i32> {
    mask.map(|code| match code {
        1 | 2 | 6 => DQ_BADPIX,
        3 => DQ_SATUR,
        4 => DQ_BLEED,
        5 => DQ_CR,
        7 | 8 => DQ_TRANS,
        _ => 0,
    })
}

/// Leading numeric components of a CP pipeline version such as `V4.8.2a`.
pub fn parse_plver(plver: &str) -> Vec<u32> {
    plver
        .trim()
        .trim_start_matches(['V', 'v'])
        .split('.')
        .map_while(|part| {
            let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().ok()
        })
        .collect()
}

/// DECam CP versions from V3.5 on write data-quality codes instead of bits.
pub fn decam_has_dq_codes(plver: &str) -> bool {
    parse_plver(plver).as_slice() >= [3u32, 5].as_slice()
}

// ── Amp corrections ────────────────────────────────────────────────────────

/// Per-amplifier relative zeropoint offsets, keyed by band and CCD name.
///
/// Amps are the four quadrants of the full CCD in the order lower-left,
/// lower-right, upper-left, upper-right.
#[derive(Debug, Clone, Default)]
pub struct AmpCorrection {
    pub offsets: BTreeMap<(String, String), [f64; 4]>,
}

impl AmpCorrection {
    pub fn insert(&mut self, band: &str, ccdname: &str, dzp: [f64; 4]) {
        self.offsets.insert((band.to_string(), ccdname.to_string()), dzp);
    }

    /// Scale `img` by `10^(-0.4 dzp)` and `invvar` by the inverse square, per
    /// amp. `full` is the full CCD size and `origin` the corner of the region
    /// the planes were read from.
    pub fn apply(
        &self,
        band: &str,
        ccdname: &str,
        full: (usize, usize),
        origin: (usize, usize),
        img: &mut Plane<f64>,
        invvar: &mut Plane<f64>,
    ) {
        let Some(dzp) = self.offsets.get(&(band.to_string(), ccdname.to_string())) else {
            return;
        };
        debug!("Applying amp correction {:?} to {}", dzp, ccdname);
        let (fw, fh) = full;
        for y in 0..img.height() {
            let top = (y + origin.1) >= fh / 2;
            for x in 0..img.width() {
                let right = (x + origin.0) >= fw / 2;
                let amp = (top as usize) * 2 + right as usize;
                let s = 10f64.powf(-0.4 * dzp[amp]);
                img.set(x, y, img.get(x, y) * s);
                invvar.set(x, y, invvar.get(x, y) / (s * s));
            }
        }
    }
}

// ── Weight helpers ─────────────────────────────────────────────────────────

/// Zero masked weights, clip weights below `clip · median(wt > 0)` and clamp
/// negatives to zero.
pub fn clean_weight(wt: &mut Plane<f64>, mask: Option<&Plane<i32>>, clip: f64) {
    if let Some(mask) = mask {
        for (w, &m) in wt.data_mut().iter_mut().zip(mask.data()) {
            if m > 0 {
                *w = 0.0;
            }
        }
    }
    let positive: Vec<f64> = wt.data().iter().copied().filter(|&w| w > 0.0).collect();
    if !positive.is_empty() && clip > 0.0 {
        let thresh = clip * median(&positive);
        for w in wt.data_mut() {
            if *w < thresh {
                *w = 0.0;
            }
        }
    }
    for w in wt.data_mut() {
        if *w < 0.0 || !w.is_finite() {
            *w = 0.0;
        }
    }
}

/// Add the object shot noise to the read+sky variance:
/// `1 / (1/invvar + |img - sky_adu · exptime|)`, zeroing masked and non-finite pixels.
pub fn remap_invvar_shotnoise(
    invvar: &Plane<f64>,
    img: &Plane<f64>,
    mask: &Plane<i32>,
    sky_adu: f64,
    exptime: f64,
) -> Plane<f64> {
    let sky = sky_adu * exptime;
    debug!("Remapping weight map; median image {:.2} vs sky {:.2}", median(img.data()), sky);
    let mut out = invvar.clone();
    for (i, w) in out.data_mut().iter_mut().enumerate() {
        let var = 1.0 / invvar.data()[i] + (img.data()[i] - sky).abs();
        let wt = 1.0 / var;
        *w = if wt.is_finite() && mask.data()[i] == 0 { wt } else { 0.0 };
    }
    out
}

/// Shared header parsing of a sexagesimal boresight, RA/DEC first and
/// TELRA/TELDEC as fallback.
fn sexagesimal_bore(primhdr: &Header) -> Result<(f64, f64)> {
    let parse = |rk: &str, dk: &str| -> Option<(f64, f64)> {
        let ra = hms_to_ra(&primhdr.get_str(rk)?).ok()?;
        let dec = dms_to_dec(&primhdr.get_str(dk)?).ok()?;
        Some((ra, dec))
    };
    parse("RA", "DEC")
        .or_else(|| parse("TELRA", "TELDEC"))
        .context("Failed to parse RA or TELRA in primary header to get telescope boresight")
}

// ── The accessor trait ─────────────────────────────────────────────────────

/// Per-camera conventions for reading a CCD. Default methods implement the
/// behavior shared by most cameras.
pub trait ImageAccessor: Send + Sync {
    fn camera(&self) -> Camera;

    /// Observed band from the primary header.
    fn band(&self, primhdr: &Header) -> Result<String> {
        let filter = primhdr.require_str("FILTER")?;
        filter
            .split_whitespace()
            .next()
            .map(str::to_string)
            .context("Empty FILTER card")
    }

    /// Whether the CP astrometric calibration succeeded.
    fn good_wcs(&self, primhdr: &Header) -> bool {
        primhdr
            .get_str("WCSCAL")
            .map(|s| s.trim().to_ascii_lowercase().starts_with("success"))
            .unwrap_or(false)
    }

    fn expnum(&self, primhdr: &Header) -> Result<i64> {
        primhdr.require_i64("EXPNUM")
    }

    fn ut(&self, primhdr: &Header) -> Result<String> {
        primhdr.require_str("TIME-OBS")
    }

    /// Telescope boresight `(ra, dec)` in degrees.
    fn radec_bore(&self, primhdr: &Header) -> Result<(f64, f64)> {
        sexagesimal_bore(primhdr)
    }

    fn gain(&self, hdr: &Header) -> Result<f64> {
        hdr.require_f64("GAIN")
    }

    /// CP seeing estimate in pixels.
    fn fwhm(&self, hdr: &Header) -> Result<f64> {
        hdr.require_f64("FWHM")
    }

    /// Usable part of a CCD, or `None` for the whole chip.
    fn good_subregion(&self, _ccdname: &str, _width: usize, _height: usize) -> Option<Region> {
        None
    }

    /// Normalized extension name.
    fn extension_name(&self, raw: &str) -> String {
        raw.trim().to_string()
    }

    /// Convert the image to the units the fit is done in.
    fn scale_image(&self, _img: &mut Plane<f64>, _exptime: f64) {}

    fn scale_weight(&self, _wt: &mut Plane<f64>, _exptime: f64) {}

    /// Final inverse variance from the scaled weight.
    fn remap_invvar(
        &self,
        invvar: Plane<f64>,
        _primhdr: &Header,
        _img: &Plane<f64>,
        _mask: &Plane<i32>,
    ) -> Result<Plane<f64>> {
        Ok(invvar)
    }

    fn remap_mask(&self, mask: Plane<i32>, _primhdr: &Header) -> Plane<i32> {
        mask
    }

    /// Fraction of the median positive weight below which weights are zeroed.
    fn weight_clip(&self) -> f64 {
        0.1
    }

    /// Bitmask for `ext`, remapped to bit flags.
    fn read_mask(
        &self,
        src: &dyn ExposureSource,
        ext: &str,
        region: Option<Region>,
        primhdr: &Header,
    ) -> Result<Plane<i32>> {
        let raw = src.read_mask(ext, region)?.map(|v| v as i32);
        Ok(self.remap_mask(raw, primhdr))
    }

    /// Unscaled weight map for `ext` with masked and near-zero pixels zeroed.
    fn read_weight(
        &self,
        src: &dyn ExposureSource,
        ext: &str,
        region: Option<Region>,
        mask: &Plane<i32>,
    ) -> Result<Plane<f64>> {
        let mut wt = src.read_weight(ext, region)?;
        clean_weight(&mut wt, Some(mask), self.weight_clip());
        Ok(wt)
    }

    /// Whether per-amp zeropoint offsets apply to this camera.
    fn uses_amp_correction(&self) -> bool {
        false
    }

    /// PS1 band whose magnitudes stand in for `band`.
    fn ps1_band<'b>(&self, band: &'b str) -> &'b str {
        band
    }

    /// How PS1 magnitudes become `band` magnitudes.
    fn ps1_transform(&self, band: &str, colorterms: &ColorTerms) -> Result<Ps1Transform> {
        let ps1 = self.ps1_band(band);
        let Some(idx) = ps1_band_index(ps1) else {
            bail!("No PS1 band for {:?} on camera {}", band, self.camera());
        };
        Ok(Ps1Transform {
            ps1_band: idx,
            colorterm: colorterms.coeffs.get(ps1).cloned().unwrap_or_default(),
        })
    }
}

/// The accessor implementing `camera`'s conventions.
pub fn accessor_for(camera: Camera) -> Box<dyn ImageAccessor> {
    match camera {
        Camera::Decam => Box::new(DecamAccessor),
        Camera::Mosaic => Box::new(MosaicAccessor),
        Camera::NinetyPrime => Box::new(NinetyPrimeAccessor),
        Camera::MegaPrime => Box::new(MegaPrimeAccessor),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plver() {
        assert_eq!(parse_plver("V4.8.2a"), vec![4, 8, 2]);
        assert!(decam_has_dq_codes("V3.5"));
        assert!(decam_has_dq_codes("V4.8.2a"));
        assert!(!decam_has_dq_codes("V3.4.1"));
        assert!(!decam_has_dq_codes("V2.10"));
    }

    #[test]
    fn test_remap_cp_codes() {
        let mask = Plane::new(9, 1, (0..9).collect()).unwrap();
        let out = remap_dq_cp_codes(&mask);
        assert_eq!(out.data(), &[0, 1, 1, 2, 64, 16, 1, 128, 128]);
    }

    #[test]
    fn test_clean_weight() {
        let mut wt = Plane::new(5, 1, vec![1.0, 1.1, 0.05, -2.0, 0.9]).unwrap();
        let mask = Plane::new(5, 1, vec![0, 4, 0, 0, 0]).unwrap();
        clean_weight(&mut wt, Some(&mask), 0.1);
        assert_eq!(wt.data(), &[1.0, 0.0, 0.0, 0.0, 0.9]);
    }

    #[test]
    fn test_shotnoise() {
        let invvar = Plane::filled(2, 1, 0.25);
        let img = Plane::new(2, 1, vec![110.0, 100.0]).unwrap();
        let mask = Plane::new(2, 1, vec![0, 1]).unwrap();
        let out = remap_invvar_shotnoise(&invvar, &img, &mask, 1.0, 100.0);
        assert!((out.get(0, 0) - 1.0 / 14.0).abs() < 1e-12);
        assert_eq!(out.get(1, 0), 0.0);
    }

    #[test]
    fn test_amp_correction_quadrants() {
        let mut amp = AmpCorrection::default();
        amp.insert("z", "CCD1", [0.0, 0.0, 0.0, 2.5]);
        let mut img = Plane::filled(4, 4, 10.0);
        let mut iv = Plane::filled(4, 4, 1.0);
        amp.apply("z", "CCD1", (4, 4), (0, 0), &mut img, &mut iv);
        assert_eq!(img.get(0, 0), 10.0);
        assert!((img.get(3, 3) - 1.0).abs() < 1e-12);
        assert!((iv.get(3, 3) - 100.0).abs() < 1e-9);
        amp.apply("g", "CCD1", (4, 4), (0, 0), &mut img, &mut iv);
        assert!((img.get(3, 3) - 1.0).abs() < 1e-12, "no entry for g");
    }

    #[test]
    fn test_sexagesimal_bore_fallback() {
        let mut h = Header::new();
        h.set("RA", "garbage", None);
        h.set("TELRA", "01:00:00", None);
        h.set("TELDEC", "-30:30:00", None);
        let (ra, dec) = sexagesimal_bore(&h).unwrap();
        assert!((ra - 15.0).abs() < 1e-12);
        assert!((dec + 30.5).abs() < 1e-12);
        assert!(sexagesimal_bore(&Header::new()).is_err());
    }
}
