use anyhow::{bail, Context, Result};
use tracing::debug;

use super::{clean_weight, decam_has_dq_codes, remap_dq_cp_codes, remap_invvar_shotnoise, ExposureSource, ImageAccessor};
use crate::camera::Camera;
use crate::fits::Header;
use crate::plane::{Plane, Region};
use crate::refstars::{ColorTerms, Ps1Transform};
use crate::stats::median;

/// Seeing from SEEINGP1, falling back to SEEINGP.
fn seeing_fwhm(hdr: &Header) -> Result<f64> {
    ["SEEINGP1", "SEEINGP"]
        .iter()
        .find_map(|k| hdr.get_f64(k))
        .context("No FWHM key in header")
}

// ── DECam ──────────────────────────────────────────────────────────────────

/// DECam CP images are in ADU and are used unscaled.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecamAccessor;

impl ImageAccessor for DecamAccessor {
    fn camera(&self) -> Camera {
        Camera::Decam
    }

    fn good_wcs(&self, primhdr: &Header) -> bool {
        let wcscal = primhdr
            .get_str("WCSCAL")
            .map(|s| s.trim().to_ascii_lowercase())
            .unwrap_or_default();
        // Some re-reductions report WCSCAL=Failed with a good SCAMP solution.
        wcscal.starts_with("success") || primhdr.get_i64("SCAMPFLG") == Some(0)
    }

    fn gain(&self, hdr: &Header) -> Result<f64> {
        Ok(0.5 * (hdr.require_f64("GAINA")? + hdr.require_f64("GAINB")?))
    }

    fn good_subregion(&self, ccdname: &str, _width: usize, height: usize) -> Option<Region> {
        // Only the left half of S7 is usable.
        (ccdname == "S7").then_some(Region {
            x0: 0,
            x1: 1023,
            y0: 0,
            y1: height,
        })
    }

    fn remap_mask(&self, mask: Plane<i32>, primhdr: &Header) -> Plane<i32> {
        match primhdr.get_str("PLVER") {
            Some(plver) if decam_has_dq_codes(&plver) => remap_dq_cp_codes(&mask),
            _ => mask,
        }
    }
}

// ── Mosaic3 ────────────────────────────────────────────────────────────────

/// Multiply e-/s images by the exposure time to get electrons.
fn scale_to_electrons(img: &mut Plane<f64>, exptime: f64) {
    for v in img.data_mut() {
        *v *= exptime;
    }
}

fn scale_weight_to_electrons(wt: &mut Plane<f64>, exptime: f64) {
    let s = exptime * exptime;
    for v in wt.data_mut() {
        *v /= s;
    }
}

fn shotnoise_invvar(invvar: Plane<f64>, primhdr: &Header, img: &Plane<f64>, mask: &Plane<i32>) -> Result<Plane<f64>> {
    let sky_adu = primhdr.require_f64("SKYADU")?;
    let exptime = primhdr.require_f64("EXPTIME")?;
    Ok(remap_invvar_shotnoise(&invvar, img, mask, sky_adu, exptime))
}

/// Mosaic3 (MzLS) CP images are in e-/s.
#[derive(Debug, Clone, Copy, Default)]
pub struct MosaicAccessor;

impl ImageAccessor for MosaicAccessor {
    fn camera(&self) -> Camera {
        Camera::Mosaic
    }

    fn band(&self, primhdr: &Header) -> Result<String> {
        let filter = primhdr.require_str("FILTER")?;
        let band = filter.split_whitespace().next().context("Empty FILTER card")?;
        Ok(if band == "zd" { "z" } else { band }.to_string())
    }

    fn expnum(&self, primhdr: &Header) -> Result<i64> {
        if let Some(e) = primhdr.get_i64("EXPNUM") {
            return Ok(e);
        }
        // Early exposures have blank EXPNUM; derive yymmddhhmmss from
        // OBSID = 'kp4m.20160125T082555'.
        let obsid = primhdr.require_str("OBSID")?;
        let stamp = obsid
            .trim()
            .split('.')
            .nth(1)
            .with_context(|| format!("Cannot parse OBSID {:?}", obsid))?
            .replace('T', "");
        let expnum = stamp
            .get(2..)
            .and_then(|s| s.parse::<i64>().ok())
            .with_context(|| format!("Cannot parse OBSID {:?}", obsid))?;
        debug!("Faked up EXPNUM {}", expnum);
        Ok(expnum)
    }

    fn fwhm(&self, hdr: &Header) -> Result<f64> {
        seeing_fwhm(hdr)
    }

    fn extension_name(&self, raw: &str) -> String {
        raw.trim().to_ascii_uppercase()
    }

    fn scale_image(&self, img: &mut Plane<f64>, exptime: f64) {
        scale_to_electrons(img, exptime);
    }

    fn scale_weight(&self, wt: &mut Plane<f64>, exptime: f64) {
        scale_weight_to_electrons(wt, exptime);
    }

    fn remap_invvar(
        &self,
        invvar: Plane<f64>,
        primhdr: &Header,
        img: &Plane<f64>,
        mask: &Plane<i32>,
    ) -> Result<Plane<f64>> {
        shotnoise_invvar(invvar, primhdr, img, mask)
    }

    fn remap_mask(&self, mask: Plane<i32>, _primhdr: &Header) -> Plane<i32> {
        remap_dq_cp_codes(&mask)
    }

    fn uses_amp_correction(&self) -> bool {
        true
    }

    fn ps1_transform(&self, band: &str, colorterms: &ColorTerms) -> Result<Ps1Transform> {
        if band == "D51" {
            return Ok(Ps1Transform {
                ps1_band: 0,
                colorterm: Vec::new(),
            });
        }
        let Some(idx) = crate::catalogs::ps1_band_index(band) else {
            bail!("No PS1 band for {:?} on camera {}", band, self.camera());
        };
        Ok(Ps1Transform {
            ps1_band: idx,
            colorterm: colorterms.coeffs.get(band).cloned().unwrap_or_default(),
        })
    }
}

// ── 90Prime ────────────────────────────────────────────────────────────────

/// 90Prime (BASS) CP images are in e-/s.
#[derive(Debug, Clone, Copy, Default)]
pub struct NinetyPrimeAccessor;

impl ImageAccessor for NinetyPrimeAccessor {
    fn camera(&self) -> Camera {
        Camera::NinetyPrime
    }

    fn band(&self, primhdr: &Header) -> Result<String> {
        let filter = primhdr.require_str("FILTER")?;
        let band = filter.split_whitespace().next().context("Empty FILTER card")?;
        Ok(band.replace("bokr", "r"))
    }

    /// `/descache/bass/20160710/d7580.0144.fits` becomes 75800144.
    fn expnum(&self, primhdr: &Header) -> Result<i64> {
        let acq = primhdr.require_str("DTACQNAM")?;
        let base = acq.rsplit('/').next().unwrap_or(&acq).replace(".fits", "").replace(".fz", "");
        let digits: String = base.chars().filter(|c| !c.is_ascii_lowercase() && *c != '.').collect();
        digits
            .parse()
            .with_context(|| format!("Cannot derive EXPNUM from DTACQNAM {:?}", acq))
    }

    fn ut(&self, primhdr: &Header) -> Result<String> {
        primhdr.require_str("UT")
    }

    fn gain(&self, _hdr: &Header) -> Result<f64> {
        Ok(1.4)
    }

    fn fwhm(&self, hdr: &Header) -> Result<f64> {
        seeing_fwhm(hdr)
    }

    fn extension_name(&self, raw: &str) -> String {
        raw.trim().to_ascii_uppercase()
    }

    fn scale_image(&self, img: &mut Plane<f64>, exptime: f64) {
        scale_to_electrons(img, exptime);
    }

    fn scale_weight(&self, wt: &mut Plane<f64>, exptime: f64) {
        scale_weight_to_electrons(wt, exptime);
    }

    fn remap_invvar(
        &self,
        invvar: Plane<f64>,
        primhdr: &Header,
        img: &Plane<f64>,
        mask: &Plane<i32>,
    ) -> Result<Plane<f64>> {
        shotnoise_invvar(invvar, primhdr, img, mask)
    }

    fn remap_mask(&self, mask: Plane<i32>, _primhdr: &Header) -> Plane<i32> {
        remap_dq_cp_codes(&mask)
    }

    fn uses_amp_correction(&self) -> bool {
        true
    }
}

// ── MegaPrime ──────────────────────────────────────────────────────────────

/// Per-pixel noise from the median absolute difference of pixels 5 apart on a
/// 10-pixel lattice: `1.4826 · MAD / √2`.
pub fn mad_sigma(img: &Plane<f64>) -> f64 {
    let (w, h) = (img.width(), img.height());
    let mut diffs = Vec::new();
    for y in (0..h.saturating_sub(5)).step_by(10) {
        for x in (0..w.saturating_sub(5)).step_by(10) {
            diffs.push((img.get(x, y) - img.get(x + 5, y + 5)).abs());
        }
    }
    1.4826 * median(&diffs) / 2f64.sqrt()
}

/// CFHT MegaPrime. There is no CP weight map; the weight is estimated from
/// the image itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct MegaPrimeAccessor;

impl ImageAccessor for MegaPrimeAccessor {
    fn camera(&self) -> Camera {
        Camera::MegaPrime
    }

    fn band(&self, primhdr: &Header) -> Result<String> {
        let filter = primhdr.require_str("FILTER")?;
        filter
            .chars()
            .next()
            .map(|c| c.to_string())
            .context("Empty FILTER card")
    }

    fn good_wcs(&self, _primhdr: &Header) -> bool {
        true
    }

    fn ut(&self, primhdr: &Header) -> Result<String> {
        primhdr.require_str("UTC-OBS")
    }

    fn radec_bore(&self, primhdr: &Header) -> Result<(f64, f64)> {
        Ok((primhdr.require_f64("RA_DEG")?, primhdr.require_f64("DEC_DEG")?))
    }

    fn scale_image(&self, img: &mut Plane<f64>, _exptime: f64) {
        for v in img.data_mut() {
            *v = *v as f32 as f64;
        }
    }

    fn remap_mask(&self, mask: Plane<i32>, _primhdr: &Header) -> Plane<i32> {
        // 1 = good in the CFIS masks
        mask.map(|m| 1 - m)
    }

    fn weight_clip(&self) -> f64 {
        0.01
    }

    fn read_weight(
        &self,
        src: &dyn ExposureSource,
        ext: &str,
        region: Option<Region>,
        _mask: &Plane<i32>,
    ) -> Result<Plane<f64>> {
        let img = src.read_image(ext, region)?;
        let sig1 = mad_sigma(&img);
        let mut wt = Plane::filled(img.width(), img.height(), 1.0 / (sig1 * sig1));
        clean_weight(&mut wt, None, self.weight_clip());
        Ok(wt)
    }

    fn ps1_band<'b>(&self, band: &'b str) -> &'b str {
        if band == "u" {
            "g"
        } else {
            band
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn primary(cards: &[(&str, &str)]) -> Header {
        let mut h = Header::new();
        for (k, v) in cards {
            h.set(k, *v, None);
        }
        h
    }

    #[test]
    fn test_bands() {
        let h = primary(&[("FILTER", "zd DECam SDSS c0004 9260.0 1520.0")]);
        assert_eq!(MosaicAccessor.band(&h).unwrap(), "z");
        assert_eq!(DecamAccessor.band(&h).unwrap(), "zd");
        let h = primary(&[("FILTER", "bokr")]);
        assert_eq!(NinetyPrimeAccessor.band(&h).unwrap(), "r");
        let h = primary(&[("FILTER", "g.MP9402")]);
        assert_eq!(MegaPrimeAccessor.band(&h).unwrap(), "g");
    }

    #[test]
    fn test_expnums() {
        let h = primary(&[("OBSID", "kp4m.20160125T082555")]);
        assert_eq!(MosaicAccessor.expnum(&h).unwrap(), 160125082555);
        let h = primary(&[("DTACQNAM", "/descache/bass/20160710/d7580.0144.fits")]);
        assert_eq!(NinetyPrimeAccessor.expnum(&h).unwrap(), 75800144);
        assert!(DecamAccessor.expnum(&h).is_err());
    }

    #[test]
    fn test_good_wcs() {
        assert!(DecamAccessor.good_wcs(&primary(&[("WCSCAL", "Successful")])));
        let mut h = primary(&[("WCSCAL", "Failed")]);
        assert!(!DecamAccessor.good_wcs(&h));
        assert!(!MosaicAccessor.good_wcs(&h));
        h.set("SCAMPFLG", 0i64, None);
        assert!(DecamAccessor.good_wcs(&h));
        assert!(!MosaicAccessor.good_wcs(&h));
        assert!(MegaPrimeAccessor.good_wcs(&Header::new()));
    }

    #[test]
    fn test_fwhm_fallback() {
        let mut h = Header::new();
        h.set("SEEINGP", 4.2, None);
        assert_eq!(MosaicAccessor.fwhm(&h).unwrap(), 4.2);
        h.set("SEEINGP1", 3.9, None);
        assert_eq!(NinetyPrimeAccessor.fwhm(&h).unwrap(), 3.9);
        assert!(NinetyPrimeAccessor.fwhm(&Header::new()).is_err());
    }

    #[test]
    fn test_decam_s7_subregion() {
        assert_eq!(DecamAccessor.good_subregion("N4", 2046, 4094), None);
        let r = DecamAccessor.good_subregion("S7", 2046, 4094).unwrap();
        assert_eq!((r.x0, r.x1, r.y0, r.y1), (0, 1023, 0, 4094));
    }

    #[test]
    fn test_decam_mask_remap_by_plver() {
        let mask = Plane::new(2, 1, vec![3, 5]).unwrap();
        let old = primary(&[("PLVER", "V3.4")]);
        assert_eq!(DecamAccessor.remap_mask(mask.clone(), &old).data(), &[3, 5]);
        let new = primary(&[("PLVER", "V4.8.2a")]);
        assert_eq!(DecamAccessor.remap_mask(mask, &new).data(), &[2, 16]);
    }

    #[test]
    fn test_ps1_transforms() {
        let mut ct = ColorTerms::default();
        ct.coeffs.insert("g".to_string(), vec![0.01, 0.1]);
        let t = MosaicAccessor.ps1_transform("D51", &ct).unwrap();
        assert_eq!(t.ps1_band, 0);
        assert!(t.colorterm.is_empty());
        let t = MegaPrimeAccessor.ps1_transform("u", &ct).unwrap();
        assert_eq!((t.ps1_band, t.colorterm.len()), (0, 2));
        assert!(DecamAccessor.ps1_transform("N501", &ct).is_err());
    }

    #[test]
    fn test_mad_sigma_flat() {
        let img = Plane::filled(100, 100, 7.0);
        assert_eq!(mad_sigma(&img), 0.0);
    }
}
