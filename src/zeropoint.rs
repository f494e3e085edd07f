//! CCD-level astrometric offsets and photometric zeropoint from per-star fits.
//!
//! The estimator is a pure function of the [`StarFit`] list and the matching
//! [`ReferenceStar`] rows: running it twice on the same input yields identical
//! output. Degenerate samples (no astrometric stars, no photometric stars
//! surviving the clip) produce zeros rather than errors.

use tracing::{debug, info};

use crate::photometry::StarFit;
use crate::refstars::ReferenceStar;
use crate::stats::{median, rms, sigma_clip, std};

/// Configuration for [`ZeropointEstimator`].
#[derive(Debug, Clone)]
pub struct ZeropointConfig {
    /// Sigma clip applied to astrometric residuals before the robust RMS.
    /// Default: 3.0
    pub astrom_clip: f64,
    /// Sigma clip applied to `catalog - instrumental` magnitudes.
    /// Default: 2.5
    pub photom_clip: f64,
    /// Flux S/N above which a fit counts towards `nstars_photom`.
    /// Default: 5.0
    pub sn_threshold: f64,
}

impl Default for ZeropointConfig {
    fn default() -> Self {
        Self {
            astrom_clip: 3.0,
            photom_clip: 2.5,
            sn_threshold: 5.0,
        }
    }
}

/// Exposure properties the zeropoint depends on.
#[derive(Debug, Clone)]
pub struct ExposureContext {
    pub exptime: f64,
    pub airmass: f64,
    /// Nominal zeropoint of the band.
    pub zp0: f64,
    /// Extinction coefficient of the band, mag per airmass.
    pub extinction: f64,
    /// Catalog magnitude window `(lo, hi)` for zeropoint stars. `None` uses no star.
    pub maglim: Option<(f64, f64)>,
}

/// Median offsets of catalog minus fitted positions, arcsec.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AstrometricOffsets {
    pub raoff: f64,
    pub decoff: f64,
    /// Population standard deviation of the raw residuals.
    pub rastddev: f64,
    pub decstddev: f64,
    /// RMS about zero of the sigma-clipped residuals.
    pub rarms: f64,
    pub decrms: f64,
    /// RA residuals surviving the clip.
    pub nastrom: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhotometricZeropoint {
    /// Median of clipped `catalog - instrumental` magnitudes; 0 when unavailable.
    pub zpt: f64,
    /// `zpt - zp0`.
    pub phoff: f64,
    /// Standard deviation of the clipped sample.
    pub phrms: f64,
    pub transp: f64,
    /// Fits with flux S/N above the threshold, independent of the clip.
    pub nphotom: usize,
    /// Stars left after clipping.
    pub nclipped: usize,
}

impl PhotometricZeropoint {
    /// Factor converting image units to nanomaggies at this zeropoint.
    /// 1 when no zeropoint was measured.
    pub fn nanomaggy_scale(&self) -> f64 {
        if self.zpt == 0.0 {
            1.0
        } else {
            10f64.powf((self.zpt - 22.5) / 2.5)
        }
    }
}

/// Derived per-star quantities, one per [`StarFit`], in fit order.
#[derive(Debug, Clone, PartialEq)]
pub struct StarPhotometry {
    pub fit: StarFit,
    pub refstar: ReferenceStar,
    pub flux_sn: f64,
    /// `-2.5 log10(flux / exptime)`; 0 for non-positive flux.
    pub instpsfmag: f64,
    pub dpsfmag: f64,
    /// `instpsfmag + zpt` when a zeropoint was measured, else 0.
    pub psfmag: f64,
    /// Catalog minus fitted position, arcsec.
    pub raoff: f64,
    pub decoff: f64,
    /// Mask value under the fitted position. Filled in by the caller.
    pub bitmask: i32,
    /// Aperture sums in increasing diameter. Filled in by the caller.
    pub apflux: Vec<f64>,
    pub apflux_err: Vec<f64>,
}

impl StarPhotometry {
    /// Gaia position when present, else PS1.
    pub fn radec(&self) -> (f64, f64) {
        self.refstar.catalog_radec()
    }
}

/// Output of [`ZeropointEstimator::estimate`].
#[derive(Debug, Clone, PartialEq)]
pub struct ZeropointEstimate {
    pub astrometry: AstrometricOffsets,
    pub photometry: PhotometricZeropoint,
    pub stars: Vec<StarPhotometry>,
}

pub struct ZeropointEstimator<'a> {
    config: &'a ZeropointConfig,
    ctx: &'a ExposureContext,
}

impl<'a> ZeropointEstimator<'a> {
    pub fn new(config: &'a ZeropointConfig, ctx: &'a ExposureContext) -> Self {
        Self { config, ctx }
    }

    /// `refs` is the full reference list; each fit points into it by `iref`.
    pub fn estimate(&self, fits: &[StarFit], refs: &[ReferenceStar]) -> ZeropointEstimate {
        let mut stars: Vec<StarPhotometry> = fits.iter().map(|f| self.star_photometry(f, &refs[f.iref])).collect();

        let astrometry = self.astrometric_offsets(&stars);
        let photometry = self.photometric_zeropoint(&stars);

        if photometry.zpt != 0.0 {
            for s in stars.iter_mut().filter(|s| s.instpsfmag != 0.0) {
                s.psfmag = s.instpsfmag + photometry.zpt;
            }
        }

        ZeropointEstimate {
            astrometry,
            photometry,
            stars,
        }
    }

    fn star_photometry(&self, fit: &StarFit, refstar: &ReferenceStar) -> StarPhotometry {
        let flux_sn = if fit.dflux == 0.0 { 0.0 } else { fit.flux / fit.dflux };
        let (instpsfmag, dpsfmag) = if fit.flux > 0.0 {
            (
                -2.5 * (fit.flux / self.ctx.exptime).log10(),
                (2.5 / std::f64::consts::LN_10 * fit.dflux / fit.flux).abs(),
            )
        } else {
            (0.0, 0.0)
        };
        let cosdec = refstar.dec_now.to_radians().cos();
        StarPhotometry {
            fit: fit.clone(),
            refstar: refstar.clone(),
            flux_sn,
            instpsfmag,
            dpsfmag,
            psfmag: 0.0,
            raoff: (refstar.ra_now - fit.ra_fit) * 3600.0 * cosdec,
            decoff: (refstar.dec_now - fit.dec_fit) * 3600.0,
            bitmask: 0,
            apflux: Vec::new(),
            apflux_err: Vec::new(),
        }
    }

    fn astrometric_offsets(&self, stars: &[StarPhotometry]) -> AstrometricOffsets {
        let (dra, ddec): (Vec<f64>, Vec<f64>) = stars
            .iter()
            .filter(|s| s.refstar.astrom)
            .map(|s| (s.raoff, s.decoff))
            .unzip();
        if dra.is_empty() {
            debug!("No astrometric reference stars");
            return AstrometricOffsets::default();
        }

        let k = self.config.astrom_clip;
        let ra_clip = sigma_clip(&dra, k, k).kept;
        let dec_clip = sigma_clip(&ddec, k, k).kept;
        let out = AstrometricOffsets {
            raoff: median(&dra),
            decoff: median(&ddec),
            rastddev: std(&dra),
            decstddev: std(&ddec),
            rarms: rms(&ra_clip),
            decrms: rms(&dec_clip),
            nastrom: ra_clip.len(),
        };
        debug!(
            "RA, Dec offsets {:.4}, {:.4} arcsec; stddev {:.4}, {:.4}; rms {:.4}, {:.4}",
            out.raoff, out.decoff, out.rastddev, out.decstddev, out.rarms, out.decrms
        );
        out
    }

    fn photometric_zeropoint(&self, stars: &[StarPhotometry]) -> PhotometricZeropoint {
        let nphotom = stars.iter().filter(|s| s.flux_sn > self.config.sn_threshold).count();
        if !stars.is_empty() {
            let sn: Vec<f64> = stars.iter().map(|s| s.flux_sn).collect();
            let lo = sn.iter().cloned().fold(f64::INFINITY, f64::min);
            let hi = sn.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            debug!("Flux S/N min/median/max: {:.1} / {:.1} / {:.1}", lo, median(&sn), hi);
        }

        let mut out = PhotometricZeropoint {
            nphotom,
            ..Default::default()
        };
        let Some((maglo, maghi)) = self.ctx.maglim else {
            return out;
        };

        let dmag: Vec<f64> = stars
            .iter()
            .filter(|s| s.refstar.photom)
            .filter(|s| s.refstar.legacy_survey_mag > maglo && s.refstar.legacy_survey_mag < maghi)
            .map(|s| s.refstar.legacy_survey_mag - s.instpsfmag)
            .filter(|d| d.is_finite())
            .collect();
        if dmag.is_empty() {
            return out;
        }

        let k = self.config.photom_clip;
        let clipped = sigma_clip(&dmag, k, k).kept;
        debug!("Zeropoint: {} good stars, {} after sigma-clipping", dmag.len(), clipped.len());
        if clipped.is_empty() {
            return out;
        }

        out.zpt = median(&clipped);
        out.phrms = std(&clipped);
        out.phoff = out.zpt - self.ctx.zp0;
        out.transp = transparency(out.phoff, self.ctx.extinction, self.ctx.airmass);
        out.nclipped = clipped.len();
        info!(
            "Zeropoint {:.4}, offset {:.4}, scatter {:.4}, transparency {:.4}",
            out.zpt, out.phoff, out.phrms, out.transp
        );
        out
    }
}

/// `10^(-0.4 (-phoff - k (airmass - 1)))`.
pub fn transparency(phoff: f64, extinction: f64, airmass: f64) -> f64 {
    10f64.powf(-0.4 * (-phoff - extinction * (airmass - 1.0)))
}
