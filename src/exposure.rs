//! Per-exposure measurement: read every CCD, fit the reference stars and
//! aggregate the results into the CCD and star tables.
//!
//! [`Measurer::new`] parses the primary header once; a missing required card
//! is fatal for the whole exposure. [`Measurer::measure_ccd`] never fails for
//! per-CCD defects: it returns a row tagged with a [`SkipReason`].
//! [`Measurer::measure_image`] runs the CCDs on a rayon pool and restores
//! extension order before aggregating.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::accessor::{accessor_for, AmpCorrection, ExposureSource, ImageAccessor};
use crate::aperture::{aperture_photometry, aperture_radii};
use crate::artifacts::{CalibrationArtifacts, CalibrationRow, ExposureStamp};
use crate::astrometry::airmass;
use crate::camera::{mag_limits, Camera};
use crate::catalogs::{cap_brightest, GaiaStar, Ps1Star, ReferenceCatalogSource};
use crate::ccds::{ccds_table, stars_table, survey_table, CcdZeropoint, StarRow, SurveyCcd, APERTURE_DIAMETERS};
use crate::fits::{write_table, Header, HeaderValue};
use crate::photometry::{FitConfig, ForcedPhotometryFitter};
use crate::plane::{Plane, Region};
use crate::refstars::{merge_references, ColorTerms, MatchContext};
use crate::report::{SkipReason, SkipReport};
use crate::sky::{estimate_sky, SkyConfig};
use crate::stats::median;
use crate::wcs::Wcs;
use crate::zeropoint::{ExposureContext, ZeropointConfig, ZeropointEstimator};

/// Configuration for [`Measurer`].
#[derive(Debug, Clone)]
pub struct MeasureConfig {
    /// Forced-photometry fit settings (radius 10 px, 50 steps).
    pub fit: FitConfig,
    /// Astrometric and photometric clipping.
    pub zeropoint: ZeropointConfig,
    /// Clip threshold for the sky box estimate.
    /// Default: 3.0
    pub sky_nsigma: f64,
    /// Keep at most this many Gaia stars, brightest first.
    /// Default: 10000
    pub gaia_cap: usize,
    /// Gaia-PS1 match radius.
    /// Default: 1 arcsec
    pub match_radius_arcsec: f64,
    /// Aperture diameters in arcsec.
    /// Default: [6, 7, 8]
    pub aperture_diameters: Vec<f64>,
    /// Subtract the spline sky from the calibration artifacts instead of the
    /// constant box estimate.
    /// Default: false
    pub use_spline_sky: bool,
    /// Measure only this CCD.
    /// Default: None
    pub choose_ccd: Option<String>,
    /// Worker threads; 0 uses the rayon default.
    /// Default: 0
    pub threads: usize,
    /// PS1 color terms per observed band.
    pub colorterms: ColorTerms,
    /// Per-amp zeropoint offsets for cameras that use them.
    pub amp_correction: AmpCorrection,
}

impl Default for MeasureConfig {
    fn default() -> Self {
        Self {
            fit: FitConfig::default(),
            zeropoint: ZeropointConfig::default(),
            sky_nsigma: 3.0,
            gaia_cap: 10000,
            match_radius_arcsec: 1.0,
            aperture_diameters: APERTURE_DIAMETERS.iter().map(|&d| d as f64).collect(),
            use_spline_sky: false,
            choose_ccd: None,
            threads: 0,
            colorterms: ColorTerms::default(),
            amp_correction: AmpCorrection::default(),
        }
    }
}

/// Exposure-level metadata parsed from the primary header.
#[derive(Debug, Clone, PartialEq)]
pub struct ExposureInfo {
    pub camera: Camera,
    pub image_filename: String,
    pub expnum: i64,
    pub band: String,
    pub exptime: f64,
    pub mjd_obs: f64,
    pub date_obs: String,
    pub ut: String,
    pub ha: String,
    pub airmass: f64,
    pub object: String,
    pub propid: String,
    pub plver: String,
    pub plprocid: String,
    /// CP processing date (DATE card).
    pub procdate: String,
    pub ra_bore: f64,
    pub dec_bore: f64,
    pub pixscale: f64,
    /// Nominal zeropoint and extinction of the band.
    pub zp0: f64,
    pub extinction: f64,
    pub good_wcs: bool,
    pub yshift: bool,
}

impl ExposureInfo {
    pub fn stamp(&self) -> ExposureStamp {
        ExposureStamp {
            expnum: self.expnum,
            plver: self.plver.clone(),
            plprocid: self.plprocid.clone(),
        }
    }
}

/// A string card that may be absent but must not be blank when present.
fn optional_card(hdr: &Header, key: &str) -> Result<Option<String>> {
    match hdr.get(key) {
        Some(HeaderValue::Str(s)) if s.trim().is_empty() => bail!("Empty header card: {}", key),
        Some(v) => Ok(Some(v.as_string())),
        None => Ok(None),
    }
}

/// Result of measuring one CCD.
#[derive(Debug, Clone)]
pub struct CcdMeasurement {
    pub ccd: CcdZeropoint,
    pub stars: Vec<StarRow>,
    pub report: SkipReport,
}

/// Everything measured for one exposure.
#[derive(Debug, Clone)]
pub struct ExposureResult {
    /// CCD rows in extension order.
    pub ccds: Vec<CcdZeropoint>,
    /// Star rows concatenated in extension order.
    pub stars: Vec<StarRow>,
    pub report: SkipReport,
    /// Provenance cards for the output tables.
    pub header: Header,
}

#[derive(Debug, Clone)]
pub enum ExposureOutcome {
    Measured(ExposureResult),
    /// The calibration artifacts are missing or stale and must be rebuilt
    /// before this exposure can be measured.
    NeedsCalibration { expnum: i64 },
}

/// Measures the CCDs of one exposure.
pub struct Measurer<'a> {
    accessor: Box<dyn ImageAccessor>,
    source: &'a dyn ExposureSource,
    catalogs: &'a dyn ReferenceCatalogSource,
    config: &'a MeasureConfig,
    info: ExposureInfo,
}

impl<'a> Measurer<'a> {
    pub fn new(
        camera: Camera,
        source: &'a dyn ExposureSource,
        catalogs: &'a dyn ReferenceCatalogSource,
        config: &'a MeasureConfig,
    ) -> Result<Self> {
        let accessor = accessor_for(camera);
        let info = Self::parse_primary(accessor.as_ref(), source)
            .with_context(|| format!("Failed to parse primary header of {}", source.filename()))?;
        info!(
            "{} exposure {} band {} exptime {:.1} airmass {:.3}",
            camera, info.expnum, info.band, info.exptime, info.airmass
        );
        Ok(Self {
            accessor,
            source,
            catalogs,
            config,
            info,
        })
    }

    pub fn info(&self) -> &ExposureInfo {
        &self.info
    }

    fn parse_primary(accessor: &dyn ImageAccessor, source: &dyn ExposureSource) -> Result<ExposureInfo> {
        let primhdr = source.primary_header();
        let camera = accessor.camera();

        let propid = primhdr
            .get_str("PROPID")
            .or_else(|| primhdr.get_str("DTPROPID"))
            .unwrap_or_default();
        let hdr_airmass = optional_card(primhdr, "AIRMASS")?.and_then(|s| s.parse::<f64>().ok());
        let ha = optional_card(primhdr, "HA")?.unwrap_or_default();
        let procdate = optional_card(primhdr, "DATE")?.unwrap_or_default();
        let plver = optional_card(primhdr, "PLVER")?.unwrap_or_default();
        let plprocid = optional_card(primhdr, "PLPROCID")?.unwrap_or_default();

        let exptime = primhdr.require_f64("EXPTIME")?;
        let date_obs = primhdr.require_str("DATE-OBS")?;
        let mjd_obs = primhdr.require_f64("MJD-OBS")?;
        let object = primhdr.require_str("OBJECT")?;

        let band = accessor.band(primhdr)?;
        let zp0 = camera.zeropoint0(&band)?;
        let extinction = camera.extinction(&band)?;
        let expnum = accessor.expnum(primhdr)?;
        let ut = accessor.ut(primhdr)?;
        let (ra_bore, dec_bore) = accessor.radec_bore(primhdr)?;

        let recompute = camera == Camera::Mosaic || (hdr_airmass.is_none() && camera.site().is_some());
        let airmass = if recompute {
            let mjd_mid = mjd_obs + exptime / 2.0 / 86400.0;
            let computed = camera.site().and_then(|site| {
                let (lat, lon) = site.geodetic();
                airmass(ra_bore, dec_bore, lat, lon, mjd_mid)
            });
            if let (Some(hdr), Some(am)) = (hdr_airmass, computed) {
                debug!("Recomputed airmass {:.4} (header {:.4})", am, hdr);
            }
            computed.or(hdr_airmass).unwrap_or(0.0)
        } else {
            hdr_airmass.unwrap_or(0.0)
        };

        Ok(ExposureInfo {
            camera,
            image_filename: source.filename().to_string(),
            expnum,
            band,
            exptime,
            mjd_obs,
            date_obs,
            ut,
            ha,
            airmass,
            object,
            propid,
            plver,
            plprocid,
            procdate,
            ra_bore,
            dec_bore,
            pixscale: camera.pixscale(),
            zp0,
            extinction,
            good_wcs: accessor.good_wcs(primhdr),
            yshift: primhdr.contains("YSHIFT"),
        })
    }

    fn skipped(&self, mut ccd: CcdZeropoint, reason: SkipReason) -> CcdMeasurement {
        warn!("Skipping CCD {}: {}", ccd.ccdname, reason);
        ccd.skip(&reason);
        let mut report = SkipReport {
            nccds: 1,
            ..Default::default()
        };
        report.record_skip(&reason);
        CcdMeasurement {
            ccd,
            stars: Vec::new(),
            report,
        }
    }

    /// Measure one CCD extension. `calib` holds its PSF and sky models.
    pub fn measure_ccd(&self, ext: &str, calib: Option<&CalibrationRow>) -> Result<CcdMeasurement> {
        let info = &self.info;
        let primhdr = self.source.primary_header();
        let hdr = self.source.header(ext)?;
        let ccdname = self.accessor.extension_name(ext);
        let (full_w, full_h) = self.source.shape(ext)?;
        let region = self.accessor.good_subregion(&ccdname, full_w, full_h);
        let (origin, width, height) = match region {
            Some(r) => ((r.x0, r.y0), r.width(), r.height()),
            None => ((0, 0), full_w, full_h),
        };

        let fwhm_cp = self.accessor.fwhm(hdr)?;
        let mut ccd = CcdZeropoint {
            image_filename: info.image_filename.clone(),
            image_hdu: self.source.image_hdu(ext)?,
            camera: info.camera.name().to_string(),
            expnum: info.expnum,
            plver: info.plver.clone(),
            procdate: info.procdate.clone(),
            plprocid: info.plprocid.clone(),
            ccdname: ccdname.clone(),
            ccdnum: hdr.get_i64("CCDNUM").unwrap_or(0),
            expid: format!("{:08}-{}", info.expnum, ccdname),
            object: info.object.clone(),
            propid: info.propid.clone(),
            filter: info.band.clone(),
            exptime: info.exptime,
            date_obs: info.date_obs.clone(),
            mjd_obs: info.mjd_obs,
            ut: info.ut.clone(),
            ha: info.ha.clone(),
            airmass: info.airmass,
            fwhm: fwhm_cp,
            fwhm_cp,
            gain: self.accessor.gain(hdr)?,
            width,
            height,
            ra_bore: info.ra_bore,
            dec_bore: info.dec_bore,
            crpix1: hdr.require_f64("CRPIX1")?,
            crpix2: hdr.require_f64("CRPIX2")?,
            crval1: hdr.require_f64("CRVAL1")?,
            crval2: hdr.require_f64("CRVAL2")?,
            cd1_1: hdr.require_f64("CD1_1")?,
            cd1_2: hdr.require_f64("CD1_2")?,
            cd2_1: hdr.require_f64("CD2_1")?,
            cd2_2: hdr.require_f64("CD2_2")?,
            pixscale: info.pixscale,
            yshift: info.yshift,
            ..Default::default()
        };
        info!("Measuring CCD {} of {}", ccdname, info.image_filename);

        // Cards were required above; only a singular CD matrix fails here.
        let wcs = match Wcs::from_header(hdr, width, height) {
            Ok(mut wcs) => {
                wcs.crpix[0] -= origin.0 as f64;
                wcs.crpix[1] -= origin.1 as f64;
                wcs
            }
            Err(e) => {
                warn!("Unusable WCS in {} of {}: {:#}", ccdname, info.image_filename, e);
                (ccd.ra, ccd.dec) = (info.ra_bore, info.dec_bore);
                return Ok(self.skipped(ccd, SkipReason::WcsFailed));
            }
        };
        (ccd.ra, ccd.dec) = wcs.pixelxy2radec((width as f64 + 1.0) / 2.0, (height as f64 + 1.0) / 2.0);

        if !info.good_wcs {
            return Ok(self.skipped(ccd, SkipReason::WcsFailed));
        }
        if info.exptime == 0.0 {
            return Ok(self.skipped(ccd, SkipReason::ZeroExptime));
        }

        let mask = self.accessor.read_mask(self.source, ext, region, primhdr)?;
        let mut weight = self.accessor.read_weight(self.source, ext, region, &mask)?;
        if weight.data().iter().all(|&w| w == 0.0) {
            return Ok(self.skipped(ccd, SkipReason::AllWeightsZero { ccdname }));
        }
        if weight.data().iter().all(|&w| w == 0.0 || w == 1.0) {
            return Ok(self.skipped(ccd, SkipReason::WeightsZeroOrOne));
        }
        self.accessor.scale_weight(&mut weight, info.exptime);

        let psf = calib
            .and_then(|c| c.psf.as_ref())
            .filter(|p| p.sampling != 0.0)
            .filter(|p| match p.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!("Unusable PsfEx model for {}: {:#}", ccdname, e);
                    false
                }
            });
        let Some(psf) = psf else {
            return Ok(self.skipped(ccd, SkipReason::BadPsf));
        };

        let mut img = self.source.read_image(ext, region)?;
        self.accessor.scale_image(&mut img, info.exptime);

        let good_weights: Vec<f64> = weight
            .data()
            .iter()
            .zip(mask.data())
            .filter(|(w, m)| **w > 0.0 && **m == 0)
            .map(|(w, _)| *w)
            .collect();
        if !good_weights.is_empty() {
            ccd.sig1 = 1.0 / median(&good_weights).sqrt() / info.exptime;
        }

        let mut invvar = self.accessor.remap_invvar(weight, primhdr, &img, &mask)?;

        let sky = estimate_sky(
            &img,
            info.camera.sky_box(),
            &SkyConfig {
                nsigma: self.config.sky_nsigma,
            },
        );
        ccd.skyrms = sky.std / info.exptime;
        ccd.skycounts = sky.median / info.exptime;
        ccd.skysb = info.zp0 - 2.5 * (sky.median / info.pixscale / info.pixscale / info.exptime).log10();
        debug!("Sky brightness {:.3} mag/arcsec^2 on {}", ccd.skysb, ccdname);

        let sky_image = match calib.and_then(|c| c.sky.as_ref()).filter(|_| self.config.use_spline_sky) {
            Some(spline) if spline.is_valid() => {
                let area = region.unwrap_or(Region {
                    x0: 0,
                    x1: full_w,
                    y0: 0,
                    y1: full_h,
                });
                let mut model = spline.render(area);
                self.accessor.scale_image(&mut model, info.exptime);
                model
            }
            Some(_) => {
                warn!("Invalid spline sky for {}; using the box estimate", ccdname);
                sky.image
            }
            None => {
                if self.config.use_spline_sky {
                    warn!("No spline sky for {}; using the box estimate", ccdname);
                }
                sky.image
            }
        };

        // Reference stars
        let gaia: Vec<GaiaStar> = self
            .catalogs
            .gaia_in_wcs(&wcs)?
            .into_iter()
            .map(GaiaStar::nan_to_zero)
            .collect();
        let gaia = cap_brightest(gaia, self.config.gaia_cap);
        let ps1: Option<Vec<Ps1Star>> = self
            .catalogs
            .ps1_in_wcs(&wcs)?
            .map(|stars| stars.into_iter().filter(Ps1Star::passes_cuts).collect::<Vec<_>>())
            .filter(|stars| !stars.is_empty());
        debug!(
            "{} Gaia and {} PS1 stars on {}",
            gaia.len(),
            ps1.as_ref().map_or(0, Vec::len),
            ccdname
        );
        let ctx = MatchContext {
            mjd_obs: info.mjd_obs,
            exptime: info.exptime,
            zp0: info.zp0,
            transform: self.accessor.ps1_transform(&info.band, &self.config.colorterms)?,
            match_radius_arcsec: self.config.match_radius_arcsec,
        };
        let refs = merge_references(&gaia, ps1.as_deref(), &ctx);
        info!("{}: {} reference stars", ccdname, refs.len());

        let mut fit_img = img;
        for (v, s) in fit_img.data_mut().iter_mut().zip(sky_image.data()) {
            *v -= s;
        }
        if self.accessor.uses_amp_correction() {
            self.config.amp_correction.apply(
                &info.band,
                &ccdname,
                (full_w, full_h),
                origin,
                &mut fit_img,
                &mut invvar,
            );
        }
        let ierr = invvar.map(|v| if v > 0.0 { v.sqrt() } else { 0.0 });

        let fitter = ForcedPhotometryFitter::new(&self.config.fit, &wcs, psf);
        let (fits, rejections) = fitter.fit(&refs, &fit_img, &ierr);
        info!("Got photometry results for {} of {} reference stars", fits.len(), refs.len());

        let mut report = SkipReport {
            nccds: 1,
            rejections,
            nfits: fits.len(),
            ..Default::default()
        };
        if fits.is_empty() {
            let mut out = self.skipped(ccd, SkipReason::NoPhotometry);
            report.record_skip(&SkipReason::NoPhotometry);
            out.report = report;
            return Ok(out);
        }

        let exposure = ExposureContext {
            exptime: info.exptime,
            airmass: info.airmass,
            zp0: info.zp0,
            extinction: info.extinction,
            maglim: mag_limits(&info.band),
        };
        let mut est = ZeropointEstimator::new(&self.config.zeropoint, &exposure).estimate(&fits, &refs);
        let a = est.astrometry;
        let p = est.photometry;

        ccd.sig1 /= p.nanomaggy_scale();
        ccd.raoff = a.raoff;
        ccd.decoff = a.decoff;
        ccd.rastddev = a.rastddev;
        ccd.decstddev = a.decstddev;
        ccd.rarms = a.rarms;
        ccd.decrms = a.decrms;
        ccd.nstars_astrom = a.nastrom;
        ccd.phoff = p.phoff;
        ccd.phrms = p.phrms;
        ccd.zpt = p.zpt;
        ccd.transp = p.transp;
        ccd.nstars_photom = p.nphotom;
        info!(
            "{}: zpt {:.4}, offsets {:.4} {:.4} arcsec, transparency {:.4}",
            ccdname, p.zpt, a.raoff, a.decoff, p.transp
        );

        let radii = aperture_radii(&self.config.aperture_diameters, info.pixscale);
        let gain = ccd.gain;
        let stars = est
            .stars
            .drain(..)
            .map(|mut star| {
                star.bitmask = sample_mask(&mask, star.fit.x1, star.fit.y1);
                for &r in &radii {
                    let ap = aperture_photometry(&fit_img, &ierr, star.fit.x1, star.fit.y1, r);
                    star.apflux.push(ap.flux);
                    star.apflux_err.push(ap.err);
                }
                StarRow {
                    star,
                    expnum: info.expnum,
                    ccdname: ccdname.clone(),
                    filter: info.band.clone(),
                    exptime: info.exptime,
                    gain,
                    airmass: info.airmass,
                }
            })
            .collect();

        Ok(CcdMeasurement { ccd, stars, report })
    }

    /// Measure every CCD (or only `choose_ccd`) with the PSF and sky models
    /// from `artifacts`.
    pub fn measure_image(&self, artifacts: Option<&CalibrationArtifacts>) -> Result<ExposureOutcome> {
        let stamp = self.info.stamp();
        let Some(artifacts) = artifacts.filter(|a| a.validate(&stamp)) else {
            warn!(
                "Calibration artifacts for exposure {} are missing or stale",
                self.info.expnum
            );
            return Ok(ExposureOutcome::NeedsCalibration {
                expnum: self.info.expnum,
            });
        };

        let extensions: Vec<String> = self
            .source
            .extensions()
            .into_iter()
            .filter(|ext| match &self.config.choose_ccd {
                Some(want) => self.accessor.extension_name(ext) == self.accessor.extension_name(want),
                None => true,
            })
            .collect();
        if extensions.is_empty() {
            bail!("No extensions to measure in {}", self.source.filename());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .build()
            .context("Failed to build worker pool")?;
        let results: Vec<Result<CcdMeasurement>> = pool.install(|| {
            extensions
                .par_iter()
                .map(|ext| self.measure_ccd(ext, artifacts.get(&self.accessor.extension_name(ext))))
                .collect()
        });

        let mut ccds = Vec::with_capacity(results.len());
        let mut stars = Vec::new();
        let mut report = SkipReport::default();
        for (ext, res) in extensions.iter().zip(results) {
            let m = res.with_context(|| format!("Failed to measure extension {}", ext))?;
            report.merge(&m.report);
            stars.extend(m.stars);
            ccds.push(m.ccd);
        }
        apply_exposure_averages(&mut ccds);
        info!("Exposure {}:\n{}", self.info.expnum, report);

        let header = self.provenance_header(&ccds);
        Ok(ExposureOutcome::Measured(ExposureResult {
            ccds,
            stars,
            report,
            header,
        }))
    }

    /// Header cards written to both output tables.
    pub fn provenance_header(&self, ccds: &[CcdZeropoint]) -> Header {
        let primhdr = self.source.primary_header();
        let mut hdr = Header::new();
        for key in [
            "AIRMASS", "OBJECT", "TELESCOP", "INSTRUME", "EXPTIME", "DATE-OBS", "MJD-OBS", "PROGRAM", "OBSERVER",
            "PROPID", "FILTER", "HA", "ZD", "AZ", "DOMEAZ", "HUMIDITY", "PLVER",
        ] {
            let Some(value) = primhdr.get(key) else {
                continue;
            };
            let value = match value {
                HeaderValue::Str(s) => HeaderValue::Str(s.trim().to_string()),
                other => other.clone(),
            };
            hdr.set(key, value, primhdr.comment(key));
        }
        hdr.set("EXPNUM", self.info.expnum, Some("Exposure number"));
        hdr.set("PROCDATE", self.info.procdate.as_str(), Some("CP processing date"));
        hdr.set("PLPROCID", self.info.plprocid.as_str(), Some("CP processing batch"));
        hdr.set("RA_BORE", self.info.ra_bore, Some("Boresight RA (deg)"));
        hdr.set("DEC_BORE", self.info.dec_bore, Some("Boresight Dec (deg)"));

        let zpts: Vec<f64> = ccds.iter().map(|c| c.zpt).filter(|z| z.is_finite()).collect();
        let medzpt = if zpts.is_empty() { 0.0 } else { median(&zpts) };
        hdr.set("CCD_ZPT", medzpt, Some("Exposure median zeropoint"));
        let fwhms: Vec<f64> = ccds.iter().map(|c| c.fwhm).filter(|&f| f > 0.0).collect();
        let fwhm = if fwhms.is_empty() { 0.0 } else { median(&fwhms) };
        hdr.set("FWHM", fwhm, Some("Exposure median FWHM (CP)"));
        hdr.set(
            "SEEING",
            fwhm * self.info.pixscale,
            Some("Exposure median seeing (FWHM*pixscale)"),
        );

        let path = Path::new(&self.info.image_filename);
        let base = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        let filename = match path.parent().and_then(Path::file_name) {
            Some(dir) => format!("{}/{}", dir.to_string_lossy(), base),
            None => base,
        };
        hdr.set("FILENAME", filename, None);
        hdr
    }
}

/// Mask value under zero-indexed `(x, y)`, clamped to the image.
fn sample_mask(mask: &Plane<i32>, x: f64, y: f64) -> i32 {
    let xi = x.clamp(0.0, (mask.width() - 1) as f64) as usize;
    let yi = y.clamp(0.0, (mask.height() - 1) as f64) as usize;
    mask.get(xi, yi)
}

/// Fill `zptavg` (median finite zpt) and `phrmsavg` (median finite positive
/// phrms) into every row.
pub fn apply_exposure_averages(ccds: &mut [CcdZeropoint]) {
    let zpts: Vec<f64> = ccds.iter().map(|c| c.zpt).filter(|z| z.is_finite()).collect();
    let phrms: Vec<f64> = ccds
        .iter()
        .map(|c| c.phrms)
        .filter(|p| p.is_finite() && *p > 0.0)
        .collect();
    let zptavg = (!zpts.is_empty()).then(|| median(&zpts));
    let phrmsavg = (!phrms.is_empty()).then(|| median(&phrms));
    for c in ccds.iter_mut() {
        if let Some(z) = zptavg {
            c.zptavg = z;
        }
        if let Some(p) = phrmsavg {
            c.phrmsavg = p;
        }
    }
}

/// `<outdir>/<image dir>/<image base>`, with `.fits` and `.fz` stripped.
pub fn output_base<P: AsRef<Path>>(outdir: P, image_filename: &str) -> PathBuf {
    let path = Path::new(image_filename);
    let rel = path.strip_prefix("/").unwrap_or(path);
    let name = rel.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    let name = name.strip_suffix(".fz").unwrap_or(&name);
    let name = name.strip_suffix(".fits").unwrap_or(name);
    let dir = rel.parent().unwrap_or(Path::new(""));
    outdir.as_ref().join(dir).join(name)
}

/// Write `<base>-photom.fits` and `<base>-survey.fits`, creating the parent
/// directory. Returns both paths.
pub fn write_outputs(result: &ExposureResult, base: &Path) -> Result<(PathBuf, PathBuf)> {
    if let Some(dir) = base.parent() {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let photom_path = PathBuf::from(format!("{}-photom.fits", base.display()));
    let survey_path = PathBuf::from(format!("{}-survey.fits", base.display()));

    let mut photom = stars_table(&result.stars)?;
    photom.header.extend(&result.header);
    write_table(&photom_path, &photom)?;

    let survey_rows: Vec<SurveyCcd> = result.ccds.iter().map(SurveyCcd::from_zeropoint).collect();
    let mut survey = survey_table(&survey_rows)?;
    survey.header.extend(&result.header);
    write_table(&survey_path, &survey)?;
    Ok((photom_path, survey_path))
}

/// Write the full CCD table (every `CcdZeropoint` column) to `path`.
pub fn write_ccds(ccds: &[CcdZeropoint], header: &Header, path: &Path) -> Result<()> {
    let mut table = ccds_table(ccds)?;
    table.header.extend(header);
    write_table(path, &table)
}
