//! Output tables: the per-CCD zeropoint row, its survey-table projection and
//! the per-star photometry table.

use std::path::Path;

use anyhow::{Context, Result};

use crate::fits::{BinTable, ColumnData};
use crate::report::SkipReason;
use crate::zeropoint::StarPhotometry;

/// One row of the per-exposure CCD table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CcdZeropoint {
    /// Skip reason; empty for a measured CCD.
    pub err_message: String,
    pub image_filename: String,
    pub image_hdu: i64,
    pub camera: String,
    pub expnum: i64,
    pub plver: String,
    pub procdate: String,
    pub plprocid: String,
    pub ccdname: String,
    pub ccdnum: i64,
    /// `{expnum:08}-{ccdname}`
    pub expid: String,
    pub object: String,
    pub propid: String,
    pub filter: String,
    pub exptime: f64,
    pub date_obs: String,
    pub mjd_obs: f64,
    pub ut: String,
    pub ha: String,
    pub airmass: f64,
    pub fwhm: f64,
    pub fwhm_cp: f64,
    pub gain: f64,
    pub width: usize,
    pub height: usize,
    pub ra_bore: f64,
    pub dec_bore: f64,
    pub crpix1: f64,
    pub crpix2: f64,
    pub crval1: f64,
    pub crval2: f64,
    pub cd1_1: f64,
    pub cd1_2: f64,
    pub cd2_1: f64,
    pub cd2_2: f64,
    pub pixscale: f64,
    pub zptavg: f64,
    pub yshift: bool,

    // ── CCD-level measurements ──
    pub ra: f64,
    pub dec: f64,
    pub skysb: f64,
    pub skycounts: f64,
    pub skyrms: f64,
    pub sig1: f64,
    pub nstars_photom: usize,
    pub nstars_astrom: usize,
    pub goodps1: usize,
    pub goodps1_wbadpix5: usize,
    pub phoff: f64,
    pub phrms: f64,
    pub phrmsavg: f64,
    pub zpt: f64,
    pub zpt_wbadpix5: f64,
    pub transp: f64,
    pub raoff: f64,
    pub decoff: f64,
    pub rarms: f64,
    pub decrms: f64,
    pub rastddev: f64,
    pub decstddev: f64,
}

impl CcdZeropoint {
    /// Tag the row as skipped. The zeropoint is zeroed; other fields keep
    /// whatever was filled in before the skip.
    pub fn skip(&mut self, reason: &SkipReason) {
        self.err_message = reason.to_string();
        self.zpt = 0.0;
    }

    pub fn is_skipped(&self) -> bool {
        !self.err_message.is_empty()
    }
}

// ── column helpers ─────────────────────────────────────────────────────────

fn f32_col<T>(rows: &[T], f: impl Fn(&T) -> f64) -> ColumnData {
    ColumnData::F32(rows.iter().map(|r| f(r) as f32).collect())
}

fn f64_col<T>(rows: &[T], f: impl Fn(&T) -> f64) -> ColumnData {
    ColumnData::F64(rows.iter().map(f).collect())
}

fn i16_col<T>(rows: &[T], f: impl Fn(&T) -> i64) -> ColumnData {
    ColumnData::I16(rows.iter().map(|r| f(r) as i16).collect())
}

fn i32_col<T>(rows: &[T], f: impl Fn(&T) -> i64) -> ColumnData {
    ColumnData::I32(rows.iter().map(|r| f(r) as i32).collect())
}

fn i64_col<T>(rows: &[T], f: impl Fn(&T) -> i64) -> ColumnData {
    ColumnData::I64(rows.iter().map(f).collect())
}

fn str_col<T>(rows: &[T], width: usize, f: impl Fn(&T) -> &str) -> ColumnData {
    ColumnData::Str {
        width,
        values: rows.iter().map(|r| f(r).to_string()).collect(),
    }
}

fn bool_col<T>(rows: &[T], f: impl Fn(&T) -> bool) -> ColumnData {
    ColumnData::Bool(rows.iter().map(f).collect())
}

/// The full CCD table.
pub fn ccds_table(rows: &[CcdZeropoint]) -> Result<BinTable> {
    let mut t = BinTable::new();
    t.push("err_message", str_col(rows, 40, |r| &r.err_message))?;
    t.push("image_filename", str_col(rows, 120, |r| &r.image_filename))?;
    t.push("image_hdu", i16_col(rows, |r| r.image_hdu))?;
    t.push("camera", str_col(rows, 9, |r| &r.camera))?;
    t.push("expnum", i64_col(rows, |r| r.expnum))?;
    t.push("plver", str_col(rows, 8, |r| &r.plver))?;
    t.push("procdate", str_col(rows, 19, |r| &r.procdate))?;
    t.push("plprocid", str_col(rows, 7, |r| &r.plprocid))?;
    t.push("ccdname", str_col(rows, 4, |r| &r.ccdname))?;
    t.push("ccdnum", i16_col(rows, |r| r.ccdnum))?;
    t.push("expid", str_col(rows, 17, |r| &r.expid))?;
    t.push("object", str_col(rows, 35, |r| &r.object))?;
    t.push("propid", str_col(rows, 10, |r| &r.propid))?;
    t.push("filter", str_col(rows, 1, |r| &r.filter))?;
    t.push("exptime", f32_col(rows, |r| r.exptime))?;
    t.push("date_obs", str_col(rows, 26, |r| &r.date_obs))?;
    t.push("mjd_obs", f64_col(rows, |r| r.mjd_obs))?;
    t.push("ut", str_col(rows, 15, |r| &r.ut))?;
    t.push("ha", str_col(rows, 13, |r| &r.ha))?;
    t.push("airmass", f32_col(rows, |r| r.airmass))?;
    t.push("fwhm", f32_col(rows, |r| r.fwhm))?;
    t.push("fwhm_cp", f32_col(rows, |r| r.fwhm_cp))?;
    t.push("gain", f32_col(rows, |r| r.gain))?;
    t.push("width", i16_col(rows, |r| r.width as i64))?;
    t.push("height", i16_col(rows, |r| r.height as i64))?;
    t.push("ra_bore", f64_col(rows, |r| r.ra_bore))?;
    t.push("dec_bore", f64_col(rows, |r| r.dec_bore))?;
    t.push("crpix1", f32_col(rows, |r| r.crpix1))?;
    t.push("crpix2", f32_col(rows, |r| r.crpix2))?;
    t.push("crval1", f64_col(rows, |r| r.crval1))?;
    t.push("crval2", f64_col(rows, |r| r.crval2))?;
    t.push("cd1_1", f32_col(rows, |r| r.cd1_1))?;
    t.push("cd1_2", f32_col(rows, |r| r.cd1_2))?;
    t.push("cd2_1", f32_col(rows, |r| r.cd2_1))?;
    t.push("cd2_2", f32_col(rows, |r| r.cd2_2))?;
    t.push("pixscale", f32_col(rows, |r| r.pixscale))?;
    t.push("zptavg", f32_col(rows, |r| r.zptavg))?;
    t.push("yshift", bool_col(rows, |r| r.yshift))?;
    t.push("ra", f64_col(rows, |r| r.ra))?;
    t.push("dec", f64_col(rows, |r| r.dec))?;
    t.push("skysb", f32_col(rows, |r| r.skysb))?;
    t.push("skycounts", f32_col(rows, |r| r.skycounts))?;
    t.push("skyrms", f32_col(rows, |r| r.skyrms))?;
    t.push("sig1", f32_col(rows, |r| r.sig1))?;
    t.push("nstars_photom", i16_col(rows, |r| r.nstars_photom as i64))?;
    t.push("nstars_astrom", i16_col(rows, |r| r.nstars_astrom as i64))?;
    t.push("goodps1", i16_col(rows, |r| r.goodps1 as i64))?;
    t.push("goodps1_wbadpix5", i16_col(rows, |r| r.goodps1_wbadpix5 as i64))?;
    t.push("phoff", f32_col(rows, |r| r.phoff))?;
    t.push("phrms", f32_col(rows, |r| r.phrms))?;
    t.push("phrmsavg", f32_col(rows, |r| r.phrmsavg))?;
    t.push("zpt", f32_col(rows, |r| r.zpt))?;
    t.push("zpt_wbadpix5", f32_col(rows, |r| r.zpt_wbadpix5))?;
    t.push("transp", f32_col(rows, |r| r.transp))?;
    t.push("raoff", f32_col(rows, |r| r.raoff))?;
    t.push("decoff", f32_col(rows, |r| r.decoff))?;
    t.push("rarms", f32_col(rows, |r| r.rarms))?;
    t.push("decrms", f32_col(rows, |r| r.decrms))?;
    t.push("rastddev", f32_col(rows, |r| r.rastddev))?;
    t.push("decstddev", f32_col(rows, |r| r.decstddev))?;
    Ok(t)
}

// ── survey table ───────────────────────────────────────────────────────────

/// One row of the `-survey.fits` table. CCD-level quantities carry a `ccd`
/// prefix; `zpt` and `phrms` are the exposure averages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurveyCcd {
    pub image_filename: String,
    pub image_hdu: i64,
    pub camera: String,
    pub expnum: i64,
    pub plver: String,
    pub procdate: String,
    pub plprocid: String,
    pub ccdname: String,
    pub object: String,
    pub propid: String,
    pub filter: String,
    pub exptime: f64,
    pub mjd_obs: f64,
    pub airmass: f64,
    pub fwhm: f64,
    pub width: usize,
    pub height: usize,
    pub ra_bore: f64,
    pub dec_bore: f64,
    pub ra: f64,
    pub dec: f64,
    pub crpix1: f64,
    pub crpix2: f64,
    pub crval1: f64,
    pub crval2: f64,
    pub cd1_1: f64,
    pub cd1_2: f64,
    pub cd2_1: f64,
    pub cd2_2: f64,
    pub yshift: bool,
    pub skyrms: f64,
    pub sig1: f64,
    pub ccdskycounts: f64,
    pub ccdskysb: f64,
    pub ccdzpt: f64,
    pub zpt: f64,
    pub ccdraoff: f64,
    pub ccddecoff: f64,
    pub ccdrarms: f64,
    pub ccddecrms: f64,
    pub ccdphrms: f64,
    pub phrms: f64,
    pub ccdnastrom: i64,
    pub ccdnphotom: i64,
    pub ccd_cuts: i32,
}

impl SurveyCcd {
    /// Project a CCD row onto the survey columns. Every row starts with the
    /// `err_legacyzpts` cut bit set until the cut engine runs.
    pub fn from_zeropoint(c: &CcdZeropoint) -> Self {
        Self {
            image_filename: c.image_filename.clone(),
            image_hdu: c.image_hdu,
            camera: c.camera.clone(),
            expnum: c.expnum,
            plver: c.plver.clone(),
            procdate: c.procdate.clone(),
            plprocid: c.plprocid.clone(),
            ccdname: c.ccdname.clone(),
            object: c.object.clone(),
            propid: c.propid.clone(),
            filter: c.filter.clone(),
            exptime: c.exptime,
            mjd_obs: c.mjd_obs,
            airmass: c.airmass,
            fwhm: c.fwhm,
            width: c.width,
            height: c.height,
            ra_bore: c.ra_bore,
            dec_bore: c.dec_bore,
            ra: c.ra,
            dec: c.dec,
            crpix1: c.crpix1,
            crpix2: c.crpix2,
            crval1: c.crval1,
            crval2: c.crval2,
            cd1_1: c.cd1_1,
            cd1_2: c.cd1_2,
            cd2_1: c.cd2_1,
            cd2_2: c.cd2_2,
            yshift: c.yshift,
            skyrms: c.skyrms,
            sig1: c.sig1,
            ccdskycounts: c.skycounts,
            ccdskysb: c.skysb,
            ccdzpt: c.zpt,
            zpt: c.zptavg,
            ccdraoff: c.raoff,
            ccddecoff: c.decoff,
            ccdrarms: c.rarms,
            ccddecrms: c.decrms,
            ccdphrms: c.phrms,
            phrms: c.phrmsavg,
            ccdnastrom: c.nstars_astrom as i64,
            ccdnphotom: c.nstars_photom as i64,
            ccd_cuts: crate::cuts::CutBit::ErrLegacyzpts.value(),
        }
    }
}

pub fn survey_table(rows: &[SurveyCcd]) -> Result<BinTable> {
    let mut t = BinTable::new();
    t.push("image_filename", str_col(rows, 120, |r| &r.image_filename))?;
    t.push("image_hdu", i16_col(rows, |r| r.image_hdu))?;
    t.push("camera", str_col(rows, 9, |r| &r.camera))?;
    t.push("expnum", i64_col(rows, |r| r.expnum))?;
    t.push("plver", str_col(rows, 8, |r| &r.plver))?;
    t.push("procdate", str_col(rows, 19, |r| &r.procdate))?;
    t.push("plprocid", str_col(rows, 7, |r| &r.plprocid))?;
    t.push("ccdname", str_col(rows, 4, |r| &r.ccdname))?;
    t.push("object", str_col(rows, 35, |r| &r.object))?;
    t.push("propid", str_col(rows, 10, |r| &r.propid))?;
    t.push("filter", str_col(rows, 1, |r| &r.filter))?;
    t.push("exptime", f32_col(rows, |r| r.exptime))?;
    t.push("mjd_obs", f64_col(rows, |r| r.mjd_obs))?;
    t.push("airmass", f32_col(rows, |r| r.airmass))?;
    t.push("fwhm", f32_col(rows, |r| r.fwhm))?;
    t.push("width", i16_col(rows, |r| r.width as i64))?;
    t.push("height", i16_col(rows, |r| r.height as i64))?;
    t.push("ra_bore", f64_col(rows, |r| r.ra_bore))?;
    t.push("dec_bore", f64_col(rows, |r| r.dec_bore))?;
    t.push("ra", f64_col(rows, |r| r.ra))?;
    t.push("dec", f64_col(rows, |r| r.dec))?;
    t.push("crpix1", f32_col(rows, |r| r.crpix1))?;
    t.push("crpix2", f32_col(rows, |r| r.crpix2))?;
    t.push("crval1", f64_col(rows, |r| r.crval1))?;
    t.push("crval2", f64_col(rows, |r| r.crval2))?;
    t.push("cd1_1", f32_col(rows, |r| r.cd1_1))?;
    t.push("cd1_2", f32_col(rows, |r| r.cd1_2))?;
    t.push("cd2_1", f32_col(rows, |r| r.cd2_1))?;
    t.push("cd2_2", f32_col(rows, |r| r.cd2_2))?;
    t.push("yshift", bool_col(rows, |r| r.yshift))?;
    t.push("skyrms", f32_col(rows, |r| r.skyrms))?;
    t.push("sig1", f32_col(rows, |r| r.sig1))?;
    t.push("ccdskycounts", f32_col(rows, |r| r.ccdskycounts))?;
    t.push("ccdskysb", f32_col(rows, |r| r.ccdskysb))?;
    t.push("ccdzpt", f32_col(rows, |r| r.ccdzpt))?;
    t.push("zpt", f32_col(rows, |r| r.zpt))?;
    t.push("ccdraoff", f32_col(rows, |r| r.ccdraoff))?;
    t.push("ccddecoff", f32_col(rows, |r| r.ccddecoff))?;
    t.push("ccdrarms", f32_col(rows, |r| r.ccdrarms))?;
    t.push("ccddecrms", f32_col(rows, |r| r.ccddecrms))?;
    t.push("ccdphrms", f32_col(rows, |r| r.ccdphrms))?;
    t.push("phrms", f32_col(rows, |r| r.phrms))?;
    t.push("ccdnastrom", i16_col(rows, |r| r.ccdnastrom))?;
    t.push("ccdnphotom", i16_col(rows, |r| r.ccdnphotom))?;
    t.push("ccd_cuts", i32_col(rows, |r| r.ccd_cuts as i64))?;
    Ok(t)
}

/// Read a survey table written by [`survey_table`], e.g. to rerun the cuts
/// over a batch of exposures.
pub fn read_survey_table<P: AsRef<Path>>(path: P) -> Result<Vec<SurveyCcd>> {
    let path = path.as_ref();
    let t = BinTable::read(path)?;
    let num = |name: &str| -> Result<Vec<f64>> {
        t.column(name)
            .and_then(|c| c.as_f64())
            .with_context(|| format!("{}: missing numeric column {}", path.display(), name))
    };
    let text = |name: &str| -> Result<Vec<String>> {
        t.column(name)
            .and_then(|c| c.as_strings())
            .map(|s| s.iter().map(|v| v.trim().to_string()).collect())
            .with_context(|| format!("{}: missing string column {}", path.display(), name))
    };
    let ints = |name: &str| -> Result<Vec<i64>> {
        t.column(name)
            .and_then(|c| c.as_i64())
            .with_context(|| format!("{}: missing integer column {}", path.display(), name))
    };

    let image_filename = text("image_filename")?;
    let image_hdu = ints("image_hdu")?;
    let camera = text("camera")?;
    let expnum = ints("expnum")?;
    let plver = text("plver")?;
    let procdate = text("procdate")?;
    let plprocid = text("plprocid")?;
    let ccdname = text("ccdname")?;
    let object = text("object")?;
    let propid = text("propid")?;
    let filter = text("filter")?;
    let exptime = num("exptime")?;
    let mjd_obs = num("mjd_obs")?;
    let airmass = num("airmass")?;
    let fwhm = num("fwhm")?;
    let width = ints("width")?;
    let height = ints("height")?;
    let ra_bore = num("ra_bore")?;
    let dec_bore = num("dec_bore")?;
    let ra = num("ra")?;
    let dec = num("dec")?;
    let crpix1 = num("crpix1")?;
    let crpix2 = num("crpix2")?;
    let crval1 = num("crval1")?;
    let crval2 = num("crval2")?;
    let cd1_1 = num("cd1_1")?;
    let cd1_2 = num("cd1_2")?;
    let cd2_1 = num("cd2_1")?;
    let cd2_2 = num("cd2_2")?;
    let yshift = num("yshift")?;
    let skyrms = num("skyrms")?;
    let sig1 = num("sig1")?;
    let ccdskycounts = num("ccdskycounts")?;
    let ccdskysb = num("ccdskysb")?;
    let ccdzpt = num("ccdzpt")?;
    let zpt = num("zpt")?;
    let ccdraoff = num("ccdraoff")?;
    let ccddecoff = num("ccddecoff")?;
    let ccdrarms = num("ccdrarms")?;
    let ccddecrms = num("ccddecrms")?;
    let ccdphrms = num("ccdphrms")?;
    let phrms = num("phrms")?;
    let ccdnastrom = ints("ccdnastrom")?;
    let ccdnphotom = ints("ccdnphotom")?;
    let ccd_cuts = ints("ccd_cuts")?;

    Ok((0..t.nrows())
        .map(|i| SurveyCcd {
            image_filename: image_filename[i].clone(),
            image_hdu: image_hdu[i],
            camera: camera[i].clone(),
            expnum: expnum[i],
            plver: plver[i].clone(),
            procdate: procdate[i].clone(),
            plprocid: plprocid[i].clone(),
            ccdname: ccdname[i].clone(),
            object: object[i].clone(),
            propid: propid[i].clone(),
            filter: filter[i].clone(),
            exptime: exptime[i],
            mjd_obs: mjd_obs[i],
            airmass: airmass[i],
            fwhm: fwhm[i],
            width: width[i] as usize,
            height: height[i] as usize,
            ra_bore: ra_bore[i],
            dec_bore: dec_bore[i],
            ra: ra[i],
            dec: dec[i],
            crpix1: crpix1[i],
            crpix2: crpix2[i],
            crval1: crval1[i],
            crval2: crval2[i],
            cd1_1: cd1_1[i],
            cd1_2: cd1_2[i],
            cd2_1: cd2_1[i],
            cd2_2: cd2_2[i],
            yshift: yshift[i] != 0.0,
            skyrms: skyrms[i],
            sig1: sig1[i],
            ccdskycounts: ccdskycounts[i],
            ccdskysb: ccdskysb[i],
            ccdzpt: ccdzpt[i],
            zpt: zpt[i],
            ccdraoff: ccdraoff[i],
            ccddecoff: ccddecoff[i],
            ccdrarms: ccdrarms[i],
            ccddecrms: ccddecrms[i],
            ccdphrms: ccdphrms[i],
            phrms: phrms[i],
            ccdnastrom: ccdnastrom[i],
            ccdnphotom: ccdnphotom[i],
            ccd_cuts: ccd_cuts[i] as i32,
        })
        .collect())
}

// ── per-star table ─────────────────────────────────────────────────────────

/// A fitted star with the identifiers of the CCD it was measured on.
#[derive(Debug, Clone, PartialEq)]
pub struct StarRow {
    pub star: StarPhotometry,
    pub expnum: i64,
    pub ccdname: String,
    pub filter: String,
    pub exptime: f64,
    pub gain: f64,
    pub airmass: f64,
}

/// Aperture diameters, arcsec, matching the `apflux_<d>` columns.
pub const APERTURE_DIAMETERS: [u32; 3] = [6, 7, 8];

/// The per-star photometry table used for cross-calibration.
pub fn stars_table(rows: &[StarRow]) -> Result<BinTable> {
    let mut t = BinTable::new();
    t.push("ra", f64_col(rows, |r| r.star.radec().0))?;
    t.push("dec", f64_col(rows, |r| r.star.radec().1))?;
    t.push("flux", f32_col(rows, |r| r.star.fit.flux))?;
    t.push("dflux", f32_col(rows, |r| r.star.fit.dflux))?;
    t.push("chi2", f32_col(rows, |r| r.star.fit.chi2))?;
    t.push("fracmasked", f32_col(rows, |r| r.star.fit.fracmasked))?;
    t.push("instpsfmag", f32_col(rows, |r| r.star.instpsfmag))?;
    t.push("dpsfmag", f32_col(rows, |r| r.star.dpsfmag))?;
    t.push("bitmask", i32_col(rows, |r| r.star.bitmask as i64))?;
    t.push("x_fit", f32_col(rows, |r| r.star.fit.x1))?;
    t.push("y_fit", f32_col(rows, |r| r.star.fit.y1))?;
    t.push("gaia_sourceid", i64_col(rows, |r| r.star.refstar.gaia_sourceid))?;
    t.push("ra_gaia", f64_col(rows, |r| r.star.refstar.ra_gaia))?;
    t.push("dec_gaia", f64_col(rows, |r| r.star.refstar.dec_gaia))?;
    t.push("phot_g_mean_mag", f32_col(rows, |r| r.star.refstar.phot_g_mean_mag))?;
    t.push("phot_bp_mean_mag", f32_col(rows, |r| r.star.refstar.phot_bp_mean_mag))?;
    t.push("phot_rp_mean_mag", f32_col(rows, |r| r.star.refstar.phot_rp_mean_mag))?;
    t.push("phot_g_mean_mag_error", f32_col(rows, |r| r.star.refstar.phot_g_mean_mag_error))?;
    t.push("phot_bp_mean_mag_error", f32_col(rows, |r| r.star.refstar.phot_bp_mean_mag_error))?;
    t.push("phot_rp_mean_mag_error", f32_col(rows, |r| r.star.refstar.phot_rp_mean_mag_error))?;
    t.push("ps1_objid", i64_col(rows, |r| r.star.refstar.ps1_objid))?;
    t.push("ra_ps1", f64_col(rows, |r| r.star.refstar.ra_ps1))?;
    t.push("dec_ps1", f64_col(rows, |r| r.star.refstar.dec_ps1))?;
    for (k, b) in ["g", "r", "i", "z", "y"].iter().enumerate() {
        t.push(&format!("ps1_{}", b), f32_col(rows, |r| r.star.refstar.ps1_mag[k]))?;
    }
    t.push("legacy_survey_mag", f32_col(rows, |r| r.star.refstar.legacy_survey_mag))?;
    t.push("expnum", i64_col(rows, |r| r.expnum))?;
    t.push("ccdname", str_col(rows, 4, |r| &r.ccdname))?;
    t.push("exptime", f32_col(rows, |r| r.exptime))?;
    t.push("gain", f32_col(rows, |r| r.gain))?;
    t.push("airmass", f32_col(rows, |r| r.airmass))?;
    t.push("filter", str_col(rows, 1, |r| &r.filter))?;
    for (k, d) in APERTURE_DIAMETERS.iter().enumerate() {
        t.push(
            &format!("apflux_{}", d),
            f32_col(rows, |r| r.star.apflux.get(k).copied().unwrap_or(0.0)),
        )?;
    }
    for (k, d) in APERTURE_DIAMETERS.iter().enumerate() {
        t.push(
            &format!("apflux_{}_err", d),
            f32_col(rows, |r| r.star.apflux_err.get(k).copied().unwrap_or(0.0)),
        )?;
    }
    t.push("ra_now", f64_col(rows, |r| r.star.refstar.ra_now))?;
    t.push("dec_now", f64_col(rows, |r| r.star.refstar.dec_now))?;
    t.push("ra_fit", f64_col(rows, |r| r.star.fit.ra_fit))?;
    t.push("dec_fit", f64_col(rows, |r| r.star.fit.dec_fit))?;
    t.push("x_ref", f32_col(rows, |r| r.star.fit.x0))?;
    t.push("y_ref", f32_col(rows, |r| r.star.fit.y0))?;
    Ok(t)
}
