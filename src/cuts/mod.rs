//! Calibration cuts: flag CCDs unfit for science use.
//!
//! The engine works on a whole batch of survey rows. Zeropoints are first
//! detrended for airmass and time with the per-camera tables in [`tables`];
//! the detrended values only feed the `zpt_small`/`zpt_large` predicates and
//! are never written back. Each predicate then ORs its [`CutBit`] into
//! `ccd_cuts`. Bit values are fixed; new bits are only ever appended.

pub mod tables;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::camera::Camera;
use crate::ccds::SurveyCcd;
use crate::fits::BinTable;

pub use tables::{decam_ccdnum, BandTrend, DetrendTable, DECAM_DETREND, MJD0, MZLS_BASS_DETREND};

/// DECam exposures before this MJD are cut unless DES coadd membership says otherwise.
pub const MJD_EARLY_DECAM: f64 = 56730.0;
/// Mosaic3 exposures before this MJD without YSHIFT have the one-third-pixel
/// interpolation problem.
pub const MJD_MOSAIC_YSHIFT: f64 = 57674.0;
/// Last MJD covered by the DES image2coadd table.
pub const MJD_DES_Y1: f64 = 57432.0;
pub const DES_PROPID: &str = "2012B-0001";

// ── Cut bits ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i32)]
pub enum CutBit {
    ErrLegacyzpts = 0x1,
    NotGrz = 0x2,
    NotThirdPix = 0x4,
    Exptime = 0x8,
    Ccdnmatch = 0x10,
    ZptDiffAvg = 0x20,
    ZptSmall = 0x40,
    ZptLarge = 0x80,
    SkyIsBright = 0x100,
    BadexpFile = 0x200,
    Phrms = 0x400,
    Radecrms = 0x800,
    SeeingBad = 0x1000,
    EarlyDecam = 0x2000,
    DepthCut = 0x4000,
    TooManyBadCcds = 0x8000,
    FlaggedInDes = 0x10000,
    PhrmsS7 = 0x20000,
}

impl CutBit {
    /// Every bit, in increasing value.
    pub const ALL: [CutBit; 18] = [
        CutBit::ErrLegacyzpts,
        CutBit::NotGrz,
        CutBit::NotThirdPix,
        CutBit::Exptime,
        CutBit::Ccdnmatch,
        CutBit::ZptDiffAvg,
        CutBit::ZptSmall,
        CutBit::ZptLarge,
        CutBit::SkyIsBright,
        CutBit::BadexpFile,
        CutBit::Phrms,
        CutBit::Radecrms,
        CutBit::SeeingBad,
        CutBit::EarlyDecam,
        CutBit::DepthCut,
        CutBit::TooManyBadCcds,
        CutBit::FlaggedInDes,
        CutBit::PhrmsS7,
    ];

    pub fn value(self) -> i32 {
        self as i32
    }

    pub fn name(self) -> &'static str {
        match self {
            CutBit::ErrLegacyzpts => "err_legacyzpts",
            CutBit::NotGrz => "not_grz",
            CutBit::NotThirdPix => "not_third_pix",
            CutBit::Exptime => "exptime",
            CutBit::Ccdnmatch => "ccdnmatch",
            CutBit::ZptDiffAvg => "zpt_diff_avg",
            CutBit::ZptSmall => "zpt_small",
            CutBit::ZptLarge => "zpt_large",
            CutBit::SkyIsBright => "sky_is_bright",
            CutBit::BadexpFile => "badexp_file",
            CutBit::Phrms => "phrms",
            CutBit::Radecrms => "radecrms",
            CutBit::SeeingBad => "seeing_bad",
            CutBit::EarlyDecam => "early_decam",
            CutBit::DepthCut => "depth_cut",
            CutBit::TooManyBadCcds => "too_many_bad_ccds",
            CutBit::FlaggedInDes => "flagged_in_des",
            CutBit::PhrmsS7 => "phrms_s7",
        }
    }
}

/// Names of the bits set in `ccd_cuts`, in bit order.
pub fn cuts_to_string(ccd_cuts: i32, join: &str) -> String {
    CutBit::ALL
        .iter()
        .filter(|b| ccd_cuts & b.value() != 0)
        .map(|b| b.name())
        .collect::<Vec<_>>()
        .join(join)
}

// ── Per-camera configuration ───────────────────────────────────────────────

/// Cut thresholds for one camera.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraCuts {
    /// Allowed detrended zeropoint `(lo, hi)` per band. Other bands use `(0, 0)`.
    pub zpt_window: BTreeMap<String, (f64, f64)>,
    /// Maximum `hypot(ccdrarms, ccddecrms)`, arcsec.
    pub radec_rms: f64,
    /// Maximum sky counts per second per band. Other bands use 1e6.
    pub skybright: BTreeMap<String, f64>,
    /// Maximum `|ccdzpt - zpt|`.
    pub zpt_diff_avg: f64,
    pub pixscale: f64,
}

impl CameraCuts {
    /// Thresholds for `camera`. MegaPrime has no cut configuration.
    pub fn for_camera(camera: Camera) -> Result<Self> {
        let window = |bands: &[(&str, f64, (f64, f64))]| -> BTreeMap<String, (f64, f64)> {
            bands
                .iter()
                .map(|&(b, z0, (lo, hi))| (b.to_string(), (z0 + lo, z0 + hi)))
                .collect()
        };
        let bright = |bands: &[(&str, f64)]| -> BTreeMap<String, f64> {
            bands.iter().map(|&(b, v)| (b.to_string(), v)).collect()
        };
        let cuts = match camera {
            Camera::Mosaic => CameraCuts {
                zpt_window: window(&[("z", 26.20, (-1.0, 0.8))]),
                radec_rms: 0.1,
                skybright: bright(&[("z", 200.0)]),
                zpt_diff_avg: 0.1,
                pixscale: camera.pixscale(),
            },
            Camera::NinetyPrime => CameraCuts {
                zpt_window: window(&[("g", 25.74, (-0.5, 0.18)), ("r", 25.52, (-0.5, 0.18))]),
                radec_rms: 0.2,
                skybright: BTreeMap::new(),
                zpt_diff_avg: 0.1,
                pixscale: camera.pixscale(),
            },
            Camera::Decam => CameraCuts {
                zpt_window: window(&[
                    ("g", 25.08, (-0.5, 0.25)),
                    ("r", 25.29, (-0.5, 0.25)),
                    ("i", 25.26, (-0.5, 0.25)),
                    ("z", 24.92, (-0.5, 0.25)),
                    ("Y", 23.87, (-0.5, 0.25)),
                ]),
                radec_rms: 0.4,
                skybright: bright(&[("g", 90.0), ("r", 150.0), ("z", 180.0)]),
                zpt_diff_avg: 0.25,
                pixscale: camera.pixscale(),
            },
            Camera::MegaPrime => bail!("No calibration cuts defined for camera {}", camera),
        };
        Ok(cuts)
    }
}

// ── Bad exposure list ──────────────────────────────────────────────────────

/// `(expnum, ccdname)` to reason. A `None` CCD flags the whole exposure.
pub type BadExposures = BTreeMap<(i64, Option<String>), String>;

/// Parse a bad-exposure list: one `expnum` or `expnum-ccdname` per line,
/// followed by a free-text reason. `#` starts a comment line.
pub fn parse_bad_expid(text: &str) -> BadExposures {
    let mut bad = BadExposures::new();
    for line in text.lines() {
        if line.starts_with('#') {
            continue;
        }
        let mut words = line.split_whitespace();
        let Some(id) = words.next() else {
            continue;
        };
        let (expstr, ccd) = match id.split_once('-') {
            Some((e, c)) if !c.contains('-') => (e, Some(c.trim().to_string())),
            Some(_) => {
                warn!("Skipping bad-exposure line {:?}", line);
                continue;
            }
            None => (id, None),
        };
        let Ok(expnum) = expstr.parse::<i64>() else {
            warn!("Skipping bad-exposure line {:?}", line);
            continue;
        };
        let reason: Vec<&str> = words.collect();
        let reason = if reason.is_empty() {
            "unknown".to_string()
        } else {
            reason.join(" ")
        };
        bad.insert((expnum, ccd), reason);
    }
    bad
}

pub fn read_bad_expid<P: AsRef<Path>>(path: P) -> Result<BadExposures> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read bad-exposure list {}", path.display()))?;
    let bad = parse_bad_expid(&text);
    info!("Read {} bad exposure entries from {}", bad.len(), path.display());
    Ok(bad)
}

// ── DES coadd membership ───────────────────────────────────────────────────

/// CCDs used in the DES coadds, as `expnum * 100 + ccdnum`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Image2Coadd {
    ids: BTreeSet<i64>,
}

impl Image2Coadd {
    pub fn new(pairs: impl IntoIterator<Item = (i64, i64)>) -> Self {
        Self {
            ids: pairs.into_iter().map(|(e, c)| e * 100 + c).collect(),
        }
    }

    /// From a table with `expnum` and `ccdnum` columns.
    pub fn from_table(table: &BinTable) -> Result<Self> {
        let expnum = table
            .column("expnum")
            .and_then(|c| c.as_i64())
            .context("image2coadd table has no integer expnum column")?;
        let ccdnum = table
            .column("ccdnum")
            .and_then(|c| c.as_i64())
            .context("image2coadd table has no integer ccdnum column")?;
        Ok(Self::new(expnum.into_iter().zip(ccdnum)))
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_table(&BinTable::read(path)?)
    }

    pub fn contains(&self, expnum: i64, ccdnum: i64) -> bool {
        self.ids.contains(&(expnum * 100 + ccdnum))
    }
}

// ── Detrending ─────────────────────────────────────────────────────────────

/// `ccdzpt` corrected for airmass and time trends. Zero zeropoints stay zero.
pub fn detrend_zeropoints(rows: &[SurveyCcd], table: &DetrendTable) -> Vec<f64> {
    let mut zpt: Vec<f64> = rows.iter().map(|r| r.ccdzpt).collect();

    let mut n_airmass = 0;
    for &(band, k) in table.airmass_terms {
        for (z, r) in zpt.iter_mut().zip(rows) {
            if r.filter.trim() == band && r.airmass >= 1.0 {
                *z += k * (r.airmass - 1.0);
                n_airmass += 1;
            }
        }
    }
    if n_airmass < rows.len() {
        info!(
            "Did not detrend for airmass on {} CCDs (unknown band or bad airmass)",
            rows.len() - n_airmass
        );
    }

    let mut n_mjd = 0;
    for trend in table.mjd_terms {
        for (z, r) in zpt.iter_mut().zip(rows) {
            if r.filter.trim() != trend.band || r.mjd_obs <= 0.0 {
                continue;
            }
            let day = r.mjd_obs - MJD0;
            for &[day_i, day_f, zpt_i, zpt_f, c0, _] in trend.segments {
                if day >= day_i && day < day_f {
                    let c1 = (zpt_f - zpt_i) / (day_f - day_i);
                    *z += trend.zpt0 - (c0 + c1 * day);
                    n_mjd += 1;
                }
            }
        }
    }
    if n_mjd < rows.len() {
        info!(
            "Did not detrend for time on {} CCDs (unknown band or MJD)",
            rows.len() - n_mjd
        );
    }

    for (z, r) in zpt.iter_mut().zip(rows) {
        if r.ccdzpt == 0.0 {
            *z = 0.0;
        }
    }
    zpt
}

fn detrend_table(camera: Camera) -> &'static DetrendTable {
    match camera {
        Camera::Decam => &DECAM_DETREND,
        _ => &MZLS_BASS_DETREND,
    }
}

// ── Cut engine ─────────────────────────────────────────────────────────────

fn flag_rows(rows: &[SurveyCcd], f: &dyn Fn(usize, &SurveyCcd) -> bool) -> Vec<bool> {
    rows.iter().enumerate().map(|(i, r)| f(i, r)).collect()
}

/// Number of CCDs flagged by each predicate, in evaluation order.
pub type CutCounts = Vec<(CutBit, usize)>;

/// Evaluates the calibration cuts for one camera.
pub struct CutEngine<'a> {
    camera: Camera,
    cuts: CameraCuts,
    bad_expid: &'a BadExposures,
    image2coadd: Option<&'a Image2Coadd>,
}

impl<'a> CutEngine<'a> {
    pub fn new(camera: Camera, bad_expid: &'a BadExposures, image2coadd: Option<&'a Image2Coadd>) -> Result<Self> {
        Ok(Self {
            camera,
            cuts: CameraCuts::for_camera(camera)?,
            bad_expid,
            image2coadd,
        })
    }

    /// Use `cuts` instead of the camera defaults.
    pub fn with_cuts(mut self, cuts: CameraCuts) -> Self {
        self.cuts = cuts;
        self
    }

    /// Replace non-finite zeropoints with 0 and non-finite RMS values with 1.
    fn clean(rows: &mut [SurveyCcd]) {
        for r in rows.iter_mut() {
            if !r.zpt.is_finite() {
                r.zpt = 0.0;
            }
            if !r.ccdzpt.is_finite() {
                r.ccdzpt = 0.0;
            }
            for v in [&mut r.ccdphrms, &mut r.ccdrarms, &mut r.ccddecrms] {
                if !v.is_finite() {
                    *v = 1.0;
                }
            }
        }
    }

    fn flags(&self, rows: &[SurveyCcd]) -> Vec<(CutBit, Vec<bool>)> {
        let c = &self.cuts;
        let detrended = detrend_zeropoints(rows, detrend_table(self.camera));
        let seeing: Vec<f64> = rows
            .iter()
            .map(|r| if r.fwhm.is_finite() { r.fwhm * c.pixscale } else { 0.0 })
            .collect();
        let each = |f: &dyn Fn(usize, &SurveyCcd) -> bool| flag_rows(rows, f);
        let window = |band: &str| c.zpt_window.get(band.trim()).copied().unwrap_or((0.0, 0.0));

        let mut flags = vec![
            (CutBit::NotGrz, each(&|_, r| !"grz".contains(r.filter.trim()))),
            (CutBit::Ccdnmatch, each(&|_, r| r.ccdnphotom < 20)),
            (CutBit::ZptSmall, each(&|i, r| detrended[i] < window(&r.filter).0)),
            (CutBit::ZptLarge, each(&|i, r| detrended[i] > window(&r.filter).1)),
            (CutBit::Phrms, each(&|_, r| r.phrms > 0.1)),
            (CutBit::Exptime, each(&|_, r| r.exptime < 30.0)),
            (CutBit::SeeingBad, each(&|i, _| !(seeing[i] > 0.0 && seeing[i] < 3.0))),
            (
                CutBit::BadexpFile,
                each(&|_, r| {
                    self.bad_expid.contains_key(&(r.expnum, None))
                        || self.bad_expid.contains_key(&(r.expnum, Some(r.ccdname.trim().to_string())))
                }),
            ),
            (CutBit::Radecrms, each(&|_, r| r.ccdrarms.hypot(r.ccddecrms) > c.radec_rms)),
            (
                CutBit::SkyIsBright,
                each(&|_, r| {
                    let limit = c.skybright.get(r.filter.trim()).copied().unwrap_or(1e6);
                    r.ccdskycounts > limit || r.ccdskycounts * r.exptime > 35000.0
                }),
            ),
            (CutBit::ZptDiffAvg, each(&|_, r| (r.ccdzpt - r.zpt).abs() > c.zpt_diff_avg)),
            (CutBit::PhrmsS7, each(&|_, r| r.ccdphrms > 0.1 && r.ccdname.trim() == "S7")),
        ];

        if self.camera == Camera::Mosaic {
            flags.push((
                CutBit::NotThirdPix,
                each(&|_, r| !r.yshift && r.mjd_obs < MJD_MOSAIC_YSHIFT),
            ));
        }
        if self.camera == Camera::Decam {
            match self.image2coadd {
                Some(i2c) => flags.push((
                    CutBit::FlaggedInDes,
                    each(&|_, r| {
                        let in_coadd = decam_ccdnum(&r.ccdname).is_some_and(|n| i2c.contains(r.expnum, n));
                        r.propid.trim() == DES_PROPID && r.mjd_obs < MJD_DES_Y1 && !in_coadd
                    }),
                )),
                None => {
                    info!("Removing all early DECam data");
                    flags.push((CutBit::EarlyDecam, each(&|_, r| r.mjd_obs < MJD_EARLY_DECAM)));
                }
            }
        }
        flags
    }

    /// Clean the rows, then set `ccd_cuts` on every row from scratch.
    pub fn apply(&self, rows: &mut [SurveyCcd]) -> CutCounts {
        Self::clean(rows);
        let flags = self.flags(rows);
        for r in rows.iter_mut() {
            r.ccd_cuts = 0;
        }
        let mut counts = CutCounts::new();
        for (bit, cut) in flags {
            let n = cut.iter().filter(|&&c| c).count();
            for (r, &hit) in rows.iter_mut().zip(&cut) {
                if hit {
                    r.ccd_cuts |= bit.value();
                }
            }
            info!("{} CCDs cut by {}", n, bit.name());
            counts.push((bit, n));
        }
        counts
    }
}

/// Apply the default cuts for `camera` to `rows`.
pub fn add_psfzpt_cuts(
    rows: &mut [SurveyCcd],
    camera: Camera,
    bad_expid: &BadExposures,
    image2coadd: Option<&Image2Coadd>,
) -> Result<CutCounts> {
    Ok(CutEngine::new(camera, bad_expid, image2coadd)?.apply(rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A DECam g-band CCD that passes every cut.
    fn good_row() -> SurveyCcd {
        SurveyCcd {
            camera: "decam".into(),
            expnum: 611450,
            ccdname: "N4".into(),
            filter: "g".into(),
            propid: "2014B-0404".into(),
            exptime: 90.0,
            mjd_obs: 57754.1,
            airmass: 1.0,
            fwhm: 4.5,
            ccdzpt: 25.10,
            zpt: 25.12,
            ccdnphotom: 150,
            ccdnastrom: 300,
            phrms: 0.02,
            ccdphrms: 0.02,
            ccdrarms: 0.05,
            ccddecrms: 0.05,
            ccdskycounts: 10.0,
            ..Default::default()
        }
    }

    fn cuts_of(rows: &mut [SurveyCcd], bad: &BadExposures) -> Vec<i32> {
        add_psfzpt_cuts(rows, Camera::Decam, bad, None).unwrap();
        rows.iter().map(|r| r.ccd_cuts).collect()
    }

    #[test]
    fn test_cuts_to_string() {
        let bits = CutBit::Exptime.value() | CutBit::NotGrz.value() | CutBit::PhrmsS7.value();
        assert_eq!(cuts_to_string(bits, ", "), "not_grz, exptime, phrms_s7");
        assert_eq!(cuts_to_string(0, ", "), "");
        assert_eq!(CutBit::FlaggedInDes.value(), 0x10000);
    }

    #[test]
    fn test_good_row_passes() {
        let mut rows = vec![good_row()];
        let cuts = cuts_of(&mut rows, &BadExposures::new());
        assert_eq!(cuts[0], 0, "unexpected cuts {}", cuts_to_string(cuts[0], ","));
    }

    #[test]
    fn test_individual_predicates() {
        let mut short = good_row();
        short.exptime = 20.0;
        let mut faint = good_row();
        faint.ccdzpt = 24.0;
        faint.zpt = 24.0;
        let mut i_band = good_row();
        i_band.filter = "i".into();
        i_band.ccdzpt = 25.26;
        i_band.zpt = 25.26;
        let mut s7 = good_row();
        s7.ccdname = "S7".into();
        s7.ccdphrms = 0.2;
        let mut nan_rms = good_row();
        nan_rms.ccdrarms = f64::NAN;
        let mut early = good_row();
        early.mjd_obs = 56700.0;

        let mut rows = vec![short, faint, i_band, s7, nan_rms, early];
        let cuts = cuts_of(&mut rows, &BadExposures::new());
        assert_eq!(cuts[0], CutBit::Exptime.value());
        assert_eq!(cuts[1] & CutBit::ZptSmall.value(), CutBit::ZptSmall.value());
        assert_eq!(cuts[2], CutBit::NotGrz.value());
        assert_eq!(cuts[3], CutBit::PhrmsS7.value());
        assert_eq!(cuts[4], CutBit::Radecrms.value(), "NaN RMS becomes 1");
        assert_eq!(rows[4].ccdrarms, 1.0);
        assert_ne!(cuts[5] & CutBit::EarlyDecam.value(), 0);
    }

    #[test]
    fn test_bad_exposure_list() {
        let bad = parse_bad_expid("# comment\n\n611450-N4 bad guiding\n611451\nxyz-N4 junk\n611452-S1-S2 nope\n");
        assert_eq!(bad.len(), 2);
        assert_eq!(bad[&(611450, Some("N4".to_string()))], "bad guiding");
        assert_eq!(bad[&(611451, None)], "unknown");

        let mut other_ccd = good_row();
        other_ccd.ccdname = "N5".into();
        let mut whole = good_row();
        whole.expnum = 611451;
        let mut rows = vec![good_row(), other_ccd, whole];
        let cuts = cuts_of(&mut rows, &bad);
        assert_eq!(cuts, vec![CutBit::BadexpFile.value(), 0, CutBit::BadexpFile.value()]);
    }

    #[test]
    fn test_read_bad_expid_and_custom_cuts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad_expid.txt");
        std::fs::write(&path, "611450 readout glitch\n").unwrap();
        let bad = read_bad_expid(&path).unwrap();
        assert_eq!(bad[&(611450, None)], "readout glitch");
        assert!(read_bad_expid(dir.path().join("missing.txt")).is_err());

        let mut cuts = CameraCuts::for_camera(Camera::Decam).unwrap();
        cuts.radec_rms = 0.01;
        let none = BadExposures::new();
        let engine = CutEngine::new(Camera::Decam, &none, None).unwrap().with_cuts(cuts);
        let mut rows = vec![good_row()];
        engine.apply(&mut rows);
        assert_eq!(rows[0].ccd_cuts, CutBit::Radecrms.value());
    }

    #[test]
    fn test_cuts_are_monotonic() {
        let mut rows = vec![good_row()];
        let before = cuts_of(&mut rows, &BadExposures::new())[0];
        let mut bright = rows[0].clone();
        bright.ccdskycounts = 500.0;
        let mut rows = vec![bright];
        let after = cuts_of(&mut rows, &BadExposures::new())[0];
        assert_eq!(after & before, before);
        assert!(after > before);
        let mut rows = vec![rows[0].clone()];
        rows[0].exptime = 10.0;
        let more = cuts_of(&mut rows, &BadExposures::new())[0];
        assert_eq!(more & after, after, "adding a defect never clears a bit");
    }

    #[test]
    fn test_detrend_airmass_and_time() {
        let mut r = good_row();
        r.airmass = 1.2;
        r.mjd_obs = MJD0 + 100.0;
        r.ccdzpt = 25.0;
        let mut zero = r.clone();
        zero.ccdzpt = 0.0;
        let z = detrend_zeropoints(&[r, zero], &DECAM_DETREND);
        // g segment 0..160: slope (25.130 - 25.170) / 160
        let c1 = (25.130 - 25.170) / 160.0;
        let want = 25.0 + 0.173 * 0.2 + 25.08 - (25.170 + c1 * 100.0);
        assert!((z[0] - want).abs() < 1e-12, "{} vs {}", z[0], want);
        assert_eq!(z[1], 0.0, "zero zeropoints stay zero");
    }

    #[test]
    fn test_des_membership() {
        let i2c = Image2Coadd::new([(611450, 35)]);
        let mut des = good_row();
        des.propid = DES_PROPID.into();
        des.mjd_obs = 57000.0;
        let mut des_missing = des.clone();
        des_missing.ccdname = "N5".into();
        let mut rows = vec![des, des_missing];
        add_psfzpt_cuts(&mut rows, Camera::Decam, &BadExposures::new(), Some(&i2c)).unwrap();
        assert_eq!(rows[0].ccd_cuts & CutBit::FlaggedInDes.value(), 0, "N4 is CCD 35");
        assert_ne!(rows[1].ccd_cuts & CutBit::FlaggedInDes.value(), 0);
        assert_eq!(rows[0].ccd_cuts & CutBit::EarlyDecam.value(), 0);
    }

    #[test]
    fn test_mosaic_third_pixel_and_megaprime() {
        let mut r = good_row();
        r.filter = "z".into();
        r.ccdzpt = 26.2;
        r.zpt = 26.2;
        r.fwhm = 4.0;
        r.ccdskycounts = 50.0;
        r.mjd_obs = 57500.0;
        let mut shifted = r.clone();
        shifted.yshift = true;
        let mut rows = vec![r, shifted];
        add_psfzpt_cuts(&mut rows, Camera::Mosaic, &BadExposures::new(), None).unwrap();
        assert_ne!(rows[0].ccd_cuts & CutBit::NotThirdPix.value(), 0);
        assert_eq!(rows[1].ccd_cuts & CutBit::NotThirdPix.value(), 0);
        assert!(CameraCuts::for_camera(Camera::MegaPrime).is_err());
    }
}
