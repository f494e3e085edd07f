//! End-to-end measurement of a synthetic DECam exposure: reference star
//! selection, forced photometry, zeropoint and astrometric offsets, the skip
//! paths for unusable CCDs, and the output tables.


use legacyzpts::accessor::{ExposureSource, MemoryExposure};
use legacyzpts::camera::Camera;
use legacyzpts::ccds::read_survey_table;
use legacyzpts::exposure::{
    output_base, write_ccds, write_outputs, ExposureOutcome, ExposureResult, MeasureConfig, Measurer,
};
use legacyzpts::fits::BinTable;
use legacyzpts::plane::Plane;
use legacyzpts::psf::{gaussian_stamp, PsfExModel};
use legacyzpts::CalibrationArtifacts;

fn measure(config: &MeasureConfig, artifacts: &CalibrationArtifacts) -> ExposureResult {
    measure_exposure(&synthetic::exposure(42), config, artifacts)
}

fn measure_exposure(exp: &MemoryExposure, config: &MeasureConfig, artifacts: &CalibrationArtifacts) -> ExposureResult {
    let cats = synthetic::catalogs();
    let m = Measurer::new(Camera::Decam, exp, &cats, config).expect("primary header");
    match m.measure_image(Some(artifacts)).expect("measure_image") {
        ExposureOutcome::Measured(result) => result,
        ExposureOutcome::NeedsCalibration { expnum } => {
            panic!("artifacts for {} should validate", expnum)
        }
    }
}

#[test]
fn test_measure_synthetic_exposure() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();

    let config = MeasureConfig {
        threads: 2,
        ..Default::default()
    };
    let result = measure(&config, &synthetic::artifacts());
    println!("{}", result.report);

    assert_eq!(result.ccds.len(), 2, "one row per extension");
    let n4 = &result.ccds[0];
    let n5 = &result.ccds[1];
    assert_eq!(n4.ccdname, "N4");
    assert_eq!(n5.ccdname, "N5", "rows stay in extension order");

    // Measured CCD
    assert!(n4.err_message.is_empty(), "N4 skipped: {}", n4.err_message);
    assert!(
        (n4.zpt - synthetic::TRUE_ZPT).abs() < 0.02,
        "zpt {} vs true {}",
        n4.zpt,
        synthetic::TRUE_ZPT
    );
    assert!(n4.phrms < 0.02, "phrms {}", n4.phrms);
    assert!(
        (n4.decoff - synthetic::GAIA_DEC_OFFSET).abs() < 0.03,
        "decoff {}",
        n4.decoff
    );
    assert!(n4.raoff.abs() < 0.03, "raoff {}", n4.raoff);
    assert_eq!(n4.nstars_photom, synthetic::nstars());
    assert!(n4.nstars_astrom >= synthetic::nstars() / 2, "nastrom {}", n4.nstars_astrom);
    assert!(n4.transp > 0.0, "transparency {}", n4.transp);
    assert!(
        (n4.skycounts * synthetic::EXPTIME - synthetic::SKY_LEVEL).abs() < 0.5,
        "sky counts {}",
        n4.skycounts
    );
    assert!((n4.gain - 4.1).abs() < 1e-12);
    assert_eq!(n4.ccdnum, 35);
    assert_eq!(n4.expid, "00611450-N4");
    assert_eq!(n4.image_hdu, 1);

    // Dead CCD
    assert_eq!(n5.err_message, "All weight-map pixels are zero on CCD N5");
    assert_eq!(n5.zpt, 0.0);
    assert_eq!(result.report.nccds, 2);
    assert_eq!(result.report.nskipped(), 1);

    // Stars
    assert_eq!(result.stars.len(), synthetic::nstars());
    assert_eq!(result.report.nfits, synthetic::nstars());
    for row in &result.stars {
        assert_eq!(row.ccdname, "N4");
        assert_eq!(row.star.apflux.len(), 3, "one aperture flux per diameter");
        assert!(
            row.star.apflux.windows(2).all(|w| w[1] >= w[0] * 0.99),
            "aperture fluxes should grow with radius: {:?}",
            row.star.apflux
        );
        assert!(
            (row.star.psfmag - row.star.refstar.legacy_survey_mag).abs() < 0.05,
            "psfmag {} vs catalog {}",
            row.star.psfmag,
            row.star.refstar.legacy_survey_mag
        );
    }

    // Exposure averages and provenance
    assert!(n4.zptavg.is_finite());
    assert_eq!(result.header.get_i64("EXPNUM"), Some(synthetic::EXPNUM));
    assert_eq!(result.header.get_str("PLPROCID").as_deref(), Some(synthetic::PLPROCID));
}

#[test]
fn test_choose_ccd_and_outputs() {
    let _ = tracing_subscriber::fmt().with_env_filter("warn").try_init();

    let config = MeasureConfig {
        choose_ccd: Some("N4".to_string()),
        threads: 1,
        ..Default::default()
    };
    let result = measure(&config, &synthetic::artifacts());
    assert_eq!(result.ccds.len(), 1);
    assert_eq!(result.ccds[0].zptavg, result.ccds[0].zpt);

    let dir = tempfile::tempdir().unwrap();
    let exp = synthetic::exposure(1);
    let base = output_base(dir.path(), exp.filename());
    let (photom, survey) = write_outputs(&result, &base).unwrap();
    assert!(photom.ends_with("data/CP20170101/c4d_170101_030000_ooi_g_ls9-photom.fits"));
    assert!(survey.exists());

    let stars = BinTable::read(&photom).unwrap();
    assert_eq!(stars.nrows(), synthetic::nstars());
    assert_eq!(stars.header.get_i64("EXPNUM"), Some(synthetic::EXPNUM));

    let rows = read_survey_table(&survey).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].ccdname, "N4");
    assert!((rows[0].ccdzpt - result.ccds[0].zpt).abs() < 1e-4, "f32 column round trip");

    let ccds_path = dir.path().join("ccds.fits");
    write_ccds(&result.ccds, &result.header, &ccds_path).unwrap();
    let ccds = BinTable::read(&ccds_path).unwrap();
    assert_eq!(ccds.column("ccdname").unwrap().as_strings().unwrap()[0], "N4");
    assert_eq!(ccds.column("err_message").unwrap().as_strings().unwrap()[0], "");
}

#[test]
fn test_stale_artifacts() {
    let exp = synthetic::exposure(7);
    let cats = synthetic::catalogs();
    let config = MeasureConfig::default();
    let m = Measurer::new(Camera::Decam, &exp, &cats, &config).unwrap();

    let mut stale = synthetic::artifacts();
    stale.rows[1].plprocid = "0000000".to_string();
    match m.measure_image(Some(&stale)).unwrap() {
        ExposureOutcome::NeedsCalibration { expnum } => assert_eq!(expnum, synthetic::EXPNUM),
        ExposureOutcome::Measured(_) => panic!("a mismatched PLPROCID must invalidate the artifacts"),
    }

    // Saved artifacts load back and still validate.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("611450-calib.rkyv");
    synthetic::artifacts().save_to_file(&path).unwrap();
    let loaded = CalibrationArtifacts::load_from_file(&path).unwrap();
    assert!(loaded.validate(&m.info().stamp()));
    assert_eq!(loaded.get("N4").and_then(|r| r.psf.as_ref()).map(|p| p.fwhm), Some(synthetic::FWHM_PIX));
}

#[test]
fn test_missing_psf_is_skipped() {
    let mut artifacts = synthetic::artifacts();
    artifacts.rows[0].psf = None;
    let config = MeasureConfig {
        choose_ccd: Some("N4".to_string()),
        ..Default::default()
    };
    let result = measure(&config, &artifacts);
    assert_eq!(result.ccds[0].err_message, "Bad PSF model");
    assert_eq!(result.ccds[0].zpt, 0.0);
    assert!(result.stars.is_empty());
}

#[test]
fn test_singular_cd_skips_only_that_ccd() {
    let _ = tracing_subscriber::fmt().with_env_filter("warn").try_init();

    let mut exp = synthetic::exposure(42);
    exp.ccds[1].header.set("CD1_1", 0.0, None);
    exp.ccds[1].header.set("CD2_2", 0.0, None);
    let result = measure_exposure(&exp, &MeasureConfig::default(), &synthetic::artifacts());

    assert_eq!(result.ccds.len(), 2);
    let (n4, n5) = (&result.ccds[0], &result.ccds[1]);
    assert!(n4.err_message.is_empty(), "N4 skipped: {}", n4.err_message);
    assert!((n4.zpt - synthetic::TRUE_ZPT).abs() < 0.02, "zpt {}", n4.zpt);
    assert_eq!(n5.err_message, "WCS Failed");
    assert_eq!(n5.zpt, 0.0);
    assert!(n5.ra.is_finite() && n5.dec.is_finite(), "placeholder position");
    assert_eq!(result.report.skipped.get("WCS Failed"), Some(&1));
}

#[test]
fn test_missing_wcscal_skips_every_ccd() {
    let mut exp = synthetic::exposure(42);
    exp.primary.remove("WCSCAL");
    let result = measure_exposure(&exp, &MeasureConfig::default(), &synthetic::artifacts());

    for ccd in &result.ccds {
        assert_eq!(ccd.err_message, "WCS Failed", "CCD {}", ccd.ccdname);
        assert_eq!(ccd.zpt, 0.0);
    }
    assert!(result.stars.is_empty());
    assert_eq!(result.report.nskipped(), 2);
}

#[test]
fn test_zero_exptime_is_skipped() {
    let mut exp = synthetic::exposure(42);
    exp.primary.set("EXPTIME", 0.0, None);
    let result = measure_exposure(&exp, &MeasureConfig::default(), &synthetic::artifacts());

    for ccd in &result.ccds {
        assert_eq!(ccd.err_message, "Exptime = 0", "CCD {}", ccd.ccdname);
        assert_eq!(ccd.zpt, 0.0);
    }
    assert_eq!(result.report.skipped.get("Exptime = 0"), Some(&2));
}

#[test]
fn test_unit_weight_map_is_skipped() {
    let mut exp = synthetic::exposure(42);
    let (w, h) = (exp.ccds[0].weight.width(), exp.ccds[0].weight.height());
    exp.ccds[0].weight = Plane::filled(w, h, 1.0);
    let config = MeasureConfig {
        choose_ccd: Some("N4".to_string()),
        ..Default::default()
    };
    let result = measure_exposure(&exp, &config, &synthetic::artifacts());

    assert_eq!(result.ccds[0].err_message, "All weight-map pixels are zero or one");
    assert_eq!(result.ccds[0].zpt, 0.0);
    assert!(result.stars.is_empty());
}

#[test]
fn test_inconsistent_psf_is_bad_psf() {
    let _ = tracing_subscriber::fmt().with_env_filter("warn").try_init();

    // Degree 2 needs 6 basis images; this model carries one.
    let one_term = PsfExModel::constant(&gaussian_stamp(25, synthetic::FWHM_PIX), synthetic::FWHM_PIX);
    let broken = PsfExModel { degree: 2, ..one_term };
    let mut artifacts = synthetic::artifacts();
    artifacts.rows[0].psf = Some(broken);
    let config = MeasureConfig {
        choose_ccd: Some("N4".to_string()),
        ..Default::default()
    };

    // Used directly.
    let result = measure(&config, &artifacts);
    assert_eq!(result.ccds[0].err_message, "Bad PSF model");
    assert_eq!(result.ccds[0].zpt, 0.0);

    // Saved and reloaded: the row survives without its PSF.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("611450-calib.rkyv");
    artifacts.save_to_file(&path).unwrap();
    let loaded = CalibrationArtifacts::load_from_file(&path).unwrap();
    assert!(loaded.get("N4").unwrap().psf.is_none());
    assert!(loaded.get("N5").unwrap().psf.is_some());
    let result = measure(&config, &loaded);
    assert_eq!(result.ccds[0].err_message, "Bad PSF model");
    assert!(result.stars.is_empty());
}
