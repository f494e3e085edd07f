//! Calibration cuts on survey rows produced by the measurement pipeline.


use legacyzpts::camera::Camera;
use legacyzpts::ccds::{read_survey_table, survey_table, SurveyCcd};
use legacyzpts::cuts::{add_psfzpt_cuts, cuts_to_string, parse_bad_expid, CutBit, CutEngine, Image2Coadd};
use legacyzpts::exposure::{ExposureOutcome, MeasureConfig, Measurer};
use legacyzpts::fits::write_table;

fn measured_rows() -> Vec<SurveyCcd> {
    let exp = synthetic::exposure(11);
    let cats = synthetic::catalogs();
    let config = MeasureConfig::default();
    let m = Measurer::new(Camera::Decam, &exp, &cats, &config).unwrap();
    let ExposureOutcome::Measured(result) = m.measure_image(Some(&synthetic::artifacts())).unwrap() else {
        panic!("artifacts should validate");
    };
    result.ccds.iter().map(SurveyCcd::from_zeropoint).collect()
}

#[test]
fn test_cuts_on_measured_exposure() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();

    let mut rows = measured_rows();
    assert_eq!(rows.len(), 2);
    assert!(
        rows.iter().all(|r| r.ccd_cuts == CutBit::ErrLegacyzpts.value()),
        "fresh survey rows start flagged"
    );

    let bad = parse_bad_expid("# expnum-ccd reason\n611450-N5 dead amplifier\n");
    let counts = add_psfzpt_cuts(&mut rows, Camera::Decam, &bad, None).unwrap();
    assert!(counts.iter().any(|&(b, _)| b == CutBit::EarlyDecam));

    // N5 was skipped: zero zeropoint, no stars, listed as bad. The zero
    // ccdzpt also pulls the exposure average away from N4.
    let n5 = &rows[1];
    for bit in [CutBit::ZptSmall, CutBit::Ccdnmatch, CutBit::BadexpFile] {
        assert!(
            n5.ccd_cuts & bit.value() != 0,
            "N5 should have {}: {}",
            bit.name(),
            cuts_to_string(n5.ccd_cuts, ",")
        );
    }

    let n4 = &rows[0];
    assert_eq!(
        n4.ccd_cuts & !CutBit::ZptDiffAvg.value(),
        0,
        "N4 cut by {}",
        cuts_to_string(n4.ccd_cuts, ",")
    );
}

#[test]
fn test_survey_file_round_trip_then_cut() {
    let _ = tracing_subscriber::fmt().with_env_filter("warn").try_init();

    let mut rows = measured_rows();
    rows.truncate(1);
    rows[0].zpt = rows[0].ccdzpt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("survey-ccds.fits");
    write_table(&path, &survey_table(&rows).unwrap()).unwrap();
    let mut back = read_survey_table(&path).unwrap();
    assert_eq!(back.len(), 1);

    let bad = parse_bad_expid("");
    let engine = CutEngine::new(Camera::Decam, &bad, None).unwrap();
    engine.apply(&mut back);
    assert_eq!(back[0].ccd_cuts, 0, "cut by {}", cuts_to_string(back[0].ccd_cuts, ","));

    // Re-running is idempotent.
    engine.apply(&mut back);
    assert_eq!(back[0].ccd_cuts, 0);

    // The whole exposure listed as bad.
    let bad = parse_bad_expid("611450 focus run\n");
    add_psfzpt_cuts(&mut back, Camera::Decam, &bad, None).unwrap();
    assert_eq!(back[0].ccd_cuts, CutBit::BadexpFile.value());
}

#[test]
fn test_des_membership_replaces_early_cut() {
    let mut rows = measured_rows();
    rows.truncate(1);
    rows[0].zpt = rows[0].ccdzpt;
    rows[0].propid = "2012B-0001".to_string();
    rows[0].mjd_obs = 57000.0;

    let bad = parse_bad_expid("");
    let coadd = Image2Coadd::new([(synthetic::EXPNUM, 36)]);
    add_psfzpt_cuts(&mut rows, Camera::Decam, &bad, Some(&coadd)).unwrap();
    assert!(
        rows[0].ccd_cuts & CutBit::FlaggedInDes.value() != 0,
        "N4 (ccdnum 35) is not in the coadd list"
    );
    assert_eq!(rows[0].ccd_cuts & CutBit::EarlyDecam.value(), 0);

    let coadd = Image2Coadd::new([(synthetic::EXPNUM, 35)]);
    add_psfzpt_cuts(&mut rows, Camera::Decam, &bad, Some(&coadd)).unwrap();
    assert_eq!(rows[0].ccd_cuts & CutBit::FlaggedInDes.value(), 0);
}

#[test]
fn test_megaprime_has_no_cuts() {
    let bad = parse_bad_expid("");
    assert!(CutEngine::new(Camera::MegaPrime, &bad, None).is_err());
}
