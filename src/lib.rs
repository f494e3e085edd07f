//! # legacyzpts
//!
//! Per-CCD photometric zeropoints, astrometric offsets and calibration cuts
//! for wide-field survey imaging from DECam, Mosaic3, 90Prime and MegaPrime.
//!
//! For each CCD of an exposure the pipeline reads the image, weight map and
//! data-quality mask, estimates the sky, selects Gaia and PS1 reference stars
//! inside the WCS footprint, forced-fits each star with the pixelized PSF
//! model and derives the zeropoint, transparency and astrometric offsets with
//! sigma-clipped statistics. Results are written as a per-CCD zeropoint table
//! and a per-star photometry table. A separate cut engine flags CCDs unfit for
//! science use with a bitmask after detrending zeropoints for airmass and time.
//!
//! ## Example
//!
//! ```no_run
//! use legacyzpts::{
//!     write_outputs, output_base, CalibrationArtifacts, Camera, ExposureOutcome,
//!     ExposureSource, FitsExposure, MeasureConfig, MemoryCatalogs, Measurer,
//! };
//!
//! let source = FitsExposure::open("decam/c4d_170101_000000_ooi_g_v1.fits.fz").unwrap();
//! let catalogs = MemoryCatalogs::from_csv("gaia.csv", Some("ps1.csv")).unwrap();
//! let artifacts = CalibrationArtifacts::load_from_file("calib/611450.rkyv").unwrap();
//!
//! let config = MeasureConfig::default();
//! let measurer = Measurer::new(Camera::Decam, &source, &catalogs, &config).unwrap();
//! match measurer.measure_image(Some(&artifacts)).unwrap() {
//!     ExposureOutcome::Measured(result) => {
//!         let base = output_base("zpts", source.filename());
//!         write_outputs(&result, &base).unwrap();
//!         println!("{}", result.report);
//!     }
//!     ExposureOutcome::NeedsCalibration { expnum } => {
//!         println!("Exposure {expnum} needs PSF and sky calibration first");
//!     }
//! }
//! ```
//!
//! ## Layout
//!
//! - [`fits`], [`wcs`], [`plane`]: FITS headers, images and binary tables; TAN WCS.
//! - [`accessor`]: camera-specific header parsing, pixel scaling and mask remaps.
//! - [`catalogs`], [`refstars`]: Gaia and PS1 reference stars, color terms, matching.
//! - [`sky`], [`psf`], [`photometry`], [`aperture`]: per-CCD measurement pieces.
//! - [`zeropoint`], [`exposure`]: zeropoint estimation and the per-exposure driver.
//! - [`ccds`], [`report`]: output tables and the skip audit.
//! - [`cuts`]: detrending and calibration cut bits.
//! - [`catalog`]: fitted source catalog serialization.

pub mod accessor;
pub mod aperture;
pub mod artifacts;
pub mod astrometry;
pub mod camera;
pub mod catalog;
pub mod catalogs;
pub mod ccds;
pub mod cuts;
pub mod exposure;
pub mod fits;
pub mod photometry;
pub mod plane;
pub mod psf;
pub mod refstars;
pub mod report;
pub mod sky;
pub mod stats;
pub mod wcs;
pub mod zeropoint;

pub use accessor::{
    accessor_for, ExposureSource, FitsExposure, ImageAccessor, MemoryCcd, MemoryExposure,
};
pub use artifacts::{CalibrationArtifacts, CalibrationRow, ExposureStamp};
pub use camera::Camera;
pub use catalog::{read_catalog, write_catalog, Source, SourceType};
pub use catalogs::{GaiaStar, MemoryCatalogs, Ps1Star, ReferenceCatalogSource};
pub use ccds::{CcdZeropoint, StarRow, SurveyCcd};
pub use cuts::{add_psfzpt_cuts, CameraCuts, CutBit, CutEngine};
pub use exposure::{
    output_base, write_outputs, ExposureOutcome, ExposureResult, MeasureConfig, Measurer,
};
pub use plane::{Plane, Region};
pub use psf::PsfExModel;
pub use report::{SkipReason, SkipReport};
pub use wcs::Wcs;

