//! Fitted source catalogs as FITS binary tables.
//!
//! Point sources and galaxy models from an external fitter are written one
//! row per source. Per-band fluxes go in array columns whose order is given
//! by the `BANDS` header card.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, ensure, Context, Result};
use tracing::debug;

use crate::fits::{write_table, BinTable, ColumnData};

/// Source model family, stored as a three-letter code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceType {
    /// Point source.
    Psf,
    /// Round exponential galaxy.
    Rex,
    Exp,
    /// de Vaucouleurs.
    Dev,
    Ser,
    /// Gaia star kept as a duplicate of a fitted source.
    Dup,
    Nun,
}

impl SourceType {
    pub fn code(self) -> &'static str {
        match self {
            SourceType::Psf => "PSF",
            SourceType::Rex => "REX",
            SourceType::Exp => "EXP",
            SourceType::Dev => "DEV",
            SourceType::Ser => "SER",
            SourceType::Dup => "DUP",
            SourceType::Nun => "NUN",
        }
    }

    /// Galaxy types carry a shape.
    pub fn has_shape(self) -> bool {
        matches!(self, SourceType::Rex | SourceType::Exp | SourceType::Dev | SourceType::Ser)
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for SourceType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim() {
            "PSF" => SourceType::Psf,
            "REX" => SourceType::Rex,
            "EXP" => SourceType::Exp,
            "DEV" => SourceType::Dev,
            "SER" => SourceType::Ser,
            "DUP" => SourceType::Dup,
            "NUN" => SourceType::Nun,
            other => bail!("Unknown source type {:?}", other),
        })
    }
}

/// Effective radius (arcsec) and ellipticity components, with inverse variances.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Shape {
    pub r: f64,
    pub e1: f64,
    pub e2: f64,
    pub r_ivar: f64,
    pub e1_ivar: f64,
    pub e2_ivar: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub kind: SourceType,
    pub ra: f64,
    pub dec: f64,
    pub ra_ivar: f64,
    pub dec_ivar: f64,
    /// One entry per catalog band.
    pub flux: Vec<f64>,
    pub flux_ivar: Vec<f64>,
    /// Set for galaxy types only.
    pub shape: Option<Shape>,
    /// Sersic index and its inverse variance, set for `SER` only.
    pub sersic: Option<(f64, f64)>,
}

impl Source {
    pub fn point(ra: f64, dec: f64, flux: Vec<f64>, flux_ivar: Vec<f64>) -> Self {
        Self {
            kind: SourceType::Psf,
            ra,
            dec,
            ra_ivar: 0.0,
            dec_ivar: 0.0,
            flux,
            flux_ivar,
            shape: None,
            sersic: None,
        }
    }
}

// ── Write ──────────────────────────────────────────────────────────────────

/// Build the catalog table. Fluxes with zero inverse variance are written as 0.
pub fn catalog_table(sources: &[Source], bands: &[&str]) -> Result<BinTable> {
    let nb = bands.len();
    ensure!(nb > 0, "Catalog needs at least one band");
    for (i, s) in sources.iter().enumerate() {
        ensure!(
            s.flux.len() == nb && s.flux_ivar.len() == nb,
            "Source {} has {} fluxes for {} bands",
            i,
            s.flux.len(),
            nb
        );
    }

    let f32s = |f: &dyn Fn(&Source) -> f64| ColumnData::F32(sources.iter().map(|s| f(s) as f32).collect());
    let shape = |f: &dyn Fn(&Shape) -> f64| f32s(&|s| s.shape.as_ref().map_or(0.0, f));

    let mut flux = Vec::with_capacity(sources.len() * nb);
    let mut flux_ivar = Vec::with_capacity(sources.len() * nb);
    for s in sources {
        for (&f, &iv) in s.flux.iter().zip(&s.flux_ivar) {
            flux.push(if iv == 0.0 { 0.0 } else { f as f32 });
            flux_ivar.push(iv as f32);
        }
    }

    let mut t = BinTable::new();
    t.push(
        "type",
        ColumnData::Str {
            width: 3,
            values: sources.iter().map(|s| s.kind.code().to_string()).collect(),
        },
    )?;
    t.push("ra", ColumnData::F64(sources.iter().map(|s| s.ra.rem_euclid(360.0)).collect()))?;
    t.push("dec", ColumnData::F64(sources.iter().map(|s| s.dec).collect()))?;
    t.push("ra_ivar", f32s(&|s| s.ra_ivar))?;
    t.push("dec_ivar", f32s(&|s| s.dec_ivar))?;
    t.push("flux", ColumnData::F32Array { repeat: nb, values: flux })?;
    t.push("flux_ivar", ColumnData::F32Array { repeat: nb, values: flux_ivar })?;
    t.push("shape_r", shape(&|sh| sh.r))?;
    t.push("shape_r_ivar", shape(&|sh| sh.r_ivar))?;
    t.push("shape_e1", shape(&|sh| sh.e1))?;
    t.push("shape_e1_ivar", shape(&|sh| sh.e1_ivar))?;
    t.push("shape_e2", shape(&|sh| sh.e2))?;
    t.push("shape_e2_ivar", shape(&|sh| sh.e2_ivar))?;
    t.push("sersic", f32s(&|s| s.sersic.map_or(0.0, |(n, _)| n)))?;
    t.push("sersic_ivar", f32s(&|s| s.sersic.map_or(0.0, |(_, iv)| iv)))?;
    t.header.set("BANDS", bands.concat(), Some("Flux column band order"));
    Ok(t)
}

pub fn write_catalog<P: AsRef<Path>>(path: P, sources: &[Source], bands: &[&str]) -> Result<()> {
    write_table(path, &catalog_table(sources, bands)?)
}

// ── Read ───────────────────────────────────────────────────────────────────

fn float_column(t: &BinTable, name: &str) -> Result<Vec<f64>> {
    t.column(name)
        .and_then(|c| c.as_f64())
        .with_context(|| format!("Catalog has no numeric column {}", name))
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Rebuild sources from a catalog table. Returns the sources and the band order.
///
/// Non-finite positions or fluxes and unknown type codes are errors;
/// non-finite inverse variances are read as 0.
pub fn sources_from_table(t: &BinTable) -> Result<(Vec<Source>, Vec<String>)> {
    let n = t.nrows();
    let types = t
        .column("type")
        .and_then(|c| c.as_strings())
        .context("Catalog has no type column")?;
    let ra = float_column(t, "ra")?;
    let dec = float_column(t, "dec")?;
    let ra_ivar = float_column(t, "ra_ivar")?;
    let dec_ivar = float_column(t, "dec_ivar")?;
    let flux = float_column(t, "flux")?;
    let flux_ivar = float_column(t, "flux_ivar")?;
    let r = float_column(t, "shape_r")?;
    let r_iv = float_column(t, "shape_r_ivar")?;
    let e1 = float_column(t, "shape_e1")?;
    let e1_iv = float_column(t, "shape_e1_ivar")?;
    let e2 = float_column(t, "shape_e2")?;
    let e2_iv = float_column(t, "shape_e2_ivar")?;
    let ser = float_column(t, "sersic")?;
    let ser_iv = float_column(t, "sersic_ivar")?;

    let nb = if n == 0 { 0 } else { flux.len() / n };
    ensure!(
        flux.len() == n * nb && flux_ivar.len() == flux.len(),
        "Ragged flux columns in catalog"
    );
    let bands: Vec<String> = match t.header.get_str("BANDS") {
        Some(b) => b.chars().map(String::from).collect(),
        None => (0..nb).map(|i| i.to_string()).collect(),
    };
    if n > 0 {
        ensure!(
            bands.len() == nb,
            "BANDS card lists {} bands, flux columns hold {}",
            bands.len(),
            nb
        );
    }

    let mut sources = Vec::with_capacity(n);
    for i in 0..n {
        let kind: SourceType = types[i].parse().with_context(|| format!("catalog row {}", i))?;
        ensure!(
            ra[i].is_finite() && dec[i].is_finite(),
            "Non-finite position in catalog row {}",
            i
        );
        let f = &flux[i * nb..(i + 1) * nb];
        ensure!(f.iter().all(|v| v.is_finite()), "Non-finite flux in catalog row {}", i);
        let shape = kind.has_shape().then(|| Shape {
            r: r[i],
            e1: e1[i],
            e2: e2[i],
            r_ivar: finite_or_zero(r_iv[i]),
            e1_ivar: finite_or_zero(e1_iv[i]),
            e2_ivar: finite_or_zero(e2_iv[i]),
        });
        sources.push(Source {
            kind,
            ra: ra[i],
            dec: dec[i],
            ra_ivar: finite_or_zero(ra_ivar[i]),
            dec_ivar: finite_or_zero(dec_ivar[i]),
            flux: f.to_vec(),
            flux_ivar: flux_ivar[i * nb..(i + 1) * nb].iter().map(|&v| finite_or_zero(v)).collect(),
            shape,
            sersic: (kind == SourceType::Ser).then(|| (ser[i], finite_or_zero(ser_iv[i]))),
        });
    }
    debug!("Read {} catalog sources in {} bands", sources.len(), nb);
    Ok((sources, bands))
}

pub fn read_catalog<P: AsRef<Path>>(path: P) -> Result<(Vec<Source>, Vec<String>)> {
    let path = path.as_ref();
    let t = BinTable::read(path)?;
    sources_from_table(&t).with_context(|| format!("Reading catalog {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn galaxy() -> Source {
        Source {
            kind: SourceType::Ser,
            ra: -10.0,
            dec: 5.0,
            ra_ivar: 1e12,
            dec_ivar: 2e12,
            flux: vec![10.0, 20.0, 30.0],
            flux_ivar: vec![1.0, 0.0, 4.0],
            shape: Some(Shape {
                r: 1.5,
                e1: 0.25,
                e2: -0.125,
                r_ivar: 9.0,
                e1_ivar: 16.0,
                e2_ivar: 25.0,
            }),
            sersic: Some((2.5, 100.0)),
        }
    }

    #[test]
    fn test_type_codes() {
        for t in [
            SourceType::Psf,
            SourceType::Rex,
            SourceType::Exp,
            SourceType::Dev,
            SourceType::Ser,
            SourceType::Dup,
            SourceType::Nun,
        ] {
            assert_eq!(t.code().parse::<SourceType>().unwrap(), t);
        }
        assert!("GAL".parse::<SourceType>().is_err());
    }

    #[test]
    fn test_write_wraps_ra_and_zeroes_unmeasured_flux() {
        let t = catalog_table(&[galaxy()], &["g", "r", "z"]).unwrap();
        assert_eq!(t.column("ra").unwrap().as_f64().unwrap(), vec![350.0]);
        assert_eq!(
            t.column("flux"),
            Some(&ColumnData::F32Array { repeat: 3, values: vec![10.0, 0.0, 30.0] })
        );
        assert!(matches!(t.column("ra_ivar"), Some(ColumnData::F32(_))));
        assert_eq!(t.column("type").unwrap().as_strings().unwrap()[0], "SER");
        assert_eq!(t.header.get_str("BANDS").as_deref(), Some("grz"));
    }

    #[test]
    fn test_flux_band_count_checked() {
        let mut s = galaxy();
        s.flux.pop();
        assert!(catalog_table(&[s], &["g", "r", "z"]).is_err());
    }

    #[test]
    fn test_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tractor.fits");
        let star = Source::point(120.0, -30.0, vec![5.0, 6.0, 7.0], vec![1.0, 1.0, 1.0]);
        write_catalog(&path, &[galaxy(), star.clone()], &["g", "r", "z"]).unwrap();

        let (sources, bands) = read_catalog(&path).unwrap();
        assert_eq!(bands, vec!["g", "r", "z"]);
        assert_eq!(sources.len(), 2);
        let gal = &sources[0];
        assert_eq!(gal.kind, SourceType::Ser);
        assert_eq!(gal.ra, 350.0);
        assert_eq!(gal.flux, vec![10.0, 0.0, 30.0]);
        assert_eq!(gal.shape.map(|s| s.e1), Some(0.25));
        assert_eq!(gal.sersic, Some((2.5, 100.0)));
        assert_eq!(sources[1], star);
    }

    #[test]
    fn test_read_rejects_bad_rows() {
        let mut t = catalog_table(&[galaxy()], &["g", "r", "z"]).unwrap();
        let mut bad = BinTable::new();
        for c in t.columns() {
            let data = match c.name.as_str() {
                "type" => ColumnData::Str { width: 3, values: vec!["XYZ".into()] },
                _ => c.data.clone(),
            };
            bad.push(&c.name, data).unwrap();
        }
        bad.header = t.header.clone();
        assert!(sources_from_table(&bad).is_err());

        t.header.set("BANDS", "gr", None);
        assert!(sources_from_table(&t).is_err(), "band count mismatch must fail");
    }

    #[test]
    fn test_nonfinite_ivar_read_as_zero() {
        let t = catalog_table(&[galaxy()], &["g", "r", "z"]).unwrap();
        let mut patched = BinTable::new();
        for c in t.columns() {
            let data = match c.name.as_str() {
                "ra_ivar" => ColumnData::F32(vec![f32::NAN]),
                _ => c.data.clone(),
            };
            patched.push(&c.name, data).unwrap();
        }
        patched.header = t.header.clone();
        let (sources, _) = sources_from_table(&patched).unwrap();
        assert_eq!(sources[0].ra_ivar, 0.0);

        let mut nan_dec = BinTable::new();
        for c in t.columns() {
            let data = match c.name.as_str() {
                "dec" => ColumnData::F64(vec![f64::NAN]),
                _ => c.data.clone(),
            };
            nan_dec.push(&c.name, data).unwrap();
        }
        nan_dec.header = t.header.clone();
        assert!(sources_from_table(&nan_dec).is_err());
    }
}
