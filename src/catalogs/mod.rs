//! Reference star catalogs: Gaia for astrometry, PS1 for photometry.

pub mod gaia;
pub mod ps1;

use std::path::Path;

use anyhow::Result;
use tracing::info;

use crate::wcs::Wcs;

pub use gaia::{cap_brightest, read_gaia_csv, GaiaStar};
pub use ps1::{ps1_band_index, read_ps1_csv, Ps1Star, PS1_BANDS};

/// Pixels of margin around the CCD when selecting catalog stars.
pub const FOOTPRINT_MARGIN: f64 = 10.0;

/// Provides the reference stars overlapping a CCD.
pub trait ReferenceCatalogSource: Send + Sync {
    /// Gaia stars inside the WCS footprint.
    fn gaia_in_wcs(&self, wcs: &Wcs) -> Result<Vec<GaiaStar>>;

    /// PS1 stars inside the WCS footprint, or `None` outside PS1 coverage.
    fn ps1_in_wcs(&self, wcs: &Wcs) -> Result<Option<Vec<Ps1Star>>>;
}

/// Catalogs held in memory, filtered per CCD by footprint.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalogs {
    pub gaia: Vec<GaiaStar>,
    /// `None` when the exposure lies outside PS1 coverage.
    pub ps1: Option<Vec<Ps1Star>>,
}

impl MemoryCatalogs {
    pub fn new(gaia: Vec<GaiaStar>, ps1: Option<Vec<Ps1Star>>) -> Self {
        Self { gaia, ps1 }
    }

    /// Load from CSV extracts covering the exposure.
    pub fn from_csv<P: AsRef<Path>>(gaia_path: P, ps1_path: Option<P>) -> Result<Self> {
        let gaia = read_gaia_csv(&gaia_path)?;
        let ps1 = match ps1_path {
            Some(p) => Some(read_ps1_csv(p)?),
            None => None,
        };
        info!(
            "Loaded {} Gaia and {} PS1 reference stars",
            gaia.len(),
            ps1.as_ref().map_or(0, Vec::len)
        );
        Ok(Self { gaia, ps1 })
    }
}

impl ReferenceCatalogSource for MemoryCatalogs {
    fn gaia_in_wcs(&self, wcs: &Wcs) -> Result<Vec<GaiaStar>> {
        Ok(self
            .gaia
            .iter()
            .filter(|s| wcs.is_inside(s.ra, s.dec, FOOTPRINT_MARGIN))
            .cloned()
            .collect())
    }

    fn ps1_in_wcs(&self, wcs: &Wcs) -> Result<Option<Vec<Ps1Star>>> {
        Ok(self.ps1.as_ref().map(|stars| {
            stars
                .iter()
                .filter(|s| wcs.is_inside(s.ra, s.dec, FOOTPRINT_MARGIN))
                .cloned()
                .collect()
        }))
    }
}

// ── CSV helpers ────────────────────────────────────────────────────────────

pub(crate) fn column_index(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name))
}

pub(crate) fn field_f64(record: &csv::StringRecord, idx: Option<usize>) -> f64 {
    idx.and_then(|i| record.get(i))
        .and_then(|s| s.trim().parse::<f64>().ok())
        .unwrap_or(0.0)
}

pub(crate) fn field_i64(record: &csv::StringRecord, idx: Option<usize>) -> i64 {
    idx.and_then(|i| record.get(i))
        .and_then(|s| s.trim().parse::<i64>().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_footprint_filter() {
        let s = 0.262 / 3600.0;
        let wcs = Wcs::new_tan([50.5, 50.5], [10.0, 0.0], [[-s, 0.0], [0.0, s]], 100, 100).unwrap();
        let inside = GaiaStar {
            ra: 10.0,
            dec: 0.0,
            ..Default::default()
        };
        let outside = GaiaStar {
            ra: 10.1,
            dec: 0.0,
            ..Default::default()
        };
        let cats = MemoryCatalogs::new(vec![inside.clone(), outside], None);
        assert_eq!(cats.gaia_in_wcs(&wcs).unwrap(), vec![inside]);
        assert!(cats.ps1_in_wcs(&wcs).unwrap().is_none());
    }
}
