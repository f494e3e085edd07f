//! Merged per-exposure calibration artifacts: one PsfEx model and one sky
//! model per CCD, stamped with the exposure identity they were derived from.
//!
//! Artifacts are written once per exposure after every per-CCD calibration
//! finishes, and are re-validated by each reader. A row whose stamp does not
//! match the exposure being measured makes the whole file stale.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use rkyv::{Archive, Deserialize, Serialize};
use tracing::{info, warn};

use crate::fits::write_via_temp;
use crate::psf::PsfExModel;
use crate::sky::SplineSky;

/// Calibration products for one CCD.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct CalibrationRow {
    pub expnum: i64,
    pub ccdname: String,
    pub plver: String,
    pub plprocid: String,
    pub psf: Option<PsfExModel>,
    pub sky: Option<SplineSky>,
}

/// Identity an artifact must carry to be used for an exposure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposureStamp {
    pub expnum: i64,
    pub plver: String,
    pub plprocid: String,
}

/// Calibration rows for every CCD of one exposure.
#[derive(Debug, Clone, Default, PartialEq, Archive, Serialize, Deserialize)]
pub struct CalibrationArtifacts {
    pub rows: Vec<CalibrationRow>,
}

impl CalibrationArtifacts {
    /// Combine per-CCD artifacts into one exposure file. Later rows for the same
    /// CCD replace earlier ones; the result is ordered by CCD name.
    pub fn merge(parts: impl IntoIterator<Item = CalibrationArtifacts>) -> Self {
        let mut rows: Vec<CalibrationRow> = Vec::new();
        for part in parts {
            for row in part.rows {
                match rows.iter_mut().find(|r| r.ccdname == row.ccdname) {
                    Some(existing) => *existing = row,
                    None => rows.push(row),
                }
            }
        }
        rows.sort_by(|a, b| a.ccdname.cmp(&b.ccdname));
        Self { rows }
    }

    pub fn get(&self, ccdname: &str) -> Option<&CalibrationRow> {
        self.rows.iter().find(|r| r.ccdname.trim() == ccdname.trim())
    }

    /// True when every row carries `stamp`.
    pub fn validate(&self, stamp: &ExposureStamp) -> bool {
        let mut ok = !self.rows.is_empty();
        for r in &self.rows {
            if r.expnum != stamp.expnum {
                warn!("Artifact row {} has expnum {}, expected {}", r.ccdname, r.expnum, stamp.expnum);
                ok = false;
            } else if r.plver.trim() != stamp.plver.trim() {
                warn!("Artifact row {} has PLVER {}, expected {}", r.ccdname, r.plver, stamp.plver);
                ok = false;
            } else if r.plprocid.trim() != stamp.plprocid.trim() {
                warn!(
                    "Artifact row {} has PLPROCID {}, expected {}",
                    r.ccdname, r.plprocid, stamp.plprocid
                );
                ok = false;
            }
        }
        ok
    }

    pub fn to_rkyv_bytes(&self) -> Result<Vec<u8>> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|b| b.to_vec())
            .map_err(|e| anyhow!("rkyv serialization failed: {}", e))
    }

    /// Save through a temporary file and an atomic rename.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = self.to_rkyv_bytes()?;
        write_via_temp(&path, |tmp| Ok(std::fs::write(tmp, &bytes)?))?;
        info!(
            "Saved calibration artifacts to {} ({} CCDs, {} bytes)",
            path.as_ref().display(),
            self.rows.len(),
            bytes.len()
        );
        Ok(())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read artifacts {}", path.display()))?;
        let mut art = rkyv::from_bytes::<Self, rkyv::rancor::Error>(&bytes)
            .map_err(|e| anyhow!("rkyv deserialization failed: {}", e))?;
        for row in &mut art.rows {
            if let Some(Err(e)) = row.psf.as_ref().map(PsfExModel::validate) {
                warn!("Dropping PsfEx model for CCD {} in {}: {:#}", row.ccdname, path.display(), e);
                row.psf = None;
            }
        }
        info!("Loaded calibration artifacts: {} CCDs", art.rows.len());
        Ok(art)
    }
}
