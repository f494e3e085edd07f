use std::path::Path;

use anyhow::{Context, Result};

use super::{column_index, field_f64, field_i64};

/// PS1 bands in catalog column order.
pub const PS1_BANDS: [&str; 5] = ["g", "r", "i", "z", "y"];

/// Column of `band` in the PS1 magnitude arrays. `Y` maps to PS1 `y`.
pub fn ps1_band_index(band: &str) -> Option<usize> {
    match band {
        "g" => Some(0),
        "r" => Some(1),
        "i" => Some(2),
        "z" => Some(3),
        "y" | "Y" => Some(4),
        _ => None,
    }
}

/// A PS1 source: position, per-band median magnitudes and good-measurement counts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ps1Star {
    pub obj_id: i64,
    pub ra: f64,
    pub dec: f64,
    pub median: [f64; 5],
    pub nmag_ok: [i64; 5],
}

impl Ps1Star {
    pub fn g_minus_i(&self) -> f64 {
        self.median[0] - self.median[2]
    }

    /// Quality selection for calibrators: detected in g, r and i and with
    /// a stellar-locus color `0.4 < g - i < 2.7`.
    pub fn passes_cuts(&self) -> bool {
        let gi = self.g_minus_i();
        self.nmag_ok[0] > 0 && self.nmag_ok[1] > 0 && self.nmag_ok[2] > 0 && gi > 0.4 && gi < 2.7
    }
}

/// Read a PS1 CSV extract with columns `obj_id, ra, dec, median_<b>, nmag_ok_<b>`.
pub fn read_ps1_csv<P: AsRef<Path>>(file: P) -> Result<Vec<Ps1Star>> {
    let path = file.as_ref();
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open PS1 catalog {}", path.display()))?;
    let headers = rdr.headers()?.clone();
    let col = |name: &str| column_index(&headers, name);
    let i_ra = col("ra").context("PS1 catalog has no ra column")?;
    let i_dec = col("dec").context("PS1 catalog has no dec column")?;
    let i_id = col("obj_id");
    let i_med: Vec<Option<usize>> = PS1_BANDS.iter().map(|b| col(&format!("median_{}", b))).collect();
    let i_nok: Vec<Option<usize>> = PS1_BANDS.iter().map(|b| col(&format!("nmag_ok_{}", b))).collect();

    rdr.records()
        .map(|result| {
            let record = result?;
            let mut star = Ps1Star {
                obj_id: field_i64(&record, i_id),
                ra: field_f64(&record, Some(i_ra)),
                dec: field_f64(&record, Some(i_dec)),
                ..Default::default()
            };
            for k in 0..PS1_BANDS.len() {
                star.median[k] = field_f64(&record, i_med[k]);
                star.nmag_ok[k] = field_i64(&record, i_nok[k]);
            }
            Ok(star)
        })
        .collect::<Result<Vec<Ps1Star>, csv::Error>>()
        .map_err(|e| e.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn star(g: f64, i: f64, nok: i64) -> Ps1Star {
        Ps1Star {
            median: [g, 0.0, i, 0.0, 0.0],
            nmag_ok: [nok, nok, nok, 0, 0],
            ..Default::default()
        }
    }

    #[test]
    fn test_cuts() {
        assert!(star(18.0, 17.0, 3).passes_cuts());
        assert!(!star(18.0, 17.7, 3).passes_cuts(), "too blue");
        assert!(!star(20.0, 17.0, 3).passes_cuts(), "too red");
        assert!(!star(18.0, 17.0, 0).passes_cuts(), "not detected");
    }

    #[test]
    fn test_band_index() {
        assert_eq!(ps1_band_index("Y"), Some(4));
        assert_eq!(ps1_band_index("D51"), None);
    }

    #[test]
    fn test_read_ps1_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ps1.csv");
        std::fs::write(
            &path,
            "obj_id,ra,dec,median_g,median_r,median_i,median_z,median_y,nmag_ok_g,nmag_ok_r,nmag_ok_i,nmag_ok_z,nmag_ok_y\n\
             1001,36.0,-4.5,18.1,17.6,17.4,17.3,17.2,5,6,7,8,0\n",
        )
        .unwrap();
        let stars = read_ps1_csv(&path).unwrap();
        assert_eq!(stars.len(), 1);
        assert_eq!(stars[0].obj_id, 1001);
        assert_eq!(stars[0].median[2], 17.4);
        assert_eq!(stars[0].nmag_ok, [5, 6, 7, 8, 0]);
    }
}
