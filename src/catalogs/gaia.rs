use std::path::Path;

use anyhow::{Context, Result};

use super::{column_index, field_f64, field_i64};

/// One Gaia source with the astrometric and photometric columns the matcher uses.
/// Missing catalog values are stored as zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GaiaStar {
    pub source_id: i64,
    pub ra: f64,
    pub dec: f64,
    /// Julian year of the catalog position; zero when there is no astrometric solution.
    pub ref_epoch: f64,
    /// mas/yr, including cos(dec).
    pub pmra: f64,
    /// mas/yr.
    pub pmdec: f64,
    /// mas.
    pub parallax: f64,
    pub phot_g_mean_mag: f64,
    pub phot_bp_mean_mag: f64,
    pub phot_rp_mean_mag: f64,
    pub phot_g_mean_flux_over_error: f64,
    pub phot_bp_mean_flux_over_error: f64,
    pub phot_rp_mean_flux_over_error: f64,
}

impl GaiaStar {
    /// Replace non-finite values with zero.
    pub fn nan_to_zero(mut self) -> Self {
        for v in [
            &mut self.ra,
            &mut self.dec,
            &mut self.ref_epoch,
            &mut self.pmra,
            &mut self.pmdec,
            &mut self.parallax,
            &mut self.phot_g_mean_mag,
            &mut self.phot_bp_mean_mag,
            &mut self.phot_rp_mean_mag,
            &mut self.phot_g_mean_flux_over_error,
            &mut self.phot_bp_mean_flux_over_error,
            &mut self.phot_rp_mean_flux_over_error,
        ] {
            if !v.is_finite() {
                *v = 0.0;
            }
        }
        self
    }
}

/// Read a Gaia CSV extract. Columns are located by header name; `ra` and `dec`
/// are required, everything else defaults to zero when absent or empty.
pub fn read_gaia_csv<P: AsRef<Path>>(file: P) -> Result<Vec<GaiaStar>> {
    let path = file.as_ref();
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open Gaia catalog {}", path.display()))?;
    let headers = rdr.headers()?.clone();
    let col = |name: &str| column_index(&headers, name);
    let i_ra = col("ra").context("Gaia catalog has no ra column")?;
    let i_dec = col("dec").context("Gaia catalog has no dec column")?;
    let i_id = col("source_id");
    let i_epoch = col("ref_epoch");
    let i_pmra = col("pmra");
    let i_pmdec = col("pmdec");
    let i_plx = col("parallax");
    let i_g = col("phot_g_mean_mag");
    let i_bp = col("phot_bp_mean_mag");
    let i_rp = col("phot_rp_mean_mag");
    let i_gsn = col("phot_g_mean_flux_over_error");
    let i_bpsn = col("phot_bp_mean_flux_over_error");
    let i_rpsn = col("phot_rp_mean_flux_over_error");

    rdr.records()
        .map(|result| {
            let record = result?;
            let star = GaiaStar {
                source_id: field_i64(&record, i_id),
                ra: field_f64(&record, Some(i_ra)),
                dec: field_f64(&record, Some(i_dec)),
                ref_epoch: field_f64(&record, i_epoch),
                pmra: field_f64(&record, i_pmra),
                pmdec: field_f64(&record, i_pmdec),
                parallax: field_f64(&record, i_plx),
                phot_g_mean_mag: field_f64(&record, i_g),
                phot_bp_mean_mag: field_f64(&record, i_bp),
                phot_rp_mean_mag: field_f64(&record, i_rp),
                phot_g_mean_flux_over_error: field_f64(&record, i_gsn),
                phot_bp_mean_flux_over_error: field_f64(&record, i_bpsn),
                phot_rp_mean_flux_over_error: field_f64(&record, i_rpsn),
            };
            Ok(star.nan_to_zero())
        })
        .collect::<Result<Vec<GaiaStar>, csv::Error>>()
        .map_err(|e| e.into())
}

/// Keep the `max` brightest stars by G magnitude.
///
/// Survivors stay in catalog order rather than being reordered brightest
/// first, so `-photom` star rows come out in catalog order too.
pub fn cap_brightest(stars: Vec<GaiaStar>, max: usize) -> Vec<GaiaStar> {
    if stars.len() <= max {
        return stars;
    }
    let mut order: Vec<usize> = (0..stars.len()).collect();
    order.sort_by(|&a, &b| stars[a].phot_g_mean_mag.total_cmp(&stars[b].phot_g_mean_mag));
    let mut keep = vec![false; stars.len()];
    for &i in &order[..max] {
        keep[i] = true;
    }
    stars
        .into_iter()
        .zip(keep)
        .filter_map(|(s, k)| k.then_some(s))
        .collect()
}
