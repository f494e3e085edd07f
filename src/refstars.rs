//! Reference star list for one CCD: Gaia positions moved to the observation
//! epoch, merged with PS1 photometry converted to the observed band.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::astrometry::{angular_separation, radec_at_mjd};
use crate::catalogs::{GaiaStar, Ps1Star};

/// One merged reference star. Fields from a catalog that did not contribute are zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceStar {
    /// Position at the observation epoch, degrees.
    pub ra_now: f64,
    pub dec_now: f64,

    pub gaia_sourceid: i64,
    pub ra_gaia: f64,
    pub dec_gaia: f64,
    pub phot_g_mean_mag: f64,
    pub phot_bp_mean_mag: f64,
    pub phot_rp_mean_mag: f64,
    pub phot_g_mean_mag_error: f64,
    pub phot_bp_mean_mag_error: f64,
    pub phot_rp_mean_mag_error: f64,

    pub ps1_objid: i64,
    pub ra_ps1: f64,
    pub dec_ps1: f64,
    /// PS1 median magnitudes, g r i z y.
    pub ps1_mag: [f64; 5],
    /// PS1 magnitude transformed to the observed band.
    pub legacy_survey_mag: f64,

    /// Initial flux guess for the fit, in image units.
    pub flux0: f64,
    /// Usable for the astrometric offset.
    pub astrom: bool,
    /// Usable for the photometric zeropoint.
    pub photom: bool,
}

impl ReferenceStar {
    /// Best catalog position: Gaia when present, else PS1.
    pub fn catalog_radec(&self) -> (f64, f64) {
        if self.ra_gaia != 0.0 {
            (self.ra_gaia, self.dec_gaia)
        } else {
            (self.ra_ps1, self.dec_ps1)
        }
    }
}

/// PS1-to-observed-band color terms: a polynomial in PS1 `g - i` per observed
/// band, `c0 + c1·x + c2·x² + …`. Bands without an entry get no correction.
#[derive(Debug, Clone, Default)]
pub struct ColorTerms {
    pub coeffs: BTreeMap<String, Vec<f64>>,
}

impl ColorTerms {
    pub fn eval(&self, band: &str, g_minus_i: f64) -> f64 {
        match self.coeffs.get(band) {
            Some(c) => c.iter().rev().fold(0.0, |acc, &k| acc * g_minus_i + k),
            None => 0.0,
        }
    }
}

/// How PS1 magnitudes become observed-band magnitudes for this CCD.
#[derive(Debug, Clone)]
pub struct Ps1Transform {
    /// PS1 band column (g r i z y order).
    pub ps1_band: usize,
    /// Polynomial in `g - i`; empty for no color term.
    pub colorterm: Vec<f64>,
}

impl Ps1Transform {
    /// `median[band'] + clip(colorterm(g - i), -1, 1)`.
    pub fn observed_mag(&self, star: &Ps1Star) -> f64 {
        let gi = star.g_minus_i();
        let term = self.colorterm.iter().rev().fold(0.0, |acc, &k| acc * gi + k);
        star.median[self.ps1_band] + term.clamp(-1.0, 1.0)
    }
}

/// Inputs for [`merge_references`].
#[derive(Debug, Clone)]
pub struct MatchContext {
    pub mjd_obs: f64,
    pub exptime: f64,
    /// Nominal zeropoint of the observed band.
    pub zp0: f64,
    pub transform: Ps1Transform,
    /// Default: 1 arcsec
    pub match_radius_arcsec: f64,
}

/// `|2.5 / ln 10 / max(1, S/N)|`.
pub fn gaia_mag_error(flux_over_error: f64) -> f64 {
    (2.5 / std::f64::consts::LN_10 / flux_over_error.max(1.0)).abs()
}

fn gaia_reference(g: &GaiaStar, mjd: f64) -> ReferenceStar {
    let (ra_now, dec_now) = radec_at_mjd(g.ra, g.dec, g.ref_epoch, g.pmra, g.pmdec, g.parallax, mjd);
    ReferenceStar {
        ra_now,
        dec_now,
        gaia_sourceid: g.source_id,
        ra_gaia: g.ra,
        dec_gaia: g.dec,
        phot_g_mean_mag: g.phot_g_mean_mag,
        phot_bp_mean_mag: g.phot_bp_mean_mag,
        phot_rp_mean_mag: g.phot_rp_mean_mag,
        phot_g_mean_mag_error: gaia_mag_error(g.phot_g_mean_flux_over_error),
        phot_bp_mean_mag_error: gaia_mag_error(g.phot_bp_mean_flux_over_error),
        phot_rp_mean_mag_error: gaia_mag_error(g.phot_rp_mean_flux_over_error),
        flux0: 1.0,
        astrom: true,
        ..Default::default()
    }
}

fn ps1_reference(p: &Ps1Star, ctx: &MatchContext) -> ReferenceStar {
    let mag = ctx.transform.observed_mag(p);
    ReferenceStar {
        ra_now: p.ra,
        dec_now: p.dec,
        ps1_objid: p.obj_id,
        ra_ps1: p.ra,
        dec_ps1: p.dec,
        ps1_mag: p.median,
        legacy_survey_mag: mag,
        flux0: 10f64.powf((ctx.zp0 - mag) / 2.5) * ctx.exptime,
        photom: true,
        ..Default::default()
    }
}

/// Symmetric nearest-neighbour match. Returns `(gaia index, ps1 index)` pairs
/// where each is the other's closest partner within `radius_deg`.
pub fn match_nearest(
    a: &[(f64, f64)],
    b: &[(f64, f64)],
    radius_deg: f64,
) -> Vec<(usize, usize)> {
    // b sorted by dec for a windowed search
    let mut order: Vec<usize> = (0..b.len()).collect();
    order.sort_by(|&i, &j| b[i].1.total_cmp(&b[j].1));
    let decs: Vec<f64> = order.iter().map(|&i| b[i].1).collect();

    let nearest = |ra: f64, dec: f64| -> Option<(usize, f64)> {
        let lo = decs.partition_point(|&d| d < dec - radius_deg);
        let mut best: Option<(usize, f64)> = None;
        for &j in order[lo..].iter() {
            if b[j].1 > dec + radius_deg {
                break;
            }
            let d = angular_separation(ra, dec, b[j].0, b[j].1);
            if d <= radius_deg && best.map_or(true, |(_, bd)| d < bd) {
                best = Some((j, d));
            }
        }
        best
    };

    // Best a-partner for each b, among a's whose nearest b is that b.
    let mut claim: Vec<Option<(usize, f64)>> = vec![None; b.len()];
    for (i, &(ra, dec)) in a.iter().enumerate() {
        if let Some((j, d)) = nearest(ra, dec) {
            if claim[j].map_or(true, |(_, cd)| d < cd) {
                claim[j] = Some((i, d));
            }
        }
    }
    let mut pairs: Vec<(usize, usize)> = claim
        .iter()
        .enumerate()
        .filter_map(|(j, c)| c.map(|(i, _)| (i, j)))
        .collect();
    pairs.sort_unstable();
    pairs
}

/// Build the reference list: unmatched Gaia stars (catalog order) followed by
/// PS1 stars (catalog order), with Gaia astrometry copied onto matched PS1 rows.
pub fn merge_references(gaia: &[GaiaStar], ps1: Option<&[Ps1Star]>, ctx: &MatchContext) -> Vec<ReferenceStar> {
    let gaia_refs: Vec<ReferenceStar> = gaia.iter().map(|g| gaia_reference(g, ctx.mjd_obs)).collect();
    let Some(ps1) = ps1.filter(|p| !p.is_empty()) else {
        return gaia_refs;
    };
    let mut ps1_refs: Vec<ReferenceStar> = ps1.iter().map(|p| ps1_reference(p, ctx)).collect();

    let a: Vec<(f64, f64)> = gaia.iter().map(|g| (g.ra, g.dec)).collect();
    let b: Vec<(f64, f64)> = ps1.iter().map(|p| (p.ra, p.dec)).collect();
    let pairs = match_nearest(&a, &b, ctx.match_radius_arcsec / 3600.0);
    info!(
        "{} of {} Gaia and {} PS1 stars matched",
        pairs.len(),
        gaia.len(),
        ps1.len()
    );

    let mut matched = vec![false; gaia.len()];
    for &(i, j) in &pairs {
        matched[i] = true;
        let g = &gaia_refs[i];
        let p = &mut ps1_refs[j];
        p.ra_now = g.ra_now;
        p.dec_now = g.dec_now;
        p.gaia_sourceid = g.gaia_sourceid;
        p.ra_gaia = g.ra_gaia;
        p.dec_gaia = g.dec_gaia;
        p.phot_g_mean_mag = g.phot_g_mean_mag;
        p.phot_bp_mean_mag = g.phot_bp_mean_mag;
        p.phot_rp_mean_mag = g.phot_rp_mean_mag;
        p.phot_g_mean_mag_error = g.phot_g_mean_mag_error;
        p.phot_bp_mean_mag_error = g.phot_bp_mean_mag_error;
        p.phot_rp_mean_mag_error = g.phot_rp_mean_mag_error;
        p.astrom = true;
    }

    let mut out: Vec<ReferenceStar> = gaia_refs
        .into_iter()
        .zip(matched)
        .filter_map(|(r, m)| (!m).then_some(r))
        .collect();
    debug!("{} unmatched Gaia stars kept", out.len());
    out.extend(ps1_refs);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> MatchContext {
        MatchContext {
            mjd_obs: 57000.0,
            exptime: 90.0,
            zp0: 26.610,
            transform: Ps1Transform {
                ps1_band: 0,
                colorterm: vec![],
            },
            match_radius_arcsec: 1.0,
        }
    }

    fn gaia(id: i64, ra: f64, dec: f64) -> GaiaStar {
        GaiaStar {
            source_id: id,
            ra,
            dec,
            phot_g_mean_mag: 17.0,
            phot_g_mean_flux_over_error: 0.5,
            ..Default::default()
        }
    }

    fn ps1(id: i64, ra: f64, dec: f64) -> Ps1Star {
        Ps1Star {
            obj_id: id,
            ra,
            dec,
            median: [18.0, 17.5, 17.2, 17.0, 16.9],
            nmag_ok: [3, 3, 3, 3, 3],
        }
    }

    #[test]
    fn test_gaia_only() {
        let refs = merge_references(&[gaia(1, 10.0, 0.0)], None, &ctx());
        assert_eq!(refs.len(), 1);
        assert!(refs[0].astrom && !refs[0].photom);
        assert_eq!(refs[0].flux0, 1.0);
        // S/N below 1 is floored
        assert!((refs[0].phot_g_mean_mag_error - 2.5 / std::f64::consts::LN_10).abs() < 1e-12);
    }

    #[test]
    fn test_merge_order_and_columns() {
        let arcsec = 1.0 / 3600.0;
        let g = vec![
            gaia(1, 10.0, 0.0),
            gaia(2, 10.01, 0.0),
            gaia(3, 10.02, 0.0),
        ];
        let p = vec![ps1(100, 10.02 + 0.5 * arcsec, 0.0), ps1(101, 10.05, 0.0)];
        let refs = merge_references(&g, Some(&p), &ctx());
        let ids: Vec<(i64, i64)> = refs.iter().map(|r| (r.gaia_sourceid, r.ps1_objid)).collect();
        assert_eq!(ids, vec![(1, 0), (2, 0), (3, 100), (0, 101)]);

        let m = &refs[2];
        assert!(m.astrom && m.photom);
        assert_eq!(m.ra_now, 10.02);
        assert_eq!(m.ra_ps1, 10.02 + 0.5 * arcsec);
        assert_eq!(m.legacy_survey_mag, 18.0);
        let expect_flux0 = 10f64.powf((26.610 - 18.0) / 2.5) * 90.0;
        assert!((m.flux0 - expect_flux0).abs() / expect_flux0 < 1e-12);
        assert!(!refs[3].astrom && refs[3].photom);
    }

    #[test]
    fn test_match_is_symmetric() {
        let arcsec = 1.0 / 3600.0;
        // two Gaia stars near one PS1 star: only the closer one pairs
        let a = vec![(10.0, 0.0), (10.0 + 0.3 * arcsec, 0.0)];
        let b = vec![(10.0 + 0.25 * arcsec, 0.0)];
        assert_eq!(match_nearest(&a, &b, arcsec), vec![(1, 0)]);
        // beyond the radius nothing pairs
        let b = vec![(10.0 + 2.0 * arcsec, 0.0)];
        assert!(match_nearest(&a, &b, arcsec).is_empty());
    }

    #[test]
    fn test_colorterm_is_clipped() {
        let t = Ps1Transform {
            ps1_band: 1,
            colorterm: vec![0.5, 2.0],
        };
        let s = ps1(1, 0.0, 0.0);
        // g - i = 0.8 -> 0.5 + 1.6 = 2.1, clipped to 1
        assert!((t.observed_mag(&s) - 18.5).abs() < 1e-12);
        let mut terms = ColorTerms::default();
        terms.coeffs.insert("g".into(), vec![0.1, -0.2]);
        assert!((terms.eval("g", 1.0) + 0.1).abs() < 1e-12);
        assert_eq!(terms.eval("z", 1.0), 0.0);
    }
}
