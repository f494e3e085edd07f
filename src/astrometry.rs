//! Celestial coordinate helpers: sexagesimal parsing, angular distances,
//! epoch transport of catalog positions and airmass.

use anyhow::{bail, Context, Result};

/// Days between MJD 0 and J2000.0.
const MJD_J2000: f64 = 51544.5;
/// Mean obliquity of the ecliptic at J2000, degrees.
const OBLIQUITY_DEG: f64 = 23.4393;
const MAS_PER_DEG: f64 = 3.6e6;

// ── Sexagesimal ────────────────────────────────────────────────────────────

fn parse_sexagesimal(s: &str) -> Result<(f64, f64)> {
    let s = s.trim();
    let (sign, body) = match s.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, s.strip_prefix('+').unwrap_or(s)),
    };
    let parts: Vec<&str> = body
        .split(|c: char| c == ':' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .collect();
    if parts.is_empty() || parts.len() > 3 {
        bail!("Cannot parse sexagesimal value {:?}", s);
    }
    let mut value = 0.0;
    let mut scale = 1.0;
    for p in &parts {
        let v: f64 = p
            .parse()
            .with_context(|| format!("Bad sexagesimal field {:?} in {:?}", p, s))?;
        value += v / scale;
        scale *= 60.0;
    }
    Ok((sign, value))
}

/// `"HH:MM:SS.s"` right ascension to degrees.
pub fn hms_to_ra(s: &str) -> Result<f64> {
    let (sign, hours) = parse_sexagesimal(s)?;
    Ok(sign * hours * 15.0)
}

/// `"±DD:MM:SS.s"` declination to degrees.
pub fn dms_to_dec(s: &str) -> Result<f64> {
    let (sign, deg) = parse_sexagesimal(s)?;
    Ok(sign * deg)
}

// ── Unit vectors ───────────────────────────────────────────────────────────

/// Unit vector for `(ra, dec)` in degrees.
pub fn radec_to_xyz(ra: f64, dec: f64) -> [f64; 3] {
    let (sr, cr) = ra.to_radians().sin_cos();
    let (sd, cd) = dec.to_radians().sin_cos();
    [cd * cr, cd * sr, sd]
}

/// Direction of a (not necessarily unit) vector as `(ra, dec)` in degrees, RA in `[0, 360)`.
pub fn xyz_to_radec(v: [f64; 3]) -> (f64, f64) {
    let [x, y, z] = v;
    let ra = y.atan2(x).to_degrees().rem_euclid(360.0);
    let dec = z.atan2((x * x + y * y).sqrt()).to_degrees();
    (ra, dec)
}

/// Great-circle distance between two positions, degrees (haversine form).
pub fn angular_separation(ra1: f64, dec1: f64, ra2: f64, dec2: f64) -> f64 {
    let d1 = dec1.to_radians();
    let d2 = dec2.to_radians();
    let dd = d2 - d1;
    let da = (ra2 - ra1).to_radians();
    let a = (dd / 2.0).sin().powi(2) + d1.cos() * d2.cos() * (da / 2.0).sin().powi(2);
    (2.0 * a.sqrt().min(1.0).asin()).to_degrees()
}

// ── Epoch transport ────────────────────────────────────────────────────────

/// Julian-year epoch of an MJD.
pub fn mjd_to_year(mjd: f64) -> f64 {
    2000.0 + (mjd - MJD_J2000) / 365.25
}

/// Geocentric direction to the Sun in equatorial coordinates, scaled to AU.
/// Low-precision solar theory, good to ~0.01° over the survey era.
pub fn sun_position(mjd: f64) -> [f64; 3] {
    let n = mjd - MJD_J2000;
    let mean_lon = (280.460 + 0.9856474 * n).rem_euclid(360.0);
    let g = (357.528 + 0.9856003 * n).rem_euclid(360.0).to_radians();
    let lambda = (mean_lon + 1.915 * g.sin() + 0.020 * (2.0 * g).sin()).to_radians();
    let dist = 1.00014 - 0.01671 * g.cos() - 0.00014 * (2.0 * g).cos();
    let eps = OBLIQUITY_DEG.to_radians();
    [
        dist * lambda.cos(),
        dist * eps.cos() * lambda.sin(),
        dist * eps.sin() * lambda.sin(),
    ]
}

/// Move a catalog position from `ref_year` to the epoch of `mjd`.
///
/// Proper motions are in mas/yr, with `pmra` including the cos(dec) factor;
/// parallax is in mas. A zero `ref_year` marks a star without astrometric
/// solution, which is returned unchanged.
pub fn radec_at_mjd(
    ra: f64,
    dec: f64,
    ref_year: f64,
    pmra: f64,
    pmdec: f64,
    parallax: f64,
    mjd: f64,
) -> (f64, f64) {
    if ref_year == 0.0 {
        return (ra, dec);
    }
    let dt = mjd_to_year(mjd) - ref_year;
    let cosdec = dec.to_radians().cos();
    let mut ra = ra + dt * pmra / MAS_PER_DEG / cosdec;
    let mut dec = dec + dt * pmdec / MAS_PER_DEG;

    if parallax != 0.0 {
        let plx_rad = (parallax / MAS_PER_DEG).to_radians();
        let sun = sun_position(mjd);
        let mut xyz = radec_to_xyz(ra, dec);
        for k in 0..3 {
            xyz[k] += plx_rad * sun[k];
        }
        (ra, dec) = xyz_to_radec(xyz);
    }
    (ra.rem_euclid(360.0), dec)
}

// ── Airmass ────────────────────────────────────────────────────────────────

/// Greenwich mean sidereal time in degrees.
pub fn gmst_deg(mjd: f64) -> f64 {
    let d = mjd - MJD_J2000;
    (280.46061837 + 360.98564736629 * d).rem_euclid(360.0)
}

/// Airmass (sec z) of `(ra, dec)` seen from geodetic `(lat, lon)` at `mjd`.
/// Returns `None` when the target is below the horizon.
pub fn airmass(ra: f64, dec: f64, lat: f64, lon: f64, mjd: f64) -> Option<f64> {
    let lst = gmst_deg(mjd) + lon;
    let ha = (lst - ra).to_radians();
    let phi = lat.to_radians();
    let delta = dec.to_radians();
    let sin_alt = phi.sin() * delta.sin() + phi.cos() * delta.cos() * ha.cos();
    if sin_alt <= 0.0 {
        return None;
    }
    Some(1.0 / sin_alt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sexagesimal() {
        assert!((hms_to_ra("02:30:00.0").unwrap() - 37.5).abs() < 1e-12);
        assert!((dms_to_dec("-00:30:00").unwrap() + 0.5).abs() < 1e-12);
        assert!((dms_to_dec("+12:15:36").unwrap() - 12.26).abs() < 1e-12);
        assert!(hms_to_ra("nope").is_err());
    }

    #[test]
    fn test_angular_separation() {
        let d = angular_separation(10.0, 0.0, 10.0 + 1.0 / 3600.0, 0.0);
        assert!((d * 3600.0 - 1.0).abs() < 1e-6);
        let d = angular_separation(359.9999, 0.0, 0.0001, 0.0);
        assert!((d - 0.0002).abs() < 1e-9, "wrap {}", d);
    }

    #[test]
    fn test_zero_epoch_is_untouched() {
        let (ra, dec) = radec_at_mjd(150.0, 2.0, 0.0, 1000.0, 1000.0, 10.0, 58000.0);
        assert_eq!((ra, dec), (150.0, 2.0));
    }

    #[test]
    fn test_proper_motion() {
        // 10 years at 360 mas/yr in dec is 3.6 arcsec
        let mjd = 51544.5 + 3652.5 + 365.25 * 15.0;
        let (ra, dec) = radec_at_mjd(150.0, 0.0, 2015.0, 0.0, 360.0, 0.0, mjd);
        assert!((ra - 150.0).abs() < 1e-12);
        assert!(((dec - 0.0) * 3600.0 - 3.6).abs() < 1e-6, "dec shift {}", dec * 3600.0);
    }

    #[test]
    fn test_parallax_bounded() {
        let (ra, dec) = radec_at_mjd(80.0, -20.0, 2015.5, 0.0, 0.0, 100.0, 57500.0);
        let sep = angular_separation(80.0, -20.0, ra, dec) * 3600.0;
        assert!(sep > 0.0 && sep <= 0.1 * 1.02, "parallax shift {}", sep);
    }

    #[test]
    fn test_sun_at_equinox() {
        // March equinox 2016: 2016-03-20 04:30 UT
        let s = sun_position(57467.1875);
        let (ra, dec) = xyz_to_radec(s);
        assert!(dec.abs() < 0.05, "dec={}", dec);
        assert!(ra < 0.1 || ra > 359.9, "ra={}", ra);
    }

    #[test]
    fn test_airmass_at_zenith() {
        let mjd = 57000.3;
        let lat = -30.17;
        let lon = -70.81;
        let ra = (gmst_deg(mjd) + lon).rem_euclid(360.0);
        let am = airmass(ra, lat, lat, lon, mjd).unwrap();
        assert!((am - 1.0).abs() < 1e-9, "airmass={}", am);
        assert!(airmass(ra, 80.0, lat, lon, mjd).is_none());
    }
}
