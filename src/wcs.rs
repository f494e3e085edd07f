//! Gnomonic (TAN) world coordinate system with optional TPV distortion.
//!
//! Pixel coordinates follow the FITS convention: the center of the first pixel
//! is `(1, 1)`. Callers working in zero-indexed array coordinates add one on the
//! way in and subtract one on the way out.

use anyhow::{Context, Result};

use crate::fits::Header;

// ── TAN projection ─────────────────────────────────────────────────────────

/// Forward gnomonic projection of `(ra, dec)` onto the plane tangent at
/// `(crval_ra, crval_dec)`. All angles in radians. Returns `None` for points
/// on or behind the tangent plane.
#[inline]
pub fn tan_project(ra: f64, dec: f64, crval_ra: f64, crval_dec: f64) -> Option<(f64, f64)> {
    let da = ra - crval_ra;
    let (sin_dec, cos_dec) = dec.sin_cos();
    let (sin_dec0, cos_dec0) = crval_dec.sin_cos();
    let cos_da = da.cos();

    let denom = sin_dec * sin_dec0 + cos_dec * cos_dec0 * cos_da;
    if denom <= 1e-12 {
        return None;
    }
    let xi = cos_dec * da.sin() / denom;
    let eta = (sin_dec * cos_dec0 - cos_dec * sin_dec0 * cos_da) / denom;
    Some((xi, eta))
}

/// Inverse gnomonic projection. Returns `(ra, dec)` in radians with RA in `[0, 2π)`.
#[inline]
pub fn inverse_tan_project(xi: f64, eta: f64, crval_ra: f64, crval_dec: f64) -> (f64, f64) {
    let (sin_dec0, cos_dec0) = crval_dec.sin_cos();
    let rho_sq = xi * xi + eta * eta;
    if rho_sq < 1e-30 {
        return (crval_ra.rem_euclid(std::f64::consts::TAU), crval_dec);
    }
    let rho = rho_sq.sqrt();
    let c = rho.atan();
    let (sin_c, cos_c) = c.sin_cos();

    let dec = (cos_c * sin_dec0 + eta * sin_c * cos_dec0 / rho).asin();
    let ra = crval_ra + (xi * sin_c).atan2(rho * cos_dec0 * cos_c - eta * sin_dec0 * sin_c);
    (ra.rem_euclid(std::f64::consts::TAU), dec)
}

/// Invert a 2×2 matrix. Returns `None` if singular.
#[inline]
pub fn cd_inverse(cd: &[[f64; 2]; 2]) -> Option<[[f64; 2]; 2]> {
    let det = cd[0][0] * cd[1][1] - cd[0][1] * cd[1][0];
    if det.abs() < 1e-30 {
        return None;
    }
    let inv_det = 1.0 / det;
    Some([
        [cd[1][1] * inv_det, -cd[0][1] * inv_det],
        [-cd[1][0] * inv_det, cd[0][0] * inv_det],
    ])
}

// ── TPV polynomial ─────────────────────────────────────────────────────────

const NTPV: usize = 12;

/// TPV terms up to third order, including the two radial terms (indices 3 and 11).
fn tpv_terms(u: f64, v: f64) -> [f64; NTPV] {
    let r = (u * u + v * v).sqrt();
    [
        1.0,
        u,
        v,
        r,
        u * u,
        u * v,
        v * v,
        u * u * u,
        u * u * v,
        u * v * v,
        v * v * v,
        r * r * r,
    ]
}

fn tpv_eval(coeffs: &[f64; NTPV], u: f64, v: f64) -> f64 {
    coeffs.iter().zip(tpv_terms(u, v)).map(|(c, t)| c * t).sum()
}

/// Identity TPV: `PVi_1 = 1`, all other coefficients zero.
fn identity_tpv() -> [f64; NTPV] {
    let mut c = [0.0; NTPV];
    c[1] = 1.0;
    c
}

// ── WCS ────────────────────────────────────────────────────────────────────

/// TAN (+TPV) WCS. Intermediate world coordinates are in degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct Wcs {
    pub crpix: [f64; 2],
    /// Reference point (RA, Dec) in degrees.
    pub crval: [f64; 2],
    pub cd: [[f64; 2]; 2],
    cd_inv: [[f64; 2]; 2],
    pv1: [f64; NTPV],
    pv2: [f64; NTPV],
    has_tpv: bool,
    pub width: usize,
    pub height: usize,
}

impl Wcs {
    /// Plain TAN WCS.
    pub fn new_tan(crpix: [f64; 2], crval: [f64; 2], cd: [[f64; 2]; 2], width: usize, height: usize) -> Result<Self> {
        let cd_inv = cd_inverse(&cd).context("singular CD matrix")?;
        Ok(Self {
            crpix,
            crval,
            cd,
            cd_inv,
            pv1: identity_tpv(),
            pv2: identity_tpv(),
            has_tpv: false,
            width,
            height,
        })
    }

    /// Build from an image-extension header. CRPIX, CRVAL and CD cards are required;
    /// `PV1_k` / `PV2_k` cards switch on TPV distortion.
    pub fn from_header(hdr: &Header, width: usize, height: usize) -> Result<Self> {
        let crpix = [hdr.require_f64("CRPIX1")?, hdr.require_f64("CRPIX2")?];
        let crval = [hdr.require_f64("CRVAL1")?, hdr.require_f64("CRVAL2")?];
        let cd = [
            [hdr.require_f64("CD1_1")?, hdr.require_f64("CD1_2")?],
            [hdr.require_f64("CD2_1")?, hdr.require_f64("CD2_2")?],
        ];
        let mut wcs = Self::new_tan(crpix, crval, cd, width, height)?;

        let mut pv1 = identity_tpv();
        let mut pv2 = identity_tpv();
        let mut any = false;
        for k in 0..NTPV {
            if let Some(v) = hdr.get_f64(&format!("PV1_{}", k)) {
                pv1[k] = v;
                any = true;
            }
            if let Some(v) = hdr.get_f64(&format!("PV2_{}", k)) {
                pv2[k] = v;
                any = true;
            }
        }
        if any {
            wcs.set_tpv(pv1, pv2);
        }
        Ok(wcs)
    }

    pub fn set_tpv(&mut self, pv1: [f64; NTPV], pv2: [f64; NTPV]) {
        self.pv1 = pv1;
        self.pv2 = pv2;
        self.has_tpv = true;
    }

    /// Pixel `(x, y)` (1-indexed) to `(ra, dec)` in degrees.
    pub fn pixelxy2radec(&self, x: f64, y: f64) -> (f64, f64) {
        let dx = x - self.crpix[0];
        let dy = y - self.crpix[1];
        let u = self.cd[0][0] * dx + self.cd[0][1] * dy;
        let v = self.cd[1][0] * dx + self.cd[1][1] * dy;
        let (xi, eta) = self.distort(u, v);
        let (ra, dec) = inverse_tan_project(
            xi.to_radians(),
            eta.to_radians(),
            self.crval[0].to_radians(),
            self.crval[1].to_radians(),
        );
        (ra.to_degrees(), dec.to_degrees())
    }

    /// `(ra, dec)` in degrees to pixel `(x, y)` (1-indexed). `None` if the point
    /// is behind the tangent plane.
    pub fn radec2pixelxy(&self, ra: f64, dec: f64) -> Option<(f64, f64)> {
        let (xi, eta) = tan_project(
            ra.to_radians(),
            dec.to_radians(),
            self.crval[0].to_radians(),
            self.crval[1].to_radians(),
        )?;
        let (u, v) = self.undistort(xi.to_degrees(), eta.to_degrees());
        let dx = self.cd_inv[0][0] * u + self.cd_inv[0][1] * v;
        let dy = self.cd_inv[1][0] * u + self.cd_inv[1][1] * v;
        Some((dx + self.crpix[0], dy + self.crpix[1]))
    }

    /// CCD center `((W+1)/2, (H+1)/2)` on the sky, degrees.
    pub fn center(&self) -> (f64, f64) {
        self.pixelxy2radec((self.width as f64 + 1.0) / 2.0, (self.height as f64 + 1.0) / 2.0)
    }

    /// Whether `(ra, dec)` lands inside the image, grown by `margin` pixels.
    pub fn is_inside(&self, ra: f64, dec: f64, margin: f64) -> bool {
        match self.radec2pixelxy(ra, dec) {
            Some((x, y)) => {
                x >= 0.5 - margin
                    && y >= 0.5 - margin
                    && x <= self.width as f64 + 0.5 + margin
                    && y <= self.height as f64 + 0.5 + margin
            }
            None => false,
        }
    }

    /// Mean pixel scale in arcsec/pixel from the CD determinant.
    pub fn pixel_scale(&self) -> f64 {
        let det = self.cd[0][0] * self.cd[1][1] - self.cd[0][1] * self.cd[1][0];
        det.abs().sqrt() * 3600.0
    }

    fn distort(&self, u: f64, v: f64) -> (f64, f64) {
        if !self.has_tpv {
            return (u, v);
        }
        // PV2 polynomials take the axes in swapped order.
        (tpv_eval(&self.pv1, u, v), tpv_eval(&self.pv2, v, u))
    }

    /// Newton iteration inverting the TPV polynomial.
    fn undistort(&self, xi: f64, eta: f64) -> (f64, f64) {
        if !self.has_tpv {
            return (xi, eta);
        }
        let (mut u, mut v) = (xi, eta);
        const H: f64 = 1e-7;
        for _ in 0..20 {
            let (fx, fy) = self.distort(u, v);
            let (rx, ry) = (fx - xi, fy - eta);
            if rx.abs() < 1e-13 && ry.abs() < 1e-13 {
                break;
            }
            let (fxu, fyu) = self.distort(u + H, v);
            let (fxv, fyv) = self.distort(u, v + H);
            let j = [[(fxu - fx) / H, (fxv - fx) / H], [(fyu - fy) / H, (fyv - fy) / H]];
            let Some(ji) = cd_inverse(&j) else {
                break;
            };
            u -= ji[0][0] * rx + ji[0][1] * ry;
            v -= ji[1][0] * rx + ji[1][1] * ry;
        }
        (u, v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decam_like() -> Wcs {
        // 0.262"/px, north up, east left
        let s = 0.262 / 3600.0;
        Wcs::new_tan([1024.5, 2048.5], [36.0, -4.5], [[-s, 0.0], [0.0, s]], 2046, 4094).unwrap()
    }

    #[test]
    fn test_crpix_maps_to_crval() {
        let w = decam_like();
        let (ra, dec) = w.pixelxy2radec(1024.5, 2048.5);
        assert!((ra - 36.0).abs() < 1e-12);
        assert!((dec + 4.5).abs() < 1e-12);
    }

    #[test]
    fn test_roundtrip_tan() {
        let w = decam_like();
        for &(x, y) in &[(1.0, 1.0), (2046.0, 4094.0), (300.25, 3900.75)] {
            let (ra, dec) = w.pixelxy2radec(x, y);
            let (x2, y2) = w.radec2pixelxy(ra, dec).unwrap();
            assert!((x - x2).abs() < 1e-6, "x: {} vs {}", x, x2);
            assert!((y - y2).abs() < 1e-6, "y: {} vs {}", y, y2);
        }
    }

    #[test]
    fn test_roundtrip_tpv() {
        let mut w = decam_like();
        let mut pv1 = identity_tpv();
        let mut pv2 = identity_tpv();
        pv1[0] = 1e-4;
        pv1[4] = 2e-3;
        pv1[7] = -5e-3;
        pv2[2] = 1e-3;
        pv2[11] = 4e-3;
        w.set_tpv(pv1, pv2);
        let (ra, dec) = w.pixelxy2radec(10.0, 4000.0);
        let (x, y) = w.radec2pixelxy(ra, dec).unwrap();
        assert!((x - 10.0).abs() < 1e-5, "x={}", x);
        assert!((y - 4000.0).abs() < 1e-5, "y={}", y);
    }

    #[test]
    fn test_ra_wraps_near_zero() {
        let s = 0.262 / 3600.0;
        let w = Wcs::new_tan([100.0, 100.0], [0.001, 10.0], [[-s, 0.0], [0.0, s]], 200, 200).unwrap();
        let (ra, _) = w.pixelxy2radec(200.0, 100.0);
        assert!(ra > 359.0, "ra={}", ra);
        let (x, _) = w.radec2pixelxy(ra, 10.0).unwrap();
        assert!((x - 200.0).abs() < 1e-6);
    }

    #[test]
    fn test_pixel_scale() {
        assert!((decam_like().pixel_scale() - 0.262).abs() < 1e-9);
    }

    #[test]
    fn test_from_header_requires_cd() {
        let mut h = Header::new();
        h.set("CRPIX1", 1.0, None);
        h.set("CRPIX2", 1.0, None);
        h.set("CRVAL1", 10.0, None);
        h.set("CRVAL2", 0.0, None);
        assert!(Wcs::from_header(&h, 10, 10).is_err());
    }
}
