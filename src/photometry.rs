//! Forced PSF photometry of reference stars.
//!
//! Each reference star is fit independently on a `(2R+1)²` patch around its
//! predicted pixel position with a three-parameter point-source model
//! (x, y, flux) rendered from the PsfEx PSF at that position. The fit is a
//! flux-only linear solve followed by Gauss-Newton steps with a short line
//! search over trial step fractions; uncertainties come from the inverse
//! Fisher matrix at the solution.

use nalgebra::{Matrix3, Vector3};
use tracing::debug;

use crate::plane::{Plane, Region};
use crate::psf::{PixelizedPsf, PsfExModel};
use crate::refstars::ReferenceStar;
use crate::wcs::Wcs;

/// Configuration for [`ForcedPhotometryFitter`].
#[derive(Debug, Clone)]
pub struct FitConfig {
    /// Half-width of the fit patch in pixels.
    /// Default: 10
    pub radius: usize,
    /// Maximum optimizer steps per star.
    /// Default: 50
    pub max_steps: usize,
    /// Step fractions tried along each Gauss-Newton direction.
    /// Default: [0.1, 0.3, 1.0]
    pub alphas: Vec<f64>,
    /// Normalize the PSF stamp to unit sum before fitting.
    /// Default: true
    pub normalize_psf: bool,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            radius: 10,
            max_steps: 50,
            alphas: vec![0.1, 0.3, 1.0],
            normalize_psf: true,
        }
    }
}

/// Result of fitting one reference star. Pixel coordinates are zero-indexed.
#[derive(Debug, Clone, PartialEq)]
pub struct StarFit {
    /// Index into the reference star list.
    pub iref: usize,
    /// Predicted position from the reference catalog and WCS.
    pub x0: f64,
    pub y0: f64,
    /// Fitted position.
    pub x1: f64,
    pub y1: f64,
    pub flux: f64,
    pub dx: f64,
    pub dy: f64,
    pub dflux: f64,
    /// Sum of the PSF stamp before normalization.
    pub psfsum: f64,
    /// Chi-squared weighted by the normalized fitted model.
    pub chi2: f64,
    /// Fraction of the fitted model falling on zero-weight pixels.
    pub fracmasked: f64,
    pub ra_fit: f64,
    pub dec_fit: f64,
}

/// Counts of stars dropped before producing a [`StarFit`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RejectionCounts {
    /// Fit patch not fully on the image.
    pub off_image: usize,
    /// Every patch pixel has zero inverse variance.
    pub zero_ivar: usize,
    /// Degenerate curvature at the solution.
    pub no_variance: usize,
}

impl RejectionCounts {
    pub fn total(&self) -> usize {
        self.off_image + self.zero_ivar + self.no_variance
    }

    pub fn merge(&mut self, other: &RejectionCounts) {
        self.off_image += other.off_image;
        self.zero_ivar += other.zero_ivar;
        self.no_variance += other.no_variance;
    }
}

/// Fits reference stars on one CCD.
pub struct ForcedPhotometryFitter<'a> {
    config: &'a FitConfig,
    wcs: &'a Wcs,
    psf: &'a PsfExModel,
}

/// Patch data for one star.
struct Patch {
    img: Plane<f64>,
    ie: Plane<f64>,
    psf: PixelizedPsf,
}

impl Patch {
    fn model(&self, p: &Vector3<f64>) -> Plane<f64> {
        self.psf
            .model_image(p[2], p[0], p[1], self.img.width(), self.img.height())
    }

    /// `-½ χ²` of a model.
    fn lnp(&self, model: &Plane<f64>) -> f64 {
        let mut chi2 = 0.0;
        for ((&d, &m), &ie) in self.img.data().iter().zip(model.data()).zip(self.ie.data()) {
            let c = (d - m) * ie;
            chi2 += c * c;
        }
        -0.5 * chi2
    }

    /// Jacobian columns (∂x, ∂y, ∂flux) by central differences in position.
    fn jacobian(&self, p: &Vector3<f64>) -> [Plane<f64>; 3] {
        const H: f64 = 0.05;
        let at = |dx: f64, dy: f64, flux: f64| self.model(&Vector3::new(p[0] + dx, p[1] + dy, flux));
        let xp = at(H, 0.0, p[2]);
        let xm = at(-H, 0.0, p[2]);
        let yp = at(0.0, H, p[2]);
        let ym = at(0.0, -H, p[2]);
        let diff = |a: &Plane<f64>, b: &Plane<f64>| {
            let mut out = a.clone();
            for (o, &v) in out.data_mut().iter_mut().zip(b.data()) {
                *o = (*o - v) / (2.0 * H);
            }
            out
        };
        [diff(&xp, &xm), diff(&yp, &ym), at(0.0, 0.0, 1.0)]
    }

    /// Fisher matrix `JᵀWJ` and gradient `JᵀW r`.
    fn normal_equations(&self, p: &Vector3<f64>) -> (Matrix3<f64>, Vector3<f64>) {
        let jac = self.jacobian(p);
        let model = self.model(p);
        let mut fisher = Matrix3::<f64>::zeros();
        let mut grad = Vector3::<f64>::zeros();
        for k in 0..self.img.data().len() {
            let w = self.ie.data()[k] * self.ie.data()[k];
            if w == 0.0 {
                continue;
            }
            let r = self.img.data()[k] - model.data()[k];
            let row = Vector3::new(jac[0].data()[k], jac[1].data()[k], jac[2].data()[k]);
            fisher += row * row.transpose() * w;
            grad += row * (w * r);
        }
        (fisher, grad)
    }
}

impl<'a> ForcedPhotometryFitter<'a> {
    pub fn new(config: &'a FitConfig, wcs: &'a Wcs, psf: &'a PsfExModel) -> Self {
        Self { config, wcs, psf }
    }

    /// Fit every reference star, in order. `img` is sky-subtracted, `ierr` is
    /// the per-pixel inverse error (zero for masked pixels).
    pub fn fit(
        &self,
        refs: &[ReferenceStar],
        img: &Plane<f64>,
        ierr: &Plane<f64>,
    ) -> (Vec<StarFit>, RejectionCounts) {
        let mut fits = Vec::new();
        let mut counts = RejectionCounts::default();
        for (iref, star) in refs.iter().enumerate() {
            match self.fit_one(iref, star, img, ierr) {
                Ok(fit) => fits.push(fit),
                Err(Rejection::OffImage) => counts.off_image += 1,
                Err(Rejection::ZeroIvar) => counts.zero_ivar += 1,
                Err(Rejection::NoVariance) => counts.no_variance += 1,
            }
        }
        if counts.zero_ivar > 0 {
            debug!("Zero ivar for {} stars", counts.zero_ivar);
        }
        if counts.off_image > 0 {
            debug!("Off image for {} stars", counts.off_image);
        }
        (fits, counts)
    }

    fn fit_one(
        &self,
        iref: usize,
        star: &ReferenceStar,
        img: &Plane<f64>,
        ierr: &Plane<f64>,
    ) -> Result<StarFit, Rejection> {
        let r = self.config.radius as i64;
        let (x, y) = self
            .wcs
            .radec2pixelxy(star.ra_now, star.dec_now)
            .ok_or(Rejection::OffImage)?;
        let (x, y) = (x - 1.0, y - 1.0);

        // Truncates toward zero: a patch start in (-1, 0) becomes 0.
        let xlo = (x - r as f64).trunc() as i64;
        let ylo = (y - r as f64).trunc() as i64;
        if xlo < 0 || ylo < 0 {
            return Err(Rejection::OffImage);
        }
        let xhi = xlo + 2 * r;
        let yhi = ylo + 2 * r;
        if xhi >= img.width() as i64 || yhi >= img.height() as i64 {
            return Err(Rejection::OffImage);
        }
        let region = Region {
            x0: xlo as usize,
            x1: xhi as usize + 1,
            y0: ylo as usize,
            y1: yhi as usize + 1,
        };
        let subimg = img.crop(&region).map_err(|_| Rejection::OffImage)?;
        let subie = ierr.crop(&region).map_err(|_| Rejection::OffImage)?;

        let mut psfimg = self.psf.image_at(x, y);
        let psfsum: f64 = psfimg.data().iter().sum();
        if self.config.normalize_psf && psfsum != 0.0 {
            psfimg = psfimg.map(|v| v / psfsum);
        }
        let psfimg = crop_centered(&psfimg, self.config.radius + 5);

        if subie.data().iter().all(|&v| v == 0.0) {
            return Err(Rejection::ZeroIvar);
        }

        let patch = Patch {
            img: subimg,
            ie: subie,
            psf: PixelizedPsf::new(psfimg),
        };
        let px0 = x - xlo as f64;
        let py0 = y - ylo as f64;
        let mut p = Vector3::new(px0, py0, star.flux0);

        // Linear flux fit with the position frozen.
        let unit = patch.model(&Vector3::new(px0, py0, 1.0));
        let (mut num, mut den) = (0.0, 0.0);
        for ((&d, &m), &ie) in patch.img.data().iter().zip(unit.data()).zip(patch.ie.data()) {
            let w = ie * ie;
            num += d * m * w;
            den += m * m * w;
        }
        if den > 0.0 {
            p[2] = num / den;
        }

        let mut lnp = patch.lnp(&patch.model(&p));
        for _ in 0..self.config.max_steps {
            let (fisher, grad) = patch.normal_equations(&p);
            let Some(step) = fisher.lu().solve(&grad) else {
                break;
            };
            let mut best: Option<(f64, Vector3<f64>)> = None;
            for &alpha in &self.config.alphas {
                let trial = p + step * alpha;
                let l = patch.lnp(&patch.model(&trial));
                if l > lnp && best.as_ref().map_or(true, |(bl, _)| l > *bl) {
                    best = Some((l, trial));
                }
            }
            match best {
                Some((l, trial)) => {
                    lnp = l;
                    p = trial;
                }
                // dlnp == 0
                None => break,
            }
        }

        let (fisher, _) = patch.normal_equations(&p);
        let var = fisher
            .try_inverse()
            .map(|inv| inv.diagonal())
            .filter(|d| d.iter().all(|v| v.is_finite() && *v > 0.0))
            .ok_or(Rejection::NoVariance)?;

        let model = patch.model(&p);
        let msum: f64 = model.data().iter().sum();
        let (mut chi2, mut fracmasked) = (0.0, 0.0);
        if msum != 0.0 {
            for ((&d, &m), &ie) in patch.img.data().iter().zip(model.data()).zip(patch.ie.data()) {
                let w = m / msum;
                let chi = (d - m) * ie;
                chi2 += chi * chi * w;
                if ie == 0.0 {
                    fracmasked += w;
                }
            }
        }

        let x1 = p[0] + xlo as f64;
        let y1 = p[1] + ylo as f64;
        let (ra_fit, dec_fit) = self.wcs.pixelxy2radec(x1 + 1.0, y1 + 1.0);
        Ok(StarFit {
            iref,
            x0: x,
            y0: y,
            x1,
            y1,
            flux: p[2],
            dx: var[0].sqrt(),
            dy: var[1].sqrt(),
            dflux: var[2].sqrt(),
            psfsum,
            chi2,
            fracmasked,
            ra_fit,
            dec_fit,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    OffImage,
    ZeroIvar,
    NoVariance,
}

/// The central `(2·half+1)²` pixels of a stamp, or the whole stamp if smaller.
fn crop_centered(img: &Plane<f64>, half: usize) -> Plane<f64> {
    let (cx, cy) = (img.width() / 2, img.height() / 2);
    let region = Region {
        x0: cx.saturating_sub(half),
        x1: (cx + half + 1).min(img.width()),
        y0: cy.saturating_sub(half),
        y1: (cy + half + 1).min(img.height()),
    };
    img.crop(&region).unwrap_or_else(|_| img.clone())
}
