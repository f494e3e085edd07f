//! PSF models: spatially varying PsfEx bases and the pixelized PSF used to
//! render point sources at sub-pixel positions.

use anyhow::{ensure, Result};
use rkyv::{Archive, Deserialize, Serialize};

use crate::plane::Plane;

// ── Lanczos-3 interpolation ────────────────────────────────────────────────

const LANCZOS_A: f64 = 3.0;

#[inline]
fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-12 {
        1.0
    } else {
        let px = std::f64::consts::PI * x;
        px.sin() / px
    }
}

/// Lanczos-3 kernel.
#[inline]
pub fn lanczos3(x: f64) -> f64 {
    if x.abs() >= LANCZOS_A {
        0.0
    } else {
        sinc(x) * sinc(x / LANCZOS_A)
    }
}

/// Six normalized taps for sampling at `floor(t) - 2 ..= floor(t) + 3`.
fn lanczos_taps(t: f64) -> (i64, [f64; 6]) {
    let base = t.floor();
    let frac = t - base;
    let mut w = [0.0; 6];
    for (m, wm) in w.iter_mut().enumerate() {
        *wm = lanczos3(frac - (m as f64 - 2.0));
    }
    let sum: f64 = w.iter().sum();
    if sum != 0.0 {
        w.iter_mut().for_each(|v| *v /= sum);
    }
    (base as i64 - 2, w)
}

/// Sample `img` at fractional pixel `(x, y)`; pixels outside the image count as zero.
pub fn lanczos_sample(img: &Plane<f64>, x: f64, y: f64) -> f64 {
    let (x0, wx) = lanczos_taps(x);
    let (y0, wy) = lanczos_taps(y);
    let (w, h) = (img.width() as i64, img.height() as i64);
    let mut acc = 0.0;
    for (j, &wyj) in wy.iter().enumerate() {
        let yy = y0 + j as i64;
        if yy < 0 || yy >= h || wyj == 0.0 {
            continue;
        }
        for (i, &wxi) in wx.iter().enumerate() {
            let xx = x0 + i as i64;
            if xx < 0 || xx >= w {
                continue;
            }
            acc += wxi * wyj * img.get(xx as usize, yy as usize);
        }
    }
    acc
}

/// Shift an image by `(dx, dy)` pixels, separably. Output has the input shape.
pub fn lanczos_shift(img: &Plane<f64>, dx: f64, dy: f64) -> Plane<f64> {
    let (w, h) = (img.width(), img.height());
    // Output pixel u samples input at u - dx; the taps are the same for every u.
    let (ox, wx) = lanczos_taps(-dx);
    let (oy, wy) = lanczos_taps(-dy);

    let mut tmp = Plane::filled(w, h, 0.0);
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (i, &wi) in wx.iter().enumerate() {
                let xx = x as i64 + ox + i as i64;
                if xx >= 0 && (xx as usize) < w {
                    acc += wi * img.get(xx as usize, y);
                }
            }
            tmp.set(x, y, acc);
        }
    }
    let mut out = Plane::filled(w, h, 0.0);
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (j, &wj) in wy.iter().enumerate() {
                let yy = y as i64 + oy + j as i64;
                if yy >= 0 && (yy as usize) < h {
                    acc += wj * tmp.get(x, yy as usize);
                }
            }
            out.set(x, y, acc);
        }
    }
    out
}

// ── PsfEx model ────────────────────────────────────────────────────────────

/// A PsfEx polynomial PSF: `ne = (d+1)(d+2)/2` basis images combined with
/// monomials in the scaled CCD position.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct PsfExModel {
    /// Polynomial degree in x and y.
    pub degree: usize,
    pub polzero: [f64; 2],
    pub polscale: [f64; 2],
    /// Size of a PSF-model pixel in image pixels.
    pub sampling: f64,
    /// FWHM in image pixels.
    pub fwhm: f64,
    /// Basis image width.
    pub width: usize,
    /// Basis image height.
    pub height: usize,
    /// `ne` row-major basis images, concatenated.
    pub basis: Vec<f32>,
}

impl PsfExModel {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        degree: usize,
        polzero: [f64; 2],
        polscale: [f64; 2],
        sampling: f64,
        fwhm: f64,
        width: usize,
        height: usize,
        basis: Vec<f32>,
    ) -> Result<Self> {
        let model = Self {
            degree,
            polzero,
            polscale,
            sampling,
            fwhm,
            width,
            height,
            basis,
        };
        model.validate()?;
        Ok(model)
    }

    /// Check that the basis holds one image per polynomial term and that the
    /// position scaling is usable. Models loaded from artifacts bypass `new`.
    pub fn validate(&self) -> Result<()> {
        let ne = self.n_terms();
        ensure!(
            self.basis.len() == ne * self.width * self.height,
            "PsfEx basis has {} values, expected {} x {}x{}",
            self.basis.len(),
            ne,
            self.width,
            self.height
        );
        ensure!(
            self.polscale[0] != 0.0 && self.polscale[1] != 0.0,
            "PsfEx polscale must be nonzero"
        );
        Ok(())
    }

    /// A position-independent model from a single image.
    pub fn constant(img: &Plane<f64>, fwhm: f64) -> Self {
        Self {
            degree: 0,
            polzero: [0.0, 0.0],
            polscale: [1.0, 1.0],
            sampling: 1.0,
            fwhm,
            width: img.width(),
            height: img.height(),
            basis: img.data().iter().map(|&v| v as f32).collect(),
        }
    }

    pub fn n_terms(&self) -> usize {
        (self.degree + 1) * (self.degree + 2) / 2
    }

    /// Polynomial terms at `(x, y)`, PsfEx order: `x^i y^j` with `i` fastest.
    fn terms(&self, x: f64, y: f64) -> Vec<f64> {
        let dx = (x - self.polzero[0]) / self.polscale[0];
        let dy = (y - self.polzero[1]) / self.polscale[1];
        let mut out = Vec::with_capacity(self.n_terms());
        for j in 0..=self.degree {
            for i in 0..=(self.degree - j) {
                out.push(dx.powi(i as i32) * dy.powi(j as i32));
            }
        }
        out
    }

    /// PSF image at CCD position `(x, y)`, on the image pixel grid.
    pub fn image_at(&self, x: f64, y: f64) -> Plane<f64> {
        let npix = self.width * self.height;
        let mut native = Plane::filled(self.width, self.height, 0.0);
        for (k, t) in self.terms(x, y).into_iter().enumerate() {
            let b = &self.basis[k * npix..(k + 1) * npix];
            for (d, &v) in native.data_mut().iter_mut().zip(b) {
                *d += t * v as f64;
            }
        }
        if (self.sampling - 1.0).abs() < 1e-9 || self.sampling <= 0.0 {
            return native;
        }
        resample(&native, self.sampling)
    }
}

/// Resample a PSF stamp with pixels `sampling` image pixels wide onto the image grid.
fn resample(native: &Plane<f64>, sampling: f64) -> Plane<f64> {
    let cx = (native.width() / 2) as f64;
    let cy = (native.height() / 2) as f64;
    let hx = ((native.width() / 2) as f64 * sampling).floor() as usize;
    let hy = ((native.height() / 2) as f64 * sampling).floor() as usize;
    let (w, h) = (2 * hx + 1, 2 * hy + 1);
    let mut out = Plane::filled(w, h, 0.0);
    for oy in 0..h {
        for ox in 0..w {
            let sx = cx + (ox as f64 - hx as f64) / sampling;
            let sy = cy + (oy as f64 - hy as f64) / sampling;
            out.set(ox, oy, lanczos_sample(native, sx, sy));
        }
    }
    out
}

// ── Pixelized PSF ──────────────────────────────────────────────────────────

/// A fixed PSF stamp whose central pixel `(w/2, h/2)` marks the source position.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelizedPsf {
    img: Plane<f64>,
}

impl PixelizedPsf {
    pub fn new(img: Plane<f64>) -> Self {
        Self { img }
    }

    pub fn image(&self) -> &Plane<f64> {
        &self.img
    }

    /// Stamp of a point source of total `flux` displaced by `(dx, dy)` from the center.
    pub fn render(&self, flux: f64, dx: f64, dy: f64) -> Plane<f64> {
        let shifted = if dx == 0.0 && dy == 0.0 {
            self.img.clone()
        } else {
            lanczos_shift(&self.img, dx, dy)
        };
        shifted.map(|v| v * flux)
    }

    /// Model image of size `width × height` with a point source of `flux` at `(x, y)`.
    pub fn model_image(&self, flux: f64, x: f64, y: f64, width: usize, height: usize) -> Plane<f64> {
        let ix = x.floor();
        let iy = y.floor();
        let stamp = self.render(flux, x - ix, y - iy);
        let cx = (self.img.width() / 2) as i64;
        let cy = (self.img.height() / 2) as i64;
        let ox = ix as i64 - cx;
        let oy = iy as i64 - cy;

        let mut out = Plane::filled(width, height, 0.0);
        for sy in 0..stamp.height() {
            let ty = oy + sy as i64;
            if ty < 0 || ty >= height as i64 {
                continue;
            }
            for sx in 0..stamp.width() {
                let tx = ox + sx as i64;
                if tx < 0 || tx >= width as i64 {
                    continue;
                }
                out.set(tx as usize, ty as usize, stamp.get(sx, sy));
            }
        }
        out
    }
}

/// Circular Gaussian stamp of odd side `size`, unit sum.
pub fn gaussian_stamp(size: usize, fwhm: f64) -> Plane<f64> {
    let sigma = fwhm / (8.0 * 2f64.ln()).sqrt();
    let c = (size / 2) as f64;
    let mut img = Plane::filled(size, size, 0.0);
    let mut sum = 0.0;
    for y in 0..size {
        for x in 0..size {
            let r2 = (x as f64 - c).powi(2) + (y as f64 - c).powi(2);
            let v = (-0.5 * r2 / (sigma * sigma)).exp();
            img.set(x, y, v);
            sum += v;
        }
    }
    img.map(|v| v / sum)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lanczos_kernel() {
        assert_eq!(lanczos3(0.0), 1.0);
        assert!(lanczos3(1.0).abs() < 1e-12);
        assert_eq!(lanczos3(3.5), 0.0);
    }

    #[test]
    fn test_integer_shift_moves_pixels() {
        let img = gaussian_stamp(21, 3.0);
        let s = lanczos_shift(&img, 1.0, -2.0);
        assert!((s.get(11, 8) - img.get(10, 10)).abs() < 1e-12);
    }

    #[test]
    fn test_subpixel_shift_moves_centroid() {
        let psf = PixelizedPsf::new(gaussian_stamp(31, 4.0));
        let m = psf.render(100.0, 0.3, -0.2);
        let (mut sx, mut sy, mut s) = (0.0, 0.0, 0.0);
        for y in 0..31 {
            for x in 0..31 {
                let v = m.get(x, y);
                sx += v * x as f64;
                sy += v * y as f64;
                s += v;
            }
        }
        assert!((s - 100.0).abs() < 0.1, "flux {}", s);
        assert!((sx / s - 15.3).abs() < 0.01, "cx {}", sx / s);
        assert!((sy / s - 14.8).abs() < 0.01, "cy {}", sy / s);
    }

    #[test]
    fn test_psfex_polynomial_terms() {
        // degree 1: terms 1, x, y
        let ones = vec![1.0f32; 9];
        let mut basis = ones.clone();
        basis.extend(ones.iter().map(|v| v * 2.0));
        basis.extend(ones.iter().map(|v| v * 3.0));
        let m = PsfExModel::new(1, [100.0, 200.0], [50.0, 100.0], 1.0, 4.0, 3, 3, basis).unwrap();
        let img = m.image_at(150.0, 400.0);
        // 1 + 2*1 + 3*2
        assert!((img.get(1, 1) - 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_resampled_size() {
        let m = PsfExModel::constant(&gaussian_stamp(25, 6.0), 3.0);
        let m = PsfExModel { sampling: 0.5, ..m };
        let img = m.image_at(0.0, 0.0);
        assert_eq!(img.width(), 13);
        let c = img.get(6, 6);
        assert!(img.data().iter().all(|&v| v <= c + 1e-12));
    }

    #[test]
    fn test_basis_length_checked() {
        assert!(PsfExModel::new(2, [0.0; 2], [1.0; 2], 1.0, 3.0, 5, 5, vec![0.0; 25]).is_err());
    }

    #[test]
    fn test_validate_struct_literal() {
        let m = PsfExModel::constant(&gaussian_stamp(5, 2.0), 2.0);
        assert!(m.validate().is_ok());
        assert!(PsfExModel { degree: 2, ..m.clone() }.validate().is_err(), "1 basis image for 6 terms");
        assert!(PsfExModel { polscale: [1.0, 0.0], ..m }.validate().is_err());
    }
}
