//! Sky background estimation.
//!
//! The default estimate is a constant level from a sigma-clipped central box
//! of the detector. A precomputed spline sky model can replace it when one is
//! available from the calibration artifacts.

use rkyv::{Archive, Deserialize, Serialize};
use tracing::debug;

use crate::plane::{Plane, Region};
use crate::stats::{median, sigma_clip, std};

/// Configuration for [`estimate_sky`].
#[derive(Debug, Clone)]
pub struct SkyConfig {
    /// Symmetric clip threshold in standard deviations.
    /// Default: 4.0
    pub nsigma: f64,
}

impl Default for SkyConfig {
    fn default() -> Self {
        Self { nsigma: 4.0 }
    }
}

/// Sky level and noise for one CCD.
#[derive(Debug, Clone)]
pub struct SkyEstimate {
    /// Per-pixel sky model, same shape as the image.
    pub image: Plane<f64>,
    /// Median of the clipped box pixels.
    pub median: f64,
    /// Standard deviation of the clipped box pixels.
    pub std: f64,
}

/// Constant sky from the pixels of `sky_box`, sigma-clipped at `config.nsigma`.
///
/// The box is intersected with the image, so images smaller than the nominal
/// detector use whatever part of the box they cover.
pub fn estimate_sky(img: &Plane<f64>, sky_box: Region, config: &SkyConfig) -> SkyEstimate {
    let region = Region {
        x0: sky_box.x0.min(img.width()),
        x1: sky_box.x1.min(img.width()),
        y0: sky_box.y0.min(img.height()),
        y1: sky_box.y1.min(img.height()),
    };
    let mut pixels = Vec::with_capacity(region.width() * region.height());
    for y in region.y0..region.y1 {
        for x in region.x0..region.x1 {
            pixels.push(img.get(x, y));
        }
    }
    let clip = sigma_clip(&pixels, config.nsigma, config.nsigma);
    let skymed = median(&clip.kept);
    let skystd = std(&clip.kept);
    debug!(
        "Sky box {:?}: {} of {} pixels kept, median {:.3}, std {:.3}",
        region,
        clip.kept.len(),
        pixels.len(),
        skymed,
        skystd
    );
    SkyEstimate {
        image: Plane::filled(img.width(), img.height(), skymed),
        median: skymed,
        std: skystd,
    }
}

// ── Spline sky ─────────────────────────────────────────────────────────────

/// A smooth sky model sampled on a grid of nodes in CCD pixel coordinates.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct SplineSky {
    /// Node x positions, increasing.
    pub xgrid: Vec<f64>,
    /// Node y positions, increasing.
    pub ygrid: Vec<f64>,
    /// Row-major node values, `ygrid.len() × xgrid.len()`.
    pub gridvals: Vec<f64>,
}

impl SplineSky {
    /// A flat sky at `level`.
    pub fn constant(level: f64, width: usize, height: usize) -> Self {
        Self {
            xgrid: vec![0.0, width.max(1) as f64 - 1.0],
            ygrid: vec![0.0, height.max(1) as f64 - 1.0],
            gridvals: vec![level; 4],
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.xgrid.is_empty()
            && !self.ygrid.is_empty()
            && self.gridvals.len() == self.xgrid.len() * self.ygrid.len()
    }

    /// Value at `(x, y)`, bilinear between nodes and clamped outside the grid.
    pub fn evaluate(&self, x: f64, y: f64) -> f64 {
        let (ix, fx) = bracket(&self.xgrid, x);
        let (iy, fy) = bracket(&self.ygrid, y);
        let nx = self.xgrid.len();
        let at = |i: usize, j: usize| self.gridvals[j * nx + i];
        let ix1 = (ix + 1).min(nx - 1);
        let iy1 = (iy + 1).min(self.ygrid.len() - 1);
        let top = at(ix, iy) * (1.0 - fx) + at(ix1, iy) * fx;
        let bot = at(ix, iy1) * (1.0 - fx) + at(ix1, iy1) * fx;
        top * (1.0 - fy) + bot * fy
    }

    /// Render over the pixels of `region` (zero-indexed CCD coordinates).
    pub fn render(&self, region: Region) -> Plane<f64> {
        let mut out = Plane::filled(region.width(), region.height(), 0.0);
        for y in 0..region.height() {
            for x in 0..region.width() {
                let v = self.evaluate((region.x0 + x) as f64, (region.y0 + y) as f64);
                out.set(x, y, v);
            }
        }
        out
    }
}

/// Index of the grid cell containing `v` and the fractional position inside it.
fn bracket(grid: &[f64], v: f64) -> (usize, f64) {
    let n = grid.len();
    if n == 1 || v <= grid[0] {
        return (0, 0.0);
    }
    if v >= grid[n - 1] {
        return (n - 1, 0.0);
    }
    let i = grid.partition_point(|&g| g <= v) - 1;
    let span = grid[i + 1] - grid[i];
    let f = if span > 0.0 { (v - grid[i]) / span } else { 0.0 };
    (i, f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_sky_ignores_stars() {
        let mut img = Plane::filled(100, 100, 0.0);
        for y in 0..100 {
            for x in 0..100 {
                // +-1 checkerboard around 50
                let v = 50.0 + if (x + y) % 2 == 0 { 1.0 } else { -1.0 };
                img.set(x, y, v);
            }
        }
        // a bright star inside the box
        for y in 40..44 {
            for x in 40..44 {
                img.set(x, y, 5000.0);
            }
        }
        let est = estimate_sky(
            &img,
            Region {
                x0: 20,
                x1: 80,
                y0: 20,
                y1: 80,
            },
            &SkyConfig { nsigma: 3.0 },
        );
        assert!((est.median - 50.0).abs() < 1e-9, "median {}", est.median);
        assert!((est.std - 1.0).abs() < 1e-9, "std {}", est.std);
        assert_eq!(est.image.get(0, 0), est.median);
    }

    #[test]
    fn test_box_clamped_to_image() {
        let img = Plane::filled(50, 60, 7.0);
        let est = estimate_sky(&img, Region { x0: 10, x1: 1500, y0: 10, y1: 2500 }, &SkyConfig::default());
        assert_eq!(est.median, 7.0);
        assert_eq!(est.std, 0.0);
    }

    #[test]
    fn test_spline_sky_bilinear() {
        let sky = SplineSky {
            xgrid: vec![0.0, 100.0],
            ygrid: vec![0.0, 100.0],
            gridvals: vec![0.0, 10.0, 20.0, 30.0],
        };
        assert!(sky.is_valid());
        assert!((sky.evaluate(50.0, 50.0) - 15.0).abs() < 1e-12);
        assert!((sky.evaluate(-10.0, 0.0) - 0.0).abs() < 1e-12);
        assert!((sky.evaluate(200.0, 200.0) - 30.0).abs() < 1e-12);
        let img = sky.render(Region {
            x0: 10,
            x1: 12,
            y0: 0,
            y1: 1,
        });
        assert!((img.get(1, 0) - 1.1).abs() < 1e-12);
    }
}
