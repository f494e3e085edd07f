//! Supported cameras and their fixed calibration constants.

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};

use crate::plane::Region;

/// Imaging cameras with a measurement implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Camera {
    /// Dark Energy Camera on the Blanco 4m (CTIO).
    Decam,
    /// Mosaic3 on the Mayall 4m (KPNO), the MzLS survey camera.
    Mosaic,
    /// 90Prime on the Bok 2.3m, the BASS survey camera.
    NinetyPrime,
    /// MegaPrime on CFHT.
    MegaPrime,
}

impl Camera {
    pub const ALL: [Camera; 4] = [Camera::Decam, Camera::Mosaic, Camera::NinetyPrime, Camera::MegaPrime];

    /// Lower-case name used in tables and file names.
    pub fn name(self) -> &'static str {
        match self {
            Camera::Decam => "decam",
            Camera::Mosaic => "mosaic",
            Camera::NinetyPrime => "90prime",
            Camera::MegaPrime => "megaprime",
        }
    }

    /// Nominal pixel scale in arcsec/pixel. Assumed constant across the focal plane.
    pub fn pixscale(self) -> f64 {
        match self {
            Camera::Decam | Camera::Mosaic => 0.262,
            Camera::NinetyPrime => 0.455,
            Camera::MegaPrime => 0.185,
        }
    }

    /// Nominal zeropoint (magnitude of 1 e-/s) per band.
    pub fn zeropoint0(self, band: &str) -> Result<f64> {
        let zp = match (self, band) {
            (Camera::Decam, "g") => 26.610,
            (Camera::Decam, "r") => 26.818,
            (Camera::Decam, "z") => 26.484,
            (Camera::Decam, "i") => 26.758,
            (Camera::Decam, "Y") => 25.321,
            (Camera::Mosaic, "z") => 26.552,
            (Camera::Mosaic, "D51") => 24.351,
            (Camera::NinetyPrime, "g") => 26.93,
            (Camera::NinetyPrime, "r") => 27.01,
            (Camera::NinetyPrime, "z") => 26.552,
            (Camera::MegaPrime, "g") | (Camera::MegaPrime, "u") => 26.610,
            (Camera::MegaPrime, "r") => 26.818,
            (Camera::MegaPrime, "z") => 26.484,
            _ => bail!("No nominal zeropoint for band {:?} on camera {}", band, self),
        };
        Ok(zp)
    }

    /// Atmospheric extinction coefficient (mag per airmass) per band.
    pub fn extinction(self, band: &str) -> Result<f64> {
        let k = match (self, band) {
            (Camera::Decam, "g") | (Camera::NinetyPrime, "g") | (Camera::MegaPrime, "g") => 0.17,
            (Camera::Decam, "r") | (Camera::NinetyPrime, "r") | (Camera::MegaPrime, "r") => 0.10,
            (Camera::Decam, "i") => 0.08,
            (Camera::Decam, "z") | (Camera::Decam, "Y") => 0.06,
            (Camera::Mosaic, "z") | (Camera::NinetyPrime, "z") | (Camera::MegaPrime, "z") => 0.06,
            (Camera::Mosaic, "D51") => 0.211,
            (Camera::MegaPrime, "u") => 0.24,
            _ => bail!("No extinction coefficient for band {:?} on camera {}", band, self),
        };
        Ok(k)
    }

    /// Central detector box used for the sky estimate.
    pub fn sky_box(self) -> Region {
        match self {
            Camera::Decam | Camera::MegaPrime => Region {
                x0: 500,
                x1: 1500,
                y0: 1500,
                y1: 2500,
            },
            Camera::Mosaic | Camera::NinetyPrime => Region {
                x0: 500,
                x1: 1500,
                y0: 500,
                y1: 1500,
            },
        }
    }

    /// Observatory location, where airmass can be recomputed.
    pub fn site(self) -> Option<Site> {
        match self {
            Camera::Decam => Some(Site::CTIO),
            Camera::Mosaic => Some(Site::KPNO),
            _ => None,
        }
    }
}

impl fmt::Display for Camera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Camera {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "decam" => Ok(Camera::Decam),
            "mosaic" | "mosaic3" => Ok(Camera::Mosaic),
            "90prime" => Ok(Camera::NinetyPrime),
            "megaprime" => Ok(Camera::MegaPrime),
            other => bail!("Unknown camera {:?}", other),
        }
    }
}

/// Reference-star magnitude window `(lo, hi)` used for the photometric zeropoint.
/// Bands without a window get no zeropoint.
pub fn mag_limits(band: &str) -> Option<(f64, f64)> {
    match band {
        "g" => Some((16.0, 20.0)),
        "r" => Some((16.0, 19.5)),
        "z" => Some((16.5, 19.0)),
        _ => None,
    }
}

// ── Observatory sites ──────────────────────────────────────────────────────

/// An observatory position in Earth-centered, Earth-fixed coordinates (meters).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Site {
    pub ecef: [f64; 3],
}

impl Site {
    pub const CTIO: Site = Site {
        ecef: [1814304.0, -5214366.0, -3187341.0],
    };
    pub const KPNO: Site = Site {
        ecef: [-1994503.0, -5037539.0, 3358105.0],
    };

    /// Geodetic `(latitude, east longitude)` in degrees on the WGS84 ellipsoid.
    pub fn geodetic(&self) -> (f64, f64) {
        const A: f64 = 6378137.0;
        const F: f64 = 1.0 / 298.257223563;
        let e2 = F * (2.0 - F);
        let [x, y, z] = self.ecef;
        let lon = y.atan2(x);
        let p = (x * x + y * y).sqrt();
        let mut lat = z.atan2(p * (1.0 - e2));
        for _ in 0..10 {
            let s = lat.sin();
            let n = A / (1.0 - e2 * s * s).sqrt();
            let h = p / lat.cos() - n;
            lat = z.atan2(p * (1.0 - e2 * n / (n + h)));
        }
        (lat.to_degrees(), lon.to_degrees())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_camera() {
        assert_eq!("decam".parse::<Camera>().unwrap(), Camera::Decam);
        assert_eq!("90prime".parse::<Camera>().unwrap(), Camera::NinetyPrime);
        assert_eq!(" Mosaic ".parse::<Camera>().unwrap(), Camera::Mosaic);
        assert!("hsc".parse::<Camera>().is_err());
        for cam in Camera::ALL {
            assert_eq!(cam.name().parse::<Camera>().unwrap(), cam);
        }
    }

    #[test]
    fn test_nominal_tables() {
        assert_eq!(Camera::Decam.zeropoint0("g").unwrap(), 26.610);
        assert_eq!(Camera::Decam.extinction("g").unwrap(), 0.17);
        assert_eq!(Camera::Mosaic.extinction("D51").unwrap(), 0.211);
        assert!(Camera::Mosaic.zeropoint0("g").is_err());
    }

    #[test]
    fn test_site_latitudes() {
        let (lat, lon) = Site::CTIO.geodetic();
        assert!((lat + 30.17).abs() < 0.02, "CTIO lat {}", lat);
        assert!((lon + 70.81).abs() < 0.02, "CTIO lon {}", lon);
        let (lat, lon) = Site::KPNO.geodetic();
        assert!((lat - 31.96).abs() < 0.02, "KPNO lat {}", lat);
        assert!((lon + 111.60).abs() < 0.02, "KPNO lon {}", lon);
    }
}
