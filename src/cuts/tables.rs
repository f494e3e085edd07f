//! Calibration constants for zeropoint detrending and the DECam CCD map.
//!
//! Knot segments are `[day_i, day_f, zpt_i, zpt_f, c0, c1]` with days counted
//! from [`MJD0`]. `c1` is recomputed from the endpoints when applied; the
//! stored value is kept for reference.

/// Day zero of the MJD trend tables.
pub const MJD0: f64 = 56658.5;

pub type Segment = [f64; 6];

/// Piecewise-linear zeropoint trend with time for one band.
#[derive(Debug, Clone, Copy)]
pub struct BandTrend {
    pub band: &'static str,
    pub zpt0: f64,
    pub segments: &'static [Segment],
}

/// Airmass and time trends for one camera family.
#[derive(Debug, Clone, Copy)]
pub struct DetrendTable {
    /// Extinction coefficient per band.
    pub airmass_terms: &'static [(&'static str, f64)],
    pub mjd_terms: &'static [BandTrend],
}

pub const DECAM_DETREND: DetrendTable = DetrendTable {
    airmass_terms: &[("g", 0.173), ("r", 0.090), ("i", 0.054), ("z", 0.060), ("Y", 0.058)],
    mjd_terms: &[
        BandTrend {
            band: "g",
            zpt0: 25.08,
            segments: &[
                [0.0, 160.0, 25.170, 25.130, 25.170, -2.5001e-04],
                [160.0, 480.0, 25.180, 25.080, 25.230, -3.1250e-04],
                [480.0, 810.0, 25.080, 25.080, 25.080, 0.0000e+00],
                [810.0, 950.0, 25.130, 25.130, 25.130, 0.0000e+00],
                [950.0, 1250.0, 25.130, 25.040, 25.415, -2.9999e-04],
                [1250.0, 1650.0, 25.080, 25.000, 25.330, -2.0000e-04],
                [1650.0, 1900.0, 25.270, 25.210, 25.666, -2.4001e-04],
            ],
        },
        BandTrend {
            band: "r",
            zpt0: 25.29,
            segments: &[
                [0.0, 160.0, 25.340, 25.340, 25.340, 0.0000e+00],
                [160.0, 480.0, 25.370, 25.300, 25.405, -2.1876e-04],
                [480.0, 810.0, 25.300, 25.280, 25.329, -6.0602e-05],
                [810.0, 950.0, 25.350, 25.350, 25.350, 0.0000e+00],
                [950.0, 1250.0, 25.350, 25.260, 25.635, -3.0000e-04],
                [1250.0, 1650.0, 25.320, 25.240, 25.570, -2.0000e-04],
                [1650.0, 1900.0, 25.440, 25.380, 25.836, -2.4001e-04],
            ],
        },
        BandTrend {
            band: "i",
            zpt0: 25.26,
            segments: &[],
        },
        BandTrend {
            band: "z",
            zpt0: 24.92,
            segments: &[
                [0.0, 160.0, 24.970, 24.970, 24.970, 0.0000e+00],
                [160.0, 480.0, 25.030, 24.950, 25.070, -2.5000e-04],
                [480.0, 760.0, 24.970, 24.900, 25.090, -2.5000e-04],
                [760.0, 950.0, 24.900, 25.030, 24.380, 6.8422e-04],
                [950.0, 1150.0, 25.030, 24.880, 25.743, -7.5001e-04],
                [1150.0, 1270.0, 24.880, 25.030, 23.442, 1.2500e-03],
                [1270.0, 1650.0, 25.030, 24.890, 25.498, -3.6842e-04],
                [1650.0, 1900.0, 25.070, 24.940, 25.928, -5.2000e-04],
            ],
        },
        BandTrend {
            band: "Y",
            zpt0: 23.87,
            segments: &[],
        },
    ],
};

/// Shared by Mosaic3 (MzLS) and 90Prime (BASS).
pub const MZLS_BASS_DETREND: DetrendTable = DetrendTable {
    airmass_terms: &[("g", 0.291), ("r", 0.176), ("z", 0.165)],
    mjd_terms: &[
        BandTrend {
            band: "g",
            zpt0: 25.74,
            segments: &[
                [0.0, 720.0, 25.900, 25.900, 25.900, 0.0000e+00],
                [720.0, 810.0, 25.900, 25.750, 27.100, -1.6667e-03],
                [810.0, 900.0, 25.880, 25.780, 26.780, -1.1111e-03],
                [900.0, 950.0, 25.780, 25.920, 23.260, 2.8000e-03],
                [950.0, 1100.0, 25.950, 25.950, 25.950, 0.0000e+00],
                [1100.0, 1255.0, 25.950, 25.750, 27.369, -1.2903e-03],
                [1255.0, 1280.0, 25.850, 25.400, 48.440, -1.8000e-02],
                [1280.0, 1500.0, 25.880, 25.800, 26.345, -3.6364e-04],
                [1500.0, 1520.0, 25.800, 25.880, 19.800, 4.0000e-03],
                [1520.0, 1550.0, 25.750, 25.900, 18.150, 5.0000e-03],
                [1550.0, 1580.0, 25.700, 25.850, 17.950, 5.0000e-03],
                [1580.0, 1600.0, 25.850, 25.800, 29.800, -2.5001e-03],
                [1600.0, 1615.0, 25.800, 25.800, 25.800, 0.0000e+00],
                [1615.0, 1621.0, 25.800, 25.700, 52.716, -1.6666e-02],
                [1621.0, 1626.0, 25.700, 25.850, -22.930, 3.0000e-02],
                [1626.0, 1645.0, 25.830, 25.790, 29.253, -2.1052e-03],
                [1645.0, 1658.0, 25.800, 25.600, 51.108, -1.5385e-02],
                [1658.0, 1668.0, 25.600, 25.850, -15.850, 2.5000e-02],
            ],
        },
        BandTrend {
            band: "r",
            zpt0: 25.52,
            segments: &[
                [0.0, 720.0, 25.600, 25.600, 25.600, 0.0000e+00],
                [720.0, 815.0, 25.600, 25.500, 26.358, -1.0526e-03],
                [815.0, 882.0, 25.600, 25.600, 25.600, 0.0000e+00],
                [882.0, 930.0, 25.450, 25.600, 22.694, 3.1250e-03],
                [930.0, 1100.0, 25.680, 25.680, 25.680, 0.0000e+00],
                [1100.0, 1220.0, 25.600, 25.540, 26.150, -5.0000e-04],
                [1220.0, 1280.0, 25.550, 25.380, 29.007, -2.8333e-03],
                [1280.0, 1420.0, 25.500, 25.500, 25.500, 0.0000e+00],
                [1420.0, 1450.0, 25.650, 25.700, 23.283, 1.6667e-03],
                [1450.0, 1550.0, 25.550, 25.550, 25.550, 0.0000e+00],
                [1550.0, 1610.0, 25.500, 25.600, 22.917, 1.6667e-03],
                [1610.0, 1635.0, 25.450, 25.600, 15.790, 6.0000e-03],
                [1635.0, 1670.0, 25.550, 25.400, 32.557, -4.2857e-03],
            ],
        },
        BandTrend {
            band: "z",
            zpt0: 26.20,
            segments: &[
                [0.0, 720.0, 26.200, 26.200, 26.200, 0.0000e+00],
                [720.0, 920.0, 26.550, 26.050, 28.350, -2.5000e-03],
                [920.0, 1030.0, 26.150, 26.150, 26.150, 0.0000e+00],
                [1030.0, 1070.0, 26.500, 26.500, 26.500, 0.0000e+00],
                [1070.0, 1115.0, 26.500, 26.350, 30.067, -3.3333e-03],
                [1115.0, 1300.0, 26.470, 26.330, 27.314, -7.5675e-04],
                [1300.0, 1355.0, 26.250, 26.200, 27.432, -9.0908e-04],
                [1355.0, 1500.0, 26.350, 26.350, 26.350, 0.0000e+00],
            ],
        },
    ],
};

/// DECam CCD number for an extension name such as `S7` or `N31`.
pub fn decam_ccdnum(name: &str) -> Option<i64> {
    let name = name.trim();
    let (half, num) = name.split_at_checked(1)?;
    let n: i64 = num.parse().ok()?;
    if !(1..=31).contains(&n) {
        return None;
    }
    match half {
        "N" => Some(31 + n),
        "S" => Some(match n {
            1..=7 => 24 + n,
            8..=13 => 11 + n,
            14..=19 => n - 1,
            20..=24 => n - 12,
            25..=28 => n - 21,
            _ => n - 28,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decam_ccdnum() {
        let cases = [
            ("S1", 25),
            ("S7", 31),
            ("S8", 19),
            ("S13", 24),
            ("S14", 13),
            ("S19", 18),
            ("S20", 8),
            ("S24", 12),
            ("S25", 4),
            ("S28", 7),
            ("S29", 1),
            ("S31", 3),
            ("N1", 32),
            ("N31", 62),
        ];
        for (name, num) in cases {
            assert_eq!(decam_ccdnum(name), Some(num), "{}", name);
        }
        assert_eq!(decam_ccdnum("N32"), None);
        assert_eq!(decam_ccdnum("CCD1"), None);
        assert_eq!(decam_ccdnum(""), None);
    }

    #[test]
    fn test_segments_are_ordered() {
        for table in [DECAM_DETREND, MZLS_BASS_DETREND] {
            for trend in table.mjd_terms {
                for w in trend.segments.windows(2) {
                    assert_eq!(w[0][1], w[1][0], "gap in {} trend", trend.band);
                }
                for s in trend.segments {
                    assert!(s[1] > s[0], "empty segment in {} trend", trend.band);
                }
            }
        }
    }
}
