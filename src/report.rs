//! Per-exposure audit of skipped CCDs and rejected stars.

use std::collections::BTreeMap;
use std::fmt;

use crate::photometry::RejectionCounts;

/// Why a CCD produced no zeropoint. The `Display` text is the `err_message`
/// written to the CCD table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SkipReason {
    WcsFailed,
    ZeroExptime,
    AllWeightsZero { ccdname: String },
    WeightsZeroOrOne,
    BadPsf,
    NoPhotometry,
}

impl SkipReason {
    /// Grouping key for the audit counts; drops the CCD name.
    pub fn kind(&self) -> &'static str {
        match self {
            SkipReason::WcsFailed => "WCS Failed",
            SkipReason::ZeroExptime => "Exptime = 0",
            SkipReason::AllWeightsZero { .. } => "All weight-map pixels are zero",
            SkipReason::WeightsZeroOrOne => "All weight-map pixels are zero or one",
            SkipReason::BadPsf => "Bad PSF model",
            SkipReason::NoPhotometry => "No photometry available",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AllWeightsZero { ccdname } => {
                write!(f, "All weight-map pixels are zero on CCD {}", ccdname)
            }
            other => f.write_str(other.kind()),
        }
    }
}

/// Skip and rejection counts for one or more exposures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkipReport {
    pub nccds: usize,
    pub skipped: BTreeMap<&'static str, usize>,
    pub rejections: RejectionCounts,
    pub nfits: usize,
}

impl SkipReport {
    pub fn record_skip(&mut self, reason: &SkipReason) {
        *self.skipped.entry(reason.kind()).or_insert(0) += 1;
    }

    pub fn nskipped(&self) -> usize {
        self.skipped.values().sum()
    }

    pub fn merge(&mut self, other: &SkipReport) {
        self.nccds += other.nccds;
        for (k, v) in &other.skipped {
            *self.skipped.entry(k).or_insert(0) += v;
        }
        self.rejections.merge(&other.rejections);
        self.nfits += other.nfits;
    }
}

impl fmt::Display for SkipReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} CCDs measured, {} skipped", self.nccds - self.nskipped(), self.nskipped())?;
        for (reason, n) in &self.skipped {
            writeln!(f, "  {:>5}  {}", n, reason)?;
        }
        writeln!(f, "{} stars fit, {} rejected", self.nfits, self.rejections.total())?;
        writeln!(f, "  {:>5}  off image", self.rejections.off_image)?;
        writeln!(f, "  {:>5}  zero ivar", self.rejections.zero_ivar)?;
        write!(f, "  {:>5}  no variance estimate", self.rejections.no_variance)
    }
}
