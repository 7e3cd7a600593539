use crate::client::constants::*;
use crate::client::measurement::Sample;
use hdrhistogram::Histogram;
use tracing::{debug, warn};

/// RTT percentiles taken from an HDR histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Percentiles {
    pub p50: u64,
    pub p90: u64,
    pub p99: u64,
}

/// Aggregate over the received RTTs of a run. Only exists when at least one
/// probe was received.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RttSummary {
    pub min_us: u64,
    pub max_us: u64,
    pub mean_us: f64,
    /// Population standard deviation.
    pub stddev_us: f64,
    pub percentiles: Option<Percentiles>,
}

/// Statistics for one completed (or interrupted) client run.
///
/// RTT-derived values are `None` when nothing was received; jitter is `None`
/// when no two consecutive probes were both received.
#[derive(Debug, Clone, PartialEq)]
pub struct Statistics {
    pub sent: usize,
    pub received: usize,
    pub lost: usize,
    pub rtt: Option<RttSummary>,
    pub mean_jitter_us: Option<f64>,
}

impl Statistics {
    /// Computes statistics from the ordered sample sequence, consuming it.
    pub fn from_samples(samples: Vec<Sample>) -> Self {
        debug!(
            sample_count = samples.len(),
            "Computing statistics from samples"
        );

        let rtts: Vec<u64> = samples.iter().filter_map(|s| s.rtt_us).collect();
        let sent = samples.len();
        let received = rtts.len();

        let stats = Self {
            sent,
            received,
            lost: sent - received,
            rtt: summarize(&rtts),
            mean_jitter_us: mean_jitter(&samples),
        };

        debug!(
            sent = stats.sent,
            received = stats.received,
            lost = stats.lost,
            mean_us = stats.mean_rtt_us(),
            jitter_us = stats.mean_jitter_us,
            "Statistics calculated successfully"
        );
        stats
    }

    pub fn min_rtt_us(&self) -> Option<u64> {
        self.rtt.map(|r| r.min_us)
    }

    pub fn max_rtt_us(&self) -> Option<u64> {
        self.rtt.map(|r| r.max_us)
    }

    pub fn mean_rtt_us(&self) -> Option<f64> {
        self.rtt.map(|r| r.mean_us)
    }

    pub fn stddev_rtt_us(&self) -> Option<f64> {
        self.rtt.map(|r| r.stddev_us)
    }

    /// Lost probes as a percentage of sent probes; 0 for an empty run.
    pub fn loss_percent(&self) -> f64 {
        if self.sent == 0 {
            0.0
        } else {
            self.lost as f64 / self.sent as f64 * 100.0
        }
    }
}

fn summarize(rtts: &[u64]) -> Option<RttSummary> {
    let (&first, rest) = rtts.split_first()?;
    let (min_us, max_us) = rest
        .iter()
        .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    let n = rtts.len() as f64;
    let mean_us = rtts.iter().map(|&v| v as f64).sum::<f64>() / n;
    let variance = rtts
        .iter()
        .map(|&v| {
            let d = v as f64 - mean_us;
            d * d
        })
        .sum::<f64>()
        / n;

    Some(RttSummary {
        min_us,
        max_us,
        mean_us,
        stddev_us: variance.sqrt(),
        percentiles: percentiles(rtts),
    })
}

/// Mean absolute RTT difference over adjacent pairs where both probes were
/// received. A lost probe breaks adjacency; it never counts as a zero delta.
fn mean_jitter(samples: &[Sample]) -> Option<f64> {
    let (total, pairs) = samples
        .windows(2)
        .filter_map(|w| match (w[0].rtt_us, w[1].rtt_us) {
            (Some(a), Some(b)) => Some(a.abs_diff(b)),
            _ => None,
        })
        .fold((0u128, 0usize), |(sum, n), d| (sum + d as u128, n + 1));

    if pairs == 0 {
        None
    } else {
        Some(total as f64 / pairs as f64)
    }
}

fn percentiles(rtts: &[u64]) -> Option<Percentiles> {
    let mut hist = match Histogram::<u64>::new_with_bounds(
        HISTOGRAM_LOW_BOUND_US,
        HISTOGRAM_HIGH_BOUND_US,
        HISTOGRAM_SIGNIFICANT_DIGITS,
    ) {
        Ok(hist) => hist,
        Err(e) => {
            warn!(error = %e, "Failed to create histogram, percentiles unavailable");
            return None;
        }
    };

    for &rtt in rtts {
        hist.saturating_record(rtt);
    }

    Some(Percentiles {
        p50: hist.value_at_quantile(0.50),
        p90: hist.value_at_quantile(0.90),
        p99: hist.value_at_quantile(0.99),
    })
}
