use crate::client::constants::*;
use crate::client::error::{ClientError, Result};
use crate::client::measurement::Sample;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};

/// Progress bar with running RTT figures, drawn on stderr.
pub struct ProgressTracker {
    pb: ProgressBar,
    last_update: Instant,
    received: u64,
    lost: u64,
    rtt_sum_us: u128,
    last_rtt_us: Option<u64>,
}

impl ProgressTracker {
    /// Create a visible progress tracker for `probe_count` probes.
    pub fn new(probe_count: usize) -> Result<Self> {
        let pb = ProgressBar::new(probe_count as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "{msg}\n{bar:40.cyan/blue} {pos:>7}/{len:7} [{elapsed_precise}]",
            )
            .map_err(|e| {
                ClientError::Measurement(format!("Failed to create progress style: {}", e))
            })?
            .progress_chars("█░"),
        );
        pb.enable_steady_tick(Duration::from_millis(PROGRESS_TICK_INTERVAL_MS));
        Ok(Self::with_bar(pb))
    }

    /// Tracker that draws nothing, for `--quiet` and tests.
    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden())
    }

    fn with_bar(pb: ProgressBar) -> Self {
        Self {
            pb,
            last_update: Instant::now(),
            received: 0,
            lost: 0,
            rtt_sum_us: 0,
            last_rtt_us: None,
        }
    }

    /// Account for one resolved probe.
    pub fn record(&mut self, sample: &Sample) {
        match sample.rtt_us {
            Some(rtt) => {
                self.received += 1;
                self.rtt_sum_us += rtt as u128;
                self.last_rtt_us = Some(rtt);
            }
            None => self.lost += 1,
        }
        self.pb.inc(1);

        if self.last_update.elapsed() >= Duration::from_millis(LIVE_STATS_UPDATE_INTERVAL_MS) {
            self.refresh();
        }
    }

    fn refresh(&mut self) {
        self.pb.set_message(self.live_message());
        self.last_update = Instant::now();
    }

    fn live_message(&self) -> String {
        let last = match self.last_rtt_us {
            Some(rtt) => colorize_rtt(rtt as f64),
            None => "-".normal().to_string(),
        };
        let mean = if self.received > 0 {
            colorize_rtt(self.rtt_sum_us as f64 / self.received as f64)
        } else {
            "-".normal().to_string()
        };
        let lost = if self.lost > 0 {
            self.lost.to_string().red().to_string()
        } else {
            self.lost.to_string().green().to_string()
        };

        format!("→ {} µs   Mean: {} µs   Lost: {}", last, mean, lost)
    }

    /// Final refresh, leaving the bar on screen.
    pub fn finish(&mut self) {
        self.refresh();
        self.pb.finish();
    }

    /// Stop drawing after an error or interrupt.
    pub fn abandon(&mut self) {
        self.refresh();
        self.pb.abandon();
    }
}

fn colorize_rtt(rtt_us: f64) -> String {
    let text = format!("{:.1}", rtt_us);
    if rtt_us < FAST_RTT_US {
        text.green().to_string()
    } else if rtt_us < SLOW_RTT_US {
        text.yellow().to_string()
    } else {
        text.red().to_string()
    }
}
