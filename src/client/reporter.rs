use crate::client::statistics::Statistics;
use crate::client::RunReport;
use colored::*;
use std::fmt::Write as _;
use tracing::{debug, info, warn};

/// Reporter for printing measurement results
pub struct Reporter;

/// Rendered in place of any statistic that is undefined for the run.
pub const NO_DATA: &str = "no data";

// Loss percentage above which the loss line turns red
const HIGH_LOSS_PERCENT: f64 = 5.0;

// Percentage thresholds for formatting precision
const LOW_PERCENTAGE_THRESHOLD: f64 = 0.1;
const MEDIUM_PRECISION_THRESHOLD: f64 = 1.0;

impl Reporter {
    /// Formats a percentage value with appropriate precision based on magnitude.
    ///
    /// - < 0.1%: 3 decimal places (e.g., "0.003%")
    /// - < 1.0%: 2 decimal places (e.g., "0.34%")
    /// - >= 1.0%: 1 decimal place (e.g., "69.2%")
    fn format_percentage(percentage: f64) -> String {
        if percentage == 0.0 {
            "0%".to_string()
        } else if percentage < LOW_PERCENTAGE_THRESHOLD {
            format!("{:.3}%", percentage)
        } else if percentage < MEDIUM_PRECISION_THRESHOLD {
            format!("{:.2}%", percentage)
        } else {
            format!("{:.1}%", percentage)
        }
    }

    /// Formats a microsecond value right-aligned, or [`NO_DATA`] when undefined.
    fn format_us(value: Option<f64>) -> String {
        match value {
            Some(v) => format!("{:>10.1} µs", v),
            None => format!("{:>10}", NO_DATA).dimmed().to_string(),
        }
    }

    /// Render the complete results summary.
    pub fn render(&self, report: &RunReport) -> String {
        let stats = &report.statistics;
        let mut out = String::new();

        // Writing to a String cannot fail.
        let _ = self.render_into(&mut out, report, stats);
        out
    }

    fn render_into(
        &self,
        out: &mut String,
        report: &RunReport,
        stats: &Statistics,
    ) -> std::fmt::Result {
        writeln!(out, "\n{}", "┌─────────────────────────────┐".cyan())?;
        writeln!(out, "{}", "│  Latency & Jitter Results   │".cyan())?;
        writeln!(out, "{}", "└─────────────────────────────┘".cyan())?;
        writeln!(out)?;

        writeln!(
            out,
            "Target:   {} {} ({}-byte probes)",
            report.transport, report.target, report.payload_length
        )?;

        let loss_pct = stats.loss_percent();
        let loss = Self::format_percentage(loss_pct);
        let loss = if loss_pct > HIGH_LOSS_PERCENT {
            loss.red().bold().to_string()
        } else if stats.lost > 0 {
            loss.yellow().to_string()
        } else {
            loss.green().to_string()
        };
        writeln!(
            out,
            "Probes:   {} sent, {} received, {} lost ({})",
            stats.sent, stats.received, stats.lost, loss
        )?;
        writeln!(out, "Duration: {:.2}s", report.elapsed.as_secs_f64())?;

        if report.interrupted {
            writeln!(
                out,
                "          {}",
                format!(
                    "└─ Interrupted: statistics cover the first {} probes",
                    stats.sent
                )
                .yellow()
            )?;
        }
        writeln!(out)?;

        writeln!(out, "Round-trip time:")?;
        if stats.rtt.is_none() {
            writeln!(out, "  {}", "no data (no probe was echoed)".red())?;
        }
        writeln!(
            out,
            "  Min:      {}",
            Self::format_us(stats.min_rtt_us().map(|v| v as f64))
        )?;
        writeln!(out, "  Mean:     {}", Self::format_us(stats.mean_rtt_us()))?;
        writeln!(
            out,
            "  Max:      {}",
            Self::format_us(stats.max_rtt_us().map(|v| v as f64))
        )?;
        writeln!(out, "  Std dev:  {}", Self::format_us(stats.stddev_rtt_us()))?;

        if let Some(p) = stats.rtt.and_then(|r| r.percentiles) {
            writeln!(out, "  P50:      {}", Self::format_us(Some(p.p50 as f64)))?;
            writeln!(out, "  P90:      {}", Self::format_us(Some(p.p90 as f64)))?;
            writeln!(out, "  P99:      {}", Self::format_us(Some(p.p99 as f64)))?;
        }
        writeln!(out)?;

        writeln!(out, "Jitter (mean |ΔRTT| between consecutive replies):")?;
        writeln!(out, "  Mean:     {}", Self::format_us(stats.mean_jitter_us))?;
        if stats.mean_jitter_us.is_none() && stats.received > 0 {
            writeln!(
                out,
                "  {}",
                "└─ no two consecutive probes were both echoed".dimmed()
            )?;
        }

        if let Some(e) = &report.export_error {
            writeln!(out)?;
            writeln!(out, "{}", format!("Samples not written: {}", e).red())?;
        }

        Ok(())
    }

    /// Print the complete results summary to stdout
    pub fn print_results(&self, report: &RunReport) {
        let stats = &report.statistics;
        debug!(
            sent = stats.sent,
            received = stats.received,
            lost = stats.lost,
            "Printing measurement results"
        );

        if stats.received == 0 {
            warn!("No successful measurements recorded");
        }

        println!("{}", self.render(report));

        info!(
            mean_rtt_us = stats.mean_rtt_us(),
            jitter_us = stats.mean_jitter_us,
            loss_percent = stats.loss_percent(),
            "Results reported"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::measurement::Sample;
    use crate::config::TransportKind;
    use crate::protocol::SequenceNumber;
    use std::time::Duration;

    fn report(rtts: &[Option<u64>], interrupted: bool) -> RunReport {
        let samples = rtts
            .iter()
            .enumerate()
            .map(|(i, &rtt_us)| Sample {
                sequence: SequenceNumber(i as u64),
                rtt_us,
            })
            .collect();
        RunReport {
            transport: TransportKind::Udp,
            target: "127.0.0.1:8888".into(),
            payload_length: 64,
            statistics: Statistics::from_samples(samples),
            elapsed: Duration::from_millis(1500),
            interrupted,
            export_error: None,
        }
    }

    #[test]
    fn test_render_with_data() {
        let text = Reporter.render(&report(&[Some(100), Some(150), Some(120)], false));

        assert!(text.contains("3 sent, 3 received, 0 lost"));
        assert!(text.contains("100.0 µs"));
        assert!(text.contains("150.0 µs"));
        assert!(text.contains("40.0 µs"));
        assert!(!text.contains(NO_DATA));
        assert!(!text.contains("Interrupted"));
    }

    #[test]
    fn test_render_all_lost_shows_no_data() {
        let text = Reporter.render(&report(&[None, None], false));

        assert!(text.contains("2 sent, 0 received, 2 lost"));
        assert!(text.contains(NO_DATA));
        assert!(!text.contains("NaN"));
    }

    #[test]
    fn test_render_interrupted_run() {
        let text = Reporter.render(&report(&[Some(100)], true));
        assert!(text.contains("Interrupted"));
        assert!(text.contains("first 1 probes"));
    }

    #[test]
    fn test_render_alternating_loss_explains_missing_jitter() {
        let text = Reporter.render(&report(&[Some(100), None, Some(120), None], false));
        assert!(text.contains("no two consecutive probes"));
    }

    #[test]
    fn test_render_reports_failed_export() {
        let mut run = report(&[Some(100)], false);
        run.export_error = Some("/nonexistent-dir/out.csv: No such file or directory".into());
        let text = Reporter.render(&run);
        assert!(text.contains("Samples not written"));
        assert!(text.contains("1 sent, 1 received"));
    }

    #[test]
    fn test_print_results_does_not_panic() {
        Reporter.print_results(&report(&[], false));
    }

    #[test]
    fn test_format_percentage() {
        assert_eq!(Reporter::format_percentage(0.0), "0%");
        assert_eq!(Reporter::format_percentage(0.05), "0.050%");
        assert_eq!(Reporter::format_percentage(0.5), "0.50%");
        assert_eq!(Reporter::format_percentage(50.0), "50.0%");
    }
}
