//! Client role: drive the probe loop, then summarise and report.

pub mod constants;
pub mod error;
pub mod export;
pub mod measurement;
pub mod progress;
pub mod reporter;
pub mod statistics;

pub use error::{ClientError, Result};
pub use measurement::{
    measure_single_probe, measurement_phase, warmup_phase, LossReason, MeasurementPlan,
    MeasurementResult, ProbeOutcome, Sample, WarmupSummary,
};
pub use progress::ProgressTracker;
pub use reporter::Reporter;
pub use statistics::{Percentiles, RttSummary, Statistics};

use crate::clock::{Clock, MonotonicClock};
use crate::config::{RunConfig, TransportKind};
use crate::shutdown::Shutdown;
use crate::transport::{ProbeSocket, TcpProbeSocket, UdpProbeSocket};
use std::time::Duration;
use tracing::{error, info};

/// Everything the reporter needs about a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub transport: TransportKind,
    pub target: String,
    pub payload_length: usize,
    pub statistics: Statistics,
    pub elapsed: Duration,
    pub interrupted: bool,
    /// Set when the `-o` export could not be written.
    pub export_error: Option<String>,
}

/// Connect with the configured transport and run a full measurement.
pub fn run_client(config: &RunConfig, shutdown: &Shutdown) -> Result<RunReport> {
    let addr = config.address();
    let clock = MonotonicClock::new();

    match config.transport {
        TransportKind::Tcp => {
            let mut socket =
                TcpProbeSocket::connect(&addr, config.payload_length, shutdown.clone())?;
            info!(peer = %socket.peer_addr(), "Connected over TCP");
            run_with_socket(&mut socket, &clock, config, shutdown)
        }
        TransportKind::Udp => {
            let mut socket =
                UdpProbeSocket::connect(&addr, config.reply_timeout, shutdown.clone())?;
            info!(server = %addr, "Probing over UDP");
            run_with_socket(&mut socket, &clock, config, shutdown)
        }
    }
}

/// Run warm-up and measurement over an already established socket.
///
/// The sample sequence is written to the CSV export if one is configured and
/// then handed by value to [`Statistics::from_samples`]. A failed export is
/// recorded on the report; the measured results are still returned.
pub fn run_with_socket<S, C>(
    socket: &mut S,
    clock: &C,
    config: &RunConfig,
    shutdown: &Shutdown,
) -> Result<RunReport>
where
    S: ProbeSocket + ?Sized,
    C: Clock + ?Sized,
{
    let plan = MeasurementPlan {
        probe_count: config.probe_count,
        payload_length: config.payload_length,
        interval: config.probe_interval,
    };

    let mut interrupted = false;
    if config.warmup > 0 {
        interrupted = warmup_phase(socket, clock, &plan, config.warmup, shutdown)?.interrupted;
    }

    let (samples, elapsed) = if interrupted {
        (Vec::new(), Duration::ZERO)
    } else {
        let mut progress = if config.quiet {
            ProgressTracker::hidden()
        } else {
            ProgressTracker::new(plan.probe_count)?
        };
        let result = measurement_phase(socket, clock, &plan, shutdown, &mut progress)?;
        interrupted = result.interrupted;
        (result.samples, result.elapsed)
    };

    let export_error = config.output.as_ref().and_then(|path| {
        export::export_csv(path, &samples).err().map(|e| {
            error!(path = %path.display(), error = %e, "Failed to write samples");
            format!("{}: {}", path.display(), e)
        })
    });

    Ok(RunReport {
        transport: config.transport,
        target: config.address(),
        payload_length: config.payload_length,
        statistics: Statistics::from_samples(samples),
        elapsed,
        interrupted,
        export_error,
    })
}
