use crate::client::constants::WARMUP_SEQUENCE_BASE;
use crate::client::error::{ClientError, Result};
use crate::client::progress::ProgressTracker;
use crate::clock::Clock;
use crate::protocol::{Probe, SequenceNumber};
use crate::shutdown::Shutdown;
use crate::transport::{ProbeSocket, Reply, POLL_INTERVAL};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// One client iteration: the RTT of a probe, or `None` if it was lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub sequence: SequenceNumber,
    pub rtt_us: Option<u64>,
}

impl Sample {
    pub fn received(sequence: SequenceNumber, rtt_us: u64) -> Self {
        Self {
            sequence,
            rtt_us: Some(rtt_us),
        }
    }

    pub fn lost(sequence: SequenceNumber) -> Self {
        Self {
            sequence,
            rtt_us: None,
        }
    }

    pub fn is_lost(&self) -> bool {
        self.rtt_us.is_none()
    }
}

/// Why a probe was counted as lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossReason {
    Timeout,
    Malformed,
    SequenceMismatch,
}

/// Resolution of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Received { rtt_us: u64 },
    Lost(LossReason),
    /// Shutdown was requested before the probe resolved.
    Interrupted,
}

/// Shape of the measurement loop.
#[derive(Debug, Clone, Copy)]
pub struct MeasurementPlan {
    pub probe_count: usize,
    pub payload_length: usize,
    pub interval: Duration,
}

/// Results from a complete (or interrupted) measurement phase.
#[derive(Debug, Clone)]
pub struct MeasurementResult {
    /// One entry per resolved probe, in sequence order starting at 0.
    pub samples: Vec<Sample>,
    pub elapsed: Duration,
    pub interrupted: bool,
}

/// Totals from the warm-up phase; these probes are never reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmupSummary {
    pub received: usize,
    pub lost: usize,
    pub interrupted: bool,
}

/// Send one probe and wait for its echo.
///
/// `frame` is scratch space of exactly the payload length. Timeouts,
/// malformed replies and stale replies are losses, not errors; only transport
/// failures are returned as `Err`.
pub fn measure_single_probe<S, C>(
    socket: &mut S,
    clock: &C,
    sequence: SequenceNumber,
    frame: &mut [u8],
) -> Result<ProbeOutcome>
where
    S: ProbeSocket + ?Sized,
    C: Clock + ?Sized,
{
    socket.discard_stale()?;
    Probe::new(sequence, frame.len()).encode_into(frame)?;

    let t_send = clock.now_micros();
    socket.send_probe(frame)?;

    let bytes = match socket.receive_probe()? {
        Reply::Data(bytes) => bytes,
        Reply::TimedOut => {
            debug!(sequence = sequence.0, "Probe timed out");
            return Ok(ProbeOutcome::Lost(LossReason::Timeout));
        }
        Reply::Interrupted => return Ok(ProbeOutcome::Interrupted),
    };
    let t_recv = clock.now_micros();

    let outcome = match Probe::decode(&bytes) {
        Ok(reply) if reply.sequence != sequence => {
            warn!(
                expected = sequence.0,
                received = reply.sequence.0,
                "Sequence mismatch"
            );
            ProbeOutcome::Lost(LossReason::SequenceMismatch)
        }
        Ok(reply) if reply.length != frame.len() => {
            warn!(
                expected = frame.len(),
                received = reply.length,
                "Reply length differs from probe length"
            );
            ProbeOutcome::Lost(LossReason::Malformed)
        }
        Ok(_) => {
            let rtt_us = t_recv.saturating_sub(t_send);
            debug!(sequence = sequence.0, rtt_us = rtt_us, "Probe echoed");
            ProbeOutcome::Received { rtt_us }
        }
        Err(e) => {
            warn!(sequence = sequence.0, error = %e, "Malformed reply");
            ProbeOutcome::Lost(LossReason::Malformed)
        }
    };
    Ok(outcome)
}

/// Perform warm-up probes to populate ARP/route caches before measuring.
///
/// Warm-up probes use sequence numbers counting down from the top of the
/// sequence space, so a late warm-up echo can never be mistaken for a
/// measured probe.
pub fn warmup_phase<S, C>(
    socket: &mut S,
    clock: &C,
    plan: &MeasurementPlan,
    warmup_count: usize,
    shutdown: &Shutdown,
) -> Result<WarmupSummary>
where
    S: ProbeSocket + ?Sized,
    C: Clock + ?Sized,
{
    let mut summary = WarmupSummary::default();
    let mut frame = vec![0u8; plan.payload_length];

    for i in 0..warmup_count {
        if shutdown.is_requested() {
            summary.interrupted = true;
            break;
        }

        let sequence = SequenceNumber(WARMUP_SEQUENCE_BASE - i as u64);
        match measure_single_probe(socket, clock, sequence, &mut frame) {
            Ok(ProbeOutcome::Received { .. }) => summary.received += 1,
            Ok(ProbeOutcome::Lost(reason)) => {
                summary.lost += 1;
                debug!(probe_num = i + 1, reason = ?reason, "Warmup probe lost");
            }
            Ok(ProbeOutcome::Interrupted) => {
                summary.interrupted = true;
                break;
            }
            Err(e) => {
                return Err(ClientError::Measurement(format!(
                    "Warmup phase interrupted after {} probes ({} successful, {} lost): {}",
                    summary.received + summary.lost,
                    summary.received,
                    summary.lost,
                    e
                )));
            }
        }

        if pause(plan.interval, shutdown) {
            summary.interrupted = true;
            break;
        }
    }

    info!(
        received = summary.received,
        lost = summary.lost,
        "Warmup complete"
    );
    Ok(summary)
}

/// Run the measurement loop and collect one sample per resolved probe.
///
/// Probes are strictly one at a time. On shutdown the loop stops and the
/// samples collected so far are returned with `interrupted` set; the probe in
/// flight at that moment is not recorded.
pub fn measurement_phase<S, C>(
    socket: &mut S,
    clock: &C,
    plan: &MeasurementPlan,
    shutdown: &Shutdown,
    progress: &mut ProgressTracker,
) -> Result<MeasurementResult>
where
    S: ProbeSocket + ?Sized,
    C: Clock + ?Sized,
{
    let mut samples = Vec::with_capacity(plan.probe_count);
    let mut frame = vec![0u8; plan.payload_length];
    let mut interrupted = false;
    let start_time = Instant::now();

    for i in 0..plan.probe_count {
        if shutdown.is_requested() {
            interrupted = true;
            break;
        }

        let sequence = SequenceNumber(i as u64);
        let sample = match measure_single_probe(socket, clock, sequence, &mut frame) {
            Ok(ProbeOutcome::Received { rtt_us }) => Sample::received(sequence, rtt_us),
            Ok(ProbeOutcome::Lost(reason)) => {
                debug!(probe_num = i + 1, reason = ?reason, "Probe lost");
                Sample::lost(sequence)
            }
            Ok(ProbeOutcome::Interrupted) => {
                interrupted = true;
                break;
            }
            Err(e) => {
                progress.abandon();
                let lost = samples.iter().filter(|s: &&Sample| s.is_lost()).count();
                return Err(ClientError::Measurement(format!(
                    "Measurement phase interrupted after {} probes ({} successful, {} lost): {}",
                    samples.len(),
                    samples.len() - lost,
                    lost,
                    e
                )));
            }
        };

        samples.push(sample);
        progress.record(&sample);

        if i + 1 < plan.probe_count && pause(plan.interval, shutdown) {
            interrupted = true;
            break;
        }
    }

    if interrupted {
        warn!(collected = samples.len(), "Measurement interrupted");
        progress.abandon();
    } else {
        progress.finish();
    }

    debug!(
        probes_resolved = samples.len(),
        interrupted = interrupted,
        "Measurement phase completed"
    );

    Ok(MeasurementResult {
        samples,
        elapsed: start_time.elapsed(),
        interrupted,
    })
}

/// Sleeps for `interval`, waking early on shutdown. Returns true if interrupted.
fn pause(interval: Duration, shutdown: &Shutdown) -> bool {
    let deadline = Instant::now() + interval;
    loop {
        if shutdown.is_requested() {
            return true;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return false;
        }
        thread::sleep(remaining.min(POLL_INTERVAL));
    }
}
