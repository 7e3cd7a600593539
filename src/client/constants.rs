//! Constants used throughout the client

/// Histogram lower bound in microseconds
pub const HISTOGRAM_LOW_BOUND_US: u64 = 1;

/// Histogram upper bound in microseconds (60 s); longer RTTs saturate
pub const HISTOGRAM_HIGH_BOUND_US: u64 = 60_000_000;

/// Histogram significant digits for precision
pub const HISTOGRAM_SIGNIFICANT_DIGITS: u8 = 3;

/// Progress bar tick interval in milliseconds
pub const PROGRESS_TICK_INTERVAL_MS: u64 = 100;

/// Minimum spacing between live statistics refreshes in milliseconds
pub const LIVE_STATS_UPDATE_INTERVAL_MS: u64 = 250;

/// Warm-up probes use sequence numbers counting down from here so they can
/// never collide with measured sequence numbers
pub const WARMUP_SEQUENCE_BASE: u64 = u64::MAX;

/// RTT below this is rendered green in the live display (microseconds)
pub const FAST_RTT_US: f64 = 1_000.0;

/// RTT below this is rendered yellow, above it red (microseconds)
pub const SLOW_RTT_US: f64 = 10_000.0;
