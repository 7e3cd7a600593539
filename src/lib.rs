//! netjitter - network latency and jitter probe
//!
//! One binary plays either role. The server echoes fixed-format probes back
//! over TCP and UDP; the client sends a numbered series of probes, times each
//! round trip with a monotonic clock, and reports loss, RTT and jitter.

pub mod client;
pub mod clock;
pub mod config;
pub mod logging;
pub mod protocol;
pub mod server;
pub mod shutdown;
pub mod transport;
