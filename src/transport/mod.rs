//! Client-side probe sockets over TCP or UDP.
//!
//! Both transports expose the same send/receive primitives through
//! [`ProbeSocket`]. A UDP reply timeout is an ordinary [`Reply::TimedOut`]
//! outcome, never an error; a dropped TCP connection is an error.

pub mod stream;
pub mod tcp;
pub mod udp;

use crate::client::error::Result;
use std::time::Duration;

pub use stream::{read_full, ReadStatus};
pub use tcp::TcpProbeSocket;
pub use udp::UdpProbeSocket;

/// Granularity at which blocked socket calls re-check the shutdown flag.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on establishing the TCP connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of waiting for one echoed probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Raw bytes received from the server, not yet decoded.
    Data(Vec<u8>),
    /// No reply arrived within the reply timeout.
    TimedOut,
    /// Shutdown was requested while waiting.
    Interrupted,
}

/// Send/receive primitives used by the measurement loop.
pub trait ProbeSocket: Send {
    /// Drops replies still queued from earlier probes. Returns how many were dropped.
    fn discard_stale(&mut self) -> Result<usize>;

    /// Sends one encoded probe frame.
    fn send_probe(&mut self, frame: &[u8]) -> Result<()>;

    /// Waits for the next reply.
    fn receive_probe(&mut self) -> Result<Reply>;
}


#[cfg(test)]
pub use tests::MockProbeSocket;
