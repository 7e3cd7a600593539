use crate::protocol::{Probe, MAX_PROBE_LEN};
use crate::server::error::Result;
use crate::shutdown::Shutdown;
use crate::transport::POLL_INTERVAL;
use std::io::ErrorKind;
use std::net::UdpSocket;
use tracing::{debug, info, warn};

/// Totals for one UDP echo loop, owned by that loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UdpEchoStats {
    pub echoed: u64,
    pub dropped: u64,
    pub send_errors: u64,
}

/// Stateless datagram echo.
///
/// Every valid probe is sent straight back to its source address; malformed
/// datagrams are dropped without a reply. No per-sender state is kept.
pub fn serve_udp(socket: UdpSocket, shutdown: &Shutdown) -> Result<UdpEchoStats> {
    socket.set_read_timeout(Some(POLL_INTERVAL))?;
    info!(address = %socket.local_addr()?, "UDP echo listening");

    // One spare byte so oversized datagrams fail validation instead of being truncated.
    let mut buf = vec![0u8; MAX_PROBE_LEN + 1];
    let mut stats = UdpEchoStats::default();

    while !shutdown.is_requested() {
        let (len, from) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock
                        | ErrorKind::TimedOut
                        | ErrorKind::Interrupted
                        | ErrorKind::ConnectionReset
                        | ErrorKind::ConnectionRefused
                ) =>
            {
                continue
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = Probe::decode(&buf[..len]) {
            stats.dropped += 1;
            debug!(from = %from, bytes = len, error = %e, "Dropping malformed datagram");
            continue;
        }

        match socket.send_to(&buf[..len], from) {
            Ok(_) => stats.echoed += 1,
            Err(e) => {
                stats.send_errors += 1;
                warn!(to = %from, error = %e, "Failed to echo datagram");
            }
        }
    }

    info!(
        echoed = stats.echoed,
        dropped = stats.dropped,
        send_errors = stats.send_errors,
        "UDP echo stopped"
    );
    Ok(stats)
}
