use crate::protocol::{Probe, HEADER_LEN, MAX_PROBE_LEN};
use crate::server::error::Result;
use crate::server::ACCEPT_POLL_INTERVAL;
use crate::shutdown::Shutdown;
use crate::transport::stream::is_disconnect;
use crate::transport::{read_full, ReadStatus, POLL_INTERVAL};
use std::io::{ErrorKind, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;
use tracing::{debug, error, info, warn};

/// Per-connection counters, owned by the connection handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub echoed: u64,
    pub dropped: u64,
}

/// Accept connections one at a time and echo each to completion.
///
/// Only one client is served at any moment so concurrent probe streams can
/// never delay each other. Returns when shutdown is requested.
pub fn serve_tcp(listener: TcpListener, shutdown: &Shutdown) -> Result<()> {
    listener.set_nonblocking(true)?;
    info!(address = %listener.local_addr()?, "TCP echo listening");

    let mut connections = 0u64;
    while !shutdown.is_requested() {
        match listener.accept() {
            Ok((stream, peer)) => {
                connections += 1;
                info!(peer = %peer, "New client connected");
                let stats = handle_connection(stream, peer, shutdown);
                info!(
                    peer = %peer,
                    echoed = stats.echoed,
                    dropped = stats.dropped,
                    "Client disconnected"
                );
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL_INTERVAL),
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
        }
    }

    info!(connections = connections, "TCP echo stopped");
    Ok(())
}

/// Echo frames on one connection until the peer leaves or shutdown is requested.
///
/// A frame whose header is invalid loses stream framing, so the connection
/// is closed without a reply. A frame with a valid header but corrupt filler
/// is skipped and the connection kept.
pub fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    shutdown: &Shutdown,
) -> ConnectionStats {
    let mut stats = ConnectionStats::default();

    if let Err(e) = configure(&stream) {
        error!(peer = %peer, error = %e, "Failed to configure connection");
        return stats;
    }

    let mut buf = vec![0u8; MAX_PROBE_LEN];
    loop {
        match read_full(&mut stream, &mut buf[..HEADER_LEN], shutdown) {
            Ok(ReadStatus::Complete) => {}
            Ok(ReadStatus::Closed) | Ok(ReadStatus::Interrupted) => break,
            Err(e) => {
                log_read_error(peer, &e);
                break;
            }
        }

        let len = match Probe::decode_header(&buf[..HEADER_LEN]) {
            Ok((_, len)) => len,
            Err(e) => {
                stats.dropped += 1;
                warn!(peer = %peer, error = %e, "Malformed probe header, closing connection");
                break;
            }
        };

        match read_full(&mut stream, &mut buf[HEADER_LEN..len], shutdown) {
            Ok(ReadStatus::Complete) => {}
            Ok(ReadStatus::Interrupted) => break,
            Ok(ReadStatus::Closed) => {
                debug!(peer = %peer, "Client closed mid-frame");
                break;
            }
            Err(e) => {
                log_read_error(peer, &e);
                break;
            }
        }

        if let Err(e) = Probe::decode(&buf[..len]) {
            stats.dropped += 1;
            warn!(peer = %peer, error = %e, "Dropping malformed probe");
            continue;
        }

        // Echo back the exact same bytes
        if let Err(e) = stream.write_all(&buf[..len]) {
            if is_disconnect(&e) {
                debug!(peer = %peer, error = %e, "Client went away before echo");
            } else {
                error!(peer = %peer, error = %e, "Failed to send echo");
            }
            break;
        }
        stats.echoed += 1;
    }

    stats
}

fn configure(stream: &TcpStream) -> std::io::Result<()> {
    // Accepted sockets may inherit non-blocking mode from the listener.
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(POLL_INTERVAL))
}

fn log_read_error(peer: SocketAddr, e: &std::io::Error) {
    if is_disconnect(e) {
        debug!(peer = %peer, error = %e, "Client disconnected");
    } else {
        error!(peer = %peer, error = %e, "Failed to receive probe");
    }
}
