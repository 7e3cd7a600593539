use crate::client::error::{ClientError, Result};
use crate::protocol::MAX_PROBE_LEN;
use crate::shutdown::Shutdown;
use crate::transport::{ProbeSocket, Reply, POLL_INTERVAL};
use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Unconnected datagram socket addressing a single server.
///
/// Replies are matched on the server's port only. A wildcard-bound server
/// answers from whichever local address the kernel routes through, which need
/// not be the address the probe was sent to. Datagrams from other ports are
/// ignored. The receive buffer is one
/// byte larger than the largest legal probe so oversized replies show up as
/// a length mismatch instead of being silently truncated to a valid size.
#[derive(Debug)]
pub struct UdpProbeSocket {
    socket: UdpSocket,
    server: SocketAddr,
    reply_timeout: Duration,
    buf: Vec<u8>,
    shutdown: Shutdown,
}

impl UdpProbeSocket {
    /// Resolve `addr` and bind an ephemeral local socket of the same family.
    pub fn connect(addr: &str, reply_timeout: Duration, shutdown: Shutdown) -> Result<Self> {
        let server = addr
            .to_socket_addrs()
            .map_err(|e| ClientError::Socket(format!("Failed to resolve {}: {}", addr, e)))?
            .next()
            .ok_or_else(|| ClientError::Socket(format!("No addresses resolved for {}", addr)))?;

        let local = if server.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };
        Self::bind(local, server, reply_timeout, shutdown)
    }

    /// Bind to `local` and send probes to `server`.
    pub fn bind(
        local: &str,
        server: SocketAddr,
        reply_timeout: Duration,
        shutdown: Shutdown,
    ) -> Result<Self> {
        debug!(local = local, server = %server, "Binding UDP socket");
        let socket = UdpSocket::bind(local).map_err(|e| {
            warn!(error = %e, "Failed to bind socket");
            ClientError::Socket(format!("Failed to bind to {}: {}", local, e))
        })?;

        Ok(Self {
            socket,
            server,
            reply_timeout,
            buf: vec![0u8; MAX_PROBE_LEN + 1],
            shutdown,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

impl ProbeSocket for UdpProbeSocket {
    fn discard_stale(&mut self) -> Result<usize> {
        self.socket.set_nonblocking(true)?;
        let mut discarded = 0usize;
        let outcome = loop {
            match self.socket.recv_from(&mut self.buf) {
                Ok(_) => discarded += 1,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break Ok(()),
                Err(e) if is_unreachable(&e) => {}
                Err(e) => break Err(e),
            }
        };
        self.socket.set_nonblocking(false)?;
        outcome?;

        if discarded > 0 {
            debug!(discarded = discarded, "Discarded stale replies");
        }
        Ok(discarded)
    }

    fn send_probe(&mut self, frame: &[u8]) -> Result<()> {
        let bytes_sent = self.socket.send_to(frame, self.server).map_err(|e| {
            warn!(error = %e, "Failed to send probe");
            ClientError::Io(e)
        })?;
        debug!(bytes_sent = bytes_sent, "Probe sent");
        Ok(())
    }

    fn receive_probe(&mut self) -> Result<Reply> {
        let deadline = Instant::now() + self.reply_timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(Reply::TimedOut);
            }
            self.socket.set_read_timeout(Some(remaining.min(POLL_INTERVAL)))?;

            match self.socket.recv_from(&mut self.buf) {
                Ok((len, from)) if from.port() == self.server.port() => {
                    debug!(bytes_received = len, from = %from, "Reply received");
                    return Ok(Reply::Data(self.buf[..len].to_vec()));
                }
                Ok((len, from)) => {
                    debug!(from = %from, bytes = len, "Ignoring datagram from unexpected peer");
                }
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    if self.shutdown.is_requested() {
                        return Ok(Reply::Interrupted);
                    }
                }
                // ICMP unreachable surfaces on some platforms; the probe is simply lost.
                Err(e) if is_unreachable(&e) => {
                    debug!(error = %e, "Server unreachable");
                    return Ok(Reply::TimedOut);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(ClientError::Io(e)),
            }
        }
    }
}

fn is_unreachable(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset
    )
}
