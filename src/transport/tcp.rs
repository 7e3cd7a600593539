use crate::client::error::{ClientError, Result};
use crate::shutdown::Shutdown;
use crate::transport::stream::{is_disconnect, read_full, ReadStatus};
use crate::transport::{ProbeSocket, Reply, CONNECT_TIMEOUT, POLL_INTERVAL};
use std::io::Write;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use tracing::{debug, warn};

/// One TCP connection held for the whole run.
///
/// Reads block until a full frame of `frame_len` bytes arrives. The read
/// timeout is only a polling interval for the shutdown flag.
#[derive(Debug)]
pub struct TcpProbeSocket {
    stream: TcpStream,
    peer: SocketAddr,
    buf: Vec<u8>,
    shutdown: Shutdown,
}

impl TcpProbeSocket {
    /// Connect to `addr`, trying each resolved address in turn.
    pub fn connect(addr: &str, frame_len: usize, shutdown: Shutdown) -> Result<Self> {
        debug!(addr = addr, "Resolving server address");
        let candidates: Vec<SocketAddr> = addr
            .to_socket_addrs()
            .map_err(|e| ClientError::Socket(format!("Failed to resolve {}: {}", addr, e)))?
            .collect();

        let mut last_error = None;
        for candidate in candidates {
            debug!(peer = %candidate, "Connecting TCP socket");
            match TcpStream::connect_timeout(&candidate, CONNECT_TIMEOUT) {
                Ok(stream) => return Self::from_stream(stream, frame_len, shutdown),
                Err(e) => {
                    warn!(peer = %candidate, error = %e, "Failed to connect");
                    last_error = Some(e);
                }
            }
        }

        Err(ClientError::Socket(match last_error {
            Some(e) => format!("Failed to connect to {}: {}", addr, e),
            None => format!("Failed to connect to {}: no addresses resolved", addr),
        }))
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: TcpStream, frame_len: usize, shutdown: Shutdown) -> Result<Self> {
        let peer = stream.peer_addr()?;
        stream
            .set_nodelay(true)
            .map_err(|e| ClientError::Socket(format!("Failed to disable Nagle: {}", e)))?;
        stream
            .set_read_timeout(Some(POLL_INTERVAL))
            .map_err(|e| ClientError::Socket(format!("Failed to set timeout: {}", e)))?;
        debug!(peer = %peer, "TCP socket connected");

        Ok(Self {
            stream,
            peer,
            buf: vec![0u8; frame_len],
            shutdown,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

impl ProbeSocket for TcpProbeSocket {
    fn discard_stale(&mut self) -> Result<usize> {
        Ok(0)
    }

    fn send_probe(&mut self, frame: &[u8]) -> Result<()> {
        self.stream.write_all(frame).map_err(|e| {
            if is_disconnect(&e) {
                ClientError::ConnectionLost(format!("{} while sending to {}", e, self.peer))
            } else {
                ClientError::Io(e)
            }
        })?;
        debug!(bytes_sent = frame.len(), "Probe sent");
        Ok(())
    }

    fn receive_probe(&mut self) -> Result<Reply> {
        match read_full(&mut self.stream, &mut self.buf, &self.shutdown) {
            Ok(ReadStatus::Complete) => Ok(Reply::Data(self.buf.clone())),
            Ok(ReadStatus::Interrupted) => Ok(Reply::Interrupted),
            Ok(ReadStatus::Closed) => Err(ClientError::ConnectionLost(format!(
                "{} closed the connection",
                self.peer
            ))),
            Err(e) if is_disconnect(&e) => Err(ClientError::ConnectionLost(format!(
                "{} while reading from {}",
                e, self.peer
            ))),
            Err(e) => Err(ClientError::Io(e)),
        }
    }
}
