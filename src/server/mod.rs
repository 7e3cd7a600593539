//! Server role: reflect probes back to their sender.
//!
//! TCP and UDP echo run in independent threads with no shared mutable state;
//! the only thing they share is the read-only shutdown flag.

pub mod error;
pub mod tcp;
pub mod udp;

pub use error::{Result, ServerError};
pub use tcp::{handle_connection, serve_tcp, ConnectionStats};
pub use udp::{serve_udp, UdpEchoStats};

use crate::config::{RunConfig, TransportKind};
use crate::shutdown::Shutdown;
use std::net::{SocketAddr, TcpListener, UdpSocket};
use std::thread;
use std::time::Duration;
use tracing::info;

/// How often an idle TCP listener re-checks the shutdown flag.
pub const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Which transports the server answers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeMode {
    /// TCP and UDP on the same port number.
    Both,
    UdpOnly,
}

/// Bound, not yet serving, echo server.
#[derive(Debug)]
pub struct EchoServer {
    tcp: Option<TcpListener>,
    udp: Option<UdpSocket>,
}

impl EchoServer {
    /// Bind according to a server [`RunConfig`]. `-u` selects UDP only.
    pub fn from_config(config: &RunConfig) -> Result<Self> {
        let mode = match config.transport {
            TransportKind::Udp => ServeMode::UdpOnly,
            TransportKind::Tcp => ServeMode::Both,
        };
        Self::bind(&config.address(), mode)
    }

    /// Bind to `addr`. With [`ServeMode::Both`] the UDP socket takes the port
    /// the TCP listener actually got, so binding port 0 yields one shared port.
    pub fn bind(addr: &str, mode: ServeMode) -> Result<Self> {
        match mode {
            ServeMode::UdpOnly => Ok(Self {
                tcp: None,
                udp: Some(bind_udp(addr)?),
            }),
            ServeMode::Both => {
                let tcp = TcpListener::bind(addr).map_err(|source| ServerError::Bind {
                    transport: "TCP",
                    addr: addr.to_string(),
                    source,
                })?;
                let local = tcp.local_addr()?;
                let udp = bind_udp(&local.to_string())?;
                Ok(Self {
                    tcp: Some(tcp),
                    udp: Some(udp),
                })
            }
        }
    }

    pub fn tcp_addr(&self) -> Option<SocketAddr> {
        self.tcp.as_ref().and_then(|l| l.local_addr().ok())
    }

    pub fn udp_addr(&self) -> Option<SocketAddr> {
        self.udp.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Serve until shutdown is requested.
    pub fn serve(self, shutdown: &Shutdown) -> Result<()> {
        info!(
            tcp = ?self.tcp_addr(),
            udp = ?self.udp_addr(),
            "Echo server ready"
        );

        let Self { tcp, udp } = self;
        thread::scope(|scope| {
            let udp_worker = udp.map(|socket| {
                thread::Builder::new()
                    .name("udp-echo".into())
                    .spawn_scoped(scope, move || {
                        let result = serve_udp(socket, shutdown);
                        if result.is_err() {
                            shutdown.request();
                        }
                        result
                    })
            });

            let tcp_result = match tcp {
                Some(listener) => serve_tcp(listener, shutdown),
                None => Ok(()),
            };

            // Either loop failing stops the other.
            if tcp_result.is_err() {
                shutdown.request();
            }

            let udp_result = match udp_worker {
                Some(Ok(handle)) => handle
                    .join()
                    .map_err(|_| ServerError::WorkerPanicked)
                    .and_then(|r| r.map(|_| ())),
                Some(Err(e)) => Err(ServerError::Io(e)),
                None => Ok(()),
            };

            tcp_result.and(udp_result)
        })
    }
}

/// Bind and serve according to `config` until shutdown.
pub fn run_server(config: &RunConfig, shutdown: &Shutdown) -> Result<()> {
    EchoServer::from_config(config)?.serve(shutdown)
}

fn bind_udp(addr: &str) -> Result<UdpSocket> {
    UdpSocket::bind(addr).map_err(|source| ServerError::Bind {
        transport: "UDP",
        addr: addr.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_mode_shares_port() {
        let server = EchoServer::bind("127.0.0.1:0", ServeMode::Both).unwrap();
        let tcp = server.tcp_addr().unwrap();
        let udp = server.udp_addr().unwrap();
        assert_eq!(tcp.port(), udp.port());
    }

    #[test]
    fn test_udp_only_mode_has_no_listener() {
        let server = EchoServer::bind("127.0.0.1:0", ServeMode::UdpOnly).unwrap();
        assert!(server.tcp_addr().is_none());
        assert!(server.udp_addr().is_some());
    }

    #[test]
    fn test_bind_conflict_is_bind_error() {
        let taken = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap().to_string();
        let err = EchoServer::bind(&addr, ServeMode::Both).unwrap_err();
        assert!(matches!(err, ServerError::Bind { transport: "TCP", .. }));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_serve_returns_on_shutdown() {
        let server = EchoServer::bind("127.0.0.1:0", ServeMode::Both).unwrap();
        let shutdown = Shutdown::new();
        shutdown.request();
        server.serve(&shutdown).unwrap();
    }
}
