use clap::Parser;
use netjitter::client::{run_client, run_with_socket, ClientError, Result, Statistics};
use netjitter::clock::ScriptedClock;
use netjitter::config::{Cli, RunConfig, TransportKind};
use netjitter::protocol::Probe;
use netjitter::server::{EchoServer, ServeMode};
use netjitter::shutdown::Shutdown;
use netjitter::transport::{ProbeSocket, Reply};
use std::net::UdpSocket;
use std::thread;
use std::time::Duration;

/// In-memory transport that echoes every probe unless `drop` says otherwise.
struct StubSocket<F: Fn(u64) -> bool> {
    pending: Option<Vec<u8>>,
    drop: F,
}

impl<F: Fn(u64) -> bool> StubSocket<F> {
    fn new(drop: F) -> Self {
        Self {
            pending: None,
            drop,
        }
    }
}

impl<F: Fn(u64) -> bool + Send> ProbeSocket for StubSocket<F> {
    fn discard_stale(&mut self) -> Result<usize> {
        Ok(usize::from(self.pending.take().is_some()))
    }

    fn send_probe(&mut self, frame: &[u8]) -> Result<()> {
        let (sequence, _) = Probe::decode_header(frame)?;
        if !(self.drop)(sequence.0) {
            self.pending = Some(frame.to_vec());
        }
        Ok(())
    }

    fn receive_probe(&mut self) -> Result<Reply> {
        Ok(match self.pending.take() {
            Some(bytes) => Reply::Data(bytes),
            None => Reply::TimedOut,
        })
    }
}

/// Echoes `remaining` probes, then simulates Ctrl-C while the next one is in flight.
struct InterruptingSocket {
    inner: StubSocket<fn(u64) -> bool>,
    remaining: usize,
    shutdown: Shutdown,
}

impl ProbeSocket for InterruptingSocket {
    fn discard_stale(&mut self) -> Result<usize> {
        self.inner.discard_stale()
    }

    fn send_probe(&mut self, frame: &[u8]) -> Result<()> {
        self.inner.send_probe(frame)
    }

    fn receive_probe(&mut self) -> Result<Reply> {
        if self.remaining == 0 {
            self.shutdown.request();
            return Ok(Reply::Interrupted);
        }
        self.remaining -= 1;
        self.inner.receive_probe()
    }
}

fn never(_: u64) -> bool {
    false
}

fn client_config(port: u16, count: usize, transport: TransportKind) -> RunConfig {
    let mut config = RunConfig::client("127.0.0.1", port);
    config.probe_count = count;
    config.payload_length = 64;
    config.transport = transport;
    config.reply_timeout = Duration::from_millis(500);
    config
}

fn start_server(mode: ServeMode) -> (u16, Shutdown, thread::JoinHandle<()>) {
    let server = EchoServer::bind("127.0.0.1:0", mode).expect("Failed to bind test server");
    let port = server
        .tcp_addr()
        .or_else(|| server.udp_addr())
        .expect("server has an address")
        .port();
    let shutdown = Shutdown::new();
    let handle = {
        let shutdown = shutdown.clone();
        thread::spawn(move || server.serve(&shutdown).expect("server failed"))
    };
    (port, shutdown, handle)
}

#[test]
fn test_tcp_loopback_measurement() {
    let (port, server_shutdown, server) = start_server(ServeMode::Both);

    let config = client_config(port, 5, TransportKind::Tcp);
    let report = run_client(&config, &Shutdown::new()).unwrap();
    let stats = &report.statistics;

    assert_eq!(stats.sent, 5);
    assert_eq!(stats.received, 5);
    assert_eq!(stats.lost, 0);
    let rtt = stats.rtt.expect("rtt summary");
    assert!(rtt.min_us as f64 <= rtt.mean_us);
    assert!(rtt.mean_us <= rtt.max_us as f64);
    assert!(stats.mean_jitter_us.is_some());
    assert!(!report.interrupted);

    server_shutdown.request();
    server.join().unwrap();
}

#[test]
fn test_udp_loopback_measurement() {
    let (port, server_shutdown, server) = start_server(ServeMode::Both);

    let config = client_config(port, 5, TransportKind::Udp);
    let report = run_client(&config, &Shutdown::new()).unwrap();

    assert_eq!(report.statistics.sent, 5);
    assert_eq!(report.statistics.received, 5);
    assert_eq!(report.transport, TransportKind::Udp);

    server_shutdown.request();
    server.join().unwrap();
}

#[test]
fn test_udp_only_server_does_not_accept_tcp() {
    let (port, server_shutdown, server) = start_server(ServeMode::UdpOnly);

    let config = client_config(port, 1, TransportKind::Tcp);
    let err = run_client(&config, &Shutdown::new()).unwrap_err();
    assert!(matches!(err, ClientError::Socket(_) | ClientError::Io(_)));
    assert_eq!(err.exit_code(), 2);

    server_shutdown.request();
    server.join().unwrap();
}

#[test]
fn test_unreachable_udp_server_counts_every_probe_lost() {
    // Bind and drop to get a port nobody is listening on.
    let port = UdpSocket::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let mut config = client_config(port, 3, TransportKind::Udp);
    config.reply_timeout = Duration::from_millis(50);

    let report = run_client(&config, &Shutdown::new()).unwrap();
    assert_eq!(report.statistics.sent, 3);
    assert_eq!(report.statistics.received, 0);
    assert!(report.statistics.rtt.is_none());
    assert!(report.statistics.mean_jitter_us.is_none());
}

#[test]
fn test_dropping_odd_probes_leaves_no_jitter() {
    let mut socket = StubSocket::new(|seq| seq % 2 == 1);
    let clock = ScriptedClock::new((0..40).map(|t| t * 100));
    let config = client_config(9, 10, TransportKind::Udp);

    let report = run_with_socket(&mut socket, &clock, &config, &Shutdown::new()).unwrap();
    let stats = report.statistics;

    assert_eq!(stats.sent, 10);
    assert_eq!(stats.received, 5);
    assert_eq!(stats.lost, 5);
    assert_eq!(stats.loss_percent(), 50.0);
    assert!(stats.rtt.is_some());
    assert!(stats.mean_jitter_us.is_none());
}

#[test]
fn test_scripted_clock_run_is_deterministic() {
    let run = || -> Statistics {
        let mut socket = StubSocket::new(never);
        let clock = ScriptedClock::new([0, 100, 200, 350, 400, 520]);
        let config = client_config(9, 3, TransportKind::Tcp);
        run_with_socket(&mut socket, &clock, &config, &Shutdown::new())
            .unwrap()
            .statistics
    };

    let first = run();
    assert_eq!(first, run());
    assert_eq!(first.min_rtt_us(), Some(100));
    assert_eq!(first.max_rtt_us(), Some(150));
    let jitter = first.mean_jitter_us.unwrap();
    assert!((jitter - 40.0).abs() < 1e-9);
}

#[test]
fn test_interrupt_reports_collected_prefix() {
    let shutdown = Shutdown::new();
    let mut socket = InterruptingSocket {
        inner: StubSocket::new(never as fn(u64) -> bool),
        remaining: 3,
        shutdown: shutdown.clone(),
    };
    let clock = ScriptedClock::new((0..20).map(|t| t * 10));
    let config = client_config(9, 10, TransportKind::Tcp);

    let report = run_with_socket(&mut socket, &clock, &config, &shutdown).unwrap();
    assert!(report.interrupted);
    assert_eq!(report.statistics.sent, 3);
    assert_eq!(report.statistics.received, 3);
}

#[test]
fn test_warmup_is_not_recorded() {
    let mut socket = StubSocket::new(never);
    let clock = ScriptedClock::new((0..40).map(|t| t * 10));
    let mut config = client_config(9, 4, TransportKind::Tcp);
    config.warmup = 3;

    let report = run_with_socket(&mut socket, &clock, &config, &Shutdown::new()).unwrap();
    assert_eq!(report.statistics.sent, 4);
}

#[test]
fn test_csv_export_written() {
    let path = std::env::temp_dir().join(format!("netjitter-e2e-{}.csv", std::process::id()));
    let mut socket = StubSocket::new(|seq| seq == 1);
    let clock = ScriptedClock::new((0..20).map(|t| t * 10));
    let mut config = client_config(9, 3, TransportKind::Udp);
    config.output = Some(path.clone());

    run_with_socket(&mut socket, &clock, &config, &Shutdown::new()).unwrap();

    let csv = std::fs::read_to_string(&path).unwrap();
    let _ = std::fs::remove_file(&path);
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "sequence,rtt_us,status");
    assert_eq!(lines[2], "1,,lost");
}

#[test]
fn test_cli_to_config() {
    let cli = Cli::try_parse_from(["netjitter", "-c", "10.1.2.3", "-u", "-n", "20", "-l", "64"])
        .unwrap();
    let config = RunConfig::from_cli(&cli).unwrap();
    assert_eq!(config.transport, TransportKind::Udp);
    assert_eq!(config.probe_count, 20);
    assert_eq!(config.address(), "10.1.2.3:8888");

    let cli = Cli::try_parse_from(["netjitter", "-c", "10.1.2.3", "-l", "8"]).unwrap();
    let err = RunConfig::from_cli(&cli).unwrap_err();
    assert_eq!(err.exit_code(), 1);

    assert!(Cli::try_parse_from(["netjitter", "-n", "5"]).is_err());
    assert!(Cli::try_parse_from(["netjitter", "-s", "-c", "host"]).is_err());
}

#[test]
fn test_unwritable_export_keeps_results() {
    let mut socket = StubSocket::new(never);
    let clock = ScriptedClock::new((0..20).map(|t| t * 10));
    let mut config = client_config(9, 5, TransportKind::Udp);
    config.output = Some("/nonexistent-dir/out.csv".into());

    let report = run_with_socket(&mut socket, &clock, &config, &Shutdown::new()).unwrap();
    assert_eq!(report.statistics.sent, 5);
    assert_eq!(report.statistics.received, 5);
    assert!(report
        .export_error
        .as_deref()
        .is_some_and(|e| e.contains("/nonexistent-dir/out.csv")));
}

#[test]
#[cfg(target_os = "linux")]
fn test_udp_reply_from_wildcard_server_via_alias_address() {
    let server = EchoServer::bind("0.0.0.0:0", ServeMode::UdpOnly).unwrap();
    let port = server.udp_addr().unwrap().port();
    let server_shutdown = Shutdown::new();
    let handle = {
        let shutdown = server_shutdown.clone();
        thread::spawn(move || server.serve(&shutdown).expect("server failed"))
    };

    let mut config = RunConfig::client("127.0.0.2", port);
    config.probe_count = 5;
    config.payload_length = 64;
    config.transport = TransportKind::Udp;
    let report = run_client(&config, &Shutdown::new()).unwrap();

    assert_eq!(report.statistics.sent, 5);
    assert_eq!(report.statistics.received, 5);

    server_shutdown.request();
    handle.join().unwrap();
}
