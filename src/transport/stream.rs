use crate::shutdown::Shutdown;
use std::io::{self, ErrorKind, Read};

/// Result of filling a buffer from a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// The whole buffer was filled.
    Complete,
    /// The peer closed the stream cleanly before sending any byte of the frame.
    Closed,
    /// Shutdown was requested while waiting for data.
    Interrupted,
}

/// Fills `buf` completely, like `read_exact`, while observing `shutdown`.
///
/// The stream is expected to carry a read timeout; each timeout re-checks the
/// shutdown flag and then resumes where the previous read stopped, so partial
/// frames are never lost. EOF in the middle of a frame is an `UnexpectedEof`
/// error.
pub fn read_full<R: Read + ?Sized>(
    stream: &mut R,
    buf: &mut [u8],
    shutdown: &Shutdown,
) -> io::Result<ReadStatus> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(ReadStatus::Closed),
            Ok(0) => {
                return Err(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    format!("stream closed after {} of {} bytes", filled, buf.len()),
                ))
            }
            Ok(n) => filled += n,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                if shutdown.is_requested() {
                    return Ok(ReadStatus::Interrupted);
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(ReadStatus::Complete)
}

/// True for errors that mean the TCP peer is gone.
pub fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Reader that replays a scripted list of read results.
    struct ScriptedReader {
        steps: VecDeque<io::Result<Vec<u8>>>,
    }

    impl ScriptedReader {
        fn new(steps: Vec<io::Result<Vec<u8>>>) -> Self {
            Self {
                steps: steps.into(),
            }
        }
    }

    impl Read for ScriptedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.steps.pop_front() {
                Some(Ok(chunk)) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                Some(Err(e)) => Err(e),
                None => Ok(0),
            }
        }
    }

    #[test]
    fn test_reassembles_partial_reads_across_timeouts() {
        let mut reader = ScriptedReader::new(vec![
            Ok(vec![1, 2]),
            Err(io::Error::from(ErrorKind::WouldBlock)),
            Ok(vec![3]),
            Err(io::Error::from(ErrorKind::TimedOut)),
            Ok(vec![4]),
        ]);
        let mut buf = [0u8; 4];
        let status = read_full(&mut reader, &mut buf, &Shutdown::new()).unwrap();
        assert_eq!(status, ReadStatus::Complete);
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn test_clean_close_before_frame() {
        let mut reader = ScriptedReader::new(vec![]);
        let mut buf = [0u8; 4];
        let status = read_full(&mut reader, &mut buf, &Shutdown::new()).unwrap();
        assert_eq!(status, ReadStatus::Closed);
    }

    #[test]
    fn test_close_mid_frame_is_error() {
        let mut reader = ScriptedReader::new(vec![Ok(vec![9, 9])]);
        let mut buf = [0u8; 4];
        let err = read_full(&mut reader, &mut buf, &Shutdown::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
        assert!(is_disconnect(&err));
    }

    #[test]
    fn test_timeout_after_shutdown_interrupts() {
        let shutdown = Shutdown::new();
        shutdown.request();
        let mut reader =
            ScriptedReader::new(vec![Err(io::Error::from(ErrorKind::WouldBlock))]);
        let mut buf = [0u8; 4];
        let status = read_full(&mut reader, &mut buf, &shutdown).unwrap();
        assert_eq!(status, ReadStatus::Interrupted);
    }

    #[test]
    fn test_other_errors_propagate() {
        let mut reader =
            ScriptedReader::new(vec![Err(io::Error::from(ErrorKind::ConnectionReset))]);
        let mut buf = [0u8; 4];
        let err = read_full(&mut reader, &mut buf, &Shutdown::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionReset);
    }
}
