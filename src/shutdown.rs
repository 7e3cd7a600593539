//! Interrupt observation shared by the client and server roles.
//!
//! Both roles run blocking socket loops, so the signal is turned into a
//! flag that the loops poll between short socket timeouts.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

/// Exit code used when a second interrupt forces the process down.
pub const FORCED_EXIT_CODE: i32 = 130;

/// Cloneable shutdown flag.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    requested: Arc<AtomicBool>,
}

impl Shutdown {
    /// Creates a flag that is only ever set through [`Shutdown::request`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a flag that is also set by Ctrl-C.
    ///
    /// A watcher thread runs a single-threaded tokio runtime that waits on
    /// the interrupt signal. The first interrupt sets the flag; a second one
    /// terminates the process with [`FORCED_EXIT_CODE`].
    pub fn install() -> io::Result<Self> {
        let shutdown = Self::new();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let flag = shutdown.clone();
        thread::Builder::new()
            .name("signal-watcher".into())
            .spawn(move || {
                runtime.block_on(async move {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!(error = %e, "Unable to listen for interrupt signal");
                        return;
                    }
                    debug!("Interrupt received, requesting shutdown");
                    flag.request();

                    if tokio::signal::ctrl_c().await.is_ok() {
                        eprintln!("\nSecond interrupt, exiting immediately");
                        std::process::exit(FORCED_EXIT_CODE);
                    }
                });
            })?;

        Ok(shutdown)
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_is_visible_to_clones() {
        let shutdown = Shutdown::new();
        let observer = shutdown.clone();
        assert!(!observer.is_requested());
        shutdown.request();
        assert!(observer.is_requested());
    }

    #[test]
    fn test_request_across_threads() {
        let shutdown = Shutdown::new();
        let remote = shutdown.clone();
        thread::spawn(move || remote.request()).join().unwrap();
        assert!(shutdown.is_requested());
    }
}
