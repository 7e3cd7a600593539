use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {transport} to {addr}: {source}")]
    Bind {
        transport: &'static str,
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Server I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Echo worker panicked")]
    WorkerPanicked,
}

impl ServerError {
    pub fn exit_code(&self) -> i32 {
        2
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
