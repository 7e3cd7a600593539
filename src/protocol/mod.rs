//! Probe wire format

pub mod error;
pub mod message;

pub use error::{ProtocolError, Result as ProtocolResult};
pub use message::{
    Probe, SequenceNumber, HEADER_LEN, MAX_PROBE_LEN, MIN_PROBE_LEN, PROBE_MAGIC,
};
