use thiserror::Error;

/// Reasons a received buffer is not a valid probe.
///
/// Every variant is a malformed probe: the server drops it without a reply
/// and the client counts it as a lost sample.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Malformed probe: {actual} bytes is shorter than the {minimum}-byte header")]
    TooShort { minimum: usize, actual: usize },

    #[error("Malformed probe: bad magic {found:#010x}")]
    BadMagic { found: u32 },

    #[error("Malformed probe: declared length {declared} outside {min}..={max}")]
    LengthOutOfRange {
        declared: usize,
        min: usize,
        max: usize,
    },

    #[error("Malformed probe: declared length {declared}, received {actual} bytes")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("Malformed probe: filler corrupted at offset {offset}")]
    CorruptFiller { offset: usize },
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
