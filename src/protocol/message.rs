use crate::protocol::error::{ProtocolError, Result};
use tracing::debug;

/// Frame marker, ASCII "NJTP".
pub const PROBE_MAGIC: u32 = 0x4E4A_5450;

/// Size of the fixed header: magic, sequence number, frame length.
pub const HEADER_LEN: usize = 16;

/// Smallest legal probe; a bare header with no filler.
pub const MIN_PROBE_LEN: usize = HEADER_LEN;

/// Largest legal probe.
pub const MAX_PROBE_LEN: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequenceNumber(pub u64);

/// Decoded view of one probe frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    pub sequence: SequenceNumber,
    pub length: usize,
}

impl Probe {
    pub fn new(sequence: SequenceNumber, length: usize) -> Self {
        Self { sequence, length }
    }

    /// Encodes the probe into a freshly allocated frame of exactly `length` bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.length];
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    /// Encodes the probe into `buf`, which must be exactly `length` bytes.
    pub fn encode_into(&self, buf: &mut [u8]) -> Result<()> {
        check_length(self.length)?;
        if buf.len() != self.length {
            return Err(ProtocolError::LengthMismatch {
                declared: self.length,
                actual: buf.len(),
            });
        }

        buf[0..4].copy_from_slice(&PROBE_MAGIC.to_be_bytes());
        buf[4..12].copy_from_slice(&self.sequence.0.to_be_bytes());
        buf[12..16].copy_from_slice(&(self.length as u32).to_be_bytes());
        for (i, byte) in buf[HEADER_LEN..].iter_mut().enumerate() {
            *byte = filler_byte(i);
        }
        Ok(())
    }

    /// Decodes a complete frame, validating header and filler.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (sequence, declared) = Self::decode_header(bytes)?;
        if declared != bytes.len() {
            return Err(ProtocolError::LengthMismatch {
                declared,
                actual: bytes.len(),
            });
        }

        if let Some(offset) = bytes[HEADER_LEN..]
            .iter()
            .enumerate()
            .position(|(i, &b)| b != filler_byte(i))
        {
            return Err(ProtocolError::CorruptFiller {
                offset: HEADER_LEN + offset,
            });
        }

        debug!(sequence = sequence.0, length = declared, "Probe decoded");
        Ok(Self {
            sequence,
            length: declared,
        })
    }

    /// Reads only the header, returning the sequence number and the declared
    /// frame length. Used by stream readers to learn how much more to read.
    pub fn decode_header(bytes: &[u8]) -> Result<(SequenceNumber, usize)> {
        if bytes.len() < HEADER_LEN {
            return Err(ProtocolError::TooShort {
                minimum: HEADER_LEN,
                actual: bytes.len(),
            });
        }

        let magic = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if magic != PROBE_MAGIC {
            return Err(ProtocolError::BadMagic { found: magic });
        }

        let mut seq = [0u8; 8];
        seq.copy_from_slice(&bytes[4..12]);
        let declared = u32::from_be_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]) as usize;
        check_length(declared)?;

        Ok((SequenceNumber(u64::from_be_bytes(seq)), declared))
    }
}

fn check_length(length: usize) -> Result<()> {
    if !(MIN_PROBE_LEN..=MAX_PROBE_LEN).contains(&length) {
        return Err(ProtocolError::LengthOutOfRange {
            declared: length,
            min: MIN_PROBE_LEN,
            max: MAX_PROBE_LEN,
        });
    }
    Ok(())
}

#[inline]
fn filler_byte(index: usize) -> u8 {
    (index % 256) as u8
}
