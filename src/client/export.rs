//! Per-probe CSV export (`-o FILE`).

use crate::client::error::Result;
use crate::client::measurement::Sample;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

pub const CSV_HEADER: &str = "sequence,rtt_us,status";

/// Writes one CSV row per sample. Lost probes have an empty `rtt_us`.
pub fn write_csv<W: Write>(mut writer: W, samples: &[Sample]) -> std::io::Result<()> {
    writeln!(writer, "{}", CSV_HEADER)?;
    for sample in samples {
        match sample.rtt_us {
            Some(rtt) => writeln!(writer, "{},{},received", sample.sequence.0, rtt)?,
            None => writeln!(writer, "{},,lost", sample.sequence.0)?,
        }
    }
    writer.flush()
}

pub fn export_csv(path: &Path, samples: &[Sample]) -> Result<()> {
    let file = File::create(path)?;
    write_csv(BufWriter::new(file), samples)?;
    info!(path = %path.display(), rows = samples.len(), "Samples written");
    Ok(())
}
