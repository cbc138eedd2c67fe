//! CSV export
//!
//! One header line followed by one row per sample in buffer order. Values
//! are written with `f64`'s shortest round-trip formatting so nothing is lost
//! between the buffer and the file.

use crate::error::{LoadFrameError, Result};
use crate::types::Sample;
use chrono::{DateTime, TimeZone};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Header line of an exported run
pub const CSV_HEADER: &str = "Time, Load (N), Extension (mm)";

/// Write `samples` as CSV, returning the number of rows written
pub fn write_csv<W: Write>(writer: &mut W, samples: &[Sample]) -> Result<usize> {
    writeln!(writer, "{}", CSV_HEADER)?;
    for sample in samples {
        writeln!(
            writer,
            "{}, {}, {}",
            sample.seconds(),
            sample.load,
            sample.extension
        )?;
    }
    writer.flush()?;
    Ok(samples.len())
}

/// Export `samples` to a CSV file at `path`, replacing any existing file
pub fn export_csv(path: &Path, samples: &[Sample]) -> Result<usize> {
    let file = File::create(path).map_err(|e| {
        LoadFrameError::Export(format!("failed to create {}: {}", path.display(), e))
    })?;
    let mut writer = BufWriter::new(file);
    let rows = write_csv(&mut writer, samples)?;
    tracing::info!("Exported {} samples to {:?}", rows, path);
    Ok(rows)
}

/// Default file name for a run exported at `now`
pub fn default_export_name<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("run-{}.csv", now.format("%Y%m%d-%H%M%S"))
}
