//! Batch ingestion: bytes from a tracker export to a `RawBatch`.
//!
//! Device portals export CSV in whatever encoding their backend happens to
//! use, so decoding tries a short fixed list of encodings in order until one
//! decodes cleanly. All I/O happens here, before the engine is invoked.

use crate::domain::RawBatch;
use crate::error::{Result, TelemetryError};
use encoding_rs::Encoding;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Encoding labels tried in order. `latin1` and `iso-8859-1` both resolve to
/// the windows-1252 decoder, which accepts any byte sequence, so decoding
/// always terminates.
const ENCODING_LABELS: &[&str] = &["utf-8", "latin1", "windows-1252", "iso-8859-1"];

/// Reads and decodes a CSV file into a raw batch.
pub fn read_batch_from_path(path: &Path) -> Result<RawBatch> {
    let source = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let bytes = fs::read(path)?;
    decode_batch(&bytes, &source)
}

/// Decodes raw bytes into a batch, trying each supported encoding in order.
pub fn decode_batch(bytes: &[u8], source_name: &str) -> Result<RawBatch> {
    let text = decode_text(bytes, source_name)?;
    parse_delimited(&text, source_name)
}

fn decode_text(bytes: &[u8], source_name: &str) -> Result<String> {
    for label in ENCODING_LABELS {
        let encoding = match Encoding::for_label(label.as_bytes()) {
            Some(e) => e,
            None => continue,
        };
        let (text, actual, had_errors) = encoding.decode(bytes);
        if !had_errors {
            debug!(source = source_name, encoding = actual.name(), "decoded batch");
            return Ok(text.into_owned());
        }
    }
    Err(TelemetryError::Encoding {
        source_name: source_name.to_string(),
    })
}

/// Guesses the field delimiter from the header line. Tracker exports use `;`
/// far more often than `,`, so `;` wins ties.
fn sniff_delimiter(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or("");
    let semicolons = header.matches(';').count();
    let commas = header.matches(',').count();
    if commas > semicolons {
        b','
    } else {
        b';'
    }
}

fn parse_delimited(text: &str, source_name: &str) -> Result<RawBatch> {
    let delimiter = sniff_delimiter(text);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());

    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut row: Vec<String> = record.iter().map(|v| v.to_string()).collect();
        // Flexible parsing can yield short rows; pad so every row aligns
        // with the column set.
        row.resize(columns.len(), String::new());
        rows.push(row);
    }

    if columns.is_empty() || rows.is_empty() {
        return Err(TelemetryError::EmptyBatch {
            source_name: source_name.to_string(),
        });
    }

    info!(
        source = source_name,
        columns = columns.len(),
        rows = rows.len(),
        "ingested batch"
    );

    Ok(RawBatch {
        source: source_name.to_string(),
        columns,
        rows,
    })
}
