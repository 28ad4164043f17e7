//! JSONL export functionality.
//!
//! Each line is one [`UrlResult`]: the URL, its terminal status, and one verdict
//! per registered plugin with confidence, category, identifiers, methods and warnings.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::models::UrlResult;

use super::pipe::IgnoreBrokenPipe;

/// Writes `results` to `writer`, one JSON object per line.
///
/// Returns the number of records written.
pub fn write_jsonl<W: Write>(results: &[UrlResult], mut writer: W) -> Result<usize> {
    for result in results {
        serde_json::to_writer(&mut writer, result)
            .with_context(|| format!("Failed to serialize result for {}", result.url))?;
        writer.write_all(b"\n").context("Failed to write output")?;
    }
    writer.flush().context("Failed to flush output")?;
    Ok(results.len())
}

/// Writes `results` to `output`, or to stdout when `output` is `None`.
pub fn export_jsonl(results: &[UrlResult], output: Option<&Path>) -> Result<usize> {
    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            write_jsonl(results, BufWriter::new(file))
        }
        None => write_jsonl(results, IgnoreBrokenPipe::new(io::stdout().lock())),
    }
}
