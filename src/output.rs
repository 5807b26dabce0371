//! Persistence and display formatting for computed series.
//!
//! Files are written through [`write_atomic`]: a temp file in the target
//! directory renamed over the destination, so readers never see a partial file.

use anyhow::Result as AnyResult;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::metrics::{CountrySeries, Metric, SeriesPoint};

/// Writes `path` via a sibling temp file and an atomic rename.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    write(tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| PipelineError::Io(e.error))?;
    debug!(path = %path.display(), "File replaced atomically");
    Ok(())
}

fn is_gzip(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("gz")
}

/// Exports a series as CSV. Counts are plain integers, undefined metrics are
/// empty cells and dates are `YYYY-MM-DD`. A `.gz` path is gzip-compressed.
pub fn write_series_csv(path: &Path, series: &CountrySeries) -> Result<()> {
    let csv_err = |source: csv::Error| PipelineError::Csv {
        path: path.to_path_buf(),
        source,
    };

    write_atomic(path, |file| {
        if is_gzip(path) {
            let mut encoder = GzEncoder::new(file, Compression::default());
            write_points(&mut encoder, &series.points).map_err(csv_err)?;
            encoder.finish()?;
        } else {
            write_points(file, &series.points).map_err(csv_err)?;
        }
        Ok(())
    })?;

    info!(
        path = %path.display(),
        country = %series.country,
        rows = series.points.len(),
        "Series exported"
    );
    Ok(())
}

fn write_points<W: Write>(writer: W, points: &[SeriesPoint]) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for p in points {
        wtr.serialize(p)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Reads back a file produced by [`write_series_csv`].
pub fn read_series_csv(path: &Path) -> Result<Vec<SeriesPoint>> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => PipelineError::MissingFile(path.to_path_buf()),
        _ => PipelineError::Io(e),
    })?;
    let reader: Box<dyn Read> = if is_gzip(path) {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };

    csv::Reader::from_reader(reader)
        .deserialize()
        .collect::<csv::Result<Vec<SeriesPoint>>>()
        .map_err(|source| PipelineError::Csv {
            path: path.to_path_buf(),
            source,
        })
}

/// `1234567` → `1,234,567`. Display only; never used for persisted files.
pub fn format_count(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Renders a metric with `decimals` places, or `—` when it has no value.
pub fn format_metric(metric: Metric, decimals: usize) -> String {
    match metric {
        Metric::Value(v) => format!("{v:.decimals$}"),
        Metric::InsufficientHistory | Metric::Undefined => "—".to_string(),
    }
}

/// Pretty-printed JSON of any serializable report, for `--json` output.
pub fn to_json<T: serde::Serialize>(value: &T) -> AnyResult<String> {
    Ok(serde_json::to_string_pretty(value)?)
}
