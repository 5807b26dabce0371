//! Raw → processed: drops columns that are empty in every row.

use csv::StringRecord;
use serde::Serialize;
use std::fs::File;
use std::io;
use std::path::Path;
use tracing::{debug, info};

use crate::dataset::Dataset;
use crate::error::{PipelineError, Result};
use crate::output::write_atomic;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    pub dataset: Dataset,
    pub rows: usize,
    pub kept: usize,
    pub dropped: Vec<String>,
}

/// Cleans `<raw_dir>/<name>.csv` into `<processed_dir>/<name>_processed.csv`.
///
/// The processed file is replaced atomically; if anything fails the previous
/// processed file is left untouched.
#[tracing::instrument(skip_all, fields(dataset = %dataset))]
pub fn clean_dataset(dataset: Dataset, raw_dir: &Path, processed_dir: &Path) -> Result<CleanReport> {
    let src = dataset.raw_path(raw_dir);
    let dest = dataset.processed_path(processed_dir);
    info!(src = %src.display(), "Processing raw file");

    let file = File::open(&src).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => PipelineError::MissingFile(src.clone()),
        _ => PipelineError::Io(e),
    })?;

    let csv_err = |source: csv::Error| PipelineError::Csv {
        path: src.clone(),
        source,
    };

    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(file);
    let headers = rdr.headers().map_err(csv_err)?.clone();
    if headers.is_empty() {
        return Err(PipelineError::parse(&src, 1, "no columns to parse"));
    }
    let records = rdr
        .records()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(csv_err)?;

    let keep = non_empty_columns(&headers, &records);
    let dropped: Vec<String> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| !keep.contains(i))
        .map(|(_, h)| h.to_string())
        .collect();
    debug!(rows = records.len(), dropped = ?dropped, "Column scan complete");

    std::fs::create_dir_all(processed_dir)?;
    write_atomic(&dest, |file| {
        let mut wtr = csv::Writer::from_writer(file);
        wtr.write_record(project(&headers, &keep))
            .and_then(|_| {
                records
                    .iter()
                    .try_for_each(|r| wtr.write_record(project(r, &keep)))
            })
            .map_err(csv_err)?;
        wtr.flush()?;
        Ok(())
    })?;

    info!(dest = %dest.display(), kept = keep.len(), dropped = dropped.len(), "Processed data saved");
    Ok(CleanReport {
        dataset,
        rows: records.len(),
        kept: keep.len(),
        dropped,
    })
}

/// Cell contents that mark a value as not available.
const MISSING_MARKERS: [&str; 7] = ["NA", "N/A", "NaN", "nan", "null", "NULL", "#N/A"];

fn is_missing(cell: &str) -> bool {
    let cell = cell.trim();
    cell.is_empty() || MISSING_MARKERS.contains(&cell)
}

/// Indices of columns holding at least one present cell. A header-only
/// table keeps every column.
fn non_empty_columns(headers: &StringRecord, records: &[StringRecord]) -> Vec<usize> {
    (0..headers.len())
        .filter(|&i| records.is_empty() || records.iter().any(|r| !is_missing(r.get(i).unwrap_or(""))))
        .collect()
}

fn project<'r>(record: &'r StringRecord, keep: &'r [usize]) -> impl Iterator<Item = &'r str> + 'r {
    keep.iter().map(move |&i| record.get(i).unwrap_or(""))
}
