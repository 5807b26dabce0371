//! Downloads the raw time-series CSVs into the raw store.

mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use bytes::Bytes;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tracing::{debug, error, info};

use crate::dataset::Dataset;
use crate::error::{PipelineError, Result};
use crate::output::write_atomic;

/// What to do when the destination file is already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPolicy {
    Overwrite,
    SkipExisting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Downloaded { bytes: usize },
    Skipped,
}

/// Issues a GET for `url` and returns the body of a 2xx response.
pub async fn fetch_bytes<C: HttpClient>(client: &C, dataset: Dataset, url: &str) -> Result<Bytes> {
    let parsed = url.parse().map_err(|_| PipelineError::InvalidUrl {
        dataset,
        url: url.to_string(),
    })?;
    let req = reqwest::Request::new(reqwest::Method::GET, parsed);

    let resp = client
        .execute(req)
        .await
        .map_err(|source| PipelineError::Network { dataset, source })?;

    let status = resp.status();
    if !status.is_success() {
        return Err(PipelineError::HttpStatus { dataset, status });
    }

    resp.bytes()
        .await
        .map_err(|source| PipelineError::Network { dataset, source })
}

/// Downloads one dataset to `<raw_dir>/<name>.csv`.
///
/// The body is written to a temp file and renamed into place, so a failed
/// download never leaves a truncated file behind.
#[tracing::instrument(skip_all, fields(dataset = %dataset))]
pub async fn download_dataset<C: HttpClient>(
    client: &C,
    dataset: Dataset,
    url: &str,
    raw_dir: &Path,
    policy: FetchPolicy,
) -> Result<FetchOutcome> {
    let dest = dataset.raw_path(raw_dir);

    if policy == FetchPolicy::SkipExisting && dest.exists() {
        info!(path = %dest.display(), "Raw file present, skipping download");
        return Ok(FetchOutcome::Skipped);
    }

    std::fs::create_dir_all(raw_dir)?;
    info!(url, path = %dest.display(), "Downloading dataset");

    let body = fetch_bytes(client, dataset, url).await?;
    write_atomic(&dest, |file| Ok(file.write_all(&body)?))?;

    debug!(bytes = body.len(), "Dataset written");
    info!(path = %dest.display(), "Download complete");
    Ok(FetchOutcome::Downloaded { bytes: body.len() })
}

/// Downloads all three datasets concurrently.
///
/// Every dataset gets its own result; a failure in one does not stop the others.
pub async fn download_all<C: HttpClient>(
    client: &C,
    urls: &BTreeMap<Dataset, String>,
    raw_dir: &Path,
    policy: FetchPolicy,
) -> Vec<(Dataset, Result<FetchOutcome>)> {
    let one = |dataset: Dataset| async move {
        let url = urls
            .get(&dataset)
            .cloned()
            .unwrap_or_else(|| dataset.default_url());
        let result = download_dataset(client, dataset, &url, raw_dir, policy).await;
        if let Err(e) = &result {
            error!(dataset = %dataset, error = %e, "Download failed");
        }
        (dataset, result)
    };

    let (confirmed, deaths, recovered) = tokio::join!(
        one(Dataset::Confirmed),
        one(Dataset::Deaths),
        one(Dataset::Recovered)
    );
    vec![confirmed, deaths, recovered]
}
