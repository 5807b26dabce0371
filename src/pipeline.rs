//! Ingest → process → summary, with a fixed retry budget per unit of work.
//!
//! Every unit takes only the store paths, writes atomically and can be re-run
//! safely, so retrying a failed unit is always sound.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::cleaner::{CleanReport, clean_dataset};
use crate::config::Config;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::fetch::{FetchOutcome, FetchPolicy, HttpClient, download_dataset};

/// Runs `op` up to `retries + 1` times, sleeping `delay` between attempts.
///
/// Only retryable errors (network, missing file, IO) are retried; parse errors
/// return immediately.
pub async fn run_with_retries<T, F, Fut>(
    unit: &str,
    retries: u32,
    delay: Duration,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && attempt <= retries => {
                warn!(unit, attempt, retries, error = %e, "Unit failed, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                error!(unit, attempt, error = %e, "Unit failed");
                return Err(e);
            }
        }
    }
}

/// Downloads all datasets concurrently. Any dataset that still fails after its
/// retries aborts the run.
#[tracing::instrument(skip_all)]
pub async fn ingest<C: HttpClient>(
    client: &C,
    config: &Config,
    policy: FetchPolicy,
) -> Result<Vec<(Dataset, FetchOutcome)>> {
    let raw_dir = config.raw_dir();
    let unit = |dataset: Dataset| {
        let url = config.url(dataset);
        let raw_dir = raw_dir.clone();
        async move {
            let name = format!("download_{dataset}");
            let (url, raw_dir) = (url.as_str(), raw_dir.as_path());
            let outcome = run_with_retries(&name, config.retries, config.retry_delay, move || {
                download_dataset(client, dataset, url, raw_dir, policy)
            })
            .await?;
            Ok((dataset, outcome))
        }
    };

    let (c, d, r) = tokio::join!(
        unit(Dataset::Confirmed),
        unit(Dataset::Deaths),
        unit(Dataset::Recovered)
    );
    vec![c, d, r].into_iter().collect()
}

/// Cleans every raw file into the processed store.
#[tracing::instrument(skip_all)]
pub async fn process(config: &Config) -> Result<Vec<CleanReport>> {
    let raw_dir = config.raw_dir();
    let processed_dir = config.processed_dir();
    let (raw_dir, processed_dir) = (raw_dir.as_path(), processed_dir.as_path());

    let mut reports = Vec::new();
    for dataset in Dataset::ALL {
        let name = format!("process_{dataset}");
        let report = run_with_retries(&name, config.retries, config.retry_delay, move || async move {
            clean_dataset(dataset, raw_dir, processed_dir)
        })
        .await?;
        reports.push(report);
    }
    Ok(reports)
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub dataset: Dataset,
    pub path: PathBuf,
    pub size_kb: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub generated_at: DateTime<Utc>,
    pub datasets: Vec<DatasetSummary>,
}

impl PipelineSummary {
    pub fn all_present(&self) -> bool {
        self.datasets.iter().all(|d| d.size_kb.is_some())
    }
}

/// Reports the size of every processed file; absent files are logged.
pub fn summarize(config: &Config) -> PipelineSummary {
    let processed_dir = config.processed_dir();
    let datasets = Dataset::ALL
        .iter()
        .map(|&dataset| {
            let path = dataset.processed_path(&processed_dir);
            let size_kb = std::fs::metadata(&path)
                .ok()
                .map(|m| m.len() as f64 / 1024.0);
            match size_kb {
                Some(kb) => info!(dataset = %dataset, size_kb = %format!("{kb:.2}"), "Successfully processed"),
                None => warn!(dataset = %dataset, path = %path.display(), "Processing may have failed"),
            }
            DatasetSummary {
                dataset,
                path,
                size_kb,
            }
        })
        .collect();

    PipelineSummary {
        generated_at: Utc::now(),
        datasets,
    }
}

/// Full run: ingest, process, summary.
pub async fn run<C: HttpClient>(
    client: &C,
    config: &Config,
    policy: FetchPolicy,
) -> Result<PipelineSummary> {
    info!(data_dir = %config.data_dir.display(), "Starting pipeline");
    ingest(client, config, policy).await?;
    process(config).await?;
    let summary = summarize(config);
    info!("Pipeline finished");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use std::cell::Cell;
    use std::path::Path;

    fn config(dir: &Path) -> Config {
        let data_dir = dir.to_string_lossy().to_string();
        Config::from_lookup(move |key| match key {
            "COVID_DATA_DIR" => Some(data_dir.clone()),
            "COVID_RETRIES" => Some("2".into()),
            "COVID_RETRY_DELAY_SECS" => Some("0".into()),
            _ => None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_retries_retryable_errors_until_success() {
        let calls = Cell::new(0);
        let result = run_with_retries("unit", 3, Duration::ZERO, || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n < 3 {
                    Err(PipelineError::MissingFile("x".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let calls = Cell::new(0);
        let result: Result<()> = run_with_retries("unit", 2, Duration::ZERO, || {
            calls.set(calls.get() + 1);
            async { Err(PipelineError::MissingFile("x".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_parse_errors_are_not_retried() {
        let calls = Cell::new(0);
        let result: Result<()> = run_with_retries("unit", 5, Duration::ZERO, || {
            calls.set(calls.get() + 1);
            async { Err(PipelineError::parse("x", 1, "bad")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn test_process_and_summarize() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        std::fs::create_dir_all(config.raw_dir()).unwrap();
        for d in Dataset::ALL {
            std::fs::write(d.raw_path(&config.raw_dir()), "Country/Region,Empty,1/22/20\nChad,,1\n")
                .unwrap();
        }

        let reports = process(&config).await.unwrap();
        let summary = summarize(&config);

        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| r.dropped == vec!["Empty".to_string()]));
        assert!(summary.all_present());
    }

    #[tokio::test]
    async fn test_process_missing_raw_fails_after_retries() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());

        let err = process(&config).await.unwrap_err();

        assert!(matches!(err, PipelineError::MissingFile(_)));
        assert!(!summarize(&config).all_present());
    }
}
