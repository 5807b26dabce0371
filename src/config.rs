//! Runtime configuration read from the environment (after `.env` is loaded).

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::dataset::Dataset;

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub urls: BTreeMap<Dataset, String>,
    pub fetch_timeout: Duration,
    pub cache_ttl: Duration,
    pub retries: u32,
    pub retry_delay: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. Unset keys fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = lookup("COVID_DATA_DIR").unwrap_or_else(|| "data".to_string());

        let urls = Dataset::ALL
            .iter()
            .map(|&d| (d, lookup(d.url_env_var()).unwrap_or_else(|| d.default_url())))
            .collect();

        Ok(Self {
            data_dir: PathBuf::from(data_dir),
            urls,
            fetch_timeout: Duration::from_secs(parse_or(&lookup, "COVID_FETCH_TIMEOUT_SECS", 10)?),
            cache_ttl: Duration::from_secs(parse_or(&lookup, "COVID_CACHE_TTL_SECS", 3600)?),
            retries: parse_or(&lookup, "COVID_RETRIES", 3)?,
            retry_delay: Duration::from_secs(parse_or(&lookup, "COVID_RETRY_DELAY_SECS", 300)?),
        })
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join("raw")
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.data_dir.join("processed")
    }

    pub fn url(&self, dataset: Dataset) -> String {
        self.urls
            .get(&dataset)
            .cloned()
            .unwrap_or_else(|| dataset.default_url())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}
