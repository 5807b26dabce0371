//! Error taxonomy shared by the fetch, clean and metrics stages.

use std::path::PathBuf;
use thiserror::Error;

use crate::dataset::Dataset;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("network error fetching {dataset}: {source}")]
    Network {
        dataset: Dataset,
        #[source]
        source: reqwest::Error,
    },

    #[error("{dataset} download returned HTTP {status}")]
    HttpStatus {
        dataset: Dataset,
        status: reqwest::StatusCode,
    },

    #[error("invalid URL for {dataset}: {url}")]
    InvalidUrl { dataset: Dataset, url: String },

    #[error("file not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("parse error in {} (line {line}): {message}", .path.display())]
    Parse {
        path: PathBuf,
        line: u64,
        message: String,
    },

    #[error("CSV error in {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub(crate) fn parse(path: impl Into<PathBuf>, line: u64, message: impl Into<String>) -> Self {
        PipelineError::Parse {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    /// Network and missing-file failures may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::Network { .. }
                | PipelineError::HttpStatus { .. }
                | PipelineError::MissingFile(_)
                | PipelineError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_is_not_retryable() {
        let err = PipelineError::parse("data/x.csv", 3, "bad count");
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "parse error in data/x.csv (line 3): bad count"
        );
    }

    #[test]
    fn test_missing_file_is_retryable() {
        let err = PipelineError::MissingFile(PathBuf::from("data/raw/deaths.csv"));
        assert!(err.is_retryable());
        assert!(err.to_string().contains("deaths.csv"));
    }
}
