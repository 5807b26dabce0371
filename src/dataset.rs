//! The three JHU CSSE time-series datasets and where they live on disk.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

const JHU_BASE: &str = "https://raw.githubusercontent.com/CSSEGISandData/COVID-19/master/csse_covid_19_data/csse_covid_19_time_series";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dataset {
    Confirmed,
    Deaths,
    Recovered,
}

impl Dataset {
    pub const ALL: [Dataset; 3] = [Dataset::Confirmed, Dataset::Deaths, Dataset::Recovered];

    pub fn name(self) -> &'static str {
        match self {
            Dataset::Confirmed => "confirmed",
            Dataset::Deaths => "deaths",
            Dataset::Recovered => "recovered",
        }
    }

    /// Upstream URL of the global time series for this dataset.
    pub fn default_url(self) -> String {
        format!("{JHU_BASE}/time_series_covid19_{}_global.csv", self.name())
    }

    /// Environment variable that overrides [`Dataset::default_url`].
    pub fn url_env_var(self) -> &'static str {
        match self {
            Dataset::Confirmed => "COVID_CONFIRMED_URL",
            Dataset::Deaths => "COVID_DEATHS_URL",
            Dataset::Recovered => "COVID_RECOVERED_URL",
        }
    }

    /// `<raw>/<name>.csv`
    pub fn raw_path(self, raw_dir: &Path) -> PathBuf {
        raw_dir.join(format!("{}.csv", self.name()))
    }

    /// `<processed>/<name>_processed.csv`
    pub fn processed_path(self, processed_dir: &Path) -> PathBuf {
        processed_dir.join(format!("{}_processed.csv", self.name()))
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_paths() {
        let raw = Path::new("data/raw");
        let processed = Path::new("data/processed");
        assert_eq!(
            Dataset::Deaths.raw_path(raw),
            PathBuf::from("data/raw/deaths.csv")
        );
        assert_eq!(
            Dataset::Recovered.processed_path(processed),
            PathBuf::from("data/processed/recovered_processed.csv")
        );
    }

    #[test]
    fn test_default_url_points_at_global_series() {
        assert!(
            Dataset::Confirmed
                .default_url()
                .ends_with("time_series_covid19_confirmed_global.csv")
        );
    }
}
