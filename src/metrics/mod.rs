//! Derived per-country time series.
//!
//! The engine aligns the three wide tables on a common date axis, sums a
//! country's subregions, restricts the axis to the selected window and then
//! derives the analytic columns in a fixed order (each only reads columns
//! computed before it).

pub mod aggregate;
pub mod axis;
pub mod series;
pub mod window;

pub use aggregate::{Coverage, aggregate_country};
pub use axis::{DateAxis, DateRange, align_dates};
pub use series::{Comparison, CountrySeries, MetricsEngine, SeriesPoint};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;

/// Shown next to every reproduction estimate. It is a plain ratio of
/// cumulative counts, not a modelled R0/Rt.
pub const REPRODUCTION_ESTIMATE_LABEL: &str =
    "simplified R estimate: confirmed[t] / confirmed[t-5], not an epidemiological R0";

/// A derived value that may legitimately be absent.
///
/// Absence is never encoded as zero: a 7-day mean with three days of history is
/// `InsufficientHistory`, a ratio over a zero base is `Undefined`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "Option<f64>", into = "Option<f64>")]
pub enum Metric {
    Value(f64),
    InsufficientHistory,
    Undefined,
}

impl Metric {
    /// Wraps a computed ratio, suppressing NaN and ±infinity.
    pub fn finite(v: f64) -> Self {
        if v.is_finite() {
            Metric::Value(v)
        } else {
            Metric::Undefined
        }
    }

    pub fn value(self) -> Option<f64> {
        match self {
            Metric::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_defined(self) -> bool {
        matches!(self, Metric::Value(_))
    }
}

impl From<Option<f64>> for Metric {
    fn from(v: Option<f64>) -> Self {
        match v {
            Some(v) => Metric::finite(v),
            None => Metric::Undefined,
        }
    }
}

impl From<Metric> for Option<f64> {
    fn from(m: Metric) -> Self {
        m.value()
    }
}

/// Source inconsistencies that are normalized rather than raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataWarning {
    /// A date column present in some tables but not all; it is left off the axis.
    DateNotInAllSources {
        date: NaiveDate,
        missing_from: Vec<Dataset>,
    },
    /// Cumulative count went down; the daily value was floored at 0.
    NegativeDelta {
        dataset: Dataset,
        date: NaiveDate,
        delta: i64,
    },
    /// confirmed - deaths - recovered was negative; active was floored at 0.
    NegativeActive { date: NaiveDate, raw: i64 },
    /// A ratio over a zero base was suppressed.
    NonFiniteRatio {
        metric: &'static str,
        date: NaiveDate,
    },
}

impl DataWarning {
    pub fn kind(&self) -> &'static str {
        match self {
            DataWarning::DateNotInAllSources { .. } => "date_not_in_all_sources",
            DataWarning::NegativeDelta { .. } => "negative_delta",
            DataWarning::NegativeActive { .. } => "negative_active",
            DataWarning::NonFiniteRatio { .. } => "non_finite_ratio",
        }
    }
}
