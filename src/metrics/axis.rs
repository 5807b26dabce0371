use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;

use super::DataWarning;
use crate::dataset::Dataset;
use crate::table::Tables;

/// Inclusive `[start, end]` selection window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Ordered dates shared by every source table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateAxis {
    dates: Vec<NaiveDate>,
}

impl DateAxis {
    pub fn new(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        let dates: BTreeSet<_> = dates.into_iter().collect();
        Self {
            dates: dates.into_iter().collect(),
        }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn first(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Keeps only the dates inside `range`. Nothing is filled in for dates
    /// outside the axis.
    pub fn restrict(&self, range: DateRange) -> DateAxis {
        DateAxis {
            dates: self
                .dates
                .iter()
                .copied()
                .filter(|d| range.contains(*d))
                .collect(),
        }
    }
}

/// Intersects the date columns of the three tables.
///
/// Dates missing from any source are left off the axis and reported.
pub fn align_dates(tables: &Tables) -> (DateAxis, Vec<DataWarning>) {
    let all: BTreeSet<NaiveDate> = Dataset::ALL
        .iter()
        .flat_map(|d| tables.get(*d).dates.iter().copied())
        .collect();

    let mut common = Vec::new();
    let mut warnings = Vec::new();

    for date in all {
        let missing_from: Vec<Dataset> = Dataset::ALL
            .iter()
            .copied()
            .filter(|d| !tables.get(*d).dates.contains(&date))
            .collect();

        if missing_from.is_empty() {
            common.push(date);
        } else {
            warnings.push(DataWarning::DateNotInAllSources { date, missing_from });
        }
    }

    (DateAxis { dates: common }, warnings)
}
