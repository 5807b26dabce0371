use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::window::{daily_deltas, keep_most_recent, lagged, trailing_mean};
use super::{Coverage, DataWarning, DateAxis, DateRange, Metric, aggregate_country, align_dates};
use crate::dataset::Dataset;
use crate::table::Tables;

const ROLLING_WINDOW: usize = 7;
const GROWTH_LAG: usize = 14;
const DOUBLING_LAG: usize = 7;
const REPRODUCTION_LAG: usize = 5;
const REPRODUCTION_POINTS: usize = 30;

/// One date of a country series. Field names are the export column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub confirmed: i64,
    pub deaths: i64,
    pub recovered: i64,
    pub active: i64,
    pub daily_confirmed: i64,
    pub daily_deaths: i64,
    pub daily_recovered: i64,
    pub avg7_daily_confirmed: Metric,
    pub avg7_daily_deaths: Metric,
    pub avg7_daily_recovered: Metric,
    pub growth_rate_14d_pct: Metric,
    pub doubling_time_days: Metric,
    pub case_fatality_rate_pct: Metric,
    /// See [`super::REPRODUCTION_ESTIMATE_LABEL`].
    pub reproduction_estimate_approx: Metric,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountrySeries {
    pub country: String,
    pub coverage: BTreeMap<Dataset, Coverage>,
    pub points: Vec<SeriesPoint>,
    pub warnings: Vec<DataWarning>,
}

impl CountrySeries {
    pub fn latest(&self) -> Option<&SeriesPoint> {
        self.points.last()
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.points.iter().map(|p| p.date)
    }
}

/// A primary series and an optional independent comparison series over the
/// same window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub primary: CountrySeries,
    pub secondary: Option<CountrySeries>,
}

/// Computes country series over a fixed set of tables.
///
/// The date axis is aligned once on construction; each call to
/// [`MetricsEngine::series`] recomputes from the tables and never mutates them.
pub struct MetricsEngine<'a> {
    tables: &'a Tables,
    axis: DateAxis,
    axis_warnings: Vec<DataWarning>,
}

impl<'a> MetricsEngine<'a> {
    pub fn new(tables: &'a Tables) -> Self {
        let (axis, axis_warnings) = align_dates(tables);
        if !axis_warnings.is_empty() {
            warn!(
                dropped_dates = axis_warnings.len(),
                "Dates missing from some sources were left off the axis"
            );
        }
        debug!(axis_len = axis.len(), "Date axis aligned");
        Self {
            tables,
            axis,
            axis_warnings,
        }
    }

    pub fn axis(&self) -> &DateAxis {
        &self.axis
    }

    pub fn axis_warnings(&self) -> &[DataWarning] {
        &self.axis_warnings
    }

    #[tracing::instrument(skip(self), fields(start = %range.start, end = %range.end))]
    pub fn series(&self, country: &str, range: DateRange) -> CountrySeries {
        let axis = self.axis.restrict(range);
        let dates = axis.dates();

        let mut coverage = BTreeMap::new();
        let mut cumulative = |dataset: Dataset| {
            let (values, cov) = aggregate_country(self.tables.get(dataset), country, &axis);
            coverage.insert(dataset, cov);
            values
        };
        let confirmed = cumulative(Dataset::Confirmed);
        let deaths = cumulative(Dataset::Deaths);
        let recovered = cumulative(Dataset::Recovered);

        let mut warnings = Vec::new();

        let active: Vec<i64> = (0..dates.len())
            .map(|i| {
                let raw = confirmed[i] - deaths[i] - recovered[i];
                if raw < 0 {
                    warnings.push(DataWarning::NegativeActive { date: dates[i], raw });
                }
                raw.max(0)
            })
            .collect();

        let mut daily = |dataset: Dataset, values: &[i64]| {
            let (deltas, floored) = daily_deltas(values);
            warnings.extend(floored.into_iter().map(|(i, delta)| DataWarning::NegativeDelta {
                dataset,
                date: dates[i],
                delta,
            }));
            deltas
        };
        let daily_confirmed = daily(Dataset::Confirmed, &confirmed);
        let daily_deaths = daily(Dataset::Deaths, &deaths);
        let daily_recovered = daily(Dataset::Recovered, &recovered);

        let avg7_confirmed = trailing_mean(&daily_confirmed, ROLLING_WINDOW);
        let avg7_deaths = trailing_mean(&daily_deaths, ROLLING_WINDOW);
        let avg7_recovered = trailing_mean(&daily_recovered, ROLLING_WINDOW);

        let growth = lagged(&confirmed, GROWTH_LAG, growth_rate_pct);
        let doubling = lagged(&confirmed, DOUBLING_LAG, doubling_time_days);
        let cfr: Vec<Metric> = confirmed
            .iter()
            .zip(&deaths)
            .map(|(&c, &d)| case_fatality_rate_pct(c, d))
            .collect();
        let mut reproduction = lagged(&confirmed, REPRODUCTION_LAG, reproduction_ratio);
        keep_most_recent(&mut reproduction, REPRODUCTION_POINTS);

        for (i, date) in dates.iter().enumerate() {
            let zero_base = [
                ("growth_rate_14d_pct", i >= GROWTH_LAG, GROWTH_LAG),
                ("reproduction_estimate_approx", i >= REPRODUCTION_LAG, REPRODUCTION_LAG),
            ];
            for (metric, has_history, lag) in zero_base {
                if has_history && confirmed[i - lag] == 0 && confirmed[i] > 0 {
                    warnings.push(DataWarning::NonFiniteRatio { metric, date: *date });
                }
            }
        }

        let points = (0..dates.len())
            .map(|i| SeriesPoint {
                date: dates[i],
                confirmed: confirmed[i],
                deaths: deaths[i],
                recovered: recovered[i],
                active: active[i],
                daily_confirmed: daily_confirmed[i],
                daily_deaths: daily_deaths[i],
                daily_recovered: daily_recovered[i],
                avg7_daily_confirmed: avg7_confirmed[i],
                avg7_daily_deaths: avg7_deaths[i],
                avg7_daily_recovered: avg7_recovered[i],
                growth_rate_14d_pct: growth[i],
                doubling_time_days: doubling[i],
                case_fatality_rate_pct: cfr[i],
                reproduction_estimate_approx: reproduction[i],
            })
            .collect();

        log_warnings(country, &warnings);

        CountrySeries {
            country: country.to_string(),
            coverage,
            points,
            warnings,
        }
    }

    /// Computes `country` and, if given, `other` independently over the same window.
    pub fn compare(&self, country: &str, other: Option<&str>, range: DateRange) -> Comparison {
        Comparison {
            primary: self.series(country, range),
            secondary: other.map(|o| self.series(o, range)),
        }
    }
}

/// `(confirmed[t] / confirmed[t-14] - 1) * 100`
fn growth_rate_pct(current: i64, base: i64) -> Metric {
    if base == 0 {
        return Metric::Undefined;
    }
    Metric::finite((current as f64 / base as f64 - 1.0) * 100.0)
}

/// `ln 2 / (ln(confirmed[t] / confirmed[t-7]) / 7)`, defined only while the
/// count is growing from a non-zero base. A cumulative count that shrank over
/// the lag is a reporting correction, not negative growth, so it is
/// `Undefined` rather than a negative doubling time.
fn doubling_time_days(current: i64, base: i64) -> Metric {
    if base <= 0 || current <= base {
        return Metric::Undefined;
    }
    let daily_rate = (current as f64 / base as f64).ln() / DOUBLING_LAG as f64;
    Metric::finite(std::f64::consts::LN_2 / daily_rate)
}

/// Deaths as a percentage of confirmed, capped at 100.
fn case_fatality_rate_pct(confirmed: i64, deaths: i64) -> Metric {
    if confirmed == 0 {
        return Metric::Undefined;
    }
    Metric::finite((deaths as f64 / confirmed as f64 * 100.0).min(100.0))
}

fn reproduction_ratio(current: i64, base: i64) -> Metric {
    if base == 0 {
        return Metric::Undefined;
    }
    Metric::finite(current as f64 / base as f64)
}

fn log_warnings(country: &str, warnings: &[DataWarning]) {
    let mut by_kind: BTreeMap<&str, usize> = BTreeMap::new();
    for w in warnings {
        *by_kind.entry(w.kind()).or_default() += 1;
    }
    for (kind, count) in by_kind {
        warn!(country, kind, count, "Source data normalized");
    }
}
