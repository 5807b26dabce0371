//! Dashboard-level summaries built on top of a computed [`CountrySeries`].

use chrono::NaiveDate;
use serde::Serialize;

use crate::metrics::{CountrySeries, DateAxis, DateRange};
use crate::table::WideTable;

/// Days summed for the recent-activity breakdown.
pub const RECENT_DAYS: usize = 30;

/// Subregions listed in the regional breakdown.
pub const TOP_SUBREGIONS: usize = 20;

/// Latest cumulative figures of the selected window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Headline {
    pub date: NaiveDate,
    pub confirmed: i64,
    pub deaths: i64,
    pub recovered: i64,
    pub active: i64,
    /// deaths / confirmed × 100, or 0 without confirmed cases.
    pub mortality_rate_pct: f64,
}

impl Headline {
    pub fn from_series(series: &CountrySeries) -> Option<Self> {
        let p = series.latest()?;
        let mortality_rate_pct = if p.confirmed > 0 {
            p.deaths as f64 / p.confirmed as f64 * 100.0
        } else {
            0.0
        };
        Some(Self {
            date: p.date,
            confirmed: p.confirmed,
            deaths: p.deaths,
            recovered: p.recovered,
            active: p.active,
            mortality_rate_pct,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Share {
    pub category: &'static str,
    pub count: i64,
    pub share_pct: f64,
}

fn shares(parts: [(&'static str, i64); 3], drop_zero: bool) -> Vec<Share> {
    let parts: Vec<_> = parts
        .into_iter()
        .map(|(c, n)| (c, n.max(0)))
        .filter(|(_, n)| !drop_zero || *n > 0)
        .collect();
    let total: i64 = parts.iter().map(|(_, n)| n).sum();
    if total == 0 {
        return Vec::new();
    }
    parts
        .into_iter()
        .map(|(category, count)| Share {
            category,
            count,
            share_pct: count as f64 / total as f64 * 100.0,
        })
        .collect()
}

/// Active / recovered / deaths split at the latest date. Empty when all are zero.
pub fn distribution(series: &CountrySeries) -> Vec<Share> {
    match series.latest() {
        Some(p) => shares(
            [
                ("Active", p.active),
                ("Recovered", p.recovered),
                ("Deaths", p.deaths),
            ],
            false,
        ),
        None => Vec::new(),
    }
}

/// New cases, deaths and recoveries summed over the last [`RECENT_DAYS`]
/// points. Categories with no activity are dropped.
pub fn recent_activity(series: &CountrySeries) -> Vec<Share> {
    let n = series.points.len().min(RECENT_DAYS);
    let recent = &series.points[series.points.len() - n..];
    let sum = |f: fn(&crate::metrics::SeriesPoint) -> i64| recent.iter().map(f).sum::<i64>();
    shares(
        [
            ("New Cases", sum(|p| p.daily_confirmed)),
            ("New Deaths", sum(|p| p.daily_deaths)),
            ("New Recoveries", sum(|p| p.daily_recovered)),
        ],
        true,
    )
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubregionCases {
    pub subregion: String,
    pub cases: i64,
}

/// Confirmed cases per named subregion on `date`, largest first.
///
/// Returns an empty list unless the country has more than one named subregion.
pub fn regional_breakdown(
    confirmed: &WideTable,
    country: &str,
    date: NaiveDate,
    limit: usize,
) -> Vec<SubregionCases> {
    let mut rows: Vec<SubregionCases> = confirmed
        .rows_for(country)
        .filter_map(|r| {
            Some(SubregionCases {
                subregion: r.subregion.clone()?,
                cases: r.value_on(date)?,
            })
        })
        .collect();

    if rows.len() <= 1 {
        return Vec::new();
    }

    rows.sort_by(|a, b| b.cases.cmp(&a.cases).then_with(|| a.subregion.cmp(&b.subregion)));
    rows.truncate(limit);
    rows
}

/// Default selection: 2020-01-22 to 2023-03-09, clamped to the axis.
pub fn default_window(axis: &DateAxis) -> Option<DateRange> {
    let (min, max) = (axis.first()?, axis.last()?);
    let default_start = NaiveDate::from_ymd_opt(2020, 1, 22)?;
    let default_end = NaiveDate::from_ymd_opt(2023, 3, 9)?;

    let start = default_start.max(min);
    let end = if default_end > max || default_end < min {
        max
    } else {
        default_end
    };
    Some(DateRange::new(start, end))
}

/// Everything the report view shows for one country.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub country: String,
    pub headline: Option<Headline>,
    pub distribution: Vec<Share>,
    pub recent_activity: Vec<Share>,
    pub regions: Vec<SubregionCases>,
}

impl Report {
    pub fn build(series: &CountrySeries, confirmed: &WideTable) -> Self {
        let regions = series
            .latest()
            .map(|p| regional_breakdown(confirmed, &series.country, p.date, TOP_SUBREGIONS))
            .unwrap_or_default();
        Self {
            country: series.country.clone(),
            headline: Headline::from_series(series),
            distribution: distribution(series),
            recent_activity: recent_activity(series),
            regions,
        }
    }
}
