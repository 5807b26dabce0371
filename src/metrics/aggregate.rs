use serde::Serialize;

use super::DateAxis;
use crate::table::WideTable;

/// How a country's values were obtained from a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Coverage {
    /// Several subregion rows, summed elementwise.
    Aggregated { rows: usize },
    /// Exactly one row, used as-is.
    Single,
    /// No row for this country; the series is zero-filled.
    Missing,
}

/// Cumulative counts for `country` along `axis`.
///
/// A country absent from the table yields zeros of the axis length rather than
/// an error.
pub fn aggregate_country(table: &WideTable, country: &str, axis: &DateAxis) -> (Vec<i64>, Coverage) {
    let rows: Vec<_> = table.rows_for(country).collect();

    let coverage = match rows.len() {
        0 => Coverage::Missing,
        1 => Coverage::Single,
        n => Coverage::Aggregated { rows: n },
    };

    let values = axis
        .dates()
        .iter()
        .map(|date| rows.iter().filter_map(|r| r.value_on(*date)).sum::<i64>())
        .collect();

    (values, coverage)
}
