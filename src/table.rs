//! Wide-format time-series tables as published by JHU CSSE.
//!
//! Each row is a region (optionally a subregion of it) and every column after
//! the metadata is one calendar date holding the cumulative count on that day.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use tracing::{debug, info};

use crate::dataset::Dataset;
use crate::error::{PipelineError, Result};

/// Date format of the upstream column headers, e.g. `1/22/20`.
pub const HEADER_DATE_FORMAT: &str = "%m/%d/%y";

const SUBREGION_COLUMN: &str = "Province/State";
const REGION_COLUMN: &str = "Country/Region";
const LATITUDE_COLUMN: &str = "Lat";
const LONGITUDE_COLUMNS: [&str; 2] = ["Long", "Long_"];

/// Largest magnitude a single count may have. Summing every subregion and
/// subtracting across datasets stays well inside `i64` under this bound.
pub const MAX_COUNT: i64 = 1_000_000_000_000;

/// One source row: metadata plus its date→count map.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionRow {
    pub subregion: Option<String>,
    pub region: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub values: BTreeMap<NaiveDate, i64>,
}

impl RegionRow {
    pub fn value_on(&self, date: NaiveDate) -> Option<i64> {
        self.values.get(&date).copied()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WideTable {
    pub dataset: Dataset,
    pub dates: BTreeSet<NaiveDate>,
    pub rows: Vec<RegionRow>,
}

#[derive(Default)]
struct ColumnMap {
    subregion: Option<usize>,
    region: Option<usize>,
    latitude: Option<usize>,
    longitude: Option<usize>,
    dates: Vec<(usize, NaiveDate)>,
}

impl WideTable {
    /// Loads a table from a CSV file on disk.
    #[tracing::instrument(skip_all, fields(dataset = %dataset, path = %path.as_ref().display()))]
    pub fn load(dataset: Dataset, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => PipelineError::MissingFile(path.to_path_buf()),
            _ => PipelineError::Io(e),
        })?;
        let table = Self::from_reader(dataset, path, file)?;
        info!(
            rows = table.rows.len(),
            dates = table.dates.len(),
            "Table loaded"
        );
        Ok(table)
    }

    /// Parses a table from any reader. `origin` is only used in error messages.
    pub fn from_reader<R: Read>(dataset: Dataset, origin: &Path, reader: R) -> Result<Self> {
        let csv_err = |source: csv::Error| PipelineError::Csv {
            path: origin.to_path_buf(),
            source,
        };

        let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
        let headers = rdr.headers().map_err(csv_err)?.clone();
        if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
            return Err(PipelineError::parse(origin, 1, "missing header row"));
        }

        let columns = map_columns(origin, &headers)?;
        let region_idx = columns.region.ok_or_else(|| {
            PipelineError::parse(origin, 1, format!("missing {REGION_COLUMN} column"))
        })?;

        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(csv_err)?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            let cell = |idx: usize| record.get(idx).unwrap_or("").trim();

            let region = cell(region_idx);
            if region.is_empty() {
                return Err(PipelineError::parse(origin, line, "empty region name"));
            }

            let subregion = columns
                .subregion
                .map(cell)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            let latitude = columns
                .latitude
                .map(|i| parse_coordinate(origin, line, cell(i)))
                .transpose()?
                .flatten();
            let longitude = columns
                .longitude
                .map(|i| parse_coordinate(origin, line, cell(i)))
                .transpose()?
                .flatten();

            let mut values = BTreeMap::new();
            for &(idx, date) in &columns.dates {
                let count = parse_count(cell(idx)).map_err(|msg| {
                    PipelineError::parse(
                        origin,
                        line,
                        format!("{msg} for {region} on {}", date.format(HEADER_DATE_FORMAT)),
                    )
                })?;
                values.insert(date, count);
            }

            rows.push(RegionRow {
                subregion,
                region: region.to_string(),
                latitude,
                longitude,
                values,
            });
        }

        debug!(rows = rows.len(), "Parsed wide table");
        Ok(Self {
            dataset,
            dates: columns.dates.iter().map(|(_, d)| *d).collect(),
            rows,
        })
    }

    /// Sorted, de-duplicated region names.
    pub fn regions(&self) -> Vec<String> {
        self.rows
            .iter()
            .map(|r| r.region.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn rows_for<'a>(&'a self, region: &'a str) -> impl Iterator<Item = &'a RegionRow> + 'a {
        self.rows.iter().filter(move |r| r.region == region)
    }
}

fn map_columns(origin: &Path, headers: &csv::StringRecord) -> Result<ColumnMap> {
    let mut columns = ColumnMap::default();
    let mut seen = BTreeSet::new();

    for (idx, header) in headers.iter().enumerate() {
        let header = header.trim();
        match header {
            SUBREGION_COLUMN => columns.subregion = Some(idx),
            REGION_COLUMN => columns.region = Some(idx),
            LATITUDE_COLUMN => columns.latitude = Some(idx),
            h if LONGITUDE_COLUMNS.contains(&h) => columns.longitude = Some(idx),
            other => {
                let date = NaiveDate::parse_from_str(other, HEADER_DATE_FORMAT).map_err(|_| {
                    PipelineError::parse(origin, 1, format!("unparseable date column {other:?}"))
                })?;
                if !seen.insert(date) {
                    return Err(PipelineError::parse(
                        origin,
                        1,
                        format!("duplicate date column {other:?}"),
                    ));
                }
                columns.dates.push((idx, date));
            }
        }
    }

    Ok(columns)
}

/// Parses a cumulative count. Integral floats such as `12.0` are accepted;
/// empty cells are not, so a missing value never reads as zero. Counts beyond
/// [`MAX_COUNT`] are rejected rather than clamped.
fn parse_count(raw: &str) -> std::result::Result<i64, String> {
    if raw.is_empty() {
        return Err("missing count".to_string());
    }
    let value = match raw.parse::<i64>() {
        Ok(v) => v,
        Err(_) => match raw.parse::<f64>() {
            Ok(v) if v.is_finite() && v.fract() == 0.0 => {
                if v.abs() > MAX_COUNT as f64 {
                    return Err(format!("count out of range {raw:?}"));
                }
                v as i64
            }
            _ => return Err(format!("non-numeric count {raw:?}")),
        },
    };
    if value.unsigned_abs() > MAX_COUNT.unsigned_abs() {
        return Err(format!("count out of range {raw:?}"));
    }
    Ok(value)
}

fn parse_coordinate(origin: &Path, line: u64, raw: &str) -> Result<Option<f64>> {
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<f64>()
        .map(Some)
        .map_err(|_| PipelineError::parse(origin, line, format!("invalid coordinate {raw:?}")))
}

/// The three processed tables the metrics engine works from.
#[derive(Debug, Clone)]
pub struct Tables {
    pub confirmed: WideTable,
    pub deaths: WideTable,
    pub recovered: WideTable,
}

impl Tables {
    /// Loads `<processed_dir>/{confirmed,deaths,recovered}_processed.csv`.
    pub fn load(processed_dir: &Path) -> Result<Self> {
        let load = |d: Dataset| WideTable::load(d, d.processed_path(processed_dir));
        Ok(Self {
            confirmed: load(Dataset::Confirmed)?,
            deaths: load(Dataset::Deaths)?,
            recovered: load(Dataset::Recovered)?,
        })
    }

    pub fn get(&self, dataset: Dataset) -> &WideTable {
        match dataset {
            Dataset::Confirmed => &self.confirmed,
            Dataset::Deaths => &self.deaths,
            Dataset::Recovered => &self.recovered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(csv: &str) -> Result<WideTable> {
        WideTable::from_reader(Dataset::Confirmed, Path::new("test.csv"), csv.as_bytes())
    }

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, m, d).unwrap()
    }

    #[test]
    fn test_parses_metadata_and_dates() {
        let table = parse(
            "Province/State,Country/Region,Lat,Long,1/22/20,1/23/20\n\
             ,Albania,41.15,20.17,0,2\n\
             Ontario,Canada,51.25,-85.32,1,3\n",
        )
        .unwrap();

        assert_eq!(table.dates.len(), 2);
        assert_eq!(table.rows.len(), 2);
        let albania = &table.rows[0];
        assert_eq!(albania.subregion, None);
        assert_eq!(albania.region, "Albania");
        assert_eq!(albania.latitude, Some(41.15));
        assert_eq!(albania.value_on(date(1, 23)), Some(2));
        assert_eq!(table.rows[1].subregion.as_deref(), Some("Ontario"));
    }

    #[test]
    fn test_metadata_found_by_name_not_position() {
        let table = parse("Country/Region,1/22/20,Lat\nChad,5,15.4\n").unwrap();
        assert_eq!(table.rows[0].region, "Chad");
        assert_eq!(table.rows[0].latitude, Some(15.4));
        assert_eq!(table.rows[0].value_on(date(1, 22)), Some(5));
    }

    #[test]
    fn test_integral_float_counts_accepted() {
        let table = parse("Country/Region,1/22/20\nChad,12.0\n").unwrap();
        assert_eq!(table.rows[0].value_on(date(1, 22)), Some(12));
    }

    #[test]
    fn test_non_numeric_count_is_parse_error() {
        let err = parse("Country/Region,1/22/20\nChad,lots\n").unwrap_err();
        match err {
            PipelineError::Parse { line, message, .. } => {
                assert_eq!(line, 2);
                assert!(message.contains("non-numeric"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_out_of_range_counts_rejected() {
        for raw in ["1e30", "-1e30", "5000000000000000000", "1000000000001"] {
            let err = parse(&format!("Country/Region,1/22/20\nChad,{raw}\n")).unwrap_err();
            assert!(
                matches!(&err, PipelineError::Parse { message, .. } if message.contains("out of range")),
                "{raw}: {err}"
            );
        }
        let table = parse("Country/Region,1/22/20\nChad,1000000000000\n").unwrap();
        assert_eq!(table.rows[0].value_on(date(1, 22)), Some(MAX_COUNT));
    }

    #[test]
    fn test_empty_count_is_not_zero() {
        let err = parse("Country/Region,1/22/20\nChad,\n").unwrap_err();
        assert!(matches!(err, PipelineError::Parse { .. }));
    }

    #[test]
    fn test_unparseable_date_header() {
        let err = parse("Country/Region,2020-01-22\nChad,1\n").unwrap_err();
        assert!(matches!(err, PipelineError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_missing_region_column() {
        let err = parse("Province/State,1/22/20\nOntario,1\n").unwrap_err();
        assert!(err.to_string().contains("Country/Region"));
    }

    #[test]
    fn test_empty_input_is_parse_error() {
        assert!(matches!(parse("").unwrap_err(), PipelineError::Parse { .. }));
    }

    #[test]
    fn test_ragged_row_is_csv_error() {
        let err = parse("Country/Region,1/22/20\nChad,1,2\n").unwrap_err();
        assert!(matches!(err, PipelineError::Csv { .. }));
    }

    #[test]
    fn test_regions_sorted_unique() {
        let table = parse(
            "Province/State,Country/Region,1/22/20\n\
             B,Canada,1\nA,Canada,1\n,Albania,0\n",
        )
        .unwrap();
        assert_eq!(table.regions(), vec!["Albania", "Canada"]);
        assert_eq!(table.rows_for("Canada").count(), 2);
    }

    #[test]
    fn test_load_missing_file() {
        let err = WideTable::load(Dataset::Deaths, "/nonexistent/deaths_processed.csv").unwrap_err();
        assert!(matches!(err, PipelineError::MissingFile(_)));
    }
}
