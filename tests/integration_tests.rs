use chrono::NaiveDate;
use covid_tracker::cleaner::clean_dataset;
use covid_tracker::config::Config;
use covid_tracker::dataset::Dataset;
use covid_tracker::error::PipelineError;
use covid_tracker::fetch::{BasicClient, FetchPolicy};
use covid_tracker::metrics::{Coverage, DataWarning, DateRange, Metric, MetricsEngine};
use covid_tracker::output::{read_series_csv, write_series_csv};
use covid_tracker::pipeline;
use covid_tracker::table::{Tables, WideTable};
use std::fs;
use std::path::Path;
use std::time::Duration;

const FIXTURES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/raw");

fn date(m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, m, d).unwrap()
}

fn all_dates() -> DateRange {
    DateRange::new(date(1, 1), date(12, 31))
}

/// Copies the raw fixtures into a scratch store and cleans them.
fn processed_store() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("raw");
    fs::create_dir_all(&raw).unwrap();
    for d in Dataset::ALL {
        fs::copy(d.raw_path(Path::new(FIXTURES)), d.raw_path(&raw)).unwrap();
        clean_dataset(d, &raw, &dir.path().join("processed")).unwrap();
    }
    dir
}

#[test]
fn test_raw_fixture_needs_cleaning() {
    // The trailing "Notes" column is blank in every row and is not a date.
    let err = WideTable::load(Dataset::Confirmed, Path::new(FIXTURES).join("confirmed.csv"))
        .unwrap_err();
    assert!(matches!(err, PipelineError::Parse { .. }));
}

#[test]
fn test_full_pipeline() {
    let store = processed_store();
    let tables = Tables::load(&store.path().join("processed")).unwrap();
    let engine = MetricsEngine::new(&tables);

    // recovered has one date fewer than the other two
    assert_eq!(engine.axis().len(), 19);
    assert_eq!(engine.axis().last(), Some(date(2, 9)));
    assert!(matches!(
        engine.axis_warnings(),
        [DataWarning::DateNotInAllSources { missing_from, .. }] if missing_from == &vec![Dataset::Recovered]
    ));

    let canada = engine.series("Canada", all_dates());
    assert_eq!(canada.coverage[&Dataset::Confirmed], Coverage::Aggregated { rows: 2 });
    assert_eq!(canada.coverage[&Dataset::Recovered], Coverage::Single);

    for p in &canada.points {
        let expected: i64 = tables
            .confirmed
            .rows_for("Canada")
            .map(|r| r.value_on(p.date).unwrap())
            .sum();
        assert_eq!(p.confirmed, expected);
        assert!(p.active >= 0);
        assert!(p.daily_confirmed >= 0);
    }

    // Quebec's correction on 1/27 pulls the national total down
    assert_eq!(canada.points[4].confirmed, 60);
    assert_eq!(canada.points[5].confirmed, 55);
    assert_eq!(canada.points[5].daily_confirmed, 0);
    assert!(canada.warnings.contains(&DataWarning::NegativeDelta {
        dataset: Dataset::Confirmed,
        date: date(1, 27),
        delta: -5,
    }));
}

#[test]
fn test_albania_derived_metrics() {
    let store = processed_store();
    let tables = Tables::load(&store.path().join("processed")).unwrap();
    let engine = MetricsEngine::new(&tables);

    let albania = engine.series("Albania", all_dates());
    let p = &albania.points;

    assert_eq!(p[0].daily_confirmed, p[0].confirmed);
    for point in &p[..6] {
        assert_eq!(point.avg7_daily_confirmed, Metric::InsufficientHistory);
    }
    // daily = 0,1,3,5,7,9,11
    let avg = p[6].avg7_daily_confirmed.value().unwrap();
    assert!((avg - 36.0 / 7.0).abs() < 1e-9);

    // confirmed[0] == 0, so the 14-day growth at t=14 has no base
    assert_eq!(p[14].growth_rate_14d_pct, Metric::Undefined);
    let growth = p[15].growth_rate_14d_pct.value().unwrap();
    assert!((growth - (225.0 / 1.0 - 1.0) * 100.0).abs() < 1e-9);

    assert_eq!(p[7].doubling_time_days, Metric::Undefined);
    assert!(p[8].doubling_time_days.is_defined());

    assert_eq!(p[0].case_fatality_rate_pct, Metric::Undefined);
    assert_eq!(p[1].case_fatality_rate_pct, Metric::Value(100.0));
    assert_eq!(p[10].case_fatality_rate_pct, Metric::Value(10.0));
}

#[test]
fn test_missing_country_zero_filled() {
    let store = processed_store();
    let tables = Tables::load(&store.path().join("processed")).unwrap();
    let engine = MetricsEngine::new(&tables);

    let atlantis = engine.series("Atlantis", all_dates());

    assert_eq!(atlantis.points.len(), engine.axis().len());
    assert!(atlantis.points.iter().all(|p| p.confirmed == 0 && p.deaths == 0));
    assert!(Dataset::ALL.iter().all(|d| atlantis.coverage[d] == Coverage::Missing));
}

#[test]
fn test_export_round_trip() {
    let store = processed_store();
    let tables = Tables::load(&store.path().join("processed")).unwrap();
    let engine = MetricsEngine::new(&tables);
    let series = engine.series("Albania", DateRange::new(date(1, 25), date(2, 8)));

    let path = store.path().join("exports/albania.csv");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    write_series_csv(&path, &series).unwrap();
    let back = read_series_csv(&path).unwrap();

    assert_eq!(back.len(), series.points.len());
    for (a, b) in series.points.iter().zip(&back) {
        assert_eq!(a.date, b.date);
        assert_eq!(
            (a.confirmed, a.deaths, a.recovered, a.active),
            (b.confirmed, b.deaths, b.recovered, b.active)
        );
        let defined = [
            (a.avg7_daily_confirmed, b.avg7_daily_confirmed),
            (a.growth_rate_14d_pct, b.growth_rate_14d_pct),
            (a.doubling_time_days, b.doubling_time_days),
            (a.case_fatality_rate_pct, b.case_fatality_rate_pct),
            (a.reproduction_estimate_approx, b.reproduction_estimate_approx),
        ];
        for (x, y) in defined {
            if x.is_defined() {
                assert_eq!(x, y);
            } else {
                assert!(!y.is_defined());
            }
        }
    }
}

#[tokio::test]
async fn test_pipeline_run_against_local_server() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]).to_string();
                let name = request
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or("/")
                    .trim_start_matches('/')
                    .to_string();
                let body = fs::read(Path::new(FIXTURES).join(&name)).unwrap_or_default();
                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(&body).await;
            });
        }
    });

    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().to_string_lossy().to_string();
    let config = Config::from_lookup(|key| match key {
        "COVID_DATA_DIR" => Some(data_dir.clone()),
        "COVID_CONFIRMED_URL" => Some(format!("http://{addr}/confirmed.csv")),
        "COVID_DEATHS_URL" => Some(format!("http://{addr}/deaths.csv")),
        "COVID_RECOVERED_URL" => Some(format!("http://{addr}/recovered.csv")),
        "COVID_RETRIES" => Some("0".into()),
        _ => None,
    })
    .unwrap();
    let client = BasicClient::new(Duration::from_secs(5)).unwrap();

    let summary = pipeline::run(&client, &config, FetchPolicy::Overwrite)
        .await
        .unwrap();

    assert!(summary.all_present());
    let tables = Tables::load(&config.processed_dir()).unwrap();
    assert_eq!(tables.confirmed.regions(), vec!["Albania", "Canada", "Chad"]);
}
