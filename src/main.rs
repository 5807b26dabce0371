//! CLI entry point for covid_tracker.
//!
//! Subcommands cover the ingest pipeline (download, process, pipeline) and
//! the analysis views (countries, series, report, explore) that read the
//! processed store.

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use covid_tracker::{
    cache::TableCache,
    cleaner::clean_dataset,
    config::Config,
    dataset::Dataset,
    fetch::{BasicClient, FetchPolicy, download_all},
    metrics::{CountrySeries, MetricsEngine, REPRODUCTION_ESTIMATE_LABEL},
    output::{format_count, format_metric, to_json, write_series_csv},
    pipeline,
    session::{Selection, resolve_window},
    summary::Report,
    table::Tables,
};
use std::ffi::OsStr;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "covid_tracker")]
#[command(about = "Fetch, clean and analyze JHU CSSE COVID-19 time series", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the raw confirmed/deaths/recovered CSVs
    Download {
        /// Skip datasets whose raw file already exists
        #[arg(long, default_value_t = false)]
        skip_existing: bool,

        /// Log failed downloads and continue instead of exiting with an error
        #[arg(long, default_value_t = false)]
        keep_going: bool,
    },
    /// Drop all-empty columns from the raw CSVs into the processed store
    Process,
    /// Run download, process and summary with retries
    Pipeline {
        /// Skip datasets whose raw file already exists
        #[arg(long, default_value_t = false)]
        skip_existing: bool,
    },
    /// List the countries/regions in the processed data
    Countries,
    /// Compute the derived time series for a country
    Series {
        /// Country/Region name as it appears in the source data
        country: String,

        /// First date of the window (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Last date of the window, inclusive (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Second country computed over the same window
        #[arg(long)]
        compare: Option<String>,

        /// Export the series to this CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Gzip the export (appends .gz to the output path)
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
    /// Headline figures, case distribution, recent activity and regional breakdown
    Report {
        country: String,

        #[arg(long)]
        start: Option<NaiveDate>,

        #[arg(long)]
        end: Option<NaiveDate>,

        /// Print the report as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Interactive session: one `COUNTRY[;START;END[;COMPARE]]` selection per line
    Explore,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/covid_tracker.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("covid_tracker.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Download {
            skip_existing,
            keep_going,
        } => download(&config, policy(skip_existing), keep_going).await?,
        Commands::Process => {
            for dataset in Dataset::ALL {
                let report = clean_dataset(dataset, &config.raw_dir(), &config.processed_dir())?;
                info!(
                    dataset = %dataset,
                    rows = report.rows,
                    kept = report.kept,
                    dropped = ?report.dropped,
                    "Dataset processed"
                );
            }
        }
        Commands::Pipeline { skip_existing } => {
            let client = BasicClient::new(config.fetch_timeout)?;
            let summary = pipeline::run(&client, &config, policy(skip_existing)).await?;
            if !summary.all_present() {
                bail!("pipeline finished but some processed files are missing");
            }
        }
        Commands::Countries => {
            let tables = Tables::load(&config.processed_dir())?;
            for region in tables.confirmed.regions() {
                println!("{region}");
            }
        }
        Commands::Series {
            country,
            start,
            end,
            compare,
            output,
            gzip,
        } => {
            let tables = Tables::load(&config.processed_dir())?;
            let engine = MetricsEngine::new(&tables);
            let range = resolve_window(engine.axis(), start, end)
                .context("processed data has no dates shared by all datasets")?;

            let cmp = engine.compare(&country, compare.as_deref(), range);
            print_series(&cmp.primary);
            if let Some(other) = &cmp.secondary {
                println!();
                print_series(other);
            }

            if let Some(path) = output {
                let path = if gzip { with_gz(&path) } else { path };
                write_series_csv(&path, &cmp.primary)?;
                if let Some(other) = &cmp.secondary {
                    write_series_csv(&sibling_for(&path, &other.country), other)?;
                }
            }
        }
        Commands::Report {
            country,
            start,
            end,
            json,
        } => {
            let tables = Tables::load(&config.processed_dir())?;
            let engine = MetricsEngine::new(&tables);
            let range = resolve_window(engine.axis(), start, end)
                .context("processed data has no dates shared by all datasets")?;
            let series = engine.series(&country, range);
            let report = Report::build(&series, &tables.confirmed);

            if json {
                println!("{}", to_json(&report)?);
            } else {
                print_report(&report);
            }
        }
        Commands::Explore => explore(&config)?,
    }

    Ok(())
}

fn policy(skip_existing: bool) -> FetchPolicy {
    if skip_existing {
        FetchPolicy::SkipExisting
    } else {
        FetchPolicy::Overwrite
    }
}

/// Downloads all datasets; fails on the first error unless `keep_going`.
#[tracing::instrument(skip(config))]
async fn download(config: &Config, policy: FetchPolicy, keep_going: bool) -> Result<()> {
    let client = BasicClient::new(config.fetch_timeout)?;
    let results = download_all(&client, &config.urls, &config.raw_dir(), policy).await;

    let mut failed = 0;
    for (dataset, result) in results {
        match result {
            Ok(outcome) => info!(dataset = %dataset, ?outcome, "Download finished"),
            Err(e) if keep_going => {
                failed += 1;
                warn!(dataset = %dataset, error = %e, "Download failed, continuing");
            }
            Err(e) => return Err(e.into()),
        }
    }

    if failed > 0 {
        warn!(failed, "Some downloads failed");
    }
    Ok(())
}

/// Serves selections read from stdin against the cached tables.
fn explore(config: &Config) -> Result<()> {
    let mut cache = TableCache::new(config.processed_dir(), config.cache_ttl);
    info!(
        ttl_secs = config.cache_ttl.as_secs(),
        "Enter COUNTRY[;START;END[;COMPARE]], one per line; empty line or EOF quits"
    );

    for line in std::io::stdin().lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            break;
        }

        let selection = match Selection::parse(&line) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "Invalid selection");
                continue;
            }
        };

        let tables = match cache.get_or_reload() {
            Ok(t) => t,
            Err(e) => {
                error!(error = %e, "Could not load processed data");
                continue;
            }
        };
        let engine = MetricsEngine::new(&tables);
        let Some(range) = selection.window(engine.axis()) else {
            error!("Processed data has no dates shared by all datasets");
            continue;
        };

        let cmp = engine.compare(&selection.country, selection.compare.as_deref(), range);
        print_report(&Report::build(&cmp.primary, &tables.confirmed));
        if let Some(other) = &cmp.secondary {
            println!();
            print_report(&Report::build(other, &tables.confirmed));
        }
    }
    Ok(())
}

fn with_gz(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(".gz");
    PathBuf::from(s)
}

/// `out/series.csv` + `Japan` → `out/series_Japan.csv` (keeps a `.gz` suffix).
fn sibling_for(path: &Path, country: &str) -> PathBuf {
    let name = path
        .file_name()
        .and_then(OsStr::to_str)
        .unwrap_or("series.csv");
    let slug: String = country
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    let (stem, ext) = match name.find('.') {
        Some(i) => name.split_at(i),
        None => (name, ""),
    };
    path.with_file_name(format!("{stem}_{slug}{ext}"))
}

fn print_series(series: &CountrySeries) {
    println!("{} ({} days)", series.country, series.points.len());
    println!(
        "{:<10} {:>13} {:>11} {:>13} {:>13} {:>10} {:>9} {:>9} {:>9} {:>8} {:>7} {:>6}",
        "date",
        "confirmed",
        "deaths",
        "recovered",
        "active",
        "new",
        "avg7",
        "growth%",
        "double",
        "cfr%",
        "R~",
        "avg7d",
    );
    for p in &series.points {
        println!(
            "{:<10} {:>13} {:>11} {:>13} {:>13} {:>10} {:>9} {:>9} {:>9} {:>8} {:>7} {:>6}",
            p.date,
            format_count(p.confirmed),
            format_count(p.deaths),
            format_count(p.recovered),
            format_count(p.active),
            format_count(p.daily_confirmed),
            format_metric(p.avg7_daily_confirmed, 1),
            format_metric(p.growth_rate_14d_pct, 1),
            format_metric(p.doubling_time_days, 1),
            format_metric(p.case_fatality_rate_pct, 2),
            format_metric(p.reproduction_estimate_approx, 2),
            format_metric(p.avg7_daily_deaths, 1),
        );
    }
    println!("R~ = {REPRODUCTION_ESTIMATE_LABEL}");
    if !series.warnings.is_empty() {
        println!("{} source inconsistencies normalized", series.warnings.len());
    }
}

fn print_report(report: &Report) {
    println!("COVID-19 stats for {}", report.country);
    let Some(h) = &report.headline else {
        println!("  no data in the selected window");
        return;
    };
    println!("  as of {}", h.date);
    println!("  Confirmed cases  {:>15}", format_count(h.confirmed));
    println!("  Deaths           {:>15}", format_count(h.deaths));
    println!("  Recovered        {:>15}", format_count(h.recovered));
    println!("  Active           {:>15}", format_count(h.active));
    println!("  Mortality rate   {:>14.2}%", h.mortality_rate_pct);

    if !report.distribution.is_empty() {
        println!("  Case distribution");
        for s in &report.distribution {
            println!("    {:<15} {:>15} {:>6.1}%", s.category, format_count(s.count), s.share_pct);
        }
    }
    if !report.recent_activity.is_empty() {
        println!("  Recent activity (last 30 days)");
        for s in &report.recent_activity {
            println!("    {:<15} {:>15} {:>6.1}%", s.category, format_count(s.count), s.share_pct);
        }
    }
    if !report.regions.is_empty() {
        println!("  Provinces/States");
        for r in &report.regions {
            println!("    {:<30} {:>15}", r.subregion, format_count(r.cases));
        }
    }
}
