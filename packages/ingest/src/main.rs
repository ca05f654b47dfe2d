#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the crash cache ingestion tool.

use std::path::PathBuf;
use std::sync::Mutex;

use clap::{Parser, Subcommand};
use crash_map_analytics_models::QaqcReport;
use crash_map_database::{CacheStore, paths};
use crash_map_ingest::export::export_crashes;
use crash_map_ingest::pipeline::{PipelineOptions, run_pipeline};
use crash_map_ingest::{
    DEFAULT_FETCH_LIMIT, DEFAULT_MAX_CACHE_AGE_HOURS, DEFAULT_WINDOW_DAYS, all_sources,
    cache_path, find_source, is_stale, refresh,
};
use crash_map_source::FetchOptions;

#[derive(Parser)]
#[command(name = "crash_map_ingest", about = "Crash data ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the trailing window for a city and replace its cache
    Sync {
        /// City identifier (e.g., "nyc")
        #[arg(long, default_value = "nyc")]
        city: String,
        /// Number of days of history to fetch
        #[arg(long, default_value_t = DEFAULT_WINDOW_DAYS)]
        days: u32,
        /// Maximum number of records to fetch
        #[arg(long, default_value_t = DEFAULT_FETCH_LIMIT)]
        limit: u64,
    },
    /// List all configured cities
    Sources,
    /// Show the cache size and last refresh time for a city
    Status {
        /// City identifier (e.g., "nyc")
        #[arg(long, default_value = "nyc")]
        city: String,
    },
    /// Check cached geometries and write them to a GeoJSON file
    Export {
        /// City identifier (e.g., "nyc")
        #[arg(long, default_value = "nyc")]
        city: String,
        /// Output file (defaults to data/processed/{city}_crashes.geojson)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Generate a synthetic road network and score roads by crash risk
    Pipeline {
        /// Grid cells per axis
        #[arg(long, default_value_t = 10)]
        size: u32,
        /// Random seed
        #[arg(long, default_value_t = 123)]
        seed: u64,
        /// Output directory (defaults to data/processed)
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn print_qaqc(report: &QaqcReport) {
    println!("QA/QC:");
    println!(
        "  Roads:   {} total, {} null, {} invalid",
        report.roads_total, report.roads_null_geom, report.roads_invalid
    );
    println!(
        "  Crashes: {} total, {} null, {} invalid",
        report.crashes_total, report.crashes_null_geom, report.crashes_invalid
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Sources => {
            println!("{:<12} {:<16} NAME", "ID", "CITY");
            println!("{}", "-".repeat(60));
            for source in &all_sources() {
                println!("{:<12} {:<16} {}", source.id, source.city, source.name);
            }
        }
        Commands::Sync { city, days, limit } => {
            let source = find_source(&city)?;
            let store = Mutex::new(CacheStore::open(&cache_path(&source.id))?);
            let options = FetchOptions {
                days_back: days,
                limit,
            };
            let outcome = refresh(&source, &store, &options).await?;
            println!(
                "{}: {} records cached ({} fetched) in {:.1}s",
                outcome.source_id,
                outcome.records_written,
                outcome.records_fetched,
                outcome.duration.as_secs_f64()
            );
        }
        Commands::Status { city } => {
            let source = find_source(&city)?;
            let path = cache_path(&source.id);
            let store = CacheStore::open(&path)?;
            let last_refresh = store.last_refresh_time()?;
            let stale = is_stale(
                last_refresh,
                chrono::Utc::now(),
                chrono::Duration::hours(DEFAULT_MAX_CACHE_AGE_HOURS),
            );

            println!("Cache:        {}", path.display());
            println!("Records:      {}", store.len());
            println!(
                "Last refresh: {}",
                last_refresh.map_or_else(|| "never".to_string(), |t| t.to_rfc3339())
            );
            println!("Stale:        {stale}");
        }
        Commands::Export { city, out } => {
            let source = find_source(&city)?;
            let store = CacheStore::open(&cache_path(&source.id))?;
            let out = out.unwrap_or_else(|| {
                paths::processed_dir().join(format!("{}_crashes.geojson", source.id))
            });

            let outcome = export_crashes(&store, &out)?;
            println!(
                "{}: {} crashes written to {}",
                source.id,
                outcome.features,
                outcome.path.display()
            );
            print_qaqc(&outcome.qaqc);
        }
        Commands::Pipeline { size, seed, out } => {
            let mut options = PipelineOptions::new(out.unwrap_or_else(paths::processed_dir));
            options.generation.size = size;
            options.generation.seed = seed;

            let outcome = run_pipeline(&options, chrono::Utc::now().date_naive())?;
            println!("Pipeline complete:");
            println!("  Roads:   {}", outcome.roads);
            println!(
                "  Crashes: {} ({} assigned to a road)",
                outcome.crashes, outcome.assigned
            );
            println!("  DB:      {}", outcome.database_path.display());
            println!("  Summary: {}", outcome.summary_path.display());
            print_qaqc(&outcome.qaqc);

            let mut ranked: Vec<_> = outcome.summary.iter().collect();
            ranked.sort_by(|a, b| b.risk_score.total_cmp(&a.risk_score));
            println!("Riskiest roads:");
            for summary in ranked.iter().take(5) {
                println!(
                    "  road {:<4} {:<10} {:>3} crashes  risk {:.2}",
                    summary.road.road_id,
                    summary.road.class.as_str(),
                    summary.n_crashes,
                    summary.risk_score
                );
            }
        }
    }

    Ok(())
}
