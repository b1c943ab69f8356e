// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use methane_hotspots::pipeline::detect::DEFAULT_ANOMALY_THRESHOLD_PPB;
use methane_hotspots::pipeline::publish::DEFAULT_MAX_DISTANCE_KM;
use methane_hotspots::{
    init_tracing, list_emitters, open_database, publish_detect_run, run_detect, run_gee_fetch, run_gee_ingest,
    run_ingest, seed_emitters, DetectOptions, GeeFetchOptions, GeeIngestOptions, IngestOptions, SourceKind,
};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_ARTIFACT_ROOT: &str = "pipelines/artifacts";
const DEFAULT_EMITTER_FIXTURE: &str = "fixtures/sample_emitters.geojson";
const DEFAULT_TROPOMI_FIXTURE: &str = "fixtures/sample_tropomi_observations.json";
const DEFAULT_AOI_FIXTURE: &str = "fixtures/aoi.geojson";

#[derive(Parser, Debug)]
#[command(name = "methane-hotspots")]
#[command(version, about = "Methane hotspot pipeline and emitter store")]
struct Cli {
    /// SQLite store holding emitters and hotspots
    #[arg(long, global = true, env = "DATABASE_PATH", default_value = "methane.db")]
    database_path: PathBuf,

    /// Root directory for pipeline run artifacts
    #[arg(long, global = true, env = "PIPELINE_ARTIFACT_ROOT", default_value = DEFAULT_ARTIFACT_ROOT)]
    output_root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load the GeoJSON emitter fixture into the store
    Seed {
        #[arg(long, env = "SEED_FIXTURE_PATH", default_value = DEFAULT_EMITTER_FIXTURE)]
        fixture: PathBuf,
    },

    /// Fixture-backed TROPOMI ingest
    Ingest {
        /// Ingest input source adapter
        #[arg(long, value_enum, env = "INGEST_SOURCE", default_value = "fixture")]
        source: SourceKind,
        #[arg(long, env = "INGEST_AOI", default_value = "permian")]
        aoi: String,
        #[arg(long, env = "INGEST_START_DATE", default_value = "2026-02-10")]
        start_date: String,
        #[arg(long, env = "INGEST_END_DATE", default_value = "2026-02-11")]
        end_date: String,
        #[arg(long, env = "INGEST_QA_THRESHOLD", default_value_t = 0.85)]
        qa_threshold: f64,
        #[arg(long, env = "INGEST_FIXTURE_PATH", default_value = DEFAULT_TROPOMI_FIXTURE)]
        fixture: PathBuf,
        #[arg(long, env = "INGEST_REAL_SOURCE_URL")]
        real_source_url: Option<String>,
        #[arg(long, env = "INGEST_REAL_TIMEOUT_SECONDS", default_value_t = 30.0)]
        real_timeout_seconds: f64,
    },

    /// Write the point export from a sampled Earth Engine FeatureCollection
    FetchGee {
        /// `sample()` output saved from `getInfo()`
        #[arg(long)]
        features: PathBuf,
        #[arg(long, env = "INGEST_AOI", default_value = "permian")]
        aoi: String,
        #[arg(long, env = "INGEST_START_DATE", default_value = "2026-02-01")]
        start: String,
        #[arg(long, env = "INGEST_END_DATE", default_value = "2026-02-07")]
        end: String,
        #[arg(long, env = "GEE_SCALE_METERS", default_value_t = 10_000)]
        scale_meters: u32,
        #[arg(long, env = "GEE_QA_THRESHOLD", default_value_t = 0.5)]
        qa_threshold: f64,
        #[arg(long, env = "GEE_MAX_POINTS", default_value_t = 50_000)]
        max_points: u32,
        #[arg(long, env = "INGEST_AOI_FIXTURE", default_value = DEFAULT_AOI_FIXTURE)]
        aoi_fixture: PathBuf,
    },

    /// Convert an Earth Engine CH4 point export into an ingest run
    IngestGee {
        #[arg(long, env = "INGEST_AOI", default_value = "permian")]
        aoi: String,
        #[arg(long, env = "INGEST_START_DATE", default_value = "2026-02-01")]
        start: String,
        #[arg(long, env = "INGEST_END_DATE", default_value = "2026-02-07")]
        end: String,
        #[arg(long, env = "GEE_QA_THRESHOLD", default_value_t = 0.5)]
        qa_threshold: f64,
    },

    /// Hotspot detection over an ingest run
    Detect {
        /// Defaults to the latest ingest run
        #[arg(long, env = "DETECT_INGEST_RUN_ID")]
        ingest_run_id: Option<String>,
        #[arg(long, env = "DETECT_ANOMALY_THRESHOLD_PPB", default_value_t = DEFAULT_ANOMALY_THRESHOLD_PPB)]
        anomaly_threshold_ppb: f64,
    },

    /// Load a detect run into the store
    Publish {
        /// Defaults to the latest detect run
        #[arg(long, env = "PUBLISH_DETECT_RUN_ID")]
        detect_run_id: Option<String>,
        #[arg(long, env = "PUBLISH_MAX_DISTANCE_KM", default_value_t = DEFAULT_MAX_DISTANCE_KM)]
        max_distance_km: f64,
    },

    /// Print stored emitters as JSON
    Emitters,

    /// Terminal emitter dashboard
    Tui,
}

/// Stage summaries go to stdout as one JSON line
fn print_summary<T: Serialize>(summary: &T) -> Result<()> {
    println!("{}", serde_json::to_string(summary)?);
    Ok(())
}

/// Negative values clamp to zero; infinite or oversized values are rejected
fn request_timeout(seconds: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(seconds.max(0.0))
        .with_context(|| format!("Invalid --real-timeout-seconds value {}", seconds))
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Seed { fixture } => {
            let conn = open_database(&cli.database_path)?;
            let summary = seed_emitters(&conn, &fixture)?;
            print_summary(&summary)?;
        }
        Command::Ingest {
            source,
            aoi,
            start_date,
            end_date,
            qa_threshold,
            fixture,
            real_source_url,
            real_timeout_seconds,
        } => {
            let real_timeout = request_timeout(real_timeout_seconds)?;
            let summary = run_ingest(&IngestOptions {
                source,
                aoi,
                start_date,
                end_date,
                qa_threshold,
                fixture,
                real_source_url,
                real_timeout,
                output_root: cli.output_root,
            })?;
            print_summary(&summary)?;
        }
        Command::FetchGee {
            features,
            aoi,
            start,
            end,
            scale_meters,
            qa_threshold,
            max_points,
            aoi_fixture,
        } => {
            let summary = run_gee_fetch(&GeeFetchOptions {
                aoi,
                start_date: start,
                end_date: end,
                scale_meters,
                qa_threshold,
                max_points,
                aoi_fixture,
                features,
                output_root: cli.output_root,
            })?;
            print_summary(&summary)?;
        }
        Command::IngestGee {
            aoi,
            start,
            end,
            qa_threshold,
        } => {
            let summary = run_gee_ingest(&GeeIngestOptions {
                aoi,
                start_date: start,
                end_date: end,
                qa_threshold,
                output_root: cli.output_root,
            })?;
            print_summary(&summary)?;
        }
        Command::Detect {
            ingest_run_id,
            anomaly_threshold_ppb,
        } => {
            let summary = run_detect(&DetectOptions {
                ingest_run_id,
                anomaly_threshold_ppb,
                output_root: cli.output_root,
            })?;
            print_summary(&summary)?;
        }
        Command::Publish {
            detect_run_id,
            max_distance_km,
        } => {
            let conn = open_database(&cli.database_path)?;
            let summary = publish_detect_run(&conn, &cli.output_root, detect_run_id.as_deref(), max_distance_km)?;
            print_summary(&summary)?;
        }
        Command::Emitters => {
            let conn = open_database(&cli.database_path)?;
            let emitters = list_emitters(&conn)?;
            println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "emitters": emitters }))?);
        }
        Command::Tui => run_ui_mode(&cli.database_path)?,
    }

    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(database_path: &std::path::Path) -> Result<()> {
    use methane_hotspots::{get_emitter_with_evidence, mock_emitters, EmitterSummary};
    use std::collections::HashMap;

    let conn = open_database(database_path)?;
    let mut emitters = list_emitters(&conn)?;
    let using_mock_data = emitters.is_empty();

    if using_mock_data {
        tracing::warn!("store has no emitters; showing placeholder data");
        emitters = mock_emitters().iter().map(EmitterSummary::from).collect();
    }

    let mut evidence = HashMap::new();
    for emitter in &emitters {
        if let Some(detail) = get_emitter_with_evidence(&conn, &emitter.id)? {
            evidence.insert(emitter.id.clone(), detail.hotspot_evidence);
        }
    }

    let mut app = ui::App::new(emitters, evidence, using_mock_data);
    ui::run_ui(&mut app)
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_database_path: &std::path::Path) -> Result<()> {
    anyhow::bail!("TUI mode not available. Rebuild with: cargo build --features tui")
}
