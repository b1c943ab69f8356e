// Earth Engine point export -> ingest observations
//
// Fetch: an Earth Engine `sample()` FeatureCollection (Sentinel-5P L3 CH4
// over an AOI) becomes `source/gee/<run>/points.csv` plus fetch metadata.
// Ingest: that export becomes a regular ingest run.

use super::artifacts::{build_run_id, gee_source_dir, read_json, write_json};
use super::ingest::{write_ingest_run, IngestRun};
use super::{IngestSummary, Observation};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const GEE_DATASET: &str = "COPERNICUS/S5P/OFFL/L3_CH4";
pub const GEE_PRODUCT: &str = "L3_CH4";
pub const GEE_VERSION: &str = "gee";
pub const GEE_SOURCE: &str = "gee_parquet";
/// Source tag written on every fetched point
pub const GEE_FETCH_SOURCE: &str = "S5P_OFFL_L3_CH4";

const CH4_BAND: &str = "CH4_column_volume_mixing_ratio_dry_air";
const QA_BAND: &str = "qa_value";

/// Export column order; written even when there are no points
pub const POINT_COLUMNS: [&str; 6] = ["lat", "lon", "ch4_ppb", "qa_value", "observed_on", "source"];
const REQUIRED_COLUMNS: &[&str] = &["lat", "lon", "ch4_ppb", "qa_value", "observed_on"];

/// One exported sample; empty cells come through as None
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeePoint {
    pub lat: f64,
    pub lon: f64,
    pub ch4_ppb: Option<f64>,
    pub qa_value: Option<f64>,
    pub observed_on: String,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GeeFetchOptions {
    pub aoi: String,
    pub start_date: String,
    pub end_date: String,
    pub scale_meters: u32,
    pub qa_threshold: f64,
    pub max_points: u32,
    pub aoi_fixture: PathBuf,
    /// Sampled FeatureCollection as returned by Earth Engine `getInfo()`
    pub features: PathBuf,
    pub output_root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchMetadata {
    pub run_id: String,
    pub stage: String,
    pub dataset: String,
    pub source: String,
    pub aoi: String,
    pub start_date: String,
    pub end_date: String,
    pub scale_meters: u32,
    pub qa_threshold: f64,
    pub max_points: u32,
    pub point_count: usize,
    pub generated_at: DateTime<Utc>,
    pub points_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSummary {
    pub stage: String,
    pub run_id: String,
    pub point_count: usize,
    pub artifact_dir: String,
}

#[derive(Debug, Clone)]
pub struct GeeIngestOptions {
    pub aoi: String,
    pub start_date: String,
    pub end_date: String,
    pub qa_threshold: f64,
    pub output_root: PathBuf,
}

pub fn points_path(output_root: &Path, run_id: &str) -> PathBuf {
    gee_source_dir(output_root, run_id).join("points.csv")
}

/// Geometry of the AOI feature whose `properties.name` is `aoi`
pub fn load_aoi_geometry(aoi: &str, fixture: &Path) -> Result<Value> {
    let payload: Value = read_json(fixture)?;

    let geometry = payload
        .get("features")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .find(|feature| feature.pointer("/properties/name").and_then(Value::as_str) == Some(aoi))
        .and_then(|feature| feature.get("geometry"))
        .filter(|geometry| !geometry.is_null());

    match geometry {
        Some(geometry) => Ok(geometry.clone()),
        None => bail!("AOI '{}' was not found in {}", aoi, fixture.display()),
    }
}

/// Sampled features -> export rows, skipping anything without [lon, lat]
pub fn features_to_rows(features: &[Value], observed_on: &str) -> Vec<GeePoint> {
    features
        .iter()
        .filter_map(|feature| {
            let coordinates = feature.pointer("/geometry/coordinates")?.as_array()?;
            let [lon, lat] = coordinates.as_slice() else {
                return None;
            };
            let band = |name: &str| feature.get("properties")?.get(name)?.as_f64();

            Some(GeePoint {
                lat: lat.as_f64()?,
                lon: lon.as_f64()?,
                ch4_ppb: band(CH4_BAND),
                qa_value: band(QA_BAND),
                observed_on: observed_on.to_string(),
                source: Some(GEE_FETCH_SOURCE.to_string()),
            })
        })
        .collect()
}

/// Write `points` as CSV with the full header, even for an empty export
pub fn write_points(path: &Path, points: &[GeePoint]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    writer.write_record(POINT_COLUMNS)?;
    for point in points {
        writer.serialize(point)?;
    }
    writer.flush()?;
    Ok(())
}

/// Turn a sampled FeatureCollection into the point export for its run
pub fn run_gee_fetch(options: &GeeFetchOptions) -> Result<FetchSummary> {
    let geometry = load_aoi_geometry(&options.aoi, &options.aoi_fixture)?;
    info!(
        aoi = %options.aoi,
        geometry = geometry.get("type").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
        "resolved AOI"
    );

    let sampled: Value = read_json(&options.features)?;
    let features = sampled
        .get("features")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    let rows = features_to_rows(features, &options.start_date);
    if rows.len() < features.len() {
        warn!(skipped = features.len() - rows.len(), "skipped features without [lon, lat] coordinates");
    }

    let run_id = build_run_id(&options.start_date, &options.end_date, &options.aoi);
    let run_dir = gee_source_dir(&options.output_root, &run_id);
    let path = points_path(&options.output_root, &run_id);
    write_points(&path, &rows)?;

    write_json(
        &run_dir.join("metadata.json"),
        &FetchMetadata {
            run_id: run_id.clone(),
            stage: "fetch".to_string(),
            dataset: GEE_DATASET.to_string(),
            source: GEE_FETCH_SOURCE.to_string(),
            aoi: options.aoi.clone(),
            start_date: options.start_date.clone(),
            end_date: options.end_date.clone(),
            scale_meters: options.scale_meters,
            qa_threshold: options.qa_threshold,
            max_points: options.max_points,
            point_count: rows.len(),
            generated_at: Utc::now(),
            points_path: path.display().to_string(),
        },
    )?;

    info!(run_id = %run_id, points = rows.len(), "wrote GEE point export");
    Ok(FetchSummary {
        stage: "fetch".to_string(),
        run_id,
        point_count: rows.len(),
        artifact_dir: run_dir.display().to_string(),
    })
}

/// Read the point export, checking the column set first
pub fn load_points(path: &Path) -> Result<Vec<GeePoint>> {
    if !path.exists() {
        bail!(
            "Missing GEE points artifact at {}. Run the Earth Engine fetch step for this aoi/start/end first.",
            path.display()
        );
    }

    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let headers = reader.headers()?.clone();
    let mut missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|column| !headers.iter().any(|h| h == *column))
        .collect();
    if !missing.is_empty() {
        missing.sort_unstable();
        bail!("GEE points schema missing columns: {:?}", missing);
    }

    let mut points = Vec::new();
    for (i, record) in reader.deserialize::<GeePoint>().enumerate() {
        let point = record.with_context(|| format!("Bad GEE point on data row {}", i + 1))?;
        points.push(point);
    }

    Ok(points)
}

/// Sort by (observed_on, lat, lon), assign ids, split by QA.
///
/// Returns (all ids in order, kept observations, dropped ids). Samples
/// with no CH4 or QA value are dropped.
pub fn to_observations(mut points: Vec<GeePoint>, qa_threshold: f64) -> (Vec<String>, Vec<Observation>, Vec<String>) {
    points.sort_by(|a, b| {
        a.observed_on
            .cmp(&b.observed_on)
            .then(a.lat.total_cmp(&b.lat))
            .then(a.lon.total_cmp(&b.lon))
    });

    let mut all_ids = Vec::with_capacity(points.len());
    let mut observations = Vec::new();
    let mut dropped = Vec::new();

    for (idx, point) in points.into_iter().enumerate() {
        let observation_id = format!("GEE-{}-{:06}", point.observed_on, idx);
        all_ids.push(observation_id.clone());

        match (point.ch4_ppb, point.qa_value) {
            (Some(ch4_ppb), Some(qa_value)) if qa_value >= qa_threshold => {
                observations.push(Observation {
                    observation_id,
                    observed_on: point.observed_on,
                    latitude: point.lat,
                    longitude: point.lon,
                    ch4_ppb,
                    qa_value,
                });
            }
            _ => dropped.push(observation_id),
        }
    }

    (all_ids, observations, dropped)
}

pub fn run_gee_ingest(options: &GeeIngestOptions) -> Result<IngestSummary> {
    let run_id = build_run_id(&options.start_date, &options.end_date, &options.aoi);
    let path = points_path(&options.output_root, &run_id);

    let points = load_points(&path)?;
    info!(path = %path.display(), count = points.len(), "loaded GEE points");

    let (raw_observation_ids, passed, dropped_ids) = to_observations(points, options.qa_threshold);

    write_ingest_run(
        &options.output_root,
        IngestRun {
            run_id,
            aoi: options.aoi.clone(),
            start_date: options.start_date.clone(),
            end_date: options.end_date.clone(),
            qa_threshold: options.qa_threshold,
            source: GEE_SOURCE.to_string(),
            dataset: GEE_DATASET.to_string(),
            product: GEE_PRODUCT.to_string(),
            version: GEE_VERSION.to_string(),
            source_refs: vec![path.display().to_string()],
            raw_observation_ids,
            passed,
            dropped_ids,
        },
    )
}
