// Hotspot detection over one ingest run
//
// Baseline = median CH4 of the QA-passing observations. Every
// observation at least `anomaly_threshold_ppb` above it becomes a
// single-pixel hotspot candidate.

use super::artifacts::{read_json, resolve_ingest_run_id, stage_dir, write_json, DETECT_STAGE, INGEST_STAGE};
use super::{Observation, ProcessedObservations};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

pub const DEFAULT_ANOMALY_THRESHOLD_PPB: f64 = 40.0;
/// Nominal TROPOMI ground pixel footprint
pub const PIXEL_AREA_KM2: f64 = 7.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotspotCandidate {
    pub id: String,
    pub source_observation_id: String,
    pub observed_on: String,
    pub anomaly_score: f64,
    pub threshold: f64,
    pub qa_pass_ratio: f64,
    pub pixel_count: i64,
    pub area_km2: f64,
    pub centroid_latitude: f64,
    pub centroid_longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionPayload {
    pub ingest_run_id: String,
    pub baseline_ppb: f64,
    pub anomaly_threshold_ppb: f64,
    pub hotspots: Vec<HotspotCandidate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectMetadata {
    pub run_id: String,
    pub stage: String,
    pub input_ingest_run_id: String,
    pub baseline_ppb: f64,
    pub anomaly_threshold_ppb: f64,
    pub candidate_count: usize,
    pub source_observation_count: usize,
    pub generated_at: DateTime<Utc>,
    pub hotspots_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectSummary {
    pub stage: String,
    pub run_id: String,
    pub candidate_count: usize,
    pub artifact_dir: String,
}

#[derive(Debug, Clone)]
pub struct DetectOptions {
    pub ingest_run_id: Option<String>,
    pub anomaly_threshold_ppb: f64,
    pub output_root: PathBuf,
}

/// Only the counters detection needs from the ingest metadata
#[derive(Debug, Deserialize)]
struct IngestCounts {
    raw_count: usize,
    qa_pass_count: usize,
}

/// Three-decimal rounding, ties to even
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round_ties_even() / 1000.0
}

/// Median of `values`; mean of the two middle values for even lengths
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

pub fn detect_hotspots(
    observations: &[Observation],
    baseline: f64,
    threshold: f64,
    qa_pass_ratio: f64,
) -> Vec<HotspotCandidate> {
    observations
        .iter()
        .filter_map(|obs| {
            let anomaly = round3(obs.ch4_ppb - baseline);
            (anomaly >= threshold).then(|| HotspotCandidate {
                id: format!("hs-{}", obs.observation_id),
                source_observation_id: obs.observation_id.clone(),
                observed_on: obs.observed_on.clone(),
                anomaly_score: anomaly,
                threshold,
                qa_pass_ratio: round3(qa_pass_ratio),
                pixel_count: 1,
                area_km2: PIXEL_AREA_KM2,
                centroid_latitude: obs.latitude,
                centroid_longitude: obs.longitude,
            })
        })
        .collect()
}

pub fn run_detect(options: &DetectOptions) -> Result<DetectSummary> {
    let root = &options.output_root;
    let ingest_run_id = resolve_ingest_run_id(root, options.ingest_run_id.as_deref())?;
    let ingest_dir = stage_dir(root, INGEST_STAGE, &ingest_run_id);

    let processed: ProcessedObservations = read_json(&ingest_dir.join("processed").join("observations.json"))?;
    let counts: IngestCounts = read_json(&ingest_dir.join("metadata.json"))?;
    let observations = processed.observations;

    let (baseline, qa_pass_ratio) = match median(&observations.iter().map(|o| o.ch4_ppb).collect::<Vec<_>>()) {
        Some(baseline) => (baseline, counts.qa_pass_count as f64 / counts.raw_count.max(1) as f64),
        None => (0.0, 0.0),
    };

    let hotspots = detect_hotspots(&observations, baseline, options.anomaly_threshold_ppb, qa_pass_ratio);

    // detect runs reuse the ingest run id
    let run_id = ingest_run_id.clone();
    let run_dir = stage_dir(root, DETECT_STAGE, &run_id);
    let hotspots_path = run_dir.join("hotspots.json");

    let metadata = DetectMetadata {
        run_id: run_id.clone(),
        stage: DETECT_STAGE.to_string(),
        input_ingest_run_id: ingest_run_id.clone(),
        baseline_ppb: baseline,
        anomaly_threshold_ppb: options.anomaly_threshold_ppb,
        candidate_count: hotspots.len(),
        source_observation_count: observations.len(),
        generated_at: Utc::now(),
        hotspots_path: hotspots_path.display().to_string(),
    };
    let payload = DetectionPayload {
        ingest_run_id,
        baseline_ppb: baseline,
        anomaly_threshold_ppb: options.anomaly_threshold_ppb,
        hotspots,
    };

    write_json(&hotspots_path, &payload)?;
    write_json(&run_dir.join("metadata.json"), &metadata)?;

    info!(
        run_id = %run_id,
        baseline_ppb = baseline,
        candidates = metadata.candidate_count,
        "detect run written"
    );

    Ok(DetectSummary {
        stage: DETECT_STAGE.to_string(),
        run_id,
        candidate_count: metadata.candidate_count,
        artifact_dir: run_dir.display().to_string(),
    })
}
